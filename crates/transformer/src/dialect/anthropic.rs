//! Anthropic dialect adapters over the Messages API.
//!
//! The streaming side is a small state machine in both directions: the wire
//! grammar is block-oriented (`content_block_start` → deltas → stop) while
//! the unified model is chunk-oriented, so each adapter threads per-stream
//! state through its mapping closure.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use config::ProviderConfig;
use futures::StreamExt;
use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use secrecy::SecretString;

use crate::aggregate::{self, ResponseMeta};
use crate::dialect::{ApiFormat, Inbound, Outbound, ResponseStream, SseFrameStream};
use crate::error::{Error, Result};
use crate::http::{
    ApiKeyProvider, AuthConfig, AuthKind, EventStream, HttpError, HttpRequest, HttpResponse,
    RawRequest, StaticKeyProvider,
};
use crate::messages::unified::{TransformerMetadata, to_anthropic};
use crate::messages::{anthropic, unified};
use crate::sse;

const API_VERSION: &str = "2023-06-01";

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

/// Caller-facing adapter for the Anthropic dialect.
#[derive(Debug, Default, Clone, Copy)]
pub struct InboundAnthropic;

#[async_trait]
impl Inbound for InboundAnthropic {
    fn api_format(&self) -> ApiFormat {
        ApiFormat::Anthropic
    }

    async fn transform_request(&self, raw: RawRequest) -> Result<unified::Request> {
        if !raw.path.ends_with("/messages") {
            return Err(Error::InvalidRequest(format!(
                "unsupported endpoint: {}",
                raw.path
            )));
        }

        let wire: anthropic::MessagesRequest = serde_json::from_slice(&raw.body)
            .map_err(|e| Error::InvalidRequest(format!("invalid request body: {e}")))?;

        let mut request = unified::Request::from(wire);
        request.raw_request = Some(Arc::new(raw));
        request.validate()?;

        Ok(request)
    }

    fn transform_response(&self, response: unified::Response) -> Result<HttpResponse> {
        let wire = anthropic::MessagesResponse::from(response);
        let body = serde_json::to_vec(&wire)
            .map_err(|e| Error::Internal(Some(format!("response serialization failed: {e}"))))?;

        Ok(HttpResponse {
            status: StatusCode::OK,
            headers: json_headers(),
            body,
            metadata: TransformerMetadata::default(),
        })
    }

    fn transform_stream(&self, stream: ResponseStream) -> SseFrameStream {
        let source = stream.map(Some).chain(futures::stream::once(async { None }));

        source
            .scan(EventWriter::default(), |writer, item| {
                let frames = match item {
                    Some(Ok(chunk)) => writer.frames_for(chunk),
                    Some(Err(e)) => vec![Err(e)],
                    None => writer.finalize(),
                };

                futures::future::ready(Some(futures::stream::iter(frames)))
            })
            .flatten()
            .boxed()
    }

    fn aggregate_stream_chunks(&self, chunks: &[String]) -> Result<(Vec<u8>, ResponseMeta)> {
        let response = fold_anthropic_events(chunks);
        let meta = ResponseMeta::of(&response);

        let body = serde_json::to_vec(&anthropic::MessagesResponse::from(response))
            .map_err(|e| Error::Internal(Some(format!("aggregate serialization failed: {e}"))))?;

        Ok((body, meta))
    }

    fn transform_error(&self, error: &Error) -> HttpResponse {
        let envelope = anthropic::ErrorResponse {
            kind: "error".to_string(),
            error: anthropic::ErrorDetails {
                kind: error.error_type().to_string(),
                message: error.client_message(),
            },
        };

        HttpResponse {
            status: error.status_code(),
            headers: json_headers(),
            body: serde_json::to_vec(&envelope).unwrap_or_default(),
            metadata: TransformerMetadata::default(),
        }
    }
}

/// Serializes unified chunks into the block-oriented event grammar.
#[derive(Default)]
struct EventWriter {
    started: bool,
    id: String,
    model: String,
    next_block: u32,
    open_block: Option<OpenBlock>,
    current_tool: Option<u32>,
    finish_reason: Option<unified::FinishReason>,
    saw_tool_calls: bool,
    usage: Option<unified::Usage>,
}

#[derive(PartialEq)]
enum OpenBlock {
    Text,
    Thinking,
    ToolUse,
}

impl EventWriter {
    fn frames_for(&mut self, chunk: unified::Response) -> Vec<Result<String>> {
        if chunk.is_done() {
            return Vec::new();
        }

        let mut frames = Vec::new();

        if !self.started {
            self.started = true;
            self.id = chunk.id.clone();
            self.model = chunk.model.clone();

            let start = anthropic::StreamEvent::MessageStart {
                message: anthropic::MessagesResponse {
                    id: chunk.id.clone(),
                    kind: "message".to_string(),
                    role: "assistant".to_string(),
                    model: chunk.model.clone(),
                    ..Default::default()
                },
            };
            frames.push(self.frame(&start));
        }

        if chunk.usage.is_some() {
            self.usage = chunk.usage.clone();
        }

        for choice in chunk.choices {
            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(reason);
            }

            let Some(delta) = choice.delta.or(choice.message) else {
                continue;
            };

            if let Some(reasoning) = delta.reasoning_content {
                self.ensure_block(OpenBlock::Thinking, &mut frames, |index| {
                    anthropic::StreamEvent::ContentBlockStart {
                        index,
                        content_block: anthropic::ContentBlock::Thinking {
                            thinking: String::new(),
                            signature: String::new(),
                        },
                    }
                });
                frames.push(self.frame(&anthropic::StreamEvent::ContentBlockDelta {
                    index: self.next_block - 1,
                    delta: anthropic::BlockDelta::ThinkingDelta { thinking: reasoning },
                }));
            }

            if let Some(content) = delta.content {
                let text = content.to_text();
                if !text.is_empty() {
                    self.ensure_block(OpenBlock::Text, &mut frames, |index| {
                        anthropic::StreamEvent::ContentBlockStart {
                            index,
                            content_block: anthropic::ContentBlock::Text { text: String::new() },
                        }
                    });
                    frames.push(self.frame(&anthropic::StreamEvent::ContentBlockDelta {
                        index: self.next_block - 1,
                        delta: anthropic::BlockDelta::TextDelta { text },
                    }));
                }
            }

            for call in delta.tool_calls.into_iter().flatten() {
                self.saw_tool_calls = true;

                let starts_new_call =
                    !call.function.name.is_empty() || self.current_tool != call.index;

                if starts_new_call {
                    self.close_block(&mut frames);
                    self.current_tool = call.index;

                    let index = self.next_block;
                    self.next_block += 1;
                    self.open_block = Some(OpenBlock::ToolUse);

                    frames.push(self.frame(&anthropic::StreamEvent::ContentBlockStart {
                        index,
                        content_block: anthropic::ContentBlock::ToolUse {
                            id: call.id.clone(),
                            name: call.function.name.clone(),
                            input: serde_json::json!({}),
                        },
                    }));
                }

                if !call.function.arguments.is_empty() {
                    frames.push(self.frame(&anthropic::StreamEvent::ContentBlockDelta {
                        index: self.next_block - 1,
                        delta: anthropic::BlockDelta::InputJsonDelta {
                            partial_json: call.function.arguments,
                        },
                    }));
                }
            }
        }

        frames
    }

    fn finalize(&mut self) -> Vec<Result<String>> {
        if !self.started {
            return Vec::new();
        }

        let mut frames = Vec::new();
        self.close_block(&mut frames);

        let stop_reason = self
            .finish_reason
            .map(|reason| to_anthropic::finish_reason_to_stop_reason(reason, self.saw_tool_calls))
            .unwrap_or(anthropic::stop_reason::END_TURN);

        let usage = self.usage.take().map(to_anthropic::usage_to_anthropic);
        frames.push(self.frame(&anthropic::StreamEvent::MessageDelta {
            delta: anthropic::MessageDeltaBody {
                stop_reason: Some(stop_reason.to_string()),
                stop_sequence: None,
            },
            usage,
        }));
        frames.push(self.frame(&anthropic::StreamEvent::MessageStop));

        frames
    }

    fn ensure_block(
        &mut self,
        kind: OpenBlock,
        frames: &mut Vec<Result<String>>,
        start: impl FnOnce(u32) -> anthropic::StreamEvent,
    ) {
        if self.open_block.as_ref() == Some(&kind) {
            return;
        }

        self.close_block(frames);

        let index = self.next_block;
        self.next_block += 1;
        self.open_block = Some(kind);

        let event = start(index);
        frames.push(self.frame(&event));
    }

    fn close_block(&mut self, frames: &mut Vec<Result<String>>) {
        if self.open_block.take().is_some() {
            frames.push(self.frame(&anthropic::StreamEvent::ContentBlockStop {
                index: self.next_block - 1,
            }));
        }
    }

    fn frame(&self, event: &anthropic::StreamEvent) -> Result<String> {
        sonic_rs::to_string(event)
            .map(|json| sse::event_frame(event.event_name(), &json))
            .map_err(|e| Error::Internal(Some(format!("event serialization failed: {e}"))))
    }
}

/// Folds wire events into unified chunks; per-stream state for block → tool
/// call correlation.
#[derive(Default)]
struct EventReader {
    id: String,
    model: String,
    tool_counter: u32,
    tool_by_block: BTreeMap<u32, u32>,
}

impl EventReader {
    fn chunk(
        &self,
        choices: Vec<unified::Choice>,
        usage: Option<unified::Usage>,
    ) -> unified::Response {
        unified::Response {
            id: self.id.clone(),
            object: unified::ObjectType::ChatCompletionChunk,
            model: self.model.clone(),
            choices,
            usage,
            ..Default::default()
        }
    }

    fn delta_choice(delta: unified::Message) -> unified::Choice {
        unified::Choice {
            index: 0,
            delta: Some(delta),
            ..Default::default()
        }
    }

    /// One wire event to at most one unified chunk. Signature-only and
    /// bookkeeping events dissolve into `None`.
    fn read(&mut self, event: anthropic::StreamEvent) -> Option<Result<unified::Response>> {
        match event {
            anthropic::StreamEvent::MessageStart { message } => {
                self.id = message.id;
                self.model = message.model;

                Some(Ok(self.chunk(
                    vec![Self::delta_choice(unified::Message {
                        role: unified::Role::Assistant,
                        ..Default::default()
                    })],
                    None,
                )))
            }
            anthropic::StreamEvent::ContentBlockStart { index, content_block } => {
                match content_block {
                    anthropic::ContentBlock::ToolUse { id, name, .. } => {
                        let tool_index = self.tool_counter;
                        self.tool_counter += 1;
                        self.tool_by_block.insert(index, tool_index);

                        Some(Ok(self.chunk(
                            vec![Self::delta_choice(unified::Message {
                                tool_calls: Some(vec![unified::ToolCall {
                                    id,
                                    kind: "function".to_string(),
                                    function: unified::FunctionCall {
                                        name,
                                        arguments: String::new(),
                                    },
                                    index: Some(tool_index),
                                }]),
                                ..Default::default()
                            })],
                            None,
                        )))
                    }
                    // Text and thinking blocks produce content through their
                    // deltas.
                    _ => None,
                }
            }
            anthropic::StreamEvent::ContentBlockDelta { index, delta } => match delta {
                anthropic::BlockDelta::TextDelta { text } => Some(Ok(self.chunk(
                    vec![Self::delta_choice(unified::Message {
                        content: Some(unified::MessageContent::Text(text)),
                        ..Default::default()
                    })],
                    None,
                ))),
                anthropic::BlockDelta::ThinkingDelta { thinking } => Some(Ok(self.chunk(
                    vec![Self::delta_choice(unified::Message {
                        reasoning_content: Some(thinking),
                        ..Default::default()
                    })],
                    None,
                ))),
                anthropic::BlockDelta::InputJsonDelta { partial_json } => {
                    let tool_index = self.tool_by_block.get(&index).copied()?;

                    Some(Ok(self.chunk(
                        vec![Self::delta_choice(unified::Message {
                            tool_calls: Some(vec![unified::ToolCall {
                                id: String::new(),
                                kind: String::new(),
                                function: unified::FunctionCall {
                                    name: String::new(),
                                    arguments: partial_json,
                                },
                                index: Some(tool_index),
                            }]),
                            ..Default::default()
                        })],
                        None,
                    )))
                }
                // Signature-only chunks are dropped; the unary path carries
                // signatures through the non-streaming conversion.
                anthropic::BlockDelta::SignatureDelta { .. } => None,
            },
            anthropic::StreamEvent::MessageDelta { delta, usage } => {
                let finish_reason = delta.stop_reason.as_deref().map(|reason| {
                    crate::messages::unified::from_anthropic::stop_reason_to_unified(
                        reason,
                        self.tool_counter > 0,
                    )
                });

                Some(Ok(self.chunk(
                    vec![unified::Choice {
                        index: 0,
                        delta: Some(unified::Message::default()),
                        finish_reason,
                        ..Default::default()
                    }],
                    usage.map(|usage| unified::Usage {
                        prompt_tokens: usage.input_tokens,
                        completion_tokens: usage.output_tokens,
                        total_tokens: usage.input_tokens + usage.output_tokens,
                        ..Default::default()
                    }),
                )))
            }
            anthropic::StreamEvent::MessageStop => Some(Ok(unified::Response::done())),
            anthropic::StreamEvent::ContentBlockStop { .. }
            | anthropic::StreamEvent::Ping
            | anthropic::StreamEvent::Unknown(_) => None,
            anthropic::StreamEvent::Error { error } => Some(Err(Error::UpstreamHttp {
                status: 502,
                kind: error.kind,
                message: error.message,
                code: None,
            })),
        }
    }
}

fn fold_anthropic_events(chunks: &[String]) -> unified::Response {
    let mut reader = EventReader::default();
    let mut aggregator = aggregate::StreamAggregator::new();

    for data in chunks {
        if sse::is_done(data) {
            continue;
        }

        let Ok(event) = sonic_rs::from_str::<anthropic::StreamEvent>(data) else {
            log::debug!("skipping invalid stream event");
            continue;
        };

        if let Some(Ok(chunk)) = reader.read(event) {
            aggregator.push_unified(chunk);
        }
    }

    aggregator.finish()
}

/// Provider-facing adapter for Anthropic upstreams.
pub struct OutboundAnthropic {
    config: ProviderConfig,
    key_provider: Arc<dyn ApiKeyProvider>,
}

impl OutboundAnthropic {
    /// Build an adapter over a validated configuration and key source.
    pub fn new(
        config: ProviderConfig,
        key_provider: Option<Arc<dyn ApiKeyProvider>>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::InvalidRequest(e.to_string()))?;

        let key_provider = match key_provider {
            Some(provider) => provider,
            None => Arc::new(StaticKeyProvider::new(super::openai::static_key(&config)?)),
        };

        Ok(Self { config, key_provider })
    }

    /// Replace the endpoint configuration. Rotation is serialized by the
    /// caller; the adapter takes no locks.
    pub fn set_config(&mut self, config: ProviderConfig) -> Result<()> {
        config
            .validate()
            .map_err(|e| Error::InvalidRequest(e.to_string()))?;
        self.config = config;
        Ok(())
    }

    /// Replace the API key with a static secret.
    pub fn set_api_key(&mut self, key: SecretString) {
        self.key_provider = Arc::new(StaticKeyProvider::new(key));
    }

    /// Replace the base URL.
    pub fn set_base_url(&mut self, base_url: String) {
        self.config.set_base_url(base_url);
    }

    fn endpoint(&self) -> String {
        let base = self.config.trimmed_base_url();

        if self.config.is_raw_url() {
            return base.to_string();
        }

        if base.ends_with("/v1") {
            format!("{base}/messages")
        } else {
            format!("{base}/v1/messages")
        }
    }
}

#[async_trait]
impl Outbound for OutboundAnthropic {
    fn api_format(&self) -> ApiFormat {
        ApiFormat::Anthropic
    }

    async fn transform_request(&self, request: unified::Request) -> Result<HttpRequest> {
        request.validate()?;

        if request.request_type != unified::RequestType::Chat {
            return Err(Error::InvalidRequest(format!(
                "request type {:?} is not supported by this upstream",
                request.request_type
            )));
        }

        let auth = AuthConfig {
            kind: AuthKind::Header("x-api-key".to_string()),
            key: self.key_provider.get().await?,
        };

        let wire = anthropic::MessagesRequest::from(request);
        let body = sonic_rs::to_vec(&wire)
            .map_err(|e| Error::Internal(Some(format!("request serialization failed: {e}"))))?;

        let mut headers = json_headers();
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));

        Ok(HttpRequest {
            method: Method::POST,
            url: self.endpoint(),
            headers,
            body,
            auth: Some(auth),
            request_type: unified::RequestType::Chat,
            api_format: ApiFormat::Anthropic,
            metadata: TransformerMetadata::default(),
        })
    }

    fn transform_response(&self, response: HttpResponse) -> Result<unified::Response> {
        let wire: anthropic::MessagesResponse = serde_json::from_slice(&response.body)
            .map_err(|e| Error::InvalidResponse(format!("unparseable upstream body: {e}")))?;

        Ok(unified::Response::from(wire))
    }

    fn transform_stream(&self, stream: EventStream) -> ResponseStream {
        stream
            .scan(EventReader::default(), |reader, event| {
                let item = match event {
                    Err(e) => Some(Some(Err(e))),
                    Ok(event) => match sonic_rs::from_str::<anthropic::StreamEvent>(&event.data) {
                        Ok(event) => Some(reader.read(event)),
                        Err(e) => {
                            log::warn!("skipping malformed upstream event: {e}");
                            Some(None)
                        }
                    },
                };

                futures::future::ready(item)
            })
            .filter_map(|item| async move { item })
            .boxed()
    }

    fn aggregate_stream_chunks(&self, chunks: &[String]) -> Result<(Vec<u8>, ResponseMeta)> {
        let response = fold_anthropic_events(chunks);
        let meta = ResponseMeta::of(&response);

        let body = serde_json::to_vec(&anthropic::MessagesResponse::from(response))
            .map_err(|e| Error::Internal(Some(format!("aggregate serialization failed: {e}"))))?;

        Ok((body, meta))
    }

    fn transform_error(&self, error: HttpError) -> Error {
        let status = error.status.as_u16();

        match serde_json::from_slice::<anthropic::ErrorResponse>(&error.body) {
            Ok(envelope) => Error::UpstreamHttp {
                status,
                kind: envelope.error.kind,
                message: envelope.error.message,
                code: None,
            },
            Err(_) => Error::UpstreamHttp {
                status,
                kind: "api_error".to_string(),
                message: String::from_utf8_lossy(&error.body).into_owned(),
                code: None,
            },
        }
    }
}
