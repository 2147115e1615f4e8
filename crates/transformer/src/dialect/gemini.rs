//! Gemini dialect adapters over the Generative Language, Vertex and
//! Cloudflare gateway platforms.

use std::sync::Arc;

use async_trait::async_trait;
use config::{PlatformType, ProviderConfig};
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
use crate::messages::unified::TransformerMetadata;
use crate::messages::unified::{from_gemini, to_gemini};
use crate::messages::{gemini, unified};
use crate::sse;

const DEFAULT_API_VERSION: &str = "v1beta";

const GENERATE: &str = "generateContent";
const STREAM_GENERATE: &str = "streamGenerateContent";

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

/// Caller-facing adapter for the Gemini dialect.
#[derive(Debug, Default, Clone, Copy)]
pub struct InboundGemini;

#[async_trait]
impl Inbound for InboundGemini {
    fn api_format(&self) -> ApiFormat {
        ApiFormat::Gemini
    }

    async fn transform_request(&self, mut raw: RawRequest) -> Result<unified::Request> {
        let (model, action) = parse_model_path(&raw.path)?;

        let wire: gemini::GenerateContentRequest = serde_json::from_slice(&raw.body)
            .map_err(|e| Error::InvalidRequest(format!("invalid request body: {e}")))?;

        let mut request = unified::Request::from(wire);
        request.model = model;
        request.stream = Some(action == STREAM_GENERATE).filter(|streaming| *streaming);

        // `alt=sse` is transport detail of this edge; it must not leak to a
        // backend speaking another shape.
        raw.strip_query_param("alt");
        request.raw_request = Some(Arc::new(raw));

        request.validate()?;

        Ok(request)
    }

    fn transform_response(&self, response: unified::Response) -> Result<HttpResponse> {
        let wire = to_gemini::response_to_gemini(response)?;
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
        // This dialect's SSE carries no terminal sentinel; the stream just
        // ends.
        stream
            .filter_map(|result| async move {
                match result {
                    Ok(response) if response.is_done() => None,
                    Ok(response) => match to_gemini::response_to_gemini(response) {
                        Ok(wire) => match sonic_rs::to_string(&wire) {
                            Ok(json) => Some(Ok(sse::data_frame(&json))),
                            Err(e) => {
                                log::error!("failed to serialize stream chunk: {e}");
                                None
                            }
                        },
                        Err(e) => Some(Err(e)),
                    },
                    Err(e) => Some(Err(e)),
                }
            })
            .boxed()
    }

    fn aggregate_stream_chunks(&self, chunks: &[String]) -> Result<(Vec<u8>, ResponseMeta)> {
        let response = fold_gemini_chunks(chunks);
        let meta = ResponseMeta::of(&response);

        let body = serde_json::to_vec(&to_gemini::response_to_gemini(response)?)
            .map_err(|e| Error::Internal(Some(format!("aggregate serialization failed: {e}"))))?;

        Ok((body, meta))
    }

    fn transform_error(&self, error: &Error) -> HttpResponse {
        let status = error.status_code();

        let envelope = gemini::ErrorResponse {
            error: gemini::ErrorDetails {
                code: i64::from(status.as_u16()),
                message: error.client_message(),
                status: google_status(error).to_string(),
            },
        };

        HttpResponse {
            status,
            headers: json_headers(),
            body: serde_json::to_vec(&envelope).unwrap_or_default(),
            metadata: TransformerMetadata::default(),
        }
    }
}

/// Extract `(model, action)` from `/{version}/models/{model}:{action}`.
fn parse_model_path(path: &str) -> Result<(String, String)> {
    let invalid = || Error::InvalidRequest(format!("unsupported endpoint: {path}"));

    let (_, rest) = path.split_once("/models/").ok_or_else(invalid)?;
    let (model, action) = rest.split_once(':').ok_or_else(invalid)?;

    if model.is_empty() || !matches!(action, GENERATE | STREAM_GENERATE) {
        return Err(invalid());
    }

    Ok((model.to_string(), action.to_string()))
}

/// The RPC status label this dialect uses for a taxonomy entry.
fn google_status(error: &Error) -> &str {
    match error {
        Error::UpstreamHttp { kind, .. } if !kind.is_empty() => kind,
        Error::InvalidRequest(_) => "INVALID_ARGUMENT",
        Error::InvalidModel(_) => "NOT_FOUND",
        Error::Transport(_) => "UNAVAILABLE",
        Error::Cancelled => "CANCELLED",
        _ => "INTERNAL",
    }
}

/// Fold this dialect's chunk payloads through the shared aggregator,
/// skipping unparseable entries.
fn fold_gemini_chunks(chunks: &[String]) -> unified::Response {
    let mut aggregator = aggregate::StreamAggregator::new();
    let mut tool_index = 0u32;

    for data in chunks {
        if sse::is_done(data) {
            continue;
        }

        let Ok(wire) = sonic_rs::from_str::<gemini::GenerateContentResponse>(data) else {
            log::debug!("skipping invalid stream chunk");
            continue;
        };

        let Ok(mut chunk) = from_gemini::chunk_to_unified(wire) else {
            continue;
        };

        assign_tool_call_indices(&mut chunk, &mut tool_index);
        aggregator.push_unified(chunk);
    }

    aggregator.finish()
}

/// Number tool calls across a stream. The wire shape carries no index, so a
/// monotonic counter is threaded through successive chunks.
fn assign_tool_call_indices(chunk: &mut unified::Response, tool_index: &mut u32) {
    for choice in &mut chunk.choices {
        let Some(delta) = choice.delta.as_mut() else {
            continue;
        };
        let Some(calls) = delta.tool_calls.as_mut() else {
            continue;
        };

        for call in calls {
            call.index = Some(*tool_index);
            *tool_index += 1;
        }
    }
}

/// Provider-facing adapter for Gemini upstreams.
pub struct OutboundGemini {
    config: ProviderConfig,
    key_provider: Arc<dyn ApiKeyProvider>,
}

impl OutboundGemini {
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

    fn endpoint(&self, model: &str, streaming: bool) -> String {
        let base = self.config.trimmed_base_url();

        if self.config.is_raw_url() {
            return base.to_string();
        }

        let action = if streaming { STREAM_GENERATE } else { GENERATE };
        let suffix = if streaming { "?alt=sse" } else { "" };

        match self.config.platform {
            PlatformType::Vertex => {
                format!("{base}/v1/publishers/google/models/{model}:{action}{suffix}")
            }
            // The gateway already encodes the version prefix.
            PlatformType::Cloudflare => {
                format!("{base}/publishers/google/models/{model}:{action}{suffix}")
            }
            _ => {
                let version = self
                    .config
                    .api_version
                    .as_deref()
                    .unwrap_or(DEFAULT_API_VERSION);
                format!("{base}/{version}/models/{model}:{action}{suffix}")
            }
        }
    }

    fn auth_kind(&self) -> AuthKind {
        match self.config.platform {
            // Vertex and gateways in front of it authenticate with OAuth
            // bearer tokens; the consumer-keyed API uses its own header.
            PlatformType::Vertex | PlatformType::Cloudflare => AuthKind::Bearer,
            _ => AuthKind::Header("x-goog-api-key".to_string()),
        }
    }
}

#[async_trait]
impl Outbound for OutboundGemini {
    fn api_format(&self) -> ApiFormat {
        ApiFormat::Gemini
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
            kind: self.auth_kind(),
            key: self.key_provider.get().await?,
        };

        let streaming = request.stream.unwrap_or(false);
        let url = self.endpoint(&request.model, streaming);

        let budgets = self.config.reasoning_effort_to_budget.as_ref();
        let wire = to_gemini::request_to_gemini(request, budgets)?;

        let body = sonic_rs::to_vec(&wire)
            .map_err(|e| Error::Internal(Some(format!("request serialization failed: {e}"))))?;

        let mut metadata = TransformerMetadata::default();
        metadata.set_outbound_format(GENERATE);

        Ok(HttpRequest {
            method: Method::POST,
            url,
            headers: json_headers(),
            body,
            auth: Some(auth),
            request_type: unified::RequestType::Chat,
            api_format: ApiFormat::Gemini,
            metadata,
        })
    }

    fn transform_response(&self, response: HttpResponse) -> Result<unified::Response> {
        let wire: gemini::GenerateContentResponse = serde_json::from_slice(&response.body)
            .map_err(|e| Error::InvalidResponse(format!("unparseable upstream body: {e}")))?;

        if wire.candidates.is_empty() {
            return Err(Error::InvalidResponse("upstream returned no candidates".into()));
        }

        Ok(from_gemini::response_to_unified(wire))
    }

    fn transform_stream(&self, stream: EventStream) -> ResponseStream {
        stream
            .scan(0u32, |tool_index, event| {
                let item: Option<Option<Result<unified::Response>>> = Some(match event {
                    Err(e) => Some(Err(e)),
                    Ok(event) if sse::is_done(&event.data) => Some(Ok(unified::Response::done())),
                    Ok(event) => match sonic_rs::from_str::<gemini::GenerateContentResponse>(&event.data) {
                        Ok(wire) => match from_gemini::chunk_to_unified(wire) {
                            Ok(mut chunk) => {
                                assign_tool_call_indices(&mut chunk, tool_index);
                                Some(Ok(chunk))
                            }
                            Err(e) => Some(Err(e)),
                        },
                        Err(e) => {
                            log::warn!("skipping malformed upstream chunk: {e}");
                            None
                        }
                    },
                });

                futures::future::ready(item)
            })
            .filter_map(|item| async move { item })
            .boxed()
    }

    fn aggregate_stream_chunks(&self, chunks: &[String]) -> Result<(Vec<u8>, ResponseMeta)> {
        let response = fold_gemini_chunks(chunks);
        let meta = ResponseMeta::of(&response);

        let body = serde_json::to_vec(&to_gemini::response_to_gemini(response)?)
            .map_err(|e| Error::Internal(Some(format!("aggregate serialization failed: {e}"))))?;

        Ok((body, meta))
    }

    fn transform_error(&self, error: HttpError) -> Error {
        let status = error.status.as_u16();

        match serde_json::from_slice::<gemini::ErrorResponse>(&error.body) {
            Ok(envelope) => Error::UpstreamHttp {
                status,
                kind: envelope.error.status,
                message: envelope.error.message,
                code: Some(envelope.error.code.to_string()),
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
