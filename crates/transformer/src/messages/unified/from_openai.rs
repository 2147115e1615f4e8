//! Conversions from OpenAI-family wire shapes into the unified model.
//!
//! Requests are parsed on the inbound edge; responses and chunks are parsed
//! when an OpenAI-compatible upstream answers. All data is moved, not cloned.

use crate::messages::{openai, unified};

impl From<openai::ChatCompletionRequest> for unified::Request {
    fn from(req: openai::ChatCompletionRequest) -> Self {
        let mut messages: Vec<unified::Message> =
            req.messages.into_iter().map(unified::Message::from).collect();

        repair_tool_correlation(&mut messages);

        Self {
            model: req.model,
            request_type: unified::RequestType::Chat,
            api_format: Some(unified::ApiFormat::Openai),
            stream: req.stream,
            messages,
            max_tokens: req.max_tokens,
            max_completion_tokens: req.max_completion_tokens,
            temperature: req.temperature,
            top_p: req.top_p,
            presence_penalty: req.presence_penalty,
            frequency_penalty: req.frequency_penalty,
            seed: req.seed,
            stop: req.stop,
            modalities: req.modalities,
            tools: req.tools,
            tool_choice: req.tool_choice,
            parallel_tool_calls: req.parallel_tool_calls,
            reasoning_effort: req.reasoning_effort,
            reasoning_budget: None,
            stream_options: req.stream_options,
            user: req.user,
            extra_body: req.extra_body,
            ..Default::default()
        }
    }
}

/// Fill in missing tool-result correlation fields.
///
/// Dialects that identify results by name leave `tool_call_id` empty, and
/// OpenAI callers routinely omit the function name on tool messages. Both
/// directions are recovered by scanning the preceding assistant calls in
/// reverse.
fn repair_tool_correlation(messages: &mut [unified::Message]) {
    for i in 0..messages.len() {
        if messages[i].role != unified::Role::Tool {
            continue;
        }

        if messages[i].tool_call_id.is_none()
            && let Some(name) = messages[i].tool_call_name.clone()
        {
            let recovered = unified::recover_tool_call_id(&messages[..i], &name);
            messages[i].tool_call_id = recovered;
        }

        if messages[i].tool_call_name.is_none()
            && let Some(id) = messages[i].tool_call_id.clone()
        {
            let recovered = unified::recover_tool_call_name(&messages[..i], &id);
            messages[i].tool_call_name = recovered;
        }
    }
}

impl From<openai::ChatMessage> for unified::Message {
    fn from(msg: openai::ChatMessage) -> Self {
        let tool_call_name = (msg.role == unified::Role::Tool).then(|| msg.name.clone()).flatten();

        Self {
            role: msg.role,
            content: msg.content,
            tool_calls: msg.tool_calls,
            tool_call_id: msg.tool_call_id,
            tool_call_name,
            reasoning_content: msg.reasoning_content,
            reasoning_signature: msg.reasoning_signature,
            redacted_reasoning_content: msg.redacted_reasoning_content,
            refusal: msg.refusal,
            annotations: msg.annotations,
        }
    }
}

impl From<openai::ChatCompletionResponse> for unified::Response {
    fn from(resp: openai::ChatCompletionResponse) -> Self {
        Self {
            id: resp.id,
            object: unified::ObjectType::ChatCompletion,
            model: resp.model,
            created: resp.created,
            system_fingerprint: resp.system_fingerprint,
            choices: resp
                .choices
                .into_iter()
                .map(|choice| unified::Choice {
                    index: choice.index,
                    message: Some(unified::Message::from(choice.message)),
                    delta: None,
                    finish_reason: choice
                        .finish_reason
                        .as_deref()
                        .map(unified::FinishReason::from_wire),
                    metadata: Default::default(),
                })
                .collect(),
            usage: resp.usage,
            ..Default::default()
        }
    }
}

impl From<openai::ChatDelta> for unified::Message {
    fn from(delta: openai::ChatDelta) -> Self {
        let tool_calls = delta.tool_calls.map(|calls| {
            calls
                .into_iter()
                .map(|call| unified::ToolCall {
                    id: call.id.unwrap_or_default(),
                    kind: call.kind.unwrap_or_else(unified::function_type),
                    function: unified::FunctionCall {
                        name: call.function.as_ref().and_then(|f| f.name.clone()).unwrap_or_default(),
                        arguments: call.function.and_then(|f| f.arguments).unwrap_or_default(),
                    },
                    index: Some(call.index),
                })
                .collect()
        });

        Self {
            role: delta.role.unwrap_or(unified::Role::Assistant),
            content: delta.content.map(unified::MessageContent::Text),
            tool_calls,
            reasoning_content: delta.reasoning_content,
            refusal: delta.refusal,
            annotations: delta.annotations,
            ..Default::default()
        }
    }
}

impl From<openai::ChatCompletionChunk> for unified::Response {
    fn from(chunk: openai::ChatCompletionChunk) -> Self {
        Self {
            id: chunk.id,
            object: unified::ObjectType::ChatCompletionChunk,
            model: chunk.model,
            created: chunk.created,
            system_fingerprint: chunk.system_fingerprint,
            choices: chunk
                .choices
                .into_iter()
                .map(|choice| unified::Choice {
                    index: choice.index,
                    message: choice.message.map(unified::Message::from),
                    delta: Some(unified::Message::from(choice.delta)),
                    finish_reason: choice
                        .finish_reason
                        .as_deref()
                        .map(unified::FinishReason::from_wire),
                    metadata: Default::default(),
                })
                .collect(),
            usage: chunk.usage,
            ..Default::default()
        }
    }
}

impl From<openai::EmbeddingsRequest> for unified::Request {
    fn from(req: openai::EmbeddingsRequest) -> Self {
        Self {
            model: req.model,
            request_type: unified::RequestType::Embedding,
            api_format: Some(unified::ApiFormat::Openai),
            embedding: Some(unified::EmbeddingRequest {
                input: req.input,
                encoding_format: req.encoding_format,
                dimensions: req.dimensions,
                user: req.user,
            }),
            ..Default::default()
        }
    }
}

impl From<openai::EmbeddingsResponse> for unified::Response {
    fn from(resp: openai::EmbeddingsResponse) -> Self {
        Self {
            model: resp.model,
            usage: resp.usage,
            embedding: Some(unified::EmbeddingResponse {
                data: resp
                    .data
                    .into_iter()
                    .map(|item| unified::EmbeddingData {
                        index: item.index,
                        embedding: item.embedding,
                    })
                    .collect(),
            }),
            ..Default::default()
        }
    }
}

impl From<openai::ImagesRequest> for unified::Request {
    fn from(req: openai::ImagesRequest) -> Self {
        Self {
            model: req.model.clone().unwrap_or_default(),
            request_type: unified::RequestType::Image,
            api_format: Some(unified::ApiFormat::Openai),
            image: Some(unified::ImageRequest {
                operation: unified::ImageOperation::Generation,
                prompt: Some(req.prompt),
                n: req.n,
                size: req.size,
                quality: req.quality,
                style: req.style,
                background: req.background,
                moderation: req.moderation,
                output_format: req.output_format,
                output_compression: req.output_compression,
                partial_images: req.partial_images,
                response_format: req.response_format,
                input_fidelity: req.input_fidelity,
                user: req.user,
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

impl From<openai::ImagesResponse> for unified::Response {
    fn from(resp: openai::ImagesResponse) -> Self {
        Self {
            created: resp.created,
            usage: resp.usage.clone(),
            image: Some(unified::ImageResponse {
                created: resp.created,
                data: resp
                    .data
                    .into_iter()
                    .map(|image| unified::ImageData {
                        b64_json: image.b64_json,
                        url: image.url,
                        revised_prompt: image.revised_prompt,
                    })
                    .collect(),
            }),
            ..Default::default()
        }
    }
}

impl From<openai::RerankRequest> for unified::Request {
    fn from(req: openai::RerankRequest) -> Self {
        Self {
            model: req.model,
            request_type: unified::RequestType::Rerank,
            api_format: Some(unified::ApiFormat::Openai),
            rerank: Some(unified::RerankRequest {
                query: req.query,
                documents: req.documents,
                top_n: req.top_n,
                return_documents: req.return_documents,
            }),
            ..Default::default()
        }
    }
}

impl From<openai::RerankResponse> for unified::Response {
    fn from(resp: openai::RerankResponse) -> Self {
        Self {
            usage: resp.usage.clone(),
            rerank: Some(unified::RerankResponse {
                results: resp
                    .results
                    .into_iter()
                    .map(|result| unified::RerankResult {
                        index: result.index,
                        relevance_score: result.relevance_score,
                        document: result.document.map(|d| d.text),
                    })
                    .collect(),
            }),
            ..Default::default()
        }
    }
}
