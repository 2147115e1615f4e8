//! Conversions from the unified model into OpenAI-family wire shapes.
//!
//! Used on the inbound edge to answer OpenAI-dialect callers, and on the
//! outbound edge to address OpenAI-compatible upstreams.

use crate::error::Error;
use crate::messages::{openai, unified};

impl From<unified::Request> for openai::ChatCompletionRequest {
    fn from(req: unified::Request) -> Self {
        // Provider-native tools have no representation here; drop them, and
        // clear the tool choice if nothing remains to choose from.
        let tools = req.tools.map(|tools| {
            tools
                .into_iter()
                .filter(|tool| tool.as_function().is_some())
                .collect::<Vec<_>>()
        });
        let tools_emptied = tools.as_ref().is_some_and(Vec::is_empty);
        let tools = tools.filter(|tools| !tools.is_empty());
        let tool_choice = if tools_emptied { None } else { req.tool_choice };

        Self {
            model: req.model,
            messages: req.messages.into_iter().map(openai::ChatMessage::from).collect(),
            max_tokens: req.max_tokens,
            max_completion_tokens: req.max_completion_tokens,
            temperature: req.temperature,
            top_p: req.top_p,
            presence_penalty: req.presence_penalty,
            frequency_penalty: req.frequency_penalty,
            seed: req.seed,
            stop: req.stop,
            stream: req.stream,
            stream_options: req.stream_options,
            modalities: req.modalities,
            tools,
            tool_choice,
            parallel_tool_calls: req.parallel_tool_calls,
            reasoning_effort: req.reasoning_effort,
            user: req.user,
            extra_body: None,
        }
    }
}

impl From<unified::Message> for openai::ChatMessage {
    fn from(msg: unified::Message) -> Self {
        let name = (msg.role == unified::Role::Tool)
            .then(|| msg.tool_call_name.clone())
            .flatten();

        Self {
            role: msg.role,
            content: msg.content.map(unified::MessageContent::collapsed),
            tool_calls: msg.tool_calls,
            tool_call_id: msg.tool_call_id,
            name,
            reasoning_content: msg.reasoning_content,
            reasoning_signature: msg.reasoning_signature,
            redacted_reasoning_content: msg.redacted_reasoning_content,
            refusal: msg.refusal,
            annotations: msg.annotations,
        }
    }
}

impl From<unified::Response> for openai::ChatCompletionResponse {
    fn from(resp: unified::Response) -> Self {
        Self {
            id: resp.id,
            object: "chat.completion".to_string(),
            created: resp.created,
            model: resp.model,
            system_fingerprint: resp.system_fingerprint,
            choices: resp
                .choices
                .into_iter()
                .map(|choice| openai::ChatChoice {
                    index: choice.index,
                    message: choice
                        .message
                        .or(choice.delta)
                        .map(openai::ChatMessage::from)
                        .unwrap_or_else(|| openai::ChatMessage::text(unified::Role::Assistant, "")),
                    finish_reason: choice.finish_reason.map(|r| r.as_str().to_string()),
                })
                .collect(),
            usage: resp.usage,
        }
    }
}

impl From<unified::Message> for openai::ChatDelta {
    fn from(msg: unified::Message) -> Self {
        let tool_calls = msg.tool_calls.map(|calls| {
            calls
                .into_iter()
                .enumerate()
                .map(|(position, call)| openai::DeltaToolCall {
                    index: call.index.unwrap_or(position as u32),
                    id: (!call.id.is_empty()).then_some(call.id),
                    kind: Some(call.kind),
                    function: Some(openai::DeltaFunction {
                        name: (!call.function.name.is_empty()).then_some(call.function.name),
                        arguments: Some(call.function.arguments),
                    }),
                })
                .collect()
        });

        Self {
            role: Some(msg.role),
            content: msg.content.map(|content| content.to_text()),
            reasoning_content: msg.reasoning_content,
            tool_calls,
            refusal: msg.refusal,
            annotations: msg.annotations,
        }
    }
}

impl From<unified::Response> for openai::ChatCompletionChunk {
    fn from(resp: unified::Response) -> Self {
        Self {
            id: resp.id,
            object: "chat.completion.chunk".to_string(),
            created: resp.created,
            model: resp.model,
            system_fingerprint: resp.system_fingerprint,
            choices: resp
                .choices
                .into_iter()
                .map(|choice| openai::ChunkChoice {
                    index: choice.index,
                    delta: choice
                        .delta
                        .or(choice.message)
                        .map(openai::ChatDelta::from)
                        .unwrap_or_default(),
                    message: None,
                    finish_reason: choice.finish_reason.map(|r| r.as_str().to_string()),
                })
                .collect(),
            usage: resp.usage,
        }
    }
}

impl TryFrom<unified::Request> for openai::EmbeddingsRequest {
    type Error = Error;

    fn try_from(req: unified::Request) -> Result<Self, Error> {
        let embedding = req
            .embedding
            .ok_or_else(|| Error::InvalidRequest("embedding input is required".into()))?;

        Ok(Self {
            model: req.model,
            input: embedding.input,
            encoding_format: embedding.encoding_format,
            dimensions: embedding.dimensions,
            user: embedding.user,
        })
    }
}

impl From<unified::Response> for openai::EmbeddingsResponse {
    fn from(resp: unified::Response) -> Self {
        Self {
            object: "list".to_string(),
            data: resp
                .embedding
                .map(|embedding| {
                    embedding
                        .data
                        .into_iter()
                        .map(|item| openai::EmbeddingObject {
                            object: "embedding".to_string(),
                            index: item.index,
                            embedding: item.embedding,
                        })
                        .collect()
                })
                .unwrap_or_default(),
            model: resp.model,
            usage: resp.usage,
        }
    }
}

impl TryFrom<unified::Request> for openai::ImagesRequest {
    type Error = Error;

    fn try_from(req: unified::Request) -> Result<Self, Error> {
        let image = req
            .image
            .ok_or_else(|| Error::InvalidRequest("image payload is required".into()))?;

        Ok(Self {
            prompt: image.prompt.unwrap_or_default(),
            model: (!req.model.is_empty()).then_some(req.model),
            n: image.n,
            size: image.size,
            quality: image.quality,
            style: image.style,
            background: image.background,
            moderation: image.moderation,
            output_format: image.output_format,
            output_compression: image.output_compression,
            partial_images: image.partial_images,
            response_format: image.response_format,
            input_fidelity: image.input_fidelity,
            user: image.user,
        })
    }
}

impl From<unified::Response> for openai::ImagesResponse {
    fn from(resp: unified::Response) -> Self {
        let created = resp.created;
        Self {
            created: resp.image.as_ref().map(|i| i.created).unwrap_or(created),
            data: resp
                .image
                .map(|image| {
                    image
                        .data
                        .into_iter()
                        .map(|item| openai::ImageObject {
                            b64_json: item.b64_json,
                            url: item.url,
                            revised_prompt: item.revised_prompt,
                        })
                        .collect()
                })
                .unwrap_or_default(),
            usage: resp.usage,
        }
    }
}

impl TryFrom<unified::Request> for openai::RerankRequest {
    type Error = Error;

    fn try_from(req: unified::Request) -> Result<Self, Error> {
        let rerank = req
            .rerank
            .ok_or_else(|| Error::InvalidRequest("rerank payload is required".into()))?;

        Ok(Self {
            model: req.model,
            query: rerank.query,
            documents: rerank.documents,
            top_n: rerank.top_n,
            return_documents: rerank.return_documents,
        })
    }
}

impl From<unified::Response> for openai::RerankResponse {
    fn from(resp: unified::Response) -> Self {
        Self {
            results: resp
                .rerank
                .map(|rerank| {
                    rerank
                        .results
                        .into_iter()
                        .map(|result| openai::RerankResultObject {
                            index: result.index,
                            relevance_score: result.relevance_score,
                            document: result.document.map(|text| openai::RerankDocument { text }),
                        })
                        .collect()
                })
                .unwrap_or_default(),
            usage: resp.usage,
        }
    }
}
