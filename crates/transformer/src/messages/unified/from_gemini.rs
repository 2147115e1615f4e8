//! Conversions from Gemini wire shapes into the unified model.
//!
//! Requests are parsed on the inbound edge for Gemini-dialect callers;
//! responses and stream chunks are parsed when a Gemini upstream answers.

use serde_json::Value;
use uuid::Uuid;

use crate::error::Error;
use crate::messages::{gemini, unified};
use crate::signature;

impl From<gemini::GenerateContentRequest> for unified::Request {
    fn from(req: gemini::GenerateContentRequest) -> Self {
        let mut messages = Vec::with_capacity(req.contents.len() + 1);

        // One system message per instruction part, in encounter order.
        if let Some(instruction) = req.system_instruction {
            for part in instruction.parts {
                if let Some(text) = part.text {
                    messages.push(unified::Message::text(unified::Role::System, text));
                }
            }
        }

        for content in req.contents {
            let converted = content_to_messages(content, &messages);
            messages.extend(converted);
        }

        let tools = req.tools.map(|tools| {
            tools.into_iter().flat_map(tool_to_unified).collect::<Vec<_>>()
        });

        let tool_choice = req.tool_config.and_then(|config| {
            let config = config.function_calling_config?;
            tool_choice_from_config(config)
        });

        let mut request = Self {
            request_type: unified::RequestType::Chat,
            api_format: Some(unified::ApiFormat::Gemini),
            messages,
            tools,
            tool_choice,
            ..Default::default()
        };

        if let Some(config) = req.generation_config {
            request.max_tokens = config.max_output_tokens;
            request.temperature = config.temperature;
            request.top_p = config.top_p;
            request.presence_penalty = config.presence_penalty;
            request.frequency_penalty = config.frequency_penalty;
            request.seed = config.seed;
            request.modalities = config
                .response_modalities
                .map(|m| m.into_iter().map(|s| s.to_ascii_lowercase()).collect());
            request.stop = config.stop_sequences.map(unified::Stop::Multiple);

            if let Some(thinking) = config.thinking_config {
                request.reasoning_budget = thinking.thinking_budget;
                request.reasoning_effort = thinking.thinking_budget.map(|budget| {
                    effort_label_for_budget(budget).to_string()
                });
            }
        }

        request
    }
}

/// Closest effort label for an observed thinking budget.
pub(crate) fn effort_label_for_budget(budget: u32) -> &'static str {
    match budget {
        0..=1024 => "low",
        1025..=16384 => "medium",
        _ => "high",
    }
}

fn tool_choice_from_config(config: gemini::FunctionCallingConfig) -> Option<unified::ToolChoice> {
    use gemini::FunctionCallingMode as Mode;

    match config.mode? {
        Mode::None => Some(unified::ToolChoice::Mode(unified::ToolChoiceMode::None)),
        Mode::Auto => Some(unified::ToolChoice::Mode(unified::ToolChoiceMode::Auto)),
        Mode::Any => {
            let name = config
                .allowed_function_names
                .and_then(|names| names.into_iter().next());

            Some(match name {
                Some(name) => unified::ToolChoice::Named {
                    kind: "function".to_string(),
                    function: unified::FunctionChoice { name },
                },
                None => unified::ToolChoice::Mode(unified::ToolChoiceMode::Required),
            })
        }
    }
}

fn tool_to_unified(tool: gemini::GeminiTool) -> Vec<unified::Tool> {
    let mut tools = Vec::new();

    if let Some(declarations) = tool.function_declarations {
        for declaration in declarations {
            tools.push(unified::Tool::Function {
                function: unified::FunctionDefinition {
                    name: declaration.name,
                    description: declaration.description,
                    parameters: declaration.parameters.map(lowercase_schema_types),
                    strict: None,
                },
            });
        }
    }

    if let Some(payload) = tool.google_search {
        tools.push(unified::Tool::GoogleSearch { google_search: payload });
    }

    if let Some(payload) = tool.code_execution {
        tools.push(unified::Tool::GoogleCodeExecution {
            google_code_execution: payload,
        });
    }

    if let Some(payload) = tool.url_context {
        tools.push(unified::Tool::GoogleUrlContext {
            google_url_context: payload,
        });
    }

    tools
}

/// Lowercase schema type names on ingress (`"STRING"` → `"string"`),
/// recursing through `properties` and `items`.
pub(crate) fn lowercase_schema_types(mut value: Value) -> Value {
    if let Some(obj) = value.as_object_mut() {
        if let Some(kind) = obj.get("type").and_then(Value::as_str) {
            let lowered = kind.to_ascii_lowercase();
            obj.insert("type".to_string(), Value::from(lowered));
        }

        if let Some(properties) = obj.get_mut("properties").and_then(Value::as_object_mut) {
            for (_, prop) in properties.iter_mut() {
                *prop = lowercase_schema_types(prop.take());
            }
        }

        if let Some(items) = obj.get_mut("items") {
            *items = lowercase_schema_types(items.take());
        }
    }

    value
}

/// Convert one turn into unified messages.
///
/// Function responses become `tool` messages routed by name, with the call id
/// recovered from the preceding synthesized assistant calls.
fn content_to_messages(
    content: gemini::Content,
    preceding: &[unified::Message],
) -> Vec<unified::Message> {
    let role = match content.role {
        Some(gemini::GeminiRole::Model) => unified::Role::Assistant,
        _ => unified::Role::User,
    };

    let mut messages = Vec::new();
    let mut message = assemble_message(role, content.parts);

    // Split function responses out into their own tool messages.
    if let Some(responses) = message.1.take() {
        for response in responses {
            let tool_call_id = unified::recover_tool_call_id(preceding, &response.name)
                .or_else(|| unified::recover_tool_call_id(&messages, &response.name));

            messages.push(unified::Message {
                role: unified::Role::Tool,
                content: Some(unified::MessageContent::Text(response.response.to_string())),
                tool_call_id,
                tool_call_name: Some(response.name),
                ..Default::default()
            });
        }
    }

    let built = message.0;
    let has_body = built.content.is_some()
        || built.tool_calls.is_some()
        || built.reasoning_content.is_some()
        || built.redacted_reasoning_content.is_some();

    if has_body {
        messages.insert(0, built);
    }

    messages
}

/// Assemble parts into a message plus any function responses found.
fn assemble_message(
    role: unified::Role,
    parts: Vec<gemini::Part>,
) -> (unified::Message, Option<Vec<gemini::FunctionResponse>>) {
    let mut text_parts: Vec<unified::ContentPart> = Vec::new();
    let mut reasoning: Vec<String> = Vec::new();
    let mut tool_calls: Vec<unified::ToolCall> = Vec::new();
    let mut responses: Vec<gemini::FunctionResponse> = Vec::new();
    let mut signature: Option<String> = None;
    let mut only_text = true;

    for part in parts {
        if let Some(sig) = part.thought_signature
            && signature.is_none()
            && !sig.is_empty()
        {
            signature = Some(signature::GEMINI.encode(&sig));
        }

        if let Some(text) = part.text {
            if part.thought == Some(true) {
                reasoning.push(text);
            } else {
                text_parts.push(unified::ContentPart::Text { text });
            }
            continue;
        }

        if let Some(call) = part.function_call {
            only_text = false;
            tool_calls.push(unified::ToolCall {
                id: format!("call_{}", Uuid::new_v4()),
                kind: "function".to_string(),
                function: unified::FunctionCall {
                    name: call.name,
                    arguments: call.args.to_string(),
                },
                index: None,
            });
            continue;
        }

        if let Some(blob) = part.inline_data {
            only_text = false;
            text_parts.push(unified::ContentPart::ImageUrl {
                image_url: unified::ImageUrl {
                    url: format!("data:{};base64,{}", blob.mime_type, blob.data),
                    detail: None,
                },
            });
            continue;
        }

        if let Some(file) = part.file_data {
            only_text = false;
            if file.mime_type.as_deref().is_some_and(|m| m.starts_with("image/")) {
                text_parts.push(unified::ContentPart::ImageUrl {
                    image_url: unified::ImageUrl {
                        url: file.file_uri,
                        detail: None,
                    },
                });
            } else {
                text_parts.push(unified::ContentPart::Document {
                    source: unified::DocumentSource::Url { url: file.file_uri },
                });
            }
            continue;
        }

        if let Some(response) = part.function_response {
            responses.push(response);
        }
    }

    // Multiple plain text parts with nothing else collapse to one string.
    let content = if text_parts.is_empty() {
        None
    } else if only_text {
        let text: String = text_parts
            .iter()
            .filter_map(|part| match part {
                unified::ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        Some(unified::MessageContent::Text(text))
    } else {
        Some(unified::MessageContent::Parts(text_parts))
    };

    let message = unified::Message {
        role,
        content,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        reasoning_content: (!reasoning.is_empty()).then(|| reasoning.concat()),
        redacted_reasoning_content: signature,
        ..Default::default()
    };

    (message, (!responses.is_empty()).then_some(responses))
}

/// Parse a unary response.
pub(crate) fn response_to_unified(
    response: gemini::GenerateContentResponse,
) -> unified::Response {
    convert_response(response, false)
}

/// Parse one stream chunk. A chunk without a `responseId` is semantically
/// empty and rejected.
pub(crate) fn chunk_to_unified(
    chunk: gemini::GenerateContentResponse,
) -> crate::Result<unified::Response> {
    if chunk.response_id.as_deref().is_none_or(str::is_empty) {
        return Err(Error::InvalidResponse(
            "stream chunk carries no responseId".into(),
        ));
    }

    Ok(convert_response(chunk, true))
}

fn convert_response(response: gemini::GenerateContentResponse, streaming: bool) -> unified::Response {
    let mut unified_response = unified::Response {
        id: response.response_id.unwrap_or_default(),
        object: if streaming {
            unified::ObjectType::ChatCompletionChunk
        } else {
            unified::ObjectType::ChatCompletion
        },
        model: response.model_version.unwrap_or_default(),
        usage: response.usage_metadata.map(usage_to_unified),
        ..Default::default()
    };

    let mut citations: Vec<String> = Vec::new();

    for (position, candidate) in response.candidates.into_iter().enumerate() {
        let index = candidate.index.unwrap_or(position as u32);

        let (message, _) = assemble_message(
            unified::Role::Assistant,
            candidate.content.map(|c| c.parts).unwrap_or_default(),
        );

        let has_tool_calls = message.tool_calls.is_some();
        let finish_reason = candidate
            .finish_reason
            .as_deref()
            .filter(|reason| !reason.is_empty())
            .map(|reason| finish_reason_to_unified(reason, has_tool_calls));

        let mut metadata = unified::TransformerMetadata::default();

        if let Some(grounding) = candidate.grounding_metadata {
            citations.extend(grounding_citation_urls(&grounding));
            metadata.insert(unified::TransformerMetadata::GEMINI_GROUNDING, grounding);
        }

        unified_response.choices.push(unified::Choice {
            index,
            message: (!streaming).then(|| message.clone()),
            delta: streaming.then_some(message),
            finish_reason,
            metadata,
        });
    }

    if !citations.is_empty() {
        unified_response.metadata.set_citations(citations);
    }

    unified_response
}

fn usage_to_unified(usage: gemini::UsageMetadata) -> unified::Usage {
    let thoughts = usage.thoughts_token_count.unwrap_or(0);

    unified::Usage {
        prompt_tokens: usage.prompt_token_count,
        completion_tokens: usage.candidates_token_count + thoughts,
        total_tokens: usage.total_token_count,
        prompt_tokens_details: usage.cached_content_token_count.map(|cached| {
            unified::PromptTokensDetails {
                cached_tokens: Some(cached),
                ..Default::default()
            }
        }),
        completion_tokens_details: usage.thoughts_token_count.map(|reasoning| {
            unified::CompletionTokensDetails {
                reasoning_tokens: Some(reasoning),
                ..Default::default()
            }
        }),
    }
}

/// Map a candidate finish reason. `STOP` with tool calls present means the
/// model stopped to call tools.
fn finish_reason_to_unified(reason: &str, has_tool_calls: bool) -> unified::FinishReason {
    match reason {
        gemini::finish::STOP if has_tool_calls => unified::FinishReason::ToolCalls,
        gemini::finish::STOP => unified::FinishReason::Stop,
        gemini::finish::MAX_TOKENS => unified::FinishReason::Length,
        gemini::finish::SAFETY | gemini::finish::RECITATION => unified::FinishReason::ContentFilter,
        _ => unified::FinishReason::Stop,
    }
}

/// Citation URLs from an opaque grounding record.
fn grounding_citation_urls(grounding: &Value) -> Vec<String> {
    grounding
        .get("groundingChunks")
        .and_then(Value::as_array)
        .map(|chunks| {
            chunks
                .iter()
                .filter_map(|chunk| chunk.get("web")?.get("uri")?.as_str())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::messages::unified::{FinishReason, Role};

    fn parse_response(value: Value) -> gemini::GenerateContentResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn thought_parts_populate_reasoning_content() {
        let response = parse_response(json!({
            "responseId": "r-1",
            "modelVersion": "gemini-2.5-flash",
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"text": "thinking it over", "thought": true},
                        {"text": "Hello"},
                        {"text": ", world!"}
                    ]
                },
                "finishReason": "STOP"
            }]
        }));

        let unified = response_to_unified(response);
        let message = unified.choices[0].message.as_ref().unwrap();

        assert_eq!(message.reasoning_content.as_deref(), Some("thinking it over"));
        assert_eq!(message.content_text().as_deref(), Some("Hello, world!"));
        assert_eq!(unified.choices[0].finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn signature_is_wrapped_and_tool_calls_ordered() {
        let response = parse_response(json!({
            "responseId": "r-2",
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"functionCall": {"name": "first", "args": {"a": 1}},
                         "thoughtSignature": "sigA"},
                        {"functionCall": {"name": "second", "args": {}}}
                    ]
                },
                "finishReason": "STOP"
            }]
        }));

        let unified = response_to_unified(response);
        let message = unified.choices[0].message.as_ref().unwrap();
        let calls = message.tool_calls.as_ref().unwrap();

        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].function.name, "first");
        assert_eq!(calls[1].function.name, "second");

        let wrapped = message.redacted_reasoning_content.as_deref().unwrap();
        assert!(signature::GEMINI.is_tag(wrapped));
        assert_eq!(signature::GEMINI.decode(wrapped).as_deref(), Some("sigA"));

        // STOP plus function calls means the model stopped to call tools.
        assert_eq!(unified.choices[0].finish_reason, Some(FinishReason::ToolCalls));
    }

    #[test]
    fn chunk_without_response_id_is_invalid() {
        let chunk = parse_response(json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "x"}]}}]
        }));

        assert!(matches!(
            chunk_to_unified(chunk),
            Err(Error::InvalidResponse(_))
        ));
    }

    #[test]
    fn grounding_metadata_is_preserved_and_cited() {
        let response = parse_response(json!({
            "responseId": "r-3",
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "grounded"}]},
                "finishReason": "STOP",
                "groundingMetadata": {
                    "groundingChunks": [
                        {"web": {"uri": "https://b.example", "title": "B"}},
                        {"web": {"uri": "https://a.example", "title": "A"}},
                        {"web": {"uri": "https://b.example", "title": "B"}}
                    ]
                }
            }]
        }));

        let unified = response_to_unified(response);
        assert!(unified.choices[0]
            .metadata
            .get(unified::TransformerMetadata::GEMINI_GROUNDING)
            .is_some());
        assert_eq!(
            unified.metadata.citations().unwrap(),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn inbound_request_folds_instructions_and_recovers_tool_ids() {
        let request: gemini::GenerateContentRequest = serde_json::from_value(json!({
            "systemInstruction": {"parts": [{"text": "be terse"}, {"text": "be kind"}]},
            "contents": [
                {"role": "user", "parts": [{"text": "ask"}]},
                {"role": "model", "parts": [{"functionCall": {"name": "f", "args": {}}}]},
                {"role": "user", "parts": [{"functionResponse": {
                    "name": "f", "response": {"result": "ok"}
                }}]}
            ],
            "generationConfig": {
                "maxOutputTokens": 1024,
                "thinkingConfig": {"thinkingBudget": 24576}
            }
        }))
        .unwrap();

        let unified = unified::Request::from(request);

        assert_eq!(unified.messages[0].role, Role::System);
        assert_eq!(unified.messages[1].role, Role::System);
        assert_eq!(unified.max_tokens, Some(1024));
        assert_eq!(unified.reasoning_budget, Some(24576));
        assert_eq!(unified.reasoning_effort.as_deref(), Some("high"));

        let assistant = &unified.messages[3];
        let call_id = assistant.tool_calls.as_ref().unwrap()[0].id.clone();
        assert!(call_id.starts_with("call_"));

        let tool = &unified.messages[4];
        assert_eq!(tool.role, Role::Tool);
        assert_eq!(tool.tool_call_name.as_deref(), Some("f"));
        assert_eq!(tool.tool_call_id.as_deref(), Some(call_id.as_str()));
    }

    #[test]
    fn uppercase_schema_types_are_lowered() {
        let schema = lowercase_schema_types(json!({
            "type": "OBJECT",
            "properties": {
                "name": {"type": "STRING"},
                "tags": {"type": "ARRAY", "items": {"type": "STRING"}}
            }
        }));

        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["name"]["type"], "string");
        assert_eq!(schema["properties"]["tags"]["items"]["type"], "string");
    }
}
