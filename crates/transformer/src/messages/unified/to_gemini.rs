//! Conversions from the unified model into Gemini wire shapes.
//!
//! Used on the outbound edge to address Gemini upstreams, and on the inbound
//! edge to answer Gemini-dialect callers.

use config::ReasoningBudgetTable;
use serde_json::{Value, json};

use crate::error::Error;
use crate::messages::{gemini, unified};
use crate::signature;

/// Documented thinking budget ceiling for current Gemini models.
pub(crate) const MAX_THINKING_BUDGET: u32 = 24576;

/// Placed on a function-call part when no signature was carried, because the
/// API rejects tool-call turns whose signature field is empty.
pub(crate) const SIGNATURE_SENTINEL: &str = "context_engineering_is_the_way_to_go";

/// Default effort label to thinking budget table. `minimal` is an alias for
/// `low`. Channels may override entries via configuration.
fn default_budget_for_effort(effort: &str) -> Option<u32> {
    match effort {
        "low" | "minimal" => Some(1024),
        "medium" => Some(8192),
        "high" => Some(24576),
        _ => None,
    }
}

/// Resolve the thinking configuration for an outbound request.
///
/// Precedence: an explicit `extra_body.google.thinking_config` wins outright;
/// otherwise an explicit budget (capped at the documented maximum); otherwise
/// the effort label through the channel table.
pub(crate) fn resolve_thinking_config(
    request: &unified::Request,
    budgets: Option<&ReasoningBudgetTable>,
) -> Option<gemini::ThinkingConfig> {
    if let Some(config) = request
        .extra_body
        .as_ref()
        .and_then(|body| body.get("google"))
        .and_then(|google| google.get("thinking_config"))
        .and_then(|config| serde_json::from_value(config.clone()).ok())
    {
        return Some(config);
    }

    let budget = request.reasoning_budget.or_else(|| {
        let effort = request.reasoning_effort.as_deref()?;
        budgets
            .and_then(|table| table.get(effort).copied())
            .or_else(|| default_budget_for_effort(effort))
    })?;

    Some(gemini::ThinkingConfig {
        include_thoughts: Some(true),
        thinking_budget: Some(budget.min(MAX_THINKING_BUDGET)),
    })
}

/// Serialize a unified request as a generateContent body.
pub(crate) fn request_to_gemini(
    request: unified::Request,
    budgets: Option<&ReasoningBudgetTable>,
) -> crate::Result<gemini::GenerateContentRequest> {
    let thinking_config = resolve_thinking_config(&request, budgets);

    let tools = request
        .tools
        .as_deref()
        .map(tools_to_gemini)
        .filter(|tools| !tools.is_empty());
    let tool_config = request.tool_choice.as_ref().map(tool_choice_to_gemini);

    let mut system_parts: Vec<gemini::Part> = Vec::new();
    let mut contents: Vec<gemini::Content> = Vec::new();

    for message in &request.messages {
        match &message.role {
            role if role.is_instruction() => {
                // One instruction part per source message, encounter order.
                if let Some(content) = &message.content {
                    system_parts.push(gemini::Part::text(content.to_text()));
                }
            }
            unified::Role::Assistant => {
                let parts = assistant_parts(message)?;
                if !parts.is_empty() {
                    contents.push(gemini::Content {
                        role: Some(gemini::GeminiRole::Model),
                        parts,
                    });
                }
            }
            unified::Role::Tool => {
                contents.push(gemini::Content {
                    role: Some(gemini::GeminiRole::User),
                    parts: vec![tool_result_part(message, &request.messages)],
                });
            }
            _ => {
                contents.push(gemini::Content {
                    role: Some(gemini::GeminiRole::User),
                    parts: user_parts(message)?,
                });
            }
        }
    }

    let generation_config = gemini::GenerationConfig {
        stop_sequences: request.stop.as_ref().map(unified::Stop::to_vec),
        max_output_tokens: request.effective_max_tokens(),
        temperature: request.temperature,
        top_p: request.top_p,
        presence_penalty: request.presence_penalty,
        frequency_penalty: request.frequency_penalty,
        seed: request.seed,
        response_modalities: request
            .modalities
            .as_ref()
            .map(|m| m.iter().map(|s| s.to_ascii_uppercase()).collect()),
        thinking_config,
        ..Default::default()
    };

    Ok(gemini::GenerateContentRequest {
        contents,
        system_instruction: (!system_parts.is_empty()).then_some(gemini::Content {
            role: None,
            parts: system_parts,
        }),
        tools,
        tool_config,
        generation_config: Some(generation_config),
        safety_settings: None,
        cached_content: None,
    })
}

/// Parts for a user message: text stays text, data URLs become inline blobs,
/// plain URLs become file references.
fn user_parts(message: &unified::Message) -> crate::Result<Vec<gemini::Part>> {
    let Some(content) = &message.content else {
        return Ok(Vec::new());
    };

    match content {
        unified::MessageContent::Text(text) => Ok(vec![gemini::Part::text(text.clone())]),
        unified::MessageContent::Parts(parts) => parts.iter().map(content_part_to_gemini).collect(),
    }
}

fn content_part_to_gemini(part: &unified::ContentPart) -> crate::Result<gemini::Part> {
    match part {
        unified::ContentPart::Text { text } => Ok(gemini::Part::text(text.clone())),
        unified::ContentPart::ImageUrl { image_url } => {
            if image_url.url.starts_with("data:") {
                let (mime_type, data) = parse_data_url(&image_url.url)?;
                Ok(gemini::Part {
                    inline_data: Some(gemini::Blob { mime_type, data }),
                    ..Default::default()
                })
            } else {
                Ok(gemini::Part {
                    file_data: Some(gemini::FileData {
                        mime_type: None,
                        file_uri: image_url.url.clone(),
                    }),
                    ..Default::default()
                })
            }
        }
        unified::ContentPart::Document { source } => match source {
            unified::DocumentSource::Base64 { media_type, data } => Ok(gemini::Part {
                inline_data: Some(gemini::Blob {
                    mime_type: media_type.clone(),
                    data: data.clone(),
                }),
                ..Default::default()
            }),
            unified::DocumentSource::Url { url } => Ok(gemini::Part {
                file_data: Some(gemini::FileData {
                    mime_type: None,
                    file_uri: url.clone(),
                }),
                ..Default::default()
            }),
        },
    }
}

/// Split a `data:` URL into MIME type and base64 payload.
pub(crate) fn parse_data_url(url: &str) -> crate::Result<(String, String)> {
    let invalid = || Error::InvalidRequest(format!("malformed data URL: {url:.32}"));

    let rest = url.strip_prefix("data:").ok_or_else(invalid)?;
    let (header, data) = rest.split_once(',').ok_or_else(invalid)?;
    let mime_type = header.strip_suffix(";base64").ok_or_else(invalid)?;

    if mime_type.is_empty() || data.is_empty() {
        return Err(invalid());
    }

    Ok((mime_type.to_string(), data.to_string()))
}

/// Parts for an assistant message, in the order the API expects: reasoning
/// first, then text, then function calls.
///
/// The carried signature is placed on the first function-call part, or on the
/// last part when the message has no function calls. A tool-call turn with no
/// carried signature gets the sentinel, because the field must not be empty.
pub(crate) fn assistant_parts(message: &unified::Message) -> crate::Result<Vec<gemini::Part>> {
    let mut parts: Vec<gemini::Part> = Vec::new();

    if let Some(reasoning) = &message.reasoning_content
        && !reasoning.is_empty()
    {
        parts.push(gemini::Part {
            text: Some(reasoning.clone()),
            thought: Some(true),
            ..Default::default()
        });
    }

    match &message.content {
        Some(unified::MessageContent::Text(text)) => {
            if !text.is_empty() {
                parts.push(gemini::Part::text(text.clone()));
            }
        }
        Some(unified::MessageContent::Parts(content_parts)) => {
            for part in content_parts {
                parts.push(content_part_to_gemini(part)?);
            }
        }
        None => {}
    }

    let signature = message
        .redacted_reasoning_content
        .as_deref()
        .filter(|tag| signature::GEMINI.is_tag(tag))
        .and_then(|tag| signature::GEMINI.decode(tag));

    let first_call = parts.len();
    if let Some(calls) = &message.tool_calls {
        for call in calls {
            let args: Value =
                serde_json::from_str(&call.function.arguments).unwrap_or_else(|_| json!({}));

            parts.push(gemini::Part {
                function_call: Some(gemini::FunctionCall {
                    name: call.function.name.clone(),
                    args,
                }),
                ..Default::default()
            });
        }

        if first_call < parts.len() {
            parts[first_call].thought_signature =
                Some(signature.unwrap_or_else(|| SIGNATURE_SENTINEL.to_string()));
        }
    } else if let Some(signature) = signature
        && let Some(last) = parts.last_mut()
    {
        last.thought_signature = Some(signature);
    }

    Ok(parts)
}

/// Emit a tool result as a user-role `functionResponse` part.
///
/// The function name comes from the message, or is recovered by scanning
/// earlier assistant calls for the matching id. The string result is parsed
/// as JSON; non-object payloads are wrapped so the API always receives an
/// object.
fn tool_result_part(message: &unified::Message, messages: &[unified::Message]) -> gemini::Part {
    let name = message
        .tool_call_name
        .clone()
        .or_else(|| {
            message
                .tool_call_id
                .as_deref()
                .and_then(|id| unified::recover_tool_call_name(messages, id))
        })
        .unwrap_or_else(|| {
            log::warn!("tool result has no resolvable function name");
            "unknown_function".to_string()
        });

    let raw = message.content_text().unwrap_or_default();

    let response = match serde_json::from_str::<Value>(&raw) {
        Ok(value) if value.is_object() => value,
        _ => json!({ "result": raw }),
    };

    gemini::Part {
        function_response: Some(gemini::FunctionResponse { name, response }),
        ..Default::default()
    }
}

fn tools_to_gemini(tools: &[unified::Tool]) -> Vec<gemini::GeminiTool> {
    let mut declarations: Vec<gemini::FunctionDeclaration> = Vec::new();
    let mut native = gemini::GeminiTool::default();
    let mut has_native = false;

    for tool in tools {
        match tool {
            unified::Tool::Function { function } => {
                declarations.push(gemini::FunctionDeclaration {
                    name: function.name.clone(),
                    description: function.description.clone(),
                    parameters: function.parameters.clone().map(strip_unsupported_schema_fields),
                });
            }
            unified::Tool::GoogleSearch { google_search } => {
                native.google_search = Some(google_search.clone());
                has_native = true;
            }
            unified::Tool::GoogleCodeExecution { google_code_execution } => {
                native.code_execution = Some(google_code_execution.clone());
                has_native = true;
            }
            unified::Tool::GoogleUrlContext { google_url_context } => {
                native.url_context = Some(google_url_context.clone());
                has_native = true;
            }
        }
    }

    let mut tools = Vec::new();

    if !declarations.is_empty() {
        tools.push(gemini::GeminiTool {
            function_declarations: Some(declarations),
            ..Default::default()
        });
    }

    if has_native {
        tools.push(native);
    }

    tools
}

/// Strip schema keys the API rejects, recursing through `properties` and
/// `items`. String `format` values other than the two supported ones are
/// dropped as well.
pub(crate) fn strip_unsupported_schema_fields(mut value: Value) -> Value {
    if let Some(obj) = value.as_object_mut() {
        obj.remove("additionalProperties");
        obj.remove("$schema");
        obj.remove("default");

        if obj.get("type").and_then(Value::as_str) == Some("string")
            && let Some(format) = obj.get("format").and_then(Value::as_str)
            && format != "enum"
            && format != "date-time"
        {
            obj.remove("format");
        }

        if let Some(properties) = obj.get_mut("properties").and_then(Value::as_object_mut) {
            for (_, prop) in properties.iter_mut() {
                *prop = strip_unsupported_schema_fields(prop.take());
            }
        }

        if let Some(items) = obj.get_mut("items") {
            *items = strip_unsupported_schema_fields(items.take());
        }
    }

    value
}

fn tool_choice_to_gemini(choice: &unified::ToolChoice) -> gemini::ToolConfig {
    let config = match choice {
        unified::ToolChoice::Mode(mode) => gemini::FunctionCallingConfig {
            mode: Some(match mode {
                unified::ToolChoiceMode::None => gemini::FunctionCallingMode::None,
                unified::ToolChoiceMode::Auto => gemini::FunctionCallingMode::Auto,
                unified::ToolChoiceMode::Required => gemini::FunctionCallingMode::Any,
            }),
            allowed_function_names: None,
        },
        unified::ToolChoice::Named { function, .. } => gemini::FunctionCallingConfig {
            mode: Some(gemini::FunctionCallingMode::Any),
            allowed_function_names: Some(vec![function.name.clone()]),
        },
    };

    gemini::ToolConfig {
        function_calling_config: Some(config),
    }
}

/// Serialize a unified response as a generateContent body, answering a
/// Gemini-dialect caller.
pub(crate) fn response_to_gemini(
    response: unified::Response,
) -> crate::Result<gemini::GenerateContentResponse> {
    let mut candidates = Vec::with_capacity(response.choices.len());

    for choice in response.choices {
        let message = choice.message.or(choice.delta).unwrap_or_default();
        let has_tool_calls = message.tool_calls.is_some();
        let parts = assistant_parts(&message)?;

        let grounding_metadata = choice
            .metadata
            .get(unified::TransformerMetadata::GEMINI_GROUNDING)
            .cloned();

        candidates.push(gemini::Candidate {
            content: Some(gemini::Content {
                role: Some(gemini::GeminiRole::Model),
                parts,
            }),
            finish_reason: choice
                .finish_reason
                .map(|reason| finish_reason_to_gemini(reason, has_tool_calls).to_string()),
            index: Some(choice.index),
            safety_ratings: None,
            grounding_metadata,
        });
    }

    Ok(gemini::GenerateContentResponse {
        candidates,
        usage_metadata: response.usage.map(usage_to_gemini),
        model_version: (!response.model.is_empty()).then_some(response.model),
        response_id: (!response.id.is_empty()).then_some(response.id),
    })
}

/// The dialect has no distinct tool-stop code; tool calls fall back to the
/// generic stop value.
fn finish_reason_to_gemini(reason: unified::FinishReason, _has_tool_calls: bool) -> &'static str {
    match reason {
        unified::FinishReason::Stop | unified::FinishReason::ToolCalls => gemini::finish::STOP,
        unified::FinishReason::Length => gemini::finish::MAX_TOKENS,
        unified::FinishReason::ContentFilter => gemini::finish::SAFETY,
    }
}

fn usage_to_gemini(usage: unified::Usage) -> gemini::UsageMetadata {
    let thoughts = usage
        .completion_tokens_details
        .as_ref()
        .and_then(|details| details.reasoning_tokens);

    gemini::UsageMetadata {
        prompt_token_count: usage.prompt_tokens,
        candidates_token_count: usage.completion_tokens - thoughts.unwrap_or(0).min(usage.completion_tokens),
        total_token_count: usage.total_tokens,
        thoughts_token_count: thoughts,
        cached_content_token_count: usage
            .prompt_tokens_details
            .as_ref()
            .and_then(|details| details.cached_tokens),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::messages::unified::{
        FunctionCall, Message, MessageContent, Request, Role, ToolCall,
    };

    fn tool_call(id: &str, name: &str) -> ToolCall {
        ToolCall {
            id: id.into(),
            kind: "function".into(),
            function: FunctionCall {
                name: name.into(),
                arguments: "{}".into(),
            },
            index: None,
        }
    }

    #[test]
    fn simple_chat_body() {
        let request = Request {
            model: "gemini-2.5-flash".into(),
            messages: vec![Message::text(Role::User, "Hello")],
            max_tokens: Some(1024),
            ..Default::default()
        };

        let body = request_to_gemini(request, None).unwrap();
        let value = serde_json::to_value(&body).unwrap();

        assert_eq!(
            value["contents"],
            json!([{"role": "user", "parts": [{"text": "Hello"}]}])
        );
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 1024);
    }

    #[test]
    fn effort_high_maps_to_max_budget() {
        let request = Request {
            model: "gemini-2.5-flash".into(),
            messages: vec![Message::text(Role::User, "hi")],
            reasoning_effort: Some("high".into()),
            ..Default::default()
        };

        let config = resolve_thinking_config(&request, None).unwrap();
        assert_eq!(config.include_thoughts, Some(true));
        assert_eq!(config.thinking_budget, Some(24576));
    }

    #[test]
    fn explicit_budget_is_capped() {
        let request = Request {
            reasoning_budget: Some(50000),
            ..Default::default()
        };

        let config = resolve_thinking_config(&request, None).unwrap();
        assert_eq!(config.thinking_budget, Some(24576));
    }

    #[test]
    fn extra_body_thinking_config_overrides_everything() {
        let request = Request {
            reasoning_budget: Some(50000),
            reasoning_effort: Some("low".into()),
            extra_body: Some(json!({
                "google": {"thinking_config": {"includeThoughts": false, "thinkingBudget": 0}}
            })),
            ..Default::default()
        };

        let config = resolve_thinking_config(&request, None).unwrap();
        assert_eq!(config.include_thoughts, Some(false));
        assert_eq!(config.thinking_budget, Some(0));
    }

    #[test]
    fn channel_table_overrides_default_efforts() {
        let mut table = ReasoningBudgetTable::new();
        table.insert("low".into(), 512);

        let request = Request {
            reasoning_effort: Some("low".into()),
            ..Default::default()
        };

        let config = resolve_thinking_config(&request, Some(&table)).unwrap();
        assert_eq!(config.thinking_budget, Some(512));
    }

    #[test]
    fn minimal_aliases_to_low() {
        let request = Request {
            reasoning_effort: Some("minimal".into()),
            ..Default::default()
        };

        let config = resolve_thinking_config(&request, None).unwrap();
        assert_eq!(config.thinking_budget, Some(1024));
    }

    #[test]
    fn tool_result_routes_as_user_function_response() {
        let request = Request {
            model: "gemini-2.5-flash".into(),
            messages: vec![
                Message::text(Role::User, "ask"),
                Message {
                    role: Role::Assistant,
                    tool_calls: Some(vec![tool_call("call_abc", "f")]),
                    ..Default::default()
                },
                Message {
                    role: Role::Tool,
                    content: Some(MessageContent::Text("{}".into())),
                    tool_call_id: Some("call_abc".into()),
                    tool_call_name: Some("f".into()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let body = request_to_gemini(request, None).unwrap();
        let value = serde_json::to_value(&body).unwrap();

        assert_eq!(value["contents"][2]["role"], "user");
        assert_eq!(
            value["contents"][2]["parts"][0]["functionResponse"]["name"],
            "f"
        );
    }

    #[test]
    fn tool_result_name_recovered_from_id_and_non_json_wrapped() {
        let request = Request {
            model: "gemini-2.5-flash".into(),
            messages: vec![
                Message {
                    role: Role::Assistant,
                    tool_calls: Some(vec![tool_call("call_1", "lookup")]),
                    ..Default::default()
                },
                Message {
                    role: Role::Tool,
                    content: Some(MessageContent::Text("plain words".into())),
                    tool_call_id: Some("call_1".into()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let body = request_to_gemini(request, None).unwrap();
        let value = serde_json::to_value(&body).unwrap();
        let response = &value["contents"][1]["parts"][0]["functionResponse"];

        assert_eq!(response["name"], "lookup");
        assert_eq!(response["response"], json!({"result": "plain words"}));
    }

    #[test]
    fn signature_placement_on_parallel_tool_calls() {
        let message = Message {
            role: Role::Assistant,
            tool_calls: Some(vec![tool_call("c1", "first"), tool_call("c2", "second")]),
            redacted_reasoning_content: Some(signature::GEMINI.encode("sigA")),
            ..Default::default()
        };

        let parts = assistant_parts(&message).unwrap();
        assert_eq!(parts[0].thought_signature.as_deref(), Some("sigA"));
        assert_eq!(parts[1].thought_signature, None);
    }

    #[test]
    fn sentinel_fills_missing_signature_on_tool_calls() {
        let message = Message {
            role: Role::Assistant,
            tool_calls: Some(vec![tool_call("c1", "f")]),
            ..Default::default()
        };

        let parts = assistant_parts(&message).unwrap();
        assert_eq!(parts[0].thought_signature.as_deref(), Some(SIGNATURE_SENTINEL));
    }

    #[test]
    fn signature_lands_on_last_part_without_tool_calls() {
        let message = Message {
            role: Role::Assistant,
            content: Some(MessageContent::Text("answer".into())),
            redacted_reasoning_content: Some(signature::GEMINI.encode("sigB")),
            ..Default::default()
        };

        let parts = assistant_parts(&message).unwrap();
        assert_eq!(parts.last().unwrap().thought_signature.as_deref(), Some("sigB"));
    }

    #[test]
    fn foreign_signatures_are_not_emitted() {
        let message = Message {
            role: Role::Assistant,
            content: Some(MessageContent::Text("answer".into())),
            redacted_reasoning_content: Some(signature::ANTHROPIC.encode("sig")),
            ..Default::default()
        };

        let parts = assistant_parts(&message).unwrap();
        assert_eq!(parts.last().unwrap().thought_signature, None);
    }

    #[test]
    fn data_urls_become_inline_blobs() {
        let request = Request {
            model: "gemini-2.5-flash".into(),
            messages: vec![Message {
                role: Role::User,
                content: Some(MessageContent::Parts(vec![
                    unified::ContentPart::Text { text: "look".into() },
                    unified::ContentPart::ImageUrl {
                        image_url: unified::ImageUrl {
                            url: "data:image/png;base64,AAAA".into(),
                            detail: None,
                        },
                    },
                    unified::ContentPart::ImageUrl {
                        image_url: unified::ImageUrl {
                            url: "https://example.com/cat.png".into(),
                            detail: None,
                        },
                    },
                ])),
                ..Default::default()
            }],
            ..Default::default()
        };

        let body = request_to_gemini(request, None).unwrap();
        let parts = &body.contents[0].parts;

        let blob = parts[1].inline_data.as_ref().unwrap();
        assert_eq!(blob.mime_type, "image/png");
        assert_eq!(blob.data, "AAAA");
        assert_eq!(
            parts[2].file_data.as_ref().unwrap().file_uri,
            "https://example.com/cat.png"
        );
    }

    #[test]
    fn malformed_data_url_is_invalid_request() {
        assert!(matches!(
            parse_data_url("data:image/png,no-marker"),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            parse_data_url("http://not-a-data-url"),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn schema_cleanup_strips_rejected_keys() {
        let cleaned = strip_unsupported_schema_fields(json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "when": {"type": "string", "format": "uri"},
                "stamp": {"type": "string", "format": "date-time"},
                "nested": {
                    "type": "array",
                    "items": {"type": "object", "additionalProperties": true}
                }
            }
        }));

        assert!(cleaned.get("$schema").is_none());
        assert!(cleaned.get("additionalProperties").is_none());
        assert!(cleaned["properties"]["when"].get("format").is_none());
        assert_eq!(cleaned["properties"]["stamp"]["format"], "date-time");
        assert!(cleaned["properties"]["nested"]["items"].get("additionalProperties").is_none());
    }

    #[test]
    fn system_and_developer_messages_fold_into_instruction() {
        let request = Request {
            model: "gemini-2.5-flash".into(),
            messages: vec![
                Message::text(Role::System, "be terse"),
                Message::text(Role::Developer, "be kind"),
                Message::text(Role::User, "hi"),
            ],
            ..Default::default()
        };

        let body = request_to_gemini(request, None).unwrap();
        let instruction = body.system_instruction.unwrap();

        assert_eq!(instruction.parts.len(), 2);
        assert_eq!(instruction.parts[0].text.as_deref(), Some("be terse"));
        assert_eq!(instruction.parts[1].text.as_deref(), Some("be kind"));
        assert_eq!(body.contents.len(), 1);
    }
}
