//! Conversions from Anthropic Messages wire shapes into the unified model.

use crate::messages::{anthropic, unified};
use crate::signature;

impl From<anthropic::MessagesRequest> for unified::Request {
    fn from(req: anthropic::MessagesRequest) -> Self {
        let mut messages = Vec::with_capacity(req.messages.len() + 1);

        if let Some(system) = req.system {
            match system {
                anthropic::SystemPrompt::Text(text) => {
                    messages.push(unified::Message::text(unified::Role::System, text));
                }
                anthropic::SystemPrompt::Blocks(blocks) => {
                    for block in blocks {
                        if let anthropic::ContentBlock::Text { text } = block {
                            messages.push(unified::Message::text(unified::Role::System, text));
                        }
                    }
                }
            }
        }

        for message in req.messages {
            messages.extend(message_to_unified(message));
        }

        let tools = req.tools.map(|tools| {
            tools
                .into_iter()
                .map(|tool| unified::Tool::Function {
                    function: unified::FunctionDefinition {
                        name: tool.name,
                        description: tool.description,
                        parameters: Some(tool.input_schema),
                        strict: None,
                    },
                })
                .collect()
        });

        let tool_choice = req.tool_choice.map(|choice| match choice {
            anthropic::AnthropicToolChoice::Auto => {
                unified::ToolChoice::Mode(unified::ToolChoiceMode::Auto)
            }
            anthropic::AnthropicToolChoice::Any => {
                unified::ToolChoice::Mode(unified::ToolChoiceMode::Required)
            }
            anthropic::AnthropicToolChoice::None => {
                unified::ToolChoice::Mode(unified::ToolChoiceMode::None)
            }
            anthropic::AnthropicToolChoice::Tool { name } => unified::ToolChoice::Named {
                kind: "function".to_string(),
                function: unified::FunctionChoice { name },
            },
        });

        let reasoning_budget = req.thinking.and_then(|thinking| match thinking {
            anthropic::Thinking::Enabled { budget_tokens } => Some(budget_tokens),
            anthropic::Thinking::Disabled => None,
        });

        Self {
            model: req.model,
            request_type: unified::RequestType::Chat,
            api_format: Some(unified::ApiFormat::Anthropic),
            stream: req.stream,
            messages,
            max_tokens: Some(req.max_tokens),
            temperature: req.temperature,
            top_p: req.top_p,
            stop: req.stop_sequences.map(unified::Stop::Multiple),
            tools,
            tool_choice,
            reasoning_budget,
            ..Default::default()
        }
    }
}

/// Flatten one wire message. Tool results embedded in user messages become
/// their own `tool`-role messages, preserving order.
fn message_to_unified(message: anthropic::AnthropicMessage) -> Vec<unified::Message> {
    let role = match message.role.as_str() {
        "assistant" => unified::Role::Assistant,
        _ => unified::Role::User,
    };

    let blocks = match message.content {
        anthropic::MessageContent::Text(text) => {
            return vec![unified::Message::text(role, text)];
        }
        anthropic::MessageContent::Blocks(blocks) => blocks,
    };

    let mut messages = Vec::new();
    let mut parts: Vec<unified::ContentPart> = Vec::new();
    let mut tool_calls: Vec<unified::ToolCall> = Vec::new();
    let mut reasoning: Option<String> = None;
    let mut reasoning_signature: Option<String> = None;
    let mut redacted: Option<String> = None;

    for block in blocks {
        match block {
            anthropic::ContentBlock::Text { text } => {
                parts.push(unified::ContentPart::Text { text });
            }
            anthropic::ContentBlock::Image { source } => {
                parts.push(unified::ContentPart::ImageUrl {
                    image_url: unified::ImageUrl {
                        url: media_source_url(&source),
                        detail: None,
                    },
                });
            }
            anthropic::ContentBlock::Document { source } => {
                let part = match source {
                    anthropic::MediaSource::Base64 { media_type, data } => {
                        unified::ContentPart::Document {
                            source: unified::DocumentSource::Base64 { media_type, data },
                        }
                    }
                    anthropic::MediaSource::Url { url } => unified::ContentPart::Document {
                        source: unified::DocumentSource::Url { url },
                    },
                };
                parts.push(part);
            }
            anthropic::ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(unified::ToolCall {
                    id,
                    kind: "function".to_string(),
                    function: unified::FunctionCall {
                        name,
                        arguments: input.to_string(),
                    },
                    index: None,
                });
            }
            anthropic::ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error: _,
            } => {
                let text = content.map(|content| match content {
                    anthropic::MessageContent::Text(text) => text,
                    anthropic::MessageContent::Blocks(blocks) => blocks
                        .into_iter()
                        .filter_map(|block| match block {
                            anthropic::ContentBlock::Text { text } => Some(text),
                            _ => None,
                        })
                        .collect(),
                });

                messages.push(unified::Message {
                    role: unified::Role::Tool,
                    content: text.map(unified::MessageContent::Text),
                    tool_call_id: Some(tool_use_id),
                    ..Default::default()
                });
            }
            anthropic::ContentBlock::Thinking { thinking, signature } => {
                reasoning = Some(match reasoning.take() {
                    Some(existing) => existing + &thinking,
                    None => thinking,
                });
                if !signature.is_empty() {
                    reasoning_signature = Some(signature);
                }
            }
            anthropic::ContentBlock::RedactedThinking { data } => {
                redacted = Some(signature::ANTHROPIC.encode(&data));
            }
        }
    }

    let has_body = !parts.is_empty()
        || !tool_calls.is_empty()
        || reasoning.is_some()
        || redacted.is_some();

    if has_body {
        let content = (!parts.is_empty())
            .then(|| unified::MessageContent::Parts(parts).collapsed());

        messages.insert(
            0,
            unified::Message {
                role,
                content,
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                reasoning_content: reasoning,
                reasoning_signature,
                redacted_reasoning_content: redacted,
                ..Default::default()
            },
        );
    }

    messages
}

fn media_source_url(source: &anthropic::MediaSource) -> String {
    match source {
        anthropic::MediaSource::Base64 { media_type, data } => {
            format!("data:{media_type};base64,{data}")
        }
        anthropic::MediaSource::Url { url } => url.clone(),
    }
}

impl From<anthropic::MessagesResponse> for unified::Response {
    fn from(resp: anthropic::MessagesResponse) -> Self {
        let usage = usage_to_unified(&resp.usage);

        let message = message_to_unified(anthropic::AnthropicMessage {
            role: "assistant".to_string(),
            content: anthropic::MessageContent::Blocks(resp.content),
        })
        .into_iter()
        .next()
        .unwrap_or_default();

        let has_tool_calls = message.tool_calls.is_some();

        Self {
            id: resp.id,
            object: unified::ObjectType::ChatCompletion,
            model: resp.model,
            choices: vec![unified::Choice {
                index: 0,
                message: Some(message),
                delta: None,
                finish_reason: resp
                    .stop_reason
                    .as_deref()
                    .map(|reason| stop_reason_to_unified(reason, has_tool_calls)),
                metadata: Default::default(),
            }],
            usage: Some(usage),
            ..Default::default()
        }
    }
}

fn usage_to_unified(usage: &anthropic::AnthropicUsage) -> unified::Usage {
    unified::Usage {
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
        total_tokens: usage.input_tokens + usage.output_tokens,
        prompt_tokens_details: (usage.cache_read_input_tokens.is_some()
            || usage.cache_creation_input_tokens.is_some())
        .then(|| unified::PromptTokensDetails {
            cached_tokens: usage.cache_read_input_tokens,
            write_cached_tokens: usage.cache_creation_input_tokens,
            ..Default::default()
        }),
        completion_tokens_details: None,
    }
}

pub(crate) fn stop_reason_to_unified(reason: &str, has_tool_calls: bool) -> unified::FinishReason {
    match reason {
        anthropic::stop_reason::TOOL_USE => unified::FinishReason::ToolCalls,
        anthropic::stop_reason::MAX_TOKENS => unified::FinishReason::Length,
        anthropic::stop_reason::END_TURN | anthropic::stop_reason::STOP_SEQUENCE => {
            if has_tool_calls {
                unified::FinishReason::ToolCalls
            } else {
                unified::FinishReason::Stop
            }
        }
        _ => unified::FinishReason::Stop,
    }
}
