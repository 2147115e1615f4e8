//! Conversions from the unified model into Anthropic Messages wire shapes.

use serde_json::{Value, json};

use crate::messages::{anthropic, unified};
use crate::signature;

/// The API requires `max_tokens`; applied when the caller set no cap.
const DEFAULT_MAX_TOKENS: u32 = 4096;

impl From<unified::Request> for anthropic::MessagesRequest {
    fn from(req: unified::Request) -> Self {
        let mut system_blocks: Vec<anthropic::ContentBlock> = Vec::new();
        let mut messages: Vec<anthropic::AnthropicMessage> = Vec::new();

        for message in &req.messages {
            match &message.role {
                role if role.is_instruction() => {
                    if let Some(content) = &message.content {
                        system_blocks.push(anthropic::ContentBlock::Text {
                            text: content.to_text(),
                        });
                    }
                }
                unified::Role::Assistant => {
                    messages.push(anthropic::AnthropicMessage {
                        role: "assistant".to_string(),
                        content: anthropic::MessageContent::Blocks(assistant_blocks(message)),
                    });
                }
                unified::Role::Tool => {
                    messages.push(anthropic::AnthropicMessage {
                        role: "user".to_string(),
                        content: anthropic::MessageContent::Blocks(vec![
                            anthropic::ContentBlock::ToolResult {
                                tool_use_id: message.tool_call_id.clone().unwrap_or_default(),
                                content: message
                                    .content_text()
                                    .map(anthropic::MessageContent::Text),
                                is_error: None,
                            },
                        ]),
                    });
                }
                _ => {
                    messages.push(anthropic::AnthropicMessage {
                        role: "user".to_string(),
                        content: user_content(message),
                    });
                }
            }
        }

        // Function tools only; native tools of other vendors have no
        // representation here.
        let tools: Option<Vec<anthropic::AnthropicTool>> = req.tools.as_ref().map(|tools| {
            tools
                .iter()
                .filter_map(unified::Tool::as_function)
                .map(|function| anthropic::AnthropicTool {
                    name: function.name.clone(),
                    description: function.description.clone(),
                    input_schema: function
                        .parameters
                        .clone()
                        .unwrap_or_else(|| json!({"type": "object"})),
                })
                .collect()
        });
        let tools_emptied = tools.as_ref().is_some_and(Vec::is_empty);
        let tools = tools.filter(|tools| !tools.is_empty());

        let tool_choice = if tools_emptied {
            None
        } else {
            req.tool_choice.as_ref().map(|choice| match choice {
                unified::ToolChoice::Mode(unified::ToolChoiceMode::Auto) => {
                    anthropic::AnthropicToolChoice::Auto
                }
                unified::ToolChoice::Mode(unified::ToolChoiceMode::Required) => {
                    anthropic::AnthropicToolChoice::Any
                }
                unified::ToolChoice::Mode(unified::ToolChoiceMode::None) => {
                    anthropic::AnthropicToolChoice::None
                }
                unified::ToolChoice::Named { function, .. } => anthropic::AnthropicToolChoice::Tool {
                    name: function.name.clone(),
                },
            })
        };

        let thinking = req.reasoning_budget.map(|budget_tokens| {
            anthropic::Thinking::Enabled { budget_tokens }
        });

        let max_tokens = req.effective_max_tokens().unwrap_or(DEFAULT_MAX_TOKENS);

        Self {
            model: req.model,
            max_tokens,
            messages,
            system: (!system_blocks.is_empty()).then_some(anthropic::SystemPrompt::Blocks(system_blocks)),
            stop_sequences: req.stop.as_ref().map(unified::Stop::to_vec),
            stream: req.stream,
            temperature: req.temperature,
            top_p: req.top_p,
            top_k: None,
            tools,
            tool_choice,
            thinking,
        }
    }
}

fn user_content(message: &unified::Message) -> anthropic::MessageContent {
    match &message.content {
        Some(unified::MessageContent::Text(text)) => anthropic::MessageContent::Text(text.clone()),
        Some(unified::MessageContent::Parts(parts)) => anthropic::MessageContent::Blocks(
            parts.iter().map(content_part_to_block).collect(),
        ),
        None => anthropic::MessageContent::Text(String::new()),
    }
}

fn content_part_to_block(part: &unified::ContentPart) -> anthropic::ContentBlock {
    match part {
        unified::ContentPart::Text { text } => anthropic::ContentBlock::Text { text: text.clone() },
        unified::ContentPart::ImageUrl { image_url } => anthropic::ContentBlock::Image {
            source: media_source_from_url(&image_url.url),
        },
        unified::ContentPart::Document { source } => anthropic::ContentBlock::Document {
            source: match source {
                unified::DocumentSource::Base64 { media_type, data } => {
                    anthropic::MediaSource::Base64 {
                        media_type: media_type.clone(),
                        data: data.clone(),
                    }
                }
                unified::DocumentSource::Url { url } => anthropic::MediaSource::Url {
                    url: url.clone(),
                },
            },
        },
    }
}

fn media_source_from_url(url: &str) -> anthropic::MediaSource {
    if let Some(rest) = url.strip_prefix("data:")
        && let Some((header, data)) = rest.split_once(',')
    {
        let media_type = header.strip_suffix(";base64").unwrap_or(header);
        return anthropic::MediaSource::Base64 {
            media_type: media_type.to_string(),
            data: data.to_string(),
        };
    }

    anthropic::MediaSource::Url { url: url.to_string() }
}

/// Blocks for an assistant message: thinking first, then text, then tool use.
pub(crate) fn assistant_blocks(message: &unified::Message) -> Vec<anthropic::ContentBlock> {
    let mut blocks: Vec<anthropic::ContentBlock> = Vec::new();

    if let Some(redacted) = message
        .redacted_reasoning_content
        .as_deref()
        .filter(|tag| signature::ANTHROPIC.is_tag(tag))
        .and_then(|tag| signature::ANTHROPIC.decode(tag))
    {
        blocks.push(anthropic::ContentBlock::RedactedThinking { data: redacted });
    }

    if let Some(reasoning) = &message.reasoning_content
        && !reasoning.is_empty()
    {
        blocks.push(anthropic::ContentBlock::Thinking {
            thinking: reasoning.clone(),
            signature: message.reasoning_signature.clone().unwrap_or_default(),
        });
    }

    match &message.content {
        Some(unified::MessageContent::Text(text)) => {
            if !text.is_empty() {
                blocks.push(anthropic::ContentBlock::Text { text: text.clone() });
            }
        }
        Some(unified::MessageContent::Parts(parts)) => {
            for part in parts {
                blocks.push(content_part_to_block(part));
            }
        }
        None => {}
    }

    if let Some(calls) = &message.tool_calls {
        for call in calls {
            let input: Value =
                serde_json::from_str(&call.function.arguments).unwrap_or_else(|_| json!({}));

            blocks.push(anthropic::ContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.function.name.clone(),
                input,
            });
        }
    }

    blocks
}

impl From<unified::Response> for anthropic::MessagesResponse {
    fn from(resp: unified::Response) -> Self {
        let choice = resp.choices.into_iter().next().unwrap_or_default();
        let message = choice.message.or(choice.delta).unwrap_or_default();
        let has_tool_calls = message.tool_calls.is_some();
        let content = assistant_blocks(&message);

        Self {
            id: resp.id,
            kind: "message".to_string(),
            role: "assistant".to_string(),
            content,
            model: resp.model,
            stop_reason: choice
                .finish_reason
                .map(|reason| finish_reason_to_stop_reason(reason, has_tool_calls).to_string()),
            stop_sequence: None,
            usage: resp.usage.map(usage_to_anthropic).unwrap_or_default(),
        }
    }
}

pub(crate) fn finish_reason_to_stop_reason(
    reason: unified::FinishReason,
    has_tool_calls: bool,
) -> &'static str {
    match reason {
        unified::FinishReason::ToolCalls => anthropic::stop_reason::TOOL_USE,
        unified::FinishReason::Length => anthropic::stop_reason::MAX_TOKENS,
        unified::FinishReason::Stop | unified::FinishReason::ContentFilter => {
            if has_tool_calls {
                anthropic::stop_reason::TOOL_USE
            } else {
                anthropic::stop_reason::END_TURN
            }
        }
    }
}

pub(crate) fn usage_to_anthropic(usage: unified::Usage) -> anthropic::AnthropicUsage {
    anthropic::AnthropicUsage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        cache_read_input_tokens: usage
            .prompt_tokens_details
            .as_ref()
            .and_then(|details| details.cached_tokens),
        cache_creation_input_tokens: usage
            .prompt_tokens_details
            .as_ref()
            .and_then(|details| details.write_cached_tokens),
    }
}
