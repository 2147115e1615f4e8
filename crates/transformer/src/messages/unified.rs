//! Dialect-agnostic request and response model.
//!
//! Every inbound adapter parses its wire shape into these types; every
//! outbound adapter serializes them into the upstream's wire shape. The types
//! deliberately model the union of the supported dialects so that a request
//! entering in one dialect and leaving in another loses nothing observable:
//!
//! - Content is either a plain string or an ordered list of typed parts.
//! - "One of N shapes" wire values ([`Stop`], [`ToolChoice`],
//!   [`EmbeddingInput`], [`MessageContent`]) are tagged unions with untagged
//!   serde codecs that try shapes in a documented order.
//! - Vendor data the model cannot represent rides in a
//!   [`TransformerMetadata`] side-channel bag, preserved verbatim by every
//!   adapter that is not its consumer.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http::RawRequest;

pub(crate) mod from_anthropic;
pub(crate) mod from_gemini;
pub(crate) mod from_openai;
pub(crate) mod to_anthropic;
pub(crate) mod to_gemini;
pub(crate) mod to_openai;

/// Identifies a wire dialect.
///
/// The tag travels with the unified request so downstream code can tell which
/// shape the caller originally spoke, independent of the upstream dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiFormat {
    /// OpenAI Chat Completions family (chat, embeddings, images, rerank).
    Openai,
    /// Google Gemini generateContent family.
    Gemini,
    /// Anthropic Messages family.
    Anthropic,
}

impl ApiFormat {
    /// Stable string tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Gemini => "gemini",
            Self::Anthropic => "anthropic",
        }
    }
}

impl std::fmt::Display for ApiFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The modality of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    /// Chat completion.
    #[default]
    Chat,
    /// Embedding generation.
    Embedding,
    /// Image generation, edit or variation.
    Image,
    /// Document reranking.
    Rerank,
}

/// Unified inference request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Request {
    /// Model identifier, as the caller sent it.
    pub model: String,

    /// The modality of the request.
    #[serde(default)]
    pub request_type: RequestType,

    /// The dialect the caller spoke. Preserved for debugging and for
    /// adapters that need to know the original shape.
    pub api_format: Option<ApiFormat>,

    /// Whether the caller asked for a streamed response.
    pub stream: Option<bool>,

    /// Conversation messages, in caller order. Empty only for embedding and
    /// image requests.
    #[serde(default)]
    pub messages: Vec<Message>,

    /// Completion token cap (legacy field name).
    pub max_tokens: Option<u32>,

    /// Completion token cap (current field name; wins over `max_tokens` when
    /// both are present).
    pub max_completion_tokens: Option<u32>,

    /// Sampling temperature.
    pub temperature: Option<f32>,

    /// Nucleus sampling cutoff.
    pub top_p: Option<f32>,

    /// Presence penalty.
    pub presence_penalty: Option<f32>,

    /// Frequency penalty.
    pub frequency_penalty: Option<f32>,

    /// Sampling seed.
    pub seed: Option<i64>,

    /// Stop sequences; single string or ordered list, exactly as sent.
    pub stop: Option<Stop>,

    /// Requested output modalities, e.g. `["text", "audio"]`.
    pub modalities: Option<Vec<String>>,

    /// Available tools, in caller order.
    pub tools: Option<Vec<Tool>>,

    /// How the model should select tools.
    pub tool_choice: Option<ToolChoice>,

    /// Whether parallel tool calls are allowed.
    pub parallel_tool_calls: Option<bool>,

    /// Reasoning effort label: `low`/`medium`/`high` plus dialect synonyms
    /// such as `minimal`, carried verbatim.
    pub reasoning_effort: Option<String>,

    /// Explicit reasoning token budget; wins over the effort label.
    pub reasoning_budget: Option<u32>,

    /// Streaming options, e.g. whether the final chunk carries usage.
    pub stream_options: Option<StreamOptions>,

    /// End-user identifier for abuse tracking.
    pub user: Option<String>,

    /// Provider-specific escape hatch, preserved opaquely and parsed only by
    /// adapters that understand it.
    pub extra_body: Option<Value>,

    /// Embedding payload; present iff `request_type` is `Embedding`.
    pub embedding: Option<EmbeddingRequest>,

    /// Image payload; present iff `request_type` is `Image`.
    pub image: Option<ImageRequest>,

    /// Rerank payload; present iff `request_type` is `Rerank`.
    pub rerank: Option<RerankRequest>,

    /// Back-reference to the origin HTTP envelope, shared for the duration
    /// of the outbound pipeline.
    #[serde(skip)]
    pub raw_request: Option<Arc<RawRequest>>,
}

impl Request {
    /// Effective completion token cap: `max_completion_tokens` wins.
    pub fn effective_max_tokens(&self) -> Option<u32> {
        self.max_completion_tokens.or(self.max_tokens)
    }

    /// Validate the invariants that must hold before any I/O.
    pub fn validate(&self) -> crate::Result<()> {
        if self.model.is_empty() {
            return Err(crate::Error::InvalidModel("model is required".into()));
        }

        match self.request_type {
            RequestType::Chat => {
                if self.messages.is_empty() {
                    return Err(crate::Error::InvalidRequest(
                        "messages must not be empty".into(),
                    ));
                }
            }
            RequestType::Embedding => {
                let embedding = self.embedding.as_ref().ok_or_else(|| {
                    crate::Error::InvalidRequest("embedding input is required".into())
                })?;
                embedding.input.validate()?;
            }
            RequestType::Image => {
                if let Some(image) = &self.image {
                    image.validate()?;
                }
            }
            RequestType::Rerank => {
                let rerank = self.rerank.as_ref().ok_or_else(|| {
                    crate::Error::InvalidRequest("rerank payload is required".into())
                })?;
                if rerank.query.is_empty() || rerank.documents.is_empty() {
                    return Err(crate::Error::InvalidRequest(
                        "rerank requires a query and at least one document".into(),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Streaming options carried through from OpenAI-shaped callers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamOptions {
    /// Emit a final chunk carrying usage counters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_usage: Option<bool>,
}

/// Message sender role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// Developer instructions (treated as system by dialects without the role).
    Developer,
    /// End-user input.
    User,
    /// Model output.
    Assistant,
    /// Tool execution result.
    Tool,
    /// A role this gateway does not model; carried verbatim.
    #[serde(untagged)]
    Other(String),
}

impl Role {
    /// Whether this role carries instructions rather than conversation.
    pub fn is_instruction(&self) -> bool {
        matches!(self, Role::System | Role::Developer)
    }
}

/// One conversation message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Sender role.
    pub role: Role,

    /// Message content: plain string or ordered typed parts. Absent for
    /// assistant messages that carry only tool calls.
    pub content: Option<MessageContent>,

    /// Tool calls issued by the assistant, in emission order.
    pub tool_calls: Option<Vec<ToolCall>>,

    /// On `role = tool`: the call this result answers. When a dialect
    /// identifies results by name only, the inbound adapter recovers the id
    /// by scanning earlier assistant calls (see
    /// [`recover_tool_call_id`]).
    pub tool_call_id: Option<String>,

    /// On `role = tool`: the function name, for dialects that route results
    /// by name.
    pub tool_call_name: Option<String>,

    /// Model reasoning text, when the provider exposes it.
    pub reasoning_content: Option<String>,

    /// Dialect-opaque reasoning tag that must round-trip unchanged.
    pub reasoning_signature: Option<String>,

    /// Provider-signed opaque reasoning blob, wrapped by
    /// [`crate::signature::SignatureCodec`]. Never shown to users.
    pub redacted_reasoning_content: Option<String>,

    /// Assistant refusal message.
    pub refusal: Option<String>,

    /// Citations attached to the message.
    pub annotations: Option<Vec<Annotation>>,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls: None,
            tool_call_id: None,
            tool_call_name: None,
            reasoning_content: None,
            reasoning_signature: None,
            redacted_reasoning_content: None,
            refusal: None,
            annotations: None,
        }
    }
}

impl Message {
    /// A plain-text message with the given role.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(MessageContent::Text(text.into())),
            ..Default::default()
        }
    }

    /// The message text, concatenating text parts in order.
    pub fn content_text(&self) -> Option<String> {
        self.content.as_ref().map(MessageContent::to_text)
    }
}

/// Message content: a plain string or ordered parts.
///
/// Deserialization accepts both forms; serializers may collapse a list
/// containing exactly one text part back to the plain form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text.
    Text(String),
    /// Ordered multimodal parts.
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// All text, concatenating text parts in order.
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }

    /// Collapse a single-text-part list to the plain string form.
    pub fn collapsed(self) -> Self {
        match self {
            Self::Parts(parts) => {
                if let [ContentPart::Text { .. }] = parts.as_slice() {
                    match parts.into_iter().next() {
                        Some(ContentPart::Text { text }) => Self::Text(text),
                        _ => Self::Parts(Vec::new()),
                    }
                } else {
                    Self::Parts(parts)
                }
            }
            text => text,
        }
    }

    /// Whether there is no content at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Parts(parts) => parts.is_empty(),
        }
    }
}

/// One typed content part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Image by URL or data URL.
    ImageUrl {
        /// The image reference.
        image_url: ImageUrl,
    },
    /// An attached document.
    Document {
        /// The document payload.
        source: DocumentSource,
    },
}

/// Image reference within a content part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    /// `https://` URL or `data:` URL.
    pub url: String,
    /// Processing detail hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Document payload within a content part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentSource {
    /// Inline base64 document.
    Base64 {
        /// MIME type, e.g. `application/pdf`.
        media_type: String,
        /// Base64 payload.
        data: String,
    },
    /// Document by URI.
    Url {
        /// The document URI.
        url: String,
    },
}

/// Stop sequences: single string or ordered list, preserved as sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Stop {
    /// One stop sequence.
    Single(String),
    /// Ordered stop sequences.
    Multiple(Vec<String>),
}

impl Stop {
    /// The sequences as a list, whichever form was sent.
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::Single(s) => vec![s.clone()],
            Self::Multiple(v) => v.clone(),
        }
    }
}

/// A tool the model may use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Tool {
    /// A caller-defined function.
    Function {
        /// The function definition.
        function: FunctionDefinition,
    },
    /// Google Search grounding.
    GoogleSearch {
        /// Provider-native payload, preserved opaquely.
        #[serde(default)]
        google_search: Value,
    },
    /// Google code execution.
    GoogleCodeExecution {
        /// Provider-native payload, preserved opaquely.
        #[serde(default)]
        google_code_execution: Value,
    },
    /// Google URL context retrieval.
    GoogleUrlContext {
        /// Provider-native payload, preserved opaquely.
        #[serde(default)]
        google_url_context: Value,
    },
}

impl Tool {
    /// The function definition, when this is a function tool.
    pub fn as_function(&self) -> Option<&FunctionDefinition> {
        match self {
            Self::Function { function } => Some(function),
            _ => None,
        }
    }
}

/// Caller-defined function schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Function name.
    pub name: String,
    /// What the function does.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Parameter JSON schema fragment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    /// Strict schema validation flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

/// Tool selection: a mode sentinel or a named function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    /// `auto` / `none` / `required`.
    Mode(ToolChoiceMode),
    /// Force one named function.
    Named {
        /// Always `function`.
        #[serde(rename = "type")]
        kind: String,
        /// The forced function.
        function: FunctionChoice,
    },
}

/// Tool choice sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoiceMode {
    /// Never call tools.
    None,
    /// Model decides.
    Auto,
    /// Must call at least one tool.
    #[serde(alias = "any")]
    Required,
}

/// The function a named tool choice forces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionChoice {
    /// Function name.
    pub name: String,
}

/// One tool call issued by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call identifier, correlated by tool-result messages.
    pub id: String,
    /// Always `function`.
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    /// The invoked function.
    pub function: FunctionCall,
    /// Position within a streamed tool-call sequence. Monotonically
    /// increasing; synthesized for dialects that do not number their calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

pub(crate) fn function_type() -> String {
    "function".to_string()
}

/// Function name and arguments of a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Function name.
    pub name: String,
    /// Arguments as a JSON string, accumulated across stream chunks.
    pub arguments: String,
}

/// A citation annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Always `url_citation`.
    #[serde(rename = "type", default = "url_citation_type")]
    pub kind: String,
    /// The cited URL.
    pub url_citation: UrlCitation,
}

fn url_citation_type() -> String {
    "url_citation".to_string()
}

/// URL citation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlCitation {
    /// Cited URL.
    pub url: String,
    /// Page title, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Start offset in the message text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_index: Option<u32>,
    /// End offset in the message text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_index: Option<u32>,
}

/// Embedding request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// Input text or pre-tokenized input.
    pub input: EmbeddingInput,
    /// `float` or `base64`.
    pub encoding_format: Option<String>,
    /// Requested output dimensionality.
    pub dimensions: Option<u32>,
    /// End-user identifier.
    pub user: Option<String>,
}

/// Embedding input shapes, tried in declaration order on deserialization
/// (token arrays before string arrays, so integers win the ambiguity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    /// One input string.
    Single(String),
    /// One pre-tokenized input.
    Tokens(Vec<i64>),
    /// A batch of pre-tokenized inputs.
    TokenBatches(Vec<Vec<i64>>),
    /// A batch of input strings.
    Multiple(Vec<String>),
}

impl EmbeddingInput {
    /// Reject empty and whitespace-only input at every nesting level.
    pub fn validate(&self) -> crate::Result<()> {
        let invalid = |what: &str| {
            Err(crate::Error::InvalidRequest(format!(
                "embedding input must not contain {what}"
            )))
        };

        match self {
            Self::Single(s) if s.trim().is_empty() => invalid("an empty string"),
            Self::Tokens(t) if t.is_empty() => invalid("an empty token array"),
            Self::TokenBatches(batches) => {
                if batches.is_empty() || batches.iter().any(Vec::is_empty) {
                    return invalid("an empty token array");
                }
                Ok(())
            }
            Self::Multiple(strings) => {
                if strings.is_empty() {
                    return invalid("an empty array");
                }
                if strings.iter().any(|s| s.trim().is_empty()) {
                    return invalid("an empty string");
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Which image operation the caller requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageOperation {
    /// Generate from a prompt.
    #[default]
    Generation,
    /// Edit supplied images under a prompt.
    Edit,
    /// Produce a variation of one supplied image.
    Variation,
}

/// An uploaded image file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageFile {
    /// Original filename.
    pub filename: String,
    /// MIME type.
    pub media_type: String,
    /// Raw file bytes.
    pub data: Vec<u8>,
}

/// Image request payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageRequest {
    /// Which operation this is.
    #[serde(default)]
    pub operation: ImageOperation,
    /// Generation prompt. Forbidden for variations.
    pub prompt: Option<String>,
    /// Number of images to produce.
    pub n: Option<u32>,
    /// Output size, e.g. `1024x1024`.
    pub size: Option<String>,
    /// Output quality tier.
    pub quality: Option<String>,
    /// Output format, e.g. `png`.
    pub output_format: Option<String>,
    /// Background handling, e.g. `transparent`.
    pub background: Option<String>,
    /// Moderation level.
    pub moderation: Option<String>,
    /// Style hint.
    pub style: Option<String>,
    /// `url` or `b64_json`.
    pub response_format: Option<String>,
    /// Compression level for lossy output formats.
    pub output_compression: Option<u32>,
    /// Number of partial images to stream.
    pub partial_images: Option<u32>,
    /// Input fidelity hint for edits.
    pub input_fidelity: Option<String>,
    /// End-user identifier.
    pub user: Option<String>,
    /// Source images for edits and variations.
    #[serde(default)]
    pub images: Vec<ImageFile>,
    /// Edit mask.
    pub mask: Option<ImageFile>,
}

impl ImageRequest {
    fn validate(&self) -> crate::Result<()> {
        match self.operation {
            ImageOperation::Generation => Ok(()),
            ImageOperation::Edit => {
                if self.images.is_empty() {
                    return Err(crate::Error::InvalidRequest(
                        "image edits require at least one image".into(),
                    ));
                }
                Ok(())
            }
            ImageOperation::Variation => {
                if self.prompt.is_some() {
                    return Err(crate::Error::InvalidRequest(
                        "image variations do not accept a prompt".into(),
                    ));
                }
                if self.images.len() != 1 {
                    return Err(crate::Error::InvalidRequest(
                        "image variations require exactly one image".into(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Rerank request payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RerankRequest {
    /// The query to score documents against.
    pub query: String,
    /// Candidate documents.
    pub documents: Vec<String>,
    /// Return only the best N results.
    pub top_n: Option<u32>,
    /// Echo documents back in the results.
    pub return_documents: Option<bool>,
}

/// Response object tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ObjectType {
    /// A complete response.
    #[default]
    #[serde(rename = "chat.completion")]
    ChatCompletion,
    /// One streamed chunk.
    #[serde(rename = "chat.completion.chunk")]
    ChatCompletionChunk,
    /// The stream-terminal sentinel.
    #[serde(rename = "[DONE]")]
    Done,
}

/// Unified inference response; both the unary form and one streamed chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    /// Response identifier.
    pub id: String,
    /// Unary response, chunk, or terminal sentinel.
    #[serde(default)]
    pub object: ObjectType,
    /// Model that produced the response.
    pub model: String,
    /// Unix timestamp (seconds).
    pub created: u64,
    /// Backend configuration fingerprint.
    pub system_fingerprint: Option<String>,
    /// Candidates, ordered by `index`.
    #[serde(default)]
    pub choices: Vec<Choice>,
    /// Token usage, when reported.
    pub usage: Option<Usage>,
    /// Embedding payload for embedding responses.
    pub embedding: Option<EmbeddingResponse>,
    /// Image payload for image responses.
    pub image: Option<ImageResponse>,
    /// Rerank payload for rerank responses.
    pub rerank: Option<RerankResponse>,
    /// Side-channel data, e.g. deduplicated citations.
    #[serde(default, skip_serializing_if = "TransformerMetadata::is_empty")]
    pub metadata: TransformerMetadata,
}

impl Response {
    /// Whether this is the terminal stream sentinel.
    pub fn is_done(&self) -> bool {
        self.object == ObjectType::Done
    }

    /// The terminal stream sentinel.
    pub fn done() -> Self {
        Self {
            object: ObjectType::Done,
            ..Default::default()
        }
    }
}

/// One model candidate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Choice {
    /// Candidate index.
    pub index: u32,
    /// The complete message (unary responses).
    pub message: Option<Message>,
    /// The incremental message (streamed chunks).
    pub delta: Option<Message>,
    /// Why generation stopped, once known.
    pub finish_reason: Option<FinishReason>,
    /// Per-choice side-channel data such as grounding.
    #[serde(default, skip_serializing_if = "TransformerMetadata::is_empty")]
    pub metadata: TransformerMetadata,
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop.
    Stop,
    /// Token limit reached.
    Length,
    /// Safety filter intervened.
    ContentFilter,
    /// The model called tools.
    ToolCalls,
}

impl FinishReason {
    /// Parse a dialect finish reason, falling back to `Stop` for values this
    /// gateway does not model.
    pub fn from_wire(value: &str) -> Self {
        match value {
            "length" | "max_tokens" => Self::Length,
            "content_filter" => Self::ContentFilter,
            "tool_calls" | "tool_use" | "function_call" => Self::ToolCalls,
            _ => Self::Stop,
        }
    }

    /// Stable wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ContentFilter => "content_filter",
            Self::ToolCalls => "tool_calls",
        }
    }
}

/// Token usage counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    /// Input tokens.
    pub prompt_tokens: u32,
    /// Output tokens.
    pub completion_tokens: u32,
    /// Input + output.
    pub total_tokens: u32,
    /// Input token breakdown.
    pub prompt_tokens_details: Option<PromptTokensDetails>,
    /// Output token breakdown.
    pub completion_tokens_details: Option<CompletionTokensDetails>,
}

/// Input token breakdown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptTokensDetails {
    /// Audio input tokens.
    pub audio_tokens: Option<u32>,
    /// Tokens served from prompt cache.
    pub cached_tokens: Option<u32>,
    /// Tokens written to prompt cache.
    pub write_cached_tokens: Option<u32>,
}

/// Output token breakdown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionTokensDetails {
    /// Audio output tokens.
    pub audio_tokens: Option<u32>,
    /// Reasoning tokens.
    pub reasoning_tokens: Option<u32>,
    /// Accepted prediction tokens.
    pub accepted_prediction_tokens: Option<u32>,
    /// Rejected prediction tokens.
    pub rejected_prediction_tokens: Option<u32>,
}

/// Embedding response payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// One vector per input, ordered by index.
    pub data: Vec<EmbeddingData>,
}

/// One embedding vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingData {
    /// Input index this vector answers.
    pub index: u32,
    /// The vector, in the caller's requested encoding.
    pub embedding: EmbeddingVector,
}

/// Embedding vector encodings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingVector {
    /// Raw floats.
    Floats(Vec<f32>),
    /// Base64-packed little-endian floats.
    Base64(String),
}

/// Image response payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageResponse {
    /// Creation timestamp.
    pub created: u64,
    /// Generated images.
    pub data: Vec<ImageData>,
}

/// One generated image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageData {
    /// Base64 image payload.
    pub b64_json: Option<String>,
    /// Hosted image URL.
    pub url: Option<String>,
    /// The prompt after provider rewriting.
    pub revised_prompt: Option<String>,
}

/// Rerank response payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RerankResponse {
    /// Scored documents, best first.
    pub results: Vec<RerankResult>,
}

/// One rerank result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankResult {
    /// Index into the request's document list.
    pub index: u32,
    /// Relevance to the query.
    pub relevance_score: f64,
    /// The document text, when echoing was requested.
    pub document: Option<String>,
}

/// Typed side-channel bag keyed by well-known tags.
///
/// Adapters that are not the consumer of a key preserve it verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformerMetadata(BTreeMap<String, Value>);

impl TransformerMetadata {
    /// Deduplicated citation URLs, sorted ascending.
    pub const CITATIONS: &'static str = "citations";
    /// Opaque Gemini grounding record.
    pub const GEMINI_GROUNDING: &'static str = "gemini_grounding_metadata";
    /// Which outbound sub-path produced the payload.
    pub const OUTBOUND_FORMAT: &'static str = "outbound_format_type";

    /// Whether the bag is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Store a value under a key.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Read a value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Absorb another bag; the other side wins on key conflicts.
    pub fn merge(&mut self, other: TransformerMetadata) {
        self.0.extend(other.0);
    }

    /// Store the sorted citation list.
    pub fn set_citations(&mut self, mut urls: Vec<String>) {
        urls.sort();
        urls.dedup();
        self.insert(Self::CITATIONS, Value::from(urls));
    }

    /// Read the citation list.
    pub fn citations(&self) -> Option<Vec<String>> {
        self.get(Self::CITATIONS).and_then(|value| {
            value
                .as_array()
                .map(|urls| urls.iter().filter_map(Value::as_str).map(String::from).collect())
        })
    }

    /// Tag which outbound sub-path produced the payload.
    pub fn set_outbound_format(&mut self, format: &str) {
        self.insert(Self::OUTBOUND_FORMAT, Value::from(format));
    }

    /// Which outbound sub-path produced the payload.
    pub fn outbound_format(&self) -> Option<&str> {
        self.get(Self::OUTBOUND_FORMAT).and_then(Value::as_str)
    }
}

/// Recover a missing tool-result correlation id by name.
///
/// Scans the preceding messages in reverse for the most recent assistant
/// function call with the given name. Returns `None` when no earlier call
/// matches; the outbound adapter then synthesizes a fresh id if its dialect
/// requires one.
pub fn recover_tool_call_id(messages: &[Message], name: &str) -> Option<String> {
    messages.iter().rev().find_map(|message| {
        message.tool_calls.as_ref()?.iter().rev().find_map(|call| {
            (call.function.name == name).then(|| call.id.clone())
        })
    })
}

/// Resolve the function name for a tool-result message.
///
/// Prefers the explicit `tool_call_name`; otherwise scans the preceding
/// messages in reverse for the assistant call with a matching id.
pub fn recover_tool_call_name(messages: &[Message], tool_call_id: &str) -> Option<String> {
    messages.iter().rev().find_map(|message| {
        message.tool_calls.as_ref()?.iter().rev().find_map(|call| {
            (call.id == tool_call_id).then(|| call.function.name.clone())
        })
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn embedding_input_rejects_empty_shapes() {
        assert!(EmbeddingInput::Single("".into()).validate().is_err());
        assert!(EmbeddingInput::Single("   ".into()).validate().is_err());
        assert!(EmbeddingInput::Multiple(vec![]).validate().is_err());
        assert!(EmbeddingInput::Multiple(vec!["ok".into(), " ".into()]).validate().is_err());
        assert!(EmbeddingInput::Tokens(vec![]).validate().is_err());
        assert!(EmbeddingInput::TokenBatches(vec![vec![1], vec![]]).validate().is_err());

        assert!(EmbeddingInput::Single("hello".into()).validate().is_ok());
        assert!(EmbeddingInput::Tokens(vec![1, 2, 3]).validate().is_ok());
    }

    #[test]
    fn embedding_input_tries_integers_before_strings() {
        let input: EmbeddingInput = serde_json::from_value(json!([1, 2, 3])).unwrap();
        assert_eq!(input, EmbeddingInput::Tokens(vec![1, 2, 3]));

        let input: EmbeddingInput = serde_json::from_value(json!(["a", "b"])).unwrap();
        assert_eq!(input, EmbeddingInput::Multiple(vec!["a".into(), "b".into()]));

        let input: EmbeddingInput = serde_json::from_value(json!([[1], [2, 3]])).unwrap();
        assert_eq!(input, EmbeddingInput::TokenBatches(vec![vec![1], vec![2, 3]]));
    }

    #[test]
    fn content_collapse() {
        let content = MessageContent::Parts(vec![ContentPart::Text { text: "hi".into() }]);
        assert_eq!(content.collapsed(), MessageContent::Text("hi".into()));

        let content = MessageContent::Parts(vec![
            ContentPart::Text { text: "a".into() },
            ContentPart::Text { text: "b".into() },
        ]);
        assert!(matches!(content.collapsed(), MessageContent::Parts(_)));
    }

    #[test]
    fn stop_accepts_both_wire_forms() {
        let stop: Stop = serde_json::from_value(json!("END")).unwrap();
        assert_eq!(stop.to_vec(), vec!["END"]);

        let stop: Stop = serde_json::from_value(json!(["a", "b"])).unwrap();
        assert_eq!(stop.to_vec(), vec!["a", "b"]);
    }

    #[test]
    fn tool_choice_accepts_sentinel_and_named_forms() {
        let choice: ToolChoice = serde_json::from_value(json!("auto")).unwrap();
        assert_eq!(choice, ToolChoice::Mode(ToolChoiceMode::Auto));

        let choice: ToolChoice =
            serde_json::from_value(json!({"type": "function", "function": {"name": "f"}})).unwrap();
        assert!(matches!(choice, ToolChoice::Named { function, .. } if function.name == "f"));
    }

    #[test]
    fn tool_call_id_recovery_scans_in_reverse() {
        let messages = vec![
            Message::text(Role::User, "ask"),
            Message {
                role: Role::Assistant,
                tool_calls: Some(vec![
                    ToolCall {
                        id: "call_old".into(),
                        kind: "function".into(),
                        function: FunctionCall { name: "f".into(), arguments: "{}".into() },
                        index: None,
                    },
                ]),
                ..Default::default()
            },
            Message {
                role: Role::Assistant,
                tool_calls: Some(vec![
                    ToolCall {
                        id: "call_new".into(),
                        kind: "function".into(),
                        function: FunctionCall { name: "f".into(), arguments: "{}".into() },
                        index: None,
                    },
                ]),
                ..Default::default()
            },
        ];

        assert_eq!(recover_tool_call_id(&messages, "f").as_deref(), Some("call_new"));
        assert_eq!(recover_tool_call_id(&messages, "g"), None);
        assert_eq!(recover_tool_call_name(&messages, "call_old").as_deref(), Some("f"));
    }

    #[test]
    fn chat_request_requires_messages() {
        let request = Request {
            model: "gpt-4o".into(),
            ..Default::default()
        };

        assert!(matches!(request.validate(), Err(crate::Error::InvalidRequest(_))));
    }

    #[test]
    fn image_variation_invariants() {
        let file = ImageFile {
            filename: "a.png".into(),
            media_type: "image/png".into(),
            data: vec![0],
        };

        let request = Request {
            model: "dall-e-2".into(),
            request_type: RequestType::Image,
            image: Some(ImageRequest {
                operation: ImageOperation::Variation,
                prompt: Some("nope".into()),
                images: vec![file.clone()],
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(request.validate().is_err());

        let request = Request {
            model: "dall-e-2".into(),
            request_type: RequestType::Image,
            image: Some(ImageRequest {
                operation: ImageOperation::Variation,
                images: vec![file],
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn metadata_citations_are_sorted_and_deduplicated() {
        let mut metadata = TransformerMetadata::default();
        metadata.set_citations(vec![
            "https://b.example".into(),
            "https://a.example".into(),
            "https://b.example".into(),
        ]);

        assert_eq!(
            metadata.citations().unwrap(),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }
}
