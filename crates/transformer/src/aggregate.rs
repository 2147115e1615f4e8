//! Folds a chunk-shaped stream into one synthetic unary response.
//!
//! Any dialect whose stream is chunk-shaped (a `choices[].delta` sequence)
//! can aggregate through here, either from raw SSE payloads or from already
//! unified chunks. Used by outbound adapters to satisfy non-streaming callers
//! over streaming-only upstreams, and by inbound bookkeeping to synthesize a
//! final envelope for logging and billing.
//!
//! The fold never aborts on one bad chunk: unparseable payloads and `[DONE]`
//! sentinels are skipped silently, and an empty input produces an empty
//! response.

use std::collections::{BTreeMap, BTreeSet};

use crate::messages::openai;
use crate::messages::unified::{
    Annotation, FinishReason, Message, MessageContent, ObjectType, Response, Role, ToolCall, Usage,
};
use crate::sse;

/// Summary of an aggregated stream, for billing and logging paths that do
/// not need the full synthetic body.
#[derive(Debug, Clone, Default)]
pub struct ResponseMeta {
    /// Stream identifier.
    pub id: String,
    /// Model that produced the stream.
    pub model: String,
    /// Usage from the final chunk that carried one.
    pub usage: Option<Usage>,
    /// Finish reason of the first choice.
    pub finish_reason: Option<FinishReason>,
}

impl ResponseMeta {
    /// Summarize a synthetic response.
    pub fn of(response: &Response) -> Self {
        Self {
            id: response.id.clone(),
            model: response.model.clone(),
            usage: response.usage.clone(),
            finish_reason: response.choices.first().and_then(|choice| choice.finish_reason),
        }
    }
}

#[derive(Default)]
struct ChoiceState {
    role: Option<Role>,
    content: String,
    reasoning: String,
    refusal: String,
    tool_calls: BTreeMap<u32, ToolCall>,
    annotations: Vec<Annotation>,
    annotation_urls: BTreeSet<String>,
    finish_reason: Option<FinishReason>,
    metadata: crate::messages::unified::TransformerMetadata,
}

impl ChoiceState {
    fn absorb_annotations(&mut self, annotations: &[Annotation]) {
        for annotation in annotations {
            if self.annotation_urls.insert(annotation.url_citation.url.clone()) {
                self.annotations.push(annotation.clone());
            }
        }
    }

    fn absorb_delta(&mut self, delta: Message) {
        if self.role.is_none() {
            self.role = Some(delta.role);
        }

        if let Some(content) = delta.content {
            self.content.push_str(&content.to_text());
        }

        if let Some(reasoning) = delta.reasoning_content {
            self.reasoning.push_str(&reasoning);
        }

        if let Some(refusal) = delta.refusal {
            self.refusal.push_str(&refusal);
        }

        if let Some(annotations) = delta.annotations {
            self.absorb_annotations(&annotations);
        }

        if let Some(calls) = delta.tool_calls {
            for (position, call) in calls.into_iter().enumerate() {
                let index = call.index.unwrap_or(position as u32);
                let entry = self.tool_calls.entry(index).or_insert_with(|| ToolCall {
                    id: String::new(),
                    kind: String::new(),
                    function: crate::messages::unified::FunctionCall {
                        name: String::new(),
                        arguments: String::new(),
                    },
                    index: Some(index),
                });

                if !call.id.is_empty() {
                    entry.id = call.id;
                }
                if !call.kind.is_empty() {
                    entry.kind = call.kind;
                }
                if !call.function.name.is_empty() {
                    entry.function.name = call.function.name;
                }
                entry.function.arguments.push_str(&call.function.arguments);
            }
        }
    }

    fn finish(self, index: u32) -> crate::messages::unified::Choice {
        let has_tool_calls = !self.tool_calls.is_empty();

        let tool_calls: Vec<ToolCall> = self
            .tool_calls
            .into_values()
            .map(|mut call| {
                if call.kind.is_empty() {
                    call.kind = "function".to_string();
                }
                call
            })
            .collect();

        let message = Message {
            role: self.role.unwrap_or(Role::Assistant),
            content: (!self.content.is_empty()).then(|| MessageContent::Text(self.content)),
            tool_calls: has_tool_calls.then_some(tool_calls),
            reasoning_content: (!self.reasoning.is_empty()).then_some(self.reasoning),
            refusal: (!self.refusal.is_empty()).then_some(self.refusal),
            annotations: (!self.annotations.is_empty()).then_some(self.annotations),
            ..Default::default()
        };

        let finish_reason = self.finish_reason.or(Some(if has_tool_calls {
            FinishReason::ToolCalls
        } else {
            FinishReason::Stop
        }));

        crate::messages::unified::Choice {
            index,
            message: Some(message),
            delta: None,
            finish_reason,
            metadata: self.metadata,
        }
    }
}

/// Incremental aggregator over chunk-shaped streams.
#[derive(Default)]
pub struct StreamAggregator {
    id: String,
    model: String,
    created: u64,
    system_fingerprint: Option<String>,
    usage: Option<Usage>,
    choices: BTreeMap<u32, ChoiceState>,
    citations: BTreeSet<String>,
}

impl StreamAggregator {
    /// An empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one raw SSE data payload. Sentinels and unparseable payloads are
    /// skipped.
    pub fn push_data(&mut self, data: &str) {
        if sse::is_done(data) {
            return;
        }

        match sonic_rs::from_str::<openai::ChatCompletionChunk>(data) {
            Ok(chunk) => self.push_unified(Response::from(chunk)),
            Err(e) => {
                log::debug!("skipping invalid stream chunk: {e}");
            }
        }
    }

    /// Fold one already unified chunk.
    pub fn push_unified(&mut self, chunk: Response) {
        if chunk.is_done() {
            return;
        }

        if self.id.is_empty() && !chunk.id.is_empty() {
            self.id = chunk.id;
        }
        if self.model.is_empty() && !chunk.model.is_empty() {
            self.model = chunk.model;
        }
        if self.created == 0 {
            self.created = chunk.created;
        }
        if self.system_fingerprint.is_none() {
            self.system_fingerprint = chunk.system_fingerprint;
        }
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }

        if let Some(urls) = chunk.metadata.citations() {
            self.citations.extend(urls);
        }

        for choice in chunk.choices {
            let state = self.choices.entry(choice.index).or_default();

            if let Some(delta) = choice.delta {
                state.absorb_delta(delta);
            }

            // Some backends interleave a whole message mid-stream; only its
            // annotations are absorbed, content arrives through deltas.
            if let Some(message) = choice.message
                && let Some(annotations) = &message.annotations
            {
                state.absorb_annotations(annotations);
            }

            if choice.finish_reason.is_some() {
                state.finish_reason = choice.finish_reason;
            }

            state.metadata.merge(choice.metadata);
        }
    }

    /// Finalize into the synthetic unary response.
    pub fn finish(mut self) -> Response {
        // Every cited URL, whichever choice or chunk carried it.
        for state in self.choices.values() {
            self.citations.extend(state.annotation_urls.iter().cloned());
        }

        let mut response = Response {
            id: self.id,
            object: ObjectType::ChatCompletion,
            model: self.model,
            created: self.created,
            system_fingerprint: self.system_fingerprint,
            usage: self.usage,
            choices: self
                .choices
                .into_iter()
                .map(|(index, state)| state.finish(index))
                .collect(),
            ..Default::default()
        };

        if !self.citations.is_empty() {
            response
                .metadata
                .set_citations(self.citations.into_iter().collect());
        }

        response
    }
}

/// Aggregate a full set of raw SSE data payloads.
pub fn aggregate_sse_data<I, S>(chunks: I) -> Response
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut aggregator = StreamAggregator::new();
    for chunk in chunks {
        aggregator.push_data(chunk.as_ref());
    }
    aggregator.finish()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn chunk(value: serde_json::Value) -> String {
        value.to_string()
    }

    #[test]
    fn content_concatenates_across_chunks() {
        let response = aggregate_sse_data([
            chunk(json!({
                "id": "chatcmpl-1", "object": "chat.completion.chunk", "created": 10,
                "model": "gpt-4o",
                "choices": [{"index": 0, "delta": {"role": "assistant", "content": "Hello"}}]
            })),
            chunk(json!({
                "id": "chatcmpl-1", "object": "chat.completion.chunk", "created": 10,
                "model": "gpt-4o",
                "choices": [{"index": 0, "delta": {"content": ", world!"},
                             "finish_reason": "stop"}]
            })),
            "[DONE]".to_string(),
        ]);

        assert_eq!(response.object, ObjectType::ChatCompletion);
        assert_eq!(response.choices.len(), 1);

        let message = response.choices[0].message.as_ref().unwrap();
        assert_eq!(message.content_text().as_deref(), Some("Hello, world!"));
        assert_eq!(response.choices[0].finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn tool_call_arguments_accumulate_by_index() {
        let response = aggregate_sse_data([
            chunk(json!({
                "id": "c", "object": "chat.completion.chunk", "created": 1, "model": "m",
                "choices": [{"index": 0, "delta": {"tool_calls": [
                    {"index": 0, "id": "call_1", "type": "function",
                     "function": {"name": "f", "arguments": "{\"a\":"}}
                ]}}]
            })),
            chunk(json!({
                "id": "c", "object": "chat.completion.chunk", "created": 1, "model": "m",
                "choices": [{"index": 0, "delta": {"tool_calls": [
                    {"index": 0, "function": {"arguments": "1}"}}
                ]}}]
            })),
        ]);

        let message = response.choices[0].message.as_ref().unwrap();
        let calls = message.tool_calls.as_ref().unwrap();

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].function.arguments, r#"{"a":1}"#);

        // No explicit finish reason, but tool calls exist.
        assert_eq!(response.choices[0].finish_reason, Some(FinishReason::ToolCalls));
    }

    #[test]
    fn invalid_chunks_are_skipped_silently() {
        let response = aggregate_sse_data([
            "not json at all",
            r#"{"id":"c","object":"chat.completion.chunk","created":1,"model":"m","choices":[{"index":0,"delta":{"content":"ok"}}]}"#,
        ]);

        let message = response.choices[0].message.as_ref().unwrap();
        assert_eq!(message.content_text().as_deref(), Some("ok"));
    }

    #[test]
    fn empty_input_yields_empty_response() {
        let response = aggregate_sse_data(Vec::<String>::new());
        assert!(response.choices.is_empty());
        assert!(response.id.is_empty());
        assert!(response.usage.is_none());
    }

    #[test]
    fn usage_last_wins_and_fingerprint_first_wins() {
        let response = aggregate_sse_data([
            chunk(json!({
                "id": "c", "object": "chat.completion.chunk", "created": 1, "model": "m",
                "system_fingerprint": "fp_a",
                "choices": [{"index": 0, "delta": {"content": "x"}}],
                "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
            })),
            chunk(json!({
                "id": "c", "object": "chat.completion.chunk", "created": 1, "model": "m",
                "system_fingerprint": "fp_b",
                "choices": [],
                "usage": {"prompt_tokens": 1, "completion_tokens": 5, "total_tokens": 6}
            })),
        ]);

        assert_eq!(response.system_fingerprint.as_deref(), Some("fp_a"));
        assert_eq!(response.usage.unwrap().total_tokens, 6);
    }

    #[test]
    fn citations_deduplicate_and_sort_across_chunks() {
        let response = aggregate_sse_data([
            chunk(json!({
                "id": "c", "object": "chat.completion.chunk", "created": 1, "model": "m",
                "choices": [{"index": 0, "delta": {"content": "a", "annotations": [
                    {"type": "url_citation", "url_citation": {"url": "https://b.example"}}
                ]}}]
            })),
            chunk(json!({
                "id": "c", "object": "chat.completion.chunk", "created": 1, "model": "m",
                "choices": [{"index": 0, "delta": {"annotations": [
                    {"type": "url_citation", "url_citation": {"url": "https://a.example"}},
                    {"type": "url_citation", "url_citation": {"url": "https://b.example"}}
                ]}}]
            })),
        ]);

        let message = response.choices[0].message.as_ref().unwrap();
        let annotations = message.annotations.as_ref().unwrap();
        assert_eq!(annotations.len(), 2);

        assert_eq!(
            response.metadata.citations().unwrap(),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn choices_are_ordered_by_declared_index() {
        let response = aggregate_sse_data([
            chunk(json!({
                "id": "c", "object": "chat.completion.chunk", "created": 1, "model": "m",
                "choices": [{"index": 1, "delta": {"content": "second"}}]
            })),
            chunk(json!({
                "id": "c", "object": "chat.completion.chunk", "created": 1, "model": "m",
                "choices": [{"index": 0, "delta": {"content": "first"}}]
            })),
        ]);

        assert_eq!(response.choices[0].index, 0);
        assert_eq!(response.choices[1].index, 1);
    }
}
