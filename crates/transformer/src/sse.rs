//! Client-facing SSE framing.
//!
//! Upstream SSE is parsed with `eventsource-stream`; on the way back out to
//! callers the dialect adapters frame payloads as `data: {json}\n\n` lines,
//! with the `data: [DONE]\n\n` sentinel where the dialect requires it.

/// The OpenAI-style terminal sentinel payload.
pub const DONE: &str = "[DONE]";

/// Frame one data payload as an SSE event.
pub fn data_frame(payload: &str) -> String {
    format!("data: {payload}\n\n")
}

/// Frame a payload under a named event, as the Anthropic dialect emits.
pub fn event_frame(event: &str, payload: &str) -> String {
    format!("event: {event}\ndata: {payload}\n\n")
}

/// The terminal `data: [DONE]` frame.
pub fn done_frame() -> String {
    data_frame(DONE)
}

/// Whether a data payload is the terminal sentinel.
pub fn is_done(data: &str) -> bool {
    data.trim() == DONE
}
