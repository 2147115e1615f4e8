//! The adapter surface every dialect implements.
//!
//! Each dialect provides two adapters. The [`Inbound`] side faces callers: it
//! parses their wire shape into the unified model and renders unified results
//! (unary, streamed, or errors) back into that shape. The [`Outbound`] side
//! faces upstream providers: it serializes unified requests into provider
//! HTTP requests and parses provider responses and SSE streams back.
//!
//! Consumers select adapters by [`ApiFormat`] tag, never by downcasting.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::aggregate::ResponseMeta;
use crate::error::{Error, Result};
use crate::http::{EventStream, HttpError, HttpRequest, HttpResponse, RawRequest};
use crate::messages::unified;

pub mod anthropic;
pub mod gemini;
pub mod openai;

pub use unified::ApiFormat;

/// Stream of unified responses (chunks) with a terminal error channel.
pub type ResponseStream = BoxStream<'static, Result<unified::Response>>;

/// Stream of caller-facing SSE frames, ready to write to the socket.
pub type SseFrameStream = BoxStream<'static, Result<String>>;

/// Caller-facing adapter for one dialect.
#[async_trait]
pub trait Inbound: Send + Sync {
    /// The dialect this adapter speaks.
    fn api_format(&self) -> ApiFormat;

    /// Parse a caller's HTTP request into a unified request.
    ///
    /// Validation failures surface here, before any I/O.
    async fn transform_request(&self, request: RawRequest) -> Result<unified::Request>;

    /// Render a unified response into the caller's wire shape.
    fn transform_response(&self, response: unified::Response) -> Result<HttpResponse>;

    /// Lazily map a unified chunk stream into caller-facing SSE frames.
    fn transform_stream(&self, stream: ResponseStream) -> SseFrameStream;

    /// Fold the caller-facing chunk payloads into a synthetic unary body,
    /// for bookkeeping paths that log or bill a completed stream.
    fn aggregate_stream_chunks(&self, chunks: &[String]) -> Result<(Vec<u8>, ResponseMeta)>;

    /// Render an error into the caller's native error envelope. Total: every
    /// error maps to a response.
    fn transform_error(&self, error: &Error) -> HttpResponse;
}

/// Provider-facing adapter for one dialect.
#[async_trait]
pub trait Outbound: Send + Sync {
    /// The dialect this adapter speaks.
    fn api_format(&self) -> ApiFormat;

    /// Serialize a unified request into an upstream HTTP request, including
    /// endpoint selection and auth. Async because the API key provider is
    /// consulted per request.
    async fn transform_request(&self, request: unified::Request) -> Result<HttpRequest>;

    /// Parse an upstream response into a unified response. The request's
    /// metadata bag (echoed on the response) selects the sub-path parser.
    fn transform_response(&self, response: HttpResponse) -> Result<unified::Response>;

    /// Lazily map an upstream SSE stream into unified chunks. Per-stream
    /// state (e.g. a synthesized tool-call index) lives in the mapping
    /// closure; the stream has exactly one consumer.
    fn transform_stream(&self, stream: EventStream) -> ResponseStream;

    /// Fold upstream chunk payloads into a synthetic unary body in this
    /// dialect's wire shape, for callers that asked for a non-streaming
    /// response over a streaming-only upstream.
    fn aggregate_stream_chunks(&self, chunks: &[String]) -> Result<(Vec<u8>, ResponseMeta)>;

    /// Map an upstream HTTP error into the taxonomy, parsing this dialect's
    /// native error shape when possible. Total: never fails.
    fn transform_error(&self, error: HttpError) -> Error;
}
