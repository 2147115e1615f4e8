//! Contracts shared with the external HTTP layer.
//!
//! The core never performs I/O. Outbound adapters produce an [`HttpRequest`]
//! value and consume an [`HttpResponse`] or a stream of [`StreamEvent`]s; the
//! surrounding gateway owns connection pooling, retries and TLS. Inbound
//! adapters consume the origin envelope as a [`RawRequest`].

use std::collections::BTreeMap;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use http::{HeaderMap, Method, StatusCode};
use secrecy::SecretString;

use crate::{
    error::Result,
    messages::unified::{ApiFormat, RequestType, TransformerMetadata},
};

/// The origin HTTP envelope of an inbound call.
///
/// Kept by the unified request as a back-reference so outbound adapters can
/// read path variables, query parameters or cookies that the caller's dialect
/// encodes outside the body. Transport-level fields that would leak to the
/// backend (such as a pass-through `alt` query parameter) are stripped by the
/// inbound adapter before the value is shared.
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    /// HTTP method of the origin request.
    pub method: Option<Method>,
    /// Path portion of the origin URL.
    pub path: String,
    /// Query parameters, in encounter order of first occurrence.
    pub query: BTreeMap<String, String>,
    /// Origin request headers.
    pub headers: HeaderMap,
    /// Origin request body.
    pub body: Vec<u8>,
}

impl RawRequest {
    /// Drop a transport-level query parameter so it does not leak upstream.
    pub fn strip_query_param(&mut self, name: &str) {
        self.query.remove(name);
    }
}

/// How the outbound HTTP client must authenticate the request.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Authentication scheme.
    pub kind: AuthKind,
    /// The API key. Exposed only when the client realizes the header.
    pub key: SecretString,
}

/// Authentication schemes the upstream platforms use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthKind {
    /// `Authorization: Bearer {key}`.
    Bearer,
    /// The key travels in a custom header, e.g. `x-goog-api-key` or `Api-Key`.
    Header(String),
}

/// An outbound HTTP request produced by an outbound adapter.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL of the upstream endpoint.
    pub url: String,
    /// Request headers. Auth is carried separately in `auth`.
    pub headers: HeaderMap,
    /// Serialized request body.
    pub body: Vec<u8>,
    /// Authentication the client must realize.
    pub auth: Option<AuthConfig>,
    /// The modality of the request (chat, embedding, image, rerank).
    pub request_type: RequestType,
    /// The dialect that produced this request.
    pub api_format: ApiFormat,
    /// Side-channel data for the response parser, e.g. which endpoint
    /// sub-path produced the payload. The client copies this bag verbatim
    /// onto the response.
    pub metadata: TransformerMetadata,
}

/// An upstream HTTP response handed back to the outbound adapter.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body bytes.
    pub body: Vec<u8>,
    /// The request's metadata bag, copied back by the client so the parser
    /// knows which sub-path produced the payload.
    pub metadata: TransformerMetadata,
}

/// An upstream error surfaced by the HTTP client: a 4xx/5xx with its body.
#[derive(Debug, Clone)]
pub struct HttpError {
    /// HTTP status.
    pub status: StatusCode,
    /// Raw error body.
    pub body: Vec<u8>,
}

/// One server-sent event from an upstream stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamEvent {
    /// The `event:` field, when present.
    pub event: Option<String>,
    /// The `data:` payload.
    pub data: String,
    /// The `id:` field, when present.
    pub last_event_id: Option<String>,
}

impl From<eventsource_stream::Event> for StreamEvent {
    fn from(event: eventsource_stream::Event) -> Self {
        Self {
            event: (!event.event.is_empty() && event.event != "message").then_some(event.event),
            data: event.data,
            last_event_id: (!event.id.is_empty()).then_some(event.id),
        }
    }
}

/// Pull-based, single-consumer stream of upstream SSE events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Outbound HTTP client owned by the surrounding gateway.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Execute a unary request.
    ///
    /// Transport failures map to [`crate::Error::Transport`]; HTTP-level
    /// errors are returned as `Ok` responses with their status so the
    /// outbound adapter can parse the dialect's error shape.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Execute a streaming request, returning the SSE event stream.
    async fn execute_stream(&self, request: HttpRequest) -> Result<EventStream>;
}

/// Credential source, called per request so key rotation is observed.
#[async_trait]
pub trait ApiKeyProvider: Send + Sync {
    /// Fetch the current API key.
    async fn get(&self) -> Result<SecretString>;
}

/// Key provider backed by a static configured secret.
pub struct StaticKeyProvider(SecretString);

impl StaticKeyProvider {
    /// Wrap a configured secret.
    pub fn new(key: SecretString) -> Self {
        Self(key)
    }
}

#[async_trait]
impl ApiKeyProvider for StaticKeyProvider {
    async fn get(&self) -> Result<SecretString> {
        Ok(self.0.clone())
    }
}
