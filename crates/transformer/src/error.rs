use http::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Transformer errors, keyed by the gateway taxonomy.
///
/// Translation code returns these structured values; the inbound adapter at
/// the edge renders them into the caller's dialect envelope. `Cancelled` is a
/// sentinel outside the taxonomy: it is propagated as-is and never formatted
/// into an error body.
#[derive(Debug, Error)]
pub enum Error {
    /// Caller-provided data failed validation before any I/O.
    #[error("{0}")]
    InvalidRequest(String),

    /// Model name absent or not permitted by the channel.
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// Upstream returned a syntactically valid but semantically empty payload.
    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),

    /// 4xx/5xx from upstream, parsed into the provider's native error shape
    /// when possible.
    #[error("upstream error ({status}): {message}")]
    UpstreamHttp {
        /// HTTP status returned by the provider.
        status: u16,
        /// Provider error type/status label, e.g. `INVALID_ARGUMENT`.
        kind: String,
        /// Provider error message, or the raw body when parsing failed.
        message: String,
        /// Provider error code, when the dialect carries one.
        code: Option<String>,
    },

    /// Network failure surfaced by the HTTP client.
    #[error("transport error: {0}")]
    Transport(String),

    /// The request was cancelled. Not part of the taxonomy; never rendered.
    #[error("request cancelled")]
    Cancelled,

    /// Anything else. The message, when present, came from a provider and is
    /// safe to show; `None` means an internal failure whose details must not
    /// leak to callers.
    #[error("internal error")]
    Internal(Option<String>),
}

impl Error {
    /// HTTP status returned to the caller.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::InvalidModel(_) => StatusCode::NOT_FOUND,
            Self::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
            Self::UpstreamHttp { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
            // Client closed request; nginx convention. The pipeline normally
            // returns before an envelope is built.
            Self::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error type label used by OpenAI-shaped envelopes.
    pub fn error_type(&self) -> &str {
        match self {
            Self::InvalidRequest(_) => "invalid_request_error",
            Self::InvalidModel(_) => "not_found_error",
            Self::UpstreamHttp { kind, .. } if !kind.is_empty() => kind,
            Self::InvalidResponse(_) | Self::Transport(_) | Self::UpstreamHttp { .. } => "api_error",
            Self::Cancelled => "cancelled",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Provider error code, when one was carried through.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::UpstreamHttp { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Message that is safe to expose to API consumers.
    ///
    /// Upstream errors surface the provider's own message, not the wrapping.
    pub fn client_message(&self) -> String {
        match self {
            Self::UpstreamHttp { message, .. } => message.clone(),
            Self::Internal(Some(provider_msg)) => provider_msg.clone(),
            Self::Internal(None) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_status_is_preserved() {
        let err = Error::UpstreamHttp {
            status: 429,
            kind: "rate_limit_error".to_string(),
            message: "slow down".to_string(),
            code: None,
        };

        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.error_type(), "rate_limit_error");
    }

    #[test]
    fn internal_error_without_provider_message_does_not_leak() {
        let err = Error::Internal(None);
        assert_eq!(err.client_message(), "Internal server error");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn upstream_error_kind_wins_over_generic_api_error() {
        let err = Error::UpstreamHttp {
            status: 400,
            kind: "INVALID_ARGUMENT".to_string(),
            message: "bad".to_string(),
            code: Some("400".to_string()),
        };

        assert_eq!(err.error_type(), "INVALID_ARGUMENT");
        assert_eq!(err.error_code(), Some("400"));
    }
}
