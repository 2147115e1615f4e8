//! Bidirectional translation between LLM API dialects.
//!
//! A gateway accepts inference requests in one vendor's HTTP shape and
//! serves them from an upstream speaking another. This crate is the
//! translation core: per-dialect [`dialect::Inbound`] and
//! [`dialect::Outbound`] adapters around one [`messages::unified`] model,
//! covering unary calls, SSE streams, and the streaming → unary fold in
//! [`aggregate`].
//!
//! The surrounding gateway owns the listener, routing, credentials and the
//! outbound HTTP client; their contracts with this crate live in [`http`].

pub mod aggregate;
pub mod dialect;
pub mod error;
pub mod http;
pub mod messages;
pub mod pipeline;
pub mod signature;
pub mod sse;

pub use error::{Error, Result};
