//! Configuration structures for outbound LLM provider endpoints.
//!
//! Each configured provider describes one upstream endpoint speaking a
//! concrete dialect: where to send requests (`base_url`, `platform`), how to
//! authenticate, and per-channel tuning such as the reasoning effort to
//! thinking budget table.

#![deny(missing_docs)]

mod provider;

use std::collections::BTreeMap;

use serde::Deserialize;

pub use provider::{ConfigError, PlatformType, ProviderConfig, ReasoningBudgetTable};

/// Top-level configuration: named outbound providers.
///
/// The map key is the channel name used by the admission layer to select an
/// upstream; it never reaches the wire.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Outbound provider endpoints, keyed by channel name.
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl Config {
    /// Validate every configured provider.
    ///
    /// Called once at startup; adapters assume a validated configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, provider) in &self.providers {
            provider
                .validate()
                .map_err(|e| ConfigError::Provider(name.clone(), Box::new(e)))?;
        }

        Ok(())
    }
}
