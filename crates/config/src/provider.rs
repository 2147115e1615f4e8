//! Per-provider endpoint configuration.

use std::collections::BTreeMap;

use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

/// Configuration errors raised at validation time.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required field is empty or missing.
    #[error("{0}")]
    MissingField(String),

    /// A field holds a malformed value.
    #[error("{0}")]
    InvalidField(String),

    /// A provider failed validation.
    #[error("provider '{0}': {1}")]
    Provider(String, Box<ConfigError>),
}

/// The upstream platform a provider endpoint belongs to.
///
/// The platform decides URL layout and the header the API key travels in.
/// An unknown value is a hard error at deserialization time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformType {
    /// OpenAI-compatible endpoint: `{base}/chat/completions` etc., bearer auth.
    Openai,
    /// Azure OpenAI: `{base}/openai/v1/{endpoint}?api-version=...`, `Api-Key` header.
    Azure,
    /// Google Generative Language: `{base}/{version}/models/{model}:{action}`,
    /// `x-goog-api-key` header.
    Gemini,
    /// Vertex AI: `{base}/v1/publishers/google/models/{model}:{action}`.
    Vertex,
    /// Cloudflare AI gateway in front of Vertex; same layout without `/v1`.
    Cloudflare,
    /// Anthropic Messages API: `{base}/v1/messages`, `x-api-key` header.
    Anthropic,
}

/// Mapping from reasoning effort labels to thinking token budgets.
///
/// Channels may override the defaults per model family; absent entries fall
/// back to the built-in table.
pub type ReasoningBudgetTable = BTreeMap<String, u32>;

/// One outbound provider endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Which platform this endpoint speaks.
    pub platform: PlatformType,

    /// Endpoint base URL. A trailing `##` marks the URL as raw: the adapter
    /// sends to it verbatim without appending an endpoint suffix.
    pub base_url: String,

    /// Send to `base_url` verbatim, without appending the endpoint path.
    /// Equivalent to the `##` suffix on `base_url`.
    #[serde(default)]
    pub raw_url: bool,

    /// Static API key. When absent, the adapter must be constructed with an
    /// explicit key provider; construction fails otherwise.
    #[serde(default)]
    pub api_key: Option<SecretString>,

    /// API version, required by Azure (`api-version` query parameter) and
    /// used as the path version segment for Gemini (defaults to `v1beta`).
    #[serde(default)]
    pub api_version: Option<String>,

    /// Per-channel override of the effort label to thinking budget table.
    #[serde(default)]
    pub reasoning_effort_to_budget: Option<ReasoningBudgetTable>,
}

impl ProviderConfig {
    /// Validate this provider entry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::MissingField("base_url must not be empty".into()));
        }

        if let Err(e) = url::Url::parse(self.trimmed_base_url()) {
            return Err(ConfigError::InvalidField(format!("base_url is not a valid URL: {e}")));
        }

        if self.platform == PlatformType::Azure && self.api_version.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::MissingField(
                "api_version is required for azure providers".into(),
            ));
        }

        Ok(())
    }

    /// Whether the base URL should be used verbatim.
    ///
    /// True when either the `raw_url` flag is set or the URL carries the `##`
    /// suffix convention used by proxies that already encode the path.
    pub fn is_raw_url(&self) -> bool {
        self.raw_url || self.base_url.ends_with("##")
    }

    /// The base URL with the raw-URL marker stripped and no trailing slash.
    pub fn trimmed_base_url(&self) -> &str {
        self.base_url
            .trim_end_matches("##")
            .trim_end_matches('/')
    }

    /// Replace the API key. Callers serialize rotation; no internal locking.
    pub fn set_api_key(&mut self, api_key: SecretString) {
        self.api_key = Some(api_key);
    }

    /// Replace the base URL. Callers serialize rotation; no internal locking.
    pub fn set_base_url(&mut self, base_url: String) {
        self.base_url = base_url;
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use insta::assert_snapshot;

    use super::*;

    fn parse(toml: &str) -> ProviderConfig {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn minimal_openai_provider() {
        let config = parse(indoc! {r#"
            platform = "openai"
            base_url = "https://api.openai.com/v1"
            api_key = "sk-test"
        "#});

        config.validate().unwrap();
        assert!(!config.is_raw_url());
        assert_eq!(config.trimmed_base_url(), "https://api.openai.com/v1");
    }

    #[test]
    fn unknown_platform_is_rejected() {
        let err = toml::from_str::<ProviderConfig>(indoc! {r#"
            platform = "watsonx"
            base_url = "https://example.com"
        "#})
        .unwrap_err();

        assert!(err.to_string().contains("unknown variant"));
    }

    #[test]
    fn azure_requires_api_version() {
        let config = parse(indoc! {r#"
            platform = "azure"
            base_url = "https://my-resource.openai.azure.com"
        "#});

        let err = config.validate().unwrap_err();
        assert_snapshot!(err.to_string(), @"api_version is required for azure providers");

        let config = parse(indoc! {r#"
            platform = "azure"
            base_url = "https://my-resource.openai.azure.com"
            api_version = "preview"
        "#});

        config.validate().unwrap();
    }

    #[test]
    fn empty_base_url_is_rejected() {
        let config = parse(indoc! {r#"
            platform = "gemini"
            base_url = "  "
        "#});

        assert!(config.validate().is_err());
    }

    #[test]
    fn raw_url_marker() {
        let config = parse(indoc! {r#"
            platform = "openai"
            base_url = "https://proxy.internal/llm##"
        "#});

        assert!(config.is_raw_url());
        assert_eq!(config.trimmed_base_url(), "https://proxy.internal/llm");
    }

    #[test]
    fn reasoning_budget_override() {
        let config = parse(indoc! {r#"
            platform = "gemini"
            base_url = "https://generativelanguage.googleapis.com"

            [reasoning_effort_to_budget]
            low = 512
            high = 32768
        "#});

        let table = config.reasoning_effort_to_budget.unwrap();
        assert_eq!(table.get("low"), Some(&512));
        assert_eq!(table.get("high"), Some(&32768));
    }
}
