//! Opaque wrapping for vendor thought signatures.
//!
//! Some providers attach an opaque signature to reasoning output that must be
//! returned verbatim on the next turn. While such a signature transits a
//! foreign dialect it is wrapped into a tagged, base64-encoded blob so no
//! intermediate layer mistakes it for content or mutates it. The prefix is a
//! per-vendor namespace: signatures from different dialects never collide.

use base64::{Engine as _, engine::general_purpose::STANDARD};

/// Codec for one vendor's signature namespace.
#[derive(Debug, Clone, Copy)]
pub struct SignatureCodec {
    prefix: &'static str,
}

/// Namespace for Gemini thought signatures.
pub const GEMINI: SignatureCodec = SignatureCodec::new("gemini-thought-signature");

/// Namespace for Anthropic thinking signatures.
pub const ANTHROPIC: SignatureCodec = SignatureCodec::new("anthropic-thinking-signature");

impl SignatureCodec {
    const fn new(prefix: &'static str) -> Self {
        Self { prefix }
    }

    /// Wrap a provider signature into the opaque transit form.
    pub fn encode(&self, signature: &str) -> String {
        format!("{}:{}", self.prefix, STANDARD.encode(signature))
    }

    /// Recover the original signature from the transit form.
    ///
    /// Returns `None` for values outside this namespace or with a corrupt
    /// payload. Callers check [`SignatureCodec::is_tag`] first so unrelated
    /// content is never decoded by accident.
    pub fn decode(&self, tag: &str) -> Option<String> {
        let encoded = tag.strip_prefix(self.prefix)?.strip_prefix(':')?;
        let bytes = STANDARD.decode(encoded).ok()?;
        String::from_utf8(bytes).ok()
    }

    /// Whether a value belongs to this namespace.
    pub fn is_tag(&self, value: &str) -> bool {
        value
            .strip_prefix(self.prefix)
            .is_some_and(|rest| rest.starts_with(':'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let tag = GEMINI.encode("sig-bytes-123");
        assert!(GEMINI.is_tag(&tag));
        assert_eq!(GEMINI.decode(&tag).as_deref(), Some("sig-bytes-123"));
    }

    #[test]
    fn namespaces_do_not_collide() {
        let tag = GEMINI.encode("abc");
        assert!(!ANTHROPIC.is_tag(&tag));
        assert_eq!(ANTHROPIC.decode(&tag), None);
    }

    #[test]
    fn unrelated_content_is_not_a_tag() {
        assert!(!GEMINI.is_tag("just some text"));
        assert!(!GEMINI.is_tag("gemini-thought-signatureXYZ"));
        assert_eq!(GEMINI.decode("data:image/png;base64,AAAA"), None);
    }

    #[test]
    fn corrupt_payload_decodes_to_none() {
        assert_eq!(GEMINI.decode("gemini-thought-signature:!!!not-base64!!!"), None);
    }
}
