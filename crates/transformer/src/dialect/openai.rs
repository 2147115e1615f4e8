//! OpenAI-family dialect adapters: chat, embeddings, images and rerank over
//! the OpenAI and Azure platforms.

mod multipart;

use std::sync::Arc;

use async_trait::async_trait;
use config::{PlatformType, ProviderConfig};
use futures::StreamExt;
use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use secrecy::SecretString;

use crate::aggregate::{self, ResponseMeta};
use crate::dialect::{ApiFormat, Inbound, Outbound, ResponseStream, SseFrameStream};
use crate::error::{Error, Result};
use crate::http::{
    ApiKeyProvider, AuthConfig, AuthKind, EventStream, HttpError, HttpRequest, HttpResponse,
    RawRequest, StaticKeyProvider,
};
use crate::messages::unified::TransformerMetadata;
use crate::messages::{openai, unified};
use crate::sse;

/// The image model family whose requests must omit `response_format`.
const RESPONSE_FORMAT_EXEMPT_PREFIX: &str = "gpt-image";

const FORMAT_CHAT: &str = "chat";
const FORMAT_EMBEDDING: &str = "embedding";
const FORMAT_IMAGE: &str = "image";
const FORMAT_RERANK: &str = "rerank";

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

/// Caller-facing adapter for the OpenAI dialect.
#[derive(Debug, Default, Clone, Copy)]
pub struct InboundOpenAi;

#[async_trait]
impl Inbound for InboundOpenAi {
    fn api_format(&self) -> ApiFormat {
        ApiFormat::Openai
    }

    async fn transform_request(&self, raw: RawRequest) -> Result<unified::Request> {
        let path = raw.path.clone();
        let body = raw.body.clone();

        let mut request = if path.ends_with("/chat/completions") {
            let wire: openai::ChatCompletionRequest = parse_json(&body)?;
            unified::Request::from(wire)
        } else if path.ends_with("/embeddings") {
            let wire: openai::EmbeddingsRequest = parse_json(&body)?;
            unified::Request::from(wire)
        } else if path.ends_with("/images/generations") {
            let wire: openai::ImagesRequest = parse_json(&body)?;
            unified::Request::from(wire)
        } else if path.ends_with("/images/edits") {
            self.parse_image_upload(&raw, unified::ImageOperation::Edit).await?
        } else if path.ends_with("/images/variations") {
            self.parse_image_upload(&raw, unified::ImageOperation::Variation).await?
        } else if path.ends_with("/rerank") {
            let wire: openai::RerankRequest = parse_json(&body)?;
            unified::Request::from(wire)
        } else {
            return Err(Error::InvalidRequest(format!("unsupported endpoint: {path}")));
        };

        request.raw_request = Some(Arc::new(raw));
        request.validate()?;

        Ok(request)
    }

    fn transform_response(&self, response: unified::Response) -> Result<HttpResponse> {
        let body = if response.embedding.is_some() {
            serde_json::to_vec(&openai::EmbeddingsResponse::from(response))
        } else if response.image.is_some() {
            serde_json::to_vec(&openai::ImagesResponse::from(response))
        } else if response.rerank.is_some() {
            serde_json::to_vec(&openai::RerankResponse::from(response))
        } else {
            serde_json::to_vec(&openai::ChatCompletionResponse::from(response))
        }
        .map_err(|e| Error::Internal(Some(format!("response serialization failed: {e}"))))?;

        Ok(HttpResponse {
            status: StatusCode::OK,
            headers: json_headers(),
            body,
            metadata: TransformerMetadata::default(),
        })
    }

    fn transform_stream(&self, stream: ResponseStream) -> SseFrameStream {
        let frames = stream.filter_map(|result| async move {
            match result {
                Ok(response) if response.is_done() => None,
                Ok(response) => {
                    let chunk = openai::ChatCompletionChunk::from(response);
                    match sonic_rs::to_string(&chunk) {
                        Ok(json) => Some(Ok(sse::data_frame(&json))),
                        Err(e) => {
                            log::error!("failed to serialize stream chunk: {e}");
                            None
                        }
                    }
                }
                Err(e) => Some(Err(e)),
            }
        });

        frames
            .chain(futures::stream::once(async { Ok(sse::done_frame()) }))
            .boxed()
    }

    fn aggregate_stream_chunks(&self, chunks: &[String]) -> Result<(Vec<u8>, ResponseMeta)> {
        let response = aggregate::aggregate_sse_data(chunks);
        let meta = ResponseMeta::of(&response);

        let body = serde_json::to_vec(&openai::ChatCompletionResponse::from(response))
            .map_err(|e| Error::Internal(Some(format!("aggregate serialization failed: {e}"))))?;

        Ok((body, meta))
    }

    fn transform_error(&self, error: &Error) -> HttpResponse {
        let envelope = openai::ErrorResponse {
            error: openai::ErrorDetails {
                message: error.client_message(),
                kind: error.error_type().to_string(),
                code: error.error_code().map(|code| openai::ErrorCode::String(code.to_string())),
                param: None,
            },
        };

        HttpResponse {
            status: error.status_code(),
            headers: json_headers(),
            body: serde_json::to_vec(&envelope).unwrap_or_default(),
            metadata: TransformerMetadata::default(),
        }
    }
}

impl InboundOpenAi {
    async fn parse_image_upload(
        &self,
        raw: &RawRequest,
        operation: unified::ImageOperation,
    ) -> Result<unified::Request> {
        let content_type = raw
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| Error::InvalidRequest("image uploads must be multipart/form-data".into()))?;

        let form = multipart::parse_image_form(content_type, raw.body.clone(), operation).await?;

        Ok(unified::Request {
            model: form.model.unwrap_or_default(),
            request_type: unified::RequestType::Image,
            api_format: Some(ApiFormat::Openai),
            image: Some(form.image),
            ..Default::default()
        })
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| Error::InvalidRequest(format!("invalid request body: {e}")))
}

/// Provider-facing adapter for OpenAI-compatible upstreams.
pub struct OutboundOpenAi {
    config: ProviderConfig,
    key_provider: Arc<dyn ApiKeyProvider>,
}

impl OutboundOpenAi {
    /// Build an adapter over a validated configuration and key source.
    ///
    /// When no explicit provider is given the configured static key is used;
    /// having neither is a construction error.
    pub fn new(
        config: ProviderConfig,
        key_provider: Option<Arc<dyn ApiKeyProvider>>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::InvalidRequest(e.to_string()))?;

        let key_provider = match key_provider {
            Some(provider) => provider,
            None => Arc::new(StaticKeyProvider::new(static_key(&config)?)),
        };

        Ok(Self { config, key_provider })
    }

    /// Replace the endpoint configuration. Rotation is serialized by the
    /// caller; the adapter takes no locks.
    pub fn set_config(&mut self, config: ProviderConfig) -> Result<()> {
        config
            .validate()
            .map_err(|e| Error::InvalidRequest(e.to_string()))?;
        self.config = config;
        Ok(())
    }

    /// Replace the API key with a static secret.
    pub fn set_api_key(&mut self, key: SecretString) {
        self.key_provider = Arc::new(StaticKeyProvider::new(key));
    }

    /// Replace the base URL.
    pub fn set_base_url(&mut self, base_url: String) {
        self.config.set_base_url(base_url);
    }

    fn endpoint(&self, suffix: &str) -> String {
        let base = self.config.trimmed_base_url();

        if self.config.is_raw_url() {
            return base.to_string();
        }

        match self.config.platform {
            PlatformType::Azure => {
                let api_version = self.config.api_version.as_deref().unwrap_or_default();
                let mut prefix = base.to_string();

                // Do not double-append segments a caller already configured.
                if !prefix.ends_with("/openai") && !prefix.ends_with("/openai/v1") {
                    prefix.push_str("/openai");
                }
                if !prefix.ends_with("/v1") {
                    prefix.push_str("/v1");
                }

                format!("{prefix}/{suffix}?api-version={api_version}")
            }
            _ => format!("{base}/{suffix}"),
        }
    }

    fn auth_kind(&self) -> AuthKind {
        match self.config.platform {
            PlatformType::Azure => AuthKind::Header("Api-Key".to_string()),
            _ => AuthKind::Bearer,
        }
    }

    async fn auth(&self) -> Result<AuthConfig> {
        Ok(AuthConfig {
            kind: self.auth_kind(),
            key: self.key_provider.get().await?,
        })
    }
}

pub(crate) fn static_key(config: &ProviderConfig) -> Result<SecretString> {
    config
        .api_key
        .clone()
        .ok_or_else(|| Error::InvalidRequest("an API key provider is required".into()))
}

#[async_trait]
impl Outbound for OutboundOpenAi {
    fn api_format(&self) -> ApiFormat {
        ApiFormat::Openai
    }

    async fn transform_request(&self, request: unified::Request) -> Result<HttpRequest> {
        request.validate()?;

        let auth = self.auth().await?;
        let mut metadata = TransformerMetadata::default();
        let mut headers = json_headers();
        let request_type = request.request_type;

        let (url, body) = match request_type {
            unified::RequestType::Chat => {
                metadata.set_outbound_format(FORMAT_CHAT);
                let extra_body = request.extra_body.clone();
                let wire = openai::ChatCompletionRequest::from(request);
                let body = merge_extra_body(serialize(&wire)?, extra_body)?;
                (self.endpoint("chat/completions"), body)
            }
            unified::RequestType::Embedding => {
                metadata.set_outbound_format(FORMAT_EMBEDDING);
                let wire = openai::EmbeddingsRequest::try_from(request)?;
                (self.endpoint("embeddings"), serialize(&wire)?)
            }
            unified::RequestType::Image => {
                metadata.set_outbound_format(FORMAT_IMAGE);
                return self.image_request(request, auth, metadata).await;
            }
            unified::RequestType::Rerank => {
                metadata.set_outbound_format(FORMAT_RERANK);
                let wire = openai::RerankRequest::try_from(request)?;
                (self.endpoint("rerank"), serialize(&wire)?)
            }
        };

        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        Ok(HttpRequest {
            method: Method::POST,
            url,
            headers,
            body,
            auth: Some(auth),
            request_type,
            api_format: ApiFormat::Openai,
            metadata,
        })
    }

    fn transform_response(&self, response: HttpResponse) -> Result<unified::Response> {
        let format = response.metadata.outbound_format().unwrap_or(FORMAT_CHAT);

        let unified = match format {
            FORMAT_EMBEDDING => {
                let wire: openai::EmbeddingsResponse = parse_upstream(&response.body)?;
                unified::Response::from(wire)
            }
            FORMAT_IMAGE => {
                let wire: openai::ImagesResponse = parse_upstream(&response.body)?;
                unified::Response::from(wire)
            }
            FORMAT_RERANK => {
                let wire: openai::RerankResponse = parse_upstream(&response.body)?;
                unified::Response::from(wire)
            }
            _ => {
                let wire: openai::ChatCompletionResponse = parse_upstream(&response.body)?;
                unified::Response::from(wire)
            }
        };

        Ok(unified)
    }

    fn transform_stream(&self, stream: EventStream) -> ResponseStream {
        stream
            .filter_map(|event| async move {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => return Some(Err(e)),
                };

                if sse::is_done(&event.data) {
                    return Some(Ok(unified::Response::done()));
                }

                match sonic_rs::from_str::<openai::ChatCompletionChunk>(&event.data) {
                    Ok(chunk) => Some(Ok(unified::Response::from(chunk))),
                    Err(e) => {
                        log::warn!("skipping malformed upstream chunk: {e}");
                        None
                    }
                }
            })
            .boxed()
    }

    fn aggregate_stream_chunks(&self, chunks: &[String]) -> Result<(Vec<u8>, ResponseMeta)> {
        let response = aggregate::aggregate_sse_data(chunks);
        let meta = ResponseMeta::of(&response);

        let body = serde_json::to_vec(&openai::ChatCompletionResponse::from(response))
            .map_err(|e| Error::Internal(Some(format!("aggregate serialization failed: {e}"))))?;

        Ok((body, meta))
    }

    fn transform_error(&self, error: HttpError) -> Error {
        let status = error.status.as_u16();

        match serde_json::from_slice::<openai::ErrorResponse>(&error.body) {
            Ok(envelope) => Error::UpstreamHttp {
                status,
                kind: envelope.error.kind,
                message: envelope.error.message,
                code: envelope.error.code.map(|code| code.to_string()),
            },
            Err(_) => Error::UpstreamHttp {
                status,
                kind: "api_error".to_string(),
                message: String::from_utf8_lossy(&error.body).into_owned(),
                code: None,
            },
        }
    }
}

impl OutboundOpenAi {
    async fn image_request(
        &self,
        request: unified::Request,
        auth: AuthConfig,
        metadata: TransformerMetadata,
    ) -> Result<HttpRequest> {
        let model = request.model.clone();
        let mut image = request
            .image
            .ok_or_else(|| Error::InvalidRequest("image payload is required".into()))?;

        // The gpt-image family rejects response_format; everything else
        // defaults to base64 so the gateway never has to fetch result URLs.
        if model.starts_with(RESPONSE_FORMAT_EXEMPT_PREFIX) {
            image.response_format = None;
        } else if image.response_format.is_none() {
            image.response_format = Some("b64_json".to_string());
        }

        let (url, headers, body) = match image.operation {
            unified::ImageOperation::Generation => {
                let wire = openai::ImagesRequest {
                    prompt: image.prompt.clone().unwrap_or_default(),
                    model: (!model.is_empty()).then_some(model),
                    n: image.n,
                    size: image.size.clone(),
                    quality: image.quality.clone(),
                    style: image.style.clone(),
                    background: image.background.clone(),
                    moderation: image.moderation.clone(),
                    output_format: image.output_format.clone(),
                    output_compression: image.output_compression,
                    partial_images: image.partial_images,
                    response_format: image.response_format.clone(),
                    input_fidelity: image.input_fidelity.clone(),
                    user: image.user.clone(),
                };
                (self.endpoint("images/generations"), json_headers(), serialize(&wire)?)
            }
            unified::ImageOperation::Edit => {
                let (content_type, body) = multipart::build_image_form(&model, &image);
                let mut headers = HeaderMap::new();
                headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_str(&content_type)
                        .map_err(|_| Error::Internal(None))?,
                );
                (self.endpoint("images/edits"), headers, body)
            }
            unified::ImageOperation::Variation => {
                let (content_type, body) = multipart::build_image_form(&model, &image);
                let mut headers = HeaderMap::new();
                headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_str(&content_type)
                        .map_err(|_| Error::Internal(None))?,
                );
                (self.endpoint("images/variations"), headers, body)
            }
        };

        Ok(HttpRequest {
            method: Method::POST,
            url,
            headers,
            body,
            auth: Some(auth),
            request_type: unified::RequestType::Image,
            api_format: ApiFormat::Openai,
            metadata,
        })
    }
}

fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| Error::Internal(Some(format!("request serialization failed: {e}"))))
}

/// Splice caller escape-hatch fields into the outbound body.
///
/// Top-level `extra_body` keys land verbatim in the request JSON; vendor
/// namespaces addressed at other dialects (e.g. `google`) are not forwarded.
fn merge_extra_body(body: Vec<u8>, extra_body: Option<serde_json::Value>) -> Result<Vec<u8>> {
    let Some(serde_json::Value::Object(extra)) = extra_body else {
        return Ok(body);
    };

    let mut value: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| Error::Internal(Some(format!("request serialization failed: {e}"))))?;

    if let Some(object) = value.as_object_mut() {
        for (key, entry) in extra {
            if key == "google" {
                continue;
            }
            object.insert(key, entry);
        }
    }

    serde_json::to_vec(&value)
        .map_err(|e| Error::Internal(Some(format!("request serialization failed: {e}"))))
}

fn parse_upstream<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| Error::InvalidResponse(format!("unparseable upstream body: {e}")))
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use secrecy::SecretString;
    use serde_json::json;

    use super::*;

    fn provider(platform: PlatformType, base_url: &str) -> ProviderConfig {
        ProviderConfig {
            platform,
            base_url: base_url.to_string(),
            raw_url: false,
            api_key: Some(SecretString::from("sk-test".to_string())),
            api_version: (platform == PlatformType::Azure).then(|| "preview".to_string()),
            reasoning_effort_to_budget: None,
        }
    }

    fn outbound(platform: PlatformType, base_url: &str) -> OutboundOpenAi {
        OutboundOpenAi::new(provider(platform, base_url), None).unwrap()
    }

    #[test]
    fn openai_endpoints() {
        let adapter = outbound(PlatformType::Openai, "https://api.openai.com/v1");
        assert_snapshot!(adapter.endpoint("chat/completions"), @"https://api.openai.com/v1/chat/completions");
        assert_snapshot!(adapter.endpoint("embeddings"), @"https://api.openai.com/v1/embeddings");
        assert_snapshot!(adapter.endpoint("images/generations"), @"https://api.openai.com/v1/images/generations");
    }

    #[test]
    fn raw_url_suffix_disables_endpoint_routing() {
        let adapter = outbound(PlatformType::Openai, "https://proxy.internal/custom##");
        assert_snapshot!(adapter.endpoint("chat/completions"), @"https://proxy.internal/custom");
    }

    #[test]
    fn azure_endpoint_does_not_double_append() {
        let adapter = outbound(PlatformType::Azure, "https://my.openai.azure.com");
        assert_snapshot!(adapter.endpoint("chat/completions"), @"https://my.openai.azure.com/openai/v1/chat/completions?api-version=preview");

        let adapter = outbound(PlatformType::Azure, "https://my.openai.azure.com/openai");
        assert_snapshot!(adapter.endpoint("embeddings"), @"https://my.openai.azure.com/openai/v1/embeddings?api-version=preview");

        let adapter = outbound(PlatformType::Azure, "https://my.openai.azure.com/openai/v1");
        assert_snapshot!(adapter.endpoint("embeddings"), @"https://my.openai.azure.com/openai/v1/embeddings?api-version=preview");
    }

    #[test]
    fn azure_uses_api_key_header() {
        let adapter = outbound(PlatformType::Azure, "https://my.openai.azure.com");
        assert_eq!(adapter.auth_kind(), AuthKind::Header("Api-Key".to_string()));

        let adapter = outbound(PlatformType::Openai, "https://api.openai.com/v1");
        assert_eq!(adapter.auth_kind(), AuthKind::Bearer);
    }

    #[test]
    fn construction_requires_a_key_source() {
        let mut config = provider(PlatformType::Openai, "https://api.openai.com/v1");
        config.api_key = None;

        assert!(OutboundOpenAi::new(config.clone(), None).is_err());

        let provider: Arc<dyn ApiKeyProvider> =
            Arc::new(StaticKeyProvider::new(SecretString::from("sk-other".to_string())));
        assert!(OutboundOpenAi::new(config, Some(provider)).is_ok());
    }

    #[tokio::test]
    async fn chat_request_carries_bearer_auth_and_format_tag() {
        let adapter = outbound(PlatformType::Openai, "https://api.openai.com/v1");

        let request = unified::Request {
            model: "gpt-4o".into(),
            messages: vec![unified::Message::text(unified::Role::User, "hi")],
            ..Default::default()
        };

        let http_request = adapter.transform_request(request).await.unwrap();

        assert_eq!(http_request.url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(http_request.metadata.outbound_format(), Some("chat"));
        assert!(matches!(
            http_request.auth.as_ref().unwrap().kind,
            AuthKind::Bearer
        ));
    }

    #[tokio::test]
    async fn gpt_image_omits_response_format_and_others_default_it() {
        let adapter = outbound(PlatformType::Openai, "https://api.openai.com/v1");

        let make = |model: &str| unified::Request {
            model: model.into(),
            request_type: unified::RequestType::Image,
            image: Some(unified::ImageRequest {
                prompt: Some("a fox".into()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let http_request = adapter.transform_request(make("gpt-image-1")).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&http_request.body).unwrap();
        assert!(body.get("response_format").is_none());

        let http_request = adapter.transform_request(make("dall-e-3")).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&http_request.body).unwrap();
        assert_eq!(body["response_format"], "b64_json");
    }

    #[test]
    fn upstream_error_with_envelope_is_parsed() {
        let adapter = outbound(PlatformType::Openai, "https://api.openai.com/v1");

        let error = adapter.transform_error(HttpError {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: serde_json::to_vec(&json!({
                "error": {"message": "slow down", "type": "rate_limit_error", "code": "rate_limited"}
            }))
            .unwrap(),
        });

        assert!(matches!(
            error,
            Error::UpstreamHttp { status: 429, ref kind, .. } if kind == "rate_limit_error"
        ));
    }

    #[test]
    fn upstream_error_without_envelope_keeps_raw_body() {
        let adapter = outbound(PlatformType::Openai, "https://api.openai.com/v1");

        let error = adapter.transform_error(HttpError {
            status: StatusCode::BAD_GATEWAY,
            body: b"<html>upstream down</html>".to_vec(),
        });

        let Error::UpstreamHttp { kind, message, .. } = error else {
            unreachable!("expected upstream error");
        };
        assert_eq!(kind, "api_error");
        assert!(message.contains("upstream down"));
    }

    #[tokio::test]
    async fn inbound_chat_parses_and_validates() {
        let raw = RawRequest {
            path: "/v1/chat/completions".into(),
            body: serde_json::to_vec(&json!({
                "model": "gpt-4o",
                "messages": [{"role": "user", "content": "Hello"}]
            }))
            .unwrap(),
            ..Default::default()
        };

        let request = InboundOpenAi.transform_request(raw).await.unwrap();
        assert_eq!(request.model, "gpt-4o");
        assert_eq!(request.api_format, Some(ApiFormat::Openai));

        let raw = RawRequest {
            path: "/v1/chat/completions".into(),
            body: serde_json::to_vec(&json!({"model": "gpt-4o", "messages": []})).unwrap(),
            ..Default::default()
        };
        assert!(InboundOpenAi.transform_request(raw).await.is_err());
    }

    #[tokio::test]
    async fn inbound_embeddings_rejects_empty_input() {
        let raw = RawRequest {
            path: "/v1/embeddings".into(),
            body: serde_json::to_vec(&json!({"model": "text-embedding-3-small", "input": ""}))
                .unwrap(),
            ..Default::default()
        };

        assert!(matches!(
            InboundOpenAi.transform_request(raw).await,
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn error_envelope_matches_the_dialect() {
        let error = Error::UpstreamHttp {
            status: 400,
            kind: "INVALID_ARGUMENT".to_string(),
            message: "bad".to_string(),
            code: Some("400".to_string()),
        };

        let response = InboundOpenAi.transform_error(&error);
        assert_eq!(response.status, StatusCode::BAD_REQUEST);

        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(
            body,
            json!({"error": {"message": "bad", "type": "INVALID_ARGUMENT", "code": "400"}})
        );
    }

    #[tokio::test]
    async fn stream_transform_appends_done_sentinel() {
        use futures::stream;

        let chunks: ResponseStream = stream::iter(vec![Ok(unified::Response {
            id: "chatcmpl-1".into(),
            object: unified::ObjectType::ChatCompletionChunk,
            model: "gpt-4o".into(),
            choices: vec![unified::Choice {
                index: 0,
                delta: Some(unified::Message::text(unified::Role::Assistant, "Hi")),
                ..Default::default()
            }],
            ..Default::default()
        })])
        .boxed();

        let frames: Vec<String> = InboundOpenAi
            .transform_stream(chunks)
            .map(|frame| frame.unwrap())
            .collect()
            .await;

        assert_eq!(frames.len(), 2);
        assert!(frames[0].starts_with("data: {"));
        assert!(frames[0].contains(r#""content":"Hi""#));
        assert_eq!(frames[1], "data: [DONE]\n\n");
    }
}
