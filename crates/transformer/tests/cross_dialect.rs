//! Cross-dialect flows through the public adapter surface: a caller speaking
//! one dialect served by an upstream speaking another, with nothing
//! observable lost in between.

use std::sync::Arc;

use secrecy::SecretString;
use serde_json::{Value, json};

use transformer::dialect::anthropic::OutboundAnthropic;
use transformer::dialect::gemini::{InboundGemini, OutboundGemini};
use transformer::dialect::openai::{InboundOpenAi, OutboundOpenAi};
use transformer::dialect::{Inbound, Outbound};
use transformer::http::{HttpResponse, RawRequest};
use transformer::messages::unified::TransformerMetadata;

fn provider(platform: config::PlatformType, base_url: &str) -> config::ProviderConfig {
    config::ProviderConfig {
        platform,
        base_url: base_url.to_string(),
        raw_url: false,
        api_key: Some(SecretString::from("test-key".to_string())),
        api_version: None,
        reasoning_effort_to_budget: None,
    }
}

fn gemini_outbound() -> OutboundGemini {
    OutboundGemini::new(
        provider(
            config::PlatformType::Gemini,
            "https://generativelanguage.googleapis.com",
        ),
        None,
    )
    .unwrap()
}

fn openai_outbound() -> OutboundOpenAi {
    OutboundOpenAi::new(
        provider(config::PlatformType::Openai, "https://api.openai.com/v1"),
        None,
    )
    .unwrap()
}

fn openai_raw(body: Value) -> RawRequest {
    RawRequest {
        path: "/v1/chat/completions".into(),
        body: serde_json::to_vec(&body).unwrap(),
        ..Default::default()
    }
}

fn upstream(body: Value) -> HttpResponse {
    HttpResponse {
        status: http::StatusCode::OK,
        headers: http::HeaderMap::new(),
        body: serde_json::to_vec(&body).unwrap(),
        metadata: TransformerMetadata::default(),
    }
}

/// An OpenAI-shaped chat call addressed to a Gemini upstream lands on the
/// generateContent endpoint with the right body.
#[tokio::test]
async fn openai_caller_gemini_upstream_simple_chat() {
    let unified = InboundOpenAi
        .transform_request(openai_raw(json!({
            "model": "gemini-2.5-flash",
            "messages": [{"role": "user", "content": "Hello"}],
            "max_tokens": 1024
        })))
        .await
        .unwrap();

    let request = gemini_outbound().transform_request(unified).await.unwrap();

    assert_eq!(
        request.url,
        "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
    );

    let body: Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(
        body["contents"],
        json!([{"role": "user", "parts": [{"text": "Hello"}]}])
    );
    assert_eq!(body["generationConfig"]["maxOutputTokens"], 1024);
}

/// Effort labels become thinking budgets; explicit budgets are capped at the
/// documented maximum.
#[tokio::test]
async fn reasoning_effort_maps_to_thinking_budget() {
    let unified = InboundOpenAi
        .transform_request(openai_raw(json!({
            "model": "gemini-2.5-flash",
            "messages": [{"role": "user", "content": "hi"}],
            "reasoning_effort": "high"
        })))
        .await
        .unwrap();

    let request = gemini_outbound().transform_request(unified).await.unwrap();
    let body: Value = serde_json::from_slice(&request.body).unwrap();

    let thinking = &body["generationConfig"]["thinkingConfig"];
    assert_eq!(thinking["includeThoughts"], true);
    assert_eq!(thinking["thinkingBudget"], 24576);

    let mut unified = InboundOpenAi
        .transform_request(openai_raw(json!({
            "model": "gemini-2.5-flash",
            "messages": [{"role": "user", "content": "hi"}]
        })))
        .await
        .unwrap();
    unified.reasoning_budget = Some(50000);

    let request = gemini_outbound().transform_request(unified).await.unwrap();
    let body: Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(
        body["generationConfig"]["thinkingConfig"]["thinkingBudget"],
        24576
    );
}

/// A Gemini response with parallel function calls and a thought signature
/// survives the round trip: the signature comes back on the first call part,
/// bit for bit, and the second part stays unsigned.
#[tokio::test]
async fn thought_signature_round_trips_through_the_unified_model() {
    let outbound = gemini_outbound();

    let response = outbound
        .transform_response(upstream(json!({
            "responseId": "r-1",
            "modelVersion": "gemini-2.5-flash",
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"functionCall": {"name": "first", "args": {"a": 1}},
                     "thoughtSignature": "sigA"},
                    {"functionCall": {"name": "second", "args": {}}}
                ]},
                "finishReason": "STOP"
            }]
        })))
        .unwrap();

    let mut message = response.choices[0].message.clone().unwrap();
    assert!(message.redacted_reasoning_content.is_some());

    // Next turn: the assistant message goes back out with a tool result.
    let calls = message.tool_calls.clone().unwrap();
    message.role = transformer::messages::unified::Role::Assistant;

    let unified = transformer::messages::unified::Request {
        model: "gemini-2.5-flash".into(),
        messages: vec![
            transformer::messages::unified::Message::text(
                transformer::messages::unified::Role::User,
                "go",
            ),
            message,
            transformer::messages::unified::Message {
                role: transformer::messages::unified::Role::Tool,
                content: Some(transformer::messages::unified::MessageContent::Text("{}".into())),
                tool_call_id: Some(calls[0].id.clone()),
                tool_call_name: Some("first".into()),
                ..Default::default()
            },
        ],
        ..Default::default()
    };

    let request = gemini_outbound().transform_request(unified).await.unwrap();
    let body: Value = serde_json::from_slice(&request.body).unwrap();

    let parts = body["contents"][1]["parts"].as_array().unwrap();
    assert_eq!(parts[0]["thoughtSignature"], "sigA");
    assert_eq!(parts[0]["functionCall"]["name"], "first");
    assert!(parts[1].get("thoughtSignature").is_none());
    assert_eq!(parts[1]["functionCall"]["name"], "second");

    let response = &body["contents"][2]["parts"][0]["functionResponse"];
    assert_eq!(response["name"], "first");
}

/// A stream of chunks folds into the synthetic unary response.
#[test]
fn stream_aggregation_produces_unary_response() {
    let chunks = vec![
        json!({
            "id": "chatcmpl-1", "object": "chat.completion.chunk", "created": 99,
            "model": "gpt-4o",
            "choices": [{"index": 0, "delta": {"role": "assistant", "content": "Hello"}}]
        })
        .to_string(),
        json!({
            "id": "chatcmpl-1", "object": "chat.completion.chunk", "created": 99,
            "model": "gpt-4o",
            "choices": [{"index": 0, "delta": {"content": ", world!"}, "finish_reason": "stop"}]
        })
        .to_string(),
        "[DONE]".to_string(),
    ];

    let (body, meta) = openai_outbound().aggregate_stream_chunks(&chunks).unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["choices"][0]["message"]["content"], "Hello, world!");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(meta.id, "chatcmpl-1");
    assert_eq!(meta.model, "gpt-4o");
}

/// The same OpenAI request parsed and re-emitted is unchanged.
#[tokio::test]
async fn openai_request_round_trip_is_lossless() {
    let fixture = json!({
        "model": "gpt-4o",
        "messages": [
            {"role": "system", "content": "be helpful"},
            {"role": "user", "content": "Hello"},
            {"role": "assistant", "tool_calls": [
                {"id": "call_1", "type": "function",
                 "function": {"name": "f", "arguments": "{}"}}
            ]},
            {"role": "tool", "tool_call_id": "call_1", "name": "f", "content": "{}"}
        ],
        "max_tokens": 256,
        "temperature": 0.7,
        "stop": "END",
        "stream": true,
        "tools": [{"type": "function", "function": {
            "name": "f", "description": "d",
            "parameters": {"type": "object", "properties": {}}
        }}],
        "tool_choice": {"type": "function", "function": {"name": "f"}}
    });

    let unified = InboundOpenAi
        .transform_request(openai_raw(fixture.clone()))
        .await
        .unwrap();

    let request = openai_outbound().transform_request(unified).await.unwrap();
    let body: Value = serde_json::from_slice(&request.body).unwrap();

    assert_eq!(body, fixture);
}

/// A Gemini-dialect caller served by an Anthropic upstream keeps roles,
/// tool names and usage counts.
#[tokio::test]
async fn gemini_caller_anthropic_upstream_preserves_observables() {
    let outbound = OutboundAnthropic::new(
        provider(config::PlatformType::Anthropic, "https://api.anthropic.com"),
        None,
    )
    .unwrap();

    let unified = InboundGemini
        .transform_request(RawRequest {
            path: "/v1beta/models/claude-sonnet-4-20250514:generateContent".into(),
            body: serde_json::to_vec(&json!({
                "systemInstruction": {"parts": [{"text": "be terse"}]},
                "contents": [{"role": "user", "parts": [{"text": "Hello"}]}],
                "generationConfig": {"maxOutputTokens": 512}
            }))
            .unwrap(),
            ..Default::default()
        })
        .await
        .unwrap();

    let request = outbound.transform_request(unified).await.unwrap();
    assert_eq!(request.url, "https://api.anthropic.com/v1/messages");

    let body: Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body["max_tokens"], 512);
    assert_eq!(body["system"][0]["text"], "be terse");
    assert_eq!(body["messages"][0]["role"], "user");

    let response = outbound
        .transform_response(upstream(json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "model": "claude-sonnet-4-20250514",
            "content": [{"type": "text", "text": "Hi."}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 7, "output_tokens": 2}
        })))
        .unwrap();

    let rendered = InboundGemini.transform_response(response).unwrap();
    let body: Value = serde_json::from_slice(&rendered.body).unwrap();

    assert_eq!(body["candidates"][0]["content"]["role"], "model");
    assert_eq!(body["candidates"][0]["content"]["parts"][0]["text"], "Hi.");
    assert_eq!(body["candidates"][0]["finishReason"], "STOP");
    assert_eq!(body["usageMetadata"]["promptTokenCount"], 7);
    assert_eq!(body["usageMetadata"]["totalTokenCount"], 9);
}

/// Arc-shared origin envelopes stay readable from the outbound side.
#[tokio::test]
async fn raw_request_back_reference_is_shared() {
    let mut raw = openai_raw(json!({
        "model": "gpt-4o",
        "messages": [{"role": "user", "content": "hi"}]
    }));
    raw.query.insert("trace".into(), "on".into());

    let unified = InboundOpenAi.transform_request(raw).await.unwrap();
    let envelope: &Arc<RawRequest> = unified.raw_request.as_ref().unwrap();

    assert_eq!(envelope.query.get("trace").map(String::as_str), Some("on"));
}
