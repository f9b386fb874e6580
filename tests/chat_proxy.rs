//! End-to-end tests for the chat route against a mocked upstream provider

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use chat_proxy::{
    api::CompletionRequest,
    build_router,
    config::{AppConfig, DEFAULT_SYSTEM_PROMPT},
    ProxyState, TiktokenCounter, TokenCounter,
};
use futures::stream;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceExt;
use wiremock::matchers::{header as header_eq, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "sk-test-key";
const GENERIC_ERROR_BODY: &str = r#"{"error":"There was an error processing your request"}"#;
const HI_CHUNK: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n";

// ─── Setup ───────────────────────────────────────────────────────────────────

fn router_for(upstream: &MockServer, api_key: Option<&str>) -> Router {
    let mut config = AppConfig::default();
    config.upstream.url = upstream.uri();

    let tokenizer = TiktokenCounter::for_model(&config.policy.model).unwrap();
    router_with(config, Arc::new(tokenizer), api_key)
}

fn router_with(config: AppConfig, tokenizer: Arc<dyn TokenCounter>, api_key: Option<&str>) -> Router {
    let state = ProxyState::new(
        config,
        tokenizer,
        api_key.map(|k| secrecy::SecretString::from(k.to_string())),
    )
    .unwrap();

    build_router(state)
}

/// One token per whitespace-separated word
struct WordCounter;

impl TokenCounter for WordCounter {
    fn count_tokens(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// Router with a word-counting tokenizer, a two-word system prompt and a limit of 10 tokens
fn word_budget_router(upstream: &MockServer) -> Router {
    let mut config = AppConfig::default();
    config.upstream.url = upstream.uri();
    config.policy.system_prompt = "backlog coach".to_string();
    config.policy.token_limit = 10;

    router_with(config, Arc::new(WordCounter), Some(API_KEY))
}

fn chat_request(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

fn moderation_result(flagged: bool) -> serde_json::Value {
    json!({
        "id": "modr-test",
        "model": "text-moderation-007",
        "results": [{
            "flagged": flagged,
            "categories": {"harassment": flagged, "violence": false},
            "category_scores": {"harassment": if flagged { 0.97 } else { 0.01 }, "violence": 0.0}
        }]
    })
}

async fn mount_moderation(server: &MockServer, flagged: bool, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/v1/moderations"))
        .and(header_eq("authorization", "Bearer sk-test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(moderation_result(flagged)))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_completion(server: &MockServer, response: ResponseTemplate, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header_eq("authorization", "Bearer sk-test-key"))
        .respond_with(response)
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn sse_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream")
}

async fn assert_generic_error(response: axum::response::Response) {
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(std::str::from_utf8(&body).unwrap(), GENERIC_ERROR_BODY);
}

// ─── Happy path ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_streams_completion_verbatim() {
    let upstream = MockServer::start().await;
    mount_moderation(&upstream, false, 1).await;
    mount_completion(&upstream, sse_response(HI_CHUNK), 1).await;

    let response = router_for(&upstream, Some(API_KEY))
        .oneshot(chat_request(r#"{"messages":[{"role":"user","content":"hello"}]}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(std::str::from_utf8(&body).unwrap(), HI_CHUNK);
}

#[tokio::test]
async fn test_multi_event_stream_is_byte_identical() {
    let stream = concat!(
        "data: {\"id\":\"chatcmpl-1\",\"object\":\"chat.completion.chunk\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"},\"finish_reason\":null}]}\n\n",
        "data: {\"id\":\"chatcmpl-1\",\"object\":\"chat.completion.chunk\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"[{\\\"role\\\": \\\"coach\\\"\"},\"finish_reason\":null}]}\n\n",
        "data: {\"id\":\"chatcmpl-1\",\"object\":\"chat.completion.chunk\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n"
    );

    let upstream = MockServer::start().await;
    mount_moderation(&upstream, false, 1).await;
    mount_completion(&upstream, sse_response(stream), 1).await;

    let response = router_for(&upstream, Some(API_KEY))
        .oneshot(chat_request(r#"{"messages":[{"role":"user","content":"As a user I want to log in"}]}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], stream.as_bytes());
}

#[tokio::test]
async fn test_outbound_payloads() {
    let upstream = MockServer::start().await;
    mount_moderation(&upstream, false, 1).await;
    mount_completion(&upstream, sse_response(HI_CHUNK), 1).await;

    let body = json!({
        "messages": [
            {"role": "user", "content": "As a shopper I want a wishlist"},
            {"role": "assistant", "content": "Who benefits?"},
            {"role": "user", "content": "Returning customers"}
        ]
    });

    let response = router_for(&upstream, Some(API_KEY))
        .oneshot(chat_request(body.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let received = upstream.received_requests().await.unwrap();
    assert_eq!(received.len(), 2);

    // Moderation sees only the last message
    let moderation: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(moderation, json!({"input": "Returning customers"}));

    let completion: CompletionRequest = serde_json::from_slice(&received[1].body).unwrap();
    assert_eq!(completion.model, "gpt-3.5-turbo");
    assert_eq!(completion.temperature, 0.7);
    assert!(completion.stream);
    assert_eq!(completion.messages.len(), 4);
    assert_eq!(completion.messages[0].role.as_str(), "system");
    assert_eq!(completion.messages[0].content, DEFAULT_SYSTEM_PROMPT);
    assert_eq!(completion.messages[1].content, "As a shopper I want a wishlist");
    assert_eq!(completion.messages[2].content, "Who benefits?");
    assert_eq!(completion.messages[3].content, "Returning customers");
}

// ─── Rejections before any upstream call ─────────────────────────────────────

#[tokio::test]
async fn test_missing_messages_never_calls_upstream() {
    let upstream = MockServer::start().await;
    mount_moderation(&upstream, false, 0).await;
    mount_completion(&upstream, sse_response(HI_CHUNK), 0).await;

    for body in ["", "{}", r#"{"prompt":"hello"}"#, r#"{"messages":[]}"#, "garbage"] {
        let response = router_for(&upstream, Some(API_KEY))
            .oneshot(chat_request(body))
            .await
            .unwrap();
        assert_generic_error(response).await;
    }
}

#[tokio::test]
async fn test_missing_api_key_never_calls_upstream() {
    let upstream = MockServer::start().await;
    mount_moderation(&upstream, false, 0).await;
    mount_completion(&upstream, sse_response(HI_CHUNK), 0).await;

    let response = router_for(&upstream, None)
        .oneshot(chat_request(r#"{"messages":[{"role":"user","content":"hello"}]}"#))
        .await
        .unwrap();
    assert_generic_error(response).await;
}

// ─── Moderation and quota ────────────────────────────────────────────────────

#[tokio::test]
async fn test_flagged_message_never_calls_completion() {
    let upstream = MockServer::start().await;
    mount_moderation(&upstream, true, 1).await;
    mount_completion(&upstream, sse_response(HI_CHUNK), 0).await;

    let response = router_for(&upstream, Some(API_KEY))
        .oneshot(chat_request(r#"{"messages":[{"role":"user","content":"something awful"}]}"#))
        .await
        .unwrap();
    assert_generic_error(response).await;
}

#[tokio::test]
async fn test_oversized_conversation_is_moderated_then_rejected() {
    let upstream = MockServer::start().await;
    mount_moderation(&upstream, false, 1).await;
    mount_completion(&upstream, sse_response(HI_CHUNK), 0).await;

    let body = json!({
        "messages": [
            {"role": "user", "content": "backlog ".repeat(5000)},
            {"role": "user", "content": "please review"}
        ]
    });

    let response = router_for(&upstream, Some(API_KEY))
        .oneshot(chat_request(body.to_string()))
        .await
        .unwrap();
    assert_generic_error(response).await;
}

#[tokio::test]
async fn test_one_token_under_limit_is_completed() {
    let upstream = MockServer::start().await;
    mount_moderation(&upstream, false, 1).await;
    mount_completion(&upstream, sse_response(HI_CHUNK), 1).await;

    // 7 words + 2 system prompt words = 9 tokens
    let body = json!({
        "messages": [{"role": "user", "content": "as a user I want to login"}]
    });

    let response = word_budget_router(&upstream)
        .oneshot(chat_request(body.to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(std::str::from_utf8(&body).unwrap(), HI_CHUNK);
}

#[tokio::test]
async fn test_exactly_at_limit_is_rejected() {
    let upstream = MockServer::start().await;
    mount_moderation(&upstream, false, 1).await;
    mount_completion(&upstream, sse_response(HI_CHUNK), 0).await;

    // 6 + 2 words across two messages + 2 system prompt words = 10 tokens
    let body = json!({
        "messages": [
            {"role": "user", "content": "as a user I want to"},
            {"role": "user", "content": "log in"}
        ]
    });

    let response = word_budget_router(&upstream)
        .oneshot(chat_request(body.to_string()))
        .await
        .unwrap();
    assert_generic_error(response).await;
}

#[tokio::test]
async fn test_oversized_and_flagged_is_rejected_by_moderation_first() {
    let upstream = MockServer::start().await;
    mount_moderation(&upstream, true, 1).await;
    mount_completion(&upstream, sse_response(HI_CHUNK), 0).await;

    let body = json!({
        "messages": [{"role": "user", "content": "backlog ".repeat(5000)}]
    });

    let response = router_for(&upstream, Some(API_KEY))
        .oneshot(chat_request(body.to_string()))
        .await
        .unwrap();
    assert_generic_error(response).await;
}

#[tokio::test]
async fn test_moderation_failure_never_calls_completion() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/moderations"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": {"message": "Incorrect API key"}})))
        .expect(1)
        .mount(&upstream)
        .await;
    mount_completion(&upstream, sse_response(HI_CHUNK), 0).await;

    let response = router_for(&upstream, Some(API_KEY))
        .oneshot(chat_request(r#"{"messages":[{"role":"user","content":"hello"}]}"#))
        .await
        .unwrap();
    assert_generic_error(response).await;
}

#[tokio::test]
async fn test_empty_moderation_results_never_calls_completion() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/moderations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(1)
        .mount(&upstream)
        .await;
    mount_completion(&upstream, sse_response(HI_CHUNK), 0).await;

    let response = router_for(&upstream, Some(API_KEY))
        .oneshot(chat_request(r#"{"messages":[{"role":"user","content":"hello"}]}"#))
        .await
        .unwrap();
    assert_generic_error(response).await;
}

// ─── Upstream completion errors ──────────────────────────────────────────────

#[tokio::test]
async fn test_completion_error_is_not_leaked() {
    let upstream = MockServer::start().await;
    mount_moderation(&upstream, false, 1).await;
    mount_completion(
        &upstream,
        ResponseTemplate::new(400).set_body_raw(r#"{"error":"bad request"}"#, "application/json"),
        1,
    )
    .await;

    let response = router_for(&upstream, Some(API_KEY))
        .oneshot(chat_request(r#"{"messages":[{"role":"user","content":"hello"}]}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = std::str::from_utf8(&body).unwrap();
    assert_eq!(text, GENERIC_ERROR_BODY);
    assert!(!text.contains("bad request"));
}

// ─── Slow upstream ───────────────────────────────────────────────────────────

/// Local provider whose completion trickles out `chunks` events, `gap` apart
async fn spawn_slow_upstream(chunks: usize, gap: Duration) -> String {
    let app = Router::new()
        .route(
            "/v1/moderations",
            post(|| async { Json(moderation_result(false)) }),
        )
        .route(
            "/v1/chat/completions",
            post(move || async move {
                let events = stream::unfold(0, move |sent| async move {
                    if sent == chunks {
                        return None;
                    }
                    tokio::time::sleep(gap).await;
                    let event = Bytes::from(format!("data: {{\"n\":{}}}\n\n", sent));
                    Some((Ok::<_, std::io::Error>(event), sent + 1))
                });
                ([(header::CONTENT_TYPE, "text/event-stream")], Body::from_stream(events))
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_stream_may_outlast_read_timeout() {
    let mut config = AppConfig::default();
    config.upstream.url = spawn_slow_upstream(3, Duration::from_millis(600)).await;
    config.upstream.timeout_seconds = 1;

    let tokenizer = TiktokenCounter::for_model(&config.policy.model).unwrap();
    let router = router_with(config, Arc::new(tokenizer), Some(API_KEY));

    let started = Instant::now();
    let response = router
        .oneshot(chat_request(r#"{"messages":[{"role":"user","content":"hello"}]}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(
        std::str::from_utf8(&body).unwrap(),
        "data: {\"n\":0}\n\ndata: {\"n\":1}\n\ndata: {\"n\":2}\n\n"
    );
    assert!(started.elapsed() > Duration::from_secs(1));
}

// ─── Other routes ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health() {
    let upstream = MockServer::start().await;
    let response = router_for(&upstream, Some(API_KEY))
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"OK");
}

#[tokio::test]
async fn test_chat_route_rejects_get() {
    let upstream = MockServer::start().await;
    let response = router_for(&upstream, Some(API_KEY))
        .oneshot(Request::builder().uri("/api/chat").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
