use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use reqwest::{Client, Url};
use serde_json::json;

use copyforge::llm::{
    ChatCompletionGenerator, CopyGenerationError, CopyProvider, GeminiGenerator, ProviderSelection,
    RetryPolicy,
};
use copyforge::{CopyBrief, GenerationParams};

const GEMINI_PATH: &str = "/v1beta/models/test:generateContent";

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

async fn spawn_stub(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn failing_stub(status: StatusCode, hits: Arc<AtomicUsize>) -> Router {
    Router::new()
        .route(
            GEMINI_PATH,
            post(
                move |State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (status, "upstream unhappy")
                },
            ),
        )
        .with_state(hits)
}

fn gemini_at(addr: SocketAddr, policy: RetryPolicy) -> GeminiGenerator {
    let endpoint = Url::parse(&format!("http://{}{}", addr, GEMINI_PATH)).unwrap();
    GeminiGenerator::from_parts(
        Client::new(),
        "test-key",
        endpoint,
        GenerationParams::default(),
        policy,
    )
}

#[tokio::test]
async fn persistent_server_errors_exhaust_retries_then_surface() {
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = spawn_stub(failing_stub(StatusCode::INTERNAL_SERVER_ERROR, hits.clone())).await;

    let backend = gemini_at(addr, fast_policy(3));
    let err = backend.generate("test prompt").await.unwrap_err();

    assert!(matches!(
        err,
        CopyGenerationError::HttpStatus { provider: "gemini", status, .. }
            if status == StatusCode::INTERNAL_SERVER_ERROR
    ));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn rate_limiting_is_retried() {
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = spawn_stub(failing_stub(StatusCode::TOO_MANY_REQUESTS, hits.clone())).await;

    let backend = gemini_at(addr, fast_policy(2));
    let err = backend.generate("test prompt").await.unwrap_err();

    assert!(matches!(err, CopyGenerationError::HttpStatus { .. }));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn client_errors_fail_fast_without_retrying() {
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = spawn_stub(failing_stub(StatusCode::UNAUTHORIZED, hits.clone())).await;

    let backend = gemini_at(addr, fast_policy(6));
    let err = backend.generate("test prompt").await.unwrap_err();

    assert!(matches!(
        err,
        CopyGenerationError::HttpStatus { status, .. }
            if status == StatusCode::UNAUTHORIZED
    ));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transport_errors_surface_after_retries() {
    // Bind then drop the listener so the port refuses connections.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let backend = gemini_at(addr, fast_policy(2));
    let err = backend.generate("test prompt").await.unwrap_err();
    assert!(matches!(
        err,
        CopyGenerationError::Http { provider: "gemini", .. }
    ));
}

#[tokio::test]
async fn gemini_success_returns_first_candidate_text() {
    let router = Router::new().route(
        GEMINI_PATH,
        post(|| async {
            Json(json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "Compelling copy, delivered." }] }
                }]
            }))
        }),
    );
    let addr = spawn_stub(router).await;

    let backend = gemini_at(addr, fast_policy(2));
    let text = backend.generate("test prompt").await.unwrap();
    assert_eq!(text, "Compelling copy, delivered.");
}

#[tokio::test]
async fn auto_selection_falls_through_to_next_backend() {
    // Gemini stub always fails; OpenAI stub succeeds.
    let hits = Arc::new(AtomicUsize::new(0));
    let gemini_addr =
        spawn_stub(failing_stub(StatusCode::INTERNAL_SERVER_ERROR, hits.clone())).await;

    let openai_router = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            Json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "fallback copy" } }]
            }))
        }),
    );
    let openai_addr = spawn_stub(openai_router).await;

    let gemini = gemini_at(gemini_addr, fast_policy(1));
    let openai = ChatCompletionGenerator::from_parts(
        Client::new(),
        "test-key",
        "gpt-4o-mini",
        Url::parse(&format!("http://{}/v1/chat/completions", openai_addr)).unwrap(),
        GenerationParams::default(),
        fast_policy(1),
    );

    let provider = CopyProvider::from_parts(ProviderSelection::Auto, Some(gemini), Some(openai));
    let brief = CopyBrief::new("rapport", "reasons", "results");
    let copy = provider.generate(&brief).await.unwrap();

    assert_eq!(copy.text, "fallback copy");
    assert_eq!(copy.provider.as_str(), "openai");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
