//! The real instant-answer client wired into a session, against a mock API.
//!
//! Verifies that a usable answer lands in the composed prompt and that every
//! failure mode stays out of it.

use std::sync::Arc;

use parley::store::MemoryStore;
use parley::test_utils::FakeEngineFactory;
use parley::{AppConfig, SessionController, SessionState};
use parley_search::InstantAnswerClient;
use serde_json::json;
use wiremock::matchers::{method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn run_with_search(server: &MockServer, prompt: &str) -> String {
    let mut config = AppConfig::default();
    config.search.base_url = format!("{}/", server.uri());
    config.search.connect_timeout_secs = 1;
    config.search.read_timeout_secs = 1;

    let factory = FakeEngineFactory::replying("ok");
    let prompts = factory.prompt_log();
    let search = InstantAnswerClient::new(config.search.to_search_config()).unwrap();
    let s = SessionController::new(
        config,
        Arc::new(factory),
        Arc::new(search),
        Arc::new(MemoryStore::new()),
    );
    s.set_use_web_search(true);
    s.start();
    s.wait_until_settled().await;

    s.submit_prompt(prompt).unwrap();
    assert_eq!(s.wait_until_settled().await, SessionState::Ready("ok".into()));

    let log = prompts.lock().unwrap();
    log[0].clone()
}

#[tokio::test]
async fn abstract_text_is_injected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("q", "capital of france"))
        .and(query_param("format", "json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"AbstractText": "Paris is the capital of France."})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let prompt = run_with_search(&server, "capital of france").await;
    assert!(prompt.contains("Relevant Information:\nWeb search result: Paris is the capital of France."));
}

#[tokio::test]
async fn http_failure_is_not_injected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let prompt = run_with_search(&server, "anything").await;
    assert!(!prompt.contains("Relevant Information"));
    assert!(!prompt.contains("Web search failed"));
}

#[tokio::test]
async fn empty_answer_is_not_injected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"AbstractText": ""})))
        .mount(&server)
        .await;

    let prompt = run_with_search(&server, "anything").await;
    assert!(!prompt.contains("Relevant Information"));
    assert!(!prompt.contains("No web results found."));
}
