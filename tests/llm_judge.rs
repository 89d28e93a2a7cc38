use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use voxeval::{judge::check_expectation, Expectation, Judge, LlmJudge, LlmJudgeConfig};

const ASK_ORDER: &str = "I can help you with that. Could you please provide your order number?";

/// Canned Ollama-style service.
#[derive(Clone)]
struct MockService {
    tags_status: StatusCode,
    reply: String,
    delay: Duration,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl MockService {
    fn replying(reply: impl Into<String>) -> Self {
        Self {
            tags_status: StatusCode::OK,
            reply: reply.into(),
            delay: Duration::ZERO,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

async fn tags(State(service): State<MockService>) -> StatusCode {
    service.tags_status
}

async fn generate(State(service): State<MockService>, Json(body): Json<Value>) -> Json<Value> {
    service.requests.lock().unwrap().push(body);
    tokio::time::sleep(service.delay).await;
    Json(json!({ "model": "mock", "response": service.reply, "done": true }))
}

async fn serve(service: MockService) -> SocketAddr {
    let app = Router::new()
        .route("/api/tags", get(tags))
        .route("/api/generate", post(generate))
        .with_state(service);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn config_for(addr: SocketAddr) -> LlmJudgeConfig {
    LlmJudgeConfig::new(format!("http://{addr}"), "mock-model")
        .with_probe_timeout(Duration::from_millis(500))
        .with_request_timeout(Duration::from_millis(500))
}

fn judge_for(addr: SocketAddr) -> LlmJudge {
    LlmJudge::new(config_for(addr)).unwrap()
}

#[tokio::test]
async fn model_verdict_is_used_and_sampling_is_pinned() {
    let service = MockService::replying(r#"{"pass": false, "reason": "too vague"}"#);
    let requests = service.requests.clone();
    let judge = judge_for(serve(service).await);

    // rules alone would pass this
    let expectation = Expectation::contains("order number");
    assert!(check_expectation(ASK_ORDER, &expectation));
    assert!(!judge.judge(ASK_ORDER, &expectation).await);

    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let body = &requests[0];
    assert_eq!(body["model"], "mock-model");
    assert_eq!(body["stream"], false);
    assert_eq!(body["format"], "json");
    assert!(body["options"].get("format").is_none());
    assert_eq!(body["options"]["temperature"], 0.0);
    assert_eq!(body["options"]["top_p"], 0.0);
    assert!(body["prompt"].as_str().unwrap().contains(ASK_ORDER));
}

#[tokio::test]
async fn verdict_wrapped_in_prose_is_extracted() {
    let service = MockService::replying("Here you go:\n{\"pass\": true, \"reason\": \"matches\"}\nDone.");
    let judge = judge_for(serve(service).await);

    // rules alone would fail this
    let expectation = Expectation::contains("refund");
    assert!(judge.judge(ASK_ORDER, &expectation).await);
}

#[tokio::test]
async fn unparseable_output_falls_back_to_rules() {
    let service = MockService::replying("I am not able to grade this.");
    let judge = judge_for(serve(service).await);

    assert!(judge.judge(ASK_ORDER, &Expectation::contains("order number")).await);
    assert!(!judge.judge(ASK_ORDER, &Expectation::contains("refund")).await);
}

#[tokio::test]
async fn failed_readiness_check_skips_generation() {
    let mut service = MockService::replying(r#"{"pass": false}"#);
    service.tags_status = StatusCode::SERVICE_UNAVAILABLE;
    let requests = service.requests.clone();
    let judge = judge_for(serve(service).await);

    assert!(judge.judge(ASK_ORDER, &Expectation::contains("order number")).await);
    assert!(requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn slow_generation_times_out_into_fallback() {
    let mut service = MockService::replying(r#"{"pass": false}"#);
    service.delay = Duration::from_secs(3);
    let judge = judge_for(serve(service).await);

    assert!(judge.judge(ASK_ORDER, &Expectation::contains("order number")).await);
}

#[tokio::test]
async fn unreachable_service_matches_rule_judge() {
    // reserve a port, then free it so nothing is listening
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let judge = judge_for(addr);

    let cases = [
        Expectation::contains("order number"),
        Expectation::contains("refund"),
        Expectation::contains_any(["return label", "ORDER NUMBER"]),
        Expectation::contains_any(["return label"]),
        Expectation::new().with("contains_any", json!("order number")),
        Expectation::new().with("unsupported_key", json!("x")),
        Expectation::new(),
    ];

    for expectation in &cases {
        assert_eq!(
            judge.judge(ASK_ORDER, expectation).await,
            check_expectation(ASK_ORDER, expectation),
            "{expectation:?}"
        );
    }
}

#[tokio::test]
async fn debug_logging_keeps_verdicts() {
    let service = MockService::replying(r#"{"pass": false, "reason": "too vague"}"#);
    let addr = serve(service).await;
    let judge = LlmJudge::new(config_for(addr).with_debug(true)).unwrap();
    assert!(judge.config().debug);
    assert!(!judge.judge(ASK_ORDER, &Expectation::contains("order number")).await);

    let mut service = MockService::replying(r#"{"pass": false}"#);
    service.tags_status = StatusCode::SERVICE_UNAVAILABLE;
    let addr = serve(service).await;
    let judge = LlmJudge::new(config_for(addr).with_debug(true)).unwrap();
    assert!(judge.judge(ASK_ORDER, &Expectation::contains("order number")).await);
}
