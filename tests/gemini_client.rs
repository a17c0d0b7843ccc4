//! `GeminiClient` against a local stand-in for the generateContent endpoint.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use wellbeing_chat::llm::{ChatModel, GeminiClient, LlmError};
use wellbeing_chat::{Request, Response, Server, StatusCode};

/// What the stand-in saw for the last call.
#[derive(Debug, Default, Clone)]
struct Seen {
    path: String,
    api_key: Option<String>,
    body: Value,
}

async fn fake_gemini(status: StatusCode, reply: Value) -> (SocketAddr, Arc<Mutex<Seen>>) {
    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr();
    let seen = Arc::new(Mutex::new(Seen::default()));

    let recorder = Arc::clone(&seen);
    tokio::spawn(server.run(move |req: Request| {
        let recorder = Arc::clone(&recorder);
        let reply = reply.clone();
        async move {
            *recorder.lock().unwrap() = Seen {
                path: req.path().to_owned(),
                api_key: req.headers().get("x-goog-api-key").map(str::to_owned),
                body: serde_json::from_slice(req.body()).unwrap_or(Value::Null),
            };
            Response::json(status, &reply)
        }
    }));

    (addr, seen)
}

fn client(addr: SocketAddr) -> GeminiClient {
    GeminiClient::new("test-key")
        .with_model("gemini-test")
        .with_base_url(format!("http://{addr}/v1beta/models"))
}

#[tokio::test]
async fn sends_instruction_and_text_and_returns_reply() {
    let (addr, seen) = fake_gemini(
        StatusCode::Ok,
        json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Take a slow "}, {"text": "breath."}]},
                "finishReason": "STOP"
            }]
        }),
    )
    .await;

    let reply = client(addr)
        .generate("You are a well-being officer.", "I feel stressed")
        .await
        .unwrap();
    assert_eq!(reply, "Take a slow breath.");

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.path, "/v1beta/models/gemini-test:generateContent");
    assert_eq!(seen.api_key.as_deref(), Some("test-key"));
    assert_eq!(
        seen.body,
        json!({
            "contents": [{"role": "user", "parts": [{"text": "I feel stressed"}]}],
            "system_instruction": {"parts": [{"text": "You are a well-being officer."}]}
        })
    );
}

#[tokio::test]
async fn blank_instruction_is_omitted() {
    let (addr, seen) = fake_gemini(
        StatusCode::Ok,
        json!({"candidates": [{"content": {"parts": [{"text": "ok"}]}}]}),
    )
    .await;

    client(addr).generate("  ", "hello").await.unwrap();
    assert!(seen.lock().unwrap().body.get("system_instruction").is_none());
}

#[tokio::test]
async fn error_envelope_becomes_api_error() {
    let (addr, _) = fake_gemini(
        StatusCode::BadRequest,
        json!({"error": {"code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT"}}),
    )
    .await;

    let err = client(addr).generate("", "hello").await.unwrap_err();
    match &err {
        LlmError::Api { status, message } => {
            assert_eq!(*status, 400);
            assert_eq!(message, "API key not valid.");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
    assert!(err.to_reply().starts_with("Error: "));
    assert!(!err.to_reply().contains("test-key"));
}

#[tokio::test]
async fn blocked_prompt_is_an_empty_response() {
    let (addr, _) = fake_gemini(
        StatusCode::Ok,
        json!({"promptFeedback": {"blockReason": "SAFETY"}}),
    )
    .await;

    let err = client(addr).generate("", "hello").await.unwrap_err();
    assert!(matches!(
        err,
        LlmError::EmptyResponse { reason: Some(ref r) } if r == "SAFETY"
    ));
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_error() {
    // Bind then drop to get a port nobody listens on.
    let addr = {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        server.local_addr()
    };

    let err = client(addr).generate("", "hello").await.unwrap_err();
    assert!(matches!(err, LlmError::Transport(_)));
}
