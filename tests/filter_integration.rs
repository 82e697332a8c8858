//! End-to-end filter runs against a local stub of the Gmail and Ollama APIs.
//!
//! Each test spins up an Axum server on a random port that plays both
//! backends (plus the OAuth token endpoint), then runs a real `InboxFilter`
//! with `GmailClient` and `OllamaProvider` pointed at it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Form, Path as UrlPath, Query, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use inbox_sweep::config::OllamaConfig;
use inbox_sweep::error::{Error, LlmError};
use inbox_sweep::gmail::{GmailClient, Mailbox};
use inbox_sweep::llm::OllamaProvider;
use inbox_sweep::pipeline::{EmailAnalyzer, InboxFilter, RunOptions};
use inbox_sweep::retry::RetryPolicy;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

const LABEL: &str = "potential-unnecessary";

// ── Stub server ──────────────────────────────────────────────────────

#[derive(Default)]
struct StubState {
    /// Bearer token the Gmail routes accept.
    access_token: String,
    messages: Vec<Value>,
    labels: Vec<Value>,
    /// Message ids whose fetch always fails with 500.
    broken_ids: Vec<String>,
    /// Fetches that fail with 500 before the stub starts answering.
    transient_failures: u32,
    get_calls: u32,
    refreshes: u32,
    list_queries: Vec<HashMap<String, String>>,
    modify_calls: Vec<(String, Value)>,
    chat_requests: Vec<Value>,
}

type Shared = Arc<Mutex<StubState>>;

fn authorized(state: &StubState, headers: &HeaderMap) -> bool {
    let expected = format!("Bearer {}", state.access_token);
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected)
}

async fn ollama_root() -> &'static str {
    "Ollama is running"
}

async fn ollama_chat(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    let asks_about_sale = body["messages"]
        .as_array()
        .into_iter()
        .flatten()
        .filter(|m| m["role"] == "user")
        .filter_map(|m| m["content"].as_str())
        .any(|content| content.contains("Subject: Flash sale"));
    let answer = if asks_about_sale {
        "NO - marketing promotion"
    } else {
        "YES - personal message"
    };
    state.lock().unwrap().chat_requests.push(body.clone());

    Json(json!({
        "model": body["model"],
        "created_at": "2024-03-09T07:05:01Z",
        "message": { "role": "assistant", "content": answer },
        "done": true,
        "done_reason": "stop",
        "total_duration": 1000,
        "load_duration": 100,
        "prompt_eval_count": 120,
        "prompt_eval_duration": 200,
        "eval_count": 4,
        "eval_duration": 300
    }))
}

async fn refresh_token(
    State(state): State<Shared>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    if form.get("grant_type").map(String::as_str) != Some("refresh_token")
        || form.get("refresh_token").map(String::as_str) != Some("1//refresh")
    {
        return Err(StatusCode::BAD_REQUEST);
    }
    let mut state = state.lock().unwrap();
    state.refreshes += 1;
    state.access_token = "ya29.refreshed".into();
    Ok(Json(json!({
        "access_token": "ya29.refreshed",
        "expires_in": 3599,
        "token_type": "Bearer"
    })))
}

async fn list_labels(
    State(state): State<Shared>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    let state = state.lock().unwrap();
    if !authorized(&state, &headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(json!({ "labels": state.labels })))
}

async fn create_label(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    let mut state = state.lock().unwrap();
    if !authorized(&state, &headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    assert_eq!(body["labelListVisibility"], "labelShow");
    assert_eq!(body["messageListVisibility"], "show");
    let label = json!({ "id": "Label_42", "name": body["name"], "type": "user" });
    state.labels.push(label.clone());
    Ok(Json(label))
}

async fn list_messages(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    let mut state = state.lock().unwrap();
    if !authorized(&state, &headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let max: usize = query
        .get("maxResults")
        .and_then(|v| v.parse().ok())
        .unwrap_or(100);
    state.list_queries.push(query);
    let refs: Vec<Value> = state
        .messages
        .iter()
        .take(max)
        .map(|m| json!({ "id": m["id"], "threadId": m["threadId"] }))
        .collect();
    Ok(Json(json!({ "messages": refs, "resultSizeEstimate": refs.len() })))
}

async fn get_message(
    State(state): State<Shared>,
    headers: HeaderMap,
    UrlPath(id): UrlPath<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    let mut state = state.lock().unwrap();
    if !authorized(&state, &headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    assert_eq!(query.get("format").map(String::as_str), Some("full"));
    state.get_calls += 1;
    if state.broken_ids.contains(&id) {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    if state.transient_failures > 0 {
        state.transient_failures -= 1;
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    state
        .messages
        .iter()
        .find(|m| m["id"] == id.as_str())
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn modify_message(
    State(state): State<Shared>,
    headers: HeaderMap,
    UrlPath(id): UrlPath<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    let mut state = state.lock().unwrap();
    if !authorized(&state, &headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    state.modify_calls.push((id.clone(), body));
    Ok(Json(json!({ "id": id })))
}

/// Start the stub on a random port, return (port, state).
async fn start_server(state: StubState) -> (u16, Shared) {
    let shared: Shared = Arc::new(Mutex::new(state));
    let app = Router::new()
        .route("/", get(ollama_root))
        .route("/api/chat", post(ollama_chat))
        .route("/token", post(refresh_token))
        .route("/gmail/labels", get(list_labels).post(create_label))
        .route("/gmail/messages", get(list_messages))
        .route("/gmail/messages/{id}", get(get_message))
        .route("/gmail/messages/{id}/modify", post(modify_message))
        .with_state(Arc::clone(&shared));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (port, shared)
}

// ── Fixtures ─────────────────────────────────────────────────────────

fn b64(text: &str) -> String {
    URL_SAFE_NO_PAD.encode(text)
}

fn plain_message(id: &str, subject: &str, from: &str, body: &str) -> Value {
    json!({
        "id": id,
        "threadId": format!("t-{id}"),
        "labelIds": ["INBOX", "UNREAD"],
        "snippet": body,
        "payload": {
            "mimeType": "text/plain",
            "headers": [
                { "name": "Subject", "value": subject },
                { "name": "From", "value": from },
                { "name": "Date", "value": "Mon, 1 Jan 2024 10:00:00 +0000" }
            ],
            "body": { "size": body.len(), "data": b64(body) }
        }
    })
}

fn html_message(id: &str, subject: &str, html: &str) -> Value {
    json!({
        "id": id,
        "threadId": format!("t-{id}"),
        "labelIds": ["INBOX", "CATEGORY_PROMOTIONS"],
        "snippet": "",
        "payload": {
            "mimeType": "multipart/alternative",
            "headers": [
                { "name": "subject", "value": subject },
                { "name": "FROM", "value": "deals@shop.example" }
            ],
            "body": { "size": 0 },
            "parts": [
                { "mimeType": "text/html", "body": { "size": html.len(), "data": b64(html) } }
            ]
        }
    })
}

fn inbox() -> Vec<Value> {
    vec![
        plain_message("m1", "Dinner on Friday?", "alice@example.com", "Are you free at 7?"),
        html_message("m2", "Flash sale: 50% off", "<p>Everything</p><br/><p>must go</p>"),
        html_message(
            "m3",
            "Flash sale ends tonight",
            "<style>p{}</style><p>Last chance &amp; more</p>",
        ),
    ]
}

fn write_token(dir: &Path, token: &str, expiry: &str, port: u16) -> PathBuf {
    let path = dir.join("token.json");
    let json = json!({
        "token": token,
        "refresh_token": "1//refresh",
        "token_uri": format!("http://127.0.0.1:{port}/token"),
        "client_id": "client-id.apps.googleusercontent.com",
        "client_secret": "client-secret",
        "scopes": ["https://www.googleapis.com/auth/gmail.modify"],
        "expiry": expiry
    });
    std::fs::write(&path, serde_json::to_string_pretty(&json).unwrap()).unwrap();
    path
}

fn fresh_expiry() -> String {
    (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339()
}

fn gmail_client(port: u16, token_path: &Path, retry: RetryPolicy) -> GmailClient {
    GmailClient::from_token_file(token_path, retry)
        .unwrap()
        .with_base_url(&format!("http://127.0.0.1:{port}/gmail"))
}

fn build_filter(port: u16, api_path: &str, token_path: &Path, results_dir: &Path) -> InboxFilter {
    let gmail = gmail_client(port, token_path, RetryPolicy::new(3, Duration::ZERO));
    let ollama = OllamaProvider::new(&OllamaConfig {
        api_url: format!("http://127.0.0.1:{port}{api_path}"),
        model: "stub-model".into(),
        timeout: Duration::from_secs(5),
    })
    .unwrap();

    InboxFilter::new(
        Arc::new(gmail),
        EmailAnalyzer::new(Arc::new(ollama), 1000),
        RunOptions {
            max_emails: 10,
            label_name: LABEL.into(),
            results_dir: Some(results_dir.to_path_buf()),
        },
    )
}

// ── Full runs ────────────────────────────────────────────────────────

#[tokio::test]
async fn full_run_moves_unnecessary_messages() {
    timeout(TEST_TIMEOUT, async {
        let (port, state) = start_server(StubState {
            access_token: "ya29.valid".into(),
            messages: inbox(),
            labels: vec![json!({ "id": "INBOX", "name": "INBOX", "type": "system" })],
            ..Default::default()
        })
        .await;

        let tmp = tempfile::tempdir().unwrap();
        let token = write_token(tmp.path(), "ya29.valid", &fresh_expiry(), port);
        let results_dir = tmp.path().join("results");

        let report = build_filter(port, "/api", &token, &results_dir)
            .run()
            .await
            .unwrap();

        assert_eq!(report.processed.len(), 3);
        assert_eq!(report.unnecessary_ids(), vec!["m2", "m3"]);
        assert_eq!(report.processed[0].sender, "alice@example.com");
        assert_eq!(report.processed[1].sender, "deals@shop.example");

        let state = state.lock().unwrap();
        assert_eq!(state.list_queries.len(), 1);
        assert_eq!(state.list_queries[0]["labelIds"], "INBOX");
        assert_eq!(state.list_queries[0]["maxResults"], "10");

        // The label did not exist, so it was created.
        assert!(state.labels.iter().any(|l| l["name"] == LABEL));

        assert_eq!(state.modify_calls.len(), 2);
        for (_, body) in &state.modify_calls {
            assert_eq!(body["addLabelIds"], json!(["Label_42"]));
            assert_eq!(body["removeLabelIds"], json!(["INBOX"]));
        }

        let path = report.results_file.expect("results file written");
        assert!(path.starts_with(&results_dir));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("email_results_") && name.ends_with(".json"));

        let summary: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(summary["total_processed"], 3);
        assert_eq!(summary["unnecessary_count"], 2);
        assert_eq!(summary["unnecessary_emails"][0]["id"], "m2");
        assert_eq!(summary["unnecessary_emails"][0]["subject"], "Flash sale: 50% off");

        // One chat per message, each carrying the YES/NO instruction as a system message.
        assert_eq!(state.chat_requests.len(), 3);
        for chat in &state.chat_requests {
            assert_eq!(chat["model"], "stub-model");
            let messages = chat["messages"].as_array().unwrap();
            assert_eq!(messages[0]["role"], "system");
            assert!(messages[0]["content"].as_str().unwrap().contains("YES"));
            assert_eq!(messages.last().unwrap()["role"], "user");
        }
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn existing_label_is_reused() {
    timeout(TEST_TIMEOUT, async {
        let (port, state) = start_server(StubState {
            access_token: "ya29.valid".into(),
            labels: vec![json!({ "id": "Label_9", "name": LABEL, "type": "user" })],
            ..Default::default()
        })
        .await;

        let tmp = tempfile::tempdir().unwrap();
        let token = write_token(tmp.path(), "ya29.valid", &fresh_expiry(), port);
        let client = gmail_client(port, &token, RetryPolicy::none());

        assert_eq!(client.ensure_label(LABEL).await.unwrap(), "Label_9");
        assert_eq!(state.lock().unwrap().labels.len(), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn expired_token_is_refreshed_and_saved() {
    timeout(TEST_TIMEOUT, async {
        let (port, state) = start_server(StubState {
            access_token: "ya29.refreshed".into(),
            messages: inbox(),
            ..Default::default()
        })
        .await;

        let tmp = tempfile::tempdir().unwrap();
        let token = write_token(tmp.path(), "ya29.stale", "2020-01-01T00:00:00.000000Z", port);

        let report = build_filter(port, "/api", &token, tmp.path())
            .run()
            .await
            .unwrap();
        assert_eq!(report.processed.len(), 3);
        assert_eq!(state.lock().unwrap().refreshes, 1);

        let saved: Value = serde_json::from_str(&std::fs::read_to_string(&token).unwrap()).unwrap();
        assert_eq!(saved["token"], "ya29.refreshed");
        assert_eq!(saved["refresh_token"], "1//refresh");
        assert_eq!(saved["client_id"], "client-id.apps.googleusercontent.com");
        assert!(saved["expiry"].as_str().is_some());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn transient_fetch_errors_are_retried() {
    timeout(TEST_TIMEOUT, async {
        let (port, state) = start_server(StubState {
            access_token: "ya29.valid".into(),
            messages: inbox(),
            transient_failures: 2,
            ..Default::default()
        })
        .await;

        let tmp = tempfile::tempdir().unwrap();
        let token = write_token(tmp.path(), "ya29.valid", &fresh_expiry(), port);

        let report = build_filter(port, "/api", &token, tmp.path())
            .run()
            .await
            .unwrap();
        assert_eq!(report.processed.len(), 3);
        // Two failures absorbed by the first message's retries.
        assert_eq!(state.lock().unwrap().get_calls, 5);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn persistently_broken_message_is_skipped() {
    timeout(TEST_TIMEOUT, async {
        let (port, state) = start_server(StubState {
            access_token: "ya29.valid".into(),
            messages: inbox(),
            broken_ids: vec!["m2".into()],
            ..Default::default()
        })
        .await;

        let tmp = tempfile::tempdir().unwrap();
        let token = write_token(tmp.path(), "ya29.valid", &fresh_expiry(), port);

        let report = build_filter(port, "/api", &token, tmp.path())
            .run()
            .await
            .unwrap();
        assert_eq!(report.processed.len(), 2);
        assert_eq!(report.unnecessary_ids(), vec!["m3"]);
        // m1 once, m2 three attempts, m3 once.
        assert_eq!(state.lock().unwrap().get_calls, 5);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unreachable_model_aborts_before_touching_gmail() {
    timeout(TEST_TIMEOUT, async {
        let (port, state) = start_server(StubState {
            access_token: "ya29.valid".into(),
            messages: inbox(),
            ..Default::default()
        })
        .await;

        let tmp = tempfile::tempdir().unwrap();
        let token = write_token(tmp.path(), "ya29.valid", &fresh_expiry(), port);

        // Root probe lands on an unrouted path and gets 404.
        let err = build_filter(port, "/missing/api", &token, tmp.path())
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Llm(LlmError::Unavailable { .. })));

        let state = state.lock().unwrap();
        assert!(state.labels.is_empty());
        assert!(state.list_queries.is_empty());
        assert!(state.modify_calls.is_empty());
    })
    .await
    .expect("test timed out");
}
