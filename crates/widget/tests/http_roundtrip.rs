use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chatline::chat::{FailureKind, Role, TurnKind};
use chatline::{ChatWidget, ProbeOutcome, ResetOutcome, SendOutcome, WidgetSettings};
use chatline_storage::{KeyValueStore, MemoryStore, SESSION_ID_KEY, SqliteStore};
use serde_json::{Value, json};

#[derive(Default)]
struct Recorded {
    chat_bodies: Vec<Value>,
    deleted_sessions: Vec<String>,
}

type Shared = Arc<Mutex<Recorded>>;

async fn chat(State(recorded): State<Shared>, Json(body): Json<Value>) -> impl IntoResponse {
    let message = body["message"].as_str().unwrap_or_default().to_string();
    recorded.lock().expect("lock").chat_bodies.push(body);

    match message.as_str() {
        "explode" => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        "legacy" => Json(json!({"session_id": "server-1", "reply": "Hi there"})).into_response(),
        "blank" => Json(json!({"session_id": "server-1", "text": "   ", "reply": ""})).into_response(),
        "sloppy" => Json(json!({
            "session_id": "server-2",
            "text": "Hello!",
            "sources": [{"title": null, "link": "https://example.test/a"}, {"title": "x"}],
            "quick_replies": [{"id": "1", "label": null}, {"id": "2", "label": "Pricing"}],
        }))
        .into_response(),
        _ => Json(json!({
            "session_id": "server-1",
            "text": format!("echo: {message}"),
            "quick_replies": [{"id": 7, "label": "Tell me more"}],
        }))
        .into_response(),
    }
}

async fn delete_session(
    State(recorded): State<Shared>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    recorded
        .lock()
        .expect("lock")
        .deleted_sessions
        .push(session_id);
    Json(json!({"message": "Session reset successfully"}))
}

async fn root() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn spawn_server() -> (String, Shared) {
    let recorded = Shared::default();
    let app = Router::new()
        .route("/", get(root))
        .route("/api/chat", post(chat))
        .route("/api/session/{session_id}", delete(delete_session))
        .with_state(recorded.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (format!("http://{addr}"), recorded)
}

fn sent_session_ids(recorded: &Shared) -> Vec<String> {
    recorded
        .lock()
        .expect("lock")
        .chat_bodies
        .iter()
        .map(|body| body["session_id"].as_str().unwrap_or_default().to_string())
        .collect()
}

fn connect(base_url: &str, store: Arc<dyn KeyValueStore>) -> ChatWidget {
    ChatWidget::connect(WidgetSettings::default().with_base_url(base_url), store)
        .expect("widget connects")
}

#[tokio::test]
async fn session_survives_a_restart_and_follows_the_backend() {
    let (base_url, recorded) = spawn_server().await;
    let temp = tempfile::tempdir().expect("tempdir");
    let database = temp.path().join("session.db");
    let database = database.to_string_lossy();

    let first_store = SqliteStore::open(&database, "https://shop.example.test")
        .await
        .expect("open store");
    let widget = connect(&base_url, Arc::new(first_store));
    let minted = widget.session_id();
    assert!(matches!(widget.send("Hello").await, SendOutcome::Replied { .. }));
    drop(widget);

    let reopened = SqliteStore::open(&database, "https://shop.example.test")
        .await
        .expect("reopen store");
    let widget = connect(&base_url, Arc::new(reopened));
    assert_eq!(widget.session_id().as_str(), "server-1");
    widget.send("Again").await;

    assert_eq!(
        sent_session_ids(&recorded),
        vec![minted.as_str().to_string(), "server-1".to_string()]
    );
}

#[tokio::test]
async fn legacy_reply_field_renders_as_bot_text() {
    let (base_url, _) = spawn_server().await;
    let widget = connect(&base_url, Arc::new(MemoryStore::new()));

    let outcome = widget.send("legacy").await;

    assert!(matches!(outcome, SendOutcome::Replied { .. }));
    let turns = widget.snapshot().turns;
    assert_eq!(turns[1].role, Role::Bot);
    assert_eq!(turns[1].content, "Hi there");
}

#[tokio::test]
async fn blank_reply_fields_become_a_soft_failure() {
    let (base_url, _) = spawn_server().await;
    let widget = connect(&base_url, Arc::new(MemoryStore::new()));

    let outcome = widget.send("blank").await;

    assert!(matches!(outcome, SendOutcome::SoftFailure { .. }));
    assert_eq!(widget.snapshot().turns[1].kind, TurnKind::SoftFailure);
    assert_eq!(widget.session_id().as_str(), "server-1");
}

#[tokio::test]
async fn malformed_extras_do_not_hide_the_reply_text() {
    let (base_url, _) = spawn_server().await;
    let widget = connect(&base_url, Arc::new(MemoryStore::new()));

    let outcome = widget.send("sloppy").await;

    assert!(matches!(outcome, SendOutcome::Replied { .. }));
    let snapshot = widget.snapshot();
    assert_eq!(snapshot.turns[1].content, "Hello!");
    assert_eq!(snapshot.turns[1].sources.len(), 1);
    assert_eq!(snapshot.quick_replies.len(), 1);
    assert_eq!(snapshot.quick_replies[0].label, "Pricing");
    assert_eq!(snapshot.session_id.as_str(), "server-2");
}

#[tokio::test]
async fn server_fault_sends_next_message_with_a_fresh_session() {
    let (base_url, recorded) = spawn_server().await;
    let store = Arc::new(MemoryStore::with_entry(SESSION_ID_KEY, "s1"));
    let widget = connect(&base_url, store.clone());

    let outcome = widget.send("explode").await;
    assert!(matches!(
        outcome,
        SendOutcome::Failed {
            kind: FailureKind::ServerFault,
            ..
        }
    ));
    let rotated = store
        .get(SESSION_ID_KEY)
        .expect("read store")
        .expect("id stored");
    assert_ne!(rotated, "s1");

    widget.send("Hello").await;
    assert_eq!(sent_session_ids(&recorded), vec!["s1".to_string(), rotated]);
}

#[tokio::test]
async fn confirmed_reset_deletes_the_backend_session() {
    let (base_url, recorded) = spawn_server().await;
    let widget = connect(&base_url, Arc::new(MemoryStore::new()));
    widget.send("Hello").await;
    assert_eq!(widget.snapshot().quick_replies.len(), 1);

    let outcome = widget.reset_conversation(|_| true).await;

    let ResetOutcome::Reset { previous, current } = outcome else {
        panic!("reset should go ahead");
    };
    assert_eq!(previous.as_str(), "server-1");
    assert!(current.is_uuid_v4());
    assert_eq!(
        recorded.lock().expect("lock").deleted_sessions,
        vec!["server-1".to_string()]
    );
    let snapshot = widget.snapshot();
    assert!(snapshot.turns.is_empty());
    assert!(snapshot.quick_replies.is_empty());
}

#[tokio::test]
async fn unreachable_backend_is_reported_and_probe_fails() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    let widget = connect(&format!("http://{addr}"), Arc::new(MemoryStore::new()));

    let outcome = widget.send("Hello").await;

    assert!(matches!(
        outcome,
        SendOutcome::Failed {
            kind: FailureKind::Unreachable,
            ..
        }
    ));
    assert!(widget.snapshot().retry_offered);
    assert_eq!(widget.probe_backend().await, ProbeOutcome::Unreachable);
}

#[tokio::test]
async fn probe_against_a_live_backend_reports_reachable() {
    let (base_url, _) = spawn_server().await;
    let widget = connect(&base_url, Arc::new(MemoryStore::new()));

    assert_eq!(
        widget.probe_backend().await,
        ProbeOutcome::Reachable {
            cleared_stale_error: false
        }
    );
}
