//! Integration tests for the REST API.
//!
//! Each test spins up an Axum server on a random port and drives it with
//! reqwest, exercising the real HTTP contract.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use convexa_agent::agent::{AgentDeps, SessionManager, ToolCall};
use convexa_agent::api::{ApiState, api_routes};
use convexa_agent::config::AgentConfig;
use convexa_agent::error::LlmError;
use convexa_agent::llm::{LlmProvider, ProviderRequest, ProviderResponse};
use convexa_agent::store::MemoryStore;
use convexa_agent::tools::builtin::crm_registry;

/// Stub LLM: books a lead the first time it sees a WhatsApp number, hands
/// over when asked for a human, and otherwise echoes.
struct StubLlm;

#[async_trait]
impl LlmProvider for StubLlm {
    fn name(&self) -> &str {
        "stub"
    }
    fn model_name(&self) -> &str {
        "stub"
    }
    async fn send(&self, request: ProviderRequest) -> Result<ProviderResponse, LlmError> {
        let last = request.history.last().expect("history is never empty");
        if !last.tool_results.is_empty() {
            return Ok(ProviderResponse::text("Feito!"));
        }
        let text = last.text.clone().unwrap_or_default();
        if text.contains("humano") {
            return Ok(ProviderResponse::calls(vec![ToolCall::new(
                "h1",
                "handover_humano",
                json!({}),
            )]));
        }
        if let Some(number) = text.strip_prefix("zap ") {
            return Ok(ProviderResponse::calls(vec![ToolCall::new(
                "l1",
                "criar_lead",
                json!({"nome": "Cliente", "whatsapp": number, "origem": "Site"}),
            )]));
        }
        Ok(ProviderResponse::text(format!("eco: {text}")))
    }
}

/// Start an Axum server on a random port, return its base URL.
async fn start_server() -> String {
    start_server_with_sessions().await.0
}

/// Like `start_server`, also handing back the session manager.
async fn start_server_with_sessions() -> (String, Arc<SessionManager>) {
    let store = Arc::new(MemoryStore::new());
    let tools = Arc::new(crm_registry(store.clone()).unwrap());
    let sessions = Arc::new(SessionManager::new(
        AgentConfig::default(),
        AgentDeps {
            llm: Arc::new(StubLlm),
            tools,
            history: store.clone(),
        },
    ));
    let app = api_routes(ApiState {
        sessions: Arc::clone(&sessions),
        crm: store,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;
    (format!("http://127.0.0.1:{port}"), sessions)
}

async fn send(client: &reqwest::Client, base: &str, session: &str, text: &str) -> reqwest::Response {
    client
        .post(format!("{base}/api/sessions/{session}/messages"))
        .json(&json!({ "text": text }))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn message_returns_assistant_turn() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let resp = send(&client, &base, "web-1", "Olá").await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["turn"]["role"], "assistant");
    assert_eq!(body["turn"]["text"], "eco: Olá");
    assert_eq!(body["human_handoff"], false);
}

#[tokio::test]
async fn blank_message_is_bad_request() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let resp = send(&client, &base, "web-1", "   ").await;
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn history_lists_turns_in_order() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    send(&client, &base, "web-1", "primeira").await;
    send(&client, &base, "web-1", "segunda").await;

    let body: Value = client
        .get(format!("{base}/api/sessions/web-1/history"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["id"], "web-1");
    assert_eq!(body["state"]["phase"], "idle");
    let turns = body["turns"].as_array().unwrap();
    assert_eq!(turns.len(), 4);
    assert_eq!(turns[0]["text"], "primeira");
    assert_eq!(turns[3]["text"], "eco: segunda");
}

#[tokio::test]
async fn history_lookups_do_not_open_sessions() {
    let (base, sessions) = start_server_with_sessions().await;
    let client = reqwest::Client::new();

    for i in 0..20 {
        let resp = client
            .get(format!("{base}/api/sessions/visitor-{i}/history"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert!(body["turns"].as_array().unwrap().is_empty());
    }
    assert_eq!(sessions.session_count().await, 0);

    send(&client, &base, "web-1", "Olá").await;
    assert_eq!(sessions.session_count().await, 1);
}

#[tokio::test]
async fn delete_resets_session() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    send(&client, &base, "web-1", "Olá").await;
    let resp = client
        .delete(format!("{base}/api/sessions/web-1"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let body: Value = client
        .get(format!("{base}/api/sessions/web-1/history"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body["turns"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn handoff_flag_is_reported() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let body: Value = send(&client, &base, "web-1", "quero falar com um humano")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["human_handoff"], true);
    assert_eq!(body["turn"]["text"], "Feito!");
}

#[tokio::test]
async fn leads_created_in_chat_show_on_board() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    send(&client, &base, "web-1", "zap +55 11 98888-7777").await;

    let leads: Value = client
        .get(format!("{base}/api/leads"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let leads = leads.as_array().unwrap();
    assert_eq!(leads.len(), 1);
    assert_eq!(leads[0]["status"], "Capturados");
    assert_eq!(leads[0]["lastContact"], "Agora");

    let id = leads[0]["id"].as_i64().unwrap();
    let resp = client
        .patch(format!("{base}/api/leads/{id}/status"))
        .json(&json!({ "status": "Atendidos" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let leads: Value = client
        .get(format!("{base}/api/leads"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(leads[0]["status"], "Atendidos");
}

#[tokio::test]
async fn unknown_lead_status_update_is_rejected() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let bad_status = client
        .patch(format!("{base}/api/leads/1/status"))
        .json(&json!({ "status": "Perdidos" }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_status.status(), 400);

    let missing = client
        .patch(format!("{base}/api/leads/999/status"))
        .json(&json!({ "status": "Atendidos" }))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn appointments_start_empty() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let body: Value = client
        .get(format!("{base}/api/appointments"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!([]));
}
