//! REST endpoints for the chat simulator and the CRM dashboard.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::agent::SessionManager;
use crate::crm::LeadStatus;
use crate::error::{DatabaseError, Error, SessionError};
use crate::store::CrmStore;

/// Shared state for the API routes.
#[derive(Clone)]
pub struct ApiState {
    pub sessions: Arc<SessionManager>,
    pub crm: Arc<dyn CrmStore>,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    text: String,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::Session(SessionError::EmptyMessage) => {
                error_response(StatusCode::BAD_REQUEST, "text must not be empty")
            }
            Error::Session(SessionError::Closed { .. }) => error_response(
                StatusCode::CONFLICT,
                "session was reset while the message was processed",
            ),
            Error::Database(DatabaseError::NotFound { entity, id }) => {
                error_response(StatusCode::NOT_FOUND, format!("{entity} {id} not found"))
            }
            other => {
                tracing::error!("Request failed: {}", other);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    }
}

/// POST /api/sessions/{id}/messages
///
/// Runs one turn and returns the assistant's reply plus the handoff flag.
async fn post_message(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<MessageBody>,
) -> Result<Response, Error> {
    let (turn, session) = state.sessions.submit_with_state(&id, &body.text).await?;
    Ok(Json(json!({
        "turn": turn,
        "human_handoff": session.human_handoff,
    }))
    .into_response())
}

/// GET /api/sessions/{id}/history
///
/// Read-only: unknown ids get an empty transcript and are not opened.
async fn get_history(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Response, Error> {
    let snapshot = state.sessions.snapshot(&id).await?;
    Ok(Json(json!({
        "id": snapshot.id,
        "state": snapshot.state,
        "turns": snapshot.turns,
    }))
    .into_response())
}

/// DELETE /api/sessions/{id}
async fn delete_session(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<StatusCode, Error> {
    state.sessions.reset_session(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/leads
async fn list_leads(State(state): State<ApiState>) -> Result<Response, Error> {
    let leads = state.crm.list_leads().await?;
    Ok(Json(leads).into_response())
}

/// PATCH /api/leads/{id}/status
///
/// Moves a lead to another funnel stage (board drag-and-drop).
async fn update_lead_status(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(body): Json<StatusBody>,
) -> Result<Response, Error> {
    let status: LeadStatus = match body.status.parse() {
        Ok(status) => status,
        Err(e) => return Ok(error_response(StatusCode::BAD_REQUEST, e)),
    };
    state.crm.update_lead_status(id, status).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// GET /api/appointments
async fn list_appointments(State(state): State<ApiState>) -> Result<Response, Error> {
    let appointments = state.crm.list_appointments().await?;
    Ok(Json(appointments).into_response())
}

/// Build the REST routes.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/api/sessions/{id}/messages", post(post_message))
        .route("/api/sessions/{id}/history", get(get_history))
        .route("/api/sessions/{id}", delete(delete_session))
        .route("/api/leads", get(list_leads))
        .route("/api/leads/{id}/status", patch(update_lead_status))
        .route("/api/appointments", get(list_appointments))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
