//! Session Handlers
//!
//! Start/stop/status control for the listener and stream sessions.

use axum::{extract::State, http::StatusCode, Json};

use crate::application::dto::{
    ActionResponse, AttachRoomRequest, ListenerConfig, SessionConfig, SessionStatus,
    StartStreamRequest, StopRequest,
};
use crate::shared::error::AppError;
use crate::startup::AppState;

fn stop_reason(body: &Option<Json<StopRequest>>) -> Option<&str> {
    body.as_ref().and_then(|Json(b)| b.reason.as_deref())
}

fn ok(status: SessionStatus) -> Json<ActionResponse> {
    Json(ActionResponse { ok: true, status })
}

/// Combined status snapshot
pub async fn get_status(State(state): State<AppState>) -> Json<SessionStatus> {
    Json(state.manager.status())
}

// ============================================================================
// Combined
// ============================================================================

/// Start listener and stream in one call
pub async fn start_session(
    State(state): State<AppState>,
    Json(body): Json<SessionConfig>,
) -> Result<Json<ActionResponse>, AppError> {
    let status = state.manager.start(body).await?;
    Ok(ok(status))
}

/// Stop stream and listener
pub async fn stop_session(
    State(state): State<AppState>,
    body: Option<Json<StopRequest>>,
) -> Json<ActionResponse> {
    ok(state.manager.stop(stop_reason(&body)).await)
}

// ============================================================================
// Listener
// ============================================================================

pub async fn start_listener(
    State(state): State<AppState>,
    Json(body): Json<ListenerConfig>,
) -> Result<Json<ActionResponse>, AppError> {
    let status = state.manager.start_listener(body).await?;
    Ok(ok(status))
}

pub async fn stop_listener(State(state): State<AppState>) -> Json<ActionResponse> {
    ok(state.manager.stop_listener().await)
}

/// Attach another upstream room to the active listener
pub async fn attach_room(
    State(state): State<AppState>,
    Json(body): Json<AttachRoomRequest>,
) -> Result<(StatusCode, Json<ActionResponse>), AppError> {
    let attached = state.manager.attach_room(&body.room_id)?;
    let code = if attached {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((code, ok(state.manager.status())))
}

// ============================================================================
// Stream
// ============================================================================

pub async fn start_stream(
    State(state): State<AppState>,
    Json(body): Json<StartStreamRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let status = state.manager.start_stream(body.stream, body.listener).await?;
    Ok(ok(status))
}

pub async fn stop_stream(
    State(state): State<AppState>,
    body: Option<Json<StopRequest>>,
) -> Json<ActionResponse> {
    ok(state.manager.stop_stream(stop_reason(&body)).await)
}
