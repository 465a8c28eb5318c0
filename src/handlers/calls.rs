//! Operator REST API for live calls
//!
//! Lets a supervisor inspect calls and steer a running bridge: inject
//! context, seed messages, play DTMF, hold, resume and hang up.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

use crate::core::audio::is_dial_string;
use crate::core::bridge::{BridgeCommand, DEFAULT_PAUSE_MS, DEFAULT_TONE_MS};
use crate::core::call::{ActiveCall, Role};
use crate::core::session::BridgeHandle;
use crate::errors::app_error::{AppError, AppResult};
use crate::state::AppState;

/// Longest tone or pause accepted from the API.
const MAX_DTMF_DURATION_MS: u32 = 2_000;

#[derive(Debug, Deserialize)]
pub struct ContextRequest {
    pub text: String,
    #[serde(default)]
    pub history_summary: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub role: Role,
    pub text: String,
    #[serde(default)]
    pub respond: bool,
}

#[derive(Debug, Deserialize)]
pub struct DtmfRequest {
    pub digits: String,
    #[serde(default)]
    pub tone_ms: Option<u32>,
    #[serde(default)]
    pub pause_ms: Option<u32>,
}

fn bridge_for(state: &AppState, call_sid: &str) -> AppResult<BridgeHandle> {
    state
        .registry
        .get_by_call_id(call_sid)
        .ok_or_else(|| AppError::CallNotFound(call_sid.to_string()))
}

fn deliver(handle: &BridgeHandle, call_sid: &str, command: BridgeCommand) -> AppResult<()> {
    if handle.send(command) {
        Ok(())
    } else {
        Err(AppError::Gone(call_sid.to_string()))
    }
}

fn accepted(call_sid: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::ACCEPTED,
        Json(json!({"call_sid": call_sid, "status": "accepted"})),
    )
}

/// `GET /calls`
pub async fn list_calls(State(state): State<Arc<AppState>>) -> Json<Value> {
    let calls = state.tracker.list();
    Json(json!({"count": calls.len(), "calls": calls}))
}

/// `GET /calls/{call_sid}`
pub async fn get_call(
    State(state): State<Arc<AppState>>,
    Path(call_sid): Path<String>,
) -> AppResult<Json<ActiveCall>> {
    state
        .tracker
        .get(&call_sid)
        .map(Json)
        .ok_or(AppError::CallNotFound(call_sid))
}

/// `POST /calls/{call_sid}/context`
pub async fn inject_context(
    State(state): State<Arc<AppState>>,
    Path(call_sid): Path<String>,
    Json(request): Json<ContextRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    if request.text.trim().is_empty() {
        return Err(AppError::BadRequest("text must not be empty".into()));
    }
    if !state.registry.inject_context(
        &call_sid,
        &request.text,
        request.history_summary.as_deref(),
    ) {
        return Err(AppError::CallNotFound(call_sid));
    }
    info!(call_sid = %call_sid, "Operator context accepted");
    Ok(accepted(&call_sid))
}

/// `POST /calls/{call_sid}/message`
pub async fn add_message(
    State(state): State<Arc<AppState>>,
    Path(call_sid): Path<String>,
    Json(request): Json<MessageRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    if request.text.trim().is_empty() {
        return Err(AppError::BadRequest("text must not be empty".into()));
    }
    let handle = bridge_for(&state, &call_sid)?;
    deliver(
        &handle,
        &call_sid,
        BridgeCommand::AddMessage {
            role: request.role,
            text: request.text,
            respond: request.respond,
        },
    )?;
    Ok(accepted(&call_sid))
}

/// `POST /calls/{call_sid}/dtmf`
pub async fn send_dtmf(
    State(state): State<Arc<AppState>>,
    Path(call_sid): Path<String>,
    Json(request): Json<DtmfRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    if !is_dial_string(&request.digits) {
        return Err(AppError::BadRequest(format!(
            "invalid DTMF digits: {:?}",
            request.digits
        )));
    }
    let tone_ms = request.tone_ms.unwrap_or(DEFAULT_TONE_MS);
    let pause_ms = request.pause_ms.unwrap_or(DEFAULT_PAUSE_MS);
    if tone_ms == 0 || tone_ms > MAX_DTMF_DURATION_MS || pause_ms > MAX_DTMF_DURATION_MS {
        return Err(AppError::BadRequest(format!(
            "tone_ms must be 1..={MAX_DTMF_DURATION_MS} and pause_ms at most {MAX_DTMF_DURATION_MS}"
        )));
    }

    let handle = bridge_for(&state, &call_sid)?;
    deliver(
        &handle,
        &call_sid,
        BridgeCommand::SendDtmf {
            digits: request.digits,
            tone_ms,
            pause_ms,
        },
    )?;
    Ok(accepted(&call_sid))
}

/// `POST /calls/{call_sid}/hold`
pub async fn hold_call(
    State(state): State<Arc<AppState>>,
    Path(call_sid): Path<String>,
) -> AppResult<Json<Value>> {
    let handle = bridge_for(&state, &call_sid)?;
    let status = handle
        .hold()
        .await
        .map_err(|e| AppError::from_bridge(&call_sid, e))?;
    Ok(Json(json!({"call_sid": call_sid, "status": status})))
}

/// `POST /calls/{call_sid}/resume`
pub async fn resume_call(
    State(state): State<Arc<AppState>>,
    Path(call_sid): Path<String>,
) -> AppResult<Json<Value>> {
    let handle = bridge_for(&state, &call_sid)?;
    let status = handle
        .resume()
        .await
        .map_err(|e| AppError::from_bridge(&call_sid, e))?;
    Ok(Json(json!({"call_sid": call_sid, "status": status})))
}

/// `POST /calls/{call_sid}/end`
pub async fn end_call(
    State(state): State<Arc<AppState>>,
    Path(call_sid): Path<String>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let handle = bridge_for(&state, &call_sid)?;
    deliver(&handle, &call_sid, BridgeCommand::Hangup)?;
    info!(call_sid = %call_sid, "Operator hang-up requested");
    Ok(accepted(&call_sid))
}
