//! REST alternative to the WS command frame, plus the audit-log reader (§6)
//!
//! A REST-submitted command has no session of its own, so the "from" device
//! for routing purposes is derived from the target host's paired client
//! rather than taken off a live connection.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::middleware::AuthenticatedAccount;
use super::ApiState;
use crate::db::DeviceKind;
use crate::router::RouterReply;
use crate::{Error, Result};

pub fn router() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/sms", post(send_sms))
        .route("/call", post(place_call))
        .route("/history", get(history))
}

#[derive(Deserialize)]
struct SmsRequest {
    host_device_id: i64,
    sim: u8,
    to: String,
    body: String,
    req_id: Option<String>,
}

#[derive(Deserialize)]
struct CallRequest {
    host_device_id: i64,
    sim: u8,
    to: String,
    req_id: Option<String>,
}

#[derive(Serialize)]
struct CommandResponse {
    status: &'static str,
    req_id: Option<String>,
}

async fn send_sms(
    State(state): State<Arc<ApiState>>,
    AuthenticatedAccount(account_id): AuthenticatedAccount,
    Json(body): Json<SmsRequest>,
) -> Result<Json<CommandResponse>> {
    let frame = json!({
        "type": "command",
        "cmd": "SEND_SMS",
        "sim": body.sim,
        "to": body.to,
        "body": body.body,
        "req_id": body.req_id,
    });
    submit_command(&state, account_id, body.host_device_id, &frame)
}

async fn place_call(
    State(state): State<Arc<ApiState>>,
    AuthenticatedAccount(account_id): AuthenticatedAccount,
    Json(body): Json<CallRequest>,
) -> Result<Json<CommandResponse>> {
    let frame = json!({
        "type": "command",
        "cmd": "PLACE_CALL",
        "sim": body.sim,
        "to": body.to,
        "req_id": body.req_id,
    });
    submit_command(&state, account_id, body.host_device_id, &frame)
}

/// Route one REST-originated command through the same message router a WS
/// frame would use, on behalf of the host's paired client device
fn submit_command(
    state: &ApiState,
    account_id: i64,
    host_device_id: i64,
    frame: &Value,
) -> Result<Json<CommandResponse>> {
    state.devices.require_owned(host_device_id, account_id, DeviceKind::Host)?;

    let from_device_id = state
        .pairings
        .peer_of(host_device_id)?
        .ok_or_else(|| Error::NotFound("host has no paired client".into()))?;

    let reply = state.message_router.route(from_device_id, &frame.to_string())?;

    let status = match reply {
        RouterReply::None => "delivered",
        RouterReply::Queued { .. } => "queued",
        RouterReply::Error(message) => return Err(Error::BadRequest(message)),
        // Commands never produce these replies; only events and webrtc do.
        RouterReply::TargetOffline { .. } | RouterReply::Pong => "delivered",
    };

    Ok(Json(CommandResponse {
        status,
        req_id: frame.get("req_id").and_then(Value::as_str).map(ToString::to_string),
    }))
}

#[derive(Deserialize)]
struct HistoryQuery {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

const fn default_limit() -> i64 {
    50
}

#[derive(Serialize)]
struct HistoryResponse {
    items: Vec<HistoryItem>,
    total: i64,
    offset: i64,
    limit: i64,
}

#[derive(Serialize)]
struct HistoryItem {
    id: i64,
    from_device_id: i64,
    to_device_id: i64,
    kind: String,
    payload: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

async fn history(
    State(state): State<Arc<ApiState>>,
    AuthenticatedAccount(account_id): AuthenticatedAccount,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>> {
    let page = state.message_log.page_for_account(account_id, query.limit, query.offset)?;
    Ok(Json(HistoryResponse {
        items: page
            .items
            .into_iter()
            .map(|entry| HistoryItem {
                id: entry.id,
                from_device_id: entry.from_device_id,
                to_device_id: entry.to_device_id,
                kind: entry.kind,
                payload: entry.payload,
                created_at: entry.created_at,
            })
            .collect(),
        total: page.total,
        offset: query.offset,
        limit: query.limit,
    }))
}
