//! WebSocket handshake and the per-session duplex loop (§6, §4.6)

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;

use super::ApiState;
use crate::db::DeviceKind;
use crate::identity::TokenVerification;
use crate::liveness::{self, Heartbeat, Tick};
use crate::registry::SessionHandle;
use crate::replay;

pub fn router() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/ws/host/{device_id}", get(host_upgrade))
        .route("/ws/client/{device_id}", get(client_upgrade))
}

#[derive(Deserialize)]
struct WsQuery {
    token: String,
}

async fn host_upgrade(
    State(state): State<Arc<ApiState>>,
    Path(device_id): Path<i64>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade(state, device_id, DeviceKind::Host, query.token, ws)
}

async fn client_upgrade(
    State(state): State<Arc<ApiState>>,
    Path(device_id): Path<i64>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade(state, device_id, DeviceKind::Client, query.token, ws)
}

/// Authenticate and authorize before upgrading. This runs against the plain
/// HTTP request, so a rejected handshake never opens a socket.
fn upgrade(
    state: Arc<ApiState>,
    device_id: i64,
    kind: DeviceKind,
    token: String,
    ws: WebSocketUpgrade,
) -> axum::response::Response {
    let account_id = match state.identity.verify_token(&token) {
        TokenVerification::Valid(account_id) => account_id,
        TokenVerification::Expired | TokenVerification::Malformed => {
            return axum::http::StatusCode::UNAUTHORIZED.into_response();
        }
    };

    match state.devices.require_owned(device_id, account_id, kind) {
        Ok(_) => ws.on_upgrade(move |socket| run_session(socket, state, device_id)),
        Err(e) => e.into_response(),
    }
}

/// Drive one authenticated session until the socket or the registry closes it
async fn run_session(socket: WebSocket, state: Arc<ApiState>, device_id: i64) {
    let (mut sender, mut receiver) = socket.split();

    let connected = json!({"type": "connected", "device_id": device_id}).to_string();
    if sender.send(Message::Text(connected.into())).await.is_err() {
        return;
    }

    let (handle, mut session_rx) = SessionHandle::new();
    let session_id = handle.session_id;
    let heartbeat = Heartbeat::new(state.ping_interval);

    let displaced = state.registry.attach(device_id, handle);
    let was_absent = displaced.is_none();
    if let Some(prior) = displaced {
        prior.displace();
    } else if let Err(e) = liveness::notify_peer(&state.registry, &state.pairings, device_id, true) {
        tracing::warn!(device_id, error = %e, "failed to notify peer of presence");
    }

    if was_absent {
        replay::spawn_drain(state.registry.clone(), state.pending.clone(), device_id);
    }

    tracing::info!(device_id, session_id = %session_id, "session attached");

    loop {
        tokio::select! {
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        heartbeat.touch();
                        if !forward_to_router(&state, device_id, &text, &mut sender).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_))) => {
                        heartbeat.touch();
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(device_id, error = %e, "session read error");
                        break;
                    }
                }
            }
            outbound = session_rx.frames.recv() => {
                let Some(frame) = outbound else { break };
                if sender.send(frame).await.is_err() {
                    break;
                }
            }
            tick = heartbeat.tick() => {
                match tick {
                    Tick::SendPing => {
                        if sender.send(Message::Text("{\"type\":\"ping\"}".into())).await.is_err() {
                            break;
                        }
                    }
                    Tick::TimedOut => {
                        let close = CloseFrame { code: 1011, reason: "idle timeout".into() };
                        let _ = sender.send(Message::Close(Some(close))).await;
                        break;
                    }
                }
            }
            close_frame = session_rx.closed() => {
                let _ = sender.send(Message::Close(Some(close_frame))).await;
                break;
            }
        }
    }

    if state.registry.detach(device_id, session_id) {
        if let Err(e) = liveness::notify_peer(&state.registry, &state.pairings, device_id, false) {
            tracing::warn!(device_id, error = %e, "failed to notify peer of presence");
        }
    }
    tracing::info!(device_id, session_id = %session_id, "session detached");
}

/// Route one inbound text frame and reply on the same session. Returns
/// false if the socket write failed and the session loop should stop.
async fn forward_to_router(
    state: &Arc<ApiState>,
    device_id: i64,
    raw: &str,
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
) -> bool {
    match state.message_router.route(device_id, raw) {
        Ok(reply) => {
            if let Some(payload) = reply.to_json() {
                return sender.send(Message::Text(payload.to_string().into())).await.is_ok();
            }
            true
        }
        Err(e) => {
            tracing::warn!(device_id, error = %e, "router error while handling inbound frame");
            let close = CloseFrame { code: 1011, reason: "internal error".into() };
            let _ = sender.send(Message::Close(Some(close))).await;
            false
        }
    }
}
