//! Message router: frame classification, authorization, forwarding,
//! queueing, and audit logging (§4.5)

use serde_json::{json, Value};
use std::sync::Arc;

use crate::db::{MessageLogRepo, PairingRepo, PendingCommandRepo};
use crate::registry::Registry;
use crate::{Error, Result};

/// The four frame types the router recognizes on `type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Ping,
    Command,
    Event,
    Webrtc,
}

impl FrameKind {
    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "ping" => Ok(Self::Ping),
            "command" => Ok(Self::Command),
            "event" => Ok(Self::Event),
            "webrtc" => Ok(Self::Webrtc),
            other => Err(Error::BadRequest(format!("invalid message type: {other}"))),
        }
    }
}

/// What the router wants sent back to the originating session, if anything
#[derive(Debug, Clone)]
pub enum RouterReply {
    /// Nothing to send back
    None,
    /// Reply to an inbound ping
    Pong,
    /// The command was queued for an offline host
    Queued { req_id: Option<String> },
    /// The frame's target has no live session (events and webrtc only)
    TargetOffline { target_device_id: i64, req_id: Option<String> },
    /// A router-level error: invalid type, missing pairing, etc.
    Error(String),
}

impl RouterReply {
    /// Render the reply as the JSON frame the wire contract specifies
    #[must_use]
    pub fn to_json(&self) -> Option<Value> {
        match self {
            Self::None => None,
            Self::Pong => Some(json!({"type": "pong"})),
            Self::Queued { req_id } => Some(json!({"status": "queued", "req_id": req_id})),
            Self::TargetOffline { target_device_id, req_id } => Some(json!({
                "error": "target_offline",
                "target_device_id": target_device_id,
                "req_id": req_id,
            })),
            Self::Error(message) => Some(json!({"error": message})),
        }
    }
}

/// Routes inbound frames between paired devices
#[derive(Clone)]
pub struct Router {
    registry: Arc<Registry>,
    pairings: PairingRepo,
    pending: PendingCommandRepo,
    message_log: MessageLogRepo,
}

impl Router {
    /// Build a router over the registry and repositories it coordinates
    #[must_use]
    pub const fn new(
        registry: Arc<Registry>,
        pairings: PairingRepo,
        pending: PendingCommandRepo,
        message_log: MessageLogRepo,
    ) -> Self {
        Self { registry, pairings, pending, message_log }
    }

    /// Classify and route one inbound frame from `from_device_id`
    ///
    /// # Errors
    ///
    /// Returns error only for conditions the caller should log and close
    /// the session over (store failures); ordinary protocol violations are
    /// surfaced as an `Ok(RouterReply::Error(..))` so the sender stays
    /// connected.
    pub fn route(&self, from_device_id: i64, raw: &str) -> Result<RouterReply> {
        let mut payload: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(_) => return Ok(RouterReply::Error("malformed JSON frame".into())),
        };

        let Some(type_str) = payload.get("type").and_then(Value::as_str) else {
            return Ok(RouterReply::Error("missing message type".into()));
        };

        let kind = match FrameKind::parse(type_str) {
            Ok(kind) => kind,
            Err(Error::BadRequest(message)) => return Ok(RouterReply::Error(message)),
            Err(e) => return Err(e),
        };

        if kind == FrameKind::Ping {
            return Ok(RouterReply::Pong);
        }

        let req_id = payload
            .get("req_id")
            .and_then(Value::as_str)
            .map(ToString::to_string);

        let Some(peer_id) = self.pairings.peer_of(from_device_id)? else {
            let message = if kind == FrameKind::Command { "no paired host" } else { "not paired" };
            return Ok(RouterReply::Error(message.into()));
        };

        if let Some(obj) = payload.as_object_mut() {
            obj.insert("from_device_id".into(), json!(from_device_id));
        }
        let serialized = payload.to_string();

        match kind {
            FrameKind::Ping => unreachable!("handled above"),
            FrameKind::Command => self.route_command(from_device_id, peer_id, &serialized, req_id),
            FrameKind::Event => self.route_event(from_device_id, peer_id, &serialized, req_id),
            FrameKind::Webrtc => Ok(self.route_webrtc(peer_id, &serialized, req_id)),
        }
    }

    fn route_command(
        &self,
        from_device_id: i64,
        host_device_id: i64,
        serialized: &str,
        req_id: Option<String>,
    ) -> Result<RouterReply> {
        let delivered = self
            .registry
            .lookup(host_device_id)
            .is_some_and(|handle| handle.send_text(serialized.to_string()));

        self.message_log.append(from_device_id, host_device_id, "command", serialized)?;

        if delivered {
            return Ok(RouterReply::None);
        }

        self.pending.enqueue(host_device_id, from_device_id, serialized)?;
        Ok(RouterReply::Queued { req_id })
    }

    fn route_event(
        &self,
        from_device_id: i64,
        client_device_id: i64,
        serialized: &str,
        req_id: Option<String>,
    ) -> Result<RouterReply> {
        let delivered = self
            .registry
            .lookup(client_device_id)
            .is_some_and(|handle| handle.send_text(serialized.to_string()));

        self.message_log.append(from_device_id, client_device_id, "event", serialized)?;

        if delivered {
            return Ok(RouterReply::None);
        }

        Ok(RouterReply::TargetOffline { target_device_id: client_device_id, req_id })
    }

    fn route_webrtc(&self, peer_device_id: i64, serialized: &str, req_id: Option<String>) -> RouterReply {
        let delivered = self
            .registry
            .lookup(peer_device_id)
            .is_some_and(|handle| handle.send_text(serialized.to_string()));

        if delivered {
            RouterReply::None
        } else {
            RouterReply::TargetOffline { target_device_id: peer_device_id, req_id }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_memory, AccountRepo, DeviceKind, DeviceRepo};
    use crate::registry::SessionHandle;

    fn setup() -> (Router, i64, i64, i64) {
        let pool = init_memory().unwrap();
        let accounts = AccountRepo::new(pool.clone());
        let devices = DeviceRepo::new(pool.clone());
        let pairings = PairingRepo::new(pool.clone());
        let pending = PendingCommandRepo::new(pool.clone());
        let message_log = MessageLogRepo::new(pool);

        let account = accounts.create_with_password("alice", "hash").unwrap();
        let host = devices.create(account.id, "host", DeviceKind::Host).unwrap();
        let client = devices.create(account.id, "client", DeviceKind::Client).unwrap();
        pairings.create(host.id, client.id).unwrap();

        let registry = Arc::new(Registry::new());
        let router = Router::new(registry, pairings, pending, message_log);
        (router, account.id, host.id, client.id)
    }

    #[test]
    fn test_ping_replies_pong() {
        let (router, _account, _host, client) = setup();
        let reply = router.route(client, r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(reply, RouterReply::Pong));
    }

    #[test]
    fn test_invalid_type_is_error_not_forwarded() {
        let (router, _account, _host, client) = setup();
        let reply = router.route(client, r#"{"type":"bogus"}"#).unwrap();
        assert!(matches!(reply, RouterReply::Error(_)));
    }

    #[test]
    fn test_command_queues_when_host_offline() {
        let (router, _account, host, client) = setup();
        let reply = router
            .route(client, r#"{"type":"command","cmd":"SEND_SMS","req_id":"r1"}"#)
            .unwrap();
        assert!(matches!(reply, RouterReply::Queued { .. }));

        let queued = router.pending.drain_for_host(host).unwrap();
        assert_eq!(queued.len(), 1);
    }

    #[test]
    fn test_command_forwarded_when_host_online() {
        let (router, _account, host, client) = setup();
        let (handle, mut rx) = SessionHandle::new();
        router.registry.attach(host, handle);

        let reply = router
            .route(client, r#"{"type":"command","cmd":"SEND_SMS","req_id":"r1"}"#)
            .unwrap();
        assert!(matches!(reply, RouterReply::None));

        let forwarded = rx.frames.try_recv().unwrap();
        let axum::extract::ws::Message::Text(text) = forwarded else {
            panic!("expected text frame");
        };
        assert!(text.contains("from_device_id"));

        let queued = router.pending.drain_for_host(host).unwrap();
        assert!(queued.is_empty());
    }

    #[test]
    fn test_event_offline_is_not_queued() {
        let (router, _account, host, client) = setup();
        let reply = router
            .route(host, r#"{"type":"event","event":"STATE_CHANGED","req_id":"r2"}"#)
            .unwrap();
        match reply {
            RouterReply::TargetOffline { target_device_id, .. } => {
                assert_eq!(target_device_id, client);
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn test_webrtc_offline_preserves_req_id() {
        let (router, _account, host, client) = setup();
        let reply = router
            .route(host, r#"{"type":"webrtc","sdp":"...","req_id":"r3"}"#)
            .unwrap();
        match reply {
            RouterReply::TargetOffline { target_device_id, req_id } => {
                assert_eq!(target_device_id, client);
                assert_eq!(req_id.as_deref(), Some("r3"));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn test_unpaired_sender_rejected() {
        let pool = init_memory().unwrap();
        let accounts = AccountRepo::new(pool.clone());
        let devices = DeviceRepo::new(pool.clone());
        let pairings = PairingRepo::new(pool.clone());
        let pending = PendingCommandRepo::new(pool.clone());
        let message_log = MessageLogRepo::new(pool);
        let account = accounts.create_with_password("lonely", "hash").unwrap();
        let client = devices.create(account.id, "client", DeviceKind::Client).unwrap();

        let registry = Arc::new(Registry::new());
        let router = Router::new(registry, pairings, pending, message_log);

        let reply = router.route(client.id, r#"{"type":"command","cmd":"X"}"#).unwrap();
        assert!(matches!(reply, RouterReply::Error(_)));
    }
}
