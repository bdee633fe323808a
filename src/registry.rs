//! Connection Registry: at most one live session per device (§4.4)
//!
//! Guarded by a single synchronous mutex; nothing under the lock performs
//! I/O. Displacement returns the replaced handle to the caller, which closes
//! it with 1008 *after* releasing the lock — the registry itself never
//! writes to a socket.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, Arc};

use axum::extract::ws::{CloseFrame, Message};
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

/// Outbound frames queued per session before backpressure kicks in (§5)
pub const OUTBOUND_BUFFER: usize = 64;

/// A handle to a live session's send side, keyed by an opaque session id so
/// a displaced session can recognize that it is no longer the registrant.
///
/// Forwarding goes through a bounded channel so one slow consumer cannot
/// grow without bound; `force_close` is a second, always-available signal
/// path so a session can still be torn down even while its data channel is
/// saturated (§5 "a slow consumer must not stall other sessions").
#[derive(Clone)]
pub struct SessionHandle {
    pub session_id: Uuid,
    sender: mpsc::Sender<Message>,
    close_reason: Arc<Mutex<CloseFrame>>,
    force_close: Arc<Notify>,
}

/// The receiving half returned alongside a freshly created [`SessionHandle`]
pub struct SessionReceiver {
    pub frames: mpsc::Receiver<Message>,
    close_reason: Arc<Mutex<CloseFrame>>,
    force_close: Arc<Notify>,
}

impl SessionReceiver {
    /// Wait until the session has been asked to close (idle timeout,
    /// displacement, or backpressure), then return the close frame to send
    pub async fn closed(&self) -> CloseFrame {
        self.force_close.notified().await;
        self.close_reason.lock().expect("registry mutex poisoned").clone()
    }
}

impl SessionHandle {
    /// Create a new handle and its paired receiver, with a fresh session id
    /// and a bounded outbound buffer
    #[must_use]
    pub fn new() -> (Self, SessionReceiver) {
        let (sender, frames) = mpsc::channel(OUTBOUND_BUFFER);
        let force_close = Arc::new(Notify::new());
        let close_reason = Arc::new(Mutex::new(abnormal_close_frame()));
        (
            Self {
                session_id: Uuid::new_v4(),
                sender,
                close_reason: close_reason.clone(),
                force_close: force_close.clone(),
            },
            SessionReceiver { frames, close_reason, force_close },
        )
    }

    /// Send a text frame without blocking. A full buffer or a closed
    /// receiver both count as the session being offline to the caller, and
    /// also wake the session's own task so it can tear itself down rather
    /// than silently accumulate backlog.
    pub fn send_text(&self, text: String) -> bool {
        match self.sender.try_send(Message::Text(text.into())) {
            Ok(()) => true,
            Err(_) => {
                self.close(1011, "outbound buffer full");
                false
            }
        }
    }

    /// Request that the session close with the given WebSocket close code.
    /// Delivered via the force-close signal so it is never blocked by a
    /// saturated outbound buffer.
    pub fn close(&self, code: u16, reason: &'static str) {
        *self.close_reason.lock().expect("registry mutex poisoned") =
            CloseFrame { code, reason: reason.into() };
        self.force_close.notify_one();
    }

    /// Close this session because it was displaced by a newer attach (1008)
    pub fn displace(&self) {
        *self.close_reason.lock().expect("registry mutex poisoned") = displacement_close_frame();
        self.force_close.notify_one();
    }
}

/// Maps device id to its live session, enforcing single-connection-per-device
#[derive(Default)]
pub struct Registry {
    sessions: Mutex<HashMap<i64, SessionHandle>>,
}

impl Registry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` as the live session for `device_id`. If a session
    /// was already registered, it is replaced and returned to the caller so
    /// it can be closed with 1008 outside the lock.
    #[must_use]
    pub fn attach(&self, device_id: i64, handle: SessionHandle) -> Option<SessionHandle> {
        let mut sessions = self.sessions.lock().expect("registry mutex poisoned");
        sessions.insert(device_id, handle)
    }

    /// Remove `device_id`'s session iff it is still registered as
    /// `session_id`. A displaced session detaching itself is a no-op: its
    /// replacement stays registered. Returns true if a removal happened.
    pub fn detach(&self, device_id: i64, session_id: Uuid) -> bool {
        let mut sessions = self.sessions.lock().expect("registry mutex poisoned");
        if sessions.get(&device_id).is_some_and(|h| h.session_id == session_id) {
            sessions.remove(&device_id);
            return true;
        }
        false
    }

    /// Look up the live session for a device, if any
    #[must_use]
    pub fn lookup(&self, device_id: i64) -> Option<SessionHandle> {
        self.sessions
            .lock()
            .expect("registry mutex poisoned")
            .get(&device_id)
            .cloned()
    }

    /// Snapshot the set of device ids with a live session right now
    #[must_use]
    pub fn snapshot(&self) -> HashSet<i64> {
        self.sessions.lock().expect("registry mutex poisoned").keys().copied().collect()
    }
}

/// Build the WebSocket close frame for a policy-violation displacement (1008)
#[must_use]
pub fn displacement_close_frame() -> CloseFrame {
    CloseFrame { code: 1008, reason: "replaced by a new connection".into() }
}

/// Build the WebSocket close frame for an idle-timeout/backpressure drop (1011)
#[must_use]
pub fn abnormal_close_frame() -> CloseFrame {
    CloseFrame { code: 1011, reason: "session unresponsive".into() }
}
