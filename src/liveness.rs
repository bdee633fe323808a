//! Heartbeats, timeout detection, and presence notification (§4.6)

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use crate::db::PairingRepo;
use crate::registry::Registry;
use crate::Result;

/// Default ping cadence, used when no interval is configured
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// What a heartbeat tick found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Time to send a ping
    SendPing,
    /// No inbound frame within the timeout; close with 1011
    TimedOut,
}

/// Tracks the last inbound frame time for one session and the configured
/// ping cadence. The idle timeout is twice the ping interval: a session
/// survives one missed ping before it is considered dead.
pub struct Heartbeat {
    last_inbound: Mutex<Instant>,
    ping_interval: Duration,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new(DEFAULT_PING_INTERVAL)
    }
}

impl Heartbeat {
    /// Start a fresh heartbeat as of now, pinging every `ping_interval`
    #[must_use]
    pub fn new(ping_interval: Duration) -> Self {
        Self { last_inbound: Mutex::new(Instant::now()), ping_interval }
    }

    /// Record that a frame (of any kind) just arrived
    pub fn touch(&self) {
        *self.last_inbound.lock().expect("heartbeat mutex poisoned") = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_inbound.lock().expect("heartbeat mutex poisoned").elapsed()
    }

    /// Sleep until the next ping is due, then report whether the session
    /// has gone quiet past twice the ping interval
    pub async fn tick(&self) -> Tick {
        tokio::time::sleep(self.ping_interval).await;
        if self.idle_for() >= self.ping_interval * 2 {
            Tick::TimedOut
        } else {
            Tick::SendPing
        }
    }
}

/// Build the presence frame the wire contract specifies
#[must_use]
pub fn presence_frame(device_id: i64, online: bool) -> Value {
    json!({
        "type": "event",
        "event": if online { "DEVICE_ONLINE" } else { "DEVICE_OFFLINE" },
        "device_id": device_id,
    })
}

/// Best-effort: tell `device_id`'s paired peer, if any and if live, about a
/// presence change. Never queued, never retried.
///
/// # Errors
///
/// Returns error only if the pairing lookup itself fails (a store error)
pub fn notify_peer(registry: &Registry, pairings: &PairingRepo, device_id: i64, online: bool) -> Result<()> {
    if let Some(peer_id) = pairings.peer_of(device_id)? {
        if let Some(handle) = registry.lookup(peer_id) {
            handle.send_text(presence_frame(device_id, online).to_string());
        }
    }
    Ok(())
}
