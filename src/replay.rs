//! Pending-command replay on host attach (§4.7)

use std::sync::Arc;

use crate::db::PendingCommandRepo;
use crate::registry::Registry;

/// Drain every undelivered command queued for `host_device_id` and forward
/// it on the session that just attached, oldest first. Runs as its own task
/// so a slow drain never blocks the session's inbound reader.
///
/// A send failure stops the drain early; the remaining rows stay
/// undelivered and are retried on the next attach edge.
pub fn spawn_drain(registry: Arc<Registry>, pending: PendingCommandRepo, host_device_id: i64) {
    tokio::spawn(async move {
        let commands = match pending.drain_for_host(host_device_id) {
            Ok(commands) => commands,
            Err(e) => {
                tracing::warn!(host_device_id, error = %e, "replay: failed to read pending commands");
                return;
            }
        };

        if commands.is_empty() {
            return;
        }

        let Some(handle) = registry.lookup(host_device_id) else {
            tracing::debug!(host_device_id, "replay: host no longer attached, deferring");
            return;
        };

        let mut delivered_count = 0usize;
        for command in &commands {
            if !handle.send_text(command.payload.clone()) {
                tracing::debug!(
                    host_device_id,
                    command_id = command.id,
                    "replay: send failed, leaving remainder queued"
                );
                break;
            }
            if let Err(e) = pending.mark_delivered(command.id) {
                tracing::warn!(command_id = command.id, error = %e, "replay: failed to mark delivered");
                break;
            }
            delivered_count += 1;
        }

        tracing::info!(
            host_device_id,
            delivered_count,
            total = commands.len(),
            "replay: drain complete"
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory;
    use crate::registry::SessionHandle;

    #[tokio::test]
    async fn test_drain_delivers_in_fifo_order_and_marks_delivered() {
        let pool = init_memory().unwrap();
        let pending = PendingCommandRepo::new(pool);
        pending.enqueue(1, 2, "first").unwrap();
        pending.enqueue(1, 2, "second").unwrap();

        let registry = Arc::new(Registry::new());
        let (handle, mut rx) = SessionHandle::new();
        registry.attach(1, handle);

        spawn_drain(registry, pending.clone(), 1);

        let first = rx.frames.recv().await.unwrap();
        let second = rx.frames.recv().await.unwrap();
        let axum::extract::ws::Message::Text(first_text) = first else { panic!() };
        let axum::extract::ws::Message::Text(second_text) = second else { panic!() };
        assert_eq!(first_text, "first");
        assert_eq!(second_text, "second");

        // give the spawned task a moment to mark delivery before reading back
        tokio::task::yield_now().await;
        let remaining = pending.drain_for_host(1).unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn test_drain_noop_when_host_not_attached() {
        let pool = init_memory().unwrap();
        let pending = PendingCommandRepo::new(pool);
        pending.enqueue(1, 2, "first").unwrap();

        let registry = Arc::new(Registry::new());
        spawn_drain(registry, pending.clone(), 1);
        tokio::task::yield_now().await;

        let remaining = pending.drain_for_host(1).unwrap();
        assert_eq!(remaining.len(), 1);
    }
}
