//! Queued commands awaiting delivery to an offline host (§5 Replay)

use chrono::{DateTime, Utc};

use super::DbPool;
use crate::Result;

/// A command queued for a host that was offline when it was sent
#[derive(Debug, Clone)]
pub struct PendingCommand {
    pub id: i64,
    pub host_device_id: i64,
    pub from_device_id: i64,
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub delivered: bool,
}

/// Repository for queued commands
#[derive(Clone)]
pub struct PendingCommandRepo {
    pool: DbPool,
}

impl PendingCommandRepo {
    /// Create a new pending-command repository
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Queue a command for later delivery
    ///
    /// # Errors
    ///
    /// Returns error on database failure
    pub fn enqueue(&self, host_device_id: i64, from_device_id: i64, payload: &str) -> Result<PendingCommand> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO pending_commands (host_device_id, from_device_id, payload)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![host_device_id, from_device_id, payload],
        )?;
        let id = conn.last_insert_rowid();
        conn.query_row(
            "SELECT id, host_device_id, from_device_id, payload, created_at, delivered
             FROM pending_commands WHERE id = ?1",
            [id],
            row_to_pending,
        )
        .map_err(Into::into)
    }

    /// Fetch every undelivered command for a host, oldest first, without
    /// marking them delivered. Callers mark delivery only after the frame
    /// has actually been handed to the socket.
    ///
    /// # Errors
    ///
    /// Returns error on database failure
    pub fn drain_for_host(&self, host_device_id: i64) -> Result<Vec<PendingCommand>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, host_device_id, from_device_id, payload, created_at, delivered
             FROM pending_commands
             WHERE host_device_id = ?1 AND delivered = 0
             ORDER BY created_at ASC, id ASC",
        )?;
        let commands = stmt
            .query_map([host_device_id], row_to_pending)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(commands)
    }

    /// Mark a single queued command delivered
    ///
    /// # Errors
    ///
    /// Returns error on database failure
    pub fn mark_delivered(&self, id: i64) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute("UPDATE pending_commands SET delivered = 1 WHERE id = ?1", [id])?;
        Ok(())
    }
}

fn row_to_pending(row: &rusqlite::Row) -> rusqlite::Result<PendingCommand> {
    Ok(PendingCommand {
        id: row.get(0)?,
        host_device_id: row.get(1)?,
        from_device_id: row.get(2)?,
        payload: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        delivered: row.get::<_, i64>(5)? != 0,
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|naive| naive.and_utc())
                .unwrap_or_else(|_| Utc::now())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory;

    #[test]
    fn test_enqueue_and_drain_fifo() {
        let repo = PendingCommandRepo::new(init_memory().unwrap());
        repo.enqueue(1, 2, "first").unwrap();
        repo.enqueue(1, 2, "second").unwrap();

        let drained = repo.drain_for_host(1).unwrap();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].payload, "first");
        assert_eq!(drained[1].payload, "second");
    }

    #[test]
    fn test_mark_delivered_excludes_from_drain() {
        let repo = PendingCommandRepo::new(init_memory().unwrap());
        let queued = repo.enqueue(1, 2, "only").unwrap();
        repo.mark_delivered(queued.id).unwrap();

        let drained = repo.drain_for_host(1).unwrap();
        assert!(drained.is_empty());
    }
}
