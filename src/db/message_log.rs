//! Append-only audit log of routed traffic (§3 MessageLogEntry, §6 Audit Log)

use chrono::{DateTime, Duration, Utc};

use super::DbPool;
use crate::Result;

/// A single logged message
#[derive(Debug, Clone)]
pub struct MessageLogEntry {
    pub id: i64,
    pub from_device_id: i64,
    pub to_device_id: i64,
    pub kind: String,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

/// A page of log entries plus the total matching row count
#[derive(Debug, Clone)]
pub struct MessageLogPage {
    pub items: Vec<MessageLogEntry>,
    pub total: i64,
}

/// Repository for the append-only message log
#[derive(Clone)]
pub struct MessageLogRepo {
    pool: DbPool,
}

impl MessageLogRepo {
    /// Create a new message-log repository
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Append one entry. Never fails the forwarding path: callers should log
    /// and continue on error rather than abort delivery.
    ///
    /// # Errors
    ///
    /// Returns error on database failure
    pub fn append(&self, from_device_id: i64, to_device_id: i64, kind: &str, payload: &str) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO message_log (from_device_id, to_device_id, kind, payload)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![from_device_id, to_device_id, kind, payload],
        )?;
        Ok(())
    }

    /// Page through the log for every device belonging to an account, newest
    /// first
    ///
    /// # Errors
    ///
    /// Returns error on database failure
    pub fn page_for_account(&self, account_id: i64, limit: i64, offset: i64) -> Result<MessageLogPage> {
        let conn = self.pool.get()?;

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM message_log
             WHERE from_device_id IN (SELECT id FROM devices WHERE account_id = ?1)
                OR to_device_id IN (SELECT id FROM devices WHERE account_id = ?1)",
            [account_id],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT id, from_device_id, to_device_id, kind, payload, created_at
             FROM message_log
             WHERE from_device_id IN (SELECT id FROM devices WHERE account_id = ?1)
                OR to_device_id IN (SELECT id FROM devices WHERE account_id = ?1)
             ORDER BY created_at DESC, id DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let items = stmt
            .query_map(rusqlite::params![account_id, limit, offset], row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(MessageLogPage { items, total })
    }

    /// Delete every entry older than `retention_days`, in bounded-size
    /// chunks so a large backlog never holds a single long transaction
    ///
    /// # Errors
    ///
    /// Returns error on database failure
    pub fn sweep_expired(&self, retention_days: i64, chunk_size: i64) -> Result<u64> {
        let conn = self.pool.get()?;
        let cutoff = (Utc::now() - Duration::days(retention_days)).to_rfc3339();

        let mut total_deleted = 0u64;
        loop {
            let deleted = conn.execute(
                "DELETE FROM message_log WHERE id IN (
                    SELECT id FROM message_log WHERE created_at < ?1 LIMIT ?2
                 )",
                rusqlite::params![cutoff, chunk_size],
            )?;
            total_deleted += deleted as u64;
            if deleted == 0 {
                break;
            }
        }

        Ok(total_deleted)
    }
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<MessageLogEntry> {
    Ok(MessageLogEntry {
        id: row.get(0)?,
        from_device_id: row.get(1)?,
        to_device_id: row.get(2)?,
        kind: row.get(3)?,
        payload: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
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
    fn test_append_and_page() {
        let pool = init_memory().unwrap();
        let repo = MessageLogRepo::new(pool.clone());

        let accounts = crate::db::AccountRepo::new(pool.clone());
        let devices = crate::db::DeviceRepo::new(pool);
        let account = accounts.create_with_password("alice", "hash").unwrap();
        let host = devices
            .create(account.id, "host", crate::db::DeviceKind::Host)
            .unwrap();
        let client = devices
            .create(account.id, "client", crate::db::DeviceKind::Client)
            .unwrap();

        for i in 0..3 {
            repo.append(client.id, host.id, "command", &format!("payload-{i}"))
                .unwrap();
        }

        let page = repo.page_for_account(account.id, 2, 0).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        // newest first
        assert_eq!(page.items[0].payload, "payload-2");
    }

    #[test]
    fn test_sweep_expired() {
        let pool = init_memory().unwrap();
        let repo = MessageLogRepo::new(pool.clone());

        {
            let conn = pool.get().unwrap();
            conn.execute(
                "INSERT INTO message_log (from_device_id, to_device_id, kind, payload, created_at)
                 VALUES (1, 2, 'command', 'old', '2000-01-01T00:00:00Z')",
                [],
            )
            .unwrap();
        }
        repo.append(1, 2, "command", "fresh").unwrap();

        let deleted = repo.sweep_expired(30, 500).unwrap();
        assert_eq!(deleted, 1);

        let conn = pool.get().unwrap();
        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM message_log", [], |row| row.get(0))
            .unwrap();
        assert_eq!(remaining, 1);
    }
}
