//! Pairing-code and pairing repositories (§3 PairingCode, Pairing)

use chrono::{DateTime, Duration, Utc};

use super::DbPool;
use crate::Result;

/// Lifetime of an issued pairing code
pub const CODE_TTL_MINUTES: i64 = 10;

/// A 6-digit pairing code issued by a host's account
#[derive(Debug, Clone)]
pub struct PairingCode {
    pub id: i64,
    pub account_id: i64,
    pub host_device_id: i64,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
    pub created_at: DateTime<Utc>,
}

impl PairingCode {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// An established, account-scoped host↔client link
#[derive(Debug, Clone)]
pub struct Pairing {
    pub id: i64,
    pub host_device_id: i64,
    pub client_device_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Repository for pairing codes
#[derive(Clone)]
pub struct PairingCodeRepo {
    pool: DbPool,
}

impl PairingCodeRepo {
    /// Create a new pairing-code repository
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Mark every unconsumed code for (account, host) as expired by
    /// back-dating `expires_at`, then insert a fresh one
    ///
    /// # Errors
    ///
    /// Returns error on database failure
    pub fn issue(&self, account_id: i64, host_device_id: i64, code: &str) -> Result<PairingCode> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        let now = Utc::now();
        let already_expired = (now - Duration::minutes(1)).to_rfc3339();
        tx.execute(
            "UPDATE pairing_codes SET expires_at = ?1
             WHERE account_id = ?2 AND host_device_id = ?3 AND consumed = 0",
            rusqlite::params![already_expired, account_id, host_device_id],
        )?;

        let expires_at = now + Duration::minutes(CODE_TTL_MINUTES);
        tx.execute(
            "INSERT INTO pairing_codes (account_id, host_device_id, code, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![account_id, host_device_id, code, expires_at.to_rfc3339()],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(PairingCode {
            id,
            account_id,
            host_device_id,
            code: code.to_string(),
            expires_at,
            consumed: false,
            created_at: now,
        })
    }

    /// Find the most recent row for a code, consumed or not. Callers need
    /// the consumed row too, to distinguish `AlreadyConsumed` from
    /// `NoSuchCode` rather than treating a spent code as never issued.
    ///
    /// Returns `None` if no such code was ever issued; callers distinguish
    /// expiry/consumption from absence via the returned row's fields.
    ///
    /// # Errors
    ///
    /// Returns error on database failure
    pub fn find_latest_by_code(&self, code: &str) -> Result<Option<PairingCode>> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                "SELECT id, account_id, host_device_id, code, expires_at, consumed, created_at
                 FROM pairing_codes WHERE code = ?1 ORDER BY created_at DESC LIMIT 1",
                [code],
                row_to_code,
            )
            .ok();
        Ok(row)
    }

    /// Mark a pairing code consumed
    ///
    /// # Errors
    ///
    /// Returns error on database failure
    pub fn consume(&self, id: i64) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute("UPDATE pairing_codes SET consumed = 1 WHERE id = ?1", [id])?;
        Ok(())
    }
}

fn row_to_code(row: &rusqlite::Row) -> rusqlite::Result<PairingCode> {
    Ok(PairingCode {
        id: row.get(0)?,
        account_id: row.get(1)?,
        host_device_id: row.get(2)?,
        code: row.get(3)?,
        expires_at: parse_datetime(&row.get::<_, String>(4)?),
        consumed: row.get::<_, i64>(5)? != 0,
        created_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

/// Repository for established pairings
#[derive(Clone)]
pub struct PairingRepo {
    pool: DbPool,
}

impl PairingRepo {
    /// Create a new pairing repository
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Find an existing pairing for (host, client)
    ///
    /// # Errors
    ///
    /// Returns error on database failure
    pub fn find(&self, host_device_id: i64, client_device_id: i64) -> Result<Option<Pairing>> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                "SELECT id, host_device_id, client_device_id, created_at FROM pairings
                 WHERE host_device_id = ?1 AND client_device_id = ?2",
                [host_device_id, client_device_id],
                row_to_pairing,
            )
            .ok();
        Ok(row)
    }

    /// Insert a new pairing. Callers must first check `find` to preserve
    /// idempotent re-confirmation.
    ///
    /// # Errors
    ///
    /// Returns error on database failure
    pub fn create(&self, host_device_id: i64, client_device_id: i64) -> Result<Pairing> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO pairings (host_device_id, client_device_id) VALUES (?1, ?2)",
            rusqlite::params![host_device_id, client_device_id],
        )?;
        let id = conn.last_insert_rowid();
        self.find(host_device_id, client_device_id)?
            .ok_or_else(|| crate::Error::Database(format!("pairing {id} vanished after insert")))
    }

    /// Find the single paired peer of a device, in either role
    ///
    /// # Errors
    ///
    /// Returns error on database failure
    pub fn peer_of(&self, device_id: i64) -> Result<Option<i64>> {
        let conn = self.pool.get()?;
        let peer = conn
            .query_row(
                "SELECT client_device_id FROM pairings WHERE host_device_id = ?1
                 ORDER BY created_at ASC LIMIT 1",
                [device_id],
                |row| row.get::<_, i64>(0),
            )
            .ok();
        if peer.is_some() {
            return Ok(peer);
        }

        let peer = conn
            .query_row(
                "SELECT host_device_id FROM pairings WHERE client_device_id = ?1
                 ORDER BY created_at ASC LIMIT 1",
                [device_id],
                |row| row.get::<_, i64>(0),
            )
            .ok();
        Ok(peer)
    }

    /// True if the two devices are linked by an existing pairing (either
    /// direction)
    ///
    /// # Errors
    ///
    /// Returns error on database failure
    pub fn are_paired(&self, a: i64, b: i64) -> Result<bool> {
        Ok(self.find(a, b)?.is_some() || self.find(b, a)?.is_some())
    }
}

fn row_to_pairing(row: &rusqlite::Row) -> rusqlite::Result<Pairing> {
    Ok(Pairing {
        id: row.get(0)?,
        host_device_id: row.get(1)?,
        client_device_id: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
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
