//! Device repository (§3 Device)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DbPool;
use crate::{Error, Result};

/// A device's kind. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Owns SIM cards and executes telephony commands
    Host,
    /// Drives a host remotely
    Client,
}

impl DeviceKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Client => "client",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "host" => Ok(Self::Host),
            "client" => Ok(Self::Client),
            other => Err(Error::BadRequest(format!("unknown device kind: {other}"))),
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered device. Presence is derived at read time from the
/// Connection Registry, never persisted here.
#[derive(Debug, Clone)]
pub struct Device {
    pub id: i64,
    pub account_id: i64,
    pub name: String,
    pub kind: DeviceKind,
    pub created_at: DateTime<Utc>,
}

/// Device repository
#[derive(Clone)]
pub struct DeviceRepo {
    pool: DbPool,
}

impl DeviceRepo {
    /// Create a new device repository
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Register a device under an account
    ///
    /// # Errors
    ///
    /// Returns error on database failure
    pub fn create(&self, account_id: i64, name: &str, kind: DeviceKind) -> Result<Device> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO devices (account_id, name, kind) VALUES (?1, ?2, ?3)",
            rusqlite::params![account_id, name, kind.as_str()],
        )?;
        let id = conn.last_insert_rowid();
        self.find(id)?
            .ok_or_else(|| Error::Database("device vanished after insert".into()))
    }

    /// Find a device by id
    ///
    /// # Errors
    ///
    /// Returns error on database failure
    pub fn find(&self, id: i64) -> Result<Option<Device>> {
        let conn = self.pool.get()?;
        let device = conn
            .query_row(
                "SELECT id, account_id, name, kind, created_at FROM devices WHERE id = ?1",
                [id],
                row_to_device,
            )
            .ok();
        device.transpose()
    }

    /// List all devices belonging to an account
    ///
    /// # Errors
    ///
    /// Returns error on database failure
    pub fn list_by_account(&self, account_id: i64) -> Result<Vec<Device>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, account_id, name, kind, created_at FROM devices
             WHERE account_id = ?1 ORDER BY created_at ASC",
        )?;
        let devices = stmt
            .query_map([account_id], row_to_device)?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .collect::<Result<Vec<_>>>()?;
        Ok(devices)
    }

    /// Verify a device exists, belongs to `account_id`, and has the given kind
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if absent, `Error::Forbidden` if owned by a
    /// different account, `Error::BadRequest` if the kind does not match
    pub fn require_owned(&self, device_id: i64, account_id: i64, kind: DeviceKind) -> Result<Device> {
        let device = self
            .find(device_id)?
            .ok_or_else(|| Error::NotFound(format!("device {device_id}")))?;
        if device.account_id != account_id {
            return Err(Error::Forbidden("device belongs to another account".into()));
        }
        if device.kind != kind {
            return Err(Error::BadRequest(format!(
                "expected device kind {kind}, found {}",
                device.kind
            )));
        }
        Ok(device)
    }
}

fn row_to_device(row: &rusqlite::Row) -> rusqlite::Result<Result<Device>> {
    let kind_str: String = row.get(3)?;
    let created_at: String = row.get(4)?;
    Ok((|| {
        Ok(Device {
            id: row.get(0)?,
            account_id: row.get(1)?,
            name: row.get(2)?,
            kind: DeviceKind::parse(&kind_str)?,
            created_at: parse_datetime(&created_at),
        })
    })())
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
    use crate::db::{init_memory, AccountRepo};

    fn setup() -> (AccountRepo, DeviceRepo) {
        let pool = init_memory().unwrap();
        (AccountRepo::new(pool.clone()), DeviceRepo::new(pool))
    }

    #[test]
    fn test_create_and_find() {
        let (accounts, devices) = setup();
        let account = accounts.create_with_password("alice", "hash").unwrap();
        let device = devices
            .create(account.id, "phoneA", DeviceKind::Host)
            .unwrap();
        assert_eq!(device.kind, DeviceKind::Host);

        let listed = devices.list_by_account(account.id).unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn test_require_owned_rejects_wrong_account() {
        let (accounts, devices) = setup();
        let alice = accounts.create_with_password("alice", "hash").unwrap();
        let mallory = accounts.create_with_password("mallory", "hash").unwrap();
        let device = devices.create(alice.id, "phoneA", DeviceKind::Host).unwrap();

        let err = devices
            .require_owned(device.id, mallory.id, DeviceKind::Host)
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[test]
    fn test_require_owned_rejects_wrong_kind() {
        let (accounts, devices) = setup();
        let alice = accounts.create_with_password("alice", "hash").unwrap();
        let device = devices.create(alice.id, "phoneA", DeviceKind::Host).unwrap();

        let err = devices
            .require_owned(device.id, alice.id, DeviceKind::Client)
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }
}
