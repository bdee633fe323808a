//! Account repository (§3 Account)

use chrono::{DateTime, Utc};

use super::DbPool;
use crate::{Error, Result};

/// A registered account
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub password_hash: Option<String>,
    pub external_subject: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Account repository
#[derive(Clone)]
pub struct AccountRepo {
    pool: DbPool,
}

impl AccountRepo {
    /// Create a new account repository
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create an account with a username and password hash
    ///
    /// # Errors
    ///
    /// Returns `Error::Conflict` if the username is already taken
    pub fn create_with_password(&self, username: &str, password_hash: &str) -> Result<Account> {
        let conn = self.pool.get()?;

        conn.execute(
            "INSERT INTO accounts (username, password_hash) VALUES (?1, ?2)",
            rusqlite::params![username, password_hash],
        )
        .map_err(|e| map_unique_violation(e, "username already registered"))?;

        let id = conn.last_insert_rowid();
        self.find(id)?.ok_or_else(|| Error::Database("account vanished after insert".into()))
    }

    /// Find or create an account for an externally-verified identity, linking
    /// by email if an account with that email already exists
    ///
    /// # Errors
    ///
    /// Returns error on database failure
    pub fn find_or_create_external(
        &self,
        subject: &str,
        email: Option<&str>,
    ) -> Result<Account> {
        if let Some(account) = self.find_by_external_subject(subject)? {
            return Ok(account);
        }

        if let Some(email) = email {
            if let Some(existing) = self.find_by_email(email)? {
                let conn = self.pool.get()?;
                conn.execute(
                    "UPDATE accounts SET external_subject = ?1 WHERE id = ?2",
                    rusqlite::params![subject, existing.id],
                )?;
                return self
                    .find(existing.id)?
                    .ok_or_else(|| Error::Database("account vanished after update".into()));
            }
        }

        let conn = self.pool.get()?;
        let username = format!("ext-{subject}");
        conn.execute(
            "INSERT INTO accounts (username, external_subject, email) VALUES (?1, ?2, ?3)",
            rusqlite::params![username, subject, email],
        )
        .map_err(|e| map_unique_violation(e, "account already linked"))?;

        let id = conn.last_insert_rowid();
        self.find(id)?.ok_or_else(|| Error::Database("account vanished after insert".into()))
    }

    /// Find an account by id
    ///
    /// # Errors
    ///
    /// Returns error on database failure
    pub fn find(&self, id: i64) -> Result<Option<Account>> {
        let conn = self.pool.get()?;
        query_one(&conn, "id = ?1", id)
    }

    /// Find an account by username
    ///
    /// # Errors
    ///
    /// Returns error on database failure
    pub fn find_by_username(&self, username: &str) -> Result<Option<Account>> {
        let conn = self.pool.get()?;
        let account = conn
            .query_row(
                "SELECT id, username, password_hash, external_subject, email, created_at
                 FROM accounts WHERE username = ?1",
                [username],
                row_to_account,
            )
            .ok();
        Ok(account)
    }

    fn find_by_external_subject(&self, subject: &str) -> Result<Option<Account>> {
        let conn = self.pool.get()?;
        let account = conn
            .query_row(
                "SELECT id, username, password_hash, external_subject, email, created_at
                 FROM accounts WHERE external_subject = ?1",
                [subject],
                row_to_account,
            )
            .ok();
        Ok(account)
    }

    fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let conn = self.pool.get()?;
        let account = conn
            .query_row(
                "SELECT id, username, password_hash, external_subject, email, created_at
                 FROM accounts WHERE email = ?1",
                [email],
                row_to_account,
            )
            .ok();
        Ok(account)
    }
}

fn query_one(conn: &rusqlite::Connection, clause: &str, id: i64) -> Result<Option<Account>> {
    let sql = format!(
        "SELECT id, username, password_hash, external_subject, email, created_at
         FROM accounts WHERE {clause}"
    );
    let account = conn.query_row(&sql, [id], row_to_account).ok();
    Ok(account)
}

fn row_to_account(row: &rusqlite::Row) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        external_subject: row.get(3)?,
        email: row.get(4)?,
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

fn map_unique_violation(e: rusqlite::Error, message: &str) -> Error {
    if let rusqlite::Error::SqliteFailure(ref sqlite_err, _) = e {
        if sqlite_err.code == rusqlite::ErrorCode::ConstraintViolation {
            return Error::Conflict(message.to_string());
        }
    }
    Error::from(e)
}
