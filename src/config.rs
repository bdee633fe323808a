//! Process configuration: CLI flags, environment fallbacks, and the one
//! fatal startup check the relay enforces (§6 "Required configuration")

use std::path::PathBuf;

use clap::Parser;

use crate::{Error, Result};

/// Relay core - bidirectional message relay bridging host and client
/// mobile endpoints
#[derive(Parser, Debug)]
#[command(name = "relaybridge", version, about)]
pub struct Cli {
    /// Port the HTTP/WS front door listens on
    #[arg(long, env = "RELAY_PORT", default_value = "8080")]
    pub port: u16,

    /// Path to the SQLite database file
    #[arg(long, env = "RELAY_DB_PATH", default_value = "relay.db")]
    pub db_path: PathBuf,

    /// Audit-log retention horizon, in days
    #[arg(long, env = "RELAY_RETENTION_DAYS", default_value = "90")]
    pub retention_days: i64,

    /// Base URL of the external identity issuer, if third-party assertion
    /// exchange is enabled
    #[arg(long, env = "RELAY_EXTERNAL_ISSUER")]
    pub external_issuer: Option<String>,

    /// Required audience claim for external assertions
    #[arg(long, env = "RELAY_EXTERNAL_AUDIENCE")]
    pub external_audience: Option<String>,

    /// Heartbeat ping interval, in seconds
    #[arg(long, env = "RELAY_HEARTBEAT_INTERVAL_SECS", default_value = "30")]
    pub heartbeat_interval_secs: u64,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Fully-resolved runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub db_path: PathBuf,
    pub retention_days: i64,
    pub external_issuer: Option<String>,
    pub external_audience: Option<String>,
    pub heartbeat_interval_secs: u64,
    pub jwt_secret: Vec<u8>,
}

impl Config {
    /// Resolve configuration from parsed CLI flags plus the environment.
    ///
    /// `JWT_SECRET` is read directly from the environment rather than as a
    /// CLI flag so it never lands in a process listing or shell history.
    /// Its absence or emptiness is the one fatal startup error the relay
    /// allows itself (§6, §7): every other failure surfaces as a request-
    /// scoped error, never a crash.
    ///
    /// # Errors
    ///
    /// Returns `Error::BadRequest` if `JWT_SECRET` is unset or empty
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() {
            return Err(Error::BadRequest(
                "JWT_SECRET is required and must not be empty".into(),
            ));
        }

        Ok(Self {
            port: cli.port,
            db_path: cli.db_path,
            retention_days: cli.retention_days,
            external_issuer: cli.external_issuer,
            external_audience: cli.external_audience,
            heartbeat_interval_secs: cli.heartbeat_interval_secs,
            jwt_secret: jwt_secret.into_bytes(),
        })
    }

    /// Translate `-v` counts into a `tracing-subscriber` filter directive,
    /// mirroring the teacher's verbosity ladder
    #[must_use]
    pub const fn log_filter(verbose: u8) -> &'static str {
        match verbose {
            0 => "info,relaybridge=info",
            1 => "info,relaybridge=debug",
            2 => "debug",
            _ => "trace",
        }
    }
}
