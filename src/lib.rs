//! Relaybridge - bidirectional message relay bridging host and client mobile
//! endpoints over WebSocket sessions backed by a REST control plane
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │            Host app          Client app              │
//! └────────────────────┬──────────────┬─────────────────┘
//!                      │              │
//! ┌────────────────────▼──────────────▼─────────────────┐
//! │                   HTTP/WS front door                  │
//! │   Identity  │  Pairing  │  Registry  │  Router  │ ... │
//! └────────────────────┬─────────────────────────────────┘
//!                      │
//! ┌────────────────────▼─────────────────────────────────┐
//! │                        Store                          │
//! └────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod liveness;
pub mod pairing_service;
pub mod rate_limit;
pub mod registry;
pub mod replay;
pub mod router;

pub use config::{Cli, Config};
pub use db::{DbConn, DbPool};
pub use error::{Error, Result};
pub use identity::Identity;
pub use pairing_service::PairingService;
pub use rate_limit::RateLimiter;
pub use registry::Registry;
