//! Shared test utilities

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use relaybridge::api::ApiState;
use relaybridge::db::{
    AccountRepo, DbPool, DeviceRepo, MessageLogRepo, PairingCodeRepo, PairingRepo,
    PendingCommandRepo,
};
use relaybridge::rate_limit::RateLimiter;
use relaybridge::registry::Registry;
use relaybridge::router::Router as MessageRouter;
use relaybridge::{db, Identity, PairingService};

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// Token secret shared between `build_test_router` and `bearer_token` so
/// tokens minted by one verify against the other
const TEST_SECRET: &[u8] = b"test-secret";

/// Build the full API router over a test database, without binding a
/// listener
#[must_use]
pub fn build_test_router(db: DbPool) -> Router {
    let accounts = AccountRepo::new(db.clone());
    let devices = DeviceRepo::new(db.clone());
    let pairings = PairingRepo::new(db.clone());
    let pairing_codes = PairingCodeRepo::new(db.clone());
    let pending = PendingCommandRepo::new(db.clone());
    let message_log = MessageLogRepo::new(db.clone());

    let pairing_service = PairingService::new(devices.clone(), pairing_codes.clone(), pairings.clone());
    let registry = Arc::new(Registry::new());
    let message_router = MessageRouter::new(registry.clone(), pairings.clone(), pending.clone(), message_log.clone());

    let state = Arc::new(ApiState {
        db,
        accounts,
        devices,
        pairings,
        pairing_codes,
        pending,
        message_log,
        identity: Identity::new(TEST_SECRET.to_vec(), None),
        pairing_service,
        registry,
        message_router,
        login_limiter: Arc::new(RateLimiter::default()),
        pair_confirm_limiter: Arc::new(RateLimiter::default()),
        ping_interval: Duration::from_secs(30),
    });

    Router::new()
        .merge(relaybridge::api::auth_routes::router())
        .merge(relaybridge::api::devices::router())
        .merge(relaybridge::api::pair_routes::router())
        .merge(relaybridge::api::relay_routes::router())
        .merge(relaybridge::api::ws_routes::router())
        .merge(relaybridge::api::health::ready_router())
        .merge(relaybridge::api::health::router())
        .with_state(state)
}

/// Mint a bearer header value for the given account id, using the same
/// secret `build_test_router` configures
#[must_use]
pub fn bearer_header(account_id: i64) -> String {
    let identity = Identity::new(TEST_SECRET.to_vec(), None);
    format!("Bearer {}", identity.mint_token(account_id))
}
