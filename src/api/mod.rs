//! HTTP/WS front door: wires the core components to axum routes (§6)

pub mod auth_routes;
pub mod devices;
pub mod health;
mod middleware;
pub mod pair_routes;
pub mod relay_routes;
pub mod ws_routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::db::{
    AccountRepo, DbPool, DeviceRepo, MessageLogRepo, PairingCodeRepo, PairingRepo,
    PendingCommandRepo,
};
use crate::identity::Identity;
use crate::pairing_service::PairingService;
use crate::rate_limit::RateLimiter;
use crate::registry::Registry;
use crate::router::Router as MessageRouter;
use crate::Result;

pub use middleware::AuthenticatedAccount;

/// Shared state for every API handler
#[derive(Clone)]
pub struct ApiState {
    pub db: DbPool,
    pub accounts: AccountRepo,
    pub devices: DeviceRepo,
    pub pairings: PairingRepo,
    pub pairing_codes: PairingCodeRepo,
    pub pending: PendingCommandRepo,
    pub message_log: MessageLogRepo,
    pub identity: Identity,
    pub pairing_service: PairingService,
    pub registry: Arc<Registry>,
    pub message_router: MessageRouter,
    pub login_limiter: Arc<RateLimiter>,
    pub pair_confirm_limiter: Arc<RateLimiter>,
    pub ping_interval: Duration,
}

/// Assembles an [`ApiState`] from its dependencies and builds the router
pub struct ApiServerBuilder {
    db: DbPool,
    identity: Identity,
    port: u16,
    ping_interval: Duration,
}

impl ApiServerBuilder {
    /// Start building a server over an initialized database and identity
    /// service, pinging every `ping_interval`
    #[must_use]
    pub const fn new(db: DbPool, identity: Identity, port: u16, ping_interval: Duration) -> Self {
        Self { db, identity, port, ping_interval }
    }

    /// Build the server, wiring every repository and core component over
    /// the shared pool
    #[must_use]
    pub fn build(self) -> ApiServer {
        let accounts = AccountRepo::new(self.db.clone());
        let devices = DeviceRepo::new(self.db.clone());
        let pairings = PairingRepo::new(self.db.clone());
        let pairing_codes = PairingCodeRepo::new(self.db.clone());
        let pending = PendingCommandRepo::new(self.db.clone());
        let message_log = MessageLogRepo::new(self.db.clone());

        let pairing_service = PairingService::new(devices.clone(), pairing_codes.clone(), pairings.clone());
        let registry = Arc::new(Registry::new());
        let message_router = MessageRouter::new(registry.clone(), pairings.clone(), pending.clone(), message_log.clone());

        let state = Arc::new(ApiState {
            db: self.db,
            accounts,
            devices,
            pairings,
            pairing_codes,
            pending,
            message_log,
            identity: self.identity,
            pairing_service,
            registry,
            message_router,
            login_limiter: Arc::new(RateLimiter::default()),
            pair_confirm_limiter: Arc::new(RateLimiter::default()),
            ping_interval: self.ping_interval,
        });

        ApiServer { state, port: self.port }
    }
}

/// The assembled HTTP/WS server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    /// Expose the shared state, mainly so `main` can hand it to the
    /// retention-sweep scheduler
    #[must_use]
    pub fn message_log(&self) -> MessageLogRepo {
        self.state.message_log.clone()
    }

    fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .merge(auth_routes::router())
            .merge(devices::router())
            .merge(pair_routes::router())
            .merge(relay_routes::router())
            .merge(ws_routes::router())
            .merge(health::ready_router())
            .merge(health::router())
            .with_state(self.state.clone())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until the process is asked to shut down
    ///
    /// # Errors
    ///
    /// Returns error if the socket cannot be bound or the server fails
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = self.port;
        tracing::info!(port, "relay listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("failed to install ctrl-c handler");
        return;
    }
    tracing::info!("shutdown signal received");
}
