use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use relaybridge::api::ApiServerBuilder;
use relaybridge::config::Cli;
use relaybridge::identity::ExternalIdentityVerifier;
use relaybridge::{db, Config, Identity};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let filter = Config::log_filter(cli.verbose);

    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(filter)).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_cli(cli)?;

    tracing::info!(
        port = config.port,
        db_path = %config.db_path.display(),
        retention_days = config.retention_days,
        "starting relaybridge"
    );

    let pool = db::init(&config.db_path)?;

    let external = config
        .external_issuer
        .clone()
        .map(|issuer| ExternalIdentityVerifier::new(issuer, config.external_audience.clone()));

    let identity = Identity::new(config.jwt_secret.clone(), external);

    let ping_interval = Duration::from_secs(config.heartbeat_interval_secs);
    let server = ApiServerBuilder::new(pool, identity, config.port, ping_interval).build();
    let message_log = server.message_log();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    relaybridge::audit::spawn_scheduler(message_log, config.retention_days, shutdown_rx);

    let result = server.run().await;
    let _ = shutdown_tx.send(true);

    result.map_err(Into::into)
}
