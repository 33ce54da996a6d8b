use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use early_signal_backend::{Config, Supervisor};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("early-signal starting");

    let config = Arc::new(Config::from_env());
    info!(
        chain_id = config.chain_id,
        sol_enabled = config.sol_enabled,
        dry_run = config.dry_run,
        "configuration loaded"
    );

    let supervisor = Supervisor::new(config);
    supervisor.run().await
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| "early_signal_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
