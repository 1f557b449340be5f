use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chain_ingestor::{ChainOrchestrator, IngestorConfig, ProcessorSet};
use lake_store::{all_migrations, open_connection, MigrationRunner, StoreConfig};
use rpc_client::RpcClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = IngestorConfig::load().context("Loading configuration")?;
    info!(
        "Starting chain-ingestor {} with {} chain(s), db '{}'",
        config.instance_id,
        config.chains.len(),
        config.db_path
    );

    let store_config = StoreConfig {
        db_path: config.db_path.clone(),
        ..StoreConfig::default()
    };
    let conn = open_connection(&store_config).context("Opening database")?;

    let result = MigrationRunner::new(conn.clone())
        .run(&all_migrations())
        .context("Running migrations")?;
    info!(
        "Schema at version {:?} ({} migration(s) applied)",
        result.current_version,
        result.migrations_applied.len()
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut tasks = Vec::new();
    for chain in &config.chains {
        let client = Arc::new(
            RpcClient::new(chain.rpc_config())
                .with_context(|| format!("Building RPC client for {}", chain.chain_id))?,
        );
        let processors =
            ProcessorSet::for_family(chain.family, client, &chain.chain_id, chain.finality_depth);
        let orchestrator = ChainOrchestrator::new(chain, processors, conn.clone());
        let shutdown = shutdown_rx.clone();

        tasks.push(tokio::spawn(async move {
            orchestrator.run(shutdown).await;
        }));
    }

    tokio::signal::ctrl_c()
        .await
        .context("Waiting for shutdown signal")?;
    info!("Shutdown signal received, stopping {} chain(s)", tasks.len());
    let _ = shutdown_tx.send(true);

    for task in tasks {
        if let Err(e) = task.await {
            error!("Orchestrator task panicked: {}", e);
        }
    }

    info!("chain-ingestor stopped");
    Ok(())
}
