use anyhow::{bail, Context};
use clap::Parser;
use playzone::adapters::{start_api_server, PostgresStore};
use playzone::cli::{self, CatalogCommands, Cli, Commands, TierCommands};
use playzone::config::AppConfig;
use playzone::domain::CycleId;
use playzone::engine::{Economy, SystemClock};
use playzone::services::{CycleScheduler, ExpirySweeper};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple, open_store, shutdown_signal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config))?;
    if let Err(errors) = config.validate() {
        bail!("invalid configuration: {}", errors.join("; "));
    }

    match cli.command {
        None => {
            init_logging(&config.logging);
            run_serve(config, None).await?;
        }
        Some(Commands::Serve { port }) => {
            init_logging(&config.logging);
            run_serve(config, port).await?;
        }
        Some(Commands::Migrate) => {
            init_logging_simple();
            let Some(url) = config.database.url.as_deref() else {
                bail!("database.url is not configured");
            };
            let store = PostgresStore::new(url, config.database.max_connections).await?;
            store.migrate().await?;
            println!("migrations applied");
        }
        Some(Commands::Catalog(CatalogCommands::Validate { file })) => {
            init_logging_simple();
            let segments = cli::validate_catalog(&file)?;
            println!("{}: ok ({} segments)", file, segments);
        }
        Some(Commands::Catalog(CatalogCommands::Show { file, json })) => {
            init_logging_simple();
            cli::show_catalog(&file, json)?;
        }
        Some(Commands::Tiers(TierCommands::Recompute { cycle })) => {
            init_logging_simple();
            let cycle_id = CycleId::parse(&cycle)?;
            let store = open_store(&config.database).await?;
            let economy = Economy::new(store, &config, Arc::new(SystemClock));
            let assignments = economy.tiers.recompute_cycle(&cycle_id).await?;
            cli::print_assignments(&assignments);
        }
    }

    Ok(())
}

async fn run_serve(mut config: AppConfig, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }

    let store = open_store(&config.database).await?;
    let economy = Arc::new(Economy::bootstrap(store, &config, Arc::new(SystemClock)).await?);

    let sweeper = ExpirySweeper::new(economy.claims.clone(), economy.clock.clone(), &config.sweeper);
    let scheduler = CycleScheduler::new(
        economy.tiers.clone(),
        economy.leaderboard.clone(),
        Duration::from_secs(config.sweeper.leaderboard_refresh_secs),
    );
    sweeper.start();
    scheduler.start();

    info!(
        port = config.server.port,
        challenges = config.challenges.len(),
        "playzone starting"
    );
    start_api_server(economy, &config.server, shutdown_signal()).await?;

    sweeper.stop();
    scheduler.stop();
    let stats = sweeper.stats().await;
    info!(
        sweeps = stats.runs,
        expired = stats.outcomes_expired,
        "playzone stopped"
    );
    Ok(())
}
