use playzone::adapters::{EconomyStore, MemoryStore, PostgresStore};
use playzone::config::{DatabaseConfig, LoggingConfig};
use playzone::error::Result;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

pub fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},playzone=debug,sqlx=warn", config.level))
    });

    // `tracing_appender::rolling::daily` panics if it cannot create the first
    // file, so check the directory is writable first.
    let log_dir = config.dir.clone();
    let file_layer = log_dir.as_deref().and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Warning: Could not create log directory {} ({}), file logging disabled", dir, e);
            return None;
        }
        let test_path = std::path::Path::new(dir).join(".playzone_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);

                let file_appender = tracing_appender::rolling::daily(dir, "playzone.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                // Keep the guard alive for the life of the process
                Box::leak(Box::new(guard));

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    dir, e
                );
                None
            }
        }
    });

    let (plain_layer, json_layer) = if config.json {
        (None, Some(tracing_subscriber::fmt::layer().json().with_target(true)))
    } else {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
            None,
        )
    };

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(plain_layer)
        .with(json_layer)
        .with(file_layer)
        .init();

    if let (true, Some(dir)) = (file_logging_enabled, log_dir) {
        eprintln!("Logging to: {}/playzone.log", dir);
    }
}

pub fn init_logging_simple() {
    // Minimal logging for CLI commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

/// Postgres when a URL is configured, otherwise the in-memory store
pub async fn open_store(config: &DatabaseConfig) -> Result<Arc<dyn EconomyStore>> {
    match config.url.as_deref() {
        Some(url) => {
            let store = PostgresStore::new(url, config.max_connections).await?;
            store.migrate().await?;
            info!("using postgres store");
            Ok(Arc::new(store))
        }
        None => {
            warn!("no database url configured; using the in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
