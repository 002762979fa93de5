use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::api::{create_router, AppState};
use crate::config::ServerConfig;
use crate::engine::Economy;
use crate::error::{EconomyError, Result};

fn bind_addr(config: &ServerConfig) -> Result<SocketAddr> {
    format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| EconomyError::Validation(format!("invalid bind address: {}", e)))
}

/// Start the API server and run until `shutdown` resolves
pub async fn start_api_server<F>(
    economy: Arc<Economy>,
    config: &ServerConfig,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app_state = AppState::new(economy).with_admin_token(config.admin_token.clone());
    let app = create_router(app_state);

    let addr = bind_addr(config)?;
    info!("API server listening on http://{}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("API server stopped");
    Ok(())
}

/// Start the API server in the background
pub async fn start_api_server_background(
    economy: Arc<Economy>,
    config: ServerConfig,
) -> Result<tokio::task::JoinHandle<Result<()>>> {
    let handle = tokio::spawn(async move {
        start_api_server(economy, &config, std::future::pending()).await
    });

    Ok(handle)
}
