use anyhow::Context;
use bangumi_server::config::{LogFormat, ServerConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("invalid configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    match config.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }

    info!(
        data_url = %config.data_url,
        cache_ttl_secs = config.cache_ttl.as_secs(),
        fetch_timeout_secs = config.fetch_timeout.as_secs(),
        require_api_key = config.require_api_key,
        api_keys = config.api_keys.len(),
        "configuration loaded"
    );
    if config.require_api_key && config.api_keys.is_empty() {
        warn!("API keys are required but none are configured; all API requests will be rejected");
    }

    let app_state =
        bangumi_server::build_state(&config).context("failed to build dataset client")?;

    // Warm the cache without delaying startup
    {
        let catalog = app_state.catalog.clone();
        tokio::spawn(async move {
            if let Err(e) = catalog.snapshot().await {
                warn!(error = %e, "initial dataset fetch failed; will retry on first request");
            }
        });
    }

    let app = bangumi_server::routes::build_router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .context("failed to bind")?;
    info!(addr = %config.bind, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
