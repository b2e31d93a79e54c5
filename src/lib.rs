pub mod access; // Role resolution against the clinician allow-list
pub mod api; // HTTP + WebSocket surface
pub mod chat; // Patient message → assessment reply
pub mod config;
pub mod console; // Clinician console
pub mod db;
pub mod error;
pub mod escalation; // Manual tickets + emergency dispatch
pub mod messages; // Message stream
pub mod models;
pub mod report; // Health report compiler
pub mod services; // Outbound HTTP collaborators
pub mod sessions; // Session manager
pub mod store;
pub mod subscription;

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

/// Start the service and block until Ctrl-C.
pub async fn run() -> anyhow::Result<()> {
    // A missing .env is normal in production.
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = config::AppConfig::from_env().context("invalid configuration")?;
    let store = Arc::new(
        store::Store::open(&config.db_path)
            .with_context(|| format!("cannot open store at {}", config.db_path.display()))?,
    );
    let ctx = api::ApiContext::from_config(&config, store.clone())
        .context("cannot build outbound HTTP client")?;

    let mut server = api::start_server(ctx, config.bind_addr).await?;
    tracing::info!(
        addr = %server.info.server_addr,
        db = %config.db_path.display(),
        "Remedi ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("cannot listen for shutdown signal")?;
    server.shutdown();
    server.wait().await;
    store.close();
    Ok(())
}
