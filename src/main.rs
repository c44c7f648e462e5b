use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use support_assist::core::config::{AppPaths, ConfigService};
use support_assist::server;
use support_assist::state::AppState;
use support_assist::transport::TelegramPoller;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        tracing::error!("Startup failed: {:#}", err);
        eprintln!("🔴 Ошибка при запуске бота: {:#}", err);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let paths = Arc::new(AppPaths::new());
    support_assist::core::logging::init(&paths);

    let config_service = ConfigService::new(paths.clone());
    let config = Arc::new(config_service.load().context("Failed to load configuration")?);
    tracing::info!(
        "Effective configuration: {}",
        config_service.redact_sensitive_values(&serde_json::to_value(config.as_ref())?)
    );

    tracing::info!("Building knowledge base...");
    let state = AppState::initialize(config.clone())
        .await
        .context("Failed to initialize assistant")?;
    tracing::info!("Assistant initialized, waiting for messages");

    if config.server.enabled {
        let bind_addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("Failed to bind to {}", bind_addr))?;
        tracing::info!("HTTP API listening on {}", listener.local_addr()?);

        let app: Router = server::router::router(state.clone());
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Server error: {}", e);
            }
        });
    }

    let poller = TelegramPoller::new(&config.telegram, state.bot.clone())
        .context("Failed to start Telegram transport")?;

    tokio::select! {
        _ = poller.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested, stopping");
        }
    }

    Ok(())
}
