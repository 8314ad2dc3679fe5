use anyhow::Result;
use sensor_analytics::config::Config;
use sensor_analytics::controller::AnalyticsController;
use sensor_analytics::http;
use sensor_analytics::session::spawn_session;
use sensor_analytics::stats::StatsEngine;
use sensor_analytics::store::MemoryReadingStore;
use std::sync::Arc;

fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,sensor_analytics=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;
    let config = Config::from_env()?;
    tracing::info!(
        range = %config.default_range,
        capacity = config.buffer_capacity,
        trend_window = config.trend_window,
        settings = ?config.settings_path,
        "starting sensor analytics"
    );

    let store = Arc::new(MemoryReadingStore::new());
    let controller = AnalyticsController::new(
        StatsEngine::new(config.trend_window),
        config.thresholds,
        config.buffer_capacity,
    );
    let (session, session_task) = spawn_session(store.clone(), controller, config.command_queue)?;
    session.select_window(config.default_range).await?;

    let app = http::router(http::HttpState {
        store,
        session: session.clone(),
    });
    let listener = tokio::net::TcpListener::bind(&config.http_bind).await?;
    tracing::info!(bind=%config.http_bind, "sensor-analytics HTTP listening");
    let http_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
        _ = http_handle => {
            tracing::warn!("http server exited");
        }
    }

    if let Err(err) = session.shutdown().await {
        tracing::warn!(error=%err, "analytics session already stopped");
    }
    session_task.await.ok();
    Ok(())
}
