use anyhow::{Context, Result};
use botfleet::api::{create_engine_router, create_ws_router, EngineAppState, WsAppState};
use botfleet::config::{load_config, BotFleetConfig};
use botfleet::control::{ControlChannel, EngineLoop};
use botfleet::registry::SqliteRegistry;
use botfleet::sweeper::{HttpProber, Sweeper};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "botfleet=info".into()),
        )
        .init();

    info!("botfleet starting...");

    let config = match std::env::var("BOTFLEET_CONFIG") {
        Ok(path) => load_config(&path)?,
        Err(_) => BotFleetConfig::default(),
    }
    .with_env_overrides();

    info!(
        bind_addr = %config.server.bind_addr,
        database = %config.registry.database_path.display(),
        sweep_interval_seconds = config.sweeper.interval_seconds,
        "Configuration loaded"
    );

    // Control channel, shared by the transport, dispatcher and sweeper
    let control = Arc::new(ControlChannel::new(&config.control));

    {
        let control = Arc::clone(&control);
        tokio::spawn(async move { control.run_dispatcher().await });
    }

    tokio::spawn(EngineLoop::new(control.engine(), &config.control).run());

    // Liveness sweeper
    let registry = SqliteRegistry::new(&config.registry.database_path);
    let prober = HttpProber::new(config.sweeper.probe_timeout())?;
    let sweeper = Sweeper::new(registry.clone(), prober, config.sweeper.clone())
        .with_status_channel(Arc::clone(&control));
    tokio::spawn(async move { sweeper.run_sweep_loop().await });

    // HTTP/WebSocket server
    let ws_state = Arc::new(WsAppState {
        control: Arc::clone(&control),
    });
    let engine_state = Arc::new(EngineAppState {
        control: Arc::clone(&control),
        registry,
    });

    let app = create_ws_router(ws_state)
        .merge(create_engine_router(engine_state))
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "Listening");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
