use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use academia_pool::config::Settings;
use academia_pool::mysql::MySqlBackend;
use academia_pool::pool::Pool;
use academia_pool::resilience::CircuitBreaker;
use academia_pool::server::{create_app, AppState};
use academia_pool::shutdown::{wait_for_signal, GracefulShutdown, ShutdownConfig};
use academia_pool::startup::check_connectivity;
use academia_pool::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing
    init_telemetry(&settings.logging)?;
    tracing::info!(
        database = %settings.db.masked_url(),
        max_connections = settings.db.max_connections,
        max_waiters = settings.db.max_waiters,
        "Configuration loaded"
    );

    // Database backend, optionally behind the connect breaker
    let circuit_breaker = settings
        .breaker
        .enabled
        .then(|| Arc::new(CircuitBreaker::with_config(settings.breaker.clone())));
    let mut backend = MySqlBackend::new(&settings.db);
    if let Some(ref cb) = circuit_breaker {
        backend = backend.with_circuit_breaker(Arc::clone(cb));
    }

    let pool = Pool::connect(settings.db.clone(), backend).await?;
    check_connectivity(&pool, &settings.startup).await?;

    let mut state = AppState::new(settings.clone(), pool.clone());
    if let Some(cb) = circuit_breaker {
        state = state.with_circuit_breaker(cb);
    }
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Admin server listening on {}", addr);

    let (reason_tx, reason_rx) = oneshot::channel();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = reason_tx.send(wait_for_signal().await);
        })
        .await?;

    let reason = reason_rx.await.unwrap_or("server stopped");
    let shutdown = GracefulShutdown::with_config(
        pool,
        ShutdownConfig {
            drain_timeout: settings.drain_timeout(),
            ..Default::default()
        },
    );
    let result = shutdown.execute(reason).await;
    if !result.success {
        tracing::warn!(
            remaining = result.remaining,
            "Exiting with connections still checked out"
        );
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}
