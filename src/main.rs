//! Webhook relay service entrypoint.
//!
//! Loads configuration, runs migrations, starts the delivery dispatcher, and
//! serves the HTTP API until SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use webhook_relay::dispatcher::{Dispatcher, DispatcherConfig};
use webhook_relay::services::delivery_service::DeliveryService;
use webhook_relay::services::event_service::EventService;
use webhook_relay::{relay_router, AppState, Config};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Fail fast on a bad deployment.
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_addr = %config.listen_addr,
        "Starting webhook relay"
    );

    let pool = match PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await
    {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("Failed to connect to database: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
        tracing::error!("Migration failed: {e}");
        std::process::exit(1);
    }

    let delivery_service = match DeliveryService::new(
        pool.clone(),
        config.encryption_key.clone(),
        config.http_timeout_secs,
    ) {
        Ok(s) => Arc::new(s.with_max_attempts(config.max_delivery_attempts)),
        Err(e) => {
            tracing::error!("Failed to build delivery service: {e}");
            std::process::exit(1);
        }
    };

    // Start the dispatcher.
    let shutdown = CancellationToken::new();
    let dispatcher = Dispatcher::new(
        pool.clone(),
        delivery_service,
        EventService::new(pool.clone()),
        DispatcherConfig {
            tick_interval_secs: config.dispatch_interval_secs,
            batch_size: config.dispatch_batch_size,
            concurrency: config.dispatch_concurrency,
            stale_claim_secs: config.stale_claim_secs,
            fanout_repair_interval_secs: config.fanout_repair_interval_secs,
        },
        shutdown.clone(),
    );
    let dispatcher_handle = tokio::spawn(async move { dispatcher.run().await });
    info!("Delivery dispatcher started");

    // Serve the HTTP API.
    let state = AppState::new(
        pool.clone(),
        config.encryption_key.clone(),
        config.allow_http_urls,
    );
    let app = relay_router(state);

    let listener = match tokio::net::TcpListener::bind(&config.listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind {}: {e}", config.listen_addr);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    }

    // Drain the dispatcher: stop claiming, let in-flight sends finish.
    info!("Shutting down dispatcher...");
    shutdown.cancel();
    let _ = dispatcher_handle.await;
    info!("Shutdown complete");
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("Shutdown signal received");
}
