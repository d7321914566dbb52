use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use queueline_core::{
    config_path, create_publish_system, load_config, validate_config, Broadcaster,
    DispatcherSupervisor, EventLog, QueueService, SqliteEventLog, SqliteTicketStore, TicketStore,
    TopicBroadcaster,
};
use queueline_server::api::create_router;
use queueline_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long shutdown waits for queued durable appends to land
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = config_path();

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        "Queueline {} starting (config {})",
        VERSION,
        &config_hash[..16]
    );
    info!("Database path: {:?}", config.database.path);

    // Create SQLite ticket store
    let ticket_store: Arc<dyn TicketStore> = Arc::new(
        SqliteTicketStore::with_busy_timeout(&config.database.path, config.database.busy_timeout())
            .context("Failed to create ticket store")?
            .with_reserve_wait(config.database.reserve_wait()),
    );
    info!("Ticket store initialized");

    // Create SQLite event log (same file, separate connection)
    let event_log: Arc<dyn EventLog> = Arc::new(
        SqliteEventLog::new(&config.database.path, config.database.busy_timeout())
            .context("Failed to create event log")?,
    );
    info!("Event log initialized");

    let broadcaster: Arc<dyn Broadcaster> =
        Arc::new(TopicBroadcaster::new(config.publisher.broadcast_capacity));

    // Create publish system and spawn the ordered log writer
    let (publisher, log_writer) = create_publish_system(event_log, broadcaster, &config.publisher);
    let writer_handle = tokio::spawn(log_writer.run());

    // Create dispatcher supervisor
    let supervisor = Arc::new(DispatcherSupervisor::new(
        Arc::clone(&ticket_store),
        publisher.clone(),
        config.dispatcher.clone(),
    ));

    if config.dispatcher.enabled {
        for &queue_id in &config.dispatcher.queues {
            if let Err(e) = supervisor.start(queue_id).await {
                error!("Failed to start dispatcher for queue {}: {}", queue_id, e);
            }
        }
        info!(
            "Dispatching queues {:?} every {}ms",
            config.dispatcher.queues, config.dispatcher.tick_interval_ms
        );
    } else {
        info!("Dispatcher disabled in config");
    }

    // Create app state
    let service = QueueService::new(ticket_store, publisher);
    let state = Arc::new(AppState::new(
        config.clone(),
        service,
        Arc::clone(&supervisor),
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    for (queue_id, stats) in supervisor.stop_all().await {
        info!(
            "Dispatcher for queue {} finished: {} passes, {} reserved, {} delivery gaps",
            queue_id, stats.passes, stats.reserved, stats.delivery_gaps
        );
    }

    // The writer exits once every publisher clone is gone. The supervisor
    // holds one; the router (and its AppState) was dropped by serve.
    drop(supervisor);

    match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer_handle).await {
        Ok(_) => info!("Log writer stopped"),
        Err(_) => warn!("Log writer still busy after {:?}, exiting", WRITER_DRAIN_TIMEOUT),
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
