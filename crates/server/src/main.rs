//! fedigraph server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use fedigraph_common::{Config, LogFormat};
use fedigraph_core::FollowStateMachine;
use fedigraph_federation::{
    ActivityComposer, ActorDirectory, ApClient, DeliveryFanout, InboxProcessor, LocalUris,
    inbox_router,
};
use fedigraph_queue::{DeliveryTaskQueue, RetryConfig, RetryWorker};
use tokio::{signal, sync::watch};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "fedigraph=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Configuration comes first so the log format can be chosen.
    let config = Config::load()?;
    init_tracing(config.server.log_format);

    info!("Starting fedigraph server...");

    let db = Arc::new(fedigraph_db::init(&config).await?);
    info!("Connected to database");

    info!("Running database migrations...");
    fedigraph_db::migrate(&db).await?;
    info!("Migrations completed");

    let uris = LocalUris::parse(&config.server.url)?;
    let client = Arc::new(ApClient::new(&config.federation)?);
    warn!("No request signer configured; outbound requests are unsigned");

    let directory = ActorDirectory::new(db.clone(), client.clone(), uris.clone())
        .with_refresh_hours(config.federation.actor_refresh_hours);
    let follows = FollowStateMachine::new(db.clone());
    let composer = ActivityComposer::new(uris);

    let retry_queue = Arc::new(DeliveryTaskQueue::new(
        db.clone(),
        RetryConfig::from(&config.retry),
    ));
    let fanout = DeliveryFanout::new(follows.clone(), directory.clone(), client.clone())
        .with_concurrency(config.federation.delivery_concurrency)
        .with_retry_queue(retry_queue.clone());

    let mut processor = InboxProcessor::new(directory, follows, composer);
    if config.federation.enabled {
        processor = processor.with_fanout(fanout);
    } else {
        info!("Federation disabled, inbound Follows will not be answered");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = if config.federation.enabled {
        let worker =
            RetryWorker::from_settings(retry_queue.repository().clone(), client, &config.retry);
        Some(tokio::spawn(async move { worker.run(shutdown_rx).await }))
    } else {
        None
    };

    let app = inbox_router(Arc::new(processor)).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = worker_handle {
        if let Err(e) = handle.await {
            error!(error = %e, "Retry worker panicked");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
