//! Flashgate flash-sale HTTP server.
//!
//! Wires Redis (counters, tokens, locks, markers), `PostgreSQL` (items,
//! orders, dead letters) and Redpanda (purchase queue) into the purchase
//! pipeline, serves the HTTP API and the Prometheus endpoint, and in queued
//! mode runs the dispatch worker pool.

use anyhow::Context as _;
use axum::{Router, routing::get};
use flashgate_core::{SystemClock, UserId};
use flashgate_core::providers::{DeadLetterArchive, DeadLetterSink};
use flashgate_postgres::{DeadLetterQueue, PostgresInventory};
use flashgate_redis::RedisStores;
use flashgate_redpanda::RedpandaDispatchQueue;
use flashgate_runtime::metrics::MetricsServer;
use flashgate_runtime::retry::{RetryPolicy, retry_with_backoff};
use flashgate_runtime::{FlashSale, Providers};
use flashgate_server::{Config, MirroredDeadLetters};
use flashgate_web::{AppState, DispatchMode};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flashgate=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        redis_url = %config.redis.url,
        redpanda_brokers = %config.redpanda.brokers,
        dispatch_mode = ?config.dispatch.mode,
        "Starting flashgate"
    );

    // Metrics
    let mut metrics = MetricsServer::new(config.server.metrics_addr()?);
    metrics.start()?;
    let metrics = Arc::new(metrics);

    // Backing stores may still be starting alongside us
    let startup = RetryPolicy::builder()
        .max_retries(5)
        .initial_delay(Duration::from_millis(500))
        .max_delay(Duration::from_secs(8))
        .build();

    // Key/expiry stores
    let redis = retry_with_backoff(startup.clone(), || RedisStores::connect(&config.redis.url))
        .await
        .context("connecting to Redis")?;

    // Authoritative store
    let pool = retry_with_backoff(startup, || {
        flashgate_postgres::connect(&config.postgres.url, config.postgres.max_connections)
    })
    .await
    .context("connecting to PostgreSQL")?;
    flashgate_postgres::migrate(&pool)
        .await
        .context("running migrations")?;
    info!("Database ready");
    let inventory = Arc::new(PostgresInventory::new(pool.clone()));
    if let Some(path) = &config.server.catalog_file {
        let items = flashgate_server::load_catalog(path)
            .await
            .with_context(|| format!("loading catalog from {path}"))?;
        for item in &items {
            inventory.stage_item(item).await?;
        }
        info!(items = items.len(), path = %path, "Catalog seeded");
    }
    let archive = Arc::new(DeadLetterQueue::new(pool));

    // Purchase queue
    let queue = RedpandaDispatchQueue::builder()
        .brokers(&config.redpanda.brokers)
        .topic(&config.redpanda.topic)
        .consumer_group(&config.redpanda.consumer_group)
        .buffer_size(config.dispatch.queue_buffer)
        .build()
        .context("creating Redpanda dispatch queue")?;

    let mut dead_letters = MirroredDeadLetters::new(Arc::clone(&archive) as Arc<dyn DeadLetterSink>);
    if let Some(topic) = &config.redpanda.dead_letter_topic {
        info!(topic = %topic, "Mirroring dead letters to topic");
        dead_letters = dead_letters.with_mirror(Arc::new(queue.dead_letter_topic(topic.clone())));
    }

    let settings = config.settings();
    let providers = Providers {
        rate_counter: Arc::new(redis.rate_counter),
        challenges: Arc::new(redis.challenges),
        stock: Arc::new(redis.stock),
        locks: Arc::new(redis.locks),
        markers: Arc::new(redis.markers),
        inventory,
        queue: Arc::new(queue),
        dead_letters: Arc::new(dead_letters),
        clock: Arc::new(SystemClock),
    };
    let sale = Arc::new(FlashSale::new(providers, &settings));

    let seeded = sale.warm_up().await.context("warming up stock counters")?;
    info!(seeded, "Stock counters warmed up");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Dispatch workers
    let dispatch = if config.dispatch.mode == DispatchMode::Queued {
        let dispatcher = sale.dispatcher();
        let stop = stopped(shutdown_rx.clone());
        Some(tokio::spawn(async move { dispatcher.run(stop).await }))
    } else {
        None
    };

    // Metrics endpoint
    let metrics_listener = TcpListener::bind(metrics.addr()).await?;
    let metrics_app = Router::new().route(
        "/metrics",
        get({
            let metrics = Arc::clone(&metrics);
            move || async move { metrics.render().unwrap_or_default() }
        }),
    );
    let metrics_stop = stopped(shutdown_rx.clone());
    let metrics_task = tokio::spawn(async move {
        axum::serve(metrics_listener, metrics_app)
            .with_graceful_shutdown(metrics_stop)
            .await
    });
    info!(address = %metrics.addr(), "Metrics endpoint listening");

    // HTTP API
    let state = AppState::new(
        Arc::clone(&sale),
        Arc::clone(&archive) as Arc<dyn DeadLetterArchive>,
    )
    .with_mode(config.dispatch.mode)
    .with_operators(config.server.operator_ids.iter().copied().map(UserId));
    if config.server.operator_ids.is_empty() {
        warn!("OPERATOR_IDS is empty; dead-letter routes are closed");
    }
    let addr = config.server.addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!(address = %addr, "HTTP server listening");

    axum::serve(listener, flashgate_web::router(state))
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    // Drain
    let timeout = Duration::from_secs(config.server.shutdown_timeout);
    if let Some(handle) = dispatch {
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(Ok(()))) => info!("Dispatch workers drained"),
            Ok(Ok(Err(err))) => error!(error = %err, "Dispatch stopped with error"),
            Ok(Err(err)) => error!(error = %err, "Dispatch task panicked"),
            Err(_) => warn!(timeout_secs = timeout.as_secs(), "Dispatch did not drain in time"),
        }
    }
    match metrics_task.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %err, "Metrics endpoint stopped with error"),
        Err(err) => warn!(error = %err, "Metrics endpoint task failed"),
    }

    info!("Shutdown complete");
    Ok(())
}

/// Resolves once shutdown has been signalled.
async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Wait for Ctrl+C or SIGTERM, then tell every background task to stop.
async fn shutdown_signal(tx: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }

    let _ = tx.send(true);
}
