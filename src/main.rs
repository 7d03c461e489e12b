use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use subscription_relay::config::{DEFAULT_LOG_FILTER, RelayConfig};
use subscription_relay::consumer::{
    HttpSourceClient, InMemoryDataStore, JsonFileDataStore, LivenessWatchdog, NotificationReconciler,
    SubscriptionDataStore,
};
use subscription_relay::publisher::{HttpCallbackClient, InMemorySubscriptionStore, PublisherDeliveryEngine};
use subscription_relay::scheduler::PeriodicTaskScheduler;
use subscription_relay::server::{AppState, build_router};
use subscription_relay::signal::{DestinationRegistry, SignalDispatcher, destination_client};
use subscription_relay::types::TaskKey;
use subscription_relay::worker::InboundDispatcher;

/// How long queued notifications get to drain on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RelayConfig::from_env();
    config.validate()?;
    info!(?config, "starting subscription relay");

    let shutdown = CancellationToken::new();
    let scheduler = Arc::new(PeriodicTaskScheduler::<TaskKey>::with_shutdown(shutdown.child_token()));

    // Publisher side.
    let callback = HttpCallbackClient::new(config.callback_timeout).context("building callback client")?;
    let publisher = PublisherDeliveryEngine::new(
        Arc::new(InMemorySubscriptionStore::new()),
        Arc::new(callback),
        Arc::clone(&scheduler),
        config.handshake_delay,
    );

    // Consumer side.
    let store: Arc<dyn SubscriptionDataStore> = match &config.state_file {
        Some(path) => Arc::new(
            JsonFileDataStore::open(path)
                .with_context(|| format!("opening state file {}", path.display()))?,
        ),
        None => Arc::new(InMemoryDataStore::new()),
    };
    let source = HttpSourceClient::new(config.callback_timeout).context("building source client")?;
    let client = destination_client(config.callback_timeout).context("building destination client")?;
    let registry = match &config.destinations_file {
        Some(path) => DestinationRegistry::load(path, client)
            .with_context(|| format!("loading destinations from {}", path.display()))?,
        None => DestinationRegistry::new(),
    };
    let reconciler = Arc::new(NotificationReconciler::new(
        store,
        Arc::new(source),
        Arc::new(SignalDispatcher::new(registry)),
    ));

    let inbound = Arc::new(InboundDispatcher::with_shutdown(
        Arc::clone(&reconciler),
        shutdown.child_token(),
    ));

    let watchdog = Arc::new(LivenessWatchdog::new(
        Arc::clone(&reconciler),
        config.error_threshold_multiplier,
    ));
    watchdog.start(&scheduler, config.watchdog_interval);

    let app = build_router(AppState::new(publisher, Arc::clone(&inbound)));

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    info!("listening on {}", config.listen_addr);

    let signal_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                tracing::warn!("cannot listen for ctrl-c, waiting for cancellation");
                signal_token.cancelled().await;
            }
            info!("shutdown requested");
        })
        .await
        .context("server error")?;

    scheduler.shutdown();
    inbound.shutdown_all(SHUTDOWN_GRACE).await;
    shutdown.cancel();
    info!("stopped");
    Ok(())
}
