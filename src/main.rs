use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pricetag_service::config::Settings;
use pricetag_service::rates::{CentralBankSource, RateCache};
use pricetag_service::render::{CurrencyPair, Renderer};
use pricetag_service::tasks::RefreshTask;
use pricetag_service::templates::TemplateStore;
use pricetag_service::transport::TelegramTransport;
use pricetag_service::watcher::MessageWatcher;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    init_tracing();

    // Load configuration
    let settings = Settings::new()?;
    tracing::info!("configuration loaded");

    // Open the template store, creating the document if missing
    let store = Arc::new(TemplateStore::open(&settings.templates.path).await?);
    tracing::info!(
        path = %settings.templates.path,
        tracked = store.count().await,
        "template store opened"
    );

    // Prime the rate cache; a failed initial fetch aborts startup
    let source = CentralBankSource::new(&settings.rates)?;
    let rates = Arc::new(RateCache::new(Box::new(source), &settings.rates.reference_currency).await?);
    tracing::info!(
        url = %settings.rates.url,
        currencies = rates.currency_count(),
        "rate cache primed"
    );

    let transport = Arc::new(TelegramTransport::new(&settings.telegram)?);
    let renderer = Renderer::new(
        rates.clone(),
        CurrencyPair::new(&settings.rates.source_currency, &settings.rates.target_currency),
    );
    let watcher = Arc::new(MessageWatcher::new(
        store,
        rates.clone(),
        renderer,
        transport.clone(),
    ));

    let (shutdown_tx, _) = broadcast::channel(1);
    let (events_tx, events_rx) = mpsc::channel(64);

    // Start periodic rate refresh in background
    let refresh_task = RefreshTask::new(
        Duration::from_secs(settings.rates.refresh_interval_secs),
        rates,
        shutdown_tx.subscribe(),
    );
    let refresh_handle = tokio::spawn(refresh_task.run());

    // Start update polling in background
    let poll_transport = transport.clone();
    let poll_shutdown = shutdown_tx.subscribe();
    let poll_handle = tokio::spawn(async move {
        poll_transport.run_polling(events_tx, poll_shutdown).await;
    });

    watcher.clone().start(events_rx)?;
    tracing::info!("message watcher started");

    wait_for_signal().await;

    // Signal background tasks, then stop the watcher within its grace period
    let _ = shutdown_tx.send(());
    watcher
        .stop(Duration::from_secs(settings.watcher.stop_timeout_secs))
        .await?;

    tracing::info!("waiting for background tasks to finish...");
    let _ = tokio::join!(refresh_handle, poll_handle);

    tracing::info!("shutdown complete");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn wait_for_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
