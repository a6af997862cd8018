use std::sync::Arc;

use verimed::api::{ApiContext, ApiServer};
use verimed::consent::ConsentService;
use verimed::engine::{Dispatcher, Engine};
use verimed::notify::LogNotifier;
use verimed::store::{DocumentStore, SqliteStore};
use verimed::{config, init_tracing};

/// One prune per hour at the default 15s dispatch interval.
const PRUNE_EVERY_TICKS: u64 = 240;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let data_dir = config::app_data_dir();
    std::fs::create_dir_all(&data_dir)?;

    let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::open(&config::store_path())?);
    let engine = Arc::new(Engine::new(store.clone()));
    engine.ensure_bootstrap_admin(&config::bootstrap_admin_email())?;

    let consent = Arc::new(ConsentService::new(store.clone()));
    let ctx = ApiContext::new(engine, consent.clone());

    // Outbox dispatch, consent expiry and session expiry all run on
    // one background interval.
    let dispatcher = Dispatcher::new(store, Arc::new(LogNotifier));
    let background_ctx = ctx.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(config::DISPATCH_INTERVAL_SECS));
        let mut ticks: u64 = 0;
        loop {
            interval.tick().await;
            if let Err(e) = dispatcher.dispatch_pending() {
                tracing::warn!("Notification dispatch failed: {e}");
            }
            consent.cleanup();
            if let Ok(mut sessions) = background_ctx.sessions.lock() {
                sessions.cleanup();
            }
            ticks += 1;
            if ticks % PRUNE_EVERY_TICKS == 0 {
                match dispatcher.prune() {
                    Ok(n) if n > 0 => tracing::info!(pruned = n, "Old notifications removed"),
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Notification prune failed: {e}"),
                }
            }
        }
    });

    let mut server = ApiServer::start(ctx, config::bind_addr()).await?;
    tracing::info!(addr = %server.addr, "Ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    server.shutdown();

    Ok(())
}
