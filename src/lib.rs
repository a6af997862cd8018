pub mod api; // HTTP surface: sessions, middleware, endpoints
pub mod config;
pub mod consent; // Patient consent codes and grants
pub mod engine; // Record lifecycle, corrections, accounts
pub mod models;
pub mod notify; // Outbox delivery channel
pub mod store; // Document persistence (memory + SQLite)

use tracing_subscriber::EnvFilter;

/// Initialize tracing. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}
