use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Verimed";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default HTTP port when `VERIMED_PORT` is not set.
pub const DEFAULT_PORT: u16 = 8710;

/// Consent codes are valid for 10 minutes.
pub const CONSENT_CODE_TTL_SECS: u64 = 600;

/// Wrong-code attempts allowed before a consent code is invalidated.
pub const CONSENT_MAX_ATTEMPTS: u32 = 5;

/// A verified consent grant must be used within 10 minutes.
pub const CONSENT_GRANT_TTL_SECS: u64 = 600;

/// Bearer sessions expire after 12 hours.
pub const SESSION_TTL_SECS: u64 = 12 * 3600;

/// Read notifications older than this are pruned.
pub const NOTIFICATION_RETENTION_DAYS: i64 = 30;

/// Background outbox dispatcher wake interval.
pub const DISPATCH_INTERVAL_SECS: u64 = 15;

/// Default tracing filter when RUST_LOG is not set.
pub fn default_log_filter() -> String {
    "verimed=info,tower_http=info".to_string()
}

/// Get the application data directory
/// ~/Verimed/ on all platforms
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("Verimed")
}

/// Path of the SQLite document store file.
pub fn store_path() -> PathBuf {
    app_data_dir().join("verimed.db")
}

/// Socket address the API server binds to.
///
/// `VERIMED_BIND` overrides the IP, `VERIMED_PORT` the port.
pub fn bind_addr() -> SocketAddr {
    let ip: IpAddr = std::env::var("VERIMED_BIND")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
    let port: u16 = std::env::var("VERIMED_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    SocketAddr::new(ip, port)
}

/// Email of the bootstrap admin account created on first start.
pub fn bootstrap_admin_email() -> String {
    std::env::var("VERIMED_ADMIN_EMAIL").unwrap_or_else(|_| "admin@verimed.local".to_string())
}
