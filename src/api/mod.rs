//! HTTP surface.
//!
//! Exposes the engine as a JSON API under `/api/`. A bearer-token
//! middleware resolves the session, re-checks the account status and
//! injects the `Principal` into request extensions; handlers pass it
//! explicitly into every engine call. Errors map to structured
//! `{error: {code, message}}` bodies with stable codes.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use router::api_router;
pub use server::ApiServer;
pub use types::ApiContext;
