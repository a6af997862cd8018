//! API middleware.
//!
//! One layer: bearer-token authentication. It resolves the session,
//! re-checks the account status and injects the `Principal` into
//! request extensions.

pub mod auth;
