//! API endpoint handlers.
//!
//! Each module covers one slice of the surface. Handlers stay thin:
//! parse, call the engine with the authenticated `Principal`, map the
//! result.

pub mod accounts;
pub mod auth;
pub mod consent;
pub mod corrections;
pub mod health;
pub mod notifications;
pub mod records;
