//! Axum HTTP service exposing the vault over JSON.
//!
//! # Responsibilities
//! - Define the Axum router with all routes and shared middleware.
//! - Inject shared application state (`AppState`) into handlers.
//! - Open one audit [`crate::audit::Operation`] per request and flush it
//!   before responding.

pub mod caller;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;
