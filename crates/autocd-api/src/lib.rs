//! HTTP server for autocd.
//!
//! Receives signed GitHub webhooks, turns push events into script runs and
//! exposes a token-protected operator API over the live runs.

pub mod error;
pub mod routes;
pub mod services;
pub mod shutdown;
pub mod state;
pub mod telemetry;

pub use state::AppState;
