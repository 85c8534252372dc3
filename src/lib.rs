//! DrawYield Backend Library
//!
//! Reconciles per-draw NGR records into one gap-filled timeline and derives
//! the canonical yield/APY figures from it. Exposed for the server binary,
//! the `ngr_audit` CLI and integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod feeds;
pub mod metrics;
pub mod models;
pub mod reconcile;

pub use config::{AppConfig, FetchSettings, ReconcileParams};
pub use error::{ReconcileError, ReconcileResult};
