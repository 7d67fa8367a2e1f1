//! HTTP API module for health, metrics, and scan results.

pub mod handlers;
pub mod routes;

pub use handlers::{AppState, OpportunityView, ScanSummary};
pub use routes::create_router;
