//! Arbitrage scanner for binary prediction-market conditions.
//!
//! A binary condition has two complementary outcomes, YES and NO, exactly one
//! of which pays $1.00 at resolution. Whenever the two prices do not sum to
//! one, a bundle trade locks in the difference:
//!
//! ```text
//! YES ask:  $0.46
//! NO ask:   $0.50
//! ─────────────────
//! Total:    $0.96 < $1.00  → buy both, margin $0.04
//! ```
//!
//! Beyond detection, the crate sizes opportunities against order-book depth
//! and projects inconsistent prices onto the nearest arbitrage-free ones under
//! the KL divergence.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`market`]: Market catalog, CLOB client, and test doubles
//! - [`orderbook`]: Order book types and depth walks
//! - [`arbitrage`]: Opportunity detection and profit estimation
//! - [`solver`]: Bregman projection and the extraction loop
//! - [`scanner`]: The scan pipeline tying the above together
//! - [`api`]: HTTP API for health, metrics, and scan results
//! - [`metrics`]: Prometheus metrics
//! - [`utils`]: Process helpers

pub mod api;
pub mod arbitrage;
pub mod config;
pub mod error;
pub mod market;
pub mod metrics;
pub mod orderbook;
pub mod scanner;
pub mod solver;
pub mod utils;

pub use config::Config;
pub use error::{AppError, Result};
