//! Order book module for resting liquidity.
//!
//! This module handles:
//! - Order book types and derived best prices
//! - VWAP fill calculations walking unordered levels

pub mod aggregator;
pub mod types;

pub use aggregator::{mid_price, walk_levels, FillSide};
pub use types::{FillInfo, OrderBook, PriceLevel};
