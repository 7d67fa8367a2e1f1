//! Arbitrage module for single-condition opportunities.
//!
//! This module handles:
//! - Complementary price pairs and their derived metrics
//! - Price-source selection (explicit pair, order books, catalog)
//! - Opportunity detection and depth-aware profit estimation

pub mod calculator;
pub mod detector;
pub mod prices;
pub mod source;

pub use calculator::{estimate_profit, ArbitrageOpportunity, Direction, ProfitEstimate};
pub use detector::{
    detect, detect_single_condition, diagnose_price_deviation, quick_opportunity_check,
    Opportunities, PriceDeviation,
};
pub use prices::{ConditionPrices, PricePair};
pub use source::PriceSource;
