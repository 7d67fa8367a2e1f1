//! Market module for binary prediction markets.
//!
//! This module handles:
//! - Market types and order book enrichment
//! - Market discovery through the Gamma catalog
//! - CLOB order book and quote client
//! - Mock collaborators for testing

pub mod catalog;
pub mod client;
pub mod mock;
pub mod types;

pub use catalog::{EventQuery, GammaClient, MarketCatalog};
pub use client::{ClobClient, OrderBookSource, QuoteSide};
pub use mock::{binary_market, MockBookSource, MockCatalog, MockConfig, MockOrderBookBuilder};
pub use types::{EnrichedMarket, Market, Outcome};
