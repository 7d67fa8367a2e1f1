//! In-memory catalog and order book source for tests.
//!
//! This module provides mock collaborators that can be used in tests
//! without making real network requests.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::catalog::MarketCatalog;
use super::client::OrderBookSource;
use super::types::Market;
use crate::arbitrage::PricePair;
use crate::error::MarketError;
use crate::orderbook::{OrderBook, PriceLevel};

/// Configuration for mock behavior.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Whether to fail catalog requests.
    pub fail_catalog: bool,
    /// Whether to fail every order book request.
    pub fail_order_book: bool,
    /// Simulated latency in milliseconds.
    pub latency_ms: u64,
}

/// Mock market catalog.
#[derive(Debug, Clone, Default)]
pub struct MockCatalog {
    config: MockConfig,
    markets: Arc<Mutex<Vec<Market>>>,
}

impl MockCatalog {
    /// Catalog serving `markets`.
    pub fn new(markets: Vec<Market>) -> Self {
        Self {
            config: MockConfig::default(),
            markets: Arc::new(Mutex::new(markets)),
        }
    }

    /// Catalog with custom behavior.
    pub fn with_config(markets: Vec<Market>, config: MockConfig) -> Self {
        Self {
            config,
            markets: Arc::new(Mutex::new(markets)),
        }
    }

    /// Add a market.
    pub fn add_market(&self, market: Market) {
        self.markets.lock().unwrap().push(market);
    }
}

#[async_trait]
impl MarketCatalog for MockCatalog {
    async fn fetch_active_markets(&self, limit: usize) -> Result<Vec<Market>, MarketError> {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }

        if self.config.fail_catalog {
            return Err(MarketError::FetchFailed {
                resource: "events".to_string(),
                reason: "Mock catalog failure".to_string(),
            });
        }

        let markets = self.markets.lock().unwrap();
        Ok(markets.iter().take(limit).cloned().collect())
    }
}

/// Mock order book and quote source.
///
/// Unknown tokens get an empty book. Tracks how many fetches are in flight so
/// tests can check concurrency bounds.
#[derive(Debug, Clone, Default)]
pub struct MockBookSource {
    config: MockConfig,
    books: Arc<Mutex<HashMap<String, OrderBook>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    price_pairs: Arc<Mutex<HashMap<String, PricePair>>>,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl MockBookSource {
    /// Create a new mock source with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock source with custom configuration.
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Serve `book` for its asset id.
    pub fn set_order_book(&self, book: OrderBook) {
        self.books
            .lock()
            .unwrap()
            .insert(book.asset_id.clone(), book);
    }

    /// Make fetches for `token_id` fail.
    pub fn fail_token(&self, token_id: impl Into<String>) {
        self.failing.lock().unwrap().insert(token_id.into());
    }

    /// Serve explicit quotes for a market id.
    pub fn set_price_pair(&self, market_id: impl Into<String>, pair: PricePair) {
        self.price_pairs
            .lock()
            .unwrap()
            .insert(market_id.into(), pair);
    }

    /// Order book fetches made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most fetches observed in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Clear all mock data.
    pub fn clear(&self) {
        self.books.lock().unwrap().clear();
        self.failing.lock().unwrap().clear();
        self.price_pairs.lock().unwrap().clear();
    }
}

#[async_trait]
impl OrderBookSource for MockBookSource {
    async fn get_order_book(&self, token_id: &str) -> Result<OrderBook, MarketError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.config.fail_order_book || self.failing.lock().unwrap().contains(token_id) {
            return Err(MarketError::FetchFailed {
                resource: format!("book {}", token_id),
                reason: "Mock order book failure".to_string(),
            });
        }

        let books = self.books.lock().unwrap();
        Ok(books.get(token_id).cloned().unwrap_or_else(|| OrderBook {
            asset_id: token_id.to_string(),
            ..OrderBook::default()
        }))
    }

    async fn get_price_pair(&self, market: &Market) -> Result<Option<PricePair>, MarketError> {
        Ok(self.price_pairs.lock().unwrap().get(&market.id).cloned())
    }
}

/// Builder for creating mock order books with common patterns.
pub struct MockOrderBookBuilder {
    asset_id: String,
    bids: Vec<PriceLevel>,
    asks: Vec<PriceLevel>,
}

impl MockOrderBookBuilder {
    /// Create a new builder for the given token.
    pub fn new(asset_id: impl Into<String>) -> Self {
        Self {
            asset_id: asset_id.into(),
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }

    /// Add a bid level.
    pub fn bid(mut self, price: Decimal, size: Decimal) -> Self {
        self.bids.push(PriceLevel::new(price, size));
        self
    }

    /// Add an ask level.
    pub fn ask(mut self, price: Decimal, size: Decimal) -> Self {
        self.asks.push(PriceLevel::new(price, size));
        self
    }

    /// Two levels per side around a spread, the second one cent away and twice as deep.
    pub fn with_spread(mut self, best_bid: Decimal, best_ask: Decimal, depth: Decimal) -> Self {
        let tick = Decimal::new(1, 2);
        self.bids = vec![
            PriceLevel::new(best_bid, depth),
            PriceLevel::new(best_bid - tick, depth * Decimal::TWO),
        ];
        self.asks = vec![
            PriceLevel::new(best_ask, depth),
            PriceLevel::new(best_ask + tick, depth * Decimal::TWO),
        ];
        self
    }

    /// Build the order book.
    pub fn build(mut self) -> OrderBook {
        // Sort bids descending
        self.bids.sort_by(|a, b| b.price.cmp(&a.price));
        // Sort asks ascending
        self.asks.sort_by(|a, b| a.price.cmp(&b.price));

        OrderBook {
            asset_id: self.asset_id,
            bids: self.bids,
            asks: self.asks,
        }
    }
}

/// Binary market with token ids `{id}-yes` / `{id}-no` and catalog prices.
pub fn binary_market(id: &str, price_yes: Decimal, price_no: Decimal) -> Market {
    Market {
        id: id.to_string(),
        question: format!("Question {}?", id),
        slug: format!("market-{}", id),
        event_slug: format!("event-{}", id),
        condition_id: format!("0x{}", id),
        end_date: "2026-12-31T00:00:00Z".to_string(),
        outcomes: vec!["Yes".to_string(), "No".to_string()],
        outcome_prices: vec![price_yes, price_no],
        clob_token_ids: vec![format!("{}-yes", id), format!("{}-no", id)],
    }
}
