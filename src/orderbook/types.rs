//! Order book types and data structures.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::aggregator::{walk_levels, FillSide};

/// Single price level in an order book.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceLevel {
    /// Price at this level.
    pub price: Decimal,
    /// Total size available at this price.
    pub size: Decimal,
}

impl PriceLevel {
    /// Create a new price level.
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// Resting liquidity for one asset.
///
/// Levels are kept in whatever order the venue returned them; every derived
/// metric sorts or scans as needed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook {
    /// Asset (token) ID this book represents.
    pub asset_id: String,
    /// Bid levels, unordered.
    pub bids: Vec<PriceLevel>,
    /// Ask levels, unordered.
    pub asks: Vec<PriceLevel>,
}

impl OrderBook {
    /// Create a book from `(price, size)` tuples.
    pub fn from_levels(
        asset_id: impl Into<String>,
        bids: &[(Decimal, Decimal)],
        asks: &[(Decimal, Decimal)],
    ) -> Self {
        let to_levels = |levels: &[(Decimal, Decimal)]| {
            levels
                .iter()
                .map(|&(price, size)| PriceLevel::new(price, size))
                .collect()
        };

        Self {
            asset_id: asset_id.into(),
            bids: to_levels(bids),
            asks: to_levels(asks),
        }
    }

    /// Highest bid price.
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.iter().map(|l| l.price).max()
    }

    /// Lowest ask price.
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.iter().map(|l| l.price).min()
    }

    /// Get the spread between best bid and ask.
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Check if the book is crossed (best_ask < best_bid).
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => ask < bid,
            _ => false,
        }
    }

    /// Total size resting on the bid side.
    pub fn total_bid_depth(&self) -> Decimal {
        self.bids.iter().map(|l| l.size).sum()
    }

    /// Total size resting on the ask side.
    pub fn total_ask_depth(&self) -> Decimal {
        self.asks.iter().map(|l| l.size).sum()
    }

    /// Volume-weighted average price to buy `size`, walking asks from the lowest.
    ///
    /// Returns `None` when the asks run out before `size` is filled. A zero
    /// size fills trivially at zero.
    pub fn vwap_buy(&self, size: Decimal) -> Option<Decimal> {
        walk_levels(&self.asks, size, FillSide::Buy).map(|fill| fill.vwap)
    }

    /// Volume-weighted average price to sell `size`, walking bids from the highest.
    pub fn vwap_sell(&self, size: Decimal) -> Option<Decimal> {
        walk_levels(&self.bids, size, FillSide::Sell).map(|fill| fill.vwap)
    }
}

/// Result of walking one side of the book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillInfo {
    /// Total size filled.
    pub filled_size: Decimal,
    /// Total notional (cost for buys, revenue for sells).
    pub notional: Decimal,
    /// Volume-weighted average price.
    pub vwap: Decimal,
    /// Worst price touched (highest for buys, lowest for sells).
    pub worst_price: Option<Decimal>,
}
