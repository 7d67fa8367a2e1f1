//! Where a detection pass takes its prices from.

use tracing::debug;

use super::prices::PricePair;
use crate::market::EnrichedMarket;

/// Price source for one detection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriceSource {
    /// Caller-supplied buy/sell pair (e.g. from the CLOB `/price` endpoint).
    Explicit(PricePair),
    /// Best ask/bid from the attached order books, falling back to raw prices.
    OrderBookDerived,
    /// Catalog-reported prices for both directions.
    Raw,
}

impl PriceSource {
    /// Pick a source by precedence: an explicit pair wins, then order books if
    /// requested, then raw catalog prices.
    pub fn select(explicit: Option<PricePair>, use_order_book: bool) -> Self {
        match explicit {
            Some(pair) => PriceSource::Explicit(pair),
            None if use_order_book => PriceSource::OrderBookDerived,
            None => PriceSource::Raw,
        }
    }

    /// Short name for logs and tables.
    pub fn name(&self) -> &'static str {
        match self {
            PriceSource::Explicit(_) => "explicit",
            PriceSource::OrderBookDerived => "order_book",
            PriceSource::Raw => "raw",
        }
    }

    /// Resolve buy/sell prices for a market.
    ///
    /// Returns `None` only when no usable prices exist at all.
    pub fn resolve(&self, market: &EnrichedMarket) -> Option<PricePair> {
        match self {
            PriceSource::Explicit(pair) => Some(pair.clone()),
            PriceSource::OrderBookDerived => market.order_book_prices().or_else(|| {
                debug!(
                    market = %market.market.slug,
                    "Order book prices unavailable, falling back to raw"
                );
                market.market.raw_prices().map(PricePair::uniform)
            }),
            PriceSource::Raw => market.market.raw_prices().map(PricePair::uniform),
        }
    }
}
