//! Fill price calculations over unordered book levels.

use std::cmp::Reverse;

use rust_decimal::Decimal;

use super::types::{FillInfo, OrderBook, PriceLevel};

/// Which side of the book a fill consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillSide {
    /// Taking asks, cheapest first.
    Buy,
    /// Hitting bids, richest first.
    Sell,
}

/// Walk `levels` in price priority for `side` until `size` is filled.
///
/// Returns `None` when the levels are exhausted first or `size` is negative.
pub fn walk_levels(levels: &[PriceLevel], size: Decimal, side: FillSide) -> Option<FillInfo> {
    if size < Decimal::ZERO {
        return None;
    }

    if size.is_zero() {
        return Some(FillInfo {
            filled_size: Decimal::ZERO,
            notional: Decimal::ZERO,
            vwap: Decimal::ZERO,
            worst_price: None,
        });
    }

    let mut sorted: Vec<&PriceLevel> = levels.iter().collect();
    match side {
        FillSide::Buy => sorted.sort_by_key(|l| l.price),
        FillSide::Sell => sorted.sort_by_key(|l| Reverse(l.price)),
    }

    let mut remaining = size;
    let mut notional = Decimal::ZERO;
    let mut worst_price = None;

    for level in sorted {
        if remaining.is_zero() {
            break;
        }

        let fill_size = remaining.min(level.size);
        notional += fill_size * level.price;
        remaining -= fill_size;
        worst_price = Some(level.price);
    }

    if !remaining.is_zero() {
        return None;
    }

    Some(FillInfo {
        filled_size: size,
        notional,
        vwap: notional / size,
        worst_price,
    })
}

/// Calculate the mid price from best bid and ask.
pub fn mid_price(book: &OrderBook) -> Option<Decimal> {
    match (book.best_bid(), book.best_ask()) {
        (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
        _ => None,
    }
}
