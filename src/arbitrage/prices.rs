//! Complementary price pairs for one binary condition.
//!
//! Under no-arbitrage the YES and NO prices of a condition sum to exactly one
//! unit of currency. Any deviation is a riskless edge:
//!
//! ```text
//! YES ask:  $0.45
//! NO ask:   $0.50
//! ─────────────────
//! Total:    $0.95 < $1.00   buy both, one leg pays $1.00
//! Margin:   $0.05 per bundle
//! ```

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Prices for the YES/NO legs of one condition.
///
/// Prices are expected in (0, 1) but are never clamped here; the projector
/// clips its own copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionPrices {
    /// YES token id.
    pub token_id_yes: String,
    /// NO token id.
    pub token_id_no: String,
    /// YES price.
    pub price_yes: Decimal,
    /// NO price.
    pub price_no: Decimal,
    /// YES outcome label.
    pub outcome_yes: String,
    /// NO outcome label.
    pub outcome_no: String,
}

impl ConditionPrices {
    /// Build a pair with the default "Yes"/"No" labels.
    pub fn new(
        token_id_yes: impl Into<String>,
        token_id_no: impl Into<String>,
        price_yes: Decimal,
        price_no: Decimal,
    ) -> Self {
        Self {
            token_id_yes: token_id_yes.into(),
            token_id_no: token_id_no.into(),
            price_yes,
            price_no,
            outcome_yes: "Yes".to_string(),
            outcome_no: "No".to_string(),
        }
    }

    /// YES + NO; equals one when arbitrage-free.
    pub fn sum(&self) -> Decimal {
        self.price_yes + self.price_no
    }

    /// Both legs can be sold for more than $1.
    pub fn arbitrage_up(&self) -> bool {
        self.sum() > Decimal::ONE
    }

    /// Both legs can be bought for less than $1.
    pub fn arbitrage_down(&self) -> bool {
        self.sum() < Decimal::ONE
    }

    /// Riskless profit per bundle, zero when the pair is consistent.
    pub fn profit_margin(&self) -> Decimal {
        if self.arbitrage_up() || self.arbitrage_down() {
            (self.sum() - Decimal::ONE).abs()
        } else {
            Decimal::ZERO
        }
    }

    /// `[price_yes, price_no]` as a float vector for the projector.
    pub fn to_vector(&self) -> Vec<f64> {
        vec![
            self.price_yes.to_f64().unwrap_or(0.0),
            self.price_no.to_f64().unwrap_or(0.0),
        ]
    }
}

/// Prices at which both legs can be bought and sold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePair {
    /// Prices to buy each leg (asks).
    pub buy: ConditionPrices,
    /// Prices to sell each leg (bids).
    pub sell: ConditionPrices,
}

impl PricePair {
    /// Use one set of prices for both directions.
    pub fn uniform(prices: ConditionPrices) -> Self {
        Self {
            buy: prices.clone(),
            sell: prices,
        }
    }
}
