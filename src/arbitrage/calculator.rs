//! Opportunity records and depth-aware profit estimation.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use strum::{Display, EnumString};

use super::prices::ConditionPrices;
use crate::config::EstimatorConfig;
use crate::market::Market;
use crate::orderbook::OrderBook;

/// Which way the bundle is traded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Direction {
    /// Buy YES and NO at the asks; the bundle costs less than $1.
    BuyBoth,
    /// Sell YES and NO at the bids; the bundle fetches more than $1.
    SellBoth,
}

/// Detected single-condition arbitrage opportunity.
///
/// Created once per detection pass per market per direction and never mutated.
/// The order books are shared with the enriched market that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArbitrageOpportunity {
    /// Market identifier.
    pub market_id: String,
    /// Market question text.
    pub question: String,
    /// Market slug.
    pub slug: String,
    /// Parent event slug.
    pub event_slug: String,
    /// Resolution date (ISO 8601), empty when unknown.
    pub end_date: String,
    /// Trade direction.
    pub direction: Direction,
    /// YES price that triggered detection.
    pub price_yes: Decimal,
    /// NO price that triggered detection.
    pub price_no: Decimal,
    /// YES + NO.
    pub sum_prices: Decimal,
    /// |sum - 1|.
    pub profit_margin: Decimal,
    /// YES token id.
    pub token_id_yes: String,
    /// NO token id.
    pub token_id_no: String,
    /// YES book used for detection, if any.
    pub order_book_yes: Option<Arc<OrderBook>>,
    /// NO book used for detection, if any.
    pub order_book_no: Option<Arc<OrderBook>>,
}

impl ArbitrageOpportunity {
    /// Build a record from the prices that triggered it.
    pub fn new(
        market: &Market,
        direction: Direction,
        prices: &ConditionPrices,
        order_book_yes: Option<Arc<OrderBook>>,
        order_book_no: Option<Arc<OrderBook>>,
    ) -> Self {
        Self {
            market_id: market.id.clone(),
            question: market.question.clone(),
            slug: market.slug.clone(),
            event_slug: market.event_slug.clone(),
            end_date: market.end_date.clone(),
            direction,
            price_yes: prices.price_yes,
            price_no: prices.price_no,
            sum_prices: prices.sum(),
            profit_margin: prices.profit_margin(),
            token_id_yes: prices.token_id_yes.clone(),
            token_id_no: prices.token_id_no.clone(),
            order_book_yes,
            order_book_no,
        }
    }

    /// Profit per dollar of bundle notional.
    pub fn max_profit_per_dollar(&self) -> Decimal {
        self.profit_margin
    }

    /// Aggregate depth on the side each leg trades against.
    ///
    /// Asks for `buy_both`, bids for `sell_both`. `None` if either book is absent.
    pub fn leg_depths(&self) -> Option<(Decimal, Decimal)> {
        let yes = self.order_book_yes.as_deref()?;
        let no = self.order_book_no.as_deref()?;

        Some(match self.direction {
            Direction::BuyBoth => (yes.total_ask_depth(), no.total_ask_depth()),
            Direction::SellBoth => (yes.total_bid_depth(), no.total_bid_depth()),
        })
    }

    /// Largest dollar profit the resting depth allows.
    ///
    /// The hedge must be filled equally on both legs, so the size is the smaller
    /// leg's depth, further capped by `max_size`. Returns `None` (unknown, not
    /// zero) when either book is absent.
    pub fn max_extractable_usd(&self, max_size: Option<Decimal>) -> Option<Decimal> {
        let (yes_depth, no_depth) = self.leg_depths()?;

        let mut cap = yes_depth.min(no_depth);
        if let Some(max) = max_size {
            cap = cap.min(max);
        }

        Some(self.profit_margin * cap.max(Decimal::ZERO))
    }
}

/// Sizing summary for one opportunity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfitEstimate {
    /// YES leg depth on the traded side.
    pub yes_depth: Decimal,
    /// NO leg depth on the traded side.
    pub no_depth: Decimal,
    /// Bundles that can be hedged on both legs.
    pub hedgeable_size: Decimal,
    /// Margin times hedgeable size, capped by the configured max size.
    pub max_extractable_usd: Decimal,
    /// Bundles to size to without consuming more than the liquidity cap.
    pub recommended_size: Decimal,
    /// Margin times the recommended size.
    pub recommended_profit_usd: Decimal,
}

/// Estimate extractable profit for an opportunity.
///
/// Aggregate depth only; this is not a VWAP fill cost. `None` when either book
/// is absent.
pub fn estimate_profit(
    opportunity: &ArbitrageOpportunity,
    config: &EstimatorConfig,
) -> Option<ProfitEstimate> {
    let (yes_depth, no_depth) = opportunity.leg_depths()?;
    let hedgeable_size = yes_depth.min(no_depth).max(Decimal::ZERO);
    let max_extractable_usd = opportunity.max_extractable_usd(config.max_size)?;

    let mut recommended_size = hedgeable_size * config.liquidity_pct_cap;
    if let Some(max) = config.max_size {
        recommended_size = recommended_size.min(max.max(Decimal::ZERO));
    }

    Some(ProfitEstimate {
        yes_depth,
        no_depth,
        hedgeable_size,
        max_extractable_usd,
        recommended_size,
        recommended_profit_usd: opportunity.profit_margin * recommended_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_market() -> Market {
        Market {
            id: "market-id".to_string(),
            question: "Will it rain tomorrow?".to_string(),
            slug: "will-it-rain".to_string(),
            event_slug: "weather".to_string(),
            clob_token_ids: vec!["yes-token".to_string(), "no-token".to_string()],
            ..Market::default()
        }
    }

    fn test_opportunity(
        direction: Direction,
        yes: Option<OrderBook>,
        no: Option<OrderBook>,
    ) -> ArbitrageOpportunity {
        let prices = ConditionPrices::new("yes-token", "no-token", dec!(0.45), dec!(0.50));
        ArbitrageOpportunity::new(
            &test_market(),
            direction,
            &prices,
            yes.map(Arc::new),
            no.map(Arc::new),
        )
    }

    fn asks(asset: &str, levels: &[(Decimal, Decimal)]) -> OrderBook {
        OrderBook::from_levels(asset, &[], levels)
    }

    #[test]
    fn direction_renders_snake_case() {
        assert_eq!(Direction::BuyBoth.to_string(), "buy_both");
        assert_eq!(Direction::SellBoth.to_string(), "sell_both");
    }

    #[test]
    fn new_copies_triggering_prices() {
        let opp = test_opportunity(Direction::BuyBoth, None, None);

        assert_eq!(opp.sum_prices, dec!(0.95));
        assert_eq!(opp.profit_margin, dec!(0.05));
        assert_eq!(opp.max_profit_per_dollar(), dec!(0.05));
        assert_eq!(opp.slug, "will-it-rain");
    }

    #[test]
    fn max_extractable_uses_thinner_leg() {
        let opp = test_opportunity(
            Direction::BuyBoth,
            Some(asks("yes-token", &[(dec!(0.45), dec!(100))])),
            Some(asks("no-token", &[(dec!(0.50), dec!(80))])),
        );

        assert_eq!(opp.max_extractable_usd(None), Some(dec!(4.0)));
    }

    #[test]
    fn max_extractable_respects_caller_cap() {
        let opp = test_opportunity(
            Direction::BuyBoth,
            Some(asks("yes-token", &[(dec!(0.45), dec!(100))])),
            Some(asks("no-token", &[(dec!(0.50), dec!(80))])),
        );

        assert_eq!(opp.max_extractable_usd(Some(dec!(20))), Some(dec!(1.0)));
        assert_eq!(opp.max_extractable_usd(Some(dec!(-5))), Some(Decimal::ZERO));
    }

    #[test]
    fn max_extractable_is_unknown_without_books() {
        let opp = test_opportunity(
            Direction::BuyBoth,
            Some(asks("yes-token", &[(dec!(0.45), dec!(100))])),
            None,
        );

        assert_eq!(opp.max_extractable_usd(None), None);
    }

    #[test]
    fn sell_both_counts_bid_depth() {
        let yes = OrderBook::from_levels(
            "yes-token",
            &[(dec!(0.60), dec!(30)), (dec!(0.59), dec!(20))],
            &[(dec!(0.61), dec!(1000))],
        );
        let no = OrderBook::from_levels(
            "no-token",
            &[(dec!(0.55), dec!(70))],
            &[(dec!(0.56), dec!(1000))],
        );
        let opp = test_opportunity(Direction::SellBoth, Some(yes), Some(no));

        assert_eq!(opp.leg_depths(), Some((dec!(50), dec!(70))));
        assert_eq!(opp.max_extractable_usd(None), Some(dec!(0.05) * dec!(50)));
    }

    #[test]
    fn max_extractable_never_exceeds_margin_times_depth() {
        let opp = test_opportunity(
            Direction::BuyBoth,
            Some(asks(
                "yes-token",
                &[(dec!(0.45), dec!(40)), (dec!(0.46), dec!(25))],
            )),
            Some(asks("no-token", &[(dec!(0.50), dec!(90))])),
        );
        let bound = opp.profit_margin * dec!(65);

        for cap in [None, Some(dec!(0)), Some(dec!(10)), Some(dec!(1000))] {
            let value = opp.max_extractable_usd(cap).unwrap();
            assert!(value >= Decimal::ZERO);
            assert!(value <= bound);
        }
    }

    #[test]
    fn estimate_applies_liquidity_cap() {
        let opp = test_opportunity(
            Direction::BuyBoth,
            Some(asks("yes-token", &[(dec!(0.45), dec!(100))])),
            Some(asks("no-token", &[(dec!(0.50), dec!(80))])),
        );

        let estimate = estimate_profit(&opp, &EstimatorConfig::default()).unwrap();

        assert_eq!(estimate.hedgeable_size, dec!(80));
        assert_eq!(estimate.max_extractable_usd, dec!(4.0));
        assert_eq!(estimate.recommended_size, dec!(40.0));
        assert_eq!(estimate.recommended_profit_usd, dec!(2.0));
    }

    #[test]
    fn estimate_respects_max_size() {
        let opp = test_opportunity(
            Direction::BuyBoth,
            Some(asks("yes-token", &[(dec!(0.45), dec!(100))])),
            Some(asks("no-token", &[(dec!(0.50), dec!(80))])),
        );
        let config = EstimatorConfig {
            liquidity_pct_cap: dec!(0.5),
            max_size: Some(dec!(10)),
        };

        let estimate = estimate_profit(&opp, &config).unwrap();

        assert_eq!(estimate.max_extractable_usd, dec!(0.5));
        assert_eq!(estimate.recommended_size, dec!(10));
    }
}
