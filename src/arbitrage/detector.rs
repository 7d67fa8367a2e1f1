//! Single-condition arbitrage detection.

use rust_decimal::Decimal;
use serde::Serialize;
use smallvec::SmallVec;
use tracing::{debug, info, instrument};

use super::calculator::{ArbitrageOpportunity, Direction};
use super::prices::PricePair;
use super::source::PriceSource;
use crate::config::DetectorConfig;
use crate::market::EnrichedMarket;
use crate::metrics;

/// At most one opportunity per direction.
pub type Opportunities = SmallVec<[ArbitrageOpportunity; 2]>;

/// Detect single-condition arbitrage for one market.
///
/// `buy` prices are checked for a bundle costing less than $1 and `sell` prices
/// for a bundle fetching more than $1, independently. Output order is
/// `buy_both` then `sell_both`. Missing prices yield an empty result.
#[instrument(skip(market, source), fields(market = %market.market.slug, source = source.name()))]
pub fn detect_single_condition(
    market: &EnrichedMarket,
    source: &PriceSource,
    min_profit: Decimal,
) -> Opportunities {
    let mut opportunities = Opportunities::new();

    let Some(PricePair { buy, sell }) = source.resolve(market) else {
        debug!("No prices available");
        return opportunities;
    };

    if buy.arbitrage_down() && buy.profit_margin() >= min_profit {
        opportunities.push(ArbitrageOpportunity::new(
            &market.market,
            Direction::BuyBoth,
            &buy,
            market.order_book_yes.clone(),
            market.order_book_no.clone(),
        ));
    }

    if sell.arbitrage_up() && sell.profit_margin() >= min_profit {
        opportunities.push(ArbitrageOpportunity::new(
            &market.market,
            Direction::SellBoth,
            &sell,
            market.order_book_yes.clone(),
            market.order_book_no.clone(),
        ));
    }

    if opportunities.is_empty() {
        debug!(
            buy_sum = %buy.sum(),
            sell_sum = %sell.sum(),
            min_profit = %min_profit,
            "No arbitrage opportunity"
        );
    }

    for opp in &opportunities {
        info!(
            direction = %opp.direction,
            sum = %opp.sum_prices,
            profit_margin = %opp.profit_margin,
            "Arbitrage opportunity detected"
        );
        metrics::inc_opportunities_detected(opp.direction);
    }

    opportunities
}

/// Detect with the configured threshold, selecting the source by precedence.
pub fn detect(
    market: &EnrichedMarket,
    explicit: Option<PricePair>,
    config: &DetectorConfig,
) -> Opportunities {
    let source = PriceSource::select(explicit, config.use_order_book);
    detect_single_condition(market, &source, config.min_profit)
}

/// Quick check on catalog prices alone (without books).
pub fn quick_opportunity_check(market: &EnrichedMarket, min_profit: Decimal) -> bool {
    market
        .market
        .raw_prices()
        .map(|p| p.profit_margin() > Decimal::ZERO && p.profit_margin() >= min_profit)
        .unwrap_or(false)
}

/// How far the VWAP cost of a bundle sits from $1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceDeviation {
    /// Bundle size the VWAPs were computed for.
    pub size: Decimal,
    /// VWAP to buy `size` YES.
    pub vwap_yes: Decimal,
    /// VWAP to buy `size` NO.
    pub vwap_no: Decimal,
    /// |vwap_yes + vwap_no - 1|.
    pub deviation: Decimal,
    /// Threshold the deviation was compared against.
    pub threshold: Decimal,
    /// Whether the deviation exceeds the threshold.
    pub exceeds: bool,
}

/// Compare the VWAP cost of buying `size` bundles against $1.
///
/// `None` when either book is missing or cannot fill `size`.
pub fn diagnose_price_deviation(
    market: &EnrichedMarket,
    size: Decimal,
    threshold: Decimal,
) -> Option<PriceDeviation> {
    let vwap_yes = market.order_book_yes.as_deref()?.vwap_buy(size)?;
    let vwap_no = market.order_book_no.as_deref()?.vwap_buy(size)?;
    let deviation = (vwap_yes + vwap_no - Decimal::ONE).abs();

    Some(PriceDeviation {
        size,
        vwap_yes,
        vwap_no,
        deviation,
        threshold,
        exceeds: deviation > threshold,
    })
}

impl std::fmt::Display for PriceDeviation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "size={} | VWAP YES=${} + NO=${} | deviation={} (threshold={}){}",
            self.size,
            self.vwap_yes.round_dp(4),
            self.vwap_no.round_dp(4),
            self.deviation.round_dp(4),
            self.threshold,
            if self.exceeds { " EXCEEDS" } else { "" },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::prices::ConditionPrices;
    use crate::market::Market;
    use crate::orderbook::OrderBook;
    use rust_decimal_macros::dec;

    fn test_market(yes: Decimal, no: Decimal) -> Market {
        Market {
            id: "market-id".to_string(),
            question: "Will it rain tomorrow?".to_string(),
            slug: "will-it-rain".to_string(),
            event_slug: "weather".to_string(),
            end_date: "2026-12-31T23:59:59Z".to_string(),
            outcomes: vec!["Yes".to_string(), "No".to_string()],
            outcome_prices: vec![yes, no],
            clob_token_ids: vec!["yes-token".to_string(), "no-token".to_string()],
            ..Market::default()
        }
    }

    fn book(asset: &str, bid: (Decimal, Decimal), ask: (Decimal, Decimal)) -> OrderBook {
        OrderBook::from_levels(asset, &[bid], &[ask])
    }

    #[test]
    fn underpriced_bundle_emits_buy_both() {
        let market = EnrichedMarket::from(test_market(dec!(0.45), dec!(0.50)));

        let opps = detect_single_condition(&market, &PriceSource::Raw, dec!(0.03));

        assert_eq!(opps.len(), 1);
        assert_eq!(opps[0].direction, Direction::BuyBoth);
        assert_eq!(opps[0].profit_margin, dec!(0.05));
        assert_eq!(opps[0].sum_prices, dec!(0.95));
    }

    #[test]
    fn overpriced_bundle_emits_sell_both() {
        let market = EnrichedMarket::from(test_market(dec!(0.60), dec!(0.55)));

        let opps = detect_single_condition(&market, &PriceSource::Raw, dec!(0.03));

        assert_eq!(opps.len(), 1);
        assert_eq!(opps[0].direction, Direction::SellBoth);
        assert_eq!(opps[0].profit_margin, dec!(0.15));
    }

    #[test]
    fn consistent_prices_never_emit() {
        let market = EnrichedMarket::from(test_market(dec!(0.50), dec!(0.50)));

        for threshold in [dec!(0), dec!(0.01), dec!(0.5)] {
            assert!(detect_single_condition(&market, &PriceSource::Raw, threshold).is_empty());
        }
    }

    #[test]
    fn margin_below_threshold_is_skipped() {
        let market = EnrichedMarket::from(test_market(dec!(0.49), dec!(0.50)));

        assert!(detect_single_condition(&market, &PriceSource::Raw, dec!(0.03)).is_empty());
        assert_eq!(
            detect_single_condition(&market, &PriceSource::Raw, dec!(0.01)).len(),
            1
        );
    }

    #[test]
    fn both_directions_can_fire_from_an_explicit_pair() {
        let market = EnrichedMarket::from(test_market(dec!(0.50), dec!(0.50)));
        let pair = PricePair {
            buy: ConditionPrices::new("yes-token", "no-token", dec!(0.40), dec!(0.45)),
            sell: ConditionPrices::new("yes-token", "no-token", dec!(0.60), dec!(0.50)),
        };

        let opps = detect_single_condition(&market, &PriceSource::Explicit(pair), dec!(0.03));

        assert_eq!(opps.len(), 2);
        assert_eq!(opps[0].direction, Direction::BuyBoth);
        assert_eq!(opps[0].price_yes, dec!(0.40));
        assert_eq!(opps[1].direction, Direction::SellBoth);
        assert_eq!(opps[1].price_yes, dec!(0.60));
    }

    #[test]
    fn order_book_prices_drive_detection() {
        let market = test_market(dec!(0.50), dec!(0.50)).enrich(
            Some(book("yes-token", (dec!(0.43), dec!(50)), (dec!(0.45), dec!(100)))),
            Some(book("no-token", (dec!(0.48), dec!(50)), (dec!(0.50), dec!(80)))),
        );

        let opps = detect_single_condition(&market, &PriceSource::OrderBookDerived, dec!(0.03));

        assert_eq!(opps.len(), 1);
        assert_eq!(opps[0].direction, Direction::BuyBoth);
        assert_eq!(opps[0].max_extractable_usd(None), Some(dec!(4.0)));
    }

    #[test]
    fn missing_leg_falls_back_to_raw_prices() {
        let market = test_market(dec!(0.45), dec!(0.50)).enrich(
            Some(book("yes-token", (dec!(0.49), dec!(50)), (dec!(0.51), dec!(100)))),
            None,
        );

        let opps = detect_single_condition(&market, &PriceSource::OrderBookDerived, dec!(0.03));

        assert_eq!(opps.len(), 1);
        assert_eq!(opps[0].price_yes, dec!(0.45));
        assert_eq!(opps[0].max_extractable_usd(None), None);
    }

    #[test]
    fn no_prices_anywhere_is_empty_not_error() {
        let market = EnrichedMarket::from(Market::default());

        assert!(detect_single_condition(&market, &PriceSource::OrderBookDerived, dec!(0)).is_empty());
    }

    #[test]
    fn detection_is_idempotent() {
        let market = test_market(dec!(0.50), dec!(0.50)).enrich(
            Some(book("yes-token", (dec!(0.62), dec!(50)), (dec!(0.40), dec!(100)))),
            Some(book("no-token", (dec!(0.48), dec!(50)), (dec!(0.45), dec!(80)))),
        );

        let first = detect_single_condition(&market, &PriceSource::OrderBookDerived, dec!(0.03));
        let second = detect_single_condition(&market, &PriceSource::OrderBookDerived, dec!(0.03));

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn raising_threshold_never_adds_opportunities() {
        let market = EnrichedMarket::from(test_market(dec!(0.50), dec!(0.50)));
        let pair = PricePair {
            buy: ConditionPrices::new("yes-token", "no-token", dec!(0.40), dec!(0.52)),
            sell: ConditionPrices::new("yes-token", "no-token", dec!(0.58), dec!(0.47)),
        };
        let source = PriceSource::Explicit(pair);

        let mut previous = usize::MAX;
        for step in 0..=20 {
            let threshold = Decimal::new(step, 2);
            let count = detect_single_condition(&market, &source, threshold).len();
            assert!(count <= previous);
            previous = count;
        }
        assert_eq!(previous, 0);
    }

    #[test]
    fn detect_uses_config_precedence() {
        let market = EnrichedMarket::from(test_market(dec!(0.45), dec!(0.50)));
        let config = DetectorConfig::default();

        assert_eq!(detect(&market, None, &config).len(), 1);

        let consistent = PricePair::uniform(ConditionPrices::new(
            "yes-token",
            "no-token",
            dec!(0.5),
            dec!(0.5),
        ));
        assert!(detect(&market, Some(consistent), &config).is_empty());
    }

    #[test]
    fn quick_check_uses_catalog_prices() {
        let market = EnrichedMarket::from(test_market(dec!(0.45), dec!(0.50)));

        assert!(quick_opportunity_check(&market, dec!(0.03)));
        assert!(!quick_opportunity_check(&market, dec!(0.06)));
    }

    #[test]
    fn price_deviation_uses_vwap() {
        let market = test_market(dec!(0.50), dec!(0.50)).enrich(
            Some(OrderBook::from_levels(
                "yes-token",
                &[],
                &[(dec!(0.45), dec!(10)), (dec!(0.47), dec!(10))],
            )),
            Some(OrderBook::from_levels("no-token", &[], &[(dec!(0.50), dec!(20))])),
        );

        let diag = diagnose_price_deviation(&market, dec!(20), dec!(0.02)).unwrap();

        // YES VWAP = (4.5 + 4.7) / 20 = 0.46
        assert_eq!(diag.vwap_yes, dec!(0.46));
        assert_eq!(diag.deviation, dec!(0.04));
        assert!(diag.exceeds);

        assert!(diagnose_price_deviation(&market, dec!(21), dec!(0.02)).is_none());
    }
}
