//! Market records and the order-book enrichment step.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::arbitrage::prices::{ConditionPrices, PricePair};
use crate::orderbook::OrderBook;

/// Leg of a binary condition.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// First listed outcome (YES token).
    #[strum(serialize = "yes", serialize = "YES", serialize = "Yes")]
    #[default]
    Yes,
    /// Second listed outcome (NO token).
    #[strum(serialize = "no", serialize = "NO", serialize = "No")]
    No,
}

impl Outcome {
    /// Get the opposite outcome.
    pub fn opposite(&self) -> Self {
        match self {
            Outcome::Yes => Outcome::No,
            Outcome::No => Outcome::Yes,
        }
    }

    /// Position of this outcome in the catalog's parallel lists.
    pub fn index(&self) -> usize {
        match self {
            Outcome::Yes => 0,
            Outcome::No => 1,
        }
    }
}

/// Catalog record for one binary condition.
///
/// Outcome labels, prices, and token ids are parallel lists as the catalog
/// reports them; index 0 is YES and index 1 is NO.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Market {
    /// Unique market identifier.
    pub id: String,
    /// Market question text.
    pub question: String,
    /// Market slug.
    pub slug: String,
    /// Parent event slug (for `/event/{slug}` URLs).
    pub event_slug: String,
    /// Condition identifier.
    pub condition_id: String,
    /// Resolution date as reported (ISO 8601), empty when unknown.
    pub end_date: String,
    /// Outcome labels.
    pub outcomes: Vec<String>,
    /// Catalog-reported outcome prices.
    pub outcome_prices: Vec<Decimal>,
    /// CLOB token ids.
    pub clob_token_ids: Vec<String>,
}

impl Market {
    /// Whether both legs have a usable token id.
    pub fn is_binary(&self) -> bool {
        self.clob_token_ids.len() >= 2
            && !self.clob_token_ids[0].is_empty()
            && !self.clob_token_ids[1].is_empty()
    }

    /// Token id for an outcome, if listed.
    pub fn token_id(&self, outcome: Outcome) -> Option<&str> {
        self.clob_token_ids.get(outcome.index()).map(String::as_str)
    }

    /// Outcome label, falling back to "Yes"/"No".
    pub fn outcome_label(&self, outcome: Outcome) -> String {
        self.outcomes
            .get(outcome.index())
            .cloned()
            .unwrap_or_else(|| {
                match outcome {
                    Outcome::Yes => "Yes",
                    Outcome::No => "No",
                }
                .to_string()
            })
    }

    /// Parsed resolution time.
    pub fn end_time(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::parse(&self.end_date, &Rfc3339).ok()
    }

    /// Prices as reported by the catalog.
    ///
    /// Requires at least two labels, two prices, and two token ids.
    pub fn raw_prices(&self) -> Option<ConditionPrices> {
        if self.outcomes.len() < 2 || self.outcome_prices.len() < 2 || self.clob_token_ids.len() < 2
        {
            return None;
        }

        Some(ConditionPrices {
            token_id_yes: self.clob_token_ids[0].clone(),
            token_id_no: self.clob_token_ids[1].clone(),
            price_yes: self.outcome_prices[0],
            price_no: self.outcome_prices[1],
            outcome_yes: self.outcomes[0].clone(),
            outcome_no: self.outcomes[1].clone(),
        })
    }

    /// Attach order books, producing an enriched copy.
    pub fn enrich(
        self,
        order_book_yes: Option<OrderBook>,
        order_book_no: Option<OrderBook>,
    ) -> EnrichedMarket {
        EnrichedMarket {
            market: self,
            order_book_yes: order_book_yes.map(Arc::new),
            order_book_no: order_book_no.map(Arc::new),
        }
    }
}

/// A market together with whatever order books could be fetched for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedMarket {
    /// The catalog record.
    pub market: Market,
    /// YES leg book.
    pub order_book_yes: Option<Arc<OrderBook>>,
    /// NO leg book.
    pub order_book_no: Option<Arc<OrderBook>>,
}

impl From<Market> for EnrichedMarket {
    fn from(market: Market) -> Self {
        market.enrich(None, None)
    }
}

impl EnrichedMarket {
    /// Whether both legs' books are attached.
    pub fn has_order_books(&self) -> bool {
        self.order_book_yes.is_some() && self.order_book_no.is_some()
    }

    /// Tradeable prices from the attached books.
    ///
    /// `buy` is priced at the best asks and `sell` at the best bids. Returns
    /// `None` if either book is missing or any of the four best prices is absent.
    pub fn order_book_prices(&self) -> Option<PricePair> {
        let yes = self.order_book_yes.as_deref()?;
        let no = self.order_book_no.as_deref()?;

        let best_ask_yes = yes.best_ask()?;
        let best_ask_no = no.best_ask()?;
        let best_bid_yes = yes.best_bid()?;
        let best_bid_no = no.best_bid()?;

        let market = &self.market;
        let token_id_yes = market.token_id(Outcome::Yes)?.to_string();
        let token_id_no = market.token_id(Outcome::No)?.to_string();
        let outcome_yes = market.outcome_label(Outcome::Yes);
        let outcome_no = market.outcome_label(Outcome::No);

        Some(PricePair {
            buy: ConditionPrices {
                token_id_yes: token_id_yes.clone(),
                token_id_no: token_id_no.clone(),
                price_yes: best_ask_yes,
                price_no: best_ask_no,
                outcome_yes: outcome_yes.clone(),
                outcome_no: outcome_no.clone(),
            },
            sell: ConditionPrices {
                token_id_yes,
                token_id_no,
                price_yes: best_bid_yes,
                price_no: best_bid_no,
                outcome_yes,
                outcome_no,
            },
        })
    }
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
            condition_id: "0xcondition".to_string(),
            end_date: "2026-12-31T23:59:59Z".to_string(),
            outcomes: vec!["Yes".to_string(), "No".to_string()],
            outcome_prices: vec![dec!(0.45), dec!(0.50)],
            clob_token_ids: vec!["yes-token".to_string(), "no-token".to_string()],
        }
    }

    #[test]
    fn outcome_opposite_works() {
        assert_eq!(Outcome::Yes.opposite(), Outcome::No);
        assert_eq!(Outcome::No.opposite(), Outcome::Yes);
    }

    #[test]
    fn outcome_from_string_works() {
        use std::str::FromStr;
        assert_eq!(Outcome::from_str("yes").unwrap(), Outcome::Yes);
        assert_eq!(Outcome::from_str("NO").unwrap(), Outcome::No);
    }

    #[test]
    fn raw_prices_from_catalog() {
        let prices = test_market().raw_prices().unwrap();

        assert_eq!(prices.price_yes, dec!(0.45));
        assert_eq!(prices.price_no, dec!(0.50));
        assert_eq!(prices.token_id_yes, "yes-token");
        assert_eq!(prices.outcome_no, "No");
    }

    #[test]
    fn raw_prices_require_two_of_everything() {
        let market = Market {
            outcome_prices: vec![dec!(0.5)],
            ..test_market()
        };

        assert!(market.raw_prices().is_none());
    }

    #[test]
    fn binary_requires_both_token_ids() {
        assert!(test_market().is_binary());

        let market = Market {
            clob_token_ids: vec!["yes-token".to_string(), String::new()],
            ..test_market()
        };
        assert!(!market.is_binary());
    }

    #[test]
    fn outcome_label_falls_back() {
        let market = Market {
            outcomes: vec![],
            ..test_market()
        };

        assert_eq!(market.outcome_label(Outcome::Yes), "Yes");
        assert_eq!(market.outcome_label(Outcome::No), "No");
    }

    #[test]
    fn end_time_parses_rfc3339() {
        let end = test_market().end_time().unwrap();
        assert_eq!(end.year(), 2026);

        let market = Market {
            end_date: String::new(),
            ..test_market()
        };
        assert!(market.end_time().is_none());
    }

    #[test]
    fn enrich_does_not_touch_the_record() {
        let market = test_market();
        let enriched = market.clone().enrich(None, None);

        assert_eq!(enriched.market, market);
        assert!(!enriched.has_order_books());
        assert!(enriched.order_book_prices().is_none());
    }

    #[test]
    fn order_book_prices_use_best_ask_and_bid() {
        let yes = OrderBook::from_levels(
            "yes-token",
            &[(dec!(0.40), dec!(10)), (dec!(0.42), dec!(10))],
            &[(dec!(0.46), dec!(10)), (dec!(0.44), dec!(10))],
        );
        let no = OrderBook::from_levels(
            "no-token",
            &[(dec!(0.50), dec!(10))],
            &[(dec!(0.53), dec!(10))],
        );
        let pair = test_market()
            .enrich(Some(yes), Some(no))
            .order_book_prices()
            .unwrap();

        assert_eq!(pair.buy.price_yes, dec!(0.44));
        assert_eq!(pair.buy.price_no, dec!(0.53));
        assert_eq!(pair.sell.price_yes, dec!(0.42));
        assert_eq!(pair.sell.price_no, dec!(0.50));
    }

    #[test]
    fn order_book_prices_need_all_four_sides() {
        let yes = OrderBook::from_levels("yes-token", &[], &[(dec!(0.44), dec!(10))]);
        let no = OrderBook::from_levels(
            "no-token",
            &[(dec!(0.50), dec!(10))],
            &[(dec!(0.53), dec!(10))],
        );

        assert!(test_market()
            .enrich(Some(yes), Some(no))
            .order_book_prices()
            .is_none());
    }
}
