//! CLOB API client for order books and quotes.

use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use super::types::{Market, Outcome};
use crate::arbitrage::{ConditionPrices, PricePair};
use crate::config::Config;
use crate::error::MarketError;
use crate::metrics;
use crate::orderbook::{OrderBook, PriceLevel};

/// Source of order books and explicit quotes.
#[async_trait]
pub trait OrderBookSource: Send + Sync {
    /// Full book for one token.
    async fn get_order_book(&self, token_id: &str) -> Result<OrderBook, MarketError>;

    /// Buy and sell quotes for both legs of a market.
    ///
    /// `Ok(None)` when the market is not binary or any quote is unavailable.
    async fn get_price_pair(&self, market: &Market) -> Result<Option<PricePair>, MarketError>;
}

/// Quote side for the `/price` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteSide {
    /// Price to buy.
    Buy,
    /// Price to sell.
    Sell,
}

impl QuoteSide {
    fn as_str(&self) -> &'static str {
        match self {
            QuoteSide::Buy => "buy",
            QuoteSide::Sell => "sell",
        }
    }
}

/// Order book response from API.
///
/// Levels come either as `{"price": "0.45", "size": "100"}` objects (sometimes
/// with `volume` instead of `size`, sometimes numeric) or as `[price, size]`
/// arrays, so they are kept loose here.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBookResponse {
    /// Bid levels.
    #[serde(default)]
    pub bids: Option<Vec<Value>>,
    /// Ask levels.
    #[serde(default)]
    pub asks: Option<Vec<Value>>,
    /// Asset ID.
    #[serde(default)]
    pub asset_id: Option<String>,
    /// Error payload, present instead of levels for unknown tokens.
    #[serde(default)]
    pub error: Option<Value>,
}

/// Quote response from the `/price` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceResponse {
    /// Quoted price, as a string or number.
    #[serde(default)]
    pub price: Option<Value>,
}

/// Polymarket CLOB API client.
#[derive(Debug, Clone)]
pub struct ClobClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ClobClient {
    /// Create a client from config.
    pub fn new(config: &Config) -> Result<Self, MarketError> {
        let http = http_client(config.http_timeout_ms)?;
        Self::with_http(http, &config.clob_api_url)
    }

    /// Create a client around an existing HTTP client.
    pub fn with_http(http: reqwest::Client, base_url: &str) -> Result<Self, MarketError> {
        Ok(Self {
            http,
            base_url: base_url_with_slash(base_url)?,
        })
    }

    /// Base URL requests are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Quote for one token and side.
    ///
    /// `Ok(None)` on 404 or when the response carries no price.
    #[instrument(skip(self), fields(token_id = %token_id, side = side.as_str()))]
    pub async fn get_price(
        &self,
        token_id: &str,
        side: QuoteSide,
    ) -> Result<Option<Decimal>, MarketError> {
        let url = self.base_url.join("price")?;

        let response = self
            .http
            .get(url)
            .query(&[("token_id", token_id), ("side", side.as_str())])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("No quote for token");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(MarketError::FetchFailed {
                resource: format!("price {}", token_id),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let body: PriceResponse = response.json().await.map_err(|e| {
            MarketError::ParseError(format!("Failed to parse price: {}", e))
        })?;

        Ok(body.price.as_ref().and_then(decimal_from_value))
    }
}

#[async_trait]
impl OrderBookSource for ClobClient {
    #[instrument(skip(self), fields(token_id = %token_id))]
    async fn get_order_book(&self, token_id: &str) -> Result<OrderBook, MarketError> {
        let start = Instant::now();
        let url = self.base_url.join("book")?;

        let response = self
            .http
            .get(url)
            .query(&[("token_id", token_id)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MarketError::FetchFailed {
                resource: format!("book {}", token_id),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let body: OrderBookResponse = response.json().await.map_err(|e| {
            MarketError::ParseError(format!("Failed to parse order book: {}", e))
        })?;

        let book = convert_order_book(token_id, body)?;
        metrics::record_orderbook_fetch_latency(start);
        debug!(
            bids = book.bids.len(),
            asks = book.asks.len(),
            "Fetched order book"
        );

        Ok(book)
    }

    #[instrument(skip(self, market), fields(slug = %market.slug))]
    async fn get_price_pair(&self, market: &Market) -> Result<Option<PricePair>, MarketError> {
        if !market.is_binary() {
            return Ok(None);
        }
        let (Some(yes), Some(no)) = (market.token_id(Outcome::Yes), market.token_id(Outcome::No))
        else {
            return Ok(None);
        };

        let (buy_yes, buy_no, sell_yes, sell_no) = futures::try_join!(
            self.get_price(yes, QuoteSide::Buy),
            self.get_price(no, QuoteSide::Buy),
            self.get_price(yes, QuoteSide::Sell),
            self.get_price(no, QuoteSide::Sell),
        )?;

        let (Some(buy_yes), Some(buy_no), Some(sell_yes), Some(sell_no)) =
            (buy_yes, buy_no, sell_yes, sell_no)
        else {
            debug!("Incomplete quotes");
            return Ok(None);
        };

        Ok(Some(quote_pair(market, yes, no, (buy_yes, buy_no), (sell_yes, sell_no))))
    }
}

/// Build the `{buy, sell}` pair for a market from four quotes.
pub fn quote_pair(
    market: &Market,
    token_id_yes: &str,
    token_id_no: &str,
    buy: (Decimal, Decimal),
    sell: (Decimal, Decimal),
) -> PricePair {
    let labelled = |price_yes, price_no| ConditionPrices {
        outcome_yes: market.outcome_label(Outcome::Yes),
        outcome_no: market.outcome_label(Outcome::No),
        ..ConditionPrices::new(token_id_yes, token_id_no, price_yes, price_no)
    };

    PricePair {
        buy: labelled(buy.0, buy.1),
        sell: labelled(sell.0, sell.1),
    }
}

/// Convert an API response to an `OrderBook`.
///
/// Levels with non-positive price or size are dropped. An error payload is
/// reported as `MarketError::ApiError`.
pub fn convert_order_book(
    token_id: &str,
    response: OrderBookResponse,
) -> Result<OrderBook, MarketError> {
    if let Some(error) = response.error.as_ref().filter(|e| is_truthy(e)) {
        return Err(MarketError::ApiError {
            resource: format!("book {}", token_id),
            message: match error {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        });
    }

    let parse_levels = |levels: Option<Vec<Value>>| -> Vec<PriceLevel> {
        levels
            .unwrap_or_default()
            .iter()
            .filter_map(parse_level)
            .filter(|level| level.price > Decimal::ZERO && level.size > Decimal::ZERO)
            .collect()
    };

    let mut bids = parse_levels(response.bids);
    let mut asks = parse_levels(response.asks);

    // Sort bids descending by price
    bids.sort_by(|a, b| b.price.cmp(&a.price));
    // Sort asks ascending by price
    asks.sort_by(|a, b| a.price.cmp(&b.price));

    Ok(OrderBook {
        asset_id: response.asset_id.unwrap_or_else(|| token_id.to_string()),
        bids,
        asks,
    })
}

fn parse_level(level: &Value) -> Option<PriceLevel> {
    match level {
        Value::Object(fields) => {
            let price = decimal_from_value(fields.get("price")?)?;
            let size = fields
                .get("size")
                .or_else(|| fields.get("volume"))
                .and_then(decimal_from_value)?;
            Some(PriceLevel::new(price, size))
        }
        Value::Array(items) if items.len() >= 2 => Some(PriceLevel::new(
            decimal_from_value(&items[0])?,
            decimal_from_value(&items[1])?,
        )),
        _ => None,
    }
}

/// Decimal from a JSON string or number.
pub(crate) fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// HTTP client shared by the catalog and CLOB clients.
pub(crate) fn http_client(timeout_ms: u64) -> Result<reqwest::Client, MarketError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .connect_timeout(Duration::from_millis(timeout_ms.min(5_000)))
        .tcp_nodelay(true)
        .pool_idle_timeout(Duration::from_secs(90))
        .build()?)
}

/// Parse a base URL so that relative joins append to its path.
pub(crate) fn base_url_with_slash(raw: &str) -> Result<Url, MarketError> {
    let trimmed = raw.trim_end_matches('/');
    Ok(Url::parse(&format!("{}/", trimmed))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn response(value: Value) -> OrderBookResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn converts_string_levels_and_sorts() {
        let book = convert_order_book(
            "tok",
            response(json!({
                "bids": [{"price": "0.40", "size": "10"}, {"price": "0.42", "size": "5"}],
                "asks": [{"price": "0.47", "size": "3"}, {"price": "0.45", "size": "8"}],
            })),
        )
        .unwrap();

        assert_eq!(book.asset_id, "tok");
        assert_eq!(book.bids[0].price, dec!(0.42));
        assert_eq!(book.asks[0].price, dec!(0.45));
        assert_eq!(book.best_bid(), Some(dec!(0.42)));
        assert_eq!(book.best_ask(), Some(dec!(0.45)));
    }

    #[test]
    fn accepts_array_and_numeric_levels() {
        let book = convert_order_book(
            "tok",
            response(json!({
                "bids": [[0.4, 12]],
                "asks": [{"price": 0.5, "volume": "7"}],
            })),
        )
        .unwrap();

        assert_eq!(book.bids, vec![PriceLevel::new(dec!(0.4), dec!(12))]);
        assert_eq!(book.asks, vec![PriceLevel::new(dec!(0.5), dec!(7))]);
    }

    #[test]
    fn drops_empty_and_malformed_levels() {
        let book = convert_order_book(
            "tok",
            response(json!({
                "bids": [{"price": "0.40", "size": "0"}, {"price": "abc", "size": "1"}, "junk"],
                "asks": [{"price": "0", "size": "5"}, {"price": "0.6", "size": "2"}],
            })),
        )
        .unwrap();

        assert!(book.bids.is_empty());
        assert_eq!(book.asks.len(), 1);
    }

    #[test]
    fn missing_sides_are_empty() {
        let book = convert_order_book("tok", response(json!({}))).unwrap();

        assert!(book.bids.is_empty());
        assert!(book.asks.is_empty());
    }

    #[test]
    fn error_payload_is_api_error() {
        let err = convert_order_book(
            "tok",
            response(json!({"error": "No orderbook exists for the requested token id"})),
        )
        .unwrap_err();

        assert!(matches!(err, MarketError::ApiError { .. }));

        let ok = convert_order_book("tok", response(json!({"error": null, "bids": []})));
        assert!(ok.is_ok());
    }

    #[test]
    fn decimal_from_value_handles_strings_and_numbers() {
        assert_eq!(decimal_from_value(&json!("0.53")), Some(dec!(0.53)));
        assert_eq!(decimal_from_value(&json!(0.25)), Some(dec!(0.25)));
        assert_eq!(decimal_from_value(&json!(null)), None);
        assert_eq!(decimal_from_value(&json!("n/a")), None);
    }

    #[test]
    fn quote_pair_uses_market_labels() {
        let market = Market {
            outcomes: vec!["Over".to_string(), "Under".to_string()],
            clob_token_ids: vec!["y".to_string(), "n".to_string()],
            ..Market::default()
        };

        let pair = quote_pair(&market, "y", "n", (dec!(0.45), dec!(0.5)), (dec!(0.44), dec!(0.49)));

        assert_eq!(pair.buy.outcome_yes, "Over");
        assert_eq!(pair.sell.outcome_no, "Under");
        assert_eq!(pair.buy.sum(), dec!(0.95));
        assert_eq!(pair.sell.price_yes, dec!(0.44));
    }

    #[test]
    fn base_url_joins_relative_paths() {
        let base = base_url_with_slash("https://clob.polymarket.com").unwrap();
        assert_eq!(base.join("book").unwrap().as_str(), "https://clob.polymarket.com/book");

        let nested = base_url_with_slash("http://localhost:9000/api/").unwrap();
        assert_eq!(nested.join("price").unwrap().as_str(), "http://localhost:9000/api/price");
    }
}
