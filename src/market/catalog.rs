//! Gamma API client for market discovery.
//!
//! Markets are listed through `/events`: each event carries its markets, and
//! the event supplies the slug and end date when a market omits them.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, info, instrument};
use url::Url;

use super::client::{base_url_with_slash, decimal_from_value, http_client};
use super::types::Market;
use crate::config::Config;
use crate::error::MarketError;

/// Source of active markets.
#[async_trait]
pub trait MarketCatalog: Send + Sync {
    /// Markets from up to `limit` active, unclosed events.
    async fn fetch_active_markets(&self, limit: usize) -> Result<Vec<Market>, MarketError>;
}

/// Filters for an `/events` request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventQuery {
    /// Maximum events to return.
    pub limit: usize,
    /// Events to skip.
    pub offset: usize,
    /// Earliest resolution date (ISO 8601).
    pub end_date_min: Option<String>,
    /// Latest resolution date (ISO 8601).
    pub end_date_max: Option<String>,
}

impl EventQuery {
    /// Active events, first page.
    pub fn active(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("active", "true".to_string()),
            ("closed", "false".to_string()),
            ("limit", self.limit.to_string()),
            ("offset", self.offset.to_string()),
        ];
        if let Some(min) = &self.end_date_min {
            params.push(("end_date_min", min.clone()));
        }
        if let Some(max) = &self.end_date_max {
            params.push(("end_date_max", max.clone()));
        }
        params
    }
}

/// Polymarket Gamma API client.
#[derive(Debug, Clone)]
pub struct GammaClient {
    http: reqwest::Client,
    base_url: Url,
}

impl GammaClient {
    /// Create a client from config.
    pub fn new(config: &Config) -> Result<Self, MarketError> {
        let http = http_client(config.http_timeout_ms)?;
        Self::with_http(http, &config.gamma_api_url)
    }

    /// Create a client around an existing HTTP client.
    pub fn with_http(http: reqwest::Client, base_url: &str) -> Result<Self, MarketError> {
        Ok(Self {
            http,
            base_url: base_url_with_slash(base_url)?,
        })
    }

    /// Raw event payloads.
    #[instrument(skip(self))]
    pub async fn get_events(&self, query: &EventQuery) -> Result<Vec<Value>, MarketError> {
        let url = self.base_url.join("events")?;

        let response = self
            .http
            .get(url)
            .query(&query.params())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MarketError::FetchFailed {
                resource: "events".to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let body: Value = response.json().await.map_err(|e| {
            MarketError::ParseError(format!("Failed to parse events: {}", e))
        })?;

        match body {
            Value::Array(events) => Ok(events),
            other => Err(MarketError::ParseError(format!(
                "Expected an array of events, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Markets from events matching `query`.
    pub async fn fetch_markets(&self, query: &EventQuery) -> Result<Vec<Market>, MarketError> {
        let events = self.get_events(query).await?;
        let markets: Vec<Market> = events.iter().flat_map(markets_from_event).collect();

        info!(
            events = events.len(),
            markets = markets.len(),
            "Fetched markets from catalog"
        );
        Ok(markets)
    }
}

#[async_trait]
impl MarketCatalog for GammaClient {
    async fn fetch_active_markets(&self, limit: usize) -> Result<Vec<Market>, MarketError> {
        self.fetch_markets(&EventQuery::active(limit)).await
    }
}

/// All markets listed under one event payload.
pub fn markets_from_event(event: &Value) -> Vec<Market> {
    event
        .get("markets")
        .and_then(Value::as_array)
        .map(|markets| {
            markets
                .iter()
                .map(|raw| market_from_raw(raw, Some(event)))
                .collect()
        })
        .unwrap_or_default()
}

/// Convert a raw market payload, using `event` for missing slug and end date.
///
/// List fields may arrive as JSON arrays or as JSON-encoded strings. Absent or
/// unparseable outcomes default to `["Yes", "No"]` and prices to `[0.5, 0.5]`.
pub fn market_from_raw(raw: &Value, event: Option<&Value>) -> Market {
    let event_slug = event
        .and_then(|e| string_field(e, &["slug"]))
        .unwrap_or_default();
    let slug = string_field(raw, &["slug"]).unwrap_or_else(|| event_slug.clone());

    let end_date = string_field(raw, &["endDate", "end_date", "endDateIso"])
        .or_else(|| event.and_then(|e| string_field(e, &["endDate", "end_date"])))
        .unwrap_or_default();

    let outcomes = json_list(raw.get("outcomes"))
        .and_then(|items| items.iter().map(value_to_string).collect::<Option<Vec<_>>>())
        .unwrap_or_else(|| vec!["Yes".to_string(), "No".to_string()]);

    let outcome_prices = json_list(raw.get("outcomePrices"))
        .and_then(|items| items.iter().map(decimal_from_value).collect::<Option<Vec<_>>>())
        .unwrap_or_else(|| vec![Decimal::new(5, 1), Decimal::new(5, 1)]);

    let clob_token_ids = first_present(raw, &["clobTokenIds", "clob_token_ids"])
        .map(|value| match parse_json_field(value) {
            Value::Array(items) => items.iter().filter_map(value_to_string).collect(),
            Value::String(s) if !s.is_empty() => vec![s],
            _ => vec![],
        })
        .unwrap_or_default();

    let market = Market {
        id: string_field(raw, &["id", "conditionId"]).unwrap_or_default(),
        question: string_field(raw, &["question"]).unwrap_or_default(),
        slug,
        event_slug,
        condition_id: string_field(raw, &["conditionId", "condition_id", "id"])
            .unwrap_or_default(),
        end_date,
        outcomes,
        outcome_prices,
        clob_token_ids,
    };

    debug!(slug = %market.slug, binary = market.is_binary(), "Parsed market");
    market
}

/// Decode a JSON-encoded string; anything else passes through.
fn parse_json_field(value: &Value) -> Value {
    match value {
        Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| value.clone()),
        other => other.clone(),
    }
}

fn json_list(value: Option<&Value>) -> Option<Vec<Value>> {
    match parse_json_field(value?) {
        Value::Array(items) => Some(items),
        _ => None,
    }
}

fn first_present<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .find(|value| !value.is_null() && value.as_str() != Some(""))
}

fn string_field(raw: &Value, keys: &[&str]) -> Option<String> {
    first_present(raw, keys).and_then(value_to_string)
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn parses_json_encoded_list_fields() {
        let raw = json!({
            "id": "512",
            "question": "Will it rain?",
            "slug": "will-it-rain",
            "conditionId": "0xabc",
            "endDate": "2026-12-31T00:00:00Z",
            "outcomes": "[\"Yes\", \"No\"]",
            "outcomePrices": "[\"0.45\", \"0.50\"]",
            "clobTokenIds": "[\"111\", \"222\"]",
        });

        let market = market_from_raw(&raw, None);

        assert_eq!(market.id, "512");
        assert_eq!(market.condition_id, "0xabc");
        assert_eq!(market.outcomes, vec!["Yes", "No"]);
        assert_eq!(market.outcome_prices, vec![dec!(0.45), dec!(0.50)]);
        assert_eq!(market.clob_token_ids, vec!["111", "222"]);
        assert!(market.is_binary());
    }

    #[test]
    fn accepts_plain_arrays() {
        let raw = json!({
            "id": 7,
            "outcomes": ["Over", "Under"],
            "outcomePrices": [0.6, 0.4],
            "clobTokenIds": ["a", "b"],
        });

        let market = market_from_raw(&raw, None);

        assert_eq!(market.id, "7");
        assert_eq!(market.outcomes, vec!["Over", "Under"]);
        assert_eq!(market.outcome_prices, vec![dec!(0.6), dec!(0.4)]);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let market = market_from_raw(&json!({"conditionId": "0xdef"}), None);

        assert_eq!(market.id, "0xdef");
        assert_eq!(market.outcomes, vec!["Yes", "No"]);
        assert_eq!(market.outcome_prices, vec![dec!(0.5), dec!(0.5)]);
        assert!(market.clob_token_ids.is_empty());
        assert!(!market.is_binary());
        assert_eq!(market.end_date, "");
    }

    #[test]
    fn event_supplies_slug_and_end_date() {
        let event = json!({
            "slug": "election",
            "endDate": "2026-11-03T12:00:00Z",
            "markets": [
                {"id": "1", "clobTokenIds": "[\"y1\", \"n1\"]"},
                {"id": "2", "slug": "own-slug", "endDateIso": "2026-11-04"},
            ],
        });

        let markets = markets_from_event(&event);

        assert_eq!(markets.len(), 2);
        assert_eq!(markets[0].event_slug, "election");
        assert_eq!(markets[0].slug, "election");
        assert_eq!(markets[0].end_date, "2026-11-03T12:00:00Z");
        assert_eq!(markets[1].slug, "own-slug");
        assert_eq!(markets[1].end_date, "2026-11-04");
    }

    #[test]
    fn event_without_markets_yields_nothing() {
        assert!(markets_from_event(&json!({"slug": "empty"})).is_empty());
    }

    #[test]
    fn malformed_prices_fall_back_to_even_odds() {
        let raw = json!({"id": "1", "outcomePrices": "[\"abc\", \"0.5\"]"});
        let market = market_from_raw(&raw, None);

        assert_eq!(market.outcome_prices, vec![dec!(0.5), dec!(0.5)]);
    }

    #[test]
    fn single_token_string_is_not_binary() {
        let raw = json!({"id": "1", "clobTokenIds": "lonely"});
        let market = market_from_raw(&raw, None);

        assert_eq!(market.clob_token_ids, vec!["lonely"]);
        assert!(!market.is_binary());
    }

    #[test]
    fn event_query_params() {
        let query = EventQuery {
            end_date_max: Some("2026-12-31".to_string()),
            ..EventQuery::active(25)
        };
        let params = query.params();

        assert!(params.contains(&("limit", "25".to_string())));
        assert!(params.contains(&("closed", "false".to_string())));
        assert!(params.contains(&("end_date_max", "2026-12-31".to_string())));
        assert!(!params.iter().any(|(k, _)| *k == "end_date_min"));
    }
}
