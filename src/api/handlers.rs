//! HTTP API handlers.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use utoipa::{OpenApi, ToSchema};

use crate::metrics;
use crate::scanner::{ScanOpportunity, ScanReport};

/// Polymarket event page base URL.
const POLYMARKET_EVENT_URL: &str = "https://polymarket.com/event";

/// Application state shared with handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Whether at least one scan has completed.
    pub ready: Arc<AtomicBool>,
    /// Completed scans.
    pub scans_completed: Arc<AtomicU64>,
    /// Summary of the last completed scan.
    pub last_scan: Arc<tokio::sync::RwLock<Option<ScanSummary>>>,
    /// Opportunities from the last scan, keyed by `market_id:direction`.
    pub opportunities: Arc<DashMap<String, OpportunityView>>,
}

impl AppState {
    /// Create new app state.
    pub fn new() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
            scans_completed: Arc::new(AtomicU64::new(0)),
            last_scan: Arc::new(tokio::sync::RwLock::new(None)),
            opportunities: Arc::new(DashMap::new()),
        }
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Replace the published view with `report` and mark ready.
    ///
    /// New entries are inserted before stale ones are dropped, so readers
    /// never see an empty set mid-refresh.
    pub async fn record_scan(&self, report: &ScanReport) {
        let fresh: HashSet<String> = report
            .opportunities
            .iter()
            .map(|scored| {
                let view = OpportunityView::from(scored);
                let key = format!("{}:{}", view.market_id, view.direction);
                self.opportunities.insert(key.clone(), view);
                key
            })
            .collect();
        self.opportunities.retain(|key, _| fresh.contains(key));

        *self.last_scan.write().await = Some(ScanSummary::from(report));
        self.scans_completed.fetch_add(1, Ordering::SeqCst);
        self.set_ready(true);
    }

    /// Published opportunities, largest margin first.
    pub fn opportunities(&self) -> Vec<OpportunityView> {
        let mut views: Vec<OpportunityView> = self
            .opportunities
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        views.sort_by(|a, b| {
            b.profit_margin
                .cmp(&a.profit_margin)
                .then_with(|| a.market_id.cmp(&b.market_id))
        });
        views
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Whether a scan has completed.
    pub ready: bool,
    /// Completed scans.
    pub scans_completed: u64,
}

/// Summary of one scan.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScanSummary {
    /// Scan start (RFC 3339).
    pub started_at: String,
    /// Wall time in milliseconds.
    pub elapsed_ms: f64,
    /// Price source: book, clob or raw.
    pub mode: String,
    /// Markets returned by the catalog.
    pub markets_fetched: usize,
    /// Markets with both token ids.
    pub binary_markets: usize,
    /// Order books fetched.
    pub books_fetched: usize,
    /// Order book fetches that failed.
    pub book_failures: usize,
    /// Quote requests that failed.
    pub quote_failures: usize,
    /// Opportunities found.
    pub opportunities: usize,
}

impl From<&ScanReport> for ScanSummary {
    fn from(report: &ScanReport) -> Self {
        Self {
            started_at: report.started_at.format(&Rfc3339).unwrap_or_default(),
            elapsed_ms: report.elapsed_ms,
            mode: report.mode.to_string(),
            markets_fetched: report.markets_fetched,
            binary_markets: report.binary_markets,
            books_fetched: report.books_fetched,
            book_failures: report.book_failures,
            quote_failures: report.quote_failures,
            opportunities: report.opportunities.len(),
        }
    }
}

/// Status response.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    /// "running" after the first scan, "starting" before.
    pub status: &'static str,
    /// Completed scans.
    pub scans_completed: u64,
    /// Last scan, if any.
    pub last_scan: Option<ScanSummary>,
}

/// One opportunity as served over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct OpportunityView {
    /// Market identifier.
    pub market_id: String,
    /// Market question.
    pub question: String,
    /// Market slug.
    pub slug: String,
    /// Event page URL.
    pub url: String,
    /// Resolution date, empty when unknown.
    pub end_date: String,
    /// buy_both or sell_both.
    pub direction: String,
    /// YES price.
    #[schema(value_type = String)]
    pub price_yes: Decimal,
    /// NO price.
    #[schema(value_type = String)]
    pub price_no: Decimal,
    /// YES + NO.
    #[schema(value_type = String)]
    pub sum_prices: Decimal,
    /// |sum - 1|.
    #[schema(value_type = String)]
    pub profit_margin: Decimal,
    /// Depth-capped dollar profit, absent without books.
    #[schema(value_type = Option<String>)]
    pub max_extractable_usd: Option<Decimal>,
    /// Bundles to size to.
    #[schema(value_type = Option<String>)]
    pub recommended_size: Option<Decimal>,
    /// Profit at the recommended size.
    #[schema(value_type = Option<String>)]
    pub recommended_profit_usd: Option<Decimal>,
    /// Projected consistent YES price.
    pub fair_yes: Option<f64>,
    /// Projected consistent NO price.
    pub fair_no: Option<f64>,
}

impl From<&ScanOpportunity> for OpportunityView {
    fn from(scored: &ScanOpportunity) -> Self {
        let opp = &scored.opportunity;
        let slug = if opp.event_slug.is_empty() {
            &opp.slug
        } else {
            &opp.event_slug
        };

        Self {
            market_id: opp.market_id.clone(),
            question: opp.question.clone(),
            slug: opp.slug.clone(),
            url: format!("{}/{}", POLYMARKET_EVENT_URL, slug),
            end_date: opp.end_date.clone(),
            direction: opp.direction.to_string(),
            price_yes: opp.price_yes,
            price_no: opp.price_no,
            sum_prices: opp.sum_prices,
            profit_margin: opp.profit_margin,
            max_extractable_usd: scored.estimate.as_ref().map(|e| e.max_extractable_usd),
            recommended_size: scored.estimate.as_ref().map(|e| e.recommended_size),
            recommended_profit_usd: scored.estimate.as_ref().map(|e| e.recommended_profit_usd),
            fair_yes: scored.fair_value.map(|f| f.yes),
            fair_no: scored.fair_value.map(|f| f.no),
        }
    }
}

/// OpenAPI document for the status API.
#[derive(OpenApi)]
#[openapi(
    paths(health, ready, status, opportunities),
    components(schemas(
        HealthResponse,
        ReadyResponse,
        StatusResponse,
        ScanSummary,
        OpportunityView
    ))
)]
pub struct ApiDoc;

/// Health check handler - always returns 200.
#[utoipa::path(get, path = "/health", responses((status = 200, body = HealthResponse)))]
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 after the first scan, 503 before.
#[utoipa::path(
    get,
    path = "/ready",
    responses(
        (status = 200, body = ReadyResponse),
        (status = 503, body = ReadyResponse)
    )
)]
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let is_ready = state.is_ready();
    let response = ReadyResponse {
        ready: is_ready,
        scans_completed: state.scans_completed.load(Ordering::SeqCst),
    };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Status handler - returns the last scan summary.
#[utoipa::path(get, path = "/api/v1/status", responses((status = 200, body = StatusResponse)))]
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let last_scan = state.last_scan.read().await.clone();
    let status = if state.is_ready() { "running" } else { "starting" };

    Json(StatusResponse {
        status,
        scans_completed: state.scans_completed.load(Ordering::SeqCst),
        last_scan,
    })
}

/// Opportunities from the last scan, largest margin first.
#[utoipa::path(
    get,
    path = "/api/v1/opportunities",
    responses((status = 200, body = Vec<OpportunityView>))
)]
pub async fn opportunities(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.opportunities())
}

/// Prometheus text exposition.
pub async fn prometheus_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}

/// OpenAPI document as JSON.
pub async fn openapi() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
