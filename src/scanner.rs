//! Scan pipeline: catalog → order books → detection → sizing.
//!
//! Order book fetches run through a bounded stream; a failed fetch only costs
//! its own market its book, never the rest of the scan.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use strum::{Display, EnumString};
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use crate::arbitrage::{
    detect, diagnose_price_deviation, estimate_profit, ArbitrageOpportunity, PriceDeviation,
    PricePair, ProfitEstimate,
};
use crate::config::{Config, DetectorConfig, EstimatorConfig};
use crate::error::MarketError;
use crate::market::{EnrichedMarket, Market, MarketCatalog, OrderBookSource, Outcome};
use crate::metrics;
use crate::orderbook::OrderBook;
use crate::solver::{LinearConstraints, SolverPool};

/// Where a scan takes its prices from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PriceMode {
    /// Best bid/ask from fetched order books.
    #[default]
    Book,
    /// Explicit `/price` quotes, with books fetched for sizing.
    Clob,
    /// Catalog prices only; nothing is fetched per market.
    Raw,
}

/// Scan parameters.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Events to request from the catalog.
    pub limit: usize,
    /// Price source.
    pub mode: PriceMode,
    /// Detector parameters.
    pub detector: DetectorConfig,
    /// Estimator parameters.
    pub estimator: EstimatorConfig,
    /// Order book fetches in flight at once.
    pub book_fetch_concurrency: usize,
}

impl ScanOptions {
    /// Options from config.
    pub fn from_config(config: &Config) -> Self {
        let mode = if config.use_order_book {
            PriceMode::Book
        } else {
            PriceMode::Raw
        };

        Self {
            limit: config.scan_limit,
            mode,
            detector: config.detector(),
            estimator: config.estimator(),
            book_fetch_concurrency: config.book_fetch_concurrency,
        }
    }

    /// Override the price mode.
    pub fn with_mode(mut self, mode: PriceMode) -> Self {
        self.mode = mode;
        self.detector.use_order_book = mode != PriceMode::Raw;
        self
    }

    /// Override the detector threshold.
    pub fn with_min_profit(mut self, min_profit: Decimal) -> Self {
        self.detector.min_profit = min_profit;
        self
    }

    /// Override the catalog limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Consistent prices for a pair, from the KL projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FairValue {
    /// Projected YES price.
    pub yes: f64,
    /// Projected NO price.
    pub no: f64,
    /// `D(mu || theta)` from the observed prices.
    pub divergence: f64,
}

/// One detected opportunity with its sizing.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOpportunity {
    /// Detection record.
    pub opportunity: ArbitrageOpportunity,
    /// Depth-aware sizing, `None` without both books.
    pub estimate: Option<ProfitEstimate>,
    /// VWAP check at the recommended size.
    pub deviation: Option<PriceDeviation>,
    /// Projected consistent prices, when a solver pool is attached.
    pub fair_value: Option<FairValue>,
}

/// Outcome of one scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    /// When the scan started.
    pub started_at: OffsetDateTime,
    /// Wall time in milliseconds.
    pub elapsed_ms: f64,
    /// Price source used.
    pub mode: PriceMode,
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
    /// Opportunities, largest margin first.
    pub opportunities: Vec<ScanOpportunity>,
}

/// Runs scans against a catalog and an order book source.
#[derive(Clone)]
pub struct Scanner {
    catalog: Arc<dyn MarketCatalog>,
    books: Arc<dyn OrderBookSource>,
    solver: Option<SolverPool>,
    options: ScanOptions,
}

impl Scanner {
    /// Create a scanner.
    pub fn new(
        catalog: Arc<dyn MarketCatalog>,
        books: Arc<dyn OrderBookSource>,
        options: ScanOptions,
    ) -> Self {
        Self {
            catalog,
            books,
            solver: None,
            options,
        }
    }

    /// Project each opportunity's prices onto consistent ones.
    pub fn with_solver(mut self, solver: SolverPool) -> Self {
        self.solver = Some(solver);
        self
    }

    /// Current options.
    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Run one scan.
    ///
    /// Only a catalog failure fails the scan; book and quote failures are
    /// logged, counted, and leave the affected market without that input.
    #[instrument(skip(self), fields(limit = self.options.limit, mode = %self.options.mode))]
    pub async fn scan(&self) -> Result<ScanReport, MarketError> {
        let _timer = metrics::timer_scan();
        let started = Instant::now();
        let started_at = OffsetDateTime::now_utc();

        let markets = self
            .catalog
            .fetch_active_markets(self.options.limit)
            .await?;
        let markets_fetched = markets.len();

        let binary: Vec<Market> = markets.into_iter().filter(Market::is_binary).collect();
        let binary_markets = binary.len();
        metrics::inc_markets_scanned(binary_markets as u64);
        info!(
            fetched = markets_fetched,
            binary = binary_markets,
            "Scanning binary markets"
        );

        let (books, book_failures) = match self.options.mode {
            PriceMode::Raw => (HashMap::new(), 0),
            PriceMode::Book | PriceMode::Clob => self.fetch_books(&binary).await,
        };
        let books_fetched = books.len();

        let (quotes, quote_failures) = match self.options.mode {
            PriceMode::Clob => self.fetch_quotes(&binary).await,
            PriceMode::Book | PriceMode::Raw => (HashMap::new(), 0),
        };

        let mut opportunities = Vec::new();
        for market in binary {
            let explicit = quotes.get(&market.id).cloned();
            let yes = leg_book(&books, &market, Outcome::Yes);
            let no = leg_book(&books, &market, Outcome::No);
            let enriched = market.enrich(yes, no);

            opportunities.extend(self.evaluate(&enriched, explicit));
        }

        // Stable: equal margins keep catalog order.
        opportunities.sort_by(|a, b| {
            b.opportunity
                .profit_margin
                .cmp(&a.opportunity.profit_margin)
        });

        if let Some(solver) = &self.solver {
            attach_fair_values(solver, &mut opportunities).await;
        }

        let report = ScanReport {
            started_at,
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
            mode: self.options.mode,
            markets_fetched,
            binary_markets,
            books_fetched,
            book_failures,
            quote_failures,
            opportunities,
        };

        info!(
            opportunities = report.opportunities.len(),
            books = report.books_fetched,
            book_failures = report.book_failures,
            elapsed_ms = report.elapsed_ms,
            "Scan complete"
        );
        Ok(report)
    }

    /// Detect and size opportunities for one enriched market.
    pub fn evaluate(
        &self,
        market: &EnrichedMarket,
        explicit: Option<PricePair>,
    ) -> Vec<ScanOpportunity> {
        detect(market, explicit, &self.options.detector)
            .into_iter()
            .map(|opportunity| {
                let estimate = estimate_profit(&opportunity, &self.options.estimator);
                let deviation = estimate
                    .as_ref()
                    .filter(|e| e.recommended_size > Decimal::ZERO)
                    .and_then(|e| {
                        diagnose_price_deviation(
                            market,
                            e.recommended_size,
                            self.options.detector.price_deviation_threshold,
                        )
                    });

                ScanOpportunity {
                    opportunity,
                    estimate,
                    deviation,
                    fair_value: None,
                }
            })
            .collect()
    }

    /// Fetch every distinct leg's book, at most `book_fetch_concurrency` at once.
    async fn fetch_books(&self, markets: &[Market]) -> (HashMap<String, OrderBook>, usize) {
        let mut seen = HashSet::new();
        let tokens: Vec<String> = markets
            .iter()
            .flat_map(|m| m.clob_token_ids.iter().take(2))
            .filter(|t| seen.insert(t.as_str()))
            .cloned()
            .collect();

        let results: Vec<(String, Result<OrderBook, MarketError>)> = stream::iter(tokens)
            .map(|token| {
                let books = Arc::clone(&self.books);
                async move {
                    let result = books.get_order_book(&token).await;
                    (token, result)
                }
            })
            .buffer_unordered(self.options.book_fetch_concurrency.max(1))
            .collect()
            .await;

        let mut books = HashMap::with_capacity(results.len());
        let mut failures = 0;
        for (token, result) in results {
            match result {
                Ok(book) => {
                    metrics::inc_books_fetched();
                    books.insert(token, book);
                }
                Err(e) => {
                    metrics::inc_book_fetch_failures();
                    warn!(token_id = %token, error = %e, "Order book fetch failed");
                    failures += 1;
                }
            }
        }

        debug!(fetched = books.len(), failures, "Order books fetched");
        (books, failures)
    }

    /// Fetch explicit quotes per market, at most `book_fetch_concurrency` markets at once.
    async fn fetch_quotes(&self, markets: &[Market]) -> (HashMap<String, PricePair>, usize) {
        let results: Vec<(String, Result<Option<PricePair>, MarketError>)> =
            stream::iter(markets.iter().cloned())
                .map(|market| {
                    let books = Arc::clone(&self.books);
                    async move {
                        let result = books.get_price_pair(&market).await;
                        (market.id, result)
                    }
                })
                .buffer_unordered(self.options.book_fetch_concurrency.max(1))
                .collect()
                .await;

        let mut quotes = HashMap::new();
        let mut failures = 0;
        for (market_id, result) in results {
            match result {
                Ok(Some(pair)) => {
                    quotes.insert(market_id, pair);
                }
                Ok(None) => debug!(market_id = %market_id, "No explicit quotes"),
                Err(e) => {
                    warn!(market_id = %market_id, error = %e, "Quote fetch failed");
                    failures += 1;
                }
            }
        }

        (quotes, failures)
    }
}

fn leg_book(
    books: &HashMap<String, OrderBook>,
    market: &Market,
    outcome: Outcome,
) -> Option<OrderBook> {
    market
        .token_id(outcome)
        .and_then(|token| books.get(token))
        .cloned()
}

/// Project each opportunity's triggering prices onto the complementary-pair
/// constraint. Failures leave `fair_value` empty.
async fn attach_fair_values(solver: &SolverPool, opportunities: &mut [ScanOpportunity]) {
    let projections = futures::future::join_all(opportunities.iter().map(|scored| {
        let theta = vec![
            scored.opportunity.price_yes.to_f64().unwrap_or(0.0),
            scored.opportunity.price_no.to_f64().unwrap_or(0.0),
        ];
        solver.project(theta, LinearConstraints::complementary_pairs(1))
    }))
    .await;

    for (scored, projection) in opportunities.iter_mut().zip(projections) {
        match projection {
            Ok(p) if p.success => {
                scored.fair_value = Some(FairValue {
                    yes: p.mu[0],
                    no: p.mu[1],
                    divergence: p.divergence,
                });
            }
            Ok(p) => {
                debug!(market = %scored.opportunity.slug, residual = p.residual, "Projection did not converge");
            }
            Err(e) => {
                warn!(market = %scored.opportunity.slug, error = %e, "Projection failed");
            }
        }
    }
}
