//! Application configuration loaded from environment variables.
//!
//! Every tunable of the detector, estimator, projector, and extraction loop
//! lives here with its default. Components never read globals: callers pass
//! the relevant slice (`detector()`, `projector()`, ...) into each call.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::ConfigError;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Detection ===
    /// Minimum profit margin to report an opportunity (0.03 = 3%).
    #[serde(default = "default_min_profit")]
    pub min_profit_threshold: Decimal,

    /// Threshold for |VWAP_yes + VWAP_no - 1| diagnostics.
    #[serde(default = "default_price_deviation")]
    pub price_deviation_threshold: Decimal,

    /// Use order-book best bid/ask instead of catalog prices.
    #[serde(default = "default_true")]
    pub use_order_book: bool,

    // === Sizing ===
    /// Fraction of hedgeable depth to size to without moving the book.
    #[serde(default = "default_liquidity_pct_cap")]
    pub liquidity_pct_cap: Decimal,

    /// Optional hard cap on position size (shares per leg).
    #[serde(default)]
    pub max_position_size: Option<Decimal>,

    // === Projection ===
    /// Box epsilon keeping every price inside (eps, 1 - eps).
    #[serde(default = "default_projector_epsilon")]
    pub projector_epsilon: f64,

    /// Constraint residual tolerance for the projector.
    #[serde(default = "default_projector_tolerance")]
    pub projector_tolerance: f64,

    /// Projector iteration cap.
    #[serde(default = "default_projector_max_iterations")]
    pub projector_max_iterations: usize,

    // === Extraction ===
    /// Per-step extraction fraction (alpha).
    #[serde(default = "default_extraction_alpha")]
    pub extraction_alpha: f64,

    /// Initial contraction toward the interior point.
    #[serde(default = "default_extraction_initial_epsilon")]
    pub extraction_initial_epsilon: f64,

    /// Frank-Wolfe gap at which the loop stops.
    #[serde(default = "default_extraction_convergence")]
    pub extraction_convergence_threshold: f64,

    /// Extraction iteration cap.
    #[serde(default = "default_extraction_max_iterations")]
    pub extraction_max_iterations: usize,

    // === Collaborators ===
    /// Gamma (catalog) API base URL.
    #[serde(default = "default_gamma_url")]
    pub gamma_api_url: String,

    /// CLOB API base URL.
    #[serde(default = "default_clob_url")]
    pub clob_api_url: String,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Number of events requested per scan.
    #[serde(default = "default_scan_limit")]
    pub scan_limit: usize,

    /// Concurrent order book fetches during a scan.
    #[serde(default = "default_book_fetch_concurrency")]
    pub book_fetch_concurrency: usize,

    /// Concurrent projection solves.
    #[serde(default = "default_solver_workers")]
    pub solver_workers: usize,

    // === Server Configuration ===
    /// HTTP server port for health/metrics endpoints.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

/// Parameters of the single-condition detector.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    /// Minimum profit margin to emit an opportunity.
    pub min_profit: Decimal,
    /// VWAP deviation threshold for diagnostics.
    pub price_deviation_threshold: Decimal,
    /// Prefer order-book-derived prices.
    pub use_order_book: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_profit: default_min_profit(),
            price_deviation_threshold: default_price_deviation(),
            use_order_book: true,
        }
    }
}

/// Parameters of the depth-aware profit estimator.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorConfig {
    /// Fraction of hedgeable depth considered safe to take.
    pub liquidity_pct_cap: Decimal,
    /// Optional caller cap on size per leg.
    pub max_size: Option<Decimal>,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            liquidity_pct_cap: default_liquidity_pct_cap(),
            max_size: None,
        }
    }
}

/// Parameters of the Bregman projector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectorConfig {
    /// Box epsilon.
    pub epsilon: f64,
    /// Residual tolerance.
    pub tolerance: f64,
    /// Iteration cap.
    pub max_iterations: usize,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            epsilon: default_projector_epsilon(),
            tolerance: default_projector_tolerance(),
            max_iterations: default_projector_max_iterations(),
        }
    }
}

/// Parameters of the bounded conditional-gradient extraction loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractionConfig {
    /// Upper bound on the step size.
    pub alpha: f64,
    /// Initial contraction toward the interior point.
    pub initial_epsilon: f64,
    /// Gap threshold.
    pub convergence_threshold: f64,
    /// Iteration cap.
    pub max_iterations: usize,
    /// Box epsilon used when evaluating the divergence.
    pub box_epsilon: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            alpha: default_extraction_alpha(),
            initial_epsilon: default_extraction_initial_epsilon(),
            convergence_threshold: default_extraction_convergence(),
            max_iterations: default_extraction_max_iterations(),
            box_epsilon: default_projector_epsilon(),
        }
    }
}

fn default_min_profit() -> Decimal {
    Decimal::new(3, 2) // 0.03
}

fn default_price_deviation() -> Decimal {
    Decimal::new(2, 2) // 0.02
}

fn default_liquidity_pct_cap() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

fn default_true() -> bool {
    true
}

fn default_projector_epsilon() -> f64 {
    1e-6
}

fn default_projector_tolerance() -> f64 {
    1e-9
}

fn default_projector_max_iterations() -> usize {
    500
}

fn default_extraction_alpha() -> f64 {
    0.9
}

fn default_extraction_initial_epsilon() -> f64 {
    0.1
}

fn default_extraction_convergence() -> f64 {
    1e-6
}

fn default_extraction_max_iterations() -> usize {
    150
}

fn default_gamma_url() -> String {
    "https://gamma-api.polymarket.com".to_string()
}

fn default_clob_url() -> String {
    "https://clob.polymarket.com".to_string()
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

fn default_scan_limit() -> usize {
    50
}

fn default_book_fetch_concurrency() -> usize {
    8
}

fn default_solver_workers() -> usize {
    2
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_profit_threshold: default_min_profit(),
            price_deviation_threshold: default_price_deviation(),
            use_order_book: true,
            liquidity_pct_cap: default_liquidity_pct_cap(),
            max_position_size: None,
            projector_epsilon: default_projector_epsilon(),
            projector_tolerance: default_projector_tolerance(),
            projector_max_iterations: default_projector_max_iterations(),
            extraction_alpha: default_extraction_alpha(),
            extraction_initial_epsilon: default_extraction_initial_epsilon(),
            extraction_convergence_threshold: default_extraction_convergence(),
            extraction_max_iterations: default_extraction_max_iterations(),
            gamma_api_url: default_gamma_url(),
            clob_api_url: default_clob_url(),
            http_timeout_ms: default_http_timeout_ms(),
            scan_limit: default_scan_limit(),
            book_fetch_concurrency: default_book_fetch_concurrency(),
            solver_workers: default_solver_workers(),
            port: default_port(),
            rust_log: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check that every parameter is in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_profit_threshold < Decimal::ZERO {
            return Err(out_of_range(
                "MIN_PROFIT_THRESHOLD",
                self.min_profit_threshold,
                ">= 0",
            ));
        }

        if self.price_deviation_threshold < Decimal::ZERO {
            return Err(out_of_range(
                "PRICE_DEVIATION_THRESHOLD",
                self.price_deviation_threshold,
                ">= 0",
            ));
        }

        if self.liquidity_pct_cap <= Decimal::ZERO || self.liquidity_pct_cap > Decimal::ONE {
            return Err(out_of_range(
                "LIQUIDITY_PCT_CAP",
                self.liquidity_pct_cap,
                "in (0, 1]",
            ));
        }

        if let Some(max) = self.max_position_size {
            if max < Decimal::ZERO {
                return Err(out_of_range("MAX_POSITION_SIZE", max, ">= 0"));
            }
        }

        if !(self.projector_epsilon > 0.0 && self.projector_epsilon < 0.5) {
            return Err(out_of_range(
                "PROJECTOR_EPSILON",
                self.projector_epsilon,
                "in (0, 0.5)",
            ));
        }

        if self.projector_tolerance <= 0.0 {
            return Err(out_of_range(
                "PROJECTOR_TOLERANCE",
                self.projector_tolerance,
                "> 0",
            ));
        }

        if !(self.extraction_alpha > 0.0 && self.extraction_alpha <= 1.0) {
            return Err(out_of_range(
                "EXTRACTION_ALPHA",
                self.extraction_alpha,
                "in (0, 1]",
            ));
        }

        if !(self.extraction_initial_epsilon >= 0.0 && self.extraction_initial_epsilon < 1.0) {
            return Err(out_of_range(
                "EXTRACTION_INITIAL_EPSILON",
                self.extraction_initial_epsilon,
                "in [0, 1)",
            ));
        }

        if self.extraction_convergence_threshold <= 0.0 {
            return Err(out_of_range(
                "EXTRACTION_CONVERGENCE_THRESHOLD",
                self.extraction_convergence_threshold,
                "> 0",
            ));
        }

        let counts = [
            ("PROJECTOR_MAX_ITERATIONS", self.projector_max_iterations),
            ("EXTRACTION_MAX_ITERATIONS", self.extraction_max_iterations),
            ("SCAN_LIMIT", self.scan_limit),
            ("BOOK_FETCH_CONCURRENCY", self.book_fetch_concurrency),
            ("SOLVER_WORKERS", self.solver_workers),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(out_of_range(name, value, ">= 1"));
            }
        }

        Ok(())
    }

    /// Detector parameters.
    pub fn detector(&self) -> DetectorConfig {
        DetectorConfig {
            min_profit: self.min_profit_threshold,
            price_deviation_threshold: self.price_deviation_threshold,
            use_order_book: self.use_order_book,
        }
    }

    /// Estimator parameters.
    pub fn estimator(&self) -> EstimatorConfig {
        EstimatorConfig {
            liquidity_pct_cap: self.liquidity_pct_cap,
            max_size: self.max_position_size,
        }
    }

    /// Projector parameters.
    pub fn projector(&self) -> ProjectorConfig {
        ProjectorConfig {
            epsilon: self.projector_epsilon,
            tolerance: self.projector_tolerance,
            max_iterations: self.projector_max_iterations,
        }
    }

    /// Extraction loop parameters.
    pub fn extraction(&self) -> ExtractionConfig {
        ExtractionConfig {
            alpha: self.extraction_alpha,
            initial_epsilon: self.extraction_initial_epsilon,
            convergence_threshold: self.extraction_convergence_threshold,
            max_iterations: self.extraction_max_iterations,
            box_epsilon: self.projector_epsilon,
        }
    }
}

fn out_of_range(
    name: &'static str,
    value: impl std::fmt::Display,
    expected: &'static str,
) -> ConfigError {
    ConfigError::OutOfRange {
        name,
        value: value.to_string(),
        expected,
    }
}
