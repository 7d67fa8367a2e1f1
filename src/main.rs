//! Binary-condition arbitrage scanner entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use condition_arb::api::{create_router, AppState};
use condition_arb::config::Config;
use condition_arb::market::{ClobClient, GammaClient};
use condition_arb::metrics;
use condition_arb::scanner::{PriceMode, ScanOptions, ScanReport, Scanner};
use condition_arb::solver::{
    BregmanProjector, ExtractionEngine, ExtractionResult, LinearConstraints, Projection, SolverPool,
};
use condition_arb::utils::shutdown_signal;

/// Binary-condition arbitrage scanner.
#[derive(Parser, Debug)]
#[command(name = "condition-arb")]
#[command(about = "Detect and size arbitrage on binary prediction-market conditions")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one scan and print the opportunities found.
    Scan {
        /// Events to request from the catalog.
        #[arg(short, long)]
        limit: Option<usize>,

        /// Minimum profit margin per $1 bundle.
        #[arg(long)]
        min_profit: Option<Decimal>,

        /// Price source: book, clob, or raw.
        #[arg(long, default_value = "book")]
        source: PriceMode,
    },

    /// Project a price vector onto the arbitrage-free set.
    Project {
        /// Comma-separated prices.
        #[arg(long, value_delimiter = ',', required = true, allow_hyphen_values = true)]
        theta: Vec<f64>,

        /// Treat prices as consecutive (yes, no) pairs (default).
        #[arg(long, conflicts_with = "group")]
        pairs: bool,

        /// Treat prices as one mutually exclusive, exhaustive group.
        #[arg(long)]
        group: bool,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Scan periodically and serve results over HTTP.
    Serve {
        /// HTTP server port.
        #[arg(short, long)]
        port: Option<u16>,

        /// Seconds between scans.
        #[arg(long, default_value = "60")]
        interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("condition_arb=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(args.json_logs.then(|| fmt::layer().json()))
        .with((!args.json_logs).then(fmt::layer))
        .with(filter)
        .init();

    match args.command {
        Command::Scan {
            limit,
            min_profit,
            source,
        } => cmd_scan(limit, min_profit, source).await,
        Command::Project {
            theta,
            pairs,
            group,
        } => cmd_project(theta, group && !pairs),
        Command::CheckConfig => cmd_check_config(),
        Command::Serve {
            port,
            interval_secs,
        } => cmd_serve(port, interval_secs).await,
    }
}

/// Load and validate configuration, logging failures.
fn load_config() -> anyhow::Result<Config> {
    let config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    Ok(config)
}

/// Build a scanner over the live Gamma and CLOB APIs.
fn live_scanner(config: &Config, options: ScanOptions) -> anyhow::Result<Scanner> {
    let catalog = Arc::new(GammaClient::new(config)?);
    let books = Arc::new(ClobClient::new(config)?);
    let solver = SolverPool::new(
        config.solver_workers,
        config.projector(),
        config.extraction(),
    );

    Ok(Scanner::new(catalog, books, options).with_solver(solver))
}

/// Run one scan and print the opportunity table.
async fn cmd_scan(
    limit: Option<usize>,
    min_profit: Option<Decimal>,
    source: PriceMode,
) -> anyhow::Result<()> {
    let config = load_config()?;

    let mut options = ScanOptions::from_config(&config).with_mode(source);
    if let Some(limit) = limit {
        options = options.with_limit(limit);
    }
    if let Some(min_profit) = min_profit {
        options = options.with_min_profit(min_profit);
    }

    println!("======================================================================");
    println!("CONDITION ARB - SCAN");
    println!("======================================================================");
    println!("Source: {}", options.mode);
    println!("Limit: {} events", options.limit);
    println!("Min profit: ${}", options.detector.min_profit);

    let scanner = live_scanner(&config, options)?;
    let report = scanner.scan().await?;

    print_report(&report);
    Ok(())
}

fn print_report(report: &ScanReport) {
    println!("----------------------------------------------------------------------");
    println!(
        "Markets: {} fetched, {} binary | Books: {} fetched, {} failed | Quotes failed: {}",
        report.markets_fetched,
        report.binary_markets,
        report.books_fetched,
        report.book_failures,
        report.quote_failures,
    );
    println!("Elapsed: {:.0} ms", report.elapsed_ms);
    println!("----------------------------------------------------------------------");

    if report.opportunities.is_empty() {
        println!("NO OPPORTUNITIES FOUND");
        println!("======================================================================");
        return;
    }

    println!(
        "{:>8}  {:<9}  {:>6}  {:>6}  {:>6}  {:>10}  {:>11}  QUESTION",
        "MARGIN", "DIRECTION", "YES", "NO", "SUM", "MAX $", "FAIR YES"
    );
    for scored in &report.opportunities {
        let opp = &scored.opportunity;
        let max_usd = scored
            .estimate
            .as_ref()
            .map(|e| e.max_extractable_usd.round_dp(2).to_string())
            .unwrap_or_else(|| "-".to_string());
        let fair_yes = scored
            .fair_value
            .as_ref()
            .map(|f| format!("{:.4}", f.yes))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:>8}  {:<9}  {:>6}  {:>6}  {:>6}  {:>10}  {:>11}  {}",
            opp.profit_margin.round_dp(4),
            opp.direction.to_string(),
            opp.price_yes,
            opp.price_no,
            opp.sum_prices,
            max_usd,
            fair_yes,
            truncate(&opp.question, 60),
        );

        if let Some(deviation) = scored.deviation.as_ref().filter(|d| d.exceeds) {
            println!(
                "          VWAP deviation {} at size {} (yes {} / no {})",
                deviation.deviation.round_dp(4),
                deviation.size,
                deviation.vwap_yes.round_dp(4),
                deviation.vwap_no.round_dp(4),
            );
        }
    }

    println!("======================================================================");
    println!("{} OPPORTUNITIES FOUND", report.opportunities.len());
    println!("======================================================================");
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut short: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    short.push_str("...");
    short
}

/// Project a price vector and run the extraction loop against it.
fn cmd_project(theta: Vec<f64>, group: bool) -> anyhow::Result<()> {
    let config = load_config()?;

    let constraints = if group {
        LinearConstraints::exhaustive_group(theta.len())
    } else {
        if theta.len() % 2 != 0 {
            return Err(anyhow::anyhow!(
                "--pairs needs an even number of prices, got {}",
                theta.len()
            ));
        }
        LinearConstraints::complementary_pairs(theta.len() / 2)
    };

    println!("======================================================================");
    println!("CONDITION ARB - PROJECTION");
    println!("======================================================================");
    println!("Constraints: {}", if group { "exhaustive group" } else { "complementary pairs" });
    println!("Theta: {}", format_vector(&theta));
    println!("----------------------------------------------------------------------");

    let projection = BregmanProjector::new(config.projector()).project(&theta, &constraints)?;
    println!("Projection:");
    println!("  Mu: {}", format_vector(&projection.mu));
    println!("  Converged: {}", projection.success);
    println!("  Iterations: {}", projection.iterations);
    println!("  Residual: {:.3e}", projection.residual);
    println!("  KL divergence: {:.6}", projection.divergence);

    let extraction = ExtractionEngine::new(config.extraction()).run(&theta, &constraints)?;
    println!("----------------------------------------------------------------------");
    println!("Extraction:");
    println!("  Mu: {}", format_vector(&extraction.mu));
    println!("  Converged: {}", extraction.converged);
    println!("  Iterations: {}", extraction.iterations);
    println!("  Gap: {:.3e}", extraction.gap);
    println!("  Contraction: {:.3e}", extraction.contraction);
    println!(
        "  KL divergence: {:.6} (from {:.6})",
        extraction.divergence, extraction.initial_divergence
    );
    println!("  {}", progress_line(&projection, &extraction));
    println!("======================================================================");

    Ok(())
}

/// Extraction progress, measured only against a converged projection.
fn progress_line(projection: &Projection, extraction: &ExtractionResult) -> String {
    if projection.success {
        format!(
            "Progress: {:.1}%",
            extraction.progress(projection.divergence) * 100.0
        )
    } else {
        "Progress: unknown (projection did not converge)".to_string()
    }
}

fn format_vector(values: &[f64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| format!("{:.6}", v)).collect();
    format!("[{}]", parts.join(", "))
}

/// Check configuration validity.
fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("CONDITION ARB - CONFIGURATION CHECK");
    println!("======================================================================");

    // Load configuration
    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    // Validate configuration
    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Min Profit: ${}", config.min_profit_threshold);
    println!("  Deviation Threshold: {}", config.price_deviation_threshold);
    println!("  Order Book Prices: {}", config.use_order_book);
    println!("  Liquidity Cap: {}", config.liquidity_pct_cap);
    match config.max_position_size {
        Some(max) => println!("  Max Position: ${}", max),
        None => println!("  Max Position: unlimited"),
    }
    println!(
        "  Projector: eps={} tol={} max_iter={}",
        config.projector_epsilon, config.projector_tolerance, config.projector_max_iterations
    );
    println!(
        "  Extraction: alpha={} eps0={} threshold={} max_iter={}",
        config.extraction_alpha,
        config.extraction_initial_epsilon,
        config.extraction_convergence_threshold,
        config.extraction_max_iterations
    );
    println!("  Gamma API: {}", config.gamma_api_url);
    println!("  CLOB API: {}", config.clob_api_url);
    println!("  Scan Limit: {} events", config.scan_limit);
    println!("  Book Fetch Concurrency: {}", config.book_fetch_concurrency);
    println!("  Solver Workers: {}", config.solver_workers);
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Scan on an interval and publish results over HTTP.
async fn cmd_serve(port: Option<u16>, interval_secs: u64) -> anyhow::Result<()> {
    info!("Loading configuration...");
    let config = load_config()?;
    info!("Configuration loaded successfully");

    if metrics::install().is_none() {
        warn!("Prometheus exporter unavailable; /metrics will be empty");
    }

    let app_state = AppState::new();

    // Start HTTP server
    let port = port.unwrap_or(config.port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    let router = create_router(app_state.clone());

    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    let scanner = live_scanner(&config, ScanOptions::from_config(&config))?;
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!("========================================");
    info!("CONDITION ARB SCANNER STARTED");
    info!("========================================");
    info!("Source: {}", scanner.options().mode);
    info!("Interval: {}s", interval_secs.max(1));
    info!("Min profit: ${}", scanner.options().detector.min_profit);
    info!("========================================");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut scan_count = 0u64;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                scan_count += 1;
                match scanner.scan().await {
                    Ok(report) => {
                        info!(
                            "[Scan #{}] {} opportunities across {} binary markets in {:.0} ms",
                            scan_count,
                            report.opportunities.len(),
                            report.binary_markets,
                            report.elapsed_ms,
                        );
                        app_state.record_scan(&report).await;
                    }
                    Err(e) => warn!("[Scan #{}] Scan failed: {}", scan_count, e),
                }
            }
        }
    }

    info!("Waiting for HTTP server to stop...");
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("HTTP server error: {}", e),
        Err(e) => error!("HTTP server task failed: {}", e),
    }

    info!("Scanner stopped after {} scans", scan_count);
    Ok(())
}
