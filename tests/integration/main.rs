//! Integration tests for the scan pipeline.
//!
//! Most tests run the full pipeline over in-memory collaborators. The
//! `#[ignore]`d ones talk to the live Gamma and CLOB APIs.
//! Run those with: cargo test --test integration -- --ignored

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio_test::assert_ok;
use tower::ServiceExt;

use condition_arb::api::{create_router, AppState};
use condition_arb::arbitrage::Direction;
use condition_arb::config::{Config, ExtractionConfig, ProjectorConfig};
use condition_arb::market::{
    binary_market, ClobClient, GammaClient, MarketCatalog, MockBookSource, MockCatalog,
    MockConfig, MockOrderBookBuilder, OrderBookSource,
};
use condition_arb::orderbook::OrderBook;
use condition_arb::scanner::{PriceMode, ScanOptions, Scanner};
use condition_arb::solver::SolverPool;

fn book(asset: &str, bid: Decimal, ask: Decimal, depth: Decimal) -> OrderBook {
    MockOrderBookBuilder::new(asset)
        .bid(bid, depth)
        .ask(ask, depth)
        .build()
}

/// Three markets: a cheap bundle, a fair one, and a rich one.
fn fixture() -> (MockCatalog, MockBookSource) {
    let catalog = MockCatalog::new(vec![
        binary_market("cheap", dec!(0.5), dec!(0.5)),
        binary_market("fair", dec!(0.5), dec!(0.5)),
        binary_market("rich", dec!(0.5), dec!(0.5)),
    ]);

    let books = MockBookSource::new();
    books.set_order_book(book("cheap-yes", dec!(0.40), dec!(0.42), dec!(200)));
    books.set_order_book(book("cheap-no", dec!(0.50), dec!(0.52), dec!(50)));
    books.set_order_book(book("fair-yes", dec!(0.49), dec!(0.50), dec!(100)));
    books.set_order_book(book("fair-no", dec!(0.49), dec!(0.50), dec!(100)));
    books.set_order_book(book("rich-yes", dec!(0.55), dec!(0.56), dec!(100)));
    books.set_order_book(book("rich-no", dec!(0.50), dec!(0.51), dec!(100)));

    (catalog, books)
}

fn solver() -> SolverPool {
    SolverPool::new(2, ProjectorConfig::default(), ExtractionConfig::default())
}

#[tokio::test]
async fn scan_finds_both_directions_in_margin_order() {
    let (catalog, books) = fixture();
    let scanner = Scanner::new(
        Arc::new(catalog),
        Arc::new(books),
        ScanOptions::default().with_mode(PriceMode::Book),
    );

    let report = scanner.scan().await.unwrap();

    assert_eq!(report.markets_fetched, 3);
    assert_eq!(report.binary_markets, 3);
    assert_eq!(report.books_fetched, 6);
    assert_eq!(report.book_failures, 0);

    let found: Vec<(&str, Direction, Decimal)> = report
        .opportunities
        .iter()
        .map(|s| {
            (
                s.opportunity.market_id.as_str(),
                s.opportunity.direction,
                s.opportunity.profit_margin,
            )
        })
        .collect();
    assert_eq!(
        found,
        vec![
            ("cheap", Direction::BuyBoth, dec!(0.06)),
            ("rich", Direction::SellBoth, dec!(0.05)),
        ]
    );

    // Hedgeable depth is the thinner NO leg.
    let estimate = report.opportunities[0].estimate.as_ref().unwrap();
    assert_eq!(estimate.hedgeable_size, dec!(50));
    assert_eq!(estimate.max_extractable_usd, dec!(3.00));
}

#[tokio::test]
async fn failed_book_only_affects_its_market() {
    let (catalog, books) = fixture();
    books.fail_token("cheap-no");
    let scanner = Scanner::new(
        Arc::new(catalog),
        Arc::new(books),
        ScanOptions::default().with_mode(PriceMode::Book),
    );

    let report = scanner.scan().await.unwrap();

    assert_eq!(report.book_failures, 1);
    assert_eq!(report.books_fetched, 5);
    // Without its NO book the cheap market falls back to catalog prices,
    // which sum to one; the rich market is still found.
    assert_eq!(report.opportunities.len(), 1);
    assert_eq!(report.opportunities[0].opportunity.market_id, "rich");
}

#[tokio::test]
async fn catalog_failure_fails_the_scan() {
    let catalog = MockCatalog::with_config(
        vec![binary_market("1", dec!(0.4), dec!(0.4))],
        MockConfig {
            fail_catalog: true,
            ..MockConfig::default()
        },
    );
    let scanner = Scanner::new(
        Arc::new(catalog),
        Arc::new(MockBookSource::new()),
        ScanOptions::default(),
    );

    tokio_test::assert_err!(scanner.scan().await);
}

#[tokio::test]
async fn book_fetches_respect_concurrency_bound() {
    let markets = (0..10)
        .map(|i| binary_market(&i.to_string(), dec!(0.5), dec!(0.5)))
        .collect();
    let books = MockBookSource::with_config(MockConfig {
        latency_ms: 20,
        ..MockConfig::default()
    });
    let probe = books.clone();

    let mut options = ScanOptions::default().with_mode(PriceMode::Book);
    options.book_fetch_concurrency = 3;
    let scanner = Scanner::new(Arc::new(MockCatalog::new(markets)), Arc::new(books), options);

    let report = scanner.scan().await.unwrap();

    assert_eq!(probe.calls(), 20);
    assert_eq!(report.books_fetched, 20);
    assert!(probe.peak_in_flight() <= 3);
    assert!(probe.peak_in_flight() >= 1);
}

#[tokio::test]
async fn scan_attaches_projected_fair_values() {
    let (catalog, books) = fixture();
    let scanner = Scanner::new(
        Arc::new(catalog),
        Arc::new(books),
        ScanOptions::default().with_mode(PriceMode::Book),
    )
    .with_solver(solver());

    let report = scanner.scan().await.unwrap();

    // Cheap bundle: asks 0.42 / 0.52 rescale to sum to one.
    let fair = report.opportunities[0].fair_value.as_ref().unwrap();
    assert!((fair.yes - 0.42 / 0.94).abs() < 1e-6);
    assert!((fair.yes + fair.no - 1.0).abs() < 1e-6);
    assert!(fair.divergence > 0.0);
}

#[tokio::test]
async fn clob_quotes_override_books() {
    use condition_arb::arbitrage::{ConditionPrices, PricePair};

    let (catalog, books) = fixture();
    books.set_price_pair(
        "fair",
        PricePair::uniform(ConditionPrices::new(
            "fair-yes",
            "fair-no",
            dec!(0.30),
            dec!(0.60),
        )),
    );
    let scanner = Scanner::new(
        Arc::new(catalog),
        Arc::new(books),
        ScanOptions::default().with_mode(PriceMode::Clob),
    );

    let report = scanner.scan().await.unwrap();

    let fair = report
        .opportunities
        .iter()
        .find(|s| s.opportunity.market_id == "fair")
        .unwrap();
    assert_eq!(fair.opportunity.direction, Direction::BuyBoth);
    assert_eq!(fair.opportunity.profit_margin, dec!(0.10));
}

#[tokio::test]
async fn scan_results_are_served_over_http() {
    let (catalog, books) = fixture();
    let scanner = Scanner::new(
        Arc::new(catalog),
        Arc::new(books),
        ScanOptions::default().with_mode(PriceMode::Book),
    );
    let state = AppState::new();
    let report = scanner.scan().await.unwrap();
    state.record_scan(&report).await;

    let app = create_router(state);
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/opportunities")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let views: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let ids: Vec<&str> = views
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["market_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["cheap", "rich"]);
    assert_eq!(views[0]["url"], "https://polymarket.com/event/event-cheap");
}

#[tokio::test]
#[ignore = "requires network access to the Gamma API"]
async fn live_catalog_returns_markets() {
    let config = Config::default();
    let gamma = GammaClient::new(&config).unwrap();

    let markets = gamma.fetch_active_markets(5).await.unwrap();

    assert!(!markets.is_empty());
    for market in &markets {
        assert!(!market.id.is_empty());
    }
}

#[tokio::test]
#[ignore = "requires network access to the Gamma and CLOB APIs"]
async fn live_order_book_for_first_binary_market() {
    let config = Config::default();
    let gamma = GammaClient::new(&config).unwrap();
    let clob = ClobClient::new(&config).unwrap();

    let markets = gamma.fetch_active_markets(10).await.unwrap();
    let Some(market) = markets.iter().find(|m| m.is_binary()) else {
        return;
    };

    let token = &market.clob_token_ids[0];
    let book = clob.get_order_book(token).await.unwrap();

    assert_eq!(&book.asset_id, token);
    assert!(!book.is_crossed());
}

#[tokio::test]
#[ignore = "requires network access to the Gamma and CLOB APIs"]
async fn live_scan_completes() {
    let config = Config::default();
    let scanner = Scanner::new(
        Arc::new(GammaClient::new(&config).unwrap()),
        Arc::new(ClobClient::new(&config).unwrap()),
        ScanOptions::from_config(&config).with_limit(5),
    )
    .with_solver(solver());

    let report = assert_ok!(scanner.scan().await);

    assert!(report.binary_markets <= report.markets_fetched);
}
