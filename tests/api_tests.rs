mod common;

use actix_web::{http::StatusCode, test, web};
use common::{aggregator, StubProvider};
use consensus_price_index::{
    api::{configure, AppState},
    PriceProvider, Quote, Valuator,
};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

fn app_state(providers: Vec<Arc<dyn PriceProvider>>) -> web::Data<AppState> {
    let aggregator = Arc::new(aggregator(providers));
    web::Data::new(AppState {
        valuator: Arc::new(Valuator::new(aggregator, Duration::from_secs(30))),
    })
}

fn healthy_state() -> web::Data<AppState> {
    app_state(vec![
        Arc::new(StubProvider::with_prices(
            "A",
            &[("BTC", 50000.0), ("ETH", 2500.0)],
        )),
        Arc::new(StubProvider::with_prices(
            "B",
            &[("BTC", 50100.0), ("ETH", 2500.0)],
        )),
    ])
}

#[actix_web::test]
async fn test_price_endpoint() {
    let app = test::init_service(
        actix_web::App::new()
            .app_data(healthy_state())
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/price/btc").to_request();
    let resp = test::call_service(&app, req).await;

    assert!(resp.status().is_success());

    let body = test::read_body(resp).await;
    let quote: Quote = serde_json::from_slice(&body).unwrap();

    // One of two providers suffices at the default threshold
    assert_eq!(quote.symbol, "BTC");
    assert_eq!(quote.currency, "USD");
    assert_eq!(quote.price, 50000.0);
    assert!(quote.observed_at <= SystemTime::now());
}

#[actix_web::test]
async fn test_prices_endpoint() {
    let app = test::init_service(
        actix_web::App::new()
            .app_data(healthy_state())
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/prices?symbols=BTC,eth,DOGE&currency=usd")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert!(resp.status().is_success());

    let body = test::read_body(resp).await;
    let quotes: Vec<Quote> = serde_json::from_slice(&body).unwrap();

    assert_eq!(quotes.len(), 2);
    assert_eq!(quotes[0].symbol, "BTC");
    assert!((quotes[0].price - 50050.0).abs() < 1e-9);
    assert_eq!(quotes[1].symbol, "ETH");
    assert_eq!(quotes[1].price, 2500.0);
}

#[actix_web::test]
async fn test_prices_endpoint_requires_symbols() {
    let app = test::init_service(
        actix_web::App::new()
            .app_data(healthy_state())
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/prices?symbols=,").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_convert_endpoint() {
    let app = test::init_service(
        actix_web::App::new()
            .app_data(healthy_state())
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/convert?from=ETH&to=usd&amount=2")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert!(resp.status().is_success());

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["from"], "ETH");
    assert_eq!(body["to"], "USD");
    assert_eq!(body["amount"], 2.0);
    assert_eq!(body["result"], 5000.0);
}

#[actix_web::test]
async fn test_unpriceable_symbol_is_not_found() {
    let app = test::init_service(
        actix_web::App::new()
            .app_data(app_state(vec![
                Arc::new(StubProvider::down("A")),
                Arc::new(StubProvider::down("B")),
            ]))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/price/BTC").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_throttled_upstream_is_too_many_requests() {
    let app = test::init_service(
        actix_web::App::new()
            .app_data(app_state(vec![Arc::new(StubProvider::throttled("A"))]))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/price/BTC").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[actix_web::test]
async fn test_health_endpoint() {
    let app = test::init_service(
        actix_web::App::new()
            .app_data(healthy_state())
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;

    assert!(resp.status().is_success());
}

#[actix_web::test]
async fn test_error_handling() {
    let app = test::init_service(
        actix_web::App::new()
            .app_data(healthy_state())
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/invalid-path").to_request();
    let resp = test::call_service(&app, req).await;

    assert!(resp.status().is_client_error());
}
