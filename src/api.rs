// HTTP routes over the valuator
use crate::aggregator::PriceAggregator;
use crate::config;
use crate::error::PriceError;
use crate::models::{canonical, ConversionRequest, USD};
use crate::providers::{binance::BinanceProvider, huobi::HuobiProvider, kraken::KrakenProvider, PriceProvider};
use crate::valuator::Valuator;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use log::{error, info, warn};
use serde::Deserialize;
use std::sync::Arc;

pub struct AppState {
    pub valuator: Arc<Valuator>,
}

#[derive(Debug, Deserialize)]
pub struct PriceQuery {
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PricesQuery {
    /// Comma separated symbols, e.g. `BTC,ETH`
    pub symbols: String,
    pub currency: Option<String>,
}

fn error_response(err: &PriceError) -> HttpResponse {
    let body = serde_json::json!({ "error": err.to_string() });
    match err {
        PriceError::NoPriceData(_) | PriceError::PriceNotFound { .. } => {
            HttpResponse::NotFound().json(body)
        }
        PriceError::RateLimitExceeded(_) | PriceError::Throttled(_) => {
            HttpResponse::TooManyRequests().json(body)
        }
        _ => HttpResponse::ServiceUnavailable().json(body),
    }
}

pub async fn get_price(
    data: web::Data<AppState>,
    symbol: web::Path<String>,
    query: web::Query<PriceQuery>,
) -> impl Responder {
    let currency = query.currency.as_deref().unwrap_or(USD);
    match data.valuator.get_price(&symbol, currency).await {
        Ok(quote) => {
            info!("{}/{}: {:.2}", quote.symbol, quote.currency, quote.price);
            HttpResponse::Ok().json(quote)
        }
        Err(e) => {
            warn!("Error pricing {}/{}: {}", symbol, currency, e);
            error_response(&e)
        }
    }
}

pub async fn get_prices(data: web::Data<AppState>, query: web::Query<PricesQuery>) -> impl Responder {
    let symbols: Vec<String> = query
        .symbols
        .split(',')
        .map(canonical)
        .filter(|s| !s.is_empty())
        .collect();
    if symbols.is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "No symbols requested",
        }));
    }

    let currency = query.currency.as_deref().unwrap_or(USD);
    match data.valuator.get_prices(&symbols, currency).await {
        Ok(quotes) => HttpResponse::Ok().json(quotes),
        Err(e) => {
            warn!("Error pricing {:?}: {}", symbols, e);
            error_response(&e)
        }
    }
}

pub async fn convert(data: web::Data<AppState>, query: web::Query<ConversionRequest>) -> impl Responder {
    match data.valuator.convert(&query).await {
        Ok(result) => HttpResponse::Ok().json(serde_json::json!({
            "from": canonical(&query.from),
            "to": canonical(&query.to),
            "amount": query.amount,
            "result": result,
        })),
        Err(e) => {
            warn!("Error converting {} to {}: {}", query.from, query.to, e);
            error_response(&e)
        }
    }
}

pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/price/{symbol}", web::get().to(get_price))
        .route("/prices", web::get().to(get_prices))
        .route("/convert", web::get().to(convert));
}

/// Providers in priority order. Adapters that cannot be built are skipped.
pub fn default_providers() -> Vec<Arc<dyn PriceProvider>> {
    let mut providers: Vec<Arc<dyn PriceProvider>> = Vec::new();
    match BinanceProvider::new() {
        Ok(p) => providers.push(Arc::new(p)),
        Err(e) => error!("Failed to create Binance provider: {}", e),
    }
    match KrakenProvider::new() {
        Ok(p) => providers.push(Arc::new(p)),
        Err(e) => error!("Failed to create Kraken provider: {}", e),
    }
    match HuobiProvider::new() {
        Ok(p) => providers.push(Arc::new(p)),
        Err(e) => error!("Failed to create Huobi provider: {}", e),
    }
    providers
}

pub async fn start_server() -> std::io::Result<()> {
    let aggregator = Arc::new(PriceAggregator::from_settings(default_providers()));
    info!(
        "Aggregating {:?} with cache backend {}",
        aggregator.provider_names().await,
        aggregator.cache().backend_name()
    );

    let app_state = web::Data::new(AppState {
        valuator: Arc::new(Valuator::from_settings(aggregator)),
    });

    let addr = config::get_server_addr();
    info!("Listening on {}", addr);

    HttpServer::new(move || App::new().app_data(app_state.clone()).configure(configure))
        .bind(addr)?
        .run()
        .await
}
