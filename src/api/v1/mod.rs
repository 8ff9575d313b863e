//! Data-plane endpoints
//!
//! Thin placeholder handlers: the gatekeeper in front of this router is the
//! subsystem under test, and what runs after "allow" belongs to the market
//! data backends.

use axum::{
    extract::{Extension, Path},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;

use super::middleware::AuthenticatedKey;
use super::state::AppState;
use crate::domain::tier::Tier;

pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/quotes/{symbol}", get(quote))
        .route("/symbols", get(symbols))
        .route("/candles/{symbol}", get(candles))
        .route("/indicators/{symbol}", get(indicators))
        .route("/screener", get(screener))
}

#[derive(Debug, Serialize)]
struct QuoteResponse {
    symbol: String,
    price: f64,
    currency: &'static str,
    /// Free-tier quotes are delayed
    delayed: bool,
    as_of: String,
}

async fn quote(
    Path(symbol): Path<String>,
    Extension(AuthenticatedKey(api_key)): Extension<AuthenticatedKey>,
) -> Json<QuoteResponse> {
    Json(QuoteResponse {
        symbol: symbol.to_uppercase(),
        price: 0.0,
        currency: "USD",
        delayed: api_key.tier() == Tier::Free,
        as_of: Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
struct SymbolsResponse {
    symbols: Vec<&'static str>,
    total: usize,
}

async fn symbols() -> Json<SymbolsResponse> {
    let symbols = vec!["AAPL", "MSFT", "GOOG", "AMZN", "TSLA"];
    let total = symbols.len();

    Json(SymbolsResponse { symbols, total })
}

#[derive(Debug, Serialize)]
struct CandlesResponse {
    symbol: String,
    interval: &'static str,
    candles: Vec<[f64; 4]>,
}

async fn candles(Path(symbol): Path<String>) -> Json<CandlesResponse> {
    Json(CandlesResponse {
        symbol: symbol.to_uppercase(),
        interval: "1d",
        candles: Vec::new(),
    })
}

#[derive(Debug, Serialize)]
struct IndicatorsResponse {
    symbol: String,
    indicators: Vec<&'static str>,
}

async fn indicators(Path(symbol): Path<String>) -> Json<IndicatorsResponse> {
    Json(IndicatorsResponse {
        symbol: symbol.to_uppercase(),
        indicators: vec!["sma", "ema", "rsi", "macd"],
    })
}

#[derive(Debug, Serialize)]
struct ScreenerResponse {
    matches: Vec<&'static str>,
    total: usize,
}

async fn screener() -> Json<ScreenerResponse> {
    Json(ScreenerResponse {
        matches: Vec::new(),
        total: 0,
    })
}
