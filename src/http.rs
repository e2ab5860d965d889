//! HTTP boundary.
//!
//! Thin translation layer only: the tick endpoint collapses everything that
//! is not a fresh tick into a JSON `null`, so HTTP consumers see the
//! original pull-API contract while failures are logged where they occur.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::models::{Tick, TickPoll};
use crate::service::TickService;
use crate::stats::{self, CANDLE_GRANULARITY_SECS};

#[derive(Clone)]
struct AppState {
    service: Arc<TickService>,
    default_symbol: String,
}

pub fn router(service: Arc<TickService>, default_symbol: String) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/tick/{symbol}", get(latest_tick))
        .route("/candles", get(candles_default).post(candles_for))
        .with_state(AppState {
            service,
            default_symbol,
        })
}

async fn index(State(state): State<AppState>) -> Json<serde_json::Value> {
    let feed_state = state.service.feed_state().await;
    Json(json!({
        "name": "tick-bridge",
        "description": "Pull-style API over a streaming quote feed",
        "feed_state": feed_state.map(|s| format!("{s:?}")),
        "endpoints": [
            {"path": "/", "method": "GET", "description": "This information page"},
            {"path": "/tick/{symbol}", "method": "GET", "description": "Latest tick, null if nothing new"},
            {"path": "/candles", "method": "GET", "description": "Volatility and drift for the default symbol"},
            {"path": "/candles", "method": "POST", "description": "Volatility and drift for a given symbol"},
        ]
    }))
}

async fn latest_tick(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Json<Option<Tick>> {
    let poll = state.service.get_latest_tick(&symbol).await;
    Json(tick_response(&symbol, poll))
}

/// Collapse the poll outcome to the boundary contract: a tick or `null`.
fn tick_response(symbol: &str, poll: Result<TickPoll>) -> Option<Tick> {
    match poll {
        Ok(TickPoll::New(tick)) => {
            info!(%symbol, price = tick.price, time = tick.time, "[HTTP] new tick");
            Some(tick)
        }
        Ok(TickPoll::Quiet) => None,
        Ok(TickPoll::Throttled) => {
            debug!(%symbol, "[HTTP] poll throttled");
            None
        }
        Err(e) => {
            warn!(%symbol, error = %e, "[HTTP] tick fetch failed");
            None
        }
    }
}

async fn candles_default(State(state): State<AppState>) -> Response {
    let symbol = state.default_symbol.clone();
    vol_drift_response(&state, &symbol).await
}

#[derive(Debug, Deserialize)]
struct CandlesBody {
    symbol: String,
}

async fn candles_for(State(state): State<AppState>, Json(body): Json<CandlesBody>) -> Response {
    vol_drift_response(&state, &body.symbol).await
}

async fn vol_drift_response(state: &AppState, symbol: &str) -> Response {
    match state.service.fetch_candles(symbol).await {
        Ok(candles) => {
            let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
            match stats::volatility_drift(&closes, CANDLE_GRANULARITY_SECS) {
                Some(vd) => {
                    info!(%symbol, volatility = vd.volatility, drift = vd.drift, "[HTTP] candles computed");
                    (StatusCode::OK, Json(vd)).into_response()
                }
                None => (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({"error": "not enough candles in feed response"})),
                )
                    .into_response(),
            }
        }
        Err(e) => {
            warn!(%symbol, error = %e, "[HTTP] candles fetch failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}
