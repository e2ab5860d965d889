//! Volatility and drift over a close-price series.

use serde::Serialize;

/// Seconds per candle used by the `/candles` endpoint.
pub const CANDLE_GRANULARITY_SECS: u32 = 600;

/// Number of candles requested for a statistics window.
pub const CANDLE_WINDOW: u32 = 4321;

/// Annualized volatility and mean log return.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VolDrift {
    pub volatility: f64,
    pub drift: f64,
}

/// Compute annualized volatility and drift from log returns of the closes.
///
/// `intervals_per_year = 365 * 86400 / granularity_secs`; volatility is the
/// population standard deviation of the log returns scaled by
/// `sqrt(intervals_per_year)`, drift the mean scaled by `intervals_per_year`.
/// Returns `None` for fewer than two closes or a non-positive price.
pub fn volatility_drift(closes: &[f64], granularity_secs: u32) -> Option<VolDrift> {
    if closes.len() < 2 || closes.iter().any(|&c| c <= 0.0) {
        return None;
    }

    let log_returns: Vec<f64> = closes.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
    let n = log_returns.len() as f64;
    let mean = log_returns.iter().sum::<f64>() / n;
    let variance = log_returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;

    let intervals_per_year = (365.0 * 86400.0) / f64::from(granularity_secs);
    Some(VolDrift {
        volatility: variance.sqrt() * intervals_per_year.sqrt(),
        drift: mean * intervals_per_year,
    })
}
