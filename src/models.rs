//! Shared data structures used throughout the application.

use serde::{Deserialize, Serialize};

/// A single timestamped price observation for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tick {
    pub symbol: String,
    pub price: f64,
    /// Feed-defined epoch seconds.
    pub time: i64,
}

/// One OHLC candle as reported by the feed's historical endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub epoch: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Outcome of one poll of the latest-tick facade.
///
/// `Quiet` means the feed answered but the tick was already delivered
/// (same timestamp); `Throttled` means the request was suppressed by the
/// minimum-interval policy before any network activity. Transport, codec
/// and protocol failures surface as `Err(FeedError)` at the facade, not
/// as a variant here.
#[derive(Debug, Clone, PartialEq)]
pub enum TickPoll {
    New(Tick),
    Quiet,
    Throttled,
}
