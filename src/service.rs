//! Query facade: the pull-side surface over the push-based feed.

use std::time::Duration;

use tracing::debug;

use crate::codec::{Frame, HistoryRequest};
use crate::config::AppConfig;
use crate::dedup::TickTracker;
use crate::errors::{FeedError, Result};
use crate::feed::{ConnState, FeedClient, ThrottleGate, fetch_one};
use crate::models::{Candle, Tick, TickPoll};
use crate::stats::{CANDLE_GRANULARITY_SECS, CANDLE_WINDOW};

enum Mode {
    /// Long-lived connection; polls read the receive loop's slot.
    Persistent { client: FeedClient },
    /// A fresh connection per poll, behind the throttle gate.
    Transient { gate: ThrottleGate },
}

/// The one externally consumed operation lives here: `get_latest_tick`.
pub struct TickService {
    ws_url: String,
    refresh_wait: Duration,
    tracker: TickTracker,
    mode: Mode,
}

impl TickService {
    /// Facade over an already spawned persistent connection.
    pub fn persistent(cfg: &AppConfig, client: FeedClient) -> Self {
        Self {
            ws_url: cfg.ws_url.clone(),
            refresh_wait: cfg.refresh_wait,
            tracker: TickTracker::new(),
            mode: Mode::Persistent { client },
        }
    }

    /// Facade that opens a throttled one-shot connection per poll.
    pub fn transient(cfg: &AppConfig) -> Self {
        Self {
            ws_url: cfg.ws_url.clone(),
            refresh_wait: cfg.refresh_wait,
            tracker: TickTracker::new(),
            mode: Mode::Transient {
                gate: ThrottleGate::new(cfg.throttle_window),
            },
        }
    }

    /// Connection state of the persistent feed, if running in that mode.
    pub async fn feed_state(&self) -> Option<ConnState> {
        match &self.mode {
            Mode::Persistent { client } => Some(client.state().await),
            Mode::Transient { .. } => None,
        }
    }

    /// Latest tick for `symbol`, deduplicated by timestamp.
    ///
    /// `New` carries a tick not delivered before; `Quiet` means the feed had
    /// nothing newer; `Throttled` means the minimum-interval policy suppressed
    /// the request. Transport/codec/protocol failures come back as `Err` so
    /// callers can tell "no new data" from "fetch failed".
    pub async fn get_latest_tick(&self, symbol: &str) -> Result<TickPoll> {
        if symbol.is_empty() {
            return Err(FeedError::Config("instrument symbol is empty".into()));
        }
        match &self.mode {
            Mode::Transient { gate } => self.poll_transient(gate, symbol).await,
            Mode::Persistent { client } => self.poll_persistent(client, symbol).await,
        }
    }

    async fn poll_transient(&self, gate: &ThrottleGate, symbol: &str) -> Result<TickPoll> {
        if !gate.allow().await {
            debug!(%symbol, "[QUERY] poll inside throttle window");
            return Ok(TickPoll::Throttled);
        }

        let frame = fetch_one(&self.ws_url, &HistoryRequest::latest_tick(symbol)).await?;
        let Frame::History {
            symbol: tag,
            times,
            prices,
        } = frame
        else {
            return Err(FeedError::Protocol("expected a history frame".into()));
        };
        if let Some(tag) = tag.as_deref()
            && tag != symbol
        {
            return Err(FeedError::Protocol(format!(
                "response for {tag}, requested {symbol}"
            )));
        }
        let (Some(&time), Some(&price)) = (times.last(), prices.last()) else {
            return Err(FeedError::Protocol("history frame with empty series".into()));
        };

        if self.tracker.observe(symbol, time).await {
            Ok(TickPoll::New(Tick {
                symbol: symbol.to_string(),
                price,
                time,
            }))
        } else {
            Ok(TickPoll::Quiet)
        }
    }

    async fn poll_persistent(&self, client: &FeedClient, symbol: &str) -> Result<TickPoll> {
        client.switch_symbol(symbol).await;

        // best effort: a disconnected feed still lets us read whatever the
        // receive loop delivered before the drop
        match client.request_refresh(symbol).await {
            Ok(()) => {}
            Err(FeedError::NotConnected) => {
                debug!(%symbol, "[QUERY] refresh skipped, feed not connected");
            }
            Err(e) => return Err(e),
        }

        client.wait_for_update(self.refresh_wait).await;

        let Some(tick) = client.latest().await else {
            return Ok(TickPoll::Quiet);
        };
        // the slot is invalidated on switch, so this only guards a racing
        // switch between the read above and a concurrent caller
        if tick.symbol != symbol {
            return Ok(TickPoll::Quiet);
        }

        if self.tracker.observe(&tick.symbol, tick.time).await {
            Ok(TickPoll::New(tick))
        } else {
            Ok(TickPoll::Quiet)
        }
    }

    /// Historical candle window for the statistics endpoint. Always a
    /// one-shot request, in either mode.
    pub async fn fetch_candles(&self, symbol: &str) -> Result<Vec<Candle>> {
        if symbol.is_empty() {
            return Err(FeedError::Config("instrument symbol is empty".into()));
        }
        let request = HistoryRequest::candles(symbol, CANDLE_WINDOW, CANDLE_GRANULARITY_SECS);
        match fetch_one(&self.ws_url, &request).await? {
            Frame::Candles { candles, .. } => Ok(candles),
            Frame::History { .. } => Err(FeedError::Protocol("expected a candles frame".into())),
        }
    }
}
