//! Persistent feed connection manager.
//!
//! One supervisor task owns the WebSocket for its whole life: it connects,
//! requests the active instrument, pumps inbound frames into the latest-tick
//! slot and reconnects after a configurable delay whenever the transport
//! drops. Callers never touch the socket; they switch the active instrument,
//! ask for a refresh and read the slot through [`FeedClient`].
//!
//! Lifecycle transitions are a pure function over [`FeedEvent`] so the
//! machine can be exercised without a socket.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::codec::{self, Frame, HistoryRequest};
use crate::errors::{FeedError, Result};
use crate::models::Tick;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Settings owned by the connection manager.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub ws_url: String,
    /// Delay before each reconnect attempt.
    pub reconnect_delay: Duration,
    /// Consecutive-failure cap, 0 = retry forever.
    pub max_reconnect_attempts: u32,
}

/// Connection lifecycle. Owned exclusively by the supervisor task; everyone
/// else only observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// Events driving the lifecycle machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEvent {
    BackoffElapsed,
    HandshakeOk,
    HandshakeFailed,
    TransportClosed,
    ShutdownRequested,
}

/// What the supervisor does after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Idle,
    Connect,
    RequestActive,
    Backoff,
    Stop,
}

/// Pure lifecycle transition.
pub fn transition(state: ConnState, event: FeedEvent) -> (ConnState, Action) {
    match (state, event) {
        (_, FeedEvent::ShutdownRequested) => (ConnState::Closing, Action::Stop),
        (ConnState::Disconnected, FeedEvent::BackoffElapsed) => {
            (ConnState::Connecting, Action::Connect)
        }
        (ConnState::Connecting, FeedEvent::HandshakeOk) => {
            (ConnState::Connected, Action::RequestActive)
        }
        (ConnState::Connecting, FeedEvent::HandshakeFailed) => {
            (ConnState::Disconnected, Action::Backoff)
        }
        (ConnState::Connected, FeedEvent::TransportClosed) => {
            (ConnState::Disconnected, Action::Backoff)
        }
        (state, _) => (state, Action::Idle),
    }
}

/// State shared between the supervisor task and callers. One lock covers the
/// slot, the active instrument and the connection state, so a caller can
/// never read a half-updated tick or race an instrument switch.
#[derive(Debug, Default)]
struct Shared {
    state: ConnState,
    active: Option<String>,
    latest: Option<Tick>,
}

/// Record a received tick iff its instrument is still the active one.
///
/// The tag is compared against the active instrument *at receipt time*, not
/// the one captured when the request went out; a response overtaken by an
/// instrument switch is dropped.
fn accept_tick(shared: &mut Shared, tick: Tick) -> bool {
    if shared.active.as_deref() != Some(tick.symbol.as_str()) {
        debug!(symbol = %tick.symbol, active = ?shared.active, "[FEED] stale response discarded");
        return false;
    }
    shared.latest = Some(tick);
    true
}

/// Change the active instrument, invalidating the slot. Returns whether it
/// actually changed.
fn switch_active(shared: &mut Shared, symbol: &str) -> bool {
    if shared.active.as_deref() == Some(symbol) {
        return false;
    }
    debug!(from = ?shared.active, to = %symbol, "[FEED] active instrument switched");
    shared.active = Some(symbol.to_string());
    shared.latest = None;
    true
}

/// Handle to the persistent connection.
pub struct FeedClient {
    shared: Arc<Mutex<Shared>>,
    notify: Arc<Notify>,
    cmd_tx: mpsc::UnboundedSender<Message>,
}

impl FeedClient {
    /// Spawn the supervisor task and return a handle to it.
    pub fn spawn(cfg: FeedConfig) -> Result<(Self, JoinHandle<()>)> {
        let url = Url::parse(&cfg.ws_url)?;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(Shared::default()));
        let notify = Arc::new(Notify::new());
        let handle = tokio::spawn(run(cfg, url, shared.clone(), notify.clone(), cmd_rx));
        Ok((
            Self {
                shared,
                notify,
                cmd_tx,
            },
            handle,
        ))
    }

    pub async fn state(&self) -> ConnState {
        self.shared.lock().await.state
    }

    /// Make `symbol` the active instrument without tearing the connection
    /// down. In-flight responses for the previous instrument will be
    /// discarded on arrival.
    pub async fn switch_symbol(&self, symbol: &str) {
        let mut shared = self.shared.lock().await;
        switch_active(&mut shared, symbol);
    }

    /// Ask the feed to re-serve the latest tick for `symbol`.
    ///
    /// A no-op returning [`FeedError::NotConnected`] while the connection is
    /// down; nothing is queued for later.
    pub async fn request_refresh(&self, symbol: &str) -> Result<()> {
        {
            let shared = self.shared.lock().await;
            if shared.state != ConnState::Connected {
                return Err(FeedError::NotConnected);
            }
        }
        let payload = codec::encode(&HistoryRequest::latest_tick(symbol))?;
        self.cmd_tx
            .send(Message::Text(payload))
            .map_err(|_| FeedError::NotConnected)
    }

    /// Snapshot of the latest-tick slot.
    pub async fn latest(&self) -> Option<Tick> {
        self.shared.lock().await.latest.clone()
    }

    /// Wait up to `timeout` for the receive loop to deliver a tick. Returns
    /// early as soon as one lands; the slot may still be stale or empty.
    pub async fn wait_for_update(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
    }
}

async fn advance(shared: &Arc<Mutex<Shared>>, event: FeedEvent) -> Action {
    let mut shared = shared.lock().await;
    let (next, action) = transition(shared.state, event);
    if next != shared.state {
        debug!(from = ?shared.state, to = ?next, event = ?event, "[FEED] transition");
    }
    shared.state = next;
    action
}

async fn run(
    cfg: FeedConfig,
    url: Url,
    shared: Arc<Mutex<Shared>>,
    notify: Arc<Notify>,
    mut cmd_rx: mpsc::UnboundedReceiver<Message>,
) {
    let mut failures: u32 = 0;
    loop {
        if failures > 0 {
            if cfg.max_reconnect_attempts != 0 && failures >= cfg.max_reconnect_attempts {
                error!(failures, "[FEED] reconnect cap reached, giving up");
                return;
            }
            tokio::time::sleep(cfg.reconnect_delay).await;
        }
        advance(&shared, FeedEvent::BackoffElapsed).await;

        let ws = match connect_async(url.clone()).await {
            Ok((ws, _resp)) => ws,
            Err(e) => {
                failures += 1;
                warn!(error = %e, failures, "[FEED] connect failed");
                advance(&shared, FeedEvent::HandshakeFailed).await;
                continue;
            }
        };

        failures = 0;
        info!("[FEED] connected");
        let action = advance(&shared, FeedEvent::HandshakeOk).await;
        let (mut write, mut read) = ws.split();

        if action == Action::RequestActive {
            let active = shared.lock().await.active.clone();
            if let Some(symbol) = active {
                match codec::encode(&HistoryRequest::latest_tick(&symbol)) {
                    Ok(payload) => {
                        if write.send(Message::Text(payload)).await.is_err() {
                            advance(&shared, FeedEvent::TransportClosed).await;
                            failures += 1;
                            continue;
                        }
                    }
                    Err(e) => warn!(error = %e, "[FEED] request encode failed"),
                }
            }
        }

        let shutdown = pump(&shared, &notify, &mut write, &mut read, &mut cmd_rx).await;
        if shutdown {
            advance(&shared, FeedEvent::ShutdownRequested).await;
            info!("[FEED] handle dropped, closing connection");
            let _ = write.close().await;
            return;
        }

        advance(&shared, FeedEvent::TransportClosed).await;
        // requests are never queued across a reconnect; the fresh connection
        // issues its own request for the active instrument
        while cmd_rx.try_recv().is_ok() {}
        failures += 1;
        warn!(delay = ?cfg.reconnect_delay, "[FEED] connection lost, scheduling reconnect");
    }
}

/// Pump commands out and frames in until the transport drops (false) or the
/// handle goes away (true).
async fn pump(
    shared: &Arc<Mutex<Shared>>,
    notify: &Notify,
    write: &mut SplitSink<WsStream, Message>,
    read: &mut SplitStream<WsStream>,
    cmd_rx: &mut mpsc::UnboundedReceiver<Message>,
) -> bool {
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(msg) => {
                    if write.send(msg).await.is_err() {
                        return false;
                    }
                }
                None => return true,
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(txt))) => handle_text(shared, notify, &txt).await,
                Some(Ok(Message::Close(_))) => {
                    info!("[FEED] close frame from feed");
                    return false;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "[FEED] transport error");
                    return false;
                }
                None => {
                    warn!("[FEED] stream ended");
                    return false;
                }
            },
        }
    }
}

async fn handle_text(shared: &Arc<Mutex<Shared>>, notify: &Notify, raw: &str) {
    match codec::parse_frame(raw) {
        Ok(Frame::History {
            symbol,
            times,
            prices,
        }) => {
            let (Some(&time), Some(&price)) = (times.last(), prices.last()) else {
                warn!("[FEED] history frame with empty series");
                return;
            };
            let Some(symbol) = symbol else {
                warn!("[FEED] history frame without an instrument tag");
                return;
            };
            let tick = Tick {
                symbol,
                price,
                time,
            };
            let delivered = {
                let mut shared = shared.lock().await;
                accept_tick(&mut shared, tick)
            };
            if delivered {
                notify.notify_one();
            }
        }
        Ok(Frame::Candles { .. }) => {
            // candle windows travel over one-shot connections only
            debug!("[FEED] unsolicited candles frame ignored");
        }
        // a bad frame is dropped; dedup and slot state stay as they were
        Err(e) => warn!(error = %e, "[FEED] bad frame discarded"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(symbol: &str, time: i64) -> Tick {
        Tick {
            symbol: symbol.to_string(),
            price: 245.67,
            time,
        }
    }

    #[test]
    fn reconnect_transition_chain() {
        let (s, a) = transition(ConnState::Disconnected, FeedEvent::BackoffElapsed);
        assert_eq!((s, a), (ConnState::Connecting, Action::Connect));

        let (s, a) = transition(s, FeedEvent::HandshakeOk);
        assert_eq!((s, a), (ConnState::Connected, Action::RequestActive));

        let (s, a) = transition(s, FeedEvent::TransportClosed);
        assert_eq!((s, a), (ConnState::Disconnected, Action::Backoff));

        let (s, a) = transition(ConnState::Connecting, FeedEvent::HandshakeFailed);
        assert_eq!((s, a), (ConnState::Disconnected, Action::Backoff));

        let (s, a) = transition(ConnState::Connected, FeedEvent::ShutdownRequested);
        assert_eq!((s, a), (ConnState::Closing, Action::Stop));
    }

    #[test]
    fn irrelevant_events_leave_state_alone() {
        let (s, a) = transition(ConnState::Disconnected, FeedEvent::TransportClosed);
        assert_eq!((s, a), (ConnState::Disconnected, Action::Idle));
        let (s, a) = transition(ConnState::Connected, FeedEvent::BackoffElapsed);
        assert_eq!((s, a), (ConnState::Connected, Action::Idle));
    }

    #[test]
    fn tick_for_active_instrument_is_delivered() {
        let mut shared = Shared::default();
        switch_active(&mut shared, "R_50");
        assert!(accept_tick(&mut shared, tick("R_50", 1700000000)));
        assert_eq!(shared.latest.as_ref().map(|t| t.time), Some(1700000000));
    }

    #[test]
    fn response_overtaken_by_instrument_switch_is_discarded() {
        let mut shared = Shared::default();
        // a request for A goes out, then the caller switches to B before the
        // response lands
        switch_active(&mut shared, "R_50");
        switch_active(&mut shared, "1HZ100V");
        assert!(!accept_tick(&mut shared, tick("R_50", 1700000000)));
        assert!(shared.latest.is_none());

        // switching back to A does not resurrect the stale response either:
        // the slot was invalidated by the switch and stays empty until a
        // fresh response for A arrives
        switch_active(&mut shared, "R_50");
        assert!(shared.latest.is_none());
        assert!(accept_tick(&mut shared, tick("R_50", 1700000005)));
    }

    #[test]
    fn switching_to_the_same_symbol_keeps_the_slot() {
        let mut shared = Shared::default();
        switch_active(&mut shared, "R_50");
        assert!(accept_tick(&mut shared, tick("R_50", 1)));
        assert!(!switch_active(&mut shared, "R_50"));
        assert!(shared.latest.is_some());
    }

    #[tokio::test]
    async fn refresh_while_disconnected_reports_failure_without_queueing() {
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
        let client = FeedClient {
            shared: Arc::new(Mutex::new(Shared::default())),
            notify: Arc::new(Notify::new()),
            cmd_tx,
        };
        assert!(matches!(
            client.request_refresh("R_50").await,
            Err(FeedError::NotConnected)
        ));
        assert!(cmd_rx.try_recv().is_err());
    }
}
