//! One-shot fetches and the request throttle.
//!
//! Transient mode opens a fresh connection per query: send one request,
//! read one parsable frame, close. The throttle gate protects the upstream
//! from request storms when callers poll faster than the feed ticks.

use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, warn};
use url::Url;

use crate::codec::{self, Frame, HistoryRequest};
use crate::errors::Result;

/// Minimum-interval gate over outbound one-shot requests, shared per process.
#[derive(Debug)]
pub struct ThrottleGate {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl ThrottleGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    /// Admit a request now, recording the admission time. False means the
    /// caller must back off without any network activity.
    pub async fn allow(&self) -> bool {
        let mut last = self.last.lock().await;
        Self::admit(&mut last, self.min_interval, Instant::now())
    }

    fn admit(last: &mut Option<Instant>, min_interval: Duration, now: Instant) -> bool {
        if let Some(prev) = *last
            && now.duration_since(prev) < min_interval
        {
            return false;
        }
        *last = Some(now);
        true
    }
}

/// Open a connection, send `request`, return the first parsable frame.
///
/// Unparsable frames before the response (the feed does not send any today)
/// are logged and skipped; a connection that closes before answering is a
/// transport error.
pub async fn fetch_one(ws_url: &str, request: &HistoryRequest) -> Result<Frame> {
    let url = Url::parse(ws_url)?;
    let payload = codec::encode(request)?;

    let (mut ws, _resp) = connect_async(url).await?;
    ws.send(Message::Text(payload)).await?;

    let frame = loop {
        match ws.next().await {
            Some(Ok(Message::Text(txt))) => break codec::parse_frame(&txt)?,
            Some(Ok(Message::Close(_))) | None => {
                return Err(WsError::ConnectionClosed.into());
            }
            Some(Ok(other)) => debug!(?other, "[FEED] non-text frame skipped"),
            Some(Err(e)) => {
                warn!(error = %e, "[FEED] transport error during one-shot fetch");
                return Err(e.into());
            }
        }
    };

    let _ = ws.close(None).await;
    Ok(frame)
}
