//! Wire codec for the feed's JSON text frames.
//!
//! Requests are `ticks_history` envelopes; responses come back either as a
//! `history` frame (parallel `times`/`prices` arrays) or, for candle windows,
//! a `candles` frame. The feed echoes the request back in `echo_req`, which
//! is the only place a response names its instrument; the connection manager
//! relies on that tag to drop responses that arrive after an instrument
//! switch.

use serde::{Deserialize, Serialize};

use crate::errors::{FeedError, Result};
use crate::models::Candle;

/// Outbound request for the N most recent samples ending at "latest".
#[derive(Debug, Clone, Serialize)]
pub struct HistoryRequest {
    pub ticks_history: String,
    pub count: u32,
    pub end: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjust_start_time: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granularity: Option<u32>,
}

impl HistoryRequest {
    /// Single most recent tick for a symbol.
    pub fn latest_tick(symbol: &str) -> Self {
        Self {
            ticks_history: symbol.to_string(),
            count: 1,
            end: "latest",
            adjust_start_time: None,
            start: None,
            style: None,
            granularity: None,
        }
    }

    /// Historical candle window ending at latest.
    pub fn candles(symbol: &str, count: u32, granularity_secs: u32) -> Self {
        Self {
            ticks_history: symbol.to_string(),
            count,
            end: "latest",
            adjust_start_time: Some(1),
            start: Some(1),
            style: Some("candles"),
            granularity: Some(granularity_secs),
        }
    }
}

/// Serialize a request into a text frame.
pub fn encode(request: &HistoryRequest) -> Result<String> {
    Ok(serde_json::to_string(request)?)
}

/// A parsed response frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    History {
        /// Instrument tag echoed from the request, if present.
        symbol: Option<String>,
        times: Vec<i64>,
        prices: Vec<f64>,
    },
    Candles {
        symbol: Option<String>,
        candles: Vec<Candle>,
    },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    msg_type: Option<String>,
    error: Option<ErrorBody>,
    echo_req: Option<EchoReq>,
    history: Option<HistoryBody>,
    candles: Option<Vec<Candle>>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EchoReq {
    ticks_history: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryBody {
    times: Vec<i64>,
    prices: Vec<f64>,
}

/// Parse a raw text frame into a [`Frame`].
///
/// Non-JSON input is a `Codec` error; well-formed frames of an unexpected
/// kind (including feed-reported errors) are `Protocol` errors. Neither is
/// fatal to the connection.
pub fn parse_frame(raw: &str) -> Result<Frame> {
    let env: Envelope = serde_json::from_str(raw)?;

    if let Some(err) = env.error {
        return Err(FeedError::Protocol(format!(
            "feed error {}: {}",
            err.code.unwrap_or_else(|| "unknown".into()),
            err.message.unwrap_or_default()
        )));
    }

    let symbol = env.echo_req.and_then(|e| e.ticks_history);

    match env.msg_type.as_deref() {
        Some("history") => {
            let history = env
                .history
                .ok_or_else(|| FeedError::Protocol("history frame without history body".into()))?;
            Ok(Frame::History {
                symbol,
                times: history.times,
                prices: history.prices,
            })
        }
        Some("candles") => {
            let candles = env
                .candles
                .ok_or_else(|| FeedError::Protocol("candles frame without candles body".into()))?;
            Ok(Frame::Candles { symbol, candles })
        }
        other => Err(FeedError::Protocol(format!(
            "unexpected msg_type: {}",
            other.unwrap_or("<missing>")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_tick_request_shape() {
        let raw = encode(&HistoryRequest::latest_tick("R_50")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["ticks_history"], "R_50");
        assert_eq!(value["count"], 1);
        assert_eq!(value["end"], "latest");
        // optional window fields must be absent for live-tick queries
        assert!(value.get("style").is_none());
        assert!(value.get("granularity").is_none());
    }

    #[test]
    fn candles_request_carries_window_fields() {
        let raw = encode(&HistoryRequest::candles("R_100", 4321, 600)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["style"], "candles");
        assert_eq!(value["granularity"], 600);
        assert_eq!(value["adjust_start_time"], 1);
        assert_eq!(value["start"], 1);
    }

    #[test]
    fn parses_history_frame_with_echo_tag() {
        let raw = r#"{
            "msg_type": "history",
            "echo_req": {"ticks_history": "R_50", "count": 1, "end": "latest"},
            "history": {"times": [1700000001], "prices": [245.67]}
        }"#;
        let frame = parse_frame(raw).unwrap();
        assert_eq!(
            frame,
            Frame::History {
                symbol: Some("R_50".into()),
                times: vec![1700000001],
                prices: vec![245.67],
            }
        );
    }

    #[test]
    fn parses_candles_frame() {
        let raw = r#"{
            "msg_type": "candles",
            "echo_req": {"ticks_history": "R_50"},
            "candles": [
                {"epoch": 1700000000, "open": 1.0, "high": 2.0, "low": 0.5, "close": 1.5},
                {"epoch": 1700000600, "open": 1.5, "high": 2.5, "low": 1.0, "close": 2.0}
            ]
        }"#;
        match parse_frame(raw).unwrap() {
            Frame::Candles { symbol, candles } => {
                assert_eq!(symbol.as_deref(), Some("R_50"));
                assert_eq!(candles.len(), 2);
                assert_eq!(candles[1].close, 2.0);
            }
            other => panic!("expected candles frame, got {other:?}"),
        }
    }

    #[test]
    fn malformed_payload_is_codec_error() {
        assert!(matches!(
            parse_frame("not json at all"),
            Err(FeedError::Codec(_))
        ));
    }

    #[test]
    fn unexpected_msg_type_is_protocol_error() {
        let raw = r#"{"msg_type": "tick", "tick": {"quote": 1.0}}"#;
        assert!(matches!(parse_frame(raw), Err(FeedError::Protocol(_))));
    }

    #[test]
    fn missing_history_body_is_protocol_error() {
        let raw = r#"{"msg_type": "history"}"#;
        assert!(matches!(parse_frame(raw), Err(FeedError::Protocol(_))));
    }

    #[test]
    fn feed_error_payload_is_protocol_error() {
        let raw = r#"{
            "msg_type": "history",
            "error": {"code": "InvalidSymbol", "message": "Symbol XYZ invalid"}
        }"#;
        match parse_frame(raw) {
            Err(FeedError::Protocol(msg)) => assert!(msg.contains("InvalidSymbol")),
            other => panic!("expected protocol error, got {other:?}"),
        }
    }
}
