//! Configuration loader and application settings.

use std::str::FromStr;
use std::time::Duration;

use crate::feed::FeedConfig;

/// Consolidated application configuration, read from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// WebSocket endpoint of the upstream quote feed.
    pub ws_url: String,
    /// Symbol served by the HTTP layer when none is specified.
    pub default_symbol: String,
    /// Port for the HTTP front-end.
    pub http_port: u16,
    /// Delay between reconnect attempts of the persistent connection.
    pub reconnect_delay: Duration,
    /// Reconnect attempt cap, 0 = retry forever.
    pub max_reconnect_attempts: u32,
    /// Minimum interval between outbound one-shot requests.
    pub throttle_window: Duration,
    /// How long a poll waits for the receive loop to deliver a fresh tick.
    pub refresh_wait: Duration,
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults of the upstream feed (Deriv public API, symbol R_50).
    pub fn load() -> Self {
        Self {
            ws_url: env_or(
                "FEED_WS_URL",
                "wss://ws.derivws.com/websockets/v3?app_id=16929".to_string(),
            ),
            default_symbol: env_or("DEFAULT_SYMBOL", "R_50".to_string()),
            http_port: env_or("HTTP_PORT", 5000),
            reconnect_delay: Duration::from_secs(env_or("RECONNECT_DELAY_SECS", 2)),
            max_reconnect_attempts: env_or("MAX_RECONNECT_ATTEMPTS", 0),
            throttle_window: Duration::from_millis(env_or("THROTTLE_MS", 100)),
            refresh_wait: Duration::from_millis(env_or("REFRESH_WAIT_MS", 200)),
        }
    }

    /// The subset of settings owned by the connection manager.
    pub fn feed(&self) -> FeedConfig {
        FeedConfig {
            ws_url: self.ws_url.clone(),
            reconnect_delay: self.reconnect_delay,
            max_reconnect_attempts: self.max_reconnect_attempts,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
