use std::sync::Arc;

use anyhow::Result;
use tick_bridge::config::AppConfig;
use tick_bridge::feed::FeedClient;
use tick_bridge::service::TickService;
use tick_bridge::{http, utils};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    utils::init_logging();

    let cfg = AppConfig::load();
    tracing::info!(
        ws_url = %cfg.ws_url,
        default_symbol = %cfg.default_symbol,
        "[INIT] tick-bridge starting"
    );

    // Persistent connection supervisor; reconnects on its own for as long as
    // the process lives (or until the configured attempt cap is hit).
    let (client, _feed_task) = FeedClient::spawn(cfg.feed())?;
    client.switch_symbol(&cfg.default_symbol).await;

    let service = Arc::new(TickService::persistent(&cfg, client));
    let app = http::router(service, cfg.default_symbol.clone());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cfg.http_port)).await?;
    tracing::info!(port = cfg.http_port, "[INIT] http listening");
    axum::serve(listener, app).await?;
    Ok(())
}
