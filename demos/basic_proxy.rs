//! Start a proxy-router server programmatically.
//!
//! Usage:
//!   cargo run --example basic_proxy

use proxy_router::{build_router, AppState, ProxyConfig, SharedLogger};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = ProxyConfig::find_and_load(None)?;

    println!("Target: {}", config.target_url);
    println!("Prefix: {}", config.prefix);

    let logger = SharedLogger::new("proxy-example.log")?;
    let client = config.http_client()?;

    let port = config.port;
    let state = Arc::new(AppState::new(config, client, logger)?);

    let app = build_router(state);
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("Listening on http://{}", addr);
    println!();
    println!("  OPENAI_BASE_URL=http://localhost:{}/v1", port);

    axum::serve(listener, app).await?;
    Ok(())
}
