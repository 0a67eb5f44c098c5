//! Hosting glue for the agent-relay hub.
//!
//! Run with: cargo run -p hub-server
//!
//! Actors connect to ws://<bind>/ws, monitors to ws://<bind>/monitor.
//! Set RELAY_BIND to change the listen address.

use std::net::SocketAddr;

use agent_relay_hub::Hub;
use agent_relay_transport::relay_router;
use anyhow::Context;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let addr: SocketAddr = std::env::var("RELAY_BIND")
        .unwrap_or_else(|_| "127.0.0.1:4800".to_string())
        .parse()
        .context("invalid RELAY_BIND address")?;

    let (handle, _hub_task) = Hub::spawn();
    let app = relay_router(handle)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    tracing::info!("relay hub listening on ws://{addr}/ws");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
