//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own, with OpenAPI/Swagger UI.
//!
//! ## Intended use
//! Useful for development and debugging. The workspace's main `chs-run` binary serves the same
//! router.

use api_rest::{router, RestConfig};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the REST API server
///
/// # Environment Variables
/// - `CHS_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `CHS_DATA_DIR`: Data directory, created if missing (default: "chs_data")
/// - `CHS_SESSION_SECRET`: Session signing key
/// - `CHS_PUBLIC_BASE_URL`: Origin used for gateway redirect and webhook URLs
/// - `INTASEND_API_KEY`, `INTASEND_API_SECRET`, `INTASEND_BASE_URL`, `INTASEND_WEBHOOK_SECRET`
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the data directory cannot be prepared,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("chs_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = RestConfig::from_env();
    let addr = cfg.addr.clone();
    let state = cfg.into_state()?;

    tracing::info!("-- Starting CHS REST API on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
