use api_rest::{router, RestConfig};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the community health records service
///
/// Loads `.env`, resolves configuration from the environment, prepares the data directory and
/// serves the REST API (default `0.0.0.0:3000`, configurable via `CHS_REST_ADDR`).
///
/// # Environment Variables
/// - `CHS_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `CHS_DATA_DIR`: Directory for all records (default: "chs_data")
/// - `CHS_SESSION_SECRET`: Session signing key; a development key is used when unset
/// - `CHS_PUBLIC_BASE_URL`: Optional public origin for gateway callbacks
/// - `INTASEND_*`: Payment gateway credentials and webhook secret
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If startup or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chs_run=info".parse()?)
                .add_directive("chs_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = RestConfig::from_env();
    let rest_addr = cfg.addr.clone();
    let state = cfg.into_state()?;

    tracing::info!("++ Starting CHS REST on {}", rest_addr);

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
