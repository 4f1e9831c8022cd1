//! Server configuration, resolved once from the environment at startup.

use crate::AppState;
use api_shared::auth::SessionSigner;
use chs_core::constants::DEFAULT_DATA_DIR;
use chs_core::gateway::DEFAULT_WEBHOOK_SECRET;
use chs_core::{prepare_data_dir, CoreConfig, GatewayConfig, IntaSendGateway};
use std::path::PathBuf;
use std::sync::Arc;

const DEFAULT_REST_ADDR: &str = "0.0.0.0:3000";
const DEV_SESSION_SECRET: &str = "chs-development-session-secret";

/// Everything the REST server needs besides the router.
#[derive(Clone)]
pub struct RestConfig {
    pub addr: String,
    pub data_dir: PathBuf,
    pub session_secret: String,
    pub webhook_secret: String,
    pub public_base_url: Option<String>,
    pub gateway: GatewayConfig,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl RestConfig {
    /// Reads `CHS_*` and `INTASEND_*` variables, falling back to development defaults.
    pub fn from_env() -> Self {
        let session_secret = match std::env::var("CHS_SESSION_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ => {
                tracing::warn!("CHS_SESSION_SECRET is not set; using the development secret");
                DEV_SESSION_SECRET.to_string()
            }
        };
        let defaults = GatewayConfig::default();

        Self {
            addr: env_or("CHS_REST_ADDR", DEFAULT_REST_ADDR),
            data_dir: PathBuf::from(env_or("CHS_DATA_DIR", DEFAULT_DATA_DIR)),
            session_secret,
            webhook_secret: env_or("INTASEND_WEBHOOK_SECRET", DEFAULT_WEBHOOK_SECRET),
            public_base_url: std::env::var("CHS_PUBLIC_BASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            gateway: GatewayConfig {
                public_key: env_or("INTASEND_API_KEY", &defaults.public_key),
                secret_key: env_or("INTASEND_API_SECRET", &defaults.secret_key),
                base_url: env_or("INTASEND_BASE_URL", &defaults.base_url),
            },
        }
    }

    /// Prepares the data directory and builds the shared state with the live gateway.
    pub fn into_state(self) -> anyhow::Result<AppState> {
        let cfg = CoreConfig::new(self.data_dir)?;
        prepare_data_dir(&cfg)?;
        tracing::info!("gateway: {:?}", self.gateway);

        Ok(AppState {
            cfg: Arc::new(cfg),
            sessions: Arc::new(SessionSigner::new(self.session_secret)),
            gateway: Arc::new(IntaSendGateway::new(self.gateway)),
            webhook_secret: self.webhook_secret.into(),
            public_base_url: self.public_base_url.map(Into::into),
        })
    }
}
