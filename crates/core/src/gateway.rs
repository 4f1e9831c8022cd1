//! Hosted-checkout payment gateway (IntaSend).
//!
//! Outbound: one blocking `POST {base_url}payment/collection/` per payment, 30 second timeout,
//! no retry. Callers on an async runtime must run [`CheckoutGateway::create_checkout`] on a
//! blocking thread.
//!
//! Inbound: webhook bodies are authenticated with a hex HMAC-SHA256 signature.

use crate::{RecordError, RecordResult};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_PUBLIC_KEY: &str = "ISPubKey_test_placeholder";
pub const DEFAULT_SECRET_KEY: &str = "ISSecKey_test_placeholder";
pub const DEFAULT_BASE_URL: &str = "https://sandbox.intasend.com/api/v1/";
pub const DEFAULT_WEBHOOK_SECRET: &str = "whsec_test_placeholder";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Gateway credentials, resolved once at startup.
#[derive(Clone)]
pub struct GatewayConfig {
    pub public_key: String,
    pub secret_key: String,
    pub base_url: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            public_key: DEFAULT_PUBLIC_KEY.into(),
            secret_key: DEFAULT_SECRET_KEY.into(),
            base_url: DEFAULT_BASE_URL.into(),
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("public_key", &self.public_key)
            .field("secret_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Body sent to the gateway's collection endpoint.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CheckoutRequest {
    pub amount: f64,
    pub currency: String,
    pub email: String,
    pub phone_number: String,
    pub api_ref: String,
    pub comment: String,
    pub redirect_url: String,
    pub webhook_url: String,
}

/// A created checkout. `id` is echoed back by the webhook as `invoice_id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

pub trait CheckoutGateway: Send + Sync {
    /// Requests a hosted checkout page.
    ///
    /// # Errors
    ///
    /// [`RecordError::Gateway`] on any transport failure, non-201 answer or undecodable body.
    fn create_checkout(&self, request: &CheckoutRequest) -> RecordResult<CheckoutSession>;
}

#[derive(Clone, Debug)]
pub struct IntaSendGateway {
    cfg: GatewayConfig,
}

impl IntaSendGateway {
    pub fn new(cfg: GatewayConfig) -> Self {
        Self { cfg }
    }

    fn collection_url(&self) -> String {
        let base = &self.cfg.base_url;
        if base.ends_with('/') {
            format!("{base}payment/collection/")
        } else {
            format!("{base}/payment/collection/")
        }
    }
}

impl CheckoutGateway for IntaSendGateway {
    fn create_checkout(&self, request: &CheckoutRequest) -> RecordResult<CheckoutSession> {
        // Built per call: a blocking client must not be created or dropped on an async worker.
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RecordError::Gateway(format!("client setup failed: {e}")))?;

        let response = client
            .post(self.collection_url())
            .header("X-IntaSend-Public-Key-Id", &self.cfg.public_key)
            .json(request)
            .send()
            .map_err(|e| RecordError::Gateway(format!("request failed: {e}")))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| RecordError::Gateway(format!("unreadable response: {e}")))?;
        parse_checkout_response(status, &body)
    }
}

#[derive(Deserialize)]
struct CollectionResponse {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    url: Option<String>,
}

/// Interprets the collection endpoint's answer. Success is HTTP 201 with a `url`; a missing
/// `id` falls back to the url.
pub(crate) fn parse_checkout_response(status: u16, body: &str) -> RecordResult<CheckoutSession> {
    if status != 201 {
        return Err(RecordError::Gateway(format!("HTTP {status}: {body}")));
    }
    let parsed: CollectionResponse = serde_json::from_str(body)
        .map_err(|e| RecordError::Gateway(format!("undecodable body: {e}")))?;
    let url = parsed
        .url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| RecordError::Gateway("response has no checkout url".into()))?;

    let id = match parsed.id {
        Some(serde_json::Value::String(s)) if !s.is_empty() => s,
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => url.clone(),
    };
    Ok(CheckoutSession { id, url })
}

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign_webhook_body(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a webhook signature header.
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}
