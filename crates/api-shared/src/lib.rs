//! # API Shared
//!
//! Shared request/response types and utilities for the community health APIs.
//!
//! Contains:
//! - JSON request and response bodies with OpenAPI schemas ([`accounts`], [`patients`],
//!   [`outreach`], [`payments`], [`audit`])
//! - [`HealthService`]
//! - Session token signing and verification ([`auth`])
//!
//! Enumerated fields (roles, event types, payment types, statuses) travel as plain strings;
//! the core services parse and validate them so that a bad value becomes a field error rather
//! than a body-decoding failure.

pub mod accounts;
pub mod audit;
pub mod auth;
pub mod health;
pub mod outreach;
pub mod patients;
pub mod payments;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

pub use accounts::*;
pub use audit::*;
pub use health::{HealthRes, HealthService};
pub use outreach::*;
pub use patients::*;
pub use payments::*;

/// Error body returned by every failing endpoint.
///
/// `fields` is present only for validation failures and maps a request field name to the
/// messages raised against it.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ErrorRes {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, Vec<String>>>,
}

impl ErrorRes {
    pub fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            fields: None,
        }
    }
}

/// Plain acknowledgement carrying a human-readable message.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct MessageRes {
    pub message: String,
}
