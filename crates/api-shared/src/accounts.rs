//! Account, session and dashboard bodies.

use crate::outreach::EventRes;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Self-registration form.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterReq {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub first_name: String,
    pub last_name: String,
    /// One of `admin`, `doctor`, `chw`.
    pub role: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub county: Option<String>,
    #[serde(default)]
    pub subcounty: Option<String>,
    #[serde(default)]
    pub ward: Option<String>,
    #[serde(default)]
    pub facility_name: Option<String>,
    #[serde(default)]
    pub license_number: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginReq {
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct AccountRes {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub role: String,
    pub phone: Option<String>,
    pub county: Option<String>,
    pub subcounty: Option<String>,
    pub ward: Option<String>,
    pub facility_name: Option<String>,
    pub license_number: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub last_login: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct LoginRes {
    pub message: String,
    pub account: AccountRes,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ListAccountsRes {
    pub accounts: Vec<AccountRes>,
}

#[derive(Clone, Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListAccountsQuery {
    /// Restrict to one role (`admin`, `doctor`, `chw`).
    pub role: Option<String>,
    /// Include deactivated accounts.
    #[serde(default)]
    pub include_inactive: bool,
}

/// Role-specific counters. Only the counters relevant to the caller's role are present.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct DashboardStatsRes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_users: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_patients: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_events: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_payments: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_patients: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_consultations: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_events: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_allowances: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct DashboardRes {
    pub role: String,
    pub stats: DashboardStatsRes,
    pub upcoming_events: Vec<EventRes>,
}
