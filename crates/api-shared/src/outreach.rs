//! Outreach event and attendance bodies.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct EventReq {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// e.g. `vaccination`, `screening`, `maternal_health`.
    pub event_type: String,
    /// RFC 3339 timestamp.
    pub start_date: String,
    /// RFC 3339 timestamp, not before `start_date`.
    pub end_date: String,
    pub location: String,
    #[serde(default)]
    pub target_county: Option<String>,
    #[serde(default)]
    pub target_subcounty: Option<String>,
    #[serde(default)]
    pub target_ward: Option<String>,
    #[serde(default)]
    pub max_participants: Option<u32>,
    #[serde(default)]
    pub target_age_min: Option<u32>,
    #[serde(default)]
    pub target_age_max: Option<u32>,
    /// `all`, `male` or `female`; defaults to `all`.
    #[serde(default)]
    pub target_gender: Option<String>,
    /// `planned`, `ongoing`, `completed` or `cancelled`; defaults to `planned`.
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct EventRes {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub event_type: String,
    pub start_date: String,
    pub end_date: String,
    pub location: String,
    pub target_county: Option<String>,
    pub target_subcounty: Option<String>,
    pub target_ward: Option<String>,
    pub max_participants: Option<u32>,
    pub target_age_min: Option<u32>,
    pub target_age_max: Option<u32>,
    pub target_gender: String,
    pub organizer_id: String,
    pub status: String,
    pub attendance_count: u32,
    pub is_full: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ListEventsRes {
    pub events: Vec<EventRes>,
}

#[derive(Clone, Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListEventsQuery {
    /// Restrict to one status.
    pub status: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct EventDetailRes {
    pub event: EventRes,
    pub attendances: Vec<AttendanceRes>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct AttendanceReq {
    pub patient_id: String,
    #[serde(default)]
    pub services_received: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct AttendanceRes {
    pub event_id: String,
    pub patient_id: String,
    pub attendance_time: String,
    pub services_received: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: String,
    pub created_at: String,
}
