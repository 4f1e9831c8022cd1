//! Append-only audit trail.
//!
//! Entries are JSON lines appended to a single log file. Recording is best-effort: the business
//! operation has already been committed when the entry is written, so a failure here is
//! logged at `warn` and otherwise ignored.

use crate::access::{Operation, RequestContext};
use crate::config::CoreConfig;
use crate::{RecordError, RecordResult};
use api_shared::AuditEntryRes;
use chrono::{DateTime, Utc};
use chs_uuid::ShardableUuid;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    UserLogin,
    FailedLogin,
    UserRegistration,
    UserLogout,
    UserStatusChanged,
    PatientCreated,
    PatientUpdated,
    HealthRecordCreated,
    OutreachEventCreated,
    OutreachEventUpdated,
    OutreachEventDeleted,
    EventAttendanceRecorded,
    PaymentInitiated,
    PaymentWebhook,
    PaymentRefunded,
}

impl AuditAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            AuditAction::UserLogin => "user_login",
            AuditAction::FailedLogin => "failed_login",
            AuditAction::UserRegistration => "user_registration",
            AuditAction::UserLogout => "user_logout",
            AuditAction::UserStatusChanged => "user_status_changed",
            AuditAction::PatientCreated => "patient_created",
            AuditAction::PatientUpdated => "patient_updated",
            AuditAction::HealthRecordCreated => "health_record_created",
            AuditAction::OutreachEventCreated => "outreach_event_created",
            AuditAction::OutreachEventUpdated => "outreach_event_updated",
            AuditAction::OutreachEventDeleted => "outreach_event_deleted",
            AuditAction::EventAttendanceRecorded => "event_attendance_recorded",
            AuditAction::PaymentInitiated => "payment_initiated",
            AuditAction::PaymentWebhook => "payment_webhook",
            AuditAction::PaymentRefunded => "payment_refunded",
        }
    }
}

/// One line of the audit log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: ShardableUuid,
    pub actor_id: Option<ShardableUuid>,
    pub action: AuditAction,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub details: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<AuditEntry> for AuditEntryRes {
    fn from(entry: AuditEntry) -> Self {
        AuditEntryRes {
            id: entry.id.to_string(),
            actor_id: entry.actor_id.map(|id| id.to_string()),
            action: entry.action.as_str().to_string(),
            resource_type: entry.resource_type,
            resource_id: entry.resource_id,
            details: entry.details,
            ip_address: entry.ip_address,
            user_agent: entry.user_agent,
            created_at: entry.created_at.to_rfc3339(),
        }
    }
}

/// The affected resource of an audited action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditResource {
    pub kind: &'static str,
    pub id: Option<String>,
}

impl AuditResource {
    pub fn new(kind: &'static str, id: impl ToString) -> Self {
        Self {
            kind,
            id: Some(id.to_string()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuditService {
    cfg: Arc<CoreConfig>,
}

impl AuditService {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self { cfg }
    }

    /// Append an entry attributed to the context's actor. Never fails.
    pub fn record(
        &self,
        ctx: &RequestContext,
        action: AuditAction,
        resource: Option<AuditResource>,
        details: impl Into<String>,
    ) {
        let (resource_type, resource_id) = match resource {
            Some(r) => (Some(r.kind.to_string()), r.id),
            None => (None, None),
        };
        let entry = AuditEntry {
            id: ShardableUuid::new(),
            actor_id: ctx.actor_id().cloned(),
            action,
            resource_type,
            resource_id,
            details: details.into(),
            ip_address: ctx.origin.ip_address.clone(),
            user_agent: ctx.origin.user_agent.clone(),
            created_at: Utc::now(),
        };

        if let Err(e) = self.append(&entry) {
            tracing::warn!("audit write failed for {}: {}", action.as_str(), e);
        }
    }

    fn append(&self, entry: &AuditEntry) -> RecordResult<()> {
        let path = self.cfg.audit_log_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(RecordError::StorageDirCreation)?;
        }
        let mut line = serde_json::to_string(entry).map_err(RecordError::Serialization)?;
        line.push('\n');

        // A single write on an O_APPEND handle keeps concurrent lines whole.
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(RecordError::FileWrite)?;
        file.write_all(line.as_bytes())
            .map_err(RecordError::FileWrite)
    }

    /// Most recent entries, newest first.
    ///
    /// Lines that do not parse are logged and skipped.
    pub fn recent(&self, limit: usize) -> RecordResult<Vec<AuditEntry>> {
        let path = self.cfg.audit_log_path();
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(RecordError::FileRead(e)),
        };

        let lines: Vec<&str> = contents.lines().collect();
        let mut entries = Vec::new();
        for (n, line) in lines.iter().enumerate().rev() {
            if entries.len() >= limit {
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!("skipping audit line {}: {}", n + 1, e),
            }
        }
        Ok(entries)
    }

    /// [`AuditService::recent`] for an administrator.
    pub fn list(&self, ctx: &RequestContext, limit: usize) -> RecordResult<Vec<AuditEntry>> {
        ctx.actor()?.authorize(Operation::ViewAuditTrail)?;
        self.recent(limit)
    }
}
