//! Outreach events and attendance.
//!
//! ```text
//! outreach/<s1>/<s2>/<event uuid>/
//!     event.yaml
//!     attendance/<patient uuid>.yaml
//! ```
//!
//! One attendance file per patient, created with exclusive-create, so a patient can be recorded
//! at most once per event even under concurrent requests.

use crate::access::{Actor, Operation, RequestContext, Scope};
use crate::audit::{AuditAction, AuditResource, AuditService};
use crate::config::CoreConfig;
use crate::constants::{ATTENDANCE_DIR_NAME, EVENT_FILENAME};
use crate::patients::PatientService;
use crate::store::{create_new_yaml, create_unique_record_dir, list_sharded, read_yaml_opt, write_yaml};
use crate::validation::{FieldErrors, NOT_A_CHOICE};
use crate::{RecordError, RecordResult};
use api_shared::{AttendanceReq, AttendanceRes, EventDetailRes, EventReq, EventRes};
use chrono::{DateTime, Utc};
use chs_uuid::ShardableUuid;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Vaccination,
    Screening,
    Education,
    Nutrition,
    MaternalHealth,
    ChildHealth,
    FamilyPlanning,
    MentalHealth,
    ChronicDisease,
    EmergencyPrep,
}

impl EventType {
    pub const ALL: [EventType; 10] = [
        EventType::Vaccination,
        EventType::Screening,
        EventType::Education,
        EventType::Nutrition,
        EventType::MaternalHealth,
        EventType::ChildHealth,
        EventType::FamilyPlanning,
        EventType::MentalHealth,
        EventType::ChronicDisease,
        EventType::EmergencyPrep,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            EventType::Vaccination => "vaccination",
            EventType::Screening => "screening",
            EventType::Education => "education",
            EventType::Nutrition => "nutrition",
            EventType::MaternalHealth => "maternal_health",
            EventType::ChildHealth => "child_health",
            EventType::FamilyPlanning => "family_planning",
            EventType::MentalHealth => "mental_health",
            EventType::ChronicDisease => "chronic_disease",
            EventType::EmergencyPrep => "emergency_prep",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Planned,
    Ongoing,
    Completed,
    Cancelled,
}

impl EventStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            EventStatus::Planned => "planned",
            EventStatus::Ongoing => "ongoing",
            EventStatus::Completed => "completed",
            EventStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "planned" => Some(EventStatus::Planned),
            "ongoing" => Some(EventStatus::Ongoing),
            "completed" => Some(EventStatus::Completed),
            "cancelled" => Some(EventStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetGender {
    #[default]
    All,
    Male,
    Female,
}

impl TargetGender {
    pub const fn as_str(self) -> &'static str {
        match self {
            TargetGender::All => "all",
            TargetGender::Male => "male",
            TargetGender::Female => "female",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "all" => Some(TargetGender::All),
            "male" => Some(TargetGender::Male),
            "female" => Some(TargetGender::Female),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutreachEvent {
    pub id: ShardableUuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub event_type: EventType,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
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
    #[serde(default)]
    pub target_gender: TargetGender,
    pub organizer_id: ShardableUuid,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OutreachEvent {
    pub fn is_full(&self, attendance_count: u32) -> bool {
        self.max_participants
            .is_some_and(|max| attendance_count >= max)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendance {
    pub id: ShardableUuid,
    pub event_id: ShardableUuid,
    pub patient_id: ShardableUuid,
    pub attendance_time: DateTime<Utc>,
    #[serde(default)]
    pub services_received: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub recorded_by: ShardableUuid,
    pub created_at: DateTime<Utc>,
}

impl From<&Attendance> for AttendanceRes {
    fn from(a: &Attendance) -> Self {
        AttendanceRes {
            event_id: a.event_id.to_string(),
            patient_id: a.patient_id.to_string(),
            attendance_time: a.attendance_time.to_rfc3339(),
            services_received: a.services_received.clone(),
            notes: a.notes.clone(),
            recorded_by: a.recorded_by.to_string(),
            created_at: a.created_at.to_rfc3339(),
        }
    }
}

pub fn event_res(event: &OutreachEvent, attendance_count: u32) -> EventRes {
    EventRes {
        id: event.id.to_string(),
        title: event.title.clone(),
        description: event.description.clone(),
        event_type: event.event_type.as_str().to_string(),
        start_date: event.start_date.to_rfc3339(),
        end_date: event.end_date.to_rfc3339(),
        location: event.location.clone(),
        target_county: event.target_county.clone(),
        target_subcounty: event.target_subcounty.clone(),
        target_ward: event.target_ward.clone(),
        max_participants: event.max_participants,
        target_age_min: event.target_age_min,
        target_age_max: event.target_age_max,
        target_gender: event.target_gender.as_str().to_string(),
        organizer_id: event.organizer_id.to_string(),
        status: event.status.as_str().to_string(),
        attendance_count,
        is_full: event.is_full(attendance_count),
        created_at: event.created_at.to_rfc3339(),
        updated_at: event.updated_at.to_rfc3339(),
    }
}

/// An event with its attendance list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventDetail {
    pub event: OutreachEvent,
    pub attendances: Vec<Attendance>,
}

impl EventDetail {
    pub fn attendance_count(&self) -> u32 {
        u32::try_from(self.attendances.len()).unwrap_or(u32::MAX)
    }

    pub fn into_res(self) -> EventDetailRes {
        EventDetailRes {
            event: event_res(&self.event, self.attendance_count()),
            attendances: self.attendances.iter().map(Into::into).collect(),
        }
    }
}

/// Validated editable fields of an event.
struct EventFields {
    title: String,
    description: Option<String>,
    event_type: EventType,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    location: String,
    target_county: Option<String>,
    target_subcounty: Option<String>,
    target_ward: Option<String>,
    max_participants: Option<u32>,
    target_age_min: Option<u32>,
    target_age_max: Option<u32>,
    target_gender: TargetGender,
    status: Option<EventStatus>,
}

impl EventFields {
    fn validate(req: &EventReq) -> RecordResult<Self> {
        let mut errors = FieldErrors::default();

        let title = errors.required("title", &req.title, 200);
        let event_type = errors.choice("event_type", &req.event_type, EventType::from_wire);
        let start_date = errors.datetime("start_date", &req.start_date);
        let end_date = errors.datetime("end_date", &req.end_date);
        let location = errors.required("location", &req.location, 200);
        let target_county = errors.optional("target_county", req.target_county.as_deref(), 100);
        let target_subcounty =
            errors.optional("target_subcounty", req.target_subcounty.as_deref(), 100);
        let target_ward = errors.optional("target_ward", req.target_ward.as_deref(), 100);

        let max_participants = match req.max_participants {
            Some(0) => {
                errors.add("max_participants", "Number must be at least 1.");
                None
            }
            other => other,
        };
        let target_age_min = errors.in_range("target_age_min", req.target_age_min, 0..=120);
        let target_age_max = errors.in_range("target_age_max", req.target_age_max, 0..=120);
        if let (Some(min), Some(max)) = (target_age_min, target_age_max) {
            if min > max {
                errors.add(
                    "target_age_max",
                    "Maximum age cannot be less than minimum age.",
                );
            }
        }

        let target_gender = match req.target_gender.as_deref().map(str::trim) {
            None | Some("") => Some(TargetGender::All),
            Some(g) => errors.choice("target_gender", g, TargetGender::from_wire),
        };
        let status = match req.status.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) => {
                let parsed = EventStatus::from_wire(s);
                if parsed.is_none() {
                    errors.add("status", NOT_A_CHOICE);
                }
                parsed
            }
        };

        if let (Some(start), Some(end)) = (start_date, end_date) {
            if end < start {
                errors.add("end_date", "End date must be after start date.");
            }
        }

        match (title, event_type, start_date, end_date, location, target_gender) {
            (
                Some(title),
                Some(event_type),
                Some(start_date),
                Some(end_date),
                Some(location),
                Some(target_gender),
            ) => {
                errors.finish()?;
                Ok(Self {
                    title: title.into_inner(),
                    description: FieldErrors::free_text(req.description.as_deref()),
                    event_type,
                    start_date,
                    end_date,
                    location: location.into_inner(),
                    target_county,
                    target_subcounty,
                    target_ward,
                    max_participants,
                    target_age_min,
                    target_age_max,
                    target_gender,
                    status,
                })
            }
            _ => Err(errors.into()),
        }
    }

    fn apply(self, event: &mut OutreachEvent) {
        event.title = self.title;
        event.description = self.description;
        event.event_type = self.event_type;
        event.start_date = self.start_date;
        event.end_date = self.end_date;
        event.location = self.location;
        event.target_county = self.target_county;
        event.target_subcounty = self.target_subcounty;
        event.target_ward = self.target_ward;
        event.max_participants = self.max_participants;
        event.target_age_min = self.target_age_min;
        event.target_age_max = self.target_age_max;
        event.target_gender = self.target_gender;
        if let Some(status) = self.status {
            event.status = status;
        }
    }
}

/// Organiser or administrator.
fn ensure_organiser(actor: &Actor, event: &OutreachEvent) -> RecordResult<()> {
    actor.authorize(Operation::ManageEvents)?;
    if actor.owns(Operation::ManageEvents, &[Some(&event.organizer_id)]) {
        Ok(())
    } else {
        Err(RecordError::AccessDenied)
    }
}

#[derive(Clone, Debug)]
pub struct OutreachService {
    cfg: Arc<CoreConfig>,
}

impl OutreachService {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self { cfg }
    }

    fn audit(&self) -> AuditService {
        AuditService::new(self.cfg.clone())
    }

    fn event_dir(&self, id: &ShardableUuid) -> PathBuf {
        id.sharded_dir(&self.cfg.events_dir())
    }

    fn attendance_dir(&self, id: &ShardableUuid) -> PathBuf {
        self.event_dir(id).join(ATTENDANCE_DIR_NAME)
    }

    fn load(&self, id: &ShardableUuid) -> RecordResult<OutreachEvent> {
        read_yaml_opt(&self.event_dir(id).join(EVENT_FILENAME))?
            .ok_or(RecordError::NotFound("event"))
    }

    fn parse_id(id: &str) -> RecordResult<ShardableUuid> {
        ShardableUuid::parse(id).map_err(|_| RecordError::NotFound("event"))
    }

    /// Creates an event organised by the acting account.
    pub fn create(&self, ctx: &RequestContext, req: &EventReq) -> RecordResult<OutreachEvent> {
        let actor = ctx.actor()?;
        actor.authorize(Operation::ManageEvents)?;
        let fields = EventFields::validate(req)?;

        let (id, dir) = create_unique_record_dir(&self.cfg.events_dir())?;
        let now = Utc::now();
        let mut event = OutreachEvent {
            id,
            title: String::new(),
            description: None,
            event_type: fields.event_type,
            start_date: fields.start_date,
            end_date: fields.end_date,
            location: String::new(),
            target_county: None,
            target_subcounty: None,
            target_ward: None,
            max_participants: None,
            target_age_min: None,
            target_age_max: None,
            target_gender: TargetGender::All,
            organizer_id: actor.id.clone(),
            status: EventStatus::Planned,
            created_at: now,
            updated_at: now,
        };
        fields.apply(&mut event);

        if let Err(e) = write_yaml(&dir.join(EVENT_FILENAME), &event) {
            let _ = fs::remove_dir_all(&dir);
            return Err(e);
        }

        tracing::info!("created outreach event {}", event.id);
        self.audit().record(
            ctx,
            AuditAction::OutreachEventCreated,
            Some(AuditResource::new("outreach_event", &event.id)),
            format!("Outreach event created: {}", event.title),
        );
        Ok(event)
    }

    /// Event with its attendances. Any authenticated account may view an event.
    pub fn detail(&self, ctx: &RequestContext, id: &str) -> RecordResult<EventDetail> {
        ctx.actor()?;
        let id = Self::parse_id(id)?;
        let event = self.load(&id)?;
        let mut attendances = self.attendances(&id);
        attendances.sort_by(|a, b| a.attendance_time.cmp(&b.attendance_time));
        Ok(EventDetail { event, attendances })
    }

    fn attendances(&self, id: &ShardableUuid) -> Vec<Attendance> {
        let entries = match fs::read_dir(self.attendance_dir(id)) {
            Ok(entries) => entries,
            Err(_) => return vec![],
        };
        let mut attendances = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            match read_yaml_opt::<Attendance>(&path) {
                Ok(Some(a)) => attendances.push(a),
                Ok(None) => {}
                Err(e) => tracing::warn!("failed to parse {}: {}", path.display(), e),
            }
        }
        attendances
    }

    pub fn attendance_count(&self, id: &ShardableUuid) -> u32 {
        u32::try_from(self.attendances(id).len()).unwrap_or(u32::MAX)
    }

    pub(crate) fn all(&self) -> Vec<OutreachEvent> {
        list_sharded(&self.cfg.events_dir(), EVENT_FILENAME, |s| {
            serde_yaml::from_str::<OutreachEvent>(s).map_err(RecordError::YamlDeserialization)
        })
    }

    /// Events visible to the actor, newest start date first.
    ///
    /// `status` of `None` or `"all"` lists every status.
    pub fn list(&self, ctx: &RequestContext, status: Option<&str>) -> RecordResult<Vec<OutreachEvent>> {
        let actor = ctx.actor()?;
        let scope = actor.authorize(Operation::ListEvents)?;
        let status = match status.map(str::trim).filter(|s| !s.is_empty() && *s != "all") {
            Some(s) => Some(
                EventStatus::from_wire(s).ok_or_else(|| RecordError::field("status", NOT_A_CHOICE))?,
            ),
            None => None,
        };

        let mut events: Vec<OutreachEvent> = self
            .all()
            .into_iter()
            .filter(|e| scope != Scope::Own || e.organizer_id == actor.id)
            .filter(|e| status.map_or(true, |s| e.status == s))
            .collect();
        events.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Ok(events)
    }

    /// Events starting at or after the start of `now`'s day, soonest first.
    pub(crate) fn upcoming(&self, now: DateTime<Utc>, limit: usize) -> Vec<OutreachEvent> {
        let today = now.date_naive();
        let mut events: Vec<OutreachEvent> = self
            .all()
            .into_iter()
            .filter(|e| e.start_date.date_naive() >= today)
            .collect();
        events.sort_by(|a, b| a.start_date.cmp(&b.start_date));
        events.truncate(limit);
        events
    }

    pub fn update(&self, ctx: &RequestContext, id: &str, req: &EventReq) -> RecordResult<OutreachEvent> {
        let actor = ctx.actor()?;
        let id = Self::parse_id(id)?;
        let mut event = self.load(&id)?;
        ensure_organiser(actor, &event)?;

        let fields = EventFields::validate(req)?;
        fields.apply(&mut event);
        event.updated_at = Utc::now();
        write_yaml(&self.event_dir(&id).join(EVENT_FILENAME), &event)?;

        self.audit().record(
            ctx,
            AuditAction::OutreachEventUpdated,
            Some(AuditResource::new("outreach_event", &event.id)),
            format!("Outreach event updated: {}", event.title),
        );
        Ok(event)
    }

    /// Removes the event together with its attendance records.
    pub fn delete(&self, ctx: &RequestContext, id: &str) -> RecordResult<()> {
        let actor = ctx.actor()?;
        let id = Self::parse_id(id)?;
        let event = self.load(&id)?;
        ensure_organiser(actor, &event)?;

        match fs::remove_dir_all(self.event_dir(&id)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(RecordError::NotFound("event")),
            Err(e) => return Err(RecordError::FileWrite(e)),
        }

        tracing::info!("deleted outreach event {}", id);
        self.audit().record(
            ctx,
            AuditAction::OutreachEventDeleted,
            Some(AuditResource::new("outreach_event", &id)),
            format!("Outreach event deleted: {}", event.title),
        );
        Ok(())
    }

    /// Records that a patient attended an event.
    ///
    /// # Errors
    ///
    /// - [`RecordError::AlreadyRecorded`] if the patient is already on the list.
    /// - [`RecordError::EventFull`] once attendance reaches `max_participants`.
    /// - [`RecordError::AccessDenied`] if the actor may not read the patient.
    pub fn record_attendance(
        &self,
        ctx: &RequestContext,
        event_id: &str,
        req: &AttendanceReq,
    ) -> RecordResult<Attendance> {
        let actor = ctx.actor()?;
        actor.authorize(Operation::RecordAttendance)?;
        let event_id = Self::parse_id(event_id)?;
        let event = self.load(&event_id)?;

        let patient_id = ShardableUuid::parse(req.patient_id.trim())
            .map_err(|_| RecordError::field("patient_id", NOT_A_CHOICE))?;
        let patient = PatientService::with_id(self.cfg.clone(), &patient_id.to_string())?
            .read(ctx, Operation::ReadPatient)?;

        let dir = self.attendance_dir(&event_id);
        let path = dir.join(format!("{patient_id}.yaml"));
        if path.exists() {
            return Err(RecordError::AlreadyRecorded);
        }
        if event.is_full(self.attendance_count(&event_id)) {
            return Err(RecordError::EventFull);
        }

        let now = Utc::now();
        let attendance = Attendance {
            id: ShardableUuid::new(),
            event_id: event_id.clone(),
            patient_id,
            attendance_time: now,
            services_received: FieldErrors::free_text(req.services_received.as_deref()),
            notes: FieldErrors::free_text(req.notes.as_deref()),
            recorded_by: actor.id.clone(),
            created_at: now,
        };
        fs::create_dir_all(&dir).map_err(RecordError::StorageDirCreation)?;
        if !create_new_yaml(&path, &attendance)? {
            return Err(RecordError::AlreadyRecorded);
        }

        self.audit().record(
            ctx,
            AuditAction::EventAttendanceRecorded,
            Some(AuditResource::new("event_attendance", &attendance.id)),
            format!(
                "Attendance recorded for {} at {}",
                patient.full_name(),
                event.title
            ),
        );
        Ok(attendance)
    }
}
