//! Constants used throughout the community health core crate.
//!
//! This module contains path, filename and limit constants to ensure
//! consistency across the codebase.

/// Default directory for record storage when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "chs_data";

/// Directory name for account records.
pub const ACCOUNTS_DIR_NAME: &str = "accounts";

/// Directory name for per-patient git repositories.
pub const PATIENTS_DIR_NAME: &str = "patients";

/// Directory name for outreach events.
pub const EVENTS_DIR_NAME: &str = "outreach";

/// Directory name for payments.
pub const PAYMENTS_DIR_NAME: &str = "payments";

/// Directory name holding the exclusive-create uniqueness indexes.
pub const INDEX_DIR_NAME: &str = "index";

/// Directory name for the audit log.
pub const AUDIT_DIR_NAME: &str = "audit";

/// Filename for the append-only audit log.
pub const AUDIT_LOG_FILENAME: &str = "audit.jsonl";

/// Filename for account records.
pub const ACCOUNT_FILENAME: &str = "account.yaml";

/// Filename for patient demographics inside a patient repository.
pub const PATIENT_FILENAME: &str = "patient.yaml";

/// Directory for encounters inside a patient repository.
pub const ENCOUNTERS_DIR_NAME: &str = "encounters";

/// Filename for outreach event records.
pub const EVENT_FILENAME: &str = "event.yaml";

/// Directory for attendance records inside an event directory.
pub const ATTENDANCE_DIR_NAME: &str = "attendance";

/// Filename for payment records.
pub const PAYMENT_FILENAME: &str = "payment.yaml";

/// Prefix for patient numbers and payment references.
pub const REFERENCE_PREFIX: &str = "CHS";

/// Currency for all payments.
pub const CURRENCY: &str = "KES";

/// Payment method for gateway checkouts.
pub const PAYMENT_METHOD: &str = "mpesa";

/// Maximum results returned by the patient quick search.
pub const SEARCH_LIMIT: usize = 10;

/// Minimum query length for the patient quick search.
pub const SEARCH_MIN_QUERY_LEN: usize = 2;

/// Encounters shown on the patient detail view.
pub const RECENT_ENCOUNTERS: usize = 10;

/// Payments shown on the patient detail view.
pub const RECENT_PAYMENTS: usize = 5;

/// Upcoming events shown on the dashboard.
pub const UPCOMING_EVENTS: usize = 5;

/// Look-back window for a clinician's recent consultations.
pub const RECENT_CONSULTATION_DAYS: i64 = 30;

/// Largest payment amount accepted, in KES.
pub const MAX_PAYMENT_AMOUNT: f64 = 10_000_000.0;

/// Attempts to claim a fresh reference before giving up.
pub const MAX_REFERENCE_ATTEMPTS: usize = 5;

/// Default audit listing size.
pub const DEFAULT_AUDIT_LIMIT: usize = 100;

/// Care-Location used in commits when the author has no facility.
pub const DEFAULT_CARE_LOCATION: &str = "Community";
