//! # CHS Core
//!
//! Core business logic for the community health records service.
//!
//! This crate contains the domain services and their file/folder storage:
//! - Accounts, sessions and role-based access control ([`accounts`], [`access`])
//! - Patients and encounters in per-patient git repositories ([`patients`])
//! - Outreach events and attendance ([`outreach`])
//! - Hosted-checkout payments and the gateway webhook ([`payments`], [`gateway`])
//! - The append-only audit trail ([`audit`])
//!
//! Every operation takes an explicit [`RequestContext`] naming the acting account and the
//! request origin.
//!
//! **No API concerns**: HTTP routing, cookies and request parsing belong in `api-rest`; wire
//! bodies live in `api-shared`.

pub mod access;
pub mod accounts;
pub mod audit;
pub mod author;
pub mod clinical;
pub mod config;
pub mod constants;
pub mod dashboard;
pub mod error;
pub mod gateway;
pub mod outreach;
pub mod patients;
pub mod payments;
pub mod validation;

mod store;
mod versioned_files;

pub use access::{Actor, Operation, RequestContext, RequestOrigin, Role, Scope};
pub use accounts::{Account, AccountService};
pub use audit::{AuditAction, AuditEntry, AuditService};
pub use config::{prepare_data_dir, CoreConfig};
pub use dashboard::DashboardService;
pub use error::{RecordError, RecordResult};
pub use gateway::{
    verify_webhook_signature, CheckoutGateway, CheckoutRequest, CheckoutSession, GatewayConfig,
    IntaSendGateway,
};
pub use outreach::{EventDetail, OutreachEvent, OutreachService};
pub use patients::{Initialised, PatientDetail, PatientService, Uninitialised};
pub use payments::{CheckoutUrls, Payment, PaymentFilter, PaymentService, PaymentStatus};
pub use validation::FieldErrors;
