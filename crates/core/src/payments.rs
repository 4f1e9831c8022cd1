//! Payment lifecycle.
//!
//! ```text
//! pending ──► completed ──► refunded
//!    │
//!    └──────► failed
//! ```
//!
//! A payment is only persisted once the gateway has created a hosted checkout for it. Its
//! reference and the gateway's checkout id are both claimed in exclusive-create indexes; the
//! webhook finds payments through the checkout id.

use crate::access::{Operation, RequestContext};
use crate::accounts::AccountService;
use crate::audit::{AuditAction, AuditResource, AuditService};
use crate::config::{CoreConfig, IndexKind};
use crate::constants::{
    CURRENCY, MAX_PAYMENT_AMOUNT, PAYMENT_FILENAME, PAYMENT_METHOD, REFERENCE_PREFIX,
};
use crate::gateway::{CheckoutGateway, CheckoutRequest};
use crate::patients::PatientService;
use crate::store::{claim_reference, list_sharded, read_yaml_opt, write_yaml, UniqueIndex};
use crate::validation::{FieldErrors, NOT_A_CHOICE};
use crate::{RecordError, RecordResult};
use api_shared::{PaymentReq, PaymentRes};
use chrono::{DateTime, Utc};
use chs_uuid::ShardableUuid;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    ConsultationFee,
    TreatmentFee,
    MedicationFee,
    ScreeningFee,
    ChwAllowance,
    Other,
}

impl PaymentType {
    pub const ALL: [PaymentType; 6] = [
        PaymentType::ConsultationFee,
        PaymentType::TreatmentFee,
        PaymentType::MedicationFee,
        PaymentType::ScreeningFee,
        PaymentType::ChwAllowance,
        PaymentType::Other,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            PaymentType::ConsultationFee => "consultation_fee",
            PaymentType::TreatmentFee => "treatment_fee",
            PaymentType::MedicationFee => "medication_fee",
            PaymentType::ScreeningFee => "screening_fee",
            PaymentType::ChwAllowance => "chw_allowance",
            PaymentType::Other => "other",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    /// The only legal moves are `pending → completed | failed` and `completed → refunded`.
    pub fn transition(self, to: PaymentStatus) -> RecordResult<PaymentStatus> {
        use PaymentStatus::*;
        match (self, to) {
            (Pending, Completed) | (Pending, Failed) | (Completed, Refunded) => Ok(to),
            _ => Err(RecordError::InvalidTransition {
                from: self.as_str(),
                to: to.as_str(),
            }),
        }
    }
}

/// Persisted payment record.
///
/// Amounts are stored in cents to keep the YAML exact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: ShardableUuid,
    pub payment_reference: String,
    pub checkout_id: String,
    pub checkout_url: String,
    pub amount_cents: u64,
    pub currency: String,
    pub payment_type: PaymentType,
    #[serde(default)]
    pub description: Option<String>,
    pub payer_id: ShardableUuid,
    #[serde(default)]
    pub receiver_id: Option<ShardableUuid>,
    #[serde(default)]
    pub patient_id: Option<ShardableUuid>,
    pub status: PaymentStatus,
    pub payment_method: String,
    #[serde(default)]
    pub gateway_status: Option<String>,
    pub phone_number: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn amount(&self) -> f64 {
        self.amount_cents as f64 / 100.0
    }
}

impl From<&Payment> for PaymentRes {
    fn from(p: &Payment) -> Self {
        PaymentRes {
            id: p.id.to_string(),
            payment_reference: p.payment_reference.clone(),
            amount: p.amount(),
            currency: p.currency.clone(),
            payment_type: p.payment_type.as_str().to_string(),
            description: p.description.clone(),
            payer_id: p.payer_id.to_string(),
            receiver_id: p.receiver_id.as_ref().map(ToString::to_string),
            patient_id: p.patient_id.as_ref().map(ToString::to_string),
            status: p.status.as_str().to_string(),
            payment_method: p.payment_method.clone(),
            gateway_status: p.gateway_status.clone(),
            checkout_id: p.checkout_id.clone(),
            checkout_url: p.checkout_url.clone(),
            phone_number: p.phone_number.clone(),
            created_at: p.created_at.to_rfc3339(),
            completed_at: p.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Where the gateway sends the payer afterwards and where it posts the callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutUrls {
    pub redirect_url: String,
    pub webhook_url: String,
}

impl CheckoutUrls {
    /// Derives both URLs from the public origin, e.g. `https://chs.example.org`.
    pub fn for_origin(origin: &str) -> Self {
        let origin = origin.trim_end_matches('/');
        Self {
            redirect_url: format!("{origin}/payments?status=success"),
            webhook_url: format!("{origin}/webhooks/intasend"),
        }
    }
}

/// Optional filters for [`PaymentService::list`]. `"all"` is the same as no filter.
#[derive(Clone, Debug, Default)]
pub struct PaymentFilter<'a> {
    pub payment_type: Option<&'a str>,
    pub status: Option<&'a str>,
}

struct ValidPayment {
    amount_cents: u64,
    payment_type: PaymentType,
    phone_number: String,
    description: Option<String>,
    patient_id: Option<ShardableUuid>,
    receiver_id: Option<ShardableUuid>,
}

#[derive(Clone, Debug)]
pub struct PaymentService {
    cfg: Arc<CoreConfig>,
}

impl PaymentService {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self { cfg }
    }

    fn audit(&self) -> AuditService {
        AuditService::new(self.cfg.clone())
    }

    fn payment_dir(&self, id: &ShardableUuid) -> PathBuf {
        id.sharded_dir(&self.cfg.payments_dir())
    }

    fn load(&self, id: &ShardableUuid) -> RecordResult<Payment> {
        read_yaml_opt(&self.payment_dir(id).join(PAYMENT_FILENAME))?
            .ok_or(RecordError::NotFound("payment"))
    }

    fn save(&self, payment: &Payment) -> RecordResult<()> {
        write_yaml(&self.payment_dir(&payment.id).join(PAYMENT_FILENAME), payment)
    }

    fn validate(&self, ctx: &RequestContext, req: &PaymentReq) -> RecordResult<ValidPayment> {
        let mut errors = FieldErrors::default();

        let amount_cents = if !req.amount.is_finite() || req.amount < 1.0 {
            errors.add("amount", "Number must be at least 1.");
            None
        } else if req.amount > MAX_PAYMENT_AMOUNT {
            errors.add(
                "amount",
                format!("Number must be at most {MAX_PAYMENT_AMOUNT:.0}."),
            );
            None
        } else {
            Some((req.amount * 100.0).round() as u64)
        };
        let payment_type = errors.choice("payment_type", &req.payment_type, PaymentType::from_wire);
        let phone = errors.phone("phone_number", &req.phone_number);

        let patient_id = match FieldErrors::free_text(req.patient_id.as_deref()) {
            Some(raw) => match ShardableUuid::parse(&raw) {
                Ok(id) => Some(id),
                Err(_) => {
                    errors.add("patient_id", NOT_A_CHOICE);
                    None
                }
            },
            None => None,
        };
        let receiver_id = match FieldErrors::free_text(req.receiver_id.as_deref()) {
            Some(raw) => match ShardableUuid::parse(&raw) {
                Ok(id) if AccountService::new(self.cfg.clone()).get(&id).is_ok() => Some(id),
                _ => {
                    errors.add("receiver_id", NOT_A_CHOICE);
                    None
                }
            },
            None => None,
        };

        let (Some(amount_cents), Some(payment_type), Some(phone)) =
            (amount_cents, payment_type, phone)
        else {
            return Err(errors.into());
        };
        errors.finish()?;

        if let Some(patient_id) = &patient_id {
            PatientService::with_id(self.cfg.clone(), &patient_id.to_string())?
                .read(ctx, Operation::ReadPatient)?;
        }

        Ok(ValidPayment {
            amount_cents,
            payment_type,
            phone_number: phone.as_str().to_string(),
            description: FieldErrors::free_text(req.description.as_deref()),
            patient_id,
            receiver_id,
        })
    }

    /// Starts a payment through a hosted checkout.
    ///
    /// Blocks on the gateway request. Nothing is persisted and the reference is released
    /// again unless the gateway created the checkout.
    ///
    /// # Errors
    ///
    /// - [`RecordError::Validation`] for invalid input.
    /// - [`RecordError::AccessDenied`] / [`RecordError::NotFound`] for the linked patient.
    /// - [`RecordError::Gateway`] when the checkout could not be created.
    pub fn initiate(
        &self,
        ctx: &RequestContext,
        req: &PaymentReq,
        gateway: &dyn CheckoutGateway,
        urls: &CheckoutUrls,
    ) -> RecordResult<Payment> {
        let actor = ctx.actor()?;
        actor.authorize(Operation::InitiatePayment)?;
        let valid = self.validate(ctx, req)?;

        let id = ShardableUuid::new();
        let owner = id.to_string();
        let references = UniqueIndex::new(&self.cfg, IndexKind::PaymentReference);
        let payment_reference =
            claim_reference(&references, REFERENCE_PREFIX, &owner, "payment reference")?;

        let checkout_request = CheckoutRequest {
            amount: valid.amount_cents as f64 / 100.0,
            currency: CURRENCY.to_string(),
            email: actor.email.clone(),
            phone_number: valid.phone_number.clone(),
            api_ref: payment_reference.clone(),
            comment: valid
                .description
                .clone()
                .unwrap_or_else(|| format!("{} payment", valid.payment_type.as_str())),
            redirect_url: urls.redirect_url.clone(),
            webhook_url: urls.webhook_url.clone(),
        };

        let session = match gateway.create_checkout(&checkout_request) {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("checkout for {} failed: {}", payment_reference, e);
                references.release_quietly(&payment_reference);
                return Err(e);
            }
        };

        let checkouts = UniqueIndex::new(&self.cfg, IndexKind::CheckoutId);
        let persisted: RecordResult<Payment> = (|| {
            if !checkouts.claim(&session.id, &owner)? {
                return Err(RecordError::Gateway(format!(
                    "checkout id {} is already linked to another payment",
                    session.id
                )));
            }
            let payment = Payment {
                id: id.clone(),
                payment_reference: payment_reference.clone(),
                checkout_id: session.id.clone(),
                checkout_url: session.url.clone(),
                amount_cents: valid.amount_cents,
                currency: CURRENCY.to_string(),
                payment_type: valid.payment_type,
                description: valid.description,
                payer_id: actor.id.clone(),
                receiver_id: valid.receiver_id,
                patient_id: valid.patient_id,
                status: PaymentStatus::Pending,
                payment_method: PAYMENT_METHOD.to_string(),
                gateway_status: None,
                phone_number: valid.phone_number,
                created_at: Utc::now(),
                completed_at: None,
            };
            fs::create_dir_all(self.payment_dir(&id)).map_err(RecordError::StorageDirCreation)?;
            self.save(&payment)?;
            Ok(payment)
        })();

        let payment = match persisted {
            Ok(payment) => payment,
            Err(e) => {
                tracing::error!(
                    "checkout {} created but payment {} was not stored: {}",
                    session.id,
                    payment_reference,
                    e
                );
                references.release_quietly(&payment_reference);
                if !matches!(e, RecordError::Gateway(_)) {
                    checkouts.release_quietly(&session.id);
                }
                let _ = fs::remove_dir_all(self.payment_dir(&id));
                return Err(e);
            }
        };

        tracing::info!("payment {} initiated", payment.payment_reference);
        self.audit().record(
            ctx,
            AuditAction::PaymentInitiated,
            Some(AuditResource::new("payment", &payment.id)),
            format!("Payment initiated: {}", payment.payment_reference),
        );
        Ok(payment)
    }

    /// Applies a gateway callback.
    ///
    /// Returns `Ok(None)` for an unknown checkout id or a blank id or state. Only pending payments change: the
    /// gateway state is stored verbatim and `complete` / `failed` (any case) settle the
    /// payment. Callbacks for settled payments are ignored, so replays are harmless.
    pub fn reconcile(
        &self,
        ctx: &RequestContext,
        invoice_id: &str,
        state: &str,
    ) -> RecordResult<Option<Payment>> {
        if invoice_id.trim().is_empty() || state.trim().is_empty() {
            tracing::info!("ignoring webhook without an invoice id or state");
            return Ok(None);
        }
        let checkouts = UniqueIndex::new(&self.cfg, IndexKind::CheckoutId);
        let Some(owner) = checkouts.lookup(invoice_id)? else {
            tracing::info!("webhook for unknown checkout {}", invoice_id);
            return Ok(None);
        };
        let mut payment = self.load(&ShardableUuid::parse(&owner)?)?;

        if payment.status.is_terminal() {
            tracing::info!(
                "ignoring {} callback for {} payment {}",
                state,
                payment.status.as_str(),
                payment.payment_reference
            );
            return Ok(Some(payment));
        }

        payment.gateway_status = Some(state.to_string());
        match state.to_ascii_lowercase().as_str() {
            "complete" => {
                payment.status = payment.status.transition(PaymentStatus::Completed)?;
                payment.completed_at = Some(Utc::now());
            }
            "failed" => {
                payment.status = payment.status.transition(PaymentStatus::Failed)?;
            }
            _ => {}
        }
        self.save(&payment)?;

        self.audit().record(
            ctx,
            AuditAction::PaymentWebhook,
            Some(AuditResource::new("payment", &payment.id)),
            format!("Payment webhook received: {state}"),
        );
        Ok(Some(payment))
    }

    /// Every stored payment. Unparsable records are logged and skipped.
    pub(crate) fn all(&self) -> Vec<Payment> {
        list_sharded(&self.cfg.payments_dir(), PAYMENT_FILENAME, |s| {
            serde_yaml::from_str::<Payment>(s).map_err(RecordError::YamlDeserialization)
        })
    }

    /// Payments the actor may see, newest first.
    pub fn list(&self, ctx: &RequestContext, filter: &PaymentFilter) -> RecordResult<Vec<Payment>> {
        let actor = ctx.actor()?;
        actor.authorize(Operation::ViewPayments)?;

        let mut errors = FieldErrors::default();
        let payment_type = match filter.payment_type.filter(|t| *t != "all") {
            Some(t) => errors.choice("type", t, PaymentType::from_wire),
            None => None,
        };
        let status = match filter.status.filter(|s| *s != "all") {
            Some(s) => errors.choice("status", s, PaymentStatus::from_wire),
            None => None,
        };
        errors.finish()?;

        let mut payments: Vec<Payment> = self
            .all()
            .into_iter()
            .filter(|p| {
                actor.owns(
                    Operation::ViewPayments,
                    &[Some(&p.payer_id), p.receiver_id.as_ref()],
                )
            })
            .filter(|p| payment_type.map_or(true, |t| p.payment_type == t))
            .filter(|p| status.map_or(true, |s| p.status == s))
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }

    /// Most recent payments linked to a patient.
    pub(crate) fn recent_for_patient(&self, patient_id: &ShardableUuid, limit: usize) -> Vec<Payment> {
        let mut payments: Vec<Payment> = self
            .all()
            .into_iter()
            .filter(|p| p.patient_id.as_ref() == Some(patient_id))
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        payments.truncate(limit);
        payments
    }

    pub fn get_by_reference(&self, reference: &str) -> RecordResult<Payment> {
        let index = UniqueIndex::new(&self.cfg, IndexKind::PaymentReference);
        let owner = index
            .lookup(reference)?
            .ok_or(RecordError::NotFound("payment"))?;
        self.load(&ShardableUuid::parse(&owner)?)
    }

    /// Moves a completed payment to `refunded`.
    ///
    /// This is an operator correction with no HTTP route. An anonymous context is the
    /// operator; an authenticated one must be an administrator.
    pub fn mark_refunded(&self, ctx: &RequestContext, reference: &str) -> RecordResult<Payment> {
        if let Some(actor) = ctx.actor.as_ref() {
            if !actor.is_admin() {
                return Err(RecordError::AccessDenied);
            }
        }
        let mut payment = self.get_by_reference(reference)?;
        payment.status = payment.status.transition(PaymentStatus::Refunded)?;
        self.save(&payment)?;

        self.audit().record(
            ctx,
            AuditAction::PaymentRefunded,
            Some(AuditResource::new("payment", &payment.id)),
            format!("Payment refunded: {}", payment.payment_reference),
        );
        Ok(payment)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::access::{RequestOrigin, Role};
    use crate::gateway::CheckoutSession;
    use crate::patients::tests::{cfg, create, ctx, patient_req};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Gateway double that records requests and answers with a fixed outcome.
    pub(crate) struct StubGateway {
        pub(crate) fail: bool,
        pub(crate) requests: Mutex<Vec<CheckoutRequest>>,
    }

    impl StubGateway {
        pub(crate) fn ok() -> Self {
            Self {
                fail: false,
                requests: Mutex::new(vec![]),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                requests: Mutex::new(vec![]),
            }
        }
    }

    impl CheckoutGateway for StubGateway {
        fn create_checkout(&self, request: &CheckoutRequest) -> RecordResult<CheckoutSession> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(RecordError::Gateway("HTTP 500: upstream down".into()));
            }
            Ok(CheckoutSession {
                id: format!("INV-{}", request.api_ref),
                url: format!("https://pay.example/checkout/{}", request.api_ref),
            })
        }
    }

    pub(crate) fn payment_req() -> PaymentReq {
        PaymentReq {
            amount: 500.0,
            payment_type: "consultation_fee".into(),
            phone_number: "0712345678".into(),
            description: None,
            patient_id: None,
            receiver_id: None,
        }
    }

    fn urls() -> CheckoutUrls {
        CheckoutUrls::for_origin("https://chs.example.org/")
    }

    fn anonymous() -> RequestContext {
        RequestContext::anonymous(RequestOrigin::default())
    }

    #[test]
    fn initiate_persists_pending_payment_with_reference() {
        let temp = TempDir::new().unwrap();
        let svc = PaymentService::new(cfg(&temp));
        let payer = ctx(Role::Doctor);
        let gateway = StubGateway::ok();

        let payment = svc.initiate(&payer, &payment_req(), &gateway, &urls()).unwrap();

        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.amount_cents, 50_000);
        assert_eq!(payment.phone_number, "+254712345678");
        assert_eq!(payment.currency, "KES");
        assert_eq!(payment.payment_method, "mpesa");
        assert_eq!(payment.payment_reference.len(), 19);
        assert!(payment.payment_reference.starts_with("CHS"));
        assert_eq!(payment.checkout_id, format!("INV-{}", payment.payment_reference));

        let sent = gateway.requests.lock().unwrap();
        assert_eq!(sent[0].comment, "consultation_fee payment");
        assert_eq!(sent[0].redirect_url, "https://chs.example.org/payments?status=success");
        assert_eq!(sent[0].webhook_url, "https://chs.example.org/webhooks/intasend");
        assert_eq!(sent[0].email, "user@example.com");

        assert_eq!(svc.get_by_reference(&payment.payment_reference).unwrap(), payment);
    }

    #[test]
    fn failed_checkout_persists_nothing_and_frees_reference() {
        let temp = TempDir::new().unwrap();
        let cfg = cfg(&temp);
        let svc = PaymentService::new(cfg.clone());
        let gateway = StubGateway::failing();

        let err = svc
            .initiate(&ctx(Role::Chw), &payment_req(), &gateway, &urls())
            .unwrap_err();
        assert!(matches!(err, RecordError::Gateway(_)));
        assert!(svc.all().is_empty());

        let reference = gateway.requests.lock().unwrap()[0].api_ref.clone();
        let index = UniqueIndex::new(&cfg, IndexKind::PaymentReference);
        assert!(!index.contains(&reference).unwrap());
    }

    #[test]
    fn complete_callback_settles_once() {
        let temp = TempDir::new().unwrap();
        let svc = PaymentService::new(cfg(&temp));
        let payment = svc
            .initiate(&ctx(Role::Admin), &payment_req(), &StubGateway::ok(), &urls())
            .unwrap();

        let settled = svc
            .reconcile(&anonymous(), &payment.checkout_id, "COMPLETE")
            .unwrap()
            .unwrap();
        assert_eq!(settled.status, PaymentStatus::Completed);
        assert_eq!(settled.gateway_status.as_deref(), Some("COMPLETE"));
        assert!(settled.completed_at.is_some());

        let replayed = svc
            .reconcile(&anonymous(), &payment.checkout_id, "COMPLETE")
            .unwrap()
            .unwrap();
        assert_eq!(replayed, settled);
        let late_failure = svc
            .reconcile(&anonymous(), &payment.checkout_id, "FAILED")
            .unwrap()
            .unwrap();
        assert_eq!(late_failure, settled);

        let webhook_entries = svc
            .audit()
            .recent(10)
            .unwrap()
            .into_iter()
            .filter(|e| e.action == AuditAction::PaymentWebhook)
            .count();
        assert_eq!(webhook_entries, 1);
    }

    #[test]
    fn intermediate_and_failed_states() {
        let temp = TempDir::new().unwrap();
        let svc = PaymentService::new(cfg(&temp));
        let payment = svc
            .initiate(&ctx(Role::Admin), &payment_req(), &StubGateway::ok(), &urls())
            .unwrap();

        let processing = svc
            .reconcile(&anonymous(), &payment.checkout_id, "PROCESSING")
            .unwrap()
            .unwrap();
        assert_eq!(processing.status, PaymentStatus::Pending);
        assert_eq!(processing.gateway_status.as_deref(), Some("PROCESSING"));

        let failed = svc
            .reconcile(&anonymous(), &payment.checkout_id, "failed")
            .unwrap()
            .unwrap();
        assert_eq!(failed.status, PaymentStatus::Failed);
        assert!(failed.completed_at.is_none());
    }

    #[test]
    fn unknown_checkout_is_a_no_op() {
        let temp = TempDir::new().unwrap();
        let svc = PaymentService::new(cfg(&temp));
        let payment = svc
            .initiate(&ctx(Role::Admin), &payment_req(), &StubGateway::ok(), &urls())
            .unwrap();

        // the reference is not a checkout id
        assert!(svc
            .reconcile(&anonymous(), &payment.payment_reference, "COMPLETE")
            .unwrap()
            .is_none());
        assert_eq!(
            svc.get_by_reference(&payment.payment_reference).unwrap().status,
            PaymentStatus::Pending
        );
    }

    #[test]
    fn blank_state_is_ignored() {
        let temp = TempDir::new().unwrap();
        let svc = PaymentService::new(cfg(&temp));
        let payment = svc
            .initiate(&ctx(Role::Admin), &payment_req(), &StubGateway::ok(), &urls())
            .unwrap();

        assert!(svc
            .reconcile(&anonymous(), &payment.checkout_id, "")
            .unwrap()
            .is_none());
        assert!(svc.reconcile(&anonymous(), "  ", "COMPLETE").unwrap().is_none());

        let stored = svc.get_by_reference(&payment.payment_reference).unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
        assert!(stored.gateway_status.is_none());
        assert!(!svc
            .audit()
            .recent(10)
            .unwrap()
            .iter()
            .any(|e| e.action == AuditAction::PaymentWebhook));
    }

    #[test]
    fn oversized_amount_is_a_field_error() {
        let temp = TempDir::new().unwrap();
        let svc = PaymentService::new(cfg(&temp));
        let gateway = StubGateway::ok();
        let req = PaymentReq {
            amount: 1e30,
            ..payment_req()
        };

        let RecordError::Validation(errors) = svc
            .initiate(&ctx(Role::Admin), &req, &gateway, &urls())
            .unwrap_err()
        else {
            panic!("expected validation error");
        };
        assert_eq!(
            errors.get("amount").unwrap(),
            ["Number must be at most 10000000."]
        );
        assert!(gateway.requests.lock().unwrap().is_empty());
        assert!(svc.all().is_empty());

        let at_limit = PaymentReq {
            amount: MAX_PAYMENT_AMOUNT,
            ..payment_req()
        };
        let payment = svc.initiate(&ctx(Role::Admin), &at_limit, &gateway, &urls()).unwrap();
        assert_eq!(payment.amount_cents, 1_000_000_000);
    }

    #[test]
    fn state_machine_rejects_illegal_moves() {
        use PaymentStatus::*;
        assert_eq!(Pending.transition(Completed).unwrap(), Completed);
        assert_eq!(Completed.transition(Refunded).unwrap(), Refunded);
        for (from, to) in [
            (Pending, Refunded),
            (Failed, Completed),
            (Refunded, Completed),
            (Completed, Failed),
        ] {
            assert!(matches!(
                from.transition(to),
                Err(RecordError::InvalidTransition { .. })
            ));
        }
    }

    #[test]
    fn refund_requires_completed_payment() {
        let temp = TempDir::new().unwrap();
        let svc = PaymentService::new(cfg(&temp));
        let payment = svc
            .initiate(&ctx(Role::Admin), &payment_req(), &StubGateway::ok(), &urls())
            .unwrap();

        assert!(matches!(
            svc.mark_refunded(&anonymous(), &payment.payment_reference),
            Err(RecordError::InvalidTransition { .. })
        ));
        svc.reconcile(&anonymous(), &payment.checkout_id, "COMPLETE")
            .unwrap();
        assert!(matches!(
            svc.mark_refunded(&ctx(Role::Doctor), &payment.payment_reference),
            Err(RecordError::AccessDenied)
        ));
        let refunded = svc
            .mark_refunded(&anonymous(), &payment.payment_reference)
            .unwrap();
        assert_eq!(refunded.status, PaymentStatus::Refunded);
    }

    #[test]
    fn list_is_scoped_to_payer_or_receiver() {
        let temp = TempDir::new().unwrap();
        let svc = PaymentService::new(cfg(&temp));
        let gateway = StubGateway::ok();
        let doctor = ctx(Role::Doctor);
        let chw = ctx(Role::Chw);
        svc.initiate(&doctor, &payment_req(), &gateway, &urls()).unwrap();
        let mut screening = payment_req();
        screening.payment_type = "screening_fee".into();
        svc.initiate(&chw, &screening, &gateway, &urls()).unwrap();

        assert_eq!(svc.list(&doctor, &PaymentFilter::default()).unwrap().len(), 1);
        assert_eq!(svc.list(&chw, &PaymentFilter::default()).unwrap().len(), 1);
        let admin = ctx(Role::Admin);
        assert_eq!(svc.list(&admin, &PaymentFilter::default()).unwrap().len(), 2);

        let filtered = svc
            .list(
                &admin,
                &PaymentFilter {
                    payment_type: Some("screening_fee"),
                    status: Some("all"),
                },
            )
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert!(matches!(
            svc.list(
                &admin,
                &PaymentFilter {
                    payment_type: None,
                    status: Some("settled"),
                }
            ),
            Err(RecordError::Validation(_))
        ));
    }

    #[test]
    fn linked_patient_must_be_readable() {
        let temp = TempDir::new().unwrap();
        let cfg = cfg(&temp);
        let svc = PaymentService::new(cfg.clone());
        let owner = ctx(Role::Chw);
        let patient = create(&cfg, &owner, &patient_req("Amina", "Otieno"));

        let mut req = payment_req();
        req.patient_id = Some(patient.id.to_string());
        assert!(matches!(
            svc.initiate(&ctx(Role::Chw), &req, &StubGateway::ok(), &urls()),
            Err(RecordError::AccessDenied)
        ));

        let payment = svc.initiate(&owner, &req, &StubGateway::ok(), &urls()).unwrap();
        let recent = svc.recent_for_patient(&patient.id, 5);
        assert_eq!(recent, vec![payment]);
    }

    #[test]
    fn invalid_input_never_reaches_gateway() {
        let temp = TempDir::new().unwrap();
        let svc = PaymentService::new(cfg(&temp));
        let gateway = StubGateway::ok();
        let req = PaymentReq {
            amount: 0.5,
            payment_type: "tip".into(),
            phone_number: "123".into(),
            ..payment_req()
        };

        let RecordError::Validation(errors) = svc
            .initiate(&ctx(Role::Admin), &req, &gateway, &urls())
            .unwrap_err()
        else {
            panic!("expected validation error");
        };
        for field in ["amount", "payment_type", "phone_number"] {
            assert!(errors.get(field).is_some(), "missing error for {field}");
        }
        assert!(gateway.requests.lock().unwrap().is_empty());
    }
}
