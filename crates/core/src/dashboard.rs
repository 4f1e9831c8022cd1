//! Role-specific landing statistics.

use crate::access::{RequestContext, Role};
use crate::accounts::AccountService;
use crate::config::CoreConfig;
use crate::constants::{RECENT_CONSULTATION_DAYS, UPCOMING_EVENTS};
use crate::outreach::{event_res, OutreachService};
use crate::patients::PatientService;
use crate::payments::{PaymentService, PaymentStatus, PaymentType};
use crate::RecordResult;
use api_shared::{DashboardRes, DashboardStatsRes};
use chrono::{DateTime, Duration, Utc};
use fhir::PatientStatus;
use std::sync::Arc;

fn count(n: usize) -> Option<u64> {
    Some(u64::try_from(n).unwrap_or(u64::MAX))
}

#[derive(Clone, Debug)]
pub struct DashboardService {
    cfg: Arc<CoreConfig>,
}

impl DashboardService {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self { cfg }
    }

    pub fn dashboard(&self, ctx: &RequestContext) -> RecordResult<DashboardRes> {
        self.dashboard_at(ctx, Utc::now())
    }

    pub(crate) fn dashboard_at(
        &self,
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> RecordResult<DashboardRes> {
        let actor = ctx.actor()?;
        let patients = PatientService::new(self.cfg.clone()).all();
        let outreach = OutreachService::new(self.cfg.clone());
        let payments = PaymentService::new(self.cfg.clone());

        let active_patients = || patients.iter().filter(|p| p.status == PatientStatus::Active);
        let my_patients = || {
            count(
                active_patients()
                    .filter(|p| p.assigned_chw.as_ref() == Some(&actor.id))
                    .count(),
            )
        };

        let stats = match actor.role {
            Role::Admin => DashboardStatsRes {
                total_users: count(
                    AccountService::new(self.cfg.clone())
                        .all()
                        .iter()
                        .filter(|a| a.is_active)
                        .count(),
                ),
                total_patients: count(active_patients().count()),
                total_events: count(outreach.all().len()),
                pending_payments: count(
                    payments
                        .all()
                        .iter()
                        .filter(|p| p.status == PaymentStatus::Pending)
                        .count(),
                ),
                ..DashboardStatsRes::default()
            },
            Role::Doctor => {
                let since = now - Duration::days(RECENT_CONSULTATION_DAYS);
                let mut consultations = 0;
                for patient in &patients {
                    let encounters =
                        match PatientService::with_id(self.cfg.clone(), &patient.id.to_string())
                            .and_then(|svc| svc.encounters())
                        {
                            Ok(encounters) => encounters,
                            Err(e) => {
                                tracing::warn!("skipping encounters of {}: {}", patient.id, e);
                                continue;
                            }
                        };
                    consultations += encounters
                        .iter()
                        .filter(|e| e.provider_id == actor.id && e.encounter_date >= since)
                        .count();
                }
                DashboardStatsRes {
                    my_patients: my_patients(),
                    recent_consultations: count(consultations),
                    ..DashboardStatsRes::default()
                }
            }
            Role::Chw => DashboardStatsRes {
                my_patients: my_patients(),
                my_events: count(
                    outreach
                        .all()
                        .iter()
                        .filter(|e| e.organizer_id == actor.id)
                        .count(),
                ),
                pending_allowances: count(
                    payments
                        .all()
                        .iter()
                        .filter(|p| {
                            p.receiver_id.as_ref() == Some(&actor.id)
                                && p.payment_type == PaymentType::ChwAllowance
                                && p.status == PaymentStatus::Pending
                        })
                        .count(),
                ),
                ..DashboardStatsRes::default()
            },
        };

        let upcoming_events = outreach
            .upcoming(now, UPCOMING_EVENTS)
            .iter()
            .map(|e| event_res(e, outreach.attendance_count(&e.id)))
            .collect();

        Ok(DashboardRes {
            role: actor.role.as_str().to_string(),
            stats,
            upcoming_events,
        })
    }
}
