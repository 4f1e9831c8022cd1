//! Payment and webhook bodies.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct PaymentReq {
    /// Amount in KES, at least 1. At most two decimal places are kept.
    pub amount: f64,
    /// One of `consultation_fee`, `treatment_fee`, `medication_fee`, `screening_fee`,
    /// `chw_allowance`, `other`.
    pub payment_type: String,
    /// M-Pesa number, 10 to 15 characters (`0712345678`, `254712345678`).
    pub phone_number: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub receiver_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct PaymentRes {
    pub id: String,
    pub payment_reference: String,
    pub amount: f64,
    pub currency: String,
    pub payment_type: String,
    pub description: Option<String>,
    pub payer_id: String,
    pub receiver_id: Option<String>,
    pub patient_id: Option<String>,
    pub status: String,
    pub payment_method: String,
    pub gateway_status: Option<String>,
    pub checkout_id: String,
    pub checkout_url: String,
    pub phone_number: String,
    pub created_at: String,
    pub completed_at: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct InitiatePaymentRes {
    /// Hosted checkout page the payer should be sent to.
    pub checkout_url: String,
    pub payment: PaymentRes,
}

#[derive(Clone, Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListPaymentsQuery {
    /// Restrict to one payment type.
    pub payment_type: Option<String>,
    /// Restrict to one status (`pending`, `completed`, `failed`, `refunded`).
    pub status: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ListPaymentsRes {
    pub payments: Vec<PaymentRes>,
}

/// Gateway callback acknowledgement: `success` or `error`.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct WebhookAck {
    pub status: String,
}

impl WebhookAck {
    pub fn success() -> Self {
        Self {
            status: "success".into(),
        }
    }

    pub fn error() -> Self {
        Self {
            status: "error".into(),
        }
    }
}
