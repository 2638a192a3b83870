//! Outbound billing events and audit entries

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ids::{
    BatchId, ClaimId, InsurerId, InvoiceId, PatientId, PaymentId, PaymentPlanId, UserId,
};
use super::payment::PaymentMethod;

/// Fire-and-forget event handed to the notifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BillingEvent {
    InvoiceCreated {
        invoice_id: InvoiceId,
        patient_id: PatientId,
        total: Decimal,
        timestamp: DateTime<Utc>,
    },
    InvoiceSent {
        invoice_id: InvoiceId,
        patient_id: PatientId,
        invoice_number: String,
        amount_due: Decimal,
        timestamp: DateTime<Utc>,
    },
    InvoiceCancelled {
        invoice_id: InvoiceId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    PaymentCreated {
        payment_id: PaymentId,
        invoice_id: InvoiceId,
        method: PaymentMethod,
        amount: Decimal,
        timestamp: DateTime<Utc>,
    },
    PaymentConfirmed {
        payment_id: PaymentId,
        invoice_id: InvoiceId,
        patient_id: PatientId,
        amount: Decimal,
        timestamp: DateTime<Utc>,
    },
    PaymentFailed {
        payment_id: PaymentId,
        invoice_id: InvoiceId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    PaymentRefunded {
        payment_id: PaymentId,
        invoice_id: InvoiceId,
        amount: Decimal,
        timestamp: DateTime<Utc>,
    },
    PaymentPlanCreated {
        plan_id: PaymentPlanId,
        invoice_id: InvoiceId,
        installments: u32,
        installment_amount: Decimal,
        timestamp: DateTime<Utc>,
    },
    InstallmentPaid {
        plan_id: PaymentPlanId,
        number: u32,
        amount: Decimal,
        timestamp: DateTime<Utc>,
    },
    PaymentPlanCompleted {
        plan_id: PaymentPlanId,
        invoice_id: InvoiceId,
        timestamp: DateTime<Utc>,
    },
    ClaimSubmitted {
        claim_id: ClaimId,
        insurer_id: InsurerId,
        timestamp: DateTime<Utc>,
    },
    ClaimDenied {
        claim_id: ClaimId,
        invoice_id: InvoiceId,
        reason: Option<String>,
        timestamp: DateTime<Utc>,
    },
    ClaimPaid {
        claim_id: ClaimId,
        invoice_id: InvoiceId,
        amount: Decimal,
        timestamp: DateTime<Utc>,
    },
    BatchCreated {
        batch_id: BatchId,
        insurer_id: InsurerId,
        claims_count: u32,
        total_amount: Decimal,
        timestamp: DateTime<Utc>,
    },
}

impl BillingEvent {
    /// Event name used in logs and webhook routing
    pub fn name(&self) -> &'static str {
        match self {
            BillingEvent::InvoiceCreated { .. } => "invoice.created",
            BillingEvent::InvoiceSent { .. } => "invoice.sent",
            BillingEvent::InvoiceCancelled { .. } => "invoice.cancelled",
            BillingEvent::PaymentCreated { .. } => "payment.created",
            BillingEvent::PaymentConfirmed { .. } => "payment.confirmed",
            BillingEvent::PaymentFailed { .. } => "payment.failed",
            BillingEvent::PaymentRefunded { .. } => "payment.refunded",
            BillingEvent::PaymentPlanCreated { .. } => "payment_plan.created",
            BillingEvent::InstallmentPaid { .. } => "payment_plan.installment_paid",
            BillingEvent::PaymentPlanCompleted { .. } => "payment_plan.completed",
            BillingEvent::ClaimSubmitted { .. } => "claim.submitted",
            BillingEvent::ClaimDenied { .. } => "claim.denied",
            BillingEvent::ClaimPaid { .. } => "claim.paid",
            BillingEvent::BatchCreated { .. } => "claim_batch.created",
        }
    }
}

/// Append-only audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub user_id: Option<UserId>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        action: &str,
        entity_type: &str,
        entity_id: Uuid,
        user_id: Option<UserId>,
        details: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id,
            user_id,
            details,
            created_at,
        }
    }
}
