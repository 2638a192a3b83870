//! Payment domain entity
//!
//! A payment is one attempt to settle (part of) an invoice through one of the
//! supported rails.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{ClinicId, InvoiceId, PatientId, PaymentId, PaymentPlanId, UserId};
use crate::error::DomainError;

/// Payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
    PartiallyRefunded,
}

impl PaymentStatus {
    /// Money was captured at some point (refunds included)
    pub fn was_completed(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Completed | PaymentStatus::Refunded | PaymentStatus::PartiallyRefunded
        )
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::PartiallyRefunded => "PARTIALLY_REFUNDED",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(PaymentStatus::Pending),
            "PROCESSING" => Ok(PaymentStatus::Processing),
            "COMPLETED" => Ok(PaymentStatus::Completed),
            "FAILED" => Ok(PaymentStatus::Failed),
            "REFUNDED" => Ok(PaymentStatus::Refunded),
            "PARTIALLY_REFUNDED" => Ok(PaymentStatus::PartiallyRefunded),
            _ => Err(format!("Unknown payment status: {}", s)),
        }
    }
}

/// Payment rail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    Pix,
    Boleto,
    Cash,
    Check,
    BankTransfer,
}

impl PaymentMethod {
    /// Rails confirmed by a person rather than a gateway callback
    pub fn is_manual(&self) -> bool {
        matches!(
            self,
            PaymentMethod::Cash | PaymentMethod::Check | PaymentMethod::BankTransfer
        )
    }

    pub fn is_card(&self) -> bool {
        matches!(self, PaymentMethod::CreditCard | PaymentMethod::DebitCard)
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentMethod::CreditCard => "CREDIT_CARD",
            PaymentMethod::DebitCard => "DEBIT_CARD",
            PaymentMethod::Pix => "PIX",
            PaymentMethod::Boleto => "BOLETO",
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Check => "CHECK",
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CREDIT_CARD" => Ok(PaymentMethod::CreditCard),
            "DEBIT_CARD" => Ok(PaymentMethod::DebitCard),
            "PIX" => Ok(PaymentMethod::Pix),
            "BOLETO" => Ok(PaymentMethod::Boleto),
            "CASH" => Ok(PaymentMethod::Cash),
            "CHECK" => Ok(PaymentMethod::Check),
            "BANK_TRANSFER" | "TRANSFER" => Ok(PaymentMethod::BankTransfer),
            _ => Err(format!("Unknown payment method: {}", s)),
        }
    }
}

/// Rail-specific payload stored with a payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rail", rename_all = "snake_case")]
pub enum PaymentDetails {
    Card {
        transaction_id: String,
        last_four: Option<String>,
        installments: u32,
        authorization_url: Option<String>,
    },
    Pix {
        code: String,
        qr_code: String,
        expires_at: DateTime<Utc>,
    },
    Boleto {
        barcode: String,
        digitable_line: String,
        url: Option<String>,
        expires_at: DateTime<Utc>,
    },
    Manual {
        reference_number: Option<String>,
        bank_name: Option<String>,
        receipt_url: Option<String>,
    },
}

/// Why money was given back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundReason {
    RequestedByPatient,
    DuplicatePayment,
    ServiceNotProvided,
    InvoiceCancelled,
    BillingError,
    Other,
}

impl std::fmt::Display for RefundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RefundReason::RequestedByPatient => "REQUESTED_BY_PATIENT",
            RefundReason::DuplicatePayment => "DUPLICATE_PAYMENT",
            RefundReason::ServiceNotProvided => "SERVICE_NOT_PROVIDED",
            RefundReason::InvoiceCancelled => "INVOICE_CANCELLED",
            RefundReason::BillingError => "BILLING_ERROR",
            RefundReason::Other => "OTHER",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for RefundReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "REQUESTED_BY_PATIENT" => Ok(RefundReason::RequestedByPatient),
            "DUPLICATE_PAYMENT" => Ok(RefundReason::DuplicatePayment),
            "SERVICE_NOT_PROVIDED" => Ok(RefundReason::ServiceNotProvided),
            "INVOICE_CANCELLED" => Ok(RefundReason::InvoiceCancelled),
            "BILLING_ERROR" => Ok(RefundReason::BillingError),
            "OTHER" => Ok(RefundReason::Other),
            _ => Err(format!("Unknown refund reason: {}", s)),
        }
    }
}

/// Link from a payment to the installment it settles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentRef {
    pub plan_id: PaymentPlanId,
    pub number: u32,
}

/// One refund given back on a payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundRecord {
    pub amount: Decimal,
    pub reason: RefundReason,
    pub refunded_at: DateTime<Utc>,
    #[serde(default)]
    pub refunded_by: Option<UserId>,
}

/// One attempt to settle (part of) an invoice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub invoice_id: InvoiceId,
    pub clinic_id: ClinicId,
    pub patient_id: PatientId,
    /// Amount applied to the invoice balance
    pub amount: Decimal,
    /// Late fees and interest charged on top of `amount`; never applied to the invoice
    pub surcharge: Decimal,
    /// Cumulative amount given back
    pub refunded_amount: Decimal,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub details: Option<PaymentDetails>,
    pub is_manual: bool,
    pub installment: Option<InstallmentRef>,
    pub paid_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    /// Latest refund
    pub refunded_at: Option<DateTime<Utc>>,
    pub refund_reason: Option<RefundReason>,
    /// Every refund in the order it was given
    #[serde(default)]
    pub refunds: Vec<RefundRecord>,
    pub notes: Option<String>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

impl Payment {
    /// What the payer was charged in total
    pub fn gross_amount(&self) -> Decimal {
        self.amount + self.surcharge
    }

    /// Amount that can still be refunded
    pub fn refundable_amount(&self) -> Decimal {
        self.amount - self.refunded_amount
    }

    /// PENDING/PROCESSING -> COMPLETED
    pub fn confirm(&mut self, paid_at: DateTime<Utc>, at: DateTime<Utc>) -> Result<(), DomainError> {
        match self.status {
            PaymentStatus::Pending | PaymentStatus::Processing => {
                self.status = PaymentStatus::Completed;
                self.paid_at = Some(paid_at);
                self.updated_at = at;
                Ok(())
            }
            PaymentStatus::Completed => Err(DomainError::InvalidState(format!(
                "Payment {} is already COMPLETED",
                self.id
            ))),
            other => Err(DomainError::InvalidState(format!(
                "Payment {} is {} and cannot be confirmed",
                self.id, other
            ))),
        }
    }

    /// PENDING/PROCESSING -> FAILED
    pub fn fail(&mut self, reason: &str, at: DateTime<Utc>) -> Result<(), DomainError> {
        if !matches!(
            self.status,
            PaymentStatus::Pending | PaymentStatus::Processing
        ) {
            return Err(DomainError::InvalidState(format!(
                "Payment {} is {} and cannot fail",
                self.id, self.status
            )));
        }
        self.status = PaymentStatus::Failed;
        self.failed_at = Some(at);
        self.failure_reason = Some(reason.to_string());
        self.updated_at = at;
        Ok(())
    }

    /// Record a (partial) refund, moving to REFUNDED once nothing is left
    pub fn register_refund(
        &mut self,
        amount: Decimal,
        reason: RefundReason,
        refunded_by: Option<UserId>,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !matches!(
            self.status,
            PaymentStatus::Completed | PaymentStatus::PartiallyRefunded
        ) {
            return Err(DomainError::InvalidState(format!(
                "Payment {} is {}; only completed payments can be refunded",
                self.id, self.status
            )));
        }
        if amount <= Decimal::ZERO {
            return Err(DomainError::Validation(
                "Refund amount must be positive".to_string(),
            ));
        }
        if amount > self.refundable_amount() {
            return Err(DomainError::InvariantViolation(format!(
                "Refund of {} exceeds refundable balance {} on payment {}",
                amount,
                self.refundable_amount(),
                self.id
            )));
        }

        self.refunded_amount += amount;
        self.status = if self.refunded_amount >= self.amount {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartiallyRefunded
        };
        self.refunded_at = Some(at);
        self.refund_reason = Some(reason);
        self.refunds.push(RefundRecord {
            amount,
            reason,
            refunded_at: at,
            refunded_by,
        });
        self.updated_at = at;
        Ok(())
    }
}

/// Card data forwarded to the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardInput {
    /// Tokenized card reference from the checkout widget
    pub token: String,
    #[serde(default)]
    pub last_four: Option<String>,
    #[serde(default)]
    pub installments: Option<u32>,
}

/// Data needed to start a payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPayment {
    pub invoice_id: InvoiceId,
    pub amount: Decimal,
    pub method: PaymentMethod,
    #[serde(default)]
    pub card: Option<CardInput>,
    #[serde(default)]
    pub expiration_minutes: Option<i64>,
    #[serde(default)]
    pub days_to_expire: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_by: Option<UserId>,
}

/// Data for a payment received outside any gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualPayment {
    pub invoice_id: InvoiceId,
    pub amount: Decimal,
    pub method: PaymentMethod,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub receipt_url: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_by: Option<UserId>,
}

/// Query filter for payment listings and reports
#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub clinic_id: Option<ClinicId>,
    pub invoice_id: Option<InvoiceId>,
    pub statuses: Vec<PaymentStatus>,
    /// Keep payments with any activity (creation, payment, latest refund)
    /// at or after this instant
    pub active_from: Option<DateTime<Utc>>,
    /// Keep payments created at or before this instant
    pub active_to: Option<DateTime<Utc>>,
}

impl PaymentFilter {
    pub fn matches(&self, payment: &Payment) -> bool {
        let since = |at: Option<DateTime<Utc>>| {
            at.is_some_and(|at| self.active_from.map_or(true, |from| at >= from))
        };
        self.clinic_id.map_or(true, |c| payment.clinic_id == c)
            && self.invoice_id.map_or(true, |i| payment.invoice_id == i)
            && (self.statuses.is_empty() || self.statuses.contains(&payment.status))
            && self.active_to.map_or(true, |to| payment.created_at <= to)
            && (since(Some(payment.created_at))
                || since(payment.paid_at)
                || since(payment.refunded_at))
    }
}
