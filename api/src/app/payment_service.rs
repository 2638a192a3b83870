//! Payment service
//!
//! Creates payments on every rail, confirms them, records manual payments
//! and processes refunds. Every write that touches an invoice balance runs
//! under that invoice's lock, goes through `Invoice::apply_settlement` and
//! lands in one commit with the payment that moved it.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::app::payment_plan_service::{announce_plan_completed, settle_open_plan};
use crate::app::{InvoiceGuard, ServiceContext};
use crate::domain::entities::{
    BillingEvent, InstallmentRef, Invoice, InvoiceId, ManualPayment, NewPayment, Payment,
    PaymentDetails, PaymentId, PaymentMethod, PaymentStatus, RefundReason, Settlement, UserId,
};
use crate::domain::ports::{
    BoletoRequest, CardCharge, Changeset, InvoiceRepository, PaymentGateway,
    PaymentPlanRepository, PaymentRepository, PixRequest,
};
use crate::error::{AppError, DomainError};

/// What the payer has to do next
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentAction {
    /// Card issuer requires an authorization page
    Redirect { url: String },
    ScanPix {
        code: String,
        qr_code: String,
        expires_at: DateTime<Utc>,
    },
    PayBoleto {
        barcode: String,
        digitable_line: String,
        url: Option<String>,
        expires_at: DateTime<Utc>,
    },
    /// Cash, check or transfer to be confirmed by staff
    AwaitManualConfirmation,
}

/// A created payment plus the rail-specific response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedPayment {
    pub payment: Payment,
    pub next_action: Option<PaymentAction>,
}

/// Payment already settled when it is recorded
#[derive(Debug, Clone)]
pub struct SettledPayment {
    /// Applied to the invoice balance
    pub amount: Decimal,
    /// Charged on top of `amount` (late fee, interest)
    pub surcharge: Decimal,
    pub method: PaymentMethod,
    pub paid_at: DateTime<Utc>,
    pub details: Option<PaymentDetails>,
    pub is_manual: bool,
    pub installment: Option<InstallmentRef>,
    pub notes: Option<String>,
    pub created_by: Option<UserId>,
}

/// Service for the payment lifecycle
pub struct PaymentService<IR, PR, PPR, GW>
where
    IR: InvoiceRepository,
    PR: PaymentRepository,
    PPR: PaymentPlanRepository,
    GW: PaymentGateway,
{
    invoices: Arc<IR>,
    payments: Arc<PR>,
    plans: Arc<PPR>,
    gateway: Arc<GW>,
    ctx: ServiceContext,
}

impl<IR, PR, PPR, GW> PaymentService<IR, PR, PPR, GW>
where
    IR: InvoiceRepository,
    PR: PaymentRepository,
    PPR: PaymentPlanRepository,
    GW: PaymentGateway,
{
    pub fn new(
        invoices: Arc<IR>,
        payments: Arc<PR>,
        plans: Arc<PPR>,
        gateway: Arc<GW>,
        ctx: ServiceContext,
    ) -> Self {
        Self {
            invoices,
            payments,
            plans,
            gateway,
            ctx,
        }
    }

    // ========== Queries ==========

    pub async fn get_payment(&self, id: &PaymentId) -> Result<Payment, AppError> {
        self.payments
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Payment", id))
    }

    pub async fn list_payments(&self, invoice_id: &InvoiceId) -> Result<Vec<Payment>, AppError> {
        Ok(self.payments.list_by_invoice(invoice_id).await?)
    }

    async fn load_invoice(&self, id: &InvoiceId) -> Result<Invoice, AppError> {
        self.invoices
            .find_by_id(id)
            .await?
            .filter(|invoice| !invoice.is_deleted())
            .ok_or_else(|| AppError::not_found("Invoice", id))
    }

    fn check_payable(invoice: &Invoice, amount: Decimal) -> Result<(), DomainError> {
        if !invoice.accepts_payment() {
            return Err(DomainError::InvalidState(format!(
                "Invoice {} is {} and accepts no further payment",
                invoice.invoice_number, invoice.status
            )));
        }
        if amount <= Decimal::ZERO {
            return Err(DomainError::Validation(
                "Payment amount must be positive".to_string(),
            ));
        }
        if amount > invoice.amount_due {
            return Err(DomainError::InvariantViolation(format!(
                "Payment of {} exceeds balance due {} on invoice {}",
                amount, invoice.amount_due, invoice.invoice_number
            )));
        }
        Ok(())
    }

    // ========== Create / confirm ==========

    /// Start a payment on any rail; the invoice balance moves only on confirmation
    pub async fn create_payment(&self, input: NewPayment) -> Result<CreatedPayment, AppError> {
        let invoice = self.load_invoice(&input.invoice_id).await?;
        Self::check_payable(&invoice, input.amount)?;

        let now = self.ctx.now();
        let payment_id = PaymentId::new();
        let description = format!("Invoice {}", invoice.invoice_number);

        let (status, details, next_action) = match input.method {
            PaymentMethod::CreditCard | PaymentMethod::DebitCard => {
                let card = input.card.as_ref().ok_or_else(|| {
                    AppError::BadRequest("Card payments require card data".to_string())
                })?;
                let installments = card.installments.unwrap_or(1).max(1);
                let authorization = self
                    .gateway
                    .charge_card(&CardCharge {
                        payment_id,
                        amount: input.amount,
                        card_token: card.token.clone(),
                        installments,
                        description,
                    })
                    .await?;
                let action = authorization
                    .authorization_url
                    .clone()
                    .map(|url| PaymentAction::Redirect { url });
                (
                    PaymentStatus::Processing,
                    PaymentDetails::Card {
                        transaction_id: authorization.transaction_id,
                        last_four: card.last_four.clone(),
                        installments,
                        authorization_url: authorization.authorization_url,
                    },
                    action,
                )
            }
            PaymentMethod::Pix => {
                let minutes = input
                    .expiration_minutes
                    .unwrap_or(self.ctx.config.pix_expiration_minutes);
                let pix = self
                    .gateway
                    .create_pix(&PixRequest {
                        payment_id,
                        amount: input.amount,
                        expires_at: now + Duration::minutes(minutes),
                        description,
                    })
                    .await?;
                let action = PaymentAction::ScanPix {
                    code: pix.code.clone(),
                    qr_code: pix.qr_code.clone(),
                    expires_at: pix.expires_at,
                };
                (
                    PaymentStatus::Pending,
                    PaymentDetails::Pix {
                        code: pix.code,
                        qr_code: pix.qr_code,
                        expires_at: pix.expires_at,
                    },
                    Some(action),
                )
            }
            PaymentMethod::Boleto => {
                let days = input
                    .days_to_expire
                    .unwrap_or(self.ctx.config.boleto_days_to_expire);
                let boleto = self
                    .gateway
                    .create_boleto(&BoletoRequest {
                        payment_id,
                        amount: input.amount,
                        payer: invoice.patient_id,
                        expires_at: now + Duration::days(days),
                    })
                    .await?;
                let action = PaymentAction::PayBoleto {
                    barcode: boleto.barcode.clone(),
                    digitable_line: boleto.digitable_line.clone(),
                    url: boleto.url.clone(),
                    expires_at: boleto.expires_at,
                };
                (
                    PaymentStatus::Pending,
                    PaymentDetails::Boleto {
                        barcode: boleto.barcode,
                        digitable_line: boleto.digitable_line,
                        url: boleto.url,
                        expires_at: boleto.expires_at,
                    },
                    Some(action),
                )
            }
            PaymentMethod::Cash | PaymentMethod::Check | PaymentMethod::BankTransfer => (
                PaymentStatus::Pending,
                PaymentDetails::Manual {
                    reference_number: None,
                    bank_name: None,
                    receipt_url: None,
                },
                Some(PaymentAction::AwaitManualConfirmation),
            ),
        };

        let payment = Payment {
            id: payment_id,
            invoice_id: invoice.id,
            clinic_id: invoice.clinic_id,
            patient_id: invoice.patient_id,
            amount: input.amount,
            surcharge: Decimal::ZERO,
            refunded_amount: Decimal::ZERO,
            method: input.method,
            status,
            details: Some(details),
            is_manual: false,
            installment: None,
            paid_at: None,
            failed_at: None,
            failure_reason: None,
            refunded_at: None,
            refund_reason: None,
            refunds: Vec::new(),
            notes: input.notes,
            created_by: input.created_by,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        let payment = self.payments.create(&payment).await?;

        tracing::info!(
            payment_id = %payment.id,
            invoice_id = %payment.invoice_id,
            method = %payment.method,
            amount = %payment.amount,
            "Created payment"
        );
        self.ctx
            .emit(BillingEvent::PaymentCreated {
                payment_id: payment.id,
                invoice_id: payment.invoice_id,
                method: payment.method,
                amount: payment.amount,
                timestamp: now,
            })
            .await;
        self.ctx
            .audit(
                "payment.created",
                "payment",
                payment.id.0,
                payment.created_by,
                serde_json::json!({ "method": payment.method, "amount": payment.amount }),
            )
            .await;

        Ok(CreatedPayment {
            payment,
            next_action,
        })
    }

    /// PENDING/PROCESSING -> COMPLETED, crediting the invoice
    pub async fn confirm_payment(
        &self,
        id: &PaymentId,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<Payment, AppError> {
        let invoice_id = self.get_payment(id).await?.invoice_id;
        let guard = self.ctx.locks.lock(invoice_id).await;

        let mut payment = self.get_payment(id).await?;
        let mut invoice = self.load_invoice(&invoice_id).await?;
        guard.ensure_covers(payment.invoice_id)?;

        let now = self.ctx.now();
        payment.confirm(paid_at.unwrap_or(now), now)?;
        invoice.apply_settlement(&Settlement::payment(payment.id, payment.amount), now)?;

        let mut changes = Changeset::new();
        if let Some(plan) = settle_open_plan(self.plans.as_ref(), &invoice, now).await? {
            changes = changes.update_plan(plan);
        }
        let mut committed = self
            .ctx
            .commit(&guard, changes.update_invoice(invoice).update_payment(payment))
            .await?;
        drop(guard);
        let invoice = committed.take_invoice()?;
        let payment = committed.take_payment()?;

        tracing::info!(
            payment_id = %payment.id,
            invoice_id = %invoice.id,
            amount = %payment.amount,
            amount_due = %invoice.amount_due,
            status = %invoice.status,
            "Confirmed payment"
        );
        self.ctx
            .emit(BillingEvent::PaymentConfirmed {
                payment_id: payment.id,
                invoice_id: invoice.id,
                patient_id: invoice.patient_id,
                amount: payment.amount,
                timestamp: now,
            })
            .await;
        self.ctx
            .audit(
                "payment.confirmed",
                "payment",
                payment.id.0,
                None,
                serde_json::json!({
                    "amount": payment.amount,
                    "invoice_status": invoice.status,
                    "amount_due": invoice.amount_due,
                }),
            )
            .await;
        if let Some(plan) = committed.take_plan() {
            announce_plan_completed(&self.ctx, &plan).await;
        }
        Ok(payment)
    }

    /// PENDING/PROCESSING -> FAILED
    ///
    /// Runs under the invoice lock so it cannot interleave with a confirmation
    /// of the same payment.
    pub async fn fail_payment(&self, id: &PaymentId, reason: &str) -> Result<Payment, AppError> {
        let invoice_id = self.get_payment(id).await?.invoice_id;
        let guard = self.ctx.locks.lock(invoice_id).await;

        let mut payment = self.get_payment(id).await?;
        guard.ensure_covers(payment.invoice_id)?;
        let now = self.ctx.now();
        payment.fail(reason, now)?;
        let payment = self
            .ctx
            .commit(&guard, Changeset::new().update_payment(payment))
            .await?
            .take_payment()?;
        drop(guard);

        self.announce_failed(&payment, reason).await;
        Ok(payment)
    }

    /// Log, emit and audit a payment that moved to FAILED
    pub async fn announce_failed(&self, payment: &Payment, reason: &str) {
        tracing::info!(payment_id = %payment.id, reason, "Payment failed");
        self.ctx
            .emit(BillingEvent::PaymentFailed {
                payment_id: payment.id,
                invoice_id: payment.invoice_id,
                reason: reason.to_string(),
                timestamp: payment.updated_at,
            })
            .await;
        self.ctx
            .audit(
                "payment.failed",
                "payment",
                payment.id.0,
                None,
                serde_json::json!({ "reason": reason }),
            )
            .await;
    }

    /// Record money received outside any gateway in one step
    pub async fn record_manual_payment(&self, input: ManualPayment) -> Result<Payment, AppError> {
        let guard = self.ctx.locks.lock(input.invoice_id).await;
        let mut invoice = self.load_invoice(&input.invoice_id).await?;
        let settled = SettledPayment {
            amount: input.amount,
            surcharge: Decimal::ZERO,
            method: input.method,
            paid_at: input.paid_at.unwrap_or_else(|| self.ctx.now()),
            details: Some(PaymentDetails::Manual {
                reference_number: input.reference_number,
                bank_name: input.bank_name,
                receipt_url: input.receipt_url,
            }),
            is_manual: true,
            installment: None,
            notes: input.notes,
            created_by: input.created_by,
        };
        let payment = self.settle_payment(&guard, &mut invoice, settled)?;

        let mut changes = Changeset::new();
        if let Some(plan) = settle_open_plan(self.plans.as_ref(), &invoice, self.ctx.now()).await? {
            changes = changes.update_plan(plan);
        }
        let mut committed = self
            .ctx
            .commit(&guard, changes.update_invoice(invoice).create_payment(payment))
            .await?;
        drop(guard);
        let invoice = committed.take_invoice()?;
        let payment = committed.take_payment()?;

        self.announce_settled(&invoice, &payment).await;
        if let Some(plan) = committed.take_plan() {
            announce_plan_completed(&self.ctx, &plan).await;
        }
        Ok(payment)
    }

    /// Build an already settled payment and credit it to `invoice`
    ///
    /// Nothing is written; the caller commits the invoice and the payment
    /// together while still holding the invoice lock.
    pub fn settle_payment(
        &self,
        guard: &InvoiceGuard,
        invoice: &mut Invoice,
        settled: SettledPayment,
    ) -> Result<Payment, AppError> {
        guard.ensure_covers(invoice.id)?;
        Self::check_payable(invoice, settled.amount)?;
        if settled.surcharge < Decimal::ZERO {
            return Err(DomainError::Validation("Surcharge must not be negative".to_string()).into());
        }

        let now = self.ctx.now();
        let payment = Payment {
            id: PaymentId::new(),
            invoice_id: invoice.id,
            clinic_id: invoice.clinic_id,
            patient_id: invoice.patient_id,
            amount: settled.amount,
            surcharge: settled.surcharge,
            refunded_amount: Decimal::ZERO,
            method: settled.method,
            status: PaymentStatus::Completed,
            details: settled.details,
            is_manual: settled.is_manual,
            installment: settled.installment,
            paid_at: Some(settled.paid_at),
            failed_at: None,
            failure_reason: None,
            refunded_at: None,
            refund_reason: None,
            refunds: Vec::new(),
            notes: settled.notes,
            created_by: settled.created_by,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        invoice.apply_settlement(&Settlement::payment(payment.id, payment.amount), now)?;
        Ok(payment)
    }

    /// Log, emit and audit a committed settled payment
    pub async fn announce_settled(&self, invoice: &Invoice, payment: &Payment) {
        tracing::info!(
            payment_id = %payment.id,
            invoice_id = %invoice.id,
            method = %payment.method,
            amount = %payment.amount,
            surcharge = %payment.surcharge,
            status = %invoice.status,
            "Recorded settled payment"
        );
        self.ctx
            .emit(BillingEvent::PaymentConfirmed {
                payment_id: payment.id,
                invoice_id: invoice.id,
                patient_id: invoice.patient_id,
                amount: payment.gross_amount(),
                timestamp: payment.created_at,
            })
            .await;
        self.ctx
            .audit(
                "payment.recorded",
                "payment",
                payment.id.0,
                payment.created_by,
                serde_json::json!({
                    "method": payment.method,
                    "amount": payment.amount,
                    "surcharge": payment.surcharge,
                    "is_manual": payment.is_manual,
                }),
            )
            .await;
    }

    // ========== Refunds ==========

    /// Give back `amount` (default: everything still refundable)
    pub async fn refund_payment(
        &self,
        id: &PaymentId,
        amount: Option<Decimal>,
        reason: RefundReason,
        user_id: Option<UserId>,
    ) -> Result<Payment, AppError> {
        let invoice_id = self.get_payment(id).await?.invoice_id;
        let guard = self.ctx.locks.lock(invoice_id).await;
        let (_, payment) = self
            .refund_payment_held(&guard, id, amount, reason, user_id)
            .await?;
        Ok(payment)
    }

    /// Refund while the caller already holds the payment's invoice lock
    ///
    /// Card refunds reach the gateway before anything is written. If the
    /// write then fails the money has left; that case is logged and audited
    /// as `payment.refund_unrecorded` for reconciliation.
    pub async fn refund_payment_held(
        &self,
        guard: &InvoiceGuard,
        id: &PaymentId,
        amount: Option<Decimal>,
        reason: RefundReason,
        user_id: Option<UserId>,
    ) -> Result<(Invoice, Payment), AppError> {
        let mut payment = self.get_payment(id).await?;
        guard.ensure_covers(payment.invoice_id)?;
        let mut invoice = self
            .invoices
            .find_by_id(&payment.invoice_id)
            .await?
            .ok_or_else(|| AppError::not_found("Invoice", payment.invoice_id))?;

        let now = self.ctx.now();
        let refund = amount.unwrap_or_else(|| payment.refundable_amount());
        payment.register_refund(refund, reason, user_id, now)?;
        invoice.apply_settlement(&Settlement::refund(payment.id, refund), now)?;

        let card_transaction = match &payment.details {
            Some(PaymentDetails::Card { transaction_id, .. }) => Some(transaction_id.clone()),
            _ => None,
        };
        if let Some(transaction_id) = &card_transaction {
            self.gateway.refund_card(transaction_id, refund).await?;
        }

        let changes = Changeset::new()
            .update_invoice(invoice)
            .update_payment(payment);
        let mut committed = match self.ctx.commit(guard, changes).await {
            Ok(committed) => committed,
            Err(e) => {
                if let Some(transaction_id) = card_transaction {
                    tracing::error!(
                        payment_id = %id,
                        transaction_id = %transaction_id,
                        refund = %refund,
                        error = %e,
                        "Card refunded at the gateway but not recorded"
                    );
                    self.ctx
                        .audit(
                            "payment.refund_unrecorded",
                            "payment",
                            id.0,
                            user_id,
                            serde_json::json!({
                                "amount": refund,
                                "transaction_id": transaction_id,
                                "error": e.to_string(),
                            }),
                        )
                        .await;
                }
                return Err(e);
            }
        };
        let invoice = committed.take_invoice()?;
        let payment = committed.take_payment()?;

        tracing::info!(
            payment_id = %payment.id,
            invoice_id = %invoice.id,
            refund = %refund,
            reason = %reason,
            payment_status = %payment.status,
            invoice_status = %invoice.status,
            "Refunded payment"
        );
        self.ctx
            .emit(BillingEvent::PaymentRefunded {
                payment_id: payment.id,
                invoice_id: invoice.id,
                amount: refund,
                timestamp: now,
            })
            .await;
        self.ctx
            .audit(
                "payment.refunded",
                "payment",
                payment.id.0,
                user_id,
                serde_json::json!({ "amount": refund, "reason": reason }),
            )
            .await;
        Ok((invoice, payment))
    }
}
