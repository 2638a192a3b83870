//! Invoice service
//!
//! Builds invoices (price resolution, item/discount/tax arithmetic), drives
//! the DRAFT -> PENDING -> SENT lifecycle and cancels with optional refunds.
//! Cancelling also fails any payment still waiting on the gateway.

use std::sync::Arc;

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::app::{PaymentService, PriceResolver, ServiceContext};
use crate::domain::entities::{
    compute_totals, format_invoice_number, BillingEvent, InsurerId, Invoice,
    InvoiceFilter, InvoiceId, InvoiceItem, InvoiceStatus, InvoiceTotals, InvoiceUpdate,
    NewInvoice, NewInvoiceItem, NewTax, PaymentStatus, PriceTableId, RefundReason, UserId,
};
use crate::domain::ports::{
    Changeset, InvoiceRepository, PaymentGateway, PaymentPlanRepository, PaymentRepository,
    PriceTableRepository, SequenceKind,
};
use crate::error::{AppError, DomainError};

const OPEN_PAYMENT_CANCELLED: &str = "Invoice cancelled";

/// Cancellation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelInvoice {
    pub reason: String,
    /// Refund every completed payment before cancelling
    #[serde(default)]
    pub refund_payments: bool,
    /// Reason recorded on each refund (defaults to INVOICE_CANCELLED)
    #[serde(default)]
    pub refund_reason: Option<RefundReason>,
    #[serde(default)]
    pub cancelled_by: Option<UserId>,
}

/// Service for invoice construction and lifecycle
pub struct InvoiceService<IR, PTR, PR, PPR, GW>
where
    IR: InvoiceRepository,
    PTR: PriceTableRepository,
    PR: PaymentRepository,
    PPR: PaymentPlanRepository,
    GW: PaymentGateway,
{
    invoices: Arc<IR>,
    payment_repo: Arc<PR>,
    pricing: Arc<PriceResolver<PTR>>,
    payments: Arc<PaymentService<IR, PR, PPR, GW>>,
    ctx: ServiceContext,
}

impl<IR, PTR, PR, PPR, GW> InvoiceService<IR, PTR, PR, PPR, GW>
where
    IR: InvoiceRepository,
    PTR: PriceTableRepository,
    PR: PaymentRepository,
    PPR: PaymentPlanRepository,
    GW: PaymentGateway,
{
    pub fn new(
        invoices: Arc<IR>,
        payment_repo: Arc<PR>,
        pricing: Arc<PriceResolver<PTR>>,
        payments: Arc<PaymentService<IR, PR, PPR, GW>>,
        ctx: ServiceContext,
    ) -> Self {
        Self {
            invoices,
            payment_repo,
            pricing,
            payments,
            ctx,
        }
    }

    // ========== Queries ==========

    pub async fn get_invoice(&self, id: &InvoiceId) -> Result<Invoice, AppError> {
        self.invoices
            .find_by_id(id)
            .await?
            .filter(|invoice| !invoice.is_deleted())
            .ok_or_else(|| AppError::not_found("Invoice", id))
    }

    pub async fn list_invoices(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, AppError> {
        Ok(self.invoices.list(filter).await?)
    }

    // ========== Construction ==========

    /// Compute items, resolving missing unit prices through the price tables
    async fn build_items(
        &self,
        requested: &[NewInvoiceItem],
        insurer_id: Option<&InsurerId>,
        price_table_id: Option<&PriceTableId>,
    ) -> Result<Vec<InvoiceItem>, AppError> {
        let mut items = Vec::with_capacity(requested.len());
        for item in requested {
            let unit_price = match (item.unit_price, item.code.as_deref()) {
                (Some(price), _) => price,
                (None, Some(code)) => {
                    self.pricing
                        .resolve_price(code, insurer_id, price_table_id)
                        .await?
                }
                (None, None) => {
                    return Err(DomainError::Validation(format!(
                        "Item '{}' needs a unit price or a service code",
                        item.description
                    ))
                    .into())
                }
            };
            items.push(InvoiceItem::compute(
                item.code.clone(),
                item.description.clone(),
                item.quantity,
                unit_price,
                item.discount.unwrap_or(Decimal::ZERO),
                item.discount_type.unwrap_or_default(),
            )?);
        }
        Ok(items)
    }

    /// Create a DRAFT invoice, optionally sending it right away
    pub async fn create_invoice(
        &self,
        input: NewInvoice,
        created_by: Option<UserId>,
    ) -> Result<Invoice, AppError> {
        let items = self
            .build_items(
                &input.items,
                input.insurer_id.as_ref(),
                input.price_table_id.as_ref(),
            )
            .await?;
        let totals = compute_totals(
            items,
            input.global_discount.unwrap_or(Decimal::ZERO),
            input.global_discount_type.unwrap_or_default(),
            &input.taxes,
        )?;

        let now = self.ctx.now();
        let issue_date = input.issue_date.unwrap_or(now);
        let due_date = input
            .due_date
            .unwrap_or_else(|| issue_date + Duration::days(self.ctx.config.default_due_in_days));
        if due_date < issue_date {
            return Err(DomainError::Validation(
                "Due date must not precede the issue date".to_string(),
            )
            .into());
        }

        let sequence = self
            .ctx
            .next_sequence(SequenceKind::Invoice, input.clinic_id, issue_date)
            .await?;
        let InvoiceTotals {
            items,
            subtotal,
            global_discount,
            global_discount_type,
            discount_total,
            taxes,
            tax_total,
            total,
        } = totals;

        let invoice = Invoice {
            id: InvoiceId::new(),
            invoice_number: format_invoice_number(issue_date, sequence),
            clinic_id: input.clinic_id,
            patient_id: input.patient_id,
            insurer_id: input.insurer_id,
            consultation_id: input.consultation_id,
            appointment_id: input.appointment_id,
            price_table_id: input.price_table_id,
            payment_plan_id: None,
            has_payment_plan: false,
            items,
            subtotal,
            global_discount,
            global_discount_type,
            discount_total,
            taxes,
            tax_total,
            total,
            amount_paid: Decimal::ZERO,
            amount_due: total,
            insurance_coverage: Decimal::ZERO,
            status: InvoiceStatus::Draft,
            issue_date,
            due_date,
            paid_date: None,
            sent_at: None,
            cancelled_at: None,
            cancellation_reason: None,
            cancelled_by: None,
            notes: input.notes,
            created_by,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            version: 0,
        };
        let invoice = self.invoices.create(&invoice).await?;

        tracing::info!(
            invoice_id = %invoice.id,
            invoice_number = %invoice.invoice_number,
            total = %invoice.total,
            "Created invoice"
        );
        self.ctx
            .emit(BillingEvent::InvoiceCreated {
                invoice_id: invoice.id,
                patient_id: invoice.patient_id,
                total: invoice.total,
                timestamp: now,
            })
            .await;
        self.ctx
            .audit(
                "invoice.created",
                "invoice",
                invoice.id.0,
                created_by,
                serde_json::json!({
                    "invoice_number": invoice.invoice_number,
                    "total": invoice.total,
                    "items": invoice.items.len(),
                }),
            )
            .await;

        if input.send_to_patient {
            return self.send_invoice(&invoice.id).await;
        }
        Ok(invoice)
    }

    /// Re-run the arithmetic on a DRAFT/PENDING invoice
    pub async fn update_invoice(
        &self,
        id: &InvoiceId,
        update: InvoiceUpdate,
    ) -> Result<Invoice, AppError> {
        let _guard = self.ctx.locks.lock(*id).await;
        let mut invoice = self.get_invoice(id).await?;
        if !invoice.is_editable() {
            return Err(DomainError::InvalidState(format!(
                "Invoice {} is {}; only DRAFT or PENDING invoices can be edited",
                invoice.invoice_number, invoice.status
            ))
            .into());
        }

        let items = match &update.items {
            Some(requested) => {
                self.build_items(
                    requested,
                    invoice.insurer_id.as_ref(),
                    invoice.price_table_id.as_ref(),
                )
                .await?
            }
            None => invoice.items.clone(),
        };
        let taxes: Vec<NewTax> = match update.taxes {
            Some(taxes) => taxes,
            None => invoice
                .taxes
                .iter()
                .map(|t| NewTax {
                    name: t.name.clone(),
                    percentage: t.percentage,
                })
                .collect(),
        };
        let totals = compute_totals(
            items,
            update.global_discount.unwrap_or(invoice.global_discount),
            update
                .global_discount_type
                .unwrap_or(invoice.global_discount_type),
            &taxes,
        )?;
        invoice.apply_totals(totals)?;

        if let Some(due_date) = update.due_date {
            if due_date < invoice.issue_date {
                return Err(DomainError::Validation(
                    "Due date must not precede the issue date".to_string(),
                )
                .into());
            }
            invoice.due_date = due_date;
        }
        if let Some(notes) = update.notes {
            invoice.notes = Some(notes);
        }
        invoice.updated_at = self.ctx.now();

        let invoice = self.invoices.update(&invoice).await?;
        tracing::info!(invoice_id = %invoice.id, total = %invoice.total, "Updated invoice");
        self.ctx
            .audit(
                "invoice.updated",
                "invoice",
                invoice.id.0,
                None,
                serde_json::json!({ "total": invoice.total, "amount_due": invoice.amount_due }),
            )
            .await;
        Ok(invoice)
    }

    // ========== Lifecycle ==========

    /// DRAFT -> PENDING
    pub async fn finalize_invoice(&self, id: &InvoiceId) -> Result<Invoice, AppError> {
        let _guard = self.ctx.locks.lock(*id).await;
        let mut invoice = self.get_invoice(id).await?;
        invoice.finalize(self.ctx.now())?;
        let invoice = self.invoices.update(&invoice).await?;
        tracing::info!(invoice_id = %invoice.id, "Finalized invoice");
        self.ctx
            .audit(
                "invoice.finalized",
                "invoice",
                invoice.id.0,
                None,
                serde_json::Value::Null,
            )
            .await;
        Ok(invoice)
    }

    /// Deliver the invoice to the patient
    pub async fn send_invoice(&self, id: &InvoiceId) -> Result<Invoice, AppError> {
        let guard = self.ctx.locks.lock(*id).await;
        let mut invoice = self.get_invoice(id).await?;
        let now = self.ctx.now();
        invoice.mark_sent(now)?;
        let invoice = self.invoices.update(&invoice).await?;
        drop(guard);

        tracing::info!(invoice_id = %invoice.id, status = %invoice.status, "Sent invoice");
        self.ctx
            .emit(BillingEvent::InvoiceSent {
                invoice_id: invoice.id,
                patient_id: invoice.patient_id,
                invoice_number: invoice.invoice_number.clone(),
                amount_due: invoice.amount_due,
                timestamp: now,
            })
            .await;
        self.ctx
            .audit(
                "invoice.sent",
                "invoice",
                invoice.id.0,
                None,
                serde_json::Value::Null,
            )
            .await;
        Ok(invoice)
    }

    /// Cancel, refunding completed payments first when asked to
    ///
    /// Refunds are attempted for every payment and each outcome is audited.
    /// If any refund fails the invoice is left uncancelled and an error is
    /// returned; successful refunds stay in place. Payments still PENDING or
    /// PROCESSING are failed in the same commit that cancels the invoice.
    pub async fn cancel_invoice(
        &self,
        id: &InvoiceId,
        request: CancelInvoice,
    ) -> Result<Invoice, AppError> {
        if request.reason.trim().is_empty() {
            return Err(AppError::BadRequest(
                "A cancellation reason is required".to_string(),
            ));
        }
        let guard = self.ctx.locks.lock(*id).await;
        let invoice = self.get_invoice(id).await?;
        if matches!(
            invoice.status,
            InvoiceStatus::Paid | InvoiceStatus::Cancelled | InvoiceStatus::Refunded
        ) {
            return Err(DomainError::InvalidState(format!(
                "Invoice {} is {} and cannot be cancelled",
                invoice.invoice_number, invoice.status
            ))
            .into());
        }
        if invoice.has_payment_plan {
            return Err(DomainError::InvalidState(format!(
                "Invoice {} has an active payment plan; cancel the plan first",
                invoice.invoice_number
            ))
            .into());
        }

        let mut invoice = invoice;
        if invoice.amount_paid > Decimal::ZERO {
            if !request.refund_payments {
                return Err(DomainError::InvalidState(format!(
                    "Invoice {} has {} in payments; cancel with refunds",
                    invoice.invoice_number, invoice.amount_paid
                ))
                .into());
            }

            let reason = request.refund_reason.unwrap_or(RefundReason::InvoiceCancelled);
            let refundable: Vec<_> = self
                .payment_repo
                .list_by_invoice(id)
                .await?
                .into_iter()
                .filter(|p| {
                    matches!(
                        p.status,
                        PaymentStatus::Completed | PaymentStatus::PartiallyRefunded
                    ) && p.refundable_amount() > Decimal::ZERO
                })
                .collect();

            let mut failures = 0usize;
            for payment in refundable {
                match self
                    .payments
                    .refund_payment_held(&guard, &payment.id, None, reason, request.cancelled_by)
                    .await
                {
                    Ok((updated, _)) => invoice = updated,
                    Err(e) => {
                        failures += 1;
                        tracing::warn!(
                            invoice_id = %id,
                            payment_id = %payment.id,
                            error = %e,
                            "Refund during cancellation failed"
                        );
                        self.ctx
                            .audit(
                                "payment.refund_failed",
                                "payment",
                                payment.id.0,
                                request.cancelled_by,
                                serde_json::json!({ "error": e.to_string(), "reason": reason }),
                            )
                            .await;
                    }
                }
            }
            if failures > 0 {
                return Err(DomainError::InvalidState(format!(
                    "Invoice {} was not cancelled: {} refund(s) failed",
                    invoice.invoice_number, failures
                ))
                .into());
            }
        }

        let now = self.ctx.now();
        invoice.cancel(&request.reason, request.cancelled_by, now)?;
        let mut changes = Changeset::new();
        for mut payment in self.payment_repo.list_by_invoice(id).await? {
            if matches!(
                payment.status,
                PaymentStatus::Pending | PaymentStatus::Processing
            ) {
                payment.fail(OPEN_PAYMENT_CANCELLED, now)?;
                changes = changes.update_payment(payment);
            }
        }
        let mut committed = self
            .ctx
            .commit(&guard, changes.update_invoice(invoice))
            .await?;
        drop(guard);
        let invoice = committed.take_invoice()?;
        for payment in committed.take_payments() {
            self.payments
                .announce_failed(&payment, OPEN_PAYMENT_CANCELLED)
                .await;
        }

        tracing::info!(invoice_id = %invoice.id, reason = %request.reason, "Cancelled invoice");
        self.ctx
            .emit(BillingEvent::InvoiceCancelled {
                invoice_id: invoice.id,
                reason: request.reason.clone(),
                timestamp: now,
            })
            .await;
        self.ctx
            .audit(
                "invoice.cancelled",
                "invoice",
                invoice.id.0,
                request.cancelled_by,
                serde_json::json!({ "reason": request.reason, "refunded": request.refund_payments }),
            )
            .await;
        Ok(invoice)
    }

    /// Soft delete a DRAFT or CANCELLED invoice
    pub async fn delete_invoice(&self, id: &InvoiceId, user_id: Option<UserId>) -> Result<(), AppError> {
        let _guard = self.ctx.locks.lock(*id).await;
        let mut invoice = self.get_invoice(id).await?;
        if !matches!(invoice.status, InvoiceStatus::Draft | InvoiceStatus::Cancelled) {
            return Err(DomainError::InvalidState(format!(
                "Invoice {} is {}; only DRAFT or CANCELLED invoices can be deleted",
                invoice.invoice_number, invoice.status
            ))
            .into());
        }
        let now = self.ctx.now();
        invoice.deleted_at = Some(now);
        invoice.updated_at = now;
        self.invoices.update(&invoice).await?;

        tracing::info!(invoice_id = %id, "Deleted invoice");
        self.ctx
            .audit("invoice.deleted", "invoice", id.0, user_id, serde_json::Value::Null)
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{
        CardInput, DiscountType, ManualPayment, NewPayment, PaymentMethod, PriceTableType,
    };
    use crate::test_utils::{new_invoice, plain_item, test_price_table, TestHarness};
    use rust_decimal_macros::dec;

    fn scenario_items() -> Vec<NewInvoiceItem> {
        vec![
            plain_item("Consulta", dec!(2), dec!(100)),
            NewInvoiceItem {
                code: None,
                description: "Curativo".to_string(),
                quantity: dec!(1),
                unit_price: Some(dec!(50)),
                discount: Some(dec!(10)),
                discount_type: Some(DiscountType::Percentage),
            },
        ]
    }

    #[tokio::test]
    async fn create_computes_totals_and_number() {
        let harness = TestHarness::new();
        let service = harness.invoice_service();

        let invoice = service
            .create_invoice(new_invoice(scenario_items()), None)
            .await
            .unwrap();
        assert_eq!(invoice.subtotal, dec!(245));
        assert_eq!(invoice.total, dec!(245));
        assert_eq!(invoice.amount_due, dec!(245));
        assert_eq!(invoice.status, InvoiceStatus::Draft);
        assert_eq!(invoice.invoice_number, "INV-2026-000001");
        assert_eq!(invoice.due_date, harness.now() + Duration::days(30));

        let second = service
            .create_invoice(new_invoice(scenario_items()), None)
            .await
            .unwrap();
        assert_eq!(second.invoice_number, "INV-2026-000002");
        assert_eq!(harness.notifier.count("invoice.created"), 2);
    }

    #[tokio::test]
    async fn items_without_price_use_price_tables() {
        let harness = TestHarness::new();
        harness.price_tables.insert(test_price_table(
            PriceTableType::Private,
            None,
            &[("CONSULTA", dec!(180))],
        ));
        let service = harness.invoice_service();

        let mut input = new_invoice(vec![NewInvoiceItem {
            code: Some("CONSULTA".into()),
            description: "Consulta".into(),
            quantity: dec!(1),
            unit_price: None,
            discount: None,
            discount_type: None,
        }]);
        input.taxes = vec![NewTax {
            name: "ISS".into(),
            percentage: dec!(5),
        }];
        let invoice = service.create_invoice(input, None).await.unwrap();
        assert_eq!(invoice.items[0].unit_price, dec!(180));
        assert_eq!(invoice.tax_total, dec!(9.00));
        assert_eq!(invoice.total, dec!(189.00));
    }

    #[tokio::test]
    async fn send_to_patient_sends_after_creation() {
        let harness = TestHarness::new();
        let service = harness.invoice_service();
        let mut input = new_invoice(scenario_items());
        input.send_to_patient = true;

        let invoice = service.create_invoice(input, None).await.unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Sent);
        assert!(invoice.sent_at.is_some());
        assert_eq!(harness.notifier.count("invoice.sent"), 1);
    }

    #[tokio::test]
    async fn edit_only_while_draft_or_pending() {
        let harness = TestHarness::new();
        let service = harness.invoice_service();
        let invoice = service
            .create_invoice(new_invoice(scenario_items()), None)
            .await
            .unwrap();

        let update = InvoiceUpdate {
            global_discount: Some(dec!(45)),
            ..Default::default()
        };
        let updated = service.update_invoice(&invoice.id, update.clone()).await.unwrap();
        assert_eq!(updated.discount_total, dec!(45));
        assert_eq!(updated.total, dec!(200));
        assert_eq!(updated.amount_due, dec!(200));

        service.send_invoice(&invoice.id).await.unwrap();
        let err = service.update_invoice(&invoice.id, update).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::InvalidState(_))));
    }

    #[tokio::test]
    async fn finalize_moves_draft_to_pending() {
        let harness = TestHarness::new();
        let service = harness.invoice_service();
        let invoice = service
            .create_invoice(new_invoice(scenario_items()), None)
            .await
            .unwrap();

        let invoice = service.finalize_invoice(&invoice.id).await.unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Pending);
        assert!(service.finalize_invoice(&invoice.id).await.is_err());
        let invoice = service.send_invoice(&invoice.id).await.unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Sent);
    }

    #[tokio::test]
    async fn cancel_with_payments_requires_refund_flag() {
        let harness = TestHarness::new();
        let service = harness.invoice_service();
        let invoice = service
            .create_invoice(new_invoice(scenario_items()), None)
            .await
            .unwrap();
        harness
            .payment_service()
            .record_manual_payment(ManualPayment {
                invoice_id: invoice.id,
                amount: dec!(100),
                method: PaymentMethod::Cash,
                paid_at: None,
                reference_number: None,
                bank_name: None,
                receipt_url: None,
                notes: None,
                created_by: None,
            })
            .await
            .unwrap();

        let request = CancelInvoice {
            reason: "Procedimento não realizado".into(),
            refund_payments: false,
            refund_reason: None,
            cancelled_by: None,
        };
        let err = service
            .cancel_invoice(&invoice.id, request.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::InvalidState(_))));

        let cancelled = service
            .cancel_invoice(
                &invoice.id,
                CancelInvoice {
                    refund_payments: true,
                    refund_reason: Some(RefundReason::ServiceNotProvided),
                    ..request
                },
            )
            .await
            .unwrap();
        assert_eq!(cancelled.status, InvoiceStatus::Cancelled);
        assert_eq!(cancelled.amount_paid, Decimal::ZERO);

        let payments = harness.payment_service().list_payments(&invoice.id).await.unwrap();
        assert_eq!(payments[0].status, PaymentStatus::Refunded);
        assert_eq!(
            payments[0].refund_reason,
            Some(RefundReason::ServiceNotProvided)
        );
    }

    #[tokio::test]
    async fn failed_refund_leaves_invoice_uncancelled() {
        let harness = TestHarness::new();
        let service = harness.invoice_service();
        let payments = harness.payment_service();
        let invoice = service
            .create_invoice(new_invoice(scenario_items()), None)
            .await
            .unwrap();
        let created = payments
            .create_payment(NewPayment {
                invoice_id: invoice.id,
                amount: dec!(100),
                method: PaymentMethod::CreditCard,
                card: Some(CardInput {
                    token: "tok".into(),
                    last_four: None,
                    installments: None,
                }),
                expiration_minutes: None,
                days_to_expire: None,
                notes: None,
                created_by: None,
            })
            .await
            .unwrap();
        payments.confirm_payment(&created.payment.id, None).await.unwrap();
        harness.gateway.set_failing(true);

        let err = service
            .cancel_invoice(
                &invoice.id,
                CancelInvoice {
                    reason: "duplicada".into(),
                    refund_payments: true,
                    refund_reason: None,
                    cancelled_by: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::InvalidState(_))));

        let stored = harness.invoices.get(&invoice.id).unwrap();
        assert_eq!(stored.status, InvoiceStatus::PartiallyPaid);
        assert_eq!(stored.amount_paid, dec!(100));
        assert!(harness
            .audit
            .actions()
            .contains(&"payment.refund_failed".to_string()));
    }

    #[tokio::test]
    async fn delete_is_soft_and_limited_to_draft_or_cancelled() {
        let harness = TestHarness::new();
        let service = harness.invoice_service();
        let invoice = service
            .create_invoice(new_invoice(scenario_items()), None)
            .await
            .unwrap();
        let sent = service.send_invoice(&invoice.id).await.unwrap();
        assert!(service.delete_invoice(&sent.id, None).await.is_err());

        let draft = service
            .create_invoice(new_invoice(scenario_items()), None)
            .await
            .unwrap();
        service.delete_invoice(&draft.id, None).await.unwrap();
        assert!(matches!(
            service.get_invoice(&draft.id).await,
            Err(AppError::Domain(DomainError::NotFound(_)))
        ));
        assert!(harness.invoices.get(&draft.id).unwrap().deleted_at.is_some());
    }

    #[tokio::test]
    async fn cancel_fails_payments_still_open() {
        let harness = TestHarness::new();
        let service = harness.invoice_service();
        let payments = harness.payment_service();
        let invoice = service
            .create_invoice(new_invoice(scenario_items()), None)
            .await
            .unwrap();
        let created = payments
            .create_payment(NewPayment {
                invoice_id: invoice.id,
                amount: dec!(100),
                method: PaymentMethod::Pix,
                card: None,
                expiration_minutes: None,
                days_to_expire: None,
                notes: None,
                created_by: None,
            })
            .await
            .unwrap();
        assert_eq!(created.payment.status, PaymentStatus::Pending);

        let cancelled = service
            .cancel_invoice(
                &invoice.id,
                CancelInvoice {
                    reason: "paciente desistiu".into(),
                    refund_payments: false,
                    refund_reason: None,
                    cancelled_by: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(cancelled.status, InvoiceStatus::Cancelled);

        let payment = harness.payments.get(&created.payment.id).unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(payment.failure_reason.as_deref(), Some("Invoice cancelled"));
        assert_eq!(harness.notifier.count("payment.failed"), 1);

        // A late gateway confirmation cannot credit the cancelled invoice
        assert!(payments
            .confirm_payment(&created.payment.id, None)
            .await
            .is_err());
        assert_eq!(
            harness.invoices.get(&invoice.id).unwrap().amount_paid,
            Decimal::ZERO
        );
    }

    #[tokio::test]
    async fn failed_cancel_commit_leaves_invoice_and_payment_open() {
        let harness = TestHarness::new();
        let service = harness.invoice_service();
        let payments = harness.payment_service();
        let invoice = service
            .create_invoice(new_invoice(scenario_items()), None)
            .await
            .unwrap();
        let created = payments
            .create_payment(NewPayment {
                invoice_id: invoice.id,
                amount: dec!(100),
                method: PaymentMethod::Pix,
                card: None,
                expiration_minutes: None,
                days_to_expire: None,
                notes: None,
                created_by: None,
            })
            .await
            .unwrap();

        harness.store.fail_next_commit();
        let request = CancelInvoice {
            reason: "duplicada".into(),
            refund_payments: false,
            refund_reason: None,
            cancelled_by: None,
        };
        assert!(service.cancel_invoice(&invoice.id, request).await.is_err());
        assert_eq!(
            harness.invoices.get(&invoice.id).unwrap().status,
            InvoiceStatus::Draft
        );
        assert_eq!(
            harness.payments.get(&created.payment.id).unwrap().status,
            PaymentStatus::Pending
        );
        assert_eq!(harness.notifier.count("payment.failed"), 0);
    }
}
