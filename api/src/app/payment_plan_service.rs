//! Payment plan service
//!
//! Splits an invoice balance into monthly installments and settles them one
//! by one. Only the principal share of an installment reaches the invoice;
//! financing interest, late fees and daily interest are kept on the payment
//! as surcharge. A plan completes once its invoice is settled, whichever
//! path settled it.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::app::{PaymentService, ServiceContext, SettledPayment};
use crate::domain::entities::{
    build_schedule, schedule_due_dates, BillingEvent, InstallmentRef, Invoice, InvoiceId,
    InvoiceStatus, LateCharges, NewPaymentPlan, Payment, PaymentDetails, PaymentMethod,
    PaymentPlan, PaymentPlanId, PlanStatus, PlanTerms, UserId,
};
use crate::domain::ports::{
    Changeset, InvoiceRepository, PaymentGateway, PaymentPlanRepository, PaymentRepository,
};
use crate::error::{AppError, DomainError};

/// Request to pay one installment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayInstallment {
    pub number: u32,
    /// Overrides the computed total due
    #[serde(default)]
    pub amount: Option<Decimal>,
    pub method: PaymentMethod,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_by: Option<UserId>,
}

/// What an installment costs if paid now
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallmentQuote {
    pub plan_id: PaymentPlanId,
    pub number: u32,
    pub amount: Decimal,
    pub principal: Decimal,
    pub due_date: DateTime<Utc>,
    pub days_late: i64,
    pub late_fee: Decimal,
    pub interest: Decimal,
    pub total_due: Decimal,
}

/// Result of paying an installment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallmentPayment {
    pub plan: PaymentPlan,
    pub payment: Payment,
}

/// Complete the ACTIVE plan of an invoice that is now settled in full
///
/// Returns the plan to commit alongside the invoice, or `None` when the
/// invoice is still open or carries no plan.
pub(crate) async fn settle_open_plan<PPR>(
    plans: &PPR,
    invoice: &Invoice,
    at: DateTime<Utc>,
) -> Result<Option<PaymentPlan>, AppError>
where
    PPR: PaymentPlanRepository + ?Sized,
{
    if invoice.status != InvoiceStatus::Paid || !invoice.has_payment_plan {
        return Ok(None);
    }
    let Some(mut plan) = plans.find_active_by_invoice(&invoice.id).await? else {
        return Ok(None);
    };
    plan.complete_settled(at)?;
    Ok(Some(plan))
}

pub(crate) async fn announce_plan_completed(ctx: &ServiceContext, plan: &PaymentPlan) {
    tracing::info!(
        plan_id = %plan.id,
        paid_installments = plan.paid_installments,
        pending_installments = plan.pending_installments,
        "Payment plan completed"
    );
    ctx.emit(BillingEvent::PaymentPlanCompleted {
        plan_id: plan.id,
        invoice_id: plan.invoice_id,
        timestamp: plan.updated_at,
    })
    .await;
    ctx.audit(
        "payment_plan.completed",
        "payment_plan",
        plan.id.0,
        None,
        serde_json::json!({
            "paid_installments": plan.paid_installments,
            "pending_installments": plan.pending_installments,
        }),
    )
    .await;
}

fn committed_plan(committed: &mut Changeset) -> Result<PaymentPlan, DomainError> {
    committed
        .take_plan()
        .ok_or_else(|| DomainError::Internal("Committed changeset carries no plan".to_string()))
}

/// Service for installment plans
pub struct PaymentPlanService<IR, PR, PPR, GW>
where
    IR: InvoiceRepository,
    PR: PaymentRepository,
    PPR: PaymentPlanRepository,
    GW: PaymentGateway,
{
    invoices: Arc<IR>,
    plans: Arc<PPR>,
    payments: Arc<PaymentService<IR, PR, PPR, GW>>,
    ctx: ServiceContext,
}

impl<IR, PR, PPR, GW> PaymentPlanService<IR, PR, PPR, GW>
where
    IR: InvoiceRepository,
    PR: PaymentRepository,
    PPR: PaymentPlanRepository,
    GW: PaymentGateway,
{
    pub fn new(
        invoices: Arc<IR>,
        plans: Arc<PPR>,
        payments: Arc<PaymentService<IR, PR, PPR, GW>>,
        ctx: ServiceContext,
    ) -> Self {
        Self {
            invoices,
            plans,
            payments,
            ctx,
        }
    }

    pub async fn get_payment_plan(&self, id: &PaymentPlanId) -> Result<PaymentPlan, AppError> {
        self.plans
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Payment plan", id))
    }

    async fn load_invoice(&self, id: &InvoiceId) -> Result<Invoice, AppError> {
        self.invoices
            .find_by_id(id)
            .await?
            .filter(|invoice| !invoice.is_deleted())
            .ok_or_else(|| AppError::not_found("Invoice", id))
    }

    fn validate_request(&self, input: &NewPaymentPlan) -> Result<(), DomainError> {
        let max = self.ctx.config.max_installments;
        if input.installments == 0 || input.installments > max {
            return Err(DomainError::Validation(format!(
                "Installments must be between 1 and {}, got {}",
                max, input.installments
            )));
        }
        if let Some(day) = input.due_day {
            if !(1..=31).contains(&day) {
                return Err(DomainError::Validation(format!(
                    "Due day must be between 1 and 31, got {}",
                    day
                )));
            }
        }
        if input
            .monthly_interest_rate
            .is_some_and(|rate| rate < Decimal::ZERO)
        {
            return Err(DomainError::Validation(
                "Monthly interest rate must not be negative".to_string(),
            ));
        }
        if input.down_payment.is_some_and(|down| down < Decimal::ZERO) {
            return Err(DomainError::Validation(
                "Down payment must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Replace the invoice balance with an installment schedule
    ///
    /// The plan, the down payment and the invoice update are committed
    /// together.
    pub async fn create_payment_plan(
        &self,
        input: NewPaymentPlan,
    ) -> Result<PaymentPlan, AppError> {
        self.validate_request(&input)?;

        let guard = self.ctx.locks.lock(input.invoice_id).await;
        let mut invoice = self.load_invoice(&input.invoice_id).await?;
        match invoice.status {
            InvoiceStatus::Paid | InvoiceStatus::Cancelled | InvoiceStatus::Refunded => {
                return Err(DomainError::InvalidState(format!(
                    "Invoice {} is {} and cannot be financed",
                    invoice.invoice_number, invoice.status
                ))
                .into());
            }
            _ => {}
        }
        if invoice.has_payment_plan {
            return Err(DomainError::InvalidState(format!(
                "Invoice {} already has an active payment plan",
                invoice.invoice_number
            ))
            .into());
        }

        let down_payment = input.down_payment.unwrap_or(Decimal::ZERO);
        if down_payment >= invoice.amount_due {
            return Err(DomainError::InvariantViolation(format!(
                "Down payment {} leaves nothing to finance on a balance of {}",
                down_payment, invoice.amount_due
            ))
            .into());
        }
        let financed = invoice.amount_due - down_payment;
        let rate = input.monthly_interest_rate.unwrap_or(Decimal::ZERO);

        let now = self.ctx.now();
        let first_due = input
            .first_due_date
            .unwrap_or_else(|| now + Duration::days(self.ctx.config.default_due_in_days));
        let due_dates = schedule_due_dates(first_due, input.installments, input.due_day)?;
        let schedule = build_schedule(financed, rate, input.installments, &due_dates)?;

        let terms = PlanTerms {
            invoice_id: invoice.id,
            clinic_id: invoice.clinic_id,
            patient_id: invoice.patient_id,
            down_payment,
            financed_amount: financed,
            monthly_interest_rate: rate,
            first_due_date: first_due,
            due_day: input.due_day,
            created_by: input.created_by,
        };
        let plan = PaymentPlan::from_schedule(&terms, schedule, now);

        let mut changes = Changeset::new();
        if down_payment > Decimal::ZERO {
            let settled = SettledPayment {
                amount: down_payment,
                surcharge: Decimal::ZERO,
                method: input.down_payment_method.unwrap_or(PaymentMethod::Cash),
                paid_at: now,
                details: Some(PaymentDetails::Manual {
                    reference_number: Some(format!("PLAN-{}-DOWN", plan.id)),
                    bank_name: None,
                    receipt_url: None,
                }),
                is_manual: true,
                installment: None,
                notes: Some("Down payment".to_string()),
                created_by: input.created_by,
            };
            let payment = self.payments.settle_payment(&guard, &mut invoice, settled)?;
            changes = changes.create_payment(payment);
        }

        invoice.has_payment_plan = true;
        invoice.payment_plan_id = Some(plan.id);
        invoice.updated_at = now;
        let mut committed = self
            .ctx
            .commit(&guard, changes.create_plan(plan).update_invoice(invoice))
            .await?;
        drop(guard);
        let invoice = committed.take_invoice()?;
        let plan = committed_plan(&mut committed)?;
        for payment in committed.take_payments() {
            self.payments.announce_settled(&invoice, &payment).await;
        }

        tracing::info!(
            plan_id = %plan.id,
            invoice_id = %plan.invoice_id,
            installments = plan.installments_count,
            installment_amount = %plan.installment_amount,
            financed = %plan.financed_amount,
            "Created payment plan"
        );
        self.ctx
            .emit(BillingEvent::PaymentPlanCreated {
                plan_id: plan.id,
                invoice_id: plan.invoice_id,
                installments: plan.installments_count,
                installment_amount: plan.installment_amount,
                timestamp: now,
            })
            .await;
        self.ctx
            .audit(
                "payment_plan.created",
                "payment_plan",
                plan.id.0,
                plan.created_by,
                serde_json::json!({
                    "installments": plan.installments_count,
                    "financed_amount": plan.financed_amount,
                    "down_payment": plan.down_payment,
                    "total_amount": plan.total_amount,
                }),
            )
            .await;
        Ok(plan)
    }

    /// Late charges an installment would carry if paid now
    pub async fn quote_installment(
        &self,
        plan_id: &PaymentPlanId,
        number: u32,
    ) -> Result<InstallmentQuote, AppError> {
        let plan = self.get_payment_plan(plan_id).await?;
        let installment = plan.payable_installment(number)?;
        let charges = self.late_charges(installment.amount, installment.due_date);
        Ok(InstallmentQuote {
            plan_id: plan.id,
            number,
            amount: installment.amount,
            principal: installment.principal,
            due_date: installment.due_date,
            days_late: charges.days_late,
            late_fee: charges.late_fee,
            interest: charges.interest,
            total_due: charges.total_due,
        })
    }

    fn late_charges(&self, amount: Decimal, due_date: DateTime<Utc>) -> LateCharges {
        LateCharges::accrue(
            amount,
            due_date,
            self.ctx.now(),
            self.ctx.config.late_fee_rate,
            self.ctx.config.daily_interest_rate,
        )
    }

    /// Pay one installment, accruing late fee and interest when overdue
    ///
    /// A payment that settles the invoice completes the plan even when
    /// installments remain.
    pub async fn pay_installment(
        &self,
        plan_id: &PaymentPlanId,
        request: PayInstallment,
    ) -> Result<InstallmentPayment, AppError> {
        let invoice_id = self.get_payment_plan(plan_id).await?.invoice_id;
        let guard = self.ctx.locks.lock(invoice_id).await;

        let mut plan = self.get_payment_plan(plan_id).await?;
        let installment = plan.payable_installment(request.number)?.clone();
        let charges = self.late_charges(installment.amount, installment.due_date);
        let paid = request.amount.unwrap_or(charges.total_due);
        if paid <= Decimal::ZERO {
            return Err(DomainError::Validation(
                "Installment payment must be positive".to_string(),
            )
            .into());
        }

        let mut invoice = self.load_invoice(&invoice_id).await?;
        let principal = installment
            .principal
            .min(paid)
            .min(invoice.amount_due);
        let now = self.ctx.now();
        let settled = SettledPayment {
            amount: principal,
            surcharge: paid - principal,
            method: request.method,
            paid_at: now,
            details: None,
            is_manual: request.method.is_manual(),
            installment: Some(InstallmentRef {
                plan_id: plan.id,
                number: request.number,
            }),
            notes: request.notes,
            created_by: request.created_by,
        };
        let payment = self.payments.settle_payment(&guard, &mut invoice, settled)?;
        plan.record_installment_payment(request.number, paid, &charges, payment.id, now)?;
        if invoice.status == InvoiceStatus::Paid && plan.status == PlanStatus::Active {
            plan.complete_settled(now)?;
        }

        let mut committed = self
            .ctx
            .commit(
                &guard,
                Changeset::new()
                    .update_plan(plan)
                    .update_invoice(invoice)
                    .create_payment(payment),
            )
            .await?;
        drop(guard);
        let invoice = committed.take_invoice()?;
        let payment = committed.take_payment()?;
        let plan = committed_plan(&mut committed)?;

        tracing::info!(
            plan_id = %plan.id,
            number = request.number,
            paid = %paid,
            days_late = charges.days_late,
            late_fee = %charges.late_fee,
            interest = %charges.interest,
            "Paid installment"
        );
        self.payments.announce_settled(&invoice, &payment).await;
        self.ctx
            .emit(BillingEvent::InstallmentPaid {
                plan_id: plan.id,
                number: request.number,
                amount: paid,
                timestamp: now,
            })
            .await;
        self.ctx
            .audit(
                "payment_plan.installment_paid",
                "payment_plan",
                plan.id.0,
                payment.created_by,
                serde_json::json!({
                    "number": request.number,
                    "paid_amount": paid,
                    "late_fee": charges.late_fee,
                    "interest": charges.interest,
                    "payment_id": payment.id,
                }),
            )
            .await;
        if plan.status == PlanStatus::Completed {
            announce_plan_completed(&self.ctx, &plan).await;
        }

        Ok(InstallmentPayment { plan, payment })
    }

    /// ACTIVE -> CANCELLED; the invoice goes back to a lump-sum balance
    pub async fn cancel_payment_plan(
        &self,
        plan_id: &PaymentPlanId,
        user_id: Option<UserId>,
    ) -> Result<PaymentPlan, AppError> {
        let invoice_id = self.get_payment_plan(plan_id).await?.invoice_id;
        let guard = self.ctx.locks.lock(invoice_id).await;

        let mut plan = self.get_payment_plan(plan_id).await?;
        let now = self.ctx.now();
        plan.cancel(now)?;

        let mut invoice = self.load_invoice(&invoice_id).await?;
        invoice.has_payment_plan = false;
        invoice.payment_plan_id = None;
        invoice.updated_at = now;
        let mut committed = self
            .ctx
            .commit(&guard, Changeset::new().update_plan(plan).update_invoice(invoice))
            .await?;
        drop(guard);
        let plan = committed_plan(&mut committed)?;

        tracing::info!(plan_id = %plan.id, invoice_id = %invoice_id, "Cancelled payment plan");
        self.ctx
            .audit(
                "payment_plan.cancelled",
                "payment_plan",
                plan.id.0,
                user_id,
                serde_json::json!({ "paid_installments": plan.paid_installments }),
            )
            .await;
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{InstallmentStatus, ManualPayment};
    use crate::test_utils::{test_invoice, TestHarness};
    use rust_decimal_macros::dec;

    fn plan_request(invoice_id: InvoiceId, installments: u32) -> NewPaymentPlan {
        NewPaymentPlan {
            invoice_id,
            installments,
            down_payment: None,
            down_payment_method: None,
            monthly_interest_rate: None,
            first_due_date: None,
            due_day: None,
            created_by: None,
        }
    }

    fn seeded_invoice(harness: &TestHarness, total: Decimal) -> Invoice {
        let mut invoice = test_invoice(total);
        invoice.status = InvoiceStatus::Sent;
        invoice.sent_at = Some(harness.now());
        harness.invoices.insert(invoice.clone());
        invoice
    }

    fn pay(number: u32) -> PayInstallment {
        PayInstallment {
            number,
            amount: None,
            method: PaymentMethod::Pix,
            notes: None,
            created_by: None,
        }
    }

    #[tokio::test]
    async fn interest_free_plan_of_twelve() {
        let harness = TestHarness::new();
        let service = harness.payment_plan_service();
        let invoice = seeded_invoice(&harness, dec!(1200));

        let plan = service
            .create_payment_plan(plan_request(invoice.id, 12))
            .await
            .unwrap();
        assert_eq!(plan.installment_amount, dec!(100.00));
        assert_eq!(plan.total_amount, dec!(1200.00));
        assert_eq!(plan.pending_installments, 12);
        assert_eq!(
            plan.installments[0].due_date,
            harness.now() + Duration::days(30)
        );

        let stored = harness.invoices.get(&invoice.id).unwrap();
        assert!(stored.has_payment_plan);
        assert_eq!(stored.payment_plan_id, Some(plan.id));
    }

    #[tokio::test]
    async fn down_payment_is_recorded_against_invoice() {
        let harness = TestHarness::new();
        let service = harness.payment_plan_service();
        let invoice = seeded_invoice(&harness, dec!(1000));

        let mut request = plan_request(invoice.id, 4);
        request.down_payment = Some(dec!(200));
        let plan = service.create_payment_plan(request).await.unwrap();

        assert_eq!(plan.financed_amount, dec!(800));
        assert_eq!(plan.installment_amount, dec!(200));
        assert_eq!(plan.total_amount, dec!(1000));
        let stored = harness.invoices.get(&invoice.id).unwrap();
        assert_eq!(stored.amount_paid, dec!(200));
        assert_eq!(stored.status, InvoiceStatus::PartiallyPaid);

        let payments = harness.payments.all();
        assert_eq!(payments.len(), 1);
        assert!(payments[0].is_manual);
    }

    #[tokio::test]
    async fn paid_invoice_cannot_be_financed() {
        let harness = TestHarness::new();
        let service = harness.payment_plan_service();
        let mut invoice = test_invoice(dec!(100));
        invoice.status = InvoiceStatus::Paid;
        invoice.amount_paid = dec!(100);
        invoice.amount_due = Decimal::ZERO;
        harness.invoices.insert(invoice.clone());

        let err = service
            .create_payment_plan(plan_request(invoice.id, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::InvalidState(_))));
    }

    #[tokio::test]
    async fn on_time_installments_complete_plan_and_invoice() {
        let harness = TestHarness::new();
        let service = harness.payment_plan_service();
        let invoice = seeded_invoice(&harness, dec!(300));
        let plan = service
            .create_payment_plan(plan_request(invoice.id, 3))
            .await
            .unwrap();

        for number in 1..=3 {
            let result = service.pay_installment(&plan.id, pay(number)).await.unwrap();
            assert_eq!(result.payment.amount, dec!(100));
            assert_eq!(result.payment.surcharge, Decimal::ZERO);
        }

        let plan = service.get_payment_plan(&plan.id).await.unwrap();
        assert_eq!(plan.status, PlanStatus::Completed);
        assert_eq!(plan.paid_installments, 3);
        assert_eq!(plan.total_paid, dec!(300));
        assert_eq!(harness.notifier.count("payment_plan.completed"), 1);

        let stored = harness.invoices.get(&invoice.id).unwrap();
        assert_eq!(stored.status, InvoiceStatus::Paid);
        assert_eq!(stored.amount_due, Decimal::ZERO);
    }

    #[tokio::test]
    async fn late_installment_accrues_fee_and_interest() {
        let harness = TestHarness::new();
        let service = harness.payment_plan_service();
        let invoice = seeded_invoice(&harness, dec!(200));
        let plan = service
            .create_payment_plan(plan_request(invoice.id, 2))
            .await
            .unwrap();

        let due = plan.installments[0].due_date;
        harness.clock.set(due + Duration::days(3));

        let quote = service.quote_installment(&plan.id, 1).await.unwrap();
        assert_eq!(quote.days_late, 3);
        assert_eq!(quote.late_fee, dec!(2.00));
        assert_eq!(quote.interest, dec!(0.10));
        assert_eq!(quote.total_due, dec!(102.10));

        let result = service.pay_installment(&plan.id, pay(1)).await.unwrap();
        assert_eq!(result.payment.amount, dec!(100));
        assert_eq!(result.payment.surcharge, dec!(2.10));
        assert_eq!(result.payment.gross_amount(), dec!(102.10));

        let paid = result.plan.installment(1).unwrap();
        assert_eq!(paid.status, InstallmentStatus::Paid);
        assert_eq!(paid.paid_amount, Some(dec!(102.10)));
        assert_eq!(paid.late_fee, Some(dec!(2.00)));
        assert_eq!(paid.interest, Some(dec!(0.10)));
        assert_eq!(paid.payment_id, Some(result.payment.id));

        // The invoice only ever sees the principal
        let stored = harness.invoices.get(&invoice.id).unwrap();
        assert_eq!(stored.amount_paid, dec!(100));
        assert_eq!(stored.amount_due, dec!(100));
    }

    #[tokio::test]
    async fn installment_cannot_be_paid_twice() {
        let harness = TestHarness::new();
        let service = harness.payment_plan_service();
        let invoice = seeded_invoice(&harness, dec!(200));
        let plan = service
            .create_payment_plan(plan_request(invoice.id, 2))
            .await
            .unwrap();

        service.pay_installment(&plan.id, pay(1)).await.unwrap();
        let err = service.pay_installment(&plan.id, pay(1)).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::InvalidState(_))));
        let err = service.pay_installment(&plan.id, pay(7)).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::NotFound(_))));
    }

    #[tokio::test]
    async fn amortized_plan_keeps_interest_off_invoice() {
        let harness = TestHarness::new();
        let service = harness.payment_plan_service();
        let invoice = seeded_invoice(&harness, dec!(1000));

        let mut request = plan_request(invoice.id, 12);
        request.monthly_interest_rate = Some(dec!(2));
        let plan = service.create_payment_plan(request).await.unwrap();
        assert_eq!(plan.installment_amount, dec!(94.56));
        assert_eq!(plan.total_amount, dec!(94.56) * dec!(12));

        let result = service.pay_installment(&plan.id, pay(1)).await.unwrap();
        assert_eq!(result.payment.amount, dec!(83.33));
        assert_eq!(result.payment.surcharge, dec!(11.23));
    }

    #[tokio::test]
    async fn cancelled_plan_clears_invoice_flag() {
        let harness = TestHarness::new();
        let service = harness.payment_plan_service();
        let invoice = seeded_invoice(&harness, dec!(300));
        let plan = service
            .create_payment_plan(plan_request(invoice.id, 3))
            .await
            .unwrap();

        let cancelled = service.cancel_payment_plan(&plan.id, None).await.unwrap();
        assert_eq!(cancelled.status, PlanStatus::Cancelled);
        let stored = harness.invoices.get(&invoice.id).unwrap();
        assert!(!stored.has_payment_plan);
        assert!(stored.payment_plan_id.is_none());

        let err = service.pay_installment(&plan.id, pay(1)).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::InvalidState(_))));
    }

    #[tokio::test]
    async fn installment_count_is_bounded() {
        let harness = TestHarness::new();
        let service = harness.payment_plan_service();
        let invoice = seeded_invoice(&harness, dec!(300));
        for count in [0, 121] {
            let err = service
                .create_payment_plan(plan_request(invoice.id, count))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Domain(DomainError::Validation(_))));
        }
    }

    #[tokio::test]
    async fn invoice_paid_outside_plan_completes_it() {
        let harness = TestHarness::new();
        let service = harness.payment_plan_service();
        let invoice = seeded_invoice(&harness, dec!(300));
        let plan = service
            .create_payment_plan(plan_request(invoice.id, 3))
            .await
            .unwrap();
        service.pay_installment(&plan.id, pay(1)).await.unwrap();

        harness
            .payment_service()
            .record_manual_payment(ManualPayment {
                invoice_id: invoice.id,
                amount: dec!(200),
                method: PaymentMethod::BankTransfer,
                paid_at: None,
                reference_number: Some("TED-1".to_string()),
                bank_name: None,
                receipt_url: None,
                notes: None,
                created_by: None,
            })
            .await
            .unwrap();

        assert_eq!(
            harness.invoices.get(&invoice.id).unwrap().status,
            InvoiceStatus::Paid
        );
        let plan = service.get_payment_plan(&plan.id).await.unwrap();
        assert_eq!(plan.status, PlanStatus::Completed);
        assert!(plan.completed_at.is_some());
        assert_eq!(harness.notifier.count("payment_plan.completed"), 1);

        let err = service.pay_installment(&plan.id, pay(2)).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::InvalidState(_))));
    }

    #[tokio::test]
    async fn failed_commit_leaves_no_plan_behind() {
        let harness = TestHarness::new();
        let service = harness.payment_plan_service();
        let invoice = seeded_invoice(&harness, dec!(1000));

        let mut request = plan_request(invoice.id, 4);
        request.down_payment = Some(dec!(200));
        harness.store.fail_next_commit();
        let err = service.create_payment_plan(request.clone()).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::Database(_))));

        let stored = harness.invoices.get(&invoice.id).unwrap();
        assert_eq!(stored.version, invoice.version);
        assert_eq!(stored.amount_paid, Decimal::ZERO);
        assert!(!stored.has_payment_plan);
        assert!(harness.payments.all().is_empty());
        assert_eq!(harness.notifier.count("payment_plan.created"), 0);
        assert_eq!(harness.store.commits(), 0);

        let plan = service.create_payment_plan(request).await.unwrap();
        assert_eq!(
            harness.invoices.get(&invoice.id).unwrap().payment_plan_id,
            Some(plan.id)
        );
        assert_eq!(harness.payments.all().len(), 1);
        assert_eq!(harness.store.commits(), 1);
    }

    #[tokio::test]
    async fn failed_installment_commit_keeps_installment_payable() {
        let harness = TestHarness::new();
        let service = harness.payment_plan_service();
        let invoice = seeded_invoice(&harness, dec!(300));
        let plan = service
            .create_payment_plan(plan_request(invoice.id, 3))
            .await
            .unwrap();

        harness.store.fail_next_commit();
        assert!(service.pay_installment(&plan.id, pay(1)).await.is_err());
        let stored = service.get_payment_plan(&plan.id).await.unwrap();
        assert_eq!(stored.paid_installments, 0);
        assert_eq!(stored.installments[0].status, InstallmentStatus::Pending);
        assert_eq!(harness.invoices.get(&invoice.id).unwrap().amount_paid, Decimal::ZERO);

        let result = service.pay_installment(&plan.id, pay(1)).await.unwrap();
        assert_eq!(result.plan.paid_installments, 1);
    }
}
