//! Financial reporting service
//!
//! Loads the rows a report needs and hands them to the pure aggregations in
//! `crate::reports`. Never writes.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::app::ServiceContext;
use crate::domain::entities::{
    ClaimFilter, ClaimStatus, ClinicId, InvoiceFilter, InvoiceStatus, PaymentFilter,
};
use crate::domain::ports::{InsuranceClaimRepository, InvoiceRepository, PaymentRepository};
use crate::error::AppError;
use crate::reports::{
    aging_report, billing_statistics, cash_flow_report, dashboard, project_inflows,
    revenue_report, AgingGroupBy, AgingReport, BillingStatistics, CashFlowReport, Dashboard,
    Granularity, ReportPeriod, RevenueReport,
};

/// Common report parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportQuery {
    #[serde(default)]
    pub clinic_id: Option<ClinicId>,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub granularity: Granularity,
}

/// Service for read-only financial reports
pub struct ReportService<IR, PR, CR>
where
    IR: InvoiceRepository,
    PR: PaymentRepository,
    CR: InsuranceClaimRepository,
{
    invoices: Arc<IR>,
    payments: Arc<PR>,
    claims: Arc<CR>,
    ctx: ServiceContext,
}

impl<IR, PR, CR> ReportService<IR, PR, CR>
where
    IR: InvoiceRepository,
    PR: PaymentRepository,
    CR: InsuranceClaimRepository,
{
    pub fn new(invoices: Arc<IR>, payments: Arc<PR>, claims: Arc<CR>, ctx: ServiceContext) -> Self {
        Self {
            invoices,
            payments,
            claims,
            ctx,
        }
    }

    fn period(&self, query: &ReportQuery) -> Result<ReportPeriod, AppError> {
        Ok(ReportPeriod::resolve(
            query.start,
            query.end,
            self.ctx.now(),
            self.ctx.config.default_report_days,
        )?)
    }

    fn payment_filter(clinic_id: Option<ClinicId>, period: &ReportPeriod) -> PaymentFilter {
        PaymentFilter {
            clinic_id,
            active_from: Some(period.start),
            active_to: Some(period.end),
            ..Default::default()
        }
    }

    pub async fn revenue(&self, query: &ReportQuery) -> Result<RevenueReport, AppError> {
        let period = self.period(query)?;
        let invoices = self
            .invoices
            .list(&InvoiceFilter {
                clinic_id: query.clinic_id,
                issued_from: Some(period.start),
                issued_to: Some(period.end),
                ..Default::default()
            })
            .await?;
        let payments = self
            .payments
            .list(&Self::payment_filter(query.clinic_id, &period))
            .await?;

        let report = revenue_report(&invoices, &payments, period, query.granularity);
        tracing::debug!(
            invoices = report.invoice_count,
            total = %report.total_invoiced,
            refunded = %report.total_refunded,
            "Built revenue report"
        );
        Ok(report)
    }

    /// Cash flow over the window; the projection starts where the window ends
    pub async fn cash_flow(
        &self,
        query: &ReportQuery,
        include_projection: bool,
    ) -> Result<CashFlowReport, AppError> {
        let period = self.period(query)?;
        let payments = self
            .payments
            .list(&Self::payment_filter(query.clinic_id, &period))
            .await?;

        let projection = if include_projection {
            let open = self
                .invoices
                .list(&InvoiceFilter {
                    clinic_id: query.clinic_id,
                    statuses: InvoiceStatus::OPEN.to_vec(),
                    ..Default::default()
                })
                .await?;
            Some(project_inflows(
                &open,
                period.end,
                self.ctx.config.projection_days,
            ))
        } else {
            None
        };

        let report = cash_flow_report(&payments, period, query.granularity, projection);
        tracing::debug!(
            inflow = %report.total_inflow,
            outflow = %report.total_outflow,
            projected = %report.projected_inflow,
            "Built cash flow report"
        );
        Ok(report)
    }

    pub async fn aging(
        &self,
        clinic_id: Option<ClinicId>,
        reference_date: Option<DateTime<Utc>>,
        group_by: Option<AgingGroupBy>,
    ) -> Result<AgingReport, AppError> {
        let open = self
            .invoices
            .list(&InvoiceFilter {
                clinic_id,
                statuses: InvoiceStatus::OPEN.to_vec(),
                ..Default::default()
            })
            .await?;
        let reference = reference_date.unwrap_or_else(|| self.ctx.now());
        Ok(aging_report(&open, reference, group_by))
    }

    pub async fn statistics(&self, query: &ReportQuery) -> Result<BillingStatistics, AppError> {
        let period = self.period(query)?;
        let invoices = self
            .invoices
            .list(&InvoiceFilter {
                clinic_id: query.clinic_id,
                issued_from: Some(period.start),
                issued_to: Some(period.end),
                ..Default::default()
            })
            .await?;
        let payments = self
            .payments
            .list(&Self::payment_filter(query.clinic_id, &period))
            .await?;
        let claims = self
            .claims
            .list(&ClaimFilter {
                clinic_id: query.clinic_id,
                ..Default::default()
            })
            .await?;
        Ok(billing_statistics(&invoices, &payments, &claims, period))
    }

    pub async fn dashboard(&self, clinic_id: Option<ClinicId>) -> Result<Dashboard, AppError> {
        let now = self.ctx.now();
        let invoices = self
            .invoices
            .list(&InvoiceFilter {
                clinic_id,
                ..Default::default()
            })
            .await?;
        let payments = self
            .payments
            .list(&PaymentFilter {
                clinic_id,
                active_from: Some(now - Duration::days(31)),
                active_to: Some(now),
                ..Default::default()
            })
            .await?;
        let claims = self
            .claims
            .list(&ClaimFilter {
                clinic_id,
                statuses: ClaimStatus::AWAITING_INSURER.to_vec(),
                ..Default::default()
            })
            .await?;
        Ok(dashboard(&invoices, &payments, &claims, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{
        InvoiceId, ManualPayment, NewPayment, PaymentMethod, RefundReason,
    };
    use crate::test_utils::{test_invoice, TestHarness};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn sent_invoice(harness: &TestHarness, total: Decimal, due_in_days: i64) -> InvoiceId {
        let mut invoice = test_invoice(total);
        invoice.status = InvoiceStatus::Sent;
        invoice.issue_date = harness.now() - Duration::days(2);
        invoice.due_date = harness.now() + Duration::days(due_in_days);
        harness.invoices.insert(invoice.clone());
        invoice.id
    }

    fn manual(invoice_id: InvoiceId, amount: Decimal) -> ManualPayment {
        ManualPayment {
            invoice_id,
            amount,
            method: PaymentMethod::Cash,
            paid_at: None,
            reference_number: None,
            bank_name: None,
            receipt_url: None,
            notes: None,
            created_by: None,
        }
    }

    #[tokio::test]
    async fn reports_follow_payments_and_refunds() {
        let harness = TestHarness::new();
        let payments = harness.payment_service();
        let reports = harness.report_service();

        let first = sent_invoice(&harness, dec!(300), 10);
        sent_invoice(&harness, dec!(200), -45);
        let paid = payments.record_manual_payment(manual(first, dec!(300))).await.unwrap();
        payments
            .refund_payment(&paid.id, Some(dec!(100)), RefundReason::BillingError, None)
            .await
            .unwrap();

        let query = ReportQuery::default();
        let revenue = reports.revenue(&query).await.unwrap();
        assert_eq!(revenue.total_invoiced, dec!(500));
        assert_eq!(revenue.total_refunded, dec!(100));

        let cash = reports.cash_flow(&query, true).await.unwrap();
        assert_eq!(cash.total_inflow, dec!(300));
        assert_eq!(cash.total_outflow, dec!(100));
        assert_eq!(cash.net_flow, dec!(200));
        // After the refund the first invoice owes 100 again, due in 10 days
        assert_eq!(cash.projected_inflow, dec!(100));

        let aging = reports.aging(None, None, None).await.unwrap();
        assert_eq!(aging.total_receivables, dec!(200));
        assert_eq!(aging.invoices[0].bucket, "31-60 dias");

        let stats = reports.statistics(&query).await.unwrap();
        assert_eq!(stats.invoices.count, 2);
        assert_eq!(stats.payments.total_refunded, dec!(100));
    }

    #[tokio::test]
    async fn pending_gateway_payments_are_not_cash() {
        let harness = TestHarness::new();
        let payments = harness.payment_service();
        let reports = harness.report_service();
        let invoice = sent_invoice(&harness, dec!(150), 5);

        payments
            .create_payment(NewPayment {
                invoice_id: invoice,
                amount: dec!(150),
                method: PaymentMethod::Pix,
                card: None,
                expiration_minutes: None,
                days_to_expire: None,
                notes: None,
                created_by: None,
            })
            .await
            .unwrap();

        let cash = reports.cash_flow(&ReportQuery::default(), false).await.unwrap();
        assert_eq!(cash.total_inflow, Decimal::ZERO);
        assert!(cash.projection.is_none());

        let summary = reports.dashboard(None).await.unwrap();
        assert_eq!(summary.outstanding_amount, dec!(150));
        assert_eq!(summary.received_this_month, Decimal::ZERO);
    }

    #[tokio::test]
    async fn inverted_window_is_rejected() {
        let harness = TestHarness::new();
        let query = ReportQuery {
            start: Some(harness.now()),
            end: Some(harness.now() - Duration::days(1)),
            ..Default::default()
        };
        assert!(harness.report_service().revenue(&query).await.is_err());
    }
}
