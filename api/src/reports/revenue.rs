//! Revenue report
//!
//! Billed amounts come from non-cancelled invoices issued inside the window.
//! Each refund is counted when it happened, not when the invoice was issued,
//! so two partial refunds of one payment can land in different periods.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::period::{Granularity, ReportPeriod};
use crate::domain::entities::{ratio, round_money, Invoice, InvoiceStatus, Payment};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RevenueBucket {
    pub label: String,
    pub start: NaiveDate,
    pub invoiced: Decimal,
    pub received: Decimal,
    pub discounts: Decimal,
    pub refunded: Decimal,
    pub net: Decimal,
    pub invoice_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueReport {
    pub period: ReportPeriod,
    pub granularity: Granularity,
    pub total_invoiced: Decimal,
    pub total_received: Decimal,
    pub total_discounts: Decimal,
    pub total_refunded: Decimal,
    /// Received minus refunded
    pub net_revenue: Decimal,
    pub invoice_count: u32,
    pub patient_count: u32,
    pub average_per_day: Decimal,
    pub average_per_invoice: Decimal,
    pub average_per_patient: Decimal,
    pub buckets: Vec<RevenueBucket>,
}

fn counts_as_revenue(invoice: &Invoice) -> bool {
    !invoice.is_deleted() && invoice.status != InvoiceStatus::Cancelled
}

fn bucket(
    buckets: &mut BTreeMap<NaiveDate, RevenueBucket>,
    granularity: Granularity,
    start: NaiveDate,
) -> &mut RevenueBucket {
    buckets.entry(start).or_insert_with(|| RevenueBucket {
        label: granularity.label(start),
        start,
        ..Default::default()
    })
}

pub fn revenue_report(
    invoices: &[Invoice],
    payments: &[Payment],
    period: ReportPeriod,
    granularity: Granularity,
) -> RevenueReport {
    let mut buckets: BTreeMap<NaiveDate, RevenueBucket> = BTreeMap::new();

    let mut patients = HashSet::new();
    let mut invoice_count = 0u32;
    for invoice in invoices
        .iter()
        .filter(|i| counts_as_revenue(i) && period.contains(i.issue_date))
    {
        let entry = bucket(
            &mut buckets,
            granularity,
            granularity.bucket_start(invoice.issue_date),
        );
        entry.invoiced += invoice.total;
        entry.received += invoice.amount_paid;
        entry.discounts += invoice.discount_total;
        entry.invoice_count += 1;
        invoice_count += 1;
        patients.insert(invoice.patient_id);
    }

    for refund in payments
        .iter()
        .flat_map(|p| p.refunds.iter())
        .filter(|r| period.contains(r.refunded_at))
    {
        bucket(&mut buckets, granularity, granularity.bucket_start(refund.refunded_at))
            .refunded += refund.amount;
    }

    let mut buckets: Vec<RevenueBucket> = buckets.into_values().collect();
    for entry in &mut buckets {
        entry.net = entry.received - entry.refunded;
    }

    let total_invoiced: Decimal = buckets.iter().map(|b| b.invoiced).sum();
    let total_received: Decimal = buckets.iter().map(|b| b.received).sum();
    let total_discounts: Decimal = buckets.iter().map(|b| b.discounts).sum();
    let total_refunded: Decimal = buckets.iter().map(|b| b.refunded).sum();
    let patient_count = patients.len() as u32;

    RevenueReport {
        period,
        granularity,
        total_invoiced,
        total_received,
        total_discounts,
        total_refunded,
        net_revenue: total_received - total_refunded,
        invoice_count,
        patient_count,
        average_per_day: round_money(ratio(total_invoiced, Decimal::from(period.days()))),
        average_per_invoice: round_money(ratio(total_invoiced, Decimal::from(invoice_count))),
        average_per_patient: round_money(ratio(total_invoiced, Decimal::from(patient_count))),
        buckets,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{InvoiceId, PaymentStatus, RefundReason};
    use crate::test_utils::{fixed_now, test_invoice, test_payment};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn issued(total: Decimal, paid: Decimal, days_ago: i64) -> Invoice {
        let mut invoice = test_invoice(total);
        invoice.status = if paid.is_zero() {
            InvoiceStatus::Sent
        } else {
            InvoiceStatus::PartiallyPaid
        };
        invoice.amount_paid = paid;
        invoice.amount_due = total - paid;
        invoice.issue_date = fixed_now() - Duration::days(days_ago);
        invoice
    }

    fn window() -> ReportPeriod {
        ReportPeriod::resolve(None, None, fixed_now(), 30).unwrap()
    }

    #[test]
    fn sums_non_cancelled_invoices_in_window() {
        let mut cancelled = issued(dec!(999), Decimal::ZERO, 2);
        cancelled.status = InvoiceStatus::Cancelled;
        let invoices = vec![
            issued(dec!(200), dec!(200), 1),
            issued(dec!(100), dec!(40), 3),
            issued(dec!(500), Decimal::ZERO, 45),
            cancelled,
        ];

        let report = revenue_report(&invoices, &[], window(), Granularity::Day);
        assert_eq!(report.total_invoiced, dec!(300));
        assert_eq!(report.total_received, dec!(240));
        assert_eq!(report.invoice_count, 2);
        assert_eq!(report.patient_count, 2);
        assert_eq!(report.average_per_invoice, dec!(150));
        assert_eq!(report.average_per_day, dec!(10));
        assert_eq!(report.buckets.len(), 2);
        assert!(report.buckets[0].start < report.buckets[1].start);
    }

    fn refunded(payment: &mut Payment, amount: Decimal, days_ago: i64) {
        payment
            .register_refund(
                amount,
                RefundReason::BillingError,
                None,
                fixed_now() - Duration::days(days_ago),
            )
            .unwrap();
    }

    #[test]
    fn refunds_reduce_net_revenue_when_they_happen() {
        let invoices = vec![issued(dec!(300), dec!(300), 5)];
        let mut recent = test_payment(InvoiceId::new(), dec!(300));
        recent.status = PaymentStatus::Completed;
        refunded(&mut recent, dec!(50), 1);
        let mut old = recent.clone();
        old.refunds[0].refunded_at = fixed_now() - Duration::days(60);

        let report = revenue_report(&invoices, &[recent, old], window(), Granularity::Month);
        assert_eq!(report.total_refunded, dec!(50));
        assert_eq!(report.net_revenue, dec!(250));
    }

    #[test]
    fn each_refund_is_booked_in_its_own_period() {
        let mut payment = test_payment(InvoiceId::new(), dec!(300));
        payment.status = PaymentStatus::Completed;
        refunded(&mut payment, dec!(100), 50);
        refunded(&mut payment, dec!(20), 2);
        assert_eq!(payment.refunded_amount, dec!(120));

        let report = revenue_report(&[], &[payment.clone()], window(), Granularity::Day);
        assert_eq!(report.total_refunded, dec!(20));

        let earlier = ReportPeriod::resolve(
            Some(fixed_now() - Duration::days(60)),
            Some(fixed_now() - Duration::days(31)),
            fixed_now(),
            30,
        )
        .unwrap();
        let report = revenue_report(&[], &[payment], earlier, Granularity::Month);
        assert_eq!(report.total_refunded, dec!(100));
    }

    #[test]
    fn empty_window_has_zero_averages() {
        let report = revenue_report(&[], &[], window(), Granularity::Week);
        assert_eq!(report.invoice_count, 0);
        assert_eq!(report.average_per_invoice, Decimal::ZERO);
        assert_eq!(report.average_per_patient, Decimal::ZERO);
        assert!(report.buckets.is_empty());
    }
}
