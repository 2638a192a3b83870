//! Cash flow report and forward projection

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::period::{Granularity, ReportPeriod};
use crate::domain::entities::{Invoice, Payment};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CashFlowBucket {
    pub label: String,
    pub start: NaiveDate,
    pub inflow: Decimal,
    pub outflow: Decimal,
    pub net: Decimal,
    /// Running balance from the start of the window
    pub balance: Decimal,
}

/// Money expected on one due date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedInflow {
    pub date: NaiveDate,
    pub expected: Decimal,
    pub invoice_count: u32,
    pub cumulative: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlowReport {
    pub period: ReportPeriod,
    pub granularity: Granularity,
    pub total_inflow: Decimal,
    pub total_outflow: Decimal,
    pub net_flow: Decimal,
    pub buckets: Vec<CashFlowBucket>,
    /// Present only when requested
    pub projection: Option<Vec<ProjectedInflow>>,
    pub projected_inflow: Decimal,
}

fn bucket(
    buckets: &mut BTreeMap<NaiveDate, CashFlowBucket>,
    granularity: Granularity,
    start: NaiveDate,
) -> &mut CashFlowBucket {
    buckets.entry(start).or_insert_with(|| CashFlowBucket {
        label: granularity.label(start),
        start,
        ..Default::default()
    })
}

/// Completed payments flow in on `paid_at`; each refund flows out on its own date
pub fn cash_flow_report(
    payments: &[Payment],
    period: ReportPeriod,
    granularity: Granularity,
    projection: Option<Vec<ProjectedInflow>>,
) -> CashFlowReport {
    let mut buckets: BTreeMap<NaiveDate, CashFlowBucket> = BTreeMap::new();

    for payment in payments {
        if payment.status.was_completed() {
            if let Some(paid_at) = payment.paid_at.filter(|at| period.contains(*at)) {
                bucket(&mut buckets, granularity, granularity.bucket_start(paid_at)).inflow +=
                    payment.gross_amount();
            }
        }
        for refund in payment.refunds.iter().filter(|r| period.contains(r.refunded_at)) {
            bucket(&mut buckets, granularity, granularity.bucket_start(refund.refunded_at))
                .outflow += refund.amount;
        }
    }

    let mut balance = Decimal::ZERO;
    let buckets: Vec<CashFlowBucket> = buckets
        .into_values()
        .map(|mut entry| {
            entry.net = entry.inflow - entry.outflow;
            balance += entry.net;
            entry.balance = balance;
            entry
        })
        .collect();

    let total_inflow: Decimal = buckets.iter().map(|b| b.inflow).sum();
    let total_outflow: Decimal = buckets.iter().map(|b| b.outflow).sum();
    let projected_inflow = projection
        .as_ref()
        .and_then(|points| points.last())
        .map_or(Decimal::ZERO, |point| point.cumulative);

    CashFlowReport {
        period,
        granularity,
        total_inflow,
        total_outflow,
        net_flow: total_inflow - total_outflow,
        buckets,
        projection,
        projected_inflow,
    }
}

/// Open balances grouped by due date over `[from, from + days]`
///
/// Assumes every open invoice is collected in full on its due date.
pub fn project_inflows(invoices: &[Invoice], from: DateTime<Utc>, days: i64) -> Vec<ProjectedInflow> {
    let until = from + Duration::days(days);
    let mut by_date: BTreeMap<NaiveDate, (Decimal, u32)> = BTreeMap::new();
    for invoice in invoices.iter().filter(|i| {
        !i.is_deleted()
            && i.status.is_open()
            && i.amount_due > Decimal::ZERO
            && i.due_date >= from
            && i.due_date <= until
    }) {
        let entry = by_date.entry(invoice.due_date.date_naive()).or_default();
        entry.0 += invoice.amount_due;
        entry.1 += 1;
    }

    let mut cumulative = Decimal::ZERO;
    by_date
        .into_iter()
        .map(|(date, (expected, invoice_count))| {
            cumulative += expected;
            ProjectedInflow {
                date,
                expected,
                invoice_count,
                cumulative,
            }
        })
        .collect()
}
