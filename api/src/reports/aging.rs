//! Receivables aging
//!
//! Open invoices past their due date are bucketed by days overdue.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entities::{percentage, Invoice};

/// Inclusive day ranges; the last one is open-ended
const AGING_RANGES: [(i64, Option<i64>, &str); 5] = [
    (1, Some(30), "1-30 dias"),
    (31, Some(60), "31-60 dias"),
    (61, Some(90), "61-90 dias"),
    (91, Some(120), "91-120 dias"),
    (121, None, "120+ dias"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgingBucket {
    pub label: String,
    pub min_days: i64,
    pub max_days: Option<i64>,
    pub amount: Decimal,
    pub count: u32,
    /// Share of the overdue receivables
    pub percentage: Decimal,
}

/// Optional secondary grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgingGroupBy {
    Patient,
    Insurer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgingGroup {
    /// Patient or insurer id; `None` gathers invoices without an insurer
    pub key: Option<Uuid>,
    pub amount: Decimal,
    pub count: u32,
    pub percentage: Decimal,
    pub oldest_days: i64,
}

/// One overdue invoice as seen by the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverdueInvoice {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub amount_due: Decimal,
    pub days_overdue: i64,
    pub bucket: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgingReport {
    pub reference_date: DateTime<Utc>,
    /// Overdue receivables, the base of every percentage
    pub total_receivables: Decimal,
    /// Open balances not yet due
    pub current_amount: Decimal,
    pub invoice_count: u32,
    pub buckets: Vec<AgingBucket>,
    pub group_by: Option<AgingGroupBy>,
    pub groups: Vec<AgingGroup>,
    pub invoices: Vec<OverdueInvoice>,
}

/// Days between `due` and `reference`, rounded up, at least one
pub fn days_overdue(due: DateTime<Utc>, reference: DateTime<Utc>) -> i64 {
    let seconds = (reference - due).num_seconds();
    let days = seconds / 86_400 + i64::from(seconds % 86_400 > 0);
    days.max(1)
}

fn bucket_index(days: i64) -> usize {
    AGING_RANGES
        .iter()
        .position(|(_, max, _)| max.map_or(true, |max| days <= max))
        .unwrap_or(AGING_RANGES.len() - 1)
}

pub fn aging_report(
    invoices: &[Invoice],
    reference_date: DateTime<Utc>,
    group_by: Option<AgingGroupBy>,
) -> AgingReport {
    let mut buckets: Vec<AgingBucket> = AGING_RANGES
        .iter()
        .map(|(min, max, label)| AgingBucket {
            label: label.to_string(),
            min_days: *min,
            max_days: *max,
            amount: Decimal::ZERO,
            count: 0,
            percentage: Decimal::ZERO,
        })
        .collect();
    let mut groups: HashMap<Option<Uuid>, AgingGroup> = HashMap::new();
    let mut overdue = Vec::new();
    let mut current_amount = Decimal::ZERO;

    for invoice in invoices
        .iter()
        .filter(|i| !i.is_deleted() && i.status.is_open() && i.amount_due > Decimal::ZERO)
    {
        if invoice.due_date >= reference_date {
            current_amount += invoice.amount_due;
            continue;
        }
        let days = days_overdue(invoice.due_date, reference_date);
        let index = bucket_index(days);
        let bucket = &mut buckets[index];
        bucket.amount += invoice.amount_due;
        bucket.count += 1;

        if let Some(group_by) = group_by {
            let key = match group_by {
                AgingGroupBy::Patient => Some(invoice.patient_id.0),
                AgingGroupBy::Insurer => invoice.insurer_id.map(|id| id.0),
            };
            let group = groups.entry(key).or_insert(AgingGroup {
                key,
                amount: Decimal::ZERO,
                count: 0,
                percentage: Decimal::ZERO,
                oldest_days: 0,
            });
            group.amount += invoice.amount_due;
            group.count += 1;
            group.oldest_days = group.oldest_days.max(days);
        }

        overdue.push(OverdueInvoice {
            invoice_id: invoice.id.0,
            invoice_number: invoice.invoice_number.clone(),
            amount_due: invoice.amount_due,
            days_overdue: days,
            bucket: AGING_RANGES[index].2.to_string(),
        });
    }

    let total_receivables: Decimal = buckets.iter().map(|b| b.amount).sum();
    for bucket in &mut buckets {
        bucket.percentage = percentage(bucket.amount, total_receivables);
    }
    let mut groups: Vec<AgingGroup> = groups
        .into_values()
        .map(|mut group| {
            group.percentage = percentage(group.amount, total_receivables);
            group
        })
        .collect();
    groups.sort_by(|a, b| b.amount.cmp(&a.amount));
    overdue.sort_by(|a, b| b.days_overdue.cmp(&a.days_overdue));

    AgingReport {
        reference_date,
        total_receivables,
        current_amount,
        invoice_count: overdue.len() as u32,
        buckets,
        group_by,
        groups,
        invoices: overdue,
    }
}
