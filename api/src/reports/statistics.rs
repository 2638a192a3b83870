//! Billing statistics and the dashboard summary

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::period::ReportPeriod;
use crate::domain::entities::{
    percentage, ClaimStatus, InsuranceClaim, Invoice, InvoiceStatus, Payment, PaymentStatus,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Breakdown {
    pub count: u32,
    pub amount: Decimal,
}

impl Breakdown {
    fn add(&mut self, amount: Decimal) {
        self.count += 1;
        self.amount += amount;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceStatistics {
    pub count: u32,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub outstanding_amount: Decimal,
    pub by_status: BTreeMap<String, Breakdown>,
    /// Paid over billed, in percent
    pub collection_rate: Decimal,
    /// Invoices sent to the patient, in percent
    pub delivery_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentStatistics {
    pub count: u32,
    pub completed_count: u32,
    pub failed_count: u32,
    pub total_received: Decimal,
    pub total_refunded: Decimal,
    pub by_method: BTreeMap<String, Breakdown>,
    /// Captured over attempted, in percent
    pub success_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimStatistics {
    pub count: u32,
    pub total_claimed: Decimal,
    pub total_approved: Decimal,
    pub total_paid: Decimal,
    pub by_status: BTreeMap<String, Breakdown>,
    /// Approved or paid over reviewed, in percent
    pub approval_rate: Decimal,
    pub denial_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingStatistics {
    pub period: ReportPeriod,
    pub invoices: InvoiceStatistics,
    pub payments: PaymentStatistics,
    pub claims: ClaimStatistics,
}

fn invoice_statistics(invoices: &[&Invoice]) -> InvoiceStatistics {
    let mut by_status: BTreeMap<String, Breakdown> = BTreeMap::new();
    let mut billed = Decimal::ZERO;
    let mut paid = Decimal::ZERO;
    let mut outstanding = Decimal::ZERO;
    let mut sent = 0u32;
    for invoice in invoices {
        by_status
            .entry(invoice.status.to_string())
            .or_default()
            .add(invoice.total);
        if invoice.sent_at.is_some() {
            sent += 1;
        }
        if invoice.status == InvoiceStatus::Cancelled {
            continue;
        }
        billed += invoice.total;
        paid += invoice.amount_paid;
        if invoice.status.is_open() {
            outstanding += invoice.amount_due;
        }
    }
    let count = invoices.len() as u32;
    InvoiceStatistics {
        count,
        total_amount: billed,
        paid_amount: paid,
        outstanding_amount: outstanding,
        by_status,
        collection_rate: percentage(paid, billed),
        delivery_rate: percentage(Decimal::from(sent), Decimal::from(count)),
    }
}

fn payment_statistics(payments: &[&Payment]) -> PaymentStatistics {
    let mut by_method: BTreeMap<String, Breakdown> = BTreeMap::new();
    let mut completed = 0u32;
    let mut failed = 0u32;
    let mut received = Decimal::ZERO;
    let mut refunded = Decimal::ZERO;
    for payment in payments {
        if payment.status.was_completed() {
            completed += 1;
            received += payment.gross_amount();
            by_method
                .entry(payment.method.to_string())
                .or_default()
                .add(payment.gross_amount());
        }
        if payment.status == PaymentStatus::Failed {
            failed += 1;
        }
        refunded += payment.refunded_amount;
    }
    PaymentStatistics {
        count: payments.len() as u32,
        completed_count: completed,
        failed_count: failed,
        total_received: received,
        total_refunded: refunded,
        by_method,
        success_rate: percentage(
            Decimal::from(completed),
            Decimal::from(completed + failed),
        ),
    }
}

fn claim_statistics(claims: &[&InsuranceClaim]) -> ClaimStatistics {
    let mut by_status: BTreeMap<String, Breakdown> = BTreeMap::new();
    let mut claimed = Decimal::ZERO;
    let mut approved = Decimal::ZERO;
    let mut paid = Decimal::ZERO;
    let mut reviewed = 0u32;
    let mut accepted = 0u32;
    let mut denied = 0u32;
    for claim in claims {
        by_status
            .entry(claim.status.to_string())
            .or_default()
            .add(claim.total_amount);
        claimed += claim.total_amount;
        approved += claim.approved_amount.unwrap_or_default();
        paid += claim.paid_amount.unwrap_or_default();
        if claim.status.is_reviewed() {
            reviewed += 1;
        }
        match claim.status {
            ClaimStatus::Approved | ClaimStatus::Paid => accepted += 1,
            ClaimStatus::Denied => denied += 1,
            _ => {}
        }
    }
    ClaimStatistics {
        count: claims.len() as u32,
        total_claimed: claimed,
        total_approved: approved,
        total_paid: paid,
        by_status,
        approval_rate: percentage(Decimal::from(accepted), Decimal::from(reviewed)),
        denial_rate: percentage(Decimal::from(denied), Decimal::from(reviewed)),
    }
}

/// Counts and sums of everything created inside the window
pub fn billing_statistics(
    invoices: &[Invoice],
    payments: &[Payment],
    claims: &[InsuranceClaim],
    period: ReportPeriod,
) -> BillingStatistics {
    let invoices: Vec<&Invoice> = invoices
        .iter()
        .filter(|i| !i.is_deleted() && period.contains(i.issue_date))
        .collect();
    let payments: Vec<&Payment> = payments
        .iter()
        .filter(|p| period.contains(p.created_at))
        .collect();
    let claims: Vec<&InsuranceClaim> = claims
        .iter()
        .filter(|c| period.contains(c.created_at))
        .collect();
    BillingStatistics {
        period,
        invoices: invoice_statistics(&invoices),
        payments: payment_statistics(&payments),
        claims: claim_statistics(&claims),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub generated_at: DateTime<Utc>,
    /// Billed month to date
    pub revenue_this_month: Decimal,
    pub revenue_last_month: Decimal,
    /// Month-over-month change in percent
    pub revenue_growth: Decimal,
    /// Collected month to date
    pub received_this_month: Decimal,
    pub outstanding_amount: Decimal,
    pub outstanding_count: u32,
    pub overdue_amount: Decimal,
    pub overdue_count: u32,
    pub pending_claims_count: u32,
    pub pending_claims_amount: Decimal,
}

fn month_start(date: NaiveDate) -> DateTime<Utc> {
    let first = date.with_day(1).unwrap_or(date);
    Utc.from_utc_datetime(&first.and_hms_opt(0, 0, 0).unwrap_or_default())
}

/// Month-to-date figures against the previous month
pub fn dashboard(
    invoices: &[Invoice],
    payments: &[Payment],
    claims: &[InsuranceClaim],
    now: DateTime<Utc>,
) -> Dashboard {
    let this_month = month_start(now.date_naive());
    let last_month = month_start((this_month - chrono::Duration::days(1)).date_naive());

    let billed = |from: DateTime<Utc>, until: DateTime<Utc>| -> Decimal {
        invoices
            .iter()
            .filter(|i| {
                !i.is_deleted()
                    && i.status != InvoiceStatus::Cancelled
                    && i.issue_date >= from
                    && i.issue_date < until
            })
            .map(|i| i.total)
            .sum()
    };
    let revenue_this_month = billed(this_month, now);
    let revenue_last_month = billed(last_month, this_month);

    let received_this_month = payments
        .iter()
        .filter(|p| p.status.was_completed())
        .filter(|p| p.paid_at.is_some_and(|at| at >= this_month && at <= now))
        .map(|p| p.gross_amount())
        .sum();

    let mut outstanding = Breakdown::default();
    let mut overdue = Breakdown::default();
    for invoice in invoices.iter().filter(|i| !i.is_deleted() && i.status.is_open()) {
        outstanding.add(invoice.amount_due);
        if invoice.effective_status(now) == InvoiceStatus::Overdue {
            overdue.add(invoice.amount_due);
        }
    }

    let mut pending_claims = Breakdown::default();
    for claim in claims
        .iter()
        .filter(|c| ClaimStatus::AWAITING_INSURER.contains(&c.status))
    {
        pending_claims.add(claim.total_amount);
    }

    Dashboard {
        generated_at: now,
        revenue_this_month,
        revenue_last_month,
        revenue_growth: percentage(revenue_this_month - revenue_last_month, revenue_last_month),
        received_this_month,
        outstanding_amount: outstanding.amount,
        outstanding_count: outstanding.count,
        overdue_amount: overdue.amount,
        overdue_count: overdue.count,
        pending_claims_count: pending_claims.count,
        pending_claims_amount: pending_claims.amount,
    }
}
