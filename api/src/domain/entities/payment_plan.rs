//! Payment plan domain entity
//!
//! Replaces a lump-sum balance with monthly installments. Installment amounts
//! follow the fixed-payment amortization formula when a monthly interest rate
//! is set; the invoice itself only ever receives the principal share of each
//! installment.

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};

use super::ids::{ClinicId, InvoiceId, PatientId, PaymentId, PaymentPlanId, UserId};
use super::money::round_money;
use super::payment::PaymentMethod;
use crate::error::DomainError;

/// Payment plan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    Active,
    Completed,
    Cancelled,
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanStatus::Active => write!(f, "ACTIVE"),
            PlanStatus::Completed => write!(f, "COMPLETED"),
            PlanStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl std::str::FromStr for PlanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Ok(PlanStatus::Active),
            "COMPLETED" => Ok(PlanStatus::Completed),
            "CANCELLED" => Ok(PlanStatus::Cancelled),
            _ => Err(format!("Unknown plan status: {}", s)),
        }
    }
}

/// Installment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstallmentStatus {
    Pending,
    Paid,
    Overdue,
}

/// One scheduled installment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    /// 1-based position in the schedule
    pub number: u32,
    /// Amount billed for this installment, financing interest included
    pub amount: Decimal,
    /// Share of the financed invoice balance inside `amount`
    pub principal: Decimal,
    pub due_date: DateTime<Utc>,
    pub status: InstallmentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub paid_amount: Option<Decimal>,
    pub late_fee: Option<Decimal>,
    pub interest: Option<Decimal>,
    pub payment_id: Option<PaymentId>,
}

impl Installment {
    /// Status as seen at `at`: unpaid installments past due read as OVERDUE
    pub fn effective_status(&self, at: DateTime<Utc>) -> InstallmentStatus {
        if self.status == InstallmentStatus::Pending && self.due_date < at {
            InstallmentStatus::Overdue
        } else {
            self.status
        }
    }
}

/// Late fee and interest owed on an installment paid after its due date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LateCharges {
    pub days_late: i64,
    pub late_fee: Decimal,
    pub interest: Decimal,
    pub total_due: Decimal,
}

impl LateCharges {
    /// Flat fee plus simple daily interest once `now` is past `due_date`
    pub fn accrue(
        amount: Decimal,
        due_date: DateTime<Utc>,
        now: DateTime<Utc>,
        late_fee_rate: Decimal,
        daily_interest_rate: Decimal,
    ) -> Self {
        if now <= due_date {
            return Self {
                days_late: 0,
                late_fee: Decimal::ZERO,
                interest: Decimal::ZERO,
                total_due: amount,
            };
        }

        const SECONDS_PER_DAY: i64 = 86_400;
        let seconds = (now - due_date).num_seconds();
        let days_late = (seconds + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY;
        let late_fee = round_money(amount * late_fee_rate);
        let interest = round_money(amount * Decimal::from(days_late) * daily_interest_rate);

        Self {
            days_late,
            late_fee,
            interest,
            total_due: amount + late_fee + interest,
        }
    }
}

/// Fixed installment for `financed` over `installments` months at `monthly_rate`
/// percent: `P * r(1+r)^n / ((1+r)^n - 1)`, or `P / n` without interest
pub fn amortized_installment(
    financed: Decimal,
    monthly_rate: Decimal,
    installments: u32,
) -> Decimal {
    if installments == 0 {
        return Decimal::ZERO;
    }
    let n = Decimal::from(installments);
    if monthly_rate <= Decimal::ZERO {
        return round_money(financed / n);
    }

    let r = monthly_rate / Decimal::ONE_HUNDRED;
    let growth = (Decimal::ONE + r).powu(u64::from(installments));
    round_money(financed * (r * growth) / (growth - Decimal::ONE))
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

/// Monthly due dates starting at `first_due`, optionally pinned to `due_day`
///
/// A `due_day` beyond the end of a short month lands on that month's last day.
pub fn schedule_due_dates(
    first_due: DateTime<Utc>,
    installments: u32,
    due_day: Option<u32>,
) -> Result<Vec<DateTime<Utc>>, DomainError> {
    let mut dates = Vec::with_capacity(installments as usize);
    for offset in 0..installments {
        let date = first_due
            .checked_add_months(Months::new(offset))
            .ok_or_else(|| DomainError::Validation("Installment date out of range".to_string()))?;
        let date = match due_day {
            Some(day) => {
                let day = day.min(last_day_of_month(date.year(), date.month()));
                date.with_day(day).ok_or_else(|| {
                    DomainError::Validation(format!("Invalid due day {}", day))
                })?
            }
            None => date,
        };
        dates.push(date);
    }
    Ok(dates)
}

/// Computed installment schedule
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub installment_amount: Decimal,
    pub installments: Vec<Installment>,
    /// Sum of every installment amount
    pub financed_total: Decimal,
}

/// Split `financed` into `count` installments
///
/// Without interest the last installment absorbs the rounding remainder so
/// the schedule sums to the financed amount exactly. Principal shares always
/// sum to `financed`.
pub fn build_schedule(
    financed: Decimal,
    monthly_rate: Decimal,
    count: u32,
    due_dates: &[DateTime<Utc>],
) -> Result<Schedule, DomainError> {
    if count == 0 || due_dates.len() != count as usize {
        return Err(DomainError::Validation(
            "Installment count must match the number of due dates".to_string(),
        ));
    }
    let n = Decimal::from(count);
    let principal_share = round_money(financed / n);
    if principal_share <= Decimal::ZERO {
        return Err(DomainError::Validation(format!(
            "Financed amount {} is too small for {} installments",
            financed, count
        )));
    }
    let last_principal = financed - principal_share * Decimal::from(count - 1);
    let installment_amount = amortized_installment(financed, monthly_rate, count);

    let installments: Vec<Installment> = due_dates
        .iter()
        .enumerate()
        .map(|(idx, due_date)| {
            let number = idx as u32 + 1;
            let is_last = number == count;
            let principal = if is_last {
                last_principal
            } else {
                principal_share
            };
            let amount = if monthly_rate > Decimal::ZERO {
                installment_amount
            } else {
                principal
            };
            Installment {
                number,
                amount,
                principal,
                due_date: *due_date,
                status: InstallmentStatus::Pending,
                paid_at: None,
                paid_amount: None,
                late_fee: None,
                interest: None,
                payment_id: None,
            }
        })
        .collect();

    let financed_total = installments.iter().map(|i| i.amount).sum();
    Ok(Schedule {
        installment_amount,
        installments,
        financed_total,
    })
}

/// Installment schedule replacing an invoice's lump-sum balance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentPlan {
    pub id: PaymentPlanId,
    pub invoice_id: InvoiceId,
    pub clinic_id: ClinicId,
    pub patient_id: PatientId,
    pub status: PlanStatus,
    pub installments_count: u32,
    pub installment_amount: Decimal,
    pub down_payment: Decimal,
    pub financed_amount: Decimal,
    /// Monthly rate in percent (2 = 2% a month)
    pub monthly_interest_rate: Decimal,
    pub total_amount: Decimal,
    pub paid_installments: u32,
    pub pending_installments: u32,
    pub total_paid: Decimal,
    pub total_pending: Decimal,
    pub first_due_date: DateTime<Utc>,
    pub due_day: Option<u32>,
    pub installments: Vec<Installment>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub version: i32,
}

impl PaymentPlan {
    pub fn installment(&self, number: u32) -> Option<&Installment> {
        self.installments.iter().find(|i| i.number == number)
    }

    /// Check that `number` can be paid right now
    pub fn payable_installment(&self, number: u32) -> Result<&Installment, DomainError> {
        if self.status != PlanStatus::Active {
            return Err(DomainError::InvalidState(format!(
                "Payment plan {} is {}",
                self.id, self.status
            )));
        }
        let installment = self.installment(number).ok_or_else(|| {
            DomainError::NotFound(format!(
                "Installment {} not found in payment plan {}",
                number, self.id
            ))
        })?;
        if installment.status == InstallmentStatus::Paid {
            return Err(DomainError::InvalidState(format!(
                "Installment {} of payment plan {} is already PAID",
                number, self.id
            )));
        }
        Ok(installment)
    }

    /// Mark an installment PAID and refresh the plan counters
    pub fn record_installment_payment(
        &mut self,
        number: u32,
        paid_amount: Decimal,
        charges: &LateCharges,
        payment_id: PaymentId,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.payable_installment(number)?;
        if let Some(installment) = self.installments.iter_mut().find(|i| i.number == number) {
            installment.status = InstallmentStatus::Paid;
            installment.paid_at = Some(at);
            installment.paid_amount = Some(paid_amount);
            installment.late_fee = Some(charges.late_fee);
            installment.interest = Some(charges.interest);
            installment.payment_id = Some(payment_id);
        }
        self.refresh_counters();
        if self.pending_installments == 0 {
            self.status = PlanStatus::Completed;
            self.completed_at = Some(at);
        }
        self.updated_at = at;
        Ok(())
    }

    /// ACTIVE -> CANCELLED
    pub fn cancel(&mut self, at: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != PlanStatus::Active {
            return Err(DomainError::InvalidState(format!(
                "Payment plan {} is {} and cannot be cancelled",
                self.id, self.status
            )));
        }
        self.status = PlanStatus::Cancelled;
        self.cancelled_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// ACTIVE -> COMPLETED once the invoice is settled in full
    ///
    /// Installments still pending stay on record as PENDING; there is no
    /// balance left for them to settle.
    pub fn complete_settled(&mut self, at: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != PlanStatus::Active {
            return Err(DomainError::InvalidState(format!(
                "Payment plan {} is {} and cannot be completed",
                self.id, self.status
            )));
        }
        self.status = PlanStatus::Completed;
        self.completed_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    fn refresh_counters(&mut self) {
        let (paid, pending): (Vec<&Installment>, Vec<&Installment>) = self
            .installments
            .iter()
            .partition(|i| i.status == InstallmentStatus::Paid);
        self.paid_installments = paid.len() as u32;
        self.pending_installments = pending.len() as u32;
        self.total_paid = paid.iter().filter_map(|i| i.paid_amount).sum();
        self.total_pending = pending.iter().map(|i| i.amount).sum();
    }

    /// Build a fresh ACTIVE plan from a computed schedule
    pub fn from_schedule(terms: &PlanTerms, schedule: Schedule, at: DateTime<Utc>) -> Self {
        let total_pending = schedule.financed_total;
        Self {
            id: PaymentPlanId::new(),
            invoice_id: terms.invoice_id,
            clinic_id: terms.clinic_id,
            patient_id: terms.patient_id,
            status: PlanStatus::Active,
            installments_count: schedule.installments.len() as u32,
            installment_amount: schedule.installment_amount,
            down_payment: terms.down_payment,
            financed_amount: terms.financed_amount,
            monthly_interest_rate: terms.monthly_interest_rate,
            total_amount: schedule.financed_total + terms.down_payment,
            paid_installments: 0,
            pending_installments: schedule.installments.len() as u32,
            total_paid: Decimal::ZERO,
            total_pending,
            first_due_date: terms.first_due_date,
            due_day: terms.due_day,
            installments: schedule.installments,
            created_by: terms.created_by,
            created_at: at,
            updated_at: at,
            completed_at: None,
            cancelled_at: None,
            version: 0,
        }
    }
}

/// Resolved inputs of a plan, after defaults are applied
#[derive(Debug, Clone)]
pub struct PlanTerms {
    pub invoice_id: InvoiceId,
    pub clinic_id: ClinicId,
    pub patient_id: PatientId,
    pub down_payment: Decimal,
    pub financed_amount: Decimal,
    pub monthly_interest_rate: Decimal,
    pub first_due_date: DateTime<Utc>,
    pub due_day: Option<u32>,
    pub created_by: Option<UserId>,
}

/// Data needed to create a payment plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPaymentPlan {
    pub invoice_id: InvoiceId,
    pub installments: u32,
    #[serde(default)]
    pub down_payment: Option<Decimal>,
    /// Rail used to record the down payment (defaults to cash)
    #[serde(default)]
    pub down_payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub monthly_interest_rate: Option<Decimal>,
    #[serde(default)]
    pub first_due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub due_day: Option<u32>,
    #[serde(default)]
    pub created_by: Option<UserId>,
}
