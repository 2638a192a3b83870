//! Insurance claim and batch entities
//!
//! A claim asks an insurer to settle one invoice. Claims move
//! DRAFT -> SUBMITTED -> APPROVED -> PAID, or SUBMITTED -> DENIED -> APPEALED
//! and back to a review outcome. Batches group claims for one insurer and
//! competence month.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{BatchId, ClaimId, ClinicId, InsurerId, InvoiceId, PatientId, UserId};
use crate::error::DomainError;

/// Claim status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    Draft,
    Submitted,
    Approved,
    Denied,
    Appealed,
    Paid,
}

impl ClaimStatus {
    /// Statuses still waiting on the insurer
    pub const AWAITING_INSURER: [ClaimStatus; 2] = [ClaimStatus::Submitted, ClaimStatus::Appealed];

    /// Statuses that carry a review decision
    pub fn is_reviewed(&self) -> bool {
        matches!(
            self,
            ClaimStatus::Approved | ClaimStatus::Denied | ClaimStatus::Paid
        )
    }
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimStatus::Draft => write!(f, "DRAFT"),
            ClaimStatus::Submitted => write!(f, "SUBMITTED"),
            ClaimStatus::Approved => write!(f, "APPROVED"),
            ClaimStatus::Denied => write!(f, "DENIED"),
            ClaimStatus::Appealed => write!(f, "APPEALED"),
            ClaimStatus::Paid => write!(f, "PAID"),
        }
    }
}

impl std::str::FromStr for ClaimStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DRAFT" => Ok(ClaimStatus::Draft),
            "SUBMITTED" => Ok(ClaimStatus::Submitted),
            "APPROVED" => Ok(ClaimStatus::Approved),
            "DENIED" => Ok(ClaimStatus::Denied),
            "APPEALED" => Ok(ClaimStatus::Appealed),
            "PAID" => Ok(ClaimStatus::Paid),
            _ => Err(format!("Unknown claim status: {}", s)),
        }
    }
}

/// Claim for insurer settlement of one invoice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsuranceClaim {
    pub id: ClaimId,
    /// Format `CLM-<year>-<seq>`
    pub claim_number: String,
    pub clinic_id: ClinicId,
    pub invoice_id: InvoiceId,
    pub insurer_id: InsurerId,
    pub patient_id: PatientId,
    pub batch_id: Option<BatchId>,
    pub status: ClaimStatus,
    pub total_amount: Decimal,
    pub approved_amount: Option<Decimal>,
    pub paid_amount: Option<Decimal>,
    pub denial_reason: Option<String>,
    pub appeal_justification: Option<String>,
    pub appeal_evidence: Vec<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub appealed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

/// Effect of a review update on the linked invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewEffect {
    None,
    /// Claim was denied
    Denied,
    /// Claim became PAID; credit this amount to the invoice
    Credit(Decimal),
}

impl InsuranceClaim {
    /// DRAFT -> SUBMITTED
    pub fn submit(&mut self, at: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != ClaimStatus::Draft {
            return Err(DomainError::InvalidState(format!(
                "Claim {} is {}; only DRAFT claims can be submitted",
                self.claim_number, self.status
            )));
        }
        self.status = ClaimStatus::Submitted;
        self.submitted_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// DENIED -> APPEALED
    pub fn appeal(
        &mut self,
        justification: String,
        evidence: Vec<String>,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.status != ClaimStatus::Denied {
            return Err(DomainError::InvalidState(format!(
                "Claim {} is {}; only DENIED claims can be appealed",
                self.claim_number, self.status
            )));
        }
        if justification.trim().is_empty() {
            return Err(DomainError::Validation(
                "Appeal justification is required".to_string(),
            ));
        }
        self.status = ClaimStatus::Appealed;
        self.appeal_justification = Some(justification);
        self.appeal_evidence = evidence;
        self.appealed_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// Record an insurer review outcome
    pub fn apply_review(
        &mut self,
        update: &ClaimUpdate,
        at: DateTime<Utc>,
    ) -> Result<ReviewEffect, DomainError> {
        if self.status == ClaimStatus::Paid {
            return Err(DomainError::InvalidState(format!(
                "Claim {} is already PAID",
                self.claim_number
            )));
        }
        if let Some(status) = update.status {
            if matches!(
                status,
                ClaimStatus::Draft | ClaimStatus::Submitted | ClaimStatus::Appealed
            ) {
                return Err(DomainError::InvalidState(format!(
                    "Claim {} cannot be moved to {} by a review",
                    self.claim_number, status
                )));
            }
        }
        for (label, amount) in [
            ("Approved", update.approved_amount),
            ("Paid", update.paid_amount),
        ] {
            if let Some(amount) = amount {
                if amount < Decimal::ZERO {
                    return Err(DomainError::Validation(format!(
                        "{} amount cannot be negative",
                        label
                    )));
                }
                if amount > self.total_amount {
                    return Err(DomainError::InvariantViolation(format!(
                        "{} amount {} exceeds claim total {}",
                        label, amount, self.total_amount
                    )));
                }
            }
        }

        let previous = self.status;
        if let Some(amount) = update.approved_amount {
            self.approved_amount = Some(amount);
        }
        if let Some(amount) = update.paid_amount {
            self.paid_amount = Some(amount);
        }
        if let Some(reason) = &update.denial_reason {
            self.denial_reason = Some(reason.clone());
        }
        if let Some(notes) = &update.notes {
            self.notes = Some(notes.clone());
        }

        let mut effect = ReviewEffect::None;
        if let Some(status) = update.status {
            if status != previous {
                self.status = status;
                if previous == ClaimStatus::Submitted {
                    self.reviewed_at = Some(at);
                }
                match status {
                    ClaimStatus::Denied => effect = ReviewEffect::Denied,
                    ClaimStatus::Paid => {
                        self.paid_at = Some(at);
                        if let Some(amount) = update.paid_amount.filter(|a| !a.is_zero()) {
                            effect = ReviewEffect::Credit(amount);
                        }
                    }
                    _ => {}
                }
            }
        }
        self.updated_at = at;
        Ok(effect)
    }
}

/// Insurer review outcome
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaimUpdate {
    #[serde(default)]
    pub status: Option<ClaimStatus>,
    #[serde(default)]
    pub approved_amount: Option<Decimal>,
    #[serde(default)]
    pub paid_amount: Option<Decimal>,
    #[serde(default)]
    pub denial_reason: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub updated_by: Option<UserId>,
}

/// Data needed to open a single claim
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClaim {
    pub invoice_id: InvoiceId,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_by: Option<UserId>,
}

/// Claim appeal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimAppeal {
    pub justification: String,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub appealed_by: Option<UserId>,
}

/// Filter for listing claims
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaimFilter {
    #[serde(default)]
    pub clinic_id: Option<ClinicId>,
    #[serde(default)]
    pub insurer_id: Option<InsurerId>,
    #[serde(default)]
    pub invoice_id: Option<InvoiceId>,
    #[serde(default)]
    pub batch_id: Option<BatchId>,
    #[serde(default)]
    pub statuses: Vec<ClaimStatus>,
}

impl ClaimFilter {
    pub fn matches(&self, claim: &InsuranceClaim) -> bool {
        self.clinic_id.map_or(true, |id| claim.clinic_id == id)
            && self.insurer_id.map_or(true, |id| claim.insurer_id == id)
            && self.invoice_id.map_or(true, |id| claim.invoice_id == id)
            && self.batch_id.map_or(true, |id| claim.batch_id == Some(id))
            && (self.statuses.is_empty() || self.statuses.contains(&claim.status))
    }
}

/// Batch status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Draft,
    Submitted,
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchStatus::Draft => write!(f, "DRAFT"),
            BatchStatus::Submitted => write!(f, "SUBMITTED"),
        }
    }
}

impl std::str::FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DRAFT" => Ok(BatchStatus::Draft),
            "SUBMITTED" => Ok(BatchStatus::Submitted),
            _ => Err(format!("Unknown batch status: {}", s)),
        }
    }
}

/// Claims submitted together to one insurer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsuranceBatch {
    pub id: BatchId,
    /// Format `BATCH-<year>-<seq>`
    pub batch_number: String,
    pub clinic_id: ClinicId,
    pub insurer_id: InsurerId,
    /// First day of the competence month
    pub competence: NaiveDate,
    pub status: BatchStatus,
    pub claims_count: u32,
    pub total_amount: Decimal,
    pub submitted_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InsuranceBatch {
    pub fn submit(&mut self, at: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != BatchStatus::Draft {
            return Err(DomainError::InvalidState(format!(
                "Batch {} was already submitted",
                self.batch_number
            )));
        }
        self.status = BatchStatus::Submitted;
        self.submitted_at = Some(at);
        self.updated_at = at;
        Ok(())
    }
}

/// Data needed to create a claim batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBatch {
    pub clinic_id: ClinicId,
    pub insurer_id: InsurerId,
    pub invoice_ids: Vec<InvoiceId>,
    /// Competence month; any day inside the month
    pub competence: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_by: Option<UserId>,
}

/// Normalize a competence date to the first of its month
pub fn competence_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// `CLM-2026-000001`
pub fn format_claim_number(at: DateTime<Utc>, seq: u64) -> String {
    format!("CLM-{}-{:06}", at.year(), seq)
}

/// `BATCH-2026-0001`
pub fn format_batch_number(at: DateTime<Utc>, seq: u64) -> String {
    format!("BATCH-{}-{:04}", at.year(), seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_claim;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn submit_requires_draft() {
        let mut claim = test_claim(InvoiceId::new(), dec!(300));
        claim.submit(Utc::now()).unwrap();
        assert_eq!(claim.status, ClaimStatus::Submitted);
        assert!(claim.submitted_at.is_some());
        assert!(matches!(
            claim.submit(Utc::now()),
            Err(DomainError::InvalidState(_))
        ));
    }

    #[test]
    fn appeal_requires_denied() {
        let mut claim = test_claim(InvoiceId::new(), dec!(300));
        claim.submit(Utc::now()).unwrap();
        assert!(matches!(
            claim.appeal("procedure authorized".into(), vec![], Utc::now()),
            Err(DomainError::InvalidState(_))
        ));

        let denied = ClaimUpdate {
            status: Some(ClaimStatus::Denied),
            denial_reason: Some("missing authorization".into()),
            ..Default::default()
        };
        assert_eq!(
            claim.apply_review(&denied, Utc::now()).unwrap(),
            ReviewEffect::Denied
        );
        assert!(claim.reviewed_at.is_some());

        claim
            .appeal(
                "authorization attached".into(),
                vec!["guia-123.pdf".into()],
                Utc::now(),
            )
            .unwrap();
        assert_eq!(claim.status, ClaimStatus::Appealed);
        assert_eq!(claim.appeal_evidence.len(), 1);
    }

    #[test]
    fn paid_review_credits_invoice() {
        let mut claim = test_claim(InvoiceId::new(), dec!(300));
        claim.submit(Utc::now()).unwrap();
        let paid = ClaimUpdate {
            status: Some(ClaimStatus::Paid),
            approved_amount: Some(dec!(280)),
            paid_amount: Some(dec!(280)),
            ..Default::default()
        };
        let effect = claim.apply_review(&paid, Utc::now()).unwrap();
        assert_eq!(effect, ReviewEffect::Credit(dec!(280)));
        assert!(claim.paid_at.is_some());

        assert!(matches!(
            claim.apply_review(&ClaimUpdate::default(), Utc::now()),
            Err(DomainError::InvalidState(_))
        ));
    }

    #[test]
    fn review_cannot_exceed_claim_total() {
        let mut claim = test_claim(InvoiceId::new(), dec!(300));
        claim.submit(Utc::now()).unwrap();
        let update = ClaimUpdate {
            status: Some(ClaimStatus::Approved),
            approved_amount: Some(dec!(301)),
            ..Default::default()
        };
        assert!(matches!(
            claim.apply_review(&update, Utc::now()),
            Err(DomainError::InvariantViolation(_))
        ));
        assert_eq!(claim.status, ClaimStatus::Submitted);
    }

    #[test]
    fn review_cannot_reopen_claim() {
        let mut claim = test_claim(InvoiceId::new(), dec!(300));
        let update = ClaimUpdate {
            status: Some(ClaimStatus::Submitted),
            ..Default::default()
        };
        assert!(matches!(
            claim.apply_review(&update, Utc::now()),
            Err(DomainError::InvalidState(_))
        ));
    }

    #[test]
    fn number_formats() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(format_claim_number(at, 7), "CLM-2026-000007");
        assert_eq!(format_batch_number(at, 12), "BATCH-2026-0012");
        assert_eq!(
            competence_month(NaiveDate::from_ymd_opt(2026, 3, 17).unwrap()),
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
        );
    }
}
