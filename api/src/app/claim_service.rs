//! Insurance claim workflow
//!
//! Claims move DRAFT -> SUBMITTED -> {APPROVED -> PAID | DENIED -> APPEALED}.
//! A claim that reaches PAID credits its invoice through the same settlement
//! path payments use, under the invoice lock. The claim and the invoice
//! credit are committed together.

use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::app::payment_plan_service::{announce_plan_completed, settle_open_plan};
use crate::app::ServiceContext;
use crate::domain::entities::{
    competence_month, format_batch_number, format_claim_number, BatchId, BatchStatus,
    BillingEvent, ClaimAppeal, ClaimFilter, ClaimId, ClaimStatus, ClaimUpdate, InsuranceBatch,
    InsuranceClaim, InsurerId, Invoice, InvoiceId, InvoiceStatus, NewBatch, NewClaim,
    ReviewEffect, Settlement, UserId,
};
use crate::domain::ports::{
    Changeset, InsuranceClaimRepository, InvoiceRepository, PaymentPlanRepository, SequenceKind,
};
use crate::error::{AppError, DomainError};

/// A submitted batch with the claims it carried
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSubmission {
    pub batch: InsuranceBatch,
    pub claims: Vec<InsuranceClaim>,
}

/// Service for insurer-side settlement
pub struct InsuranceClaimService<IR, CR, PPR>
where
    IR: InvoiceRepository,
    CR: InsuranceClaimRepository,
    PPR: PaymentPlanRepository,
{
    invoices: Arc<IR>,
    claims: Arc<CR>,
    plans: Arc<PPR>,
    ctx: ServiceContext,
}

impl<IR, CR, PPR> InsuranceClaimService<IR, CR, PPR>
where
    IR: InvoiceRepository,
    CR: InsuranceClaimRepository,
    PPR: PaymentPlanRepository,
{
    pub fn new(invoices: Arc<IR>, claims: Arc<CR>, plans: Arc<PPR>, ctx: ServiceContext) -> Self {
        Self {
            invoices,
            claims,
            plans,
            ctx,
        }
    }

    pub async fn get_claim(&self, id: &ClaimId) -> Result<InsuranceClaim, AppError> {
        self.claims
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Claim", id))
    }

    pub async fn list_claims(&self, filter: &ClaimFilter) -> Result<Vec<InsuranceClaim>, AppError> {
        Ok(self.claims.list(filter).await?)
    }

    pub async fn get_batch(&self, id: &BatchId) -> Result<InsuranceBatch, AppError> {
        self.claims
            .find_batch(id)
            .await?
            .ok_or_else(|| AppError::not_found("Batch", id))
    }

    fn check_claimable(invoice: &Invoice) -> Result<InsurerId, DomainError> {
        if invoice.is_deleted()
            || matches!(
                invoice.status,
                InvoiceStatus::Cancelled | InvoiceStatus::Refunded
            )
        {
            return Err(DomainError::InvalidState(format!(
                "Invoice {} is {} and cannot be claimed",
                invoice.invoice_number, invoice.status
            )));
        }
        invoice.insurer_id.ok_or_else(|| {
            DomainError::Validation(format!(
                "Invoice {} has no insurer to claim against",
                invoice.invoice_number
            ))
        })
    }

    async fn ensure_unclaimed(&self, invoice_ids: &[InvoiceId]) -> Result<(), AppError> {
        for invoice_id in invoice_ids {
            let existing = self
                .claims
                .list(&ClaimFilter {
                    invoice_id: Some(*invoice_id),
                    ..Default::default()
                })
                .await?;
            if let Some(claim) = existing.first() {
                return Err(DomainError::InvalidState(format!(
                    "Invoice {} already has claim {}",
                    invoice_id, claim.claim_number
                ))
                .into());
            }
        }
        Ok(())
    }

    async fn draft_claim(
        &self,
        invoice: &Invoice,
        insurer_id: InsurerId,
        batch_id: Option<BatchId>,
        notes: Option<String>,
        created_by: Option<UserId>,
    ) -> Result<InsuranceClaim, AppError> {
        let now = self.ctx.now();
        let seq = self
            .ctx
            .next_sequence(SequenceKind::Claim, invoice.clinic_id, now)
            .await?;
        Ok(InsuranceClaim {
            id: ClaimId::new(),
            claim_number: format_claim_number(now, seq),
            clinic_id: invoice.clinic_id,
            invoice_id: invoice.id,
            insurer_id,
            patient_id: invoice.patient_id,
            batch_id,
            status: ClaimStatus::Draft,
            total_amount: invoice.total,
            approved_amount: None,
            paid_amount: None,
            denial_reason: None,
            appeal_justification: None,
            appeal_evidence: Vec::new(),
            submitted_at: None,
            reviewed_at: None,
            appealed_at: None,
            paid_at: None,
            notes,
            created_by,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    /// Open a DRAFT claim for one invoice
    pub async fn create_claim(&self, input: NewClaim) -> Result<InsuranceClaim, AppError> {
        let invoice = self
            .invoices
            .find_by_id(&input.invoice_id)
            .await?
            .ok_or_else(|| AppError::not_found("Invoice", input.invoice_id))?;
        let insurer_id = Self::check_claimable(&invoice)?;
        self.ensure_unclaimed(&[invoice.id]).await?;

        let claim = self
            .draft_claim(&invoice, insurer_id, None, input.notes, input.created_by)
            .await?;
        let claim = self.claims.create(&claim).await?;

        tracing::info!(
            claim_id = %claim.id,
            claim_number = %claim.claim_number,
            invoice_id = %claim.invoice_id,
            total = %claim.total_amount,
            "Created insurance claim"
        );
        self.ctx
            .audit(
                "claim.created",
                "insurance_claim",
                claim.id.0,
                claim.created_by,
                serde_json::json!({ "claim_number": claim.claim_number, "total_amount": claim.total_amount }),
            )
            .await;
        Ok(claim)
    }

    /// DRAFT -> SUBMITTED
    pub async fn submit_claim(
        &self,
        id: &ClaimId,
        user_id: Option<UserId>,
    ) -> Result<InsuranceClaim, AppError> {
        let invoice_id = self.get_claim(id).await?.invoice_id;
        let _guard = self.ctx.locks.lock(invoice_id).await;
        let mut claim = self.get_claim(id).await?;
        claim.submit(self.ctx.now())?;
        let claim = self.claims.update(&claim).await?;
        self.after_submit(&claim, user_id).await;
        Ok(claim)
    }

    async fn after_submit(&self, claim: &InsuranceClaim, user_id: Option<UserId>) {
        tracing::info!(claim_id = %claim.id, insurer_id = %claim.insurer_id, "Submitted claim");
        self.ctx
            .emit(BillingEvent::ClaimSubmitted {
                claim_id: claim.id,
                insurer_id: claim.insurer_id,
                timestamp: self.ctx.now(),
            })
            .await;
        self.ctx
            .audit(
                "claim.submitted",
                "insurance_claim",
                claim.id.0,
                user_id,
                serde_json::json!({ "batch_id": claim.batch_id }),
            )
            .await;
    }

    /// Record the insurer's review; PAID credits the invoice
    pub async fn update_claim(
        &self,
        id: &ClaimId,
        update: ClaimUpdate,
    ) -> Result<InsuranceClaim, AppError> {
        let invoice_id = self.get_claim(id).await?.invoice_id;
        let guard = self.ctx.locks.lock(invoice_id).await;

        let mut claim = self.get_claim(id).await?;
        let previous = claim.status;
        let now = self.ctx.now();
        let effect = claim.apply_review(&update, now)?;

        let mut changes = Changeset::new();
        if let ReviewEffect::Credit(amount) = effect {
            let mut invoice = self
                .invoices
                .find_by_id(&invoice_id)
                .await?
                .ok_or_else(|| AppError::not_found("Invoice", invoice_id))?;
            invoice.apply_settlement(&Settlement::insurance(claim.id, amount), now)?;
            if let Some(plan) = settle_open_plan(self.plans.as_ref(), &invoice, now).await? {
                changes = changes.update_plan(plan);
            }
            changes = changes.update_invoice(invoice);
        }
        let mut committed = self
            .ctx
            .commit(&guard, changes.update_claim(claim))
            .await?;
        drop(guard);
        let claim = committed.take_claim()?;
        if let (ReviewEffect::Credit(amount), Some(invoice)) = (effect, &committed.invoice) {
            tracing::info!(
                claim_id = %claim.id,
                invoice_id = %invoice.id,
                amount = %amount,
                insurance_coverage = %invoice.insurance_coverage,
                status = %invoice.status,
                "Credited insurance payment to invoice"
            );
        }

        tracing::info!(
            claim_id = %claim.id,
            from = %previous,
            to = %claim.status,
            "Updated claim"
        );
        match effect {
            ReviewEffect::Denied => {
                self.ctx
                    .emit(BillingEvent::ClaimDenied {
                        claim_id: claim.id,
                        invoice_id: claim.invoice_id,
                        reason: claim.denial_reason.clone(),
                        timestamp: now,
                    })
                    .await;
            }
            ReviewEffect::Credit(amount) => {
                self.ctx
                    .emit(BillingEvent::ClaimPaid {
                        claim_id: claim.id,
                        invoice_id: claim.invoice_id,
                        amount,
                        timestamp: now,
                    })
                    .await;
            }
            ReviewEffect::None => {}
        }
        self.ctx
            .audit(
                "claim.updated",
                "insurance_claim",
                claim.id.0,
                update.updated_by,
                serde_json::json!({
                    "from": previous,
                    "to": claim.status,
                    "approved_amount": claim.approved_amount,
                    "paid_amount": claim.paid_amount,
                }),
            )
            .await;
        if let Some(plan) = committed.take_plan() {
            announce_plan_completed(&self.ctx, &plan).await;
        }
        Ok(claim)
    }

    /// DENIED -> APPEALED
    pub async fn appeal_claim(
        &self,
        id: &ClaimId,
        appeal: ClaimAppeal,
    ) -> Result<InsuranceClaim, AppError> {
        let invoice_id = self.get_claim(id).await?.invoice_id;
        let _guard = self.ctx.locks.lock(invoice_id).await;

        let mut claim = self.get_claim(id).await?;
        claim.appeal(appeal.justification, appeal.evidence, self.ctx.now())?;
        let claim = self.claims.update(&claim).await?;

        tracing::info!(claim_id = %claim.id, "Appealed claim");
        self.ctx
            .audit(
                "claim.appealed",
                "insurance_claim",
                claim.id.0,
                appeal.appealed_by,
                serde_json::json!({ "evidence": claim.appeal_evidence.len() }),
            )
            .await;
        Ok(claim)
    }

    // ========== Batches ==========

    /// One DRAFT claim per invoice plus the batch row, all or nothing
    pub async fn create_batch(&self, input: NewBatch) -> Result<BatchSubmission, AppError> {
        let mut seen = HashSet::new();
        let invoice_ids: Vec<InvoiceId> = input
            .invoice_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();
        if invoice_ids.is_empty() {
            return Err(AppError::BadRequest("A batch needs at least one invoice".to_string()));
        }

        let invoices = self.invoices.find_by_ids(&invoice_ids).await?;
        let owned = invoices.len() == invoice_ids.len()
            && invoices.iter().all(|invoice| {
                !invoice.is_deleted()
                    && invoice.clinic_id == input.clinic_id
                    && invoice.insurer_id == Some(input.insurer_id)
            });
        if !owned {
            return Err(DomainError::Validation(format!(
                "Some invoices not found or insurer mismatch for insurer {}",
                input.insurer_id
            ))
            .into());
        }
        for invoice in &invoices {
            Self::check_claimable(invoice)?;
        }
        self.ensure_unclaimed(&invoice_ids).await?;

        let now = self.ctx.now();
        let seq = self
            .ctx
            .next_sequence(SequenceKind::Batch, input.clinic_id, now)
            .await?;
        let batch_id = BatchId::new();
        let mut claims = Vec::with_capacity(invoices.len());
        for invoice in &invoices {
            let claim = self
                .draft_claim(invoice, input.insurer_id, Some(batch_id), None, input.created_by)
                .await?;
            claims.push(claim);
        }

        let batch = InsuranceBatch {
            id: batch_id,
            batch_number: format_batch_number(now, seq),
            clinic_id: input.clinic_id,
            insurer_id: input.insurer_id,
            competence: competence_month(input.competence),
            status: BatchStatus::Draft,
            claims_count: claims.len() as u32,
            total_amount: claims.iter().map(|c| c.total_amount).sum::<Decimal>(),
            submitted_at: None,
            notes: input.notes,
            created_by: input.created_by,
            created_at: now,
            updated_at: now,
        };
        let batch = self.claims.create_batch(&batch, &claims).await?;

        tracing::info!(
            batch_id = %batch.id,
            batch_number = %batch.batch_number,
            claims = batch.claims_count,
            total = %batch.total_amount,
            "Created claim batch"
        );
        self.ctx
            .emit(BillingEvent::BatchCreated {
                batch_id: batch.id,
                insurer_id: batch.insurer_id,
                claims_count: batch.claims_count,
                total_amount: batch.total_amount,
                timestamp: now,
            })
            .await;
        self.ctx
            .audit(
                "claim_batch.created",
                "insurance_batch",
                batch.id.0,
                batch.created_by,
                serde_json::json!({
                    "batch_number": batch.batch_number,
                    "claims_count": batch.claims_count,
                    "total_amount": batch.total_amount,
                }),
            )
            .await;
        Ok(BatchSubmission { batch, claims })
    }

    /// Submit every DRAFT claim of a batch and stamp the batch
    pub async fn submit_batch(
        &self,
        id: &BatchId,
        user_id: Option<UserId>,
    ) -> Result<BatchSubmission, AppError> {
        let mut batch = self.get_batch(id).await?;
        batch.submit(self.ctx.now())?;

        let drafts = self
            .claims
            .list(&ClaimFilter {
                batch_id: Some(batch.id),
                statuses: vec![ClaimStatus::Draft],
                ..Default::default()
            })
            .await?;
        let mut submitted = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let _guard = self.ctx.locks.lock(draft.invoice_id).await;
            let mut claim = self.get_claim(&draft.id).await?;
            if claim.status != ClaimStatus::Draft {
                continue;
            }
            claim.submit(self.ctx.now())?;
            let claim = self.claims.update(&claim).await?;
            self.after_submit(&claim, user_id).await;
            submitted.push(claim);
        }

        let batch = self.claims.update_batch(&batch).await?;
        tracing::info!(
            batch_id = %batch.id,
            submitted = submitted.len(),
            "Submitted claim batch"
        );
        self.ctx
            .audit(
                "claim_batch.submitted",
                "insurance_batch",
                batch.id.0,
                user_id,
                serde_json::json!({ "claims": submitted.len() }),
            )
            .await;
        Ok(BatchSubmission {
            batch,
            claims: submitted,
        })
    }
}
