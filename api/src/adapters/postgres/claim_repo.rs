//! PostgreSQL adapter for InsuranceClaimRepository
//!
//! Claims and their batches live side by side; a batch and its claims are
//! inserted in one transaction.

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};

use super::{db_err, from_db_time, from_json, parse_column, stale_write, to_db_time, to_json};
use crate::domain::entities::{BatchId, ClaimFilter, ClaimId, InsuranceBatch, InsuranceClaim};
use crate::domain::ports::InsuranceClaimRepository;
use crate::entity::{insurance_batches, insurance_claims};
use crate::error::DomainError;

/// PostgreSQL implementation of InsuranceClaimRepository
pub struct PostgresClaimRepository {
    db: DatabaseConnection,
}

impl PostgresClaimRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

/// Write `claim` if the stored row still carries its version
pub(crate) async fn update_claim<C: ConnectionTrait>(
    conn: &C,
    claim: &InsuranceClaim,
) -> Result<InsuranceClaim, DomainError> {
    let mut model = claim_model(claim)?;
    model.id = NotSet;
    model.version = Set(claim.version + 1);

    let result = insurance_claims::Entity::update_many()
        .set(model)
        .filter(insurance_claims::Column::Id.eq(claim.id.0))
        .filter(insurance_claims::Column::Version.eq(claim.version))
        .exec(conn)
        .await
        .map_err(db_err)?;

    if result.rows_affected == 0 {
        let exists = insurance_claims::Entity::find_by_id(claim.id.0)
            .count(conn)
            .await
            .map_err(db_err)?
            > 0;
        return Err(stale_write("Claim", claim.id, exists));
    }

    let mut updated = claim.clone();
    updated.version += 1;
    Ok(updated)
}

#[async_trait]
impl InsuranceClaimRepository for PostgresClaimRepository {
    async fn find_by_id(&self, id: &ClaimId) -> Result<Option<InsuranceClaim>, DomainError> {
        let result = insurance_claims::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .map_err(db_err)?;

        result.map(InsuranceClaim::try_from).transpose()
    }

    async fn list(&self, filter: &ClaimFilter) -> Result<Vec<InsuranceClaim>, DomainError> {
        let mut query = insurance_claims::Entity::find();
        if let Some(clinic_id) = filter.clinic_id {
            query = query.filter(insurance_claims::Column::ClinicId.eq(clinic_id.0));
        }
        if let Some(insurer_id) = filter.insurer_id {
            query = query.filter(insurance_claims::Column::InsurerId.eq(insurer_id.0));
        }
        if let Some(invoice_id) = filter.invoice_id {
            query = query.filter(insurance_claims::Column::InvoiceId.eq(invoice_id.0));
        }
        if let Some(batch_id) = filter.batch_id {
            query = query.filter(insurance_claims::Column::BatchId.eq(batch_id.0));
        }
        if !filter.statuses.is_empty() {
            query = query.filter(
                insurance_claims::Column::Status
                    .is_in(filter.statuses.iter().map(|s| s.to_string())),
            );
        }

        let results = query
            .order_by_desc(insurance_claims::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_err)?;

        results.into_iter().map(InsuranceClaim::try_from).collect()
    }

    async fn create(&self, claim: &InsuranceClaim) -> Result<InsuranceClaim, DomainError> {
        let model = claim_model(claim)?
            .insert(&self.db)
            .await
            .map_err(db_err)?;

        model.try_into()
    }

    async fn update(&self, claim: &InsuranceClaim) -> Result<InsuranceClaim, DomainError> {
        update_claim(&self.db, claim).await
    }

    async fn find_batch(&self, id: &BatchId) -> Result<Option<InsuranceBatch>, DomainError> {
        let result = insurance_batches::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .map_err(db_err)?;

        result.map(InsuranceBatch::try_from).transpose()
    }

    async fn create_batch(
        &self,
        batch: &InsuranceBatch,
        claims: &[InsuranceClaim],
    ) -> Result<InsuranceBatch, DomainError> {
        let txn = self.db.begin().await.map_err(db_err)?;

        let model = batch_model(batch).insert(&txn).await.map_err(db_err)?;
        if !claims.is_empty() {
            let models = claims
                .iter()
                .map(claim_model)
                .collect::<Result<Vec<_>, _>>()?;
            insurance_claims::Entity::insert_many(models)
                .exec(&txn)
                .await
                .map_err(db_err)?;
        }

        txn.commit().await.map_err(db_err)?;
        model.try_into()
    }

    async fn update_batch(&self, batch: &InsuranceBatch) -> Result<InsuranceBatch, DomainError> {
        let model = batch_model(batch)
            .update(&self.db)
            .await
            .map_err(|e| match e {
                sea_orm::DbErr::RecordNotUpdated => {
                    DomainError::NotFound(format!("Batch {} not found", batch.id))
                }
                other => db_err(other),
            })?;

        model.try_into()
    }
}

fn claim_model(claim: &InsuranceClaim) -> Result<insurance_claims::ActiveModel, DomainError> {
    Ok(insurance_claims::ActiveModel {
        id: Set(claim.id.0),
        claim_number: Set(claim.claim_number.clone()),
        clinic_id: Set(claim.clinic_id.0),
        invoice_id: Set(claim.invoice_id.0),
        insurer_id: Set(claim.insurer_id.0),
        patient_id: Set(claim.patient_id.0),
        batch_id: Set(claim.batch_id.map(|b| b.0)),
        status: Set(claim.status.to_string()),
        total_amount: Set(claim.total_amount),
        approved_amount: Set(claim.approved_amount),
        paid_amount: Set(claim.paid_amount),
        denial_reason: Set(claim.denial_reason.clone()),
        appeal_justification: Set(claim.appeal_justification.clone()),
        appeal_evidence: Set(to_json(&claim.appeal_evidence)?),
        submitted_at: Set(claim.submitted_at.map(to_db_time)),
        reviewed_at: Set(claim.reviewed_at.map(to_db_time)),
        appealed_at: Set(claim.appealed_at.map(to_db_time)),
        paid_at: Set(claim.paid_at.map(to_db_time)),
        notes: Set(claim.notes.clone()),
        created_by: Set(claim.created_by.map(|u| u.0)),
        created_at: Set(to_db_time(claim.created_at)),
        updated_at: Set(to_db_time(claim.updated_at)),
        version: Set(claim.version),
    })
}

fn batch_model(batch: &InsuranceBatch) -> insurance_batches::ActiveModel {
    insurance_batches::ActiveModel {
        id: Set(batch.id.0),
        batch_number: Set(batch.batch_number.clone()),
        clinic_id: Set(batch.clinic_id.0),
        insurer_id: Set(batch.insurer_id.0),
        competence: Set(batch.competence),
        status: Set(batch.status.to_string()),
        claims_count: Set(batch.claims_count as i32),
        total_amount: Set(batch.total_amount),
        submitted_at: Set(batch.submitted_at.map(to_db_time)),
        notes: Set(batch.notes.clone()),
        created_by: Set(batch.created_by.map(|u| u.0)),
        created_at: Set(to_db_time(batch.created_at)),
        updated_at: Set(to_db_time(batch.updated_at)),
    }
}

/// Convert SeaORM model to domain entity
impl TryFrom<insurance_claims::Model> for InsuranceClaim {
    type Error = DomainError;

    fn try_from(model: insurance_claims::Model) -> Result<Self, Self::Error> {
        Ok(InsuranceClaim {
            id: model.id.into(),
            claim_number: model.claim_number,
            clinic_id: model.clinic_id.into(),
            invoice_id: model.invoice_id.into(),
            insurer_id: model.insurer_id.into(),
            patient_id: model.patient_id.into(),
            batch_id: model.batch_id.map(Into::into),
            status: parse_column(&model.status, "insurance_claims.status")?,
            total_amount: model.total_amount,
            approved_amount: model.approved_amount,
            paid_amount: model.paid_amount,
            denial_reason: model.denial_reason,
            appeal_justification: model.appeal_justification,
            appeal_evidence: from_json(model.appeal_evidence, "insurance_claims.appeal_evidence")?,
            submitted_at: model.submitted_at.map(from_db_time),
            reviewed_at: model.reviewed_at.map(from_db_time),
            appealed_at: model.appealed_at.map(from_db_time),
            paid_at: model.paid_at.map(from_db_time),
            notes: model.notes,
            created_by: model.created_by.map(Into::into),
            created_at: from_db_time(model.created_at),
            updated_at: from_db_time(model.updated_at),
            version: model.version,
        })
    }
}

impl TryFrom<insurance_batches::Model> for InsuranceBatch {
    type Error = DomainError;

    fn try_from(model: insurance_batches::Model) -> Result<Self, Self::Error> {
        Ok(InsuranceBatch {
            id: model.id.into(),
            batch_number: model.batch_number,
            clinic_id: model.clinic_id.into(),
            insurer_id: model.insurer_id.into(),
            competence: model.competence,
            status: parse_column(&model.status, "insurance_batches.status")?,
            claims_count: model.claims_count as u32,
            total_amount: model.total_amount,
            submitted_at: model.submitted_at.map(from_db_time),
            notes: model.notes,
            created_by: model.created_by.map(Into::into),
            created_at: from_db_time(model.created_at),
            updated_at: from_db_time(model.updated_at),
        })
    }
}
