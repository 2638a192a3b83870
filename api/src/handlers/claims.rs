//! Insurance claim handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{parse_list, ActorQuery};
use crate::app::BatchSubmission;
use crate::domain::entities::{
    BatchId, ClaimAppeal, ClaimFilter, ClaimId, ClaimUpdate, ClinicId, InsuranceBatch,
    InsuranceClaim, InsurerId, InvoiceId, NewBatch, NewClaim,
};
use crate::error::AppError;
use crate::AppState;

/// Query parameters for listing claims
#[derive(Debug, Deserialize)]
pub struct ListClaimsQuery {
    #[serde(default)]
    pub clinic_id: Option<ClinicId>,
    #[serde(default)]
    pub insurer_id: Option<InsurerId>,
    #[serde(default)]
    pub invoice_id: Option<InvoiceId>,
    #[serde(default)]
    pub batch_id: Option<BatchId>,
    /// Comma-separated statuses
    #[serde(default)]
    pub status: Option<String>,
}

/// GET /claims
pub async fn list_claims(
    State(state): State<AppState>,
    Query(query): Query<ListClaimsQuery>,
) -> Result<Json<Vec<InsuranceClaim>>, AppError> {
    let filter = ClaimFilter {
        clinic_id: query.clinic_id,
        insurer_id: query.insurer_id,
        invoice_id: query.invoice_id,
        batch_id: query.batch_id,
        statuses: parse_list(query.status.as_deref())?,
    };
    Ok(Json(state.claims.list_claims(&filter).await?))
}

/// POST /claims
pub async fn create_claim(
    State(state): State<AppState>,
    Json(request): Json<NewClaim>,
) -> Result<(StatusCode, Json<InsuranceClaim>), AppError> {
    let claim = state.claims.create_claim(request).await?;
    Ok((StatusCode::CREATED, Json(claim)))
}

/// GET /claims/:id
pub async fn get_claim(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<InsuranceClaim>, AppError> {
    Ok(Json(state.claims.get_claim(&ClaimId(id)).await?))
}

/// PATCH /claims/:id
///
/// Record the insurer's review. A PAID outcome credits the invoice.
pub async fn update_claim(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ClaimUpdate>,
) -> Result<Json<InsuranceClaim>, AppError> {
    Ok(Json(state.claims.update_claim(&ClaimId(id), request).await?))
}

/// POST /claims/:id/submit
pub async fn submit_claim(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(actor): Query<ActorQuery>,
) -> Result<Json<InsuranceClaim>, AppError> {
    Ok(Json(
        state.claims.submit_claim(&ClaimId(id), actor.user_id).await?,
    ))
}

/// POST /claims/:id/appeal
pub async fn appeal_claim(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ClaimAppeal>,
) -> Result<Json<InsuranceClaim>, AppError> {
    Ok(Json(state.claims.appeal_claim(&ClaimId(id), request).await?))
}

/// POST /claim-batches
pub async fn create_batch(
    State(state): State<AppState>,
    Json(request): Json<NewBatch>,
) -> Result<(StatusCode, Json<BatchSubmission>), AppError> {
    let batch = state.claims.create_batch(request).await?;
    Ok((StatusCode::CREATED, Json(batch)))
}

/// GET /claim-batches/:id
pub async fn get_batch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<InsuranceBatch>, AppError> {
    Ok(Json(state.claims.get_batch(&BatchId(id)).await?))
}

/// POST /claim-batches/:id/submit
pub async fn submit_batch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(actor): Query<ActorQuery>,
) -> Result<Json<BatchSubmission>, AppError> {
    Ok(Json(
        state.claims.submit_batch(&BatchId(id), actor.user_id).await?,
    ))
}
