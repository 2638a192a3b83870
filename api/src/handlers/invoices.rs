//! Invoice handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::{parse_list, ActorQuery};
use crate::app::CancelInvoice;
use crate::domain::entities::{
    ClinicId, InsurerId, Invoice, InvoiceFilter, InvoiceId, InvoiceUpdate, NewInvoice, PatientId,
    Payment, UserId,
};
use crate::error::AppError;
use crate::AppState;

/// Query parameters for listing invoices
#[derive(Debug, Deserialize)]
pub struct ListInvoicesQuery {
    #[serde(default)]
    pub clinic_id: Option<ClinicId>,
    #[serde(default)]
    pub patient_id: Option<PatientId>,
    #[serde(default)]
    pub insurer_id: Option<InsurerId>,
    /// Comma-separated statuses
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub issued_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub issued_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    #[serde(flatten)]
    pub invoice: NewInvoice,
    #[serde(default)]
    pub created_by: Option<UserId>,
}

/// GET /invoices
pub async fn list_invoices(
    State(state): State<AppState>,
    Query(query): Query<ListInvoicesQuery>,
) -> Result<Json<Vec<Invoice>>, AppError> {
    let filter = InvoiceFilter {
        clinic_id: query.clinic_id,
        patient_id: query.patient_id,
        insurer_id: query.insurer_id,
        statuses: parse_list(query.status.as_deref())?,
        issued_from: query.issued_from,
        issued_to: query.issued_to,
    };
    Ok(Json(state.invoices.list_invoices(&filter).await?))
}

/// POST /invoices
pub async fn create_invoice(
    State(state): State<AppState>,
    Json(request): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<Invoice>), AppError> {
    let invoice = state
        .invoices
        .create_invoice(request.invoice, request.created_by)
        .await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

/// GET /invoices/:id
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    Ok(Json(state.invoices.get_invoice(&InvoiceId(id)).await?))
}

/// PATCH /invoices/:id
pub async fn update_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<InvoiceUpdate>,
) -> Result<Json<Invoice>, AppError> {
    Ok(Json(
        state.invoices.update_invoice(&InvoiceId(id), request).await?,
    ))
}

/// DELETE /invoices/:id
///
/// Soft delete; only drafts and cancelled invoices.
pub async fn delete_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(actor): Query<ActorQuery>,
) -> Result<StatusCode, AppError> {
    state
        .invoices
        .delete_invoice(&InvoiceId(id), actor.user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /invoices/:id/finalize
pub async fn finalize_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    Ok(Json(state.invoices.finalize_invoice(&InvoiceId(id)).await?))
}

/// POST /invoices/:id/send
pub async fn send_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    Ok(Json(state.invoices.send_invoice(&InvoiceId(id)).await?))
}

/// POST /invoices/:id/cancel
pub async fn cancel_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CancelInvoice>,
) -> Result<Json<Invoice>, AppError> {
    if request.reason.trim().is_empty() {
        return Err(AppError::BadRequest(
            "A cancellation reason is required".to_string(),
        ));
    }
    Ok(Json(
        state.invoices.cancel_invoice(&InvoiceId(id), request).await?,
    ))
}

/// GET /invoices/:id/payments
pub async fn list_invoice_payments(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Payment>>, AppError> {
    Ok(Json(state.payments.list_payments(&InvoiceId(id)).await?))
}
