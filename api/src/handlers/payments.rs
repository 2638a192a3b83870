//! Payment handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::app::CreatedPayment;
use crate::domain::entities::{ManualPayment, NewPayment, Payment, PaymentId, RefundReason, UserId};
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmPaymentRequest {
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct FailPaymentRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct RefundPaymentRequest {
    /// Defaults to everything still refundable
    #[serde(default)]
    pub amount: Option<Decimal>,
    pub reason: RefundReason,
    #[serde(default)]
    pub user_id: Option<UserId>,
}

/// POST /payments
///
/// Start a payment on a rail; the response says what the payer does next.
pub async fn create_payment(
    State(state): State<AppState>,
    Json(request): Json<NewPayment>,
) -> Result<(StatusCode, Json<CreatedPayment>), AppError> {
    let created = state.payments.create_payment(request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// POST /payments/manual
///
/// Record money already received at the front desk.
pub async fn record_manual_payment(
    State(state): State<AppState>,
    Json(request): Json<ManualPayment>,
) -> Result<(StatusCode, Json<Payment>), AppError> {
    let payment = state.payments.record_manual_payment(request).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// GET /payments/:id
pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Payment>, AppError> {
    Ok(Json(state.payments.get_payment(&PaymentId(id)).await?))
}

/// POST /payments/:id/confirm
pub async fn confirm_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ConfirmPaymentRequest>,
) -> Result<Json<Payment>, AppError> {
    Ok(Json(
        state
            .payments
            .confirm_payment(&PaymentId(id), request.paid_at)
            .await?,
    ))
}

/// POST /payments/:id/fail
pub async fn fail_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<FailPaymentRequest>,
) -> Result<Json<Payment>, AppError> {
    Ok(Json(
        state
            .payments
            .fail_payment(&PaymentId(id), &request.reason)
            .await?,
    ))
}

/// POST /payments/:id/refund
pub async fn refund_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RefundPaymentRequest>,
) -> Result<Json<Payment>, AppError> {
    Ok(Json(
        state
            .payments
            .refund_payment(&PaymentId(id), request.amount, request.reason, request.user_id)
            .await?,
    ))
}
