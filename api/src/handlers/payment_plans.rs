//! Payment plan handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::ActorQuery;
use crate::app::{InstallmentPayment, InstallmentQuote, PayInstallment};
use crate::domain::entities::{NewPaymentPlan, PaymentMethod, PaymentPlan, PaymentPlanId, UserId};
use crate::error::AppError;
use crate::AppState;

/// Body of an installment payment; the number comes from the path
#[derive(Debug, Deserialize)]
pub struct PayInstallmentRequest {
    #[serde(default)]
    pub amount: Option<Decimal>,
    pub method: PaymentMethod,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_by: Option<UserId>,
}

/// POST /payment-plans
pub async fn create_payment_plan(
    State(state): State<AppState>,
    Json(request): Json<NewPaymentPlan>,
) -> Result<(StatusCode, Json<PaymentPlan>), AppError> {
    let plan = state.payment_plans.create_payment_plan(request).await?;
    Ok((StatusCode::CREATED, Json(plan)))
}

/// GET /payment-plans/:id
pub async fn get_payment_plan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentPlan>, AppError> {
    Ok(Json(
        state
            .payment_plans
            .get_payment_plan(&PaymentPlanId(id))
            .await?,
    ))
}

/// POST /payment-plans/:id/cancel
pub async fn cancel_payment_plan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(actor): Query<ActorQuery>,
) -> Result<Json<PaymentPlan>, AppError> {
    Ok(Json(
        state
            .payment_plans
            .cancel_payment_plan(&PaymentPlanId(id), actor.user_id)
            .await?,
    ))
}

/// GET /payment-plans/:id/installments/:number
///
/// What the installment would cost if paid now, late charges included.
pub async fn quote_installment(
    State(state): State<AppState>,
    Path((id, number)): Path<(Uuid, u32)>,
) -> Result<Json<InstallmentQuote>, AppError> {
    Ok(Json(
        state
            .payment_plans
            .quote_installment(&PaymentPlanId(id), number)
            .await?,
    ))
}

/// POST /payment-plans/:id/installments/:number/pay
pub async fn pay_installment(
    State(state): State<AppState>,
    Path((id, number)): Path<(Uuid, u32)>,
    Json(request): Json<PayInstallmentRequest>,
) -> Result<Json<InstallmentPayment>, AppError> {
    let payment = state
        .payment_plans
        .pay_installment(
            &PaymentPlanId(id),
            PayInstallment {
                number,
                amount: request.amount,
                method: request.method,
                notes: request.notes,
                created_by: request.created_by,
            },
        )
        .await?;
    Ok(Json(payment))
}
