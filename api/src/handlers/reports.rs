//! Report handlers
//!
//! All reports accept `clinic_id`, `start`, `end` (RFC 3339) and
//! `granularity` (`day`, `week`, `month`, `year`) where they apply.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::app::ReportQuery;
use crate::domain::entities::ClinicId;
use crate::error::AppError;
use crate::reports::{
    AgingGroupBy, AgingReport, BillingStatistics, CashFlowReport, Dashboard, RevenueReport,
};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ProjectionQuery {
    /// Append projected inflows from open invoices
    #[serde(default)]
    pub projection: bool,
}

#[derive(Debug, Deserialize)]
pub struct AgingQuery {
    #[serde(default)]
    pub clinic_id: Option<ClinicId>,
    #[serde(default)]
    pub reference_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub group_by: Option<AgingGroupBy>,
}

#[derive(Debug, Deserialize)]
pub struct ClinicQuery {
    #[serde(default)]
    pub clinic_id: Option<ClinicId>,
}

/// GET /reports/revenue
pub async fn revenue_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<RevenueReport>, AppError> {
    Ok(Json(state.reports.revenue(&query).await?))
}

/// GET /reports/cash-flow
pub async fn cash_flow_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
    Query(projection): Query<ProjectionQuery>,
) -> Result<Json<CashFlowReport>, AppError> {
    Ok(Json(
        state
            .reports
            .cash_flow(&query, projection.projection)
            .await?,
    ))
}

/// GET /reports/aging
pub async fn aging_report(
    State(state): State<AppState>,
    Query(query): Query<AgingQuery>,
) -> Result<Json<AgingReport>, AppError> {
    Ok(Json(
        state
            .reports
            .aging(query.clinic_id, query.reference_date, query.group_by)
            .await?,
    ))
}

/// GET /reports/statistics
pub async fn statistics_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<BillingStatistics>, AppError> {
    Ok(Json(state.reports.statistics(&query).await?))
}

/// GET /reports/dashboard
pub async fn dashboard(
    State(state): State<AppState>,
    Query(query): Query<ClinicQuery>,
) -> Result<Json<Dashboard>, AppError> {
    Ok(Json(state.reports.dashboard(query.clinic_id).await?))
}
