//! Price table handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entities::{
    InsurerId, NewPriceTable, PriceTable, PriceTableId, PriceTableType, PriceTableUpdate,
};
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListPriceTablesQuery {
    #[serde(default, rename = "type")]
    pub table_type: Option<PriceTableType>,
}

#[derive(Debug, Deserialize)]
pub struct ResolvePriceQuery {
    pub code: String,
    #[serde(default)]
    pub insurer_id: Option<InsurerId>,
    #[serde(default)]
    pub price_table_id: Option<PriceTableId>,
}

#[derive(Debug, Serialize)]
pub struct ResolvedPrice {
    pub code: String,
    pub price: Decimal,
}

/// GET /price-tables
pub async fn list_price_tables(
    State(state): State<AppState>,
    Query(query): Query<ListPriceTablesQuery>,
) -> Result<Json<Vec<PriceTable>>, AppError> {
    Ok(Json(state.price_tables.list_price_tables(query.table_type).await?))
}

/// POST /price-tables
pub async fn create_price_table(
    State(state): State<AppState>,
    Json(request): Json<NewPriceTable>,
) -> Result<Json<PriceTable>, AppError> {
    Ok(Json(state.price_tables.create_price_table(request).await?))
}

/// GET /price-tables/:id
pub async fn get_price_table(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PriceTable>, AppError> {
    Ok(Json(state.price_tables.get_price_table(&PriceTableId(id)).await?))
}

/// PATCH /price-tables/:id
pub async fn update_price_table(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<PriceTableUpdate>,
) -> Result<Json<PriceTable>, AppError> {
    Ok(Json(
        state
            .price_tables
            .update_price_table(&PriceTableId(id), request)
            .await?,
    ))
}

/// GET /price-tables/resolve?code=...
///
/// Price a service code the same way invoice creation does.
pub async fn resolve_price(
    State(state): State<AppState>,
    Query(query): Query<ResolvePriceQuery>,
) -> Result<Json<ResolvedPrice>, AppError> {
    let price = state
        .price_resolver
        .resolve_price(
            &query.code,
            query.insurer_id.as_ref(),
            query.price_table_id.as_ref(),
        )
        .await?;

    Ok(Json(ResolvedPrice {
        code: query.code,
        price,
    }))
}
