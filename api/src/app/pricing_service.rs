//! Price resolution and price table management
//!
//! Resolution order for a service code: the explicit table, then the
//! insurer's active table, then the default PRIVATE table.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::app::ServiceContext;
use crate::domain::entities::{
    InsurerId, NewPriceTable, PriceTable, PriceTableId, PriceTableType, PriceTableUpdate,
};
use crate::domain::ports::{Clock, PriceTableRepository};
use crate::error::{AppError, DomainError};

/// Read-only unit price lookup
pub struct PriceResolver<PTR>
where
    PTR: PriceTableRepository,
{
    tables: Arc<PTR>,
    clock: Arc<dyn Clock>,
}

impl<PTR> PriceResolver<PTR>
where
    PTR: PriceTableRepository,
{
    pub fn new(tables: Arc<PTR>, clock: Arc<dyn Clock>) -> Self {
        Self { tables, clock }
    }

    /// Table that prices requests for this insurer / explicit table
    pub async fn resolve_table(
        &self,
        insurer_id: Option<&InsurerId>,
        price_table_id: Option<&PriceTableId>,
    ) -> Result<PriceTable, AppError> {
        if let Some(id) = price_table_id {
            return self
                .tables
                .find_by_id(id)
                .await?
                .ok_or_else(|| AppError::not_found("Price table", id));
        }

        let now = self.clock.now();
        if let Some(insurer_id) = insurer_id {
            if let Some(table) = self.tables.find_for_insurer(insurer_id, now).await? {
                return Ok(table);
            }
        }

        self.tables
            .find_default(PriceTableType::Private, now)
            .await?
            .ok_or_else(|| {
                AppError::Domain(DomainError::NotFound(
                    "No price table resolves for this request".to_string(),
                ))
            })
    }

    /// Unit price of `code`, multiplier applied
    pub async fn resolve_price(
        &self,
        code: &str,
        insurer_id: Option<&InsurerId>,
        price_table_id: Option<&PriceTableId>,
    ) -> Result<Decimal, AppError> {
        let table = self.resolve_table(insurer_id, price_table_id).await?;
        let price = table.unit_price(code)?;
        tracing::debug!(code, table = %table.id, price = %price, "Resolved unit price");
        Ok(price)
    }
}

/// Price table writes
pub struct PriceTableService<PTR>
where
    PTR: PriceTableRepository,
{
    tables: Arc<PTR>,
    ctx: ServiceContext,
}

impl<PTR> PriceTableService<PTR>
where
    PTR: PriceTableRepository,
{
    pub fn new(tables: Arc<PTR>, ctx: ServiceContext) -> Self {
        Self { tables, ctx }
    }

    pub async fn create_price_table(&self, input: NewPriceTable) -> Result<PriceTable, AppError> {
        let table = input.into_table(self.ctx.now(), self.ctx.config.default_validity_days)?;
        let table = self.tables.create(&table).await?;
        tracing::info!(
            price_table_id = %table.id,
            table_type = %table.table_type,
            is_default = table.is_default,
            "Created price table"
        );
        self.ctx
            .audit(
                "price_table.created",
                "price_table",
                table.id.0,
                None,
                serde_json::json!({ "name": table.name, "items": table.items.len() }),
            )
            .await;
        Ok(table)
    }

    pub async fn update_price_table(
        &self,
        id: &PriceTableId,
        update: PriceTableUpdate,
    ) -> Result<PriceTable, AppError> {
        let mut table = self.get_price_table(id).await?;
        update.apply(&mut table, self.ctx.now())?;
        let table = self.tables.update(&table).await?;
        tracing::info!(price_table_id = %table.id, "Updated price table");
        self.ctx
            .audit(
                "price_table.updated",
                "price_table",
                table.id.0,
                None,
                serde_json::json!({ "is_default": table.is_default, "is_active": table.is_active }),
            )
            .await;
        Ok(table)
    }

    pub async fn get_price_table(&self, id: &PriceTableId) -> Result<PriceTable, AppError> {
        self.tables
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Price table", id))
    }

    pub async fn list_price_tables(
        &self,
        table_type: Option<PriceTableType>,
    ) -> Result<Vec<PriceTable>, AppError> {
        Ok(self.tables.list(table_type).await?)
    }
}
