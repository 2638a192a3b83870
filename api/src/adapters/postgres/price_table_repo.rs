//! PostgreSQL adapter for PriceTableRepository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};

use super::{db_err, from_db_time, from_json, parse_column, to_db_time, to_json};
use crate::domain::entities::{InsurerId, PriceTable, PriceTableId, PriceTableType};
use crate::domain::ports::PriceTableRepository;
use crate::entity::price_tables;
use crate::error::DomainError;

/// PostgreSQL implementation of PriceTableRepository
pub struct PostgresPriceTableRepository {
    db: DatabaseConnection,
}

impl PostgresPriceTableRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

/// Active and inside its validity window at `at`
fn valid_at(at: DateTime<Utc>) -> Condition {
    let at = to_db_time(at);
    Condition::all()
        .add(price_tables::Column::IsActive.eq(true))
        .add(price_tables::Column::ValidFrom.lte(at))
        .add(
            Condition::any()
                .add(price_tables::Column::ValidUntil.is_null())
                .add(price_tables::Column::ValidUntil.gte(at)),
        )
}

/// Clear the default flag on every other table of the same type
async fn unmark_other_defaults<C: ConnectionTrait>(
    conn: &C,
    table: &PriceTable,
) -> Result<(), DomainError> {
    price_tables::Entity::update_many()
        .col_expr(price_tables::Column::IsDefault, Expr::value(false))
        .filter(price_tables::Column::TableType.eq(table.table_type.to_string()))
        .filter(price_tables::Column::IsDefault.eq(true))
        .filter(price_tables::Column::Id.ne(table.id.0))
        .exec(conn)
        .await
        .map_err(db_err)?;
    Ok(())
}

#[async_trait]
impl PriceTableRepository for PostgresPriceTableRepository {
    async fn find_by_id(&self, id: &PriceTableId) -> Result<Option<PriceTable>, DomainError> {
        let result = price_tables::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .map_err(db_err)?;

        result.map(PriceTable::try_from).transpose()
    }

    async fn find_for_insurer(
        &self,
        insurer_id: &InsurerId,
        at: DateTime<Utc>,
    ) -> Result<Option<PriceTable>, DomainError> {
        let result = price_tables::Entity::find()
            .filter(price_tables::Column::InsurerId.eq(insurer_id.0))
            .filter(valid_at(at))
            .order_by_desc(price_tables::Column::ValidFrom)
            .one(&self.db)
            .await
            .map_err(db_err)?;

        result.map(PriceTable::try_from).transpose()
    }

    async fn find_default(
        &self,
        table_type: PriceTableType,
        at: DateTime<Utc>,
    ) -> Result<Option<PriceTable>, DomainError> {
        let result = price_tables::Entity::find()
            .filter(price_tables::Column::TableType.eq(table_type.to_string()))
            .filter(price_tables::Column::IsDefault.eq(true))
            .filter(valid_at(at))
            .order_by_desc(price_tables::Column::ValidFrom)
            .one(&self.db)
            .await
            .map_err(db_err)?;

        result.map(PriceTable::try_from).transpose()
    }

    async fn list(
        &self,
        table_type: Option<PriceTableType>,
    ) -> Result<Vec<PriceTable>, DomainError> {
        let mut query = price_tables::Entity::find();
        if let Some(table_type) = table_type {
            query = query.filter(price_tables::Column::TableType.eq(table_type.to_string()));
        }

        let results = query
            .order_by_asc(price_tables::Column::Name)
            .all(&self.db)
            .await
            .map_err(db_err)?;

        results.into_iter().map(PriceTable::try_from).collect()
    }

    async fn create(&self, table: &PriceTable) -> Result<PriceTable, DomainError> {
        let txn = self.db.begin().await.map_err(db_err)?;
        if table.is_default {
            unmark_other_defaults(&txn, table).await?;
        }
        let model = active_model(table)?.insert(&txn).await.map_err(db_err)?;
        txn.commit().await.map_err(db_err)?;

        model.try_into()
    }

    async fn update(&self, table: &PriceTable) -> Result<PriceTable, DomainError> {
        let txn = self.db.begin().await.map_err(db_err)?;
        if table.is_default {
            unmark_other_defaults(&txn, table).await?;
        }
        let model = active_model(table)?
            .update(&txn)
            .await
            .map_err(|e| match e {
                sea_orm::DbErr::RecordNotUpdated => {
                    DomainError::NotFound(format!("Price table {} not found", table.id))
                }
                other => db_err(other),
            })?;
        txn.commit().await.map_err(db_err)?;

        model.try_into()
    }
}

fn active_model(table: &PriceTable) -> Result<price_tables::ActiveModel, DomainError> {
    Ok(price_tables::ActiveModel {
        id: Set(table.id.0),
        clinic_id: Set(table.clinic_id.map(|c| c.0)),
        name: Set(table.name.clone()),
        table_type: Set(table.table_type.to_string()),
        insurer_id: Set(table.insurer_id.map(|i| i.0)),
        is_default: Set(table.is_default),
        is_active: Set(table.is_active),
        multiplier: Set(table.multiplier),
        valid_from: Set(to_db_time(table.valid_from)),
        valid_until: Set(table.valid_until.map(to_db_time)),
        items: Set(to_json(&table.items)?),
        created_at: Set(to_db_time(table.created_at)),
        updated_at: Set(to_db_time(table.updated_at)),
    })
}

/// Convert SeaORM model to domain entity
impl TryFrom<price_tables::Model> for PriceTable {
    type Error = DomainError;

    fn try_from(model: price_tables::Model) -> Result<Self, Self::Error> {
        Ok(PriceTable {
            id: model.id.into(),
            clinic_id: model.clinic_id.map(Into::into),
            name: model.name,
            table_type: parse_column(&model.table_type, "price_tables.table_type")?,
            insurer_id: model.insurer_id.map(Into::into),
            is_default: model.is_default,
            is_active: model.is_active,
            multiplier: model.multiplier,
            valid_from: from_db_time(model.valid_from),
            valid_until: model.valid_until.map(from_db_time),
            items: from_json(model.items, "price_tables.items")?,
            created_at: from_db_time(model.created_at),
            updated_at: from_db_time(model.updated_at),
        })
    }
}
