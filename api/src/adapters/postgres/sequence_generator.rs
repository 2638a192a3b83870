//! Gap-free per-clinic, per-year counters
//!
//! A single upsert increments and returns the counter, so concurrent callers
//! serialize on the row lock and never observe the same value.

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, Statement};

use super::db_err;
use crate::domain::ports::{SequenceGenerator, SequenceScope};
use crate::error::DomainError;

const NEXT_VALUE_SQL: &str = r#"
INSERT INTO billing_sequences (kind, clinic_id, year, last_value)
VALUES ($1, $2, $3, 1)
ON CONFLICT (kind, clinic_id, year)
DO UPDATE SET last_value = billing_sequences.last_value + 1
RETURNING last_value
"#;

pub struct PostgresSequenceGenerator {
    db: DatabaseConnection,
}

impl PostgresSequenceGenerator {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SequenceGenerator for PostgresSequenceGenerator {
    async fn next(&self, scope: &SequenceScope) -> Result<u64, DomainError> {
        let statement = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            NEXT_VALUE_SQL,
            [
                scope.kind.as_str().into(),
                scope.clinic_id.0.into(),
                scope.year.into(),
            ],
        );

        let row = self
            .db
            .query_one(statement)
            .await
            .map_err(db_err)?
            .ok_or_else(|| {
                DomainError::Database(format!("No value returned for {} sequence", scope.kind.as_str()))
            })?;

        let value: i64 = row.try_get("", "last_value").map_err(db_err)?;
        u64::try_from(value)
            .map_err(|_| DomainError::Database(format!("Negative sequence value {}", value)))
    }
}
