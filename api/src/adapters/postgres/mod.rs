//! PostgreSQL adapters
//!
//! Implementations of repository traits using SeaORM and PostgreSQL.
//! Aggregate updates are filtered on the stored `version`, so a write based on
//! a stale read affects no rows and surfaces as `DomainError::Conflict`.
//! The versioned writes are generic over the connection so that
//! [`PostgresUnitOfWork`] can run several of them in one transaction.

pub mod audit_sink;
pub mod claim_repo;
pub mod invoice_repo;
pub mod payment_plan_repo;
pub mod payment_repo;
pub mod price_table_repo;
pub mod sequence_generator;
pub mod unit_of_work;


pub use audit_sink::PostgresAuditSink;
pub use claim_repo::PostgresClaimRepository;
pub use invoice_repo::PostgresInvoiceRepository;
pub use payment_plan_repo::PostgresPaymentPlanRepository;
pub use payment_repo::PostgresPaymentRepository;
pub use price_table_repo::PostgresPriceTableRepository;
pub use sequence_generator::PostgresSequenceGenerator;
pub use unit_of_work::PostgresUnitOfWork;

use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::DbErr;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::DomainError;

pub(crate) fn db_err(e: DbErr) -> DomainError {
    DomainError::Database(e.to_string())
}

pub(crate) fn to_db_time(at: DateTime<Utc>) -> DateTimeWithTimeZone {
    at.fixed_offset()
}

pub(crate) fn from_db_time(at: DateTimeWithTimeZone) -> DateTime<Utc> {
    at.with_timezone(&Utc)
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, DomainError> {
    serde_json::to_value(value)
        .map_err(|e| DomainError::Internal(format!("Failed to encode column: {}", e)))
}

pub(crate) fn from_json<T: DeserializeOwned>(
    value: serde_json::Value,
    column: &str,
) -> Result<T, DomainError> {
    serde_json::from_value(value)
        .map_err(|e| DomainError::Database(format!("Corrupt {} column: {}", column, e)))
}

/// Parse a status-like text column
pub(crate) fn parse_column<T>(raw: &str, column: &str) -> Result<T, DomainError>
where
    T: std::str::FromStr<Err = String>,
{
    raw.parse()
        .map_err(|e| DomainError::Database(format!("Corrupt {} column: {}", column, e)))
}

/// Resolve a zero-row versioned update into NotFound or Conflict
pub(crate) fn stale_write(entity: &str, id: impl std::fmt::Display, exists: bool) -> DomainError {
    if exists {
        DomainError::Conflict(format!(
            "{} {} was modified concurrently; reload and retry",
            entity, id
        ))
    } else {
        DomainError::NotFound(format!("{} {} not found", entity, id))
    }
}
