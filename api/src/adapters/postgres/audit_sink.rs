//! Append-only audit log in PostgreSQL

use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use uuid::Uuid;

use super::{db_err, to_db_time};
use crate::domain::entities::AuditEntry;
use crate::domain::ports::AuditSink;
use crate::entity::audit_log;
use crate::error::DomainError;

pub struct PostgresAuditSink {
    db: DatabaseConnection,
}

impl PostgresAuditSink {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuditSink for PostgresAuditSink {
    async fn record(&self, entry: &AuditEntry) -> Result<(), DomainError> {
        audit_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            action: Set(entry.action.clone()),
            entity_type: Set(entry.entity_type.clone()),
            entity_id: Set(entry.entity_id),
            user_id: Set(entry.user_id.map(|u| u.0)),
            details: Set(entry.details.clone()),
            created_at: Set(to_db_time(entry.created_at)),
        }
        .insert(&self.db)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}
