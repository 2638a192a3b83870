//! PostgreSQL adapter for UnitOfWork
//!
//! Every write of a changeset runs inside one database transaction. An error
//! on any write drops the transaction, which rolls it back.

use async_trait::async_trait;
use sea_orm::{DatabaseConnection, TransactionTrait};

use super::claim_repo::update_claim;
use super::db_err;
use super::invoice_repo::update_invoice;
use super::payment_plan_repo::{insert_plan, update_plan};
use super::payment_repo::{insert_payment, update_payment};
use crate::domain::ports::{Changeset, UnitOfWork, Write};
use crate::error::DomainError;

/// PostgreSQL implementation of UnitOfWork
pub struct PostgresUnitOfWork {
    db: DatabaseConnection,
}

impl PostgresUnitOfWork {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn commit(&self, changes: Changeset) -> Result<Changeset, DomainError> {
        let txn = self.db.begin().await.map_err(db_err)?;
        let mut committed = Changeset::new();

        // Plans first: a newly created plan must exist before payments reference it
        if let Some(plan) = &changes.plan {
            committed.plan = Some(match plan {
                Write::Create(plan) => Write::Create(insert_plan(&txn, plan).await?),
                Write::Update(plan) => Write::Update(update_plan(&txn, plan).await?),
            });
        }
        if let Some(invoice) = &changes.invoice {
            committed.invoice = Some(update_invoice(&txn, invoice).await?);
        }
        for write in &changes.payments {
            committed.payments.push(match write {
                Write::Create(payment) => Write::Create(insert_payment(&txn, payment).await?),
                Write::Update(payment) => Write::Update(update_payment(&txn, payment).await?),
            });
        }
        if let Some(claim) = &changes.claim {
            committed.claim = Some(update_claim(&txn, claim).await?);
        }

        txn.commit().await.map_err(db_err)?;
        Ok(committed)
    }
}
