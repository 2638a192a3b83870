//! Shared service context
//!
//! Every service receives the same clock, notifier, audit sink, sequence
//! generator, unit of work, invoice lock registry and billing configuration.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, Utc};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::config::BillingConfig;
use crate::domain::entities::{AuditEntry, BillingEvent, ClinicId, InvoiceId, UserId};
use crate::domain::ports::{
    AuditSink, Changeset, Clock, Notifier, SequenceGenerator, SequenceKind, SequenceScope,
    UnitOfWork,
};
use crate::error::{AppError, DomainError};

/// Entries are pruned once the registry grows past this many invoices
const LOCK_PRUNE_THRESHOLD: usize = 1024;

/// Per-invoice mutual exclusion for balance mutations
///
/// Operations on different invoices never contend. The repository version
/// check still guards against writers in other processes.
#[derive(Default)]
pub struct InvoiceLocks {
    locks: Mutex<HashMap<InvoiceId, Arc<tokio::sync::Mutex<()>>>>,
}

/// Proof that the caller holds an invoice's lock
pub struct InvoiceGuard {
    invoice_id: InvoiceId,
    _guard: OwnedMutexGuard<()>,
}

impl InvoiceGuard {
    pub fn invoice_id(&self) -> InvoiceId {
        self.invoice_id
    }

    /// Fail unless this guard covers `invoice_id`
    pub fn ensure_covers(&self, invoice_id: InvoiceId) -> Result<(), DomainError> {
        if self.invoice_id == invoice_id {
            Ok(())
        } else {
            Err(DomainError::Internal(format!(
                "Lock held for invoice {} but invoice {} was mutated",
                self.invoice_id, invoice_id
            )))
        }
    }
}

impl InvoiceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to one invoice
    pub async fn lock(&self, invoice_id: InvoiceId) -> InvoiceGuard {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            if locks.len() > LOCK_PRUNE_THRESHOLD {
                locks.retain(|_, m| Arc::strong_count(m) > 1);
            }
            locks.entry(invoice_id).or_default().clone()
        };
        InvoiceGuard {
            invoice_id,
            _guard: mutex.lock_owned().await,
        }
    }
}

/// Collaborators shared by all billing services
#[derive(Clone)]
pub struct ServiceContext {
    pub clock: Arc<dyn Clock>,
    pub notifier: Arc<dyn Notifier>,
    pub audit: Arc<dyn AuditSink>,
    pub sequences: Arc<dyn SequenceGenerator>,
    pub store: Arc<dyn UnitOfWork>,
    pub locks: Arc<InvoiceLocks>,
    pub config: BillingConfig,
}

impl ServiceContext {
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Dispatch an event; delivery failures are logged and dropped
    pub async fn emit(&self, event: BillingEvent) {
        if let Err(e) = self.notifier.notify(&event).await {
            tracing::warn!(error = %e, event = event.name(), "Failed to dispatch billing event");
        }
    }

    /// Append an audit entry; sink failures are logged and dropped
    pub async fn audit(
        &self,
        action: &str,
        entity_type: &str,
        entity_id: Uuid,
        user_id: Option<UserId>,
        details: serde_json::Value,
    ) {
        let entry = AuditEntry::new(action, entity_type, entity_id, user_id, details, self.now());
        if let Err(e) = self.audit.record(&entry).await {
            tracing::warn!(
                error = %e,
                action,
                entity_type,
                entity_id = %entity_id,
                "Failed to write audit entry"
            );
        }
    }

    /// Commit writes that must land together
    ///
    /// The caller holds the lock of the invoice the changeset touches.
    pub async fn commit(
        &self,
        guard: &InvoiceGuard,
        changes: Changeset,
    ) -> Result<Changeset, AppError> {
        if let Some(invoice) = &changes.invoice {
            guard.ensure_covers(invoice.id)?;
        }
        for write in &changes.payments {
            guard.ensure_covers(write.get().invoice_id)?;
        }
        Ok(self.store.commit(changes).await?)
    }

    /// Next number in the clinic's sequence for the year of `at`
    pub async fn next_sequence(
        &self,
        kind: SequenceKind,
        clinic_id: ClinicId,
        at: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let scope = SequenceScope {
            kind,
            clinic_id,
            year: at.year(),
        };
        Ok(self.sequences.next(&scope).await?)
    }
}
