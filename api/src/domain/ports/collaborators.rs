//! Side-effect ports: clock, notifier, audit sink and sequence generator

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entities::{AuditEntry, BillingEvent, ClinicId};
use crate::error::{DomainError, NotifyError};

/// Source of "now"
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Fire-and-forget event dispatch (email, SMS, WhatsApp, push)
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &BillingEvent) -> Result<(), NotifyError>;
}

/// Append-only audit log
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: &AuditEntry) -> Result<(), DomainError>;
}

/// Kind of human-readable number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceKind {
    Invoice,
    Claim,
    Batch,
}

impl SequenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SequenceKind::Invoice => "invoice",
            SequenceKind::Claim => "claim",
            SequenceKind::Batch => "batch",
        }
    }
}

/// Counter scope: one sequence per kind, clinic and year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SequenceScope {
    pub kind: SequenceKind,
    pub clinic_id: ClinicId,
    pub year: i32,
}

/// Monotonic counters without duplicates under concurrent callers
#[async_trait]
pub trait SequenceGenerator: Send + Sync {
    /// Next value in the scope, starting at 1
    async fn next(&self, scope: &SequenceScope) -> Result<u64, DomainError>;
}
