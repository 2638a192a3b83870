//! Repository port traits
//!
//! These traits define the interface for billing persistence.
//! Implementations are provided by adapters (e.g., PostgreSQL).
//!
//! Aggregates that are read-modify-written (invoices, plans, claims) carry a
//! `version`. `update` only succeeds when the stored version still equals the
//! one the caller loaded, and returns the aggregate with the bumped version.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::entities::{
    BatchId, ClaimFilter, ClaimId, InsuranceBatch, InsuranceClaim, InsurerId, Invoice,
    InvoiceFilter, InvoiceId, Payment, PaymentFilter, PaymentId, PaymentPlan, PaymentPlanId,
    PriceTable, PriceTableId, PriceTableType,
};
use crate::error::DomainError;

/// Repository for Invoice aggregates
#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    /// Find an invoice by ID (soft-deleted invoices included)
    async fn find_by_id(&self, id: &InvoiceId) -> Result<Option<Invoice>, DomainError>;

    /// Find several invoices at once; missing IDs are simply absent
    async fn find_by_ids(&self, ids: &[InvoiceId]) -> Result<Vec<Invoice>, DomainError>;

    /// List invoices matching a filter, newest first
    async fn list(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, DomainError>;

    /// Insert a new invoice
    async fn create(&self, invoice: &Invoice) -> Result<Invoice, DomainError>;

    /// Persist changes guarded by the invoice version
    async fn update(&self, invoice: &Invoice) -> Result<Invoice, DomainError>;
}

/// Repository for Payment entities
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError>;

    /// All payments of one invoice, oldest first
    async fn list_by_invoice(&self, invoice_id: &InvoiceId) -> Result<Vec<Payment>, DomainError>;

    async fn list(&self, filter: &PaymentFilter) -> Result<Vec<Payment>, DomainError>;

    async fn create(&self, payment: &Payment) -> Result<Payment, DomainError>;

    async fn update(&self, payment: &Payment) -> Result<Payment, DomainError>;
}

/// Repository for PaymentPlan aggregates
#[async_trait]
pub trait PaymentPlanRepository: Send + Sync {
    async fn find_by_id(&self, id: &PaymentPlanId) -> Result<Option<PaymentPlan>, DomainError>;

    /// The ACTIVE plan of an invoice, if any
    async fn find_active_by_invoice(
        &self,
        invoice_id: &InvoiceId,
    ) -> Result<Option<PaymentPlan>, DomainError>;

    async fn create(&self, plan: &PaymentPlan) -> Result<PaymentPlan, DomainError>;

    /// Persist changes guarded by the plan version
    async fn update(&self, plan: &PaymentPlan) -> Result<PaymentPlan, DomainError>;
}

/// Repository for insurance claims and batches
#[async_trait]
pub trait InsuranceClaimRepository: Send + Sync {
    async fn find_by_id(&self, id: &ClaimId) -> Result<Option<InsuranceClaim>, DomainError>;

    async fn list(&self, filter: &ClaimFilter) -> Result<Vec<InsuranceClaim>, DomainError>;

    async fn create(&self, claim: &InsuranceClaim) -> Result<InsuranceClaim, DomainError>;

    /// Persist changes guarded by the claim version
    async fn update(&self, claim: &InsuranceClaim) -> Result<InsuranceClaim, DomainError>;

    async fn find_batch(&self, id: &BatchId) -> Result<Option<InsuranceBatch>, DomainError>;

    /// Insert a batch and all of its claims, or nothing at all
    async fn create_batch(
        &self,
        batch: &InsuranceBatch,
        claims: &[InsuranceClaim],
    ) -> Result<InsuranceBatch, DomainError>;

    async fn update_batch(&self, batch: &InsuranceBatch) -> Result<InsuranceBatch, DomainError>;
}

/// Repository for PriceTable entities
#[async_trait]
pub trait PriceTableRepository: Send + Sync {
    async fn find_by_id(&self, id: &PriceTableId) -> Result<Option<PriceTable>, DomainError>;

    /// Active table of an insurer valid at `at`; the most recent `valid_from` wins
    async fn find_for_insurer(
        &self,
        insurer_id: &InsurerId,
        at: DateTime<Utc>,
    ) -> Result<Option<PriceTable>, DomainError>;

    /// Default table of a type valid at `at`
    async fn find_default(
        &self,
        table_type: PriceTableType,
        at: DateTime<Utc>,
    ) -> Result<Option<PriceTable>, DomainError>;

    async fn list(
        &self,
        table_type: Option<PriceTableType>,
    ) -> Result<Vec<PriceTable>, DomainError>;

    /// Insert a table; a default table unmarks every other default of its type
    async fn create(&self, table: &PriceTable) -> Result<PriceTable, DomainError>;

    /// Replace a table; a default table unmarks every other default of its type
    async fn update(&self, table: &PriceTable) -> Result<PriceTable, DomainError>;
}
