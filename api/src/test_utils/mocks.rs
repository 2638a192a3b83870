//! Mock implementations of port traits
//!
//! These are in-memory implementations that can be configured for testing.
//! They store data in memory and allow tests to verify behavior.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::domain::entities::{
    AuditEntry, BatchId, BillingEvent, ClaimFilter, ClaimId, InsuranceBatch, InsuranceClaim,
    InsurerId, Invoice, InvoiceFilter, InvoiceId, Payment, PaymentFilter, PaymentId, PaymentPlan,
    PaymentPlanId, PlanStatus, PriceTable, PriceTableId, PriceTableType,
};
use crate::domain::ports::{
    AuditSink, BoletoCharge, BoletoRequest, CardAuthorization, CardCharge, Changeset, Clock,
    InsuranceClaimRepository, InvoiceRepository, Notifier, PaymentGateway, PaymentPlanRepository,
    PaymentRepository, PixCharge, PixRequest, PriceTableRepository, SequenceGenerator,
    SequenceScope, UnitOfWork, Write,
};
use crate::error::{DomainError, GatewayError, NotifyError};

fn version_conflict(entity: &str, id: impl std::fmt::Display, expected: i32, found: i32) -> DomainError {
    DomainError::Conflict(format!(
        "{} {} was modified concurrently (expected version {}, found {})",
        entity, id, expected, found
    ))
}

// ============================================================================
// In-Memory Invoice Repository
// ============================================================================

#[derive(Default)]
pub struct InMemoryInvoiceRepository {
    invoices: Arc<RwLock<HashMap<InvoiceId, Invoice>>>,
}

impl InMemoryInvoiceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an invoice as-is
    pub fn insert(&self, invoice: Invoice) {
        self.invoices.write().unwrap().insert(invoice.id, invoice);
    }

    pub fn get(&self, id: &InvoiceId) -> Option<Invoice> {
        self.invoices.read().unwrap().get(id).cloned()
    }

    fn check_current(&self, invoice: &Invoice) -> Result<(), DomainError> {
        let invoices = self.invoices.read().unwrap();
        let stored = invoices
            .get(&invoice.id)
            .ok_or_else(|| DomainError::NotFound(format!("Invoice {} not found", invoice.id)))?;
        if stored.version != invoice.version {
            return Err(version_conflict(
                "Invoice",
                invoice.id,
                invoice.version,
                stored.version,
            ));
        }
        Ok(())
    }

    fn store_update(&self, invoice: &Invoice) -> Invoice {
        let mut updated = invoice.clone();
        updated.version += 1;
        self.invoices.write().unwrap().insert(updated.id, updated.clone());
        updated
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryInvoiceRepository {
    async fn find_by_id(&self, id: &InvoiceId) -> Result<Option<Invoice>, DomainError> {
        Ok(self.get(id))
    }

    async fn find_by_ids(&self, ids: &[InvoiceId]) -> Result<Vec<Invoice>, DomainError> {
        let invoices = self.invoices.read().unwrap();
        Ok(ids.iter().filter_map(|id| invoices.get(id).cloned()).collect())
    }

    async fn list(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, DomainError> {
        let invoices = self.invoices.read().unwrap();
        let mut result: Vec<Invoice> = invoices
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.issue_date.cmp(&a.issue_date));
        Ok(result)
    }

    async fn create(&self, invoice: &Invoice) -> Result<Invoice, DomainError> {
        let mut invoices = self.invoices.write().unwrap();
        if invoices.contains_key(&invoice.id) {
            return Err(DomainError::Conflict(format!(
                "Invoice {} already exists",
                invoice.id
            )));
        }
        invoices.insert(invoice.id, invoice.clone());
        Ok(invoice.clone())
    }

    async fn update(&self, invoice: &Invoice) -> Result<Invoice, DomainError> {
        self.check_current(invoice)?;
        Ok(self.store_update(invoice))
    }
}

// ============================================================================
// In-Memory Payment Repository
// ============================================================================

#[derive(Default)]
pub struct InMemoryPaymentRepository {
    payments: Arc<RwLock<Vec<Payment>>>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored payment in insertion order
    pub fn all(&self) -> Vec<Payment> {
        self.payments.read().unwrap().clone()
    }

    pub fn get(&self, id: &PaymentId) -> Option<Payment> {
        self.payments.read().unwrap().iter().find(|p| p.id == *id).cloned()
    }

    fn check_absent(&self, payment: &Payment) -> Result<(), DomainError> {
        if self.get(&payment.id).is_some() {
            return Err(DomainError::Conflict(format!(
                "Payment {} already exists",
                payment.id
            )));
        }
        Ok(())
    }

    fn check_current(&self, payment: &Payment) -> Result<(), DomainError> {
        let stored = self
            .get(&payment.id)
            .ok_or_else(|| DomainError::NotFound(format!("Payment {} not found", payment.id)))?;
        if stored.version != payment.version {
            return Err(version_conflict(
                "Payment",
                payment.id,
                payment.version,
                stored.version,
            ));
        }
        Ok(())
    }

    fn store_create(&self, payment: &Payment) -> Payment {
        self.payments.write().unwrap().push(payment.clone());
        payment.clone()
    }

    fn store_update(&self, payment: &Payment) -> Payment {
        let mut updated = payment.clone();
        updated.version += 1;
        let mut payments = self.payments.write().unwrap();
        if let Some(stored) = payments.iter_mut().find(|p| p.id == payment.id) {
            *stored = updated.clone();
        }
        updated
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError> {
        Ok(self.get(id))
    }

    async fn list_by_invoice(&self, invoice_id: &InvoiceId) -> Result<Vec<Payment>, DomainError> {
        let payments = self.payments.read().unwrap();
        Ok(payments
            .iter()
            .filter(|p| p.invoice_id == *invoice_id)
            .cloned()
            .collect())
    }

    async fn list(&self, filter: &PaymentFilter) -> Result<Vec<Payment>, DomainError> {
        let payments = self.payments.read().unwrap();
        Ok(payments.iter().filter(|p| filter.matches(p)).cloned().collect())
    }

    async fn create(&self, payment: &Payment) -> Result<Payment, DomainError> {
        self.check_absent(payment)?;
        Ok(self.store_create(payment))
    }

    async fn update(&self, payment: &Payment) -> Result<Payment, DomainError> {
        self.check_current(payment)?;
        Ok(self.store_update(payment))
    }
}

// ============================================================================
// In-Memory Payment Plan Repository
// ============================================================================

#[derive(Default)]
pub struct InMemoryPaymentPlanRepository {
    plans: Arc<RwLock<HashMap<PaymentPlanId, PaymentPlan>>>,
}

impl InMemoryPaymentPlanRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &PaymentPlanId) -> Option<PaymentPlan> {
        self.plans.read().unwrap().get(id).cloned()
    }

    fn check_absent(&self, plan: &PaymentPlan) -> Result<(), DomainError> {
        if self.get(&plan.id).is_some() {
            return Err(DomainError::Conflict(format!(
                "Payment plan {} already exists",
                plan.id
            )));
        }
        Ok(())
    }

    fn check_current(&self, plan: &PaymentPlan) -> Result<(), DomainError> {
        let stored = self
            .get(&plan.id)
            .ok_or_else(|| DomainError::NotFound(format!("Payment plan {} not found", plan.id)))?;
        if stored.version != plan.version {
            return Err(version_conflict("Payment plan", plan.id, plan.version, stored.version));
        }
        Ok(())
    }

    fn store_create(&self, plan: &PaymentPlan) -> PaymentPlan {
        self.plans.write().unwrap().insert(plan.id, plan.clone());
        plan.clone()
    }

    fn store_update(&self, plan: &PaymentPlan) -> PaymentPlan {
        let mut updated = plan.clone();
        updated.version += 1;
        self.plans.write().unwrap().insert(updated.id, updated.clone());
        updated
    }
}

#[async_trait]
impl PaymentPlanRepository for InMemoryPaymentPlanRepository {
    async fn find_by_id(&self, id: &PaymentPlanId) -> Result<Option<PaymentPlan>, DomainError> {
        Ok(self.get(id))
    }

    async fn find_active_by_invoice(
        &self,
        invoice_id: &InvoiceId,
    ) -> Result<Option<PaymentPlan>, DomainError> {
        let plans = self.plans.read().unwrap();
        Ok(plans
            .values()
            .find(|p| p.invoice_id == *invoice_id && p.status == PlanStatus::Active)
            .cloned())
    }

    async fn create(&self, plan: &PaymentPlan) -> Result<PaymentPlan, DomainError> {
        self.check_absent(plan)?;
        Ok(self.store_create(plan))
    }

    async fn update(&self, plan: &PaymentPlan) -> Result<PaymentPlan, DomainError> {
        self.check_current(plan)?;
        Ok(self.store_update(plan))
    }
}

// ============================================================================
// In-Memory Insurance Claim Repository
// ============================================================================

#[derive(Default)]
pub struct InMemoryClaimRepository {
    claims: Arc<RwLock<Vec<InsuranceClaim>>>,
    batches: Arc<RwLock<HashMap<BatchId, InsuranceBatch>>>,
}

impl InMemoryClaimRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ClaimId) -> Option<InsuranceClaim> {
        self.claims.read().unwrap().iter().find(|c| c.id == *id).cloned()
    }

    fn check_current(&self, claim: &InsuranceClaim) -> Result<(), DomainError> {
        let stored = self
            .get(&claim.id)
            .ok_or_else(|| DomainError::NotFound(format!("Claim {} not found", claim.id)))?;
        if stored.version != claim.version {
            return Err(version_conflict("Claim", claim.id, claim.version, stored.version));
        }
        Ok(())
    }

    fn store_update(&self, claim: &InsuranceClaim) -> InsuranceClaim {
        let mut updated = claim.clone();
        updated.version += 1;
        let mut claims = self.claims.write().unwrap();
        if let Some(stored) = claims.iter_mut().find(|c| c.id == claim.id) {
            *stored = updated.clone();
        }
        updated
    }
}

#[async_trait]
impl InsuranceClaimRepository for InMemoryClaimRepository {
    async fn find_by_id(&self, id: &ClaimId) -> Result<Option<InsuranceClaim>, DomainError> {
        Ok(self.get(id))
    }

    async fn list(&self, filter: &ClaimFilter) -> Result<Vec<InsuranceClaim>, DomainError> {
        let claims = self.claims.read().unwrap();
        Ok(claims.iter().filter(|c| filter.matches(c)).cloned().collect())
    }

    async fn create(&self, claim: &InsuranceClaim) -> Result<InsuranceClaim, DomainError> {
        self.claims.write().unwrap().push(claim.clone());
        Ok(claim.clone())
    }

    async fn update(&self, claim: &InsuranceClaim) -> Result<InsuranceClaim, DomainError> {
        self.check_current(claim)?;
        Ok(self.store_update(claim))
    }

    async fn find_batch(&self, id: &BatchId) -> Result<Option<InsuranceBatch>, DomainError> {
        Ok(self.batches.read().unwrap().get(id).cloned())
    }

    async fn create_batch(
        &self,
        batch: &InsuranceBatch,
        claims: &[InsuranceClaim],
    ) -> Result<InsuranceBatch, DomainError> {
        let mut stored_claims = self.claims.write().unwrap();
        let mut batches = self.batches.write().unwrap();
        batches.insert(batch.id, batch.clone());
        stored_claims.extend(claims.iter().cloned());
        Ok(batch.clone())
    }

    async fn update_batch(&self, batch: &InsuranceBatch) -> Result<InsuranceBatch, DomainError> {
        let mut batches = self.batches.write().unwrap();
        if !batches.contains_key(&batch.id) {
            return Err(DomainError::NotFound(format!("Batch {} not found", batch.id)));
        }
        batches.insert(batch.id, batch.clone());
        Ok(batch.clone())
    }
}

// ============================================================================
// In-Memory Price Table Repository
// ============================================================================

#[derive(Default)]
pub struct InMemoryPriceTableRepository {
    tables: Arc<RwLock<HashMap<PriceTableId, PriceTable>>>,
}

impl InMemoryPriceTableRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table without touching other defaults
    pub fn insert(&self, table: PriceTable) {
        self.tables.write().unwrap().insert(table.id, table);
    }

    fn store(&self, table: &PriceTable) -> PriceTable {
        let mut tables = self.tables.write().unwrap();
        if table.is_default {
            for other in tables.values_mut() {
                if other.id != table.id && other.table_type == table.table_type {
                    other.is_default = false;
                }
            }
        }
        tables.insert(table.id, table.clone());
        table.clone()
    }
}

#[async_trait]
impl PriceTableRepository for InMemoryPriceTableRepository {
    async fn find_by_id(&self, id: &PriceTableId) -> Result<Option<PriceTable>, DomainError> {
        Ok(self.tables.read().unwrap().get(id).cloned())
    }

    async fn find_for_insurer(
        &self,
        insurer_id: &InsurerId,
        at: DateTime<Utc>,
    ) -> Result<Option<PriceTable>, DomainError> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .values()
            .filter(|t| t.insurer_id == Some(*insurer_id) && t.is_valid_at(at))
            .max_by_key(|t| t.valid_from)
            .cloned())
    }

    async fn find_default(
        &self,
        table_type: PriceTableType,
        at: DateTime<Utc>,
    ) -> Result<Option<PriceTable>, DomainError> {
        let tables = self.tables.read().unwrap();
        Ok(tables
            .values()
            .find(|t| t.table_type == table_type && t.is_default && t.is_valid_at(at))
            .cloned())
    }

    async fn list(
        &self,
        table_type: Option<PriceTableType>,
    ) -> Result<Vec<PriceTable>, DomainError> {
        let tables = self.tables.read().unwrap();
        let mut result: Vec<PriceTable> = tables
            .values()
            .filter(|t| table_type.map_or(true, |kind| t.table_type == kind))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn create(&self, table: &PriceTable) -> Result<PriceTable, DomainError> {
        Ok(self.store(table))
    }

    async fn update(&self, table: &PriceTable) -> Result<PriceTable, DomainError> {
        if !self.tables.read().unwrap().contains_key(&table.id) {
            return Err(DomainError::NotFound(format!(
                "Price table {} not found",
                table.id
            )));
        }
        Ok(self.store(table))
    }
}

// ============================================================================
// In-Memory Unit of Work
// ============================================================================

/// Commits a changeset against the in-memory repositories
///
/// Every version is checked before anything is written, so a failed commit
/// leaves all four stores untouched. `fail_next_commit` makes the next
/// commit fail as a dropped database connection would.
pub struct InMemoryUnitOfWork {
    invoices: Arc<InMemoryInvoiceRepository>,
    payments: Arc<InMemoryPaymentRepository>,
    plans: Arc<InMemoryPaymentPlanRepository>,
    claims: Arc<InMemoryClaimRepository>,
    commit_lock: Mutex<()>,
    fail_next: RwLock<bool>,
    commits: RwLock<usize>,
}

impl InMemoryUnitOfWork {
    pub fn new(
        invoices: Arc<InMemoryInvoiceRepository>,
        payments: Arc<InMemoryPaymentRepository>,
        plans: Arc<InMemoryPaymentPlanRepository>,
        claims: Arc<InMemoryClaimRepository>,
    ) -> Self {
        Self {
            invoices,
            payments,
            plans,
            claims,
            commit_lock: Mutex::new(()),
            fail_next: RwLock::new(false),
            commits: RwLock::new(0),
        }
    }

    pub fn fail_next_commit(&self) {
        *self.fail_next.write().unwrap() = true;
    }

    /// Successful commits so far
    pub fn commits(&self) -> usize {
        *self.commits.read().unwrap()
    }

    fn check(&self, changes: &Changeset) -> Result<(), DomainError> {
        if let Some(invoice) = &changes.invoice {
            self.invoices.check_current(invoice)?;
        }
        for write in &changes.payments {
            match write {
                Write::Create(payment) => self.payments.check_absent(payment)?,
                Write::Update(payment) => self.payments.check_current(payment)?,
            }
        }
        match &changes.plan {
            Some(Write::Create(plan)) => self.plans.check_absent(plan)?,
            Some(Write::Update(plan)) => self.plans.check_current(plan)?,
            None => {}
        }
        if let Some(claim) = &changes.claim {
            self.claims.check_current(claim)?;
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn commit(&self, changes: Changeset) -> Result<Changeset, DomainError> {
        // Give concurrent callers a chance to interleave, as a round trip would
        tokio::task::yield_now().await;

        let _commit = self.commit_lock.lock().unwrap();
        if std::mem::take(&mut *self.fail_next.write().unwrap()) {
            return Err(DomainError::Database(
                "connection reset during commit".to_string(),
            ));
        }
        self.check(&changes)?;

        let mut committed = Changeset::new();
        committed.plan = changes.plan.map(|write| match write {
            Write::Create(plan) => Write::Create(self.plans.store_create(&plan)),
            Write::Update(plan) => Write::Update(self.plans.store_update(&plan)),
        });
        committed.invoice = changes
            .invoice
            .map(|invoice| self.invoices.store_update(&invoice));
        committed.payments = changes
            .payments
            .into_iter()
            .map(|write| match write {
                Write::Create(payment) => Write::Create(self.payments.store_create(&payment)),
                Write::Update(payment) => Write::Update(self.payments.store_update(&payment)),
            })
            .collect();
        committed.claim = changes.claim.map(|claim| self.claims.store_update(&claim));

        *self.commits.write().unwrap() += 1;
        Ok(committed)
    }
}

// ============================================================================
// Fixed Clock
// ============================================================================

/// A clock that only moves when told to
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(at),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.write().unwrap() = at;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.write().unwrap() += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap()
    }
}

// ============================================================================
// Recording Notifier
// ============================================================================

/// A notifier that keeps every event it was handed
#[derive(Default)]
pub struct RecordingNotifier {
    events: Arc<RwLock<Vec<BillingEvent>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BillingEvent> {
        self.events.read().unwrap().clone()
    }

    /// How many events named `name` were emitted
    pub fn count(&self, name: &str) -> usize {
        self.events
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.name() == name)
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &BillingEvent) -> Result<(), NotifyError> {
        self.events.write().unwrap().push(event.clone());
        Ok(())
    }
}

// ============================================================================
// In-Memory Audit Sink
// ============================================================================

#[derive(Default)]
pub struct InMemoryAuditSink {
    entries: Arc<RwLock<Vec<AuditEntry>>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .map(|e| e.action.clone())
            .collect()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, entry: &AuditEntry) -> Result<(), DomainError> {
        self.entries.write().unwrap().push(entry.clone());
        Ok(())
    }
}

// ============================================================================
// In-Memory Sequence Generator
// ============================================================================

#[derive(Default)]
pub struct InMemorySequenceGenerator {
    counters: Mutex<HashMap<SequenceScope, u64>>,
}

impl InMemorySequenceGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SequenceGenerator for InMemorySequenceGenerator {
    async fn next(&self, scope: &SequenceScope) -> Result<u64, DomainError> {
        let mut counters = self.counters.lock().unwrap();
        let counter = counters.entry(*scope).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}

// ============================================================================
// Mock Payment Gateway
// ============================================================================

/// A gateway that approves everything unless switched to failing
#[derive(Default)]
pub struct MockPaymentGateway {
    should_fail: Arc<RwLock<bool>>,
    refunds: Arc<RwLock<Vec<(String, Decimal)>>>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.should_fail.write().unwrap() = failing;
    }

    /// Card refunds as `(transaction_id, amount)`
    pub fn refunds(&self) -> Vec<(String, Decimal)> {
        self.refunds.read().unwrap().clone()
    }

    fn check(&self) -> Result<(), GatewayError> {
        if *self.should_fail.read().unwrap() {
            Err(GatewayError::Unavailable("mock gateway is down".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn charge_card(&self, charge: &CardCharge) -> Result<CardAuthorization, GatewayError> {
        self.check()?;
        Ok(CardAuthorization {
            transaction_id: format!("txn_{}", charge.payment_id.0.simple()),
            authorization_url: None,
        })
    }

    async fn create_pix(&self, request: &PixRequest) -> Result<PixCharge, GatewayError> {
        self.check()?;
        Ok(PixCharge {
            code: format!("pix-{}", request.payment_id),
            qr_code: "data:image/png;base64,AAAA".to_string(),
            expires_at: request.expires_at,
        })
    }

    async fn create_boleto(&self, request: &BoletoRequest) -> Result<BoletoCharge, GatewayError> {
        self.check()?;
        Ok(BoletoCharge {
            barcode: "23790000000000000000000000000000000000000000".to_string(),
            digitable_line: "23790.00009 00000.000000 00000.000000 0 00000000000000".to_string(),
            url: Some(format!("https://boleto.test/{}", request.payment_id)),
            expires_at: request.expires_at,
        })
    }

    async fn refund_card(&self, transaction_id: &str, amount: Decimal) -> Result<(), GatewayError> {
        self.check()?;
        self.refunds
            .write()
            .unwrap()
            .push((transaction_id.to_string(), amount));
        Ok(())
    }
}
