//! Unit of work port
//!
//! A settlement touches more than one aggregate: the invoice balance, the
//! payment that moved it and sometimes a payment plan or insurance claim.
//! Services collect those writes in a [`Changeset`] and commit them together;
//! either every write lands or none does.

use async_trait::async_trait;

use crate::domain::entities::{InsuranceClaim, Invoice, Payment, PaymentPlan};
use crate::error::DomainError;

/// Insert a new row or update an existing one under its version check
#[derive(Debug, Clone)]
pub enum Write<T> {
    Create(T),
    Update(T),
}

impl<T> Write<T> {
    pub fn get(&self) -> &T {
        match self {
            Write::Create(value) | Write::Update(value) => value,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Write::Create(value) | Write::Update(value) => value,
        }
    }
}

/// Writes that must land together
///
/// Updated aggregates come back from [`UnitOfWork::commit`] with their
/// version bumped.
#[derive(Debug, Clone, Default)]
pub struct Changeset {
    pub invoice: Option<Invoice>,
    pub payments: Vec<Write<Payment>>,
    pub plan: Option<Write<PaymentPlan>>,
    pub claim: Option<InsuranceClaim>,
}

fn missing(what: &str) -> DomainError {
    DomainError::Internal(format!("Committed changeset carries no {}", what))
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_invoice(mut self, invoice: Invoice) -> Self {
        self.invoice = Some(invoice);
        self
    }

    pub fn create_payment(mut self, payment: Payment) -> Self {
        self.payments.push(Write::Create(payment));
        self
    }

    pub fn update_payment(mut self, payment: Payment) -> Self {
        self.payments.push(Write::Update(payment));
        self
    }

    pub fn create_plan(mut self, plan: PaymentPlan) -> Self {
        self.plan = Some(Write::Create(plan));
        self
    }

    pub fn update_plan(mut self, plan: PaymentPlan) -> Self {
        self.plan = Some(Write::Update(plan));
        self
    }

    pub fn update_claim(mut self, claim: InsuranceClaim) -> Self {
        self.claim = Some(claim);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.invoice.is_none()
            && self.payments.is_empty()
            && self.plan.is_none()
            && self.claim.is_none()
    }

    pub fn take_invoice(&mut self) -> Result<Invoice, DomainError> {
        self.invoice.take().ok_or_else(|| missing("invoice"))
    }

    /// First payment written, for the single-payment flows
    pub fn take_payment(&mut self) -> Result<Payment, DomainError> {
        if self.payments.is_empty() {
            return Err(missing("payment"));
        }
        Ok(self.payments.remove(0).into_inner())
    }

    pub fn take_payments(&mut self) -> Vec<Payment> {
        self.payments.drain(..).map(Write::into_inner).collect()
    }

    pub fn take_plan(&mut self) -> Option<PaymentPlan> {
        self.plan.take().map(Write::into_inner)
    }

    pub fn take_claim(&mut self) -> Result<InsuranceClaim, DomainError> {
        self.claim.take().ok_or_else(|| missing("claim"))
    }
}

/// Atomic commit of a [`Changeset`]
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Apply every write or none
    ///
    /// Each update is checked against the stored version; a stale write
    /// fails the whole changeset with `DomainError::Conflict`.
    async fn commit(&self, changes: Changeset) -> Result<Changeset, DomainError>;
}
