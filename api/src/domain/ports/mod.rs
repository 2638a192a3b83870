//! Domain ports (traits)
//!
//! Port traits define interfaces that the billing engine requires.
//! Adapters provide concrete implementations of these traits.

pub mod collaborators;
pub mod gateway;
pub mod repositories;
pub mod unit_of_work;

pub use collaborators::{AuditSink, Clock, Notifier, SequenceGenerator, SequenceKind, SequenceScope};
pub use gateway::{
    BoletoCharge, BoletoRequest, CardAuthorization, CardCharge, PaymentGateway, PixCharge,
    PixRequest,
};
pub use repositories::{
    InsuranceClaimRepository, InvoiceRepository, PaymentPlanRepository, PaymentRepository,
    PriceTableRepository,
};
pub use unit_of_work::{Changeset, UnitOfWork, Write};
