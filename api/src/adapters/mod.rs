//! Adapters layer
//!
//! Implementations of port traits for external systems.

pub mod clock;
pub mod gateway;
pub mod notifier;
pub mod postgres;

pub use clock::SystemClock;
pub use gateway::ConfiguredGateway;
pub use notifier::WebhookNotifier;
pub use postgres::{
    PostgresAuditSink, PostgresClaimRepository, PostgresInvoiceRepository,
    PostgresPaymentPlanRepository, PostgresPaymentRepository, PostgresPriceTableRepository,
    PostgresSequenceGenerator, PostgresUnitOfWork,
};
