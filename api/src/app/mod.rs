//! Application layer
//!
//! Contains use cases and service orchestration.
//! Services coordinate between domain entities, ports, and external systems.

pub mod claim_service;
pub mod context;
pub mod invoice_service;
pub mod payment_plan_service;
pub mod payment_service;
pub mod pricing_service;
pub mod report_service;

pub use claim_service::{BatchSubmission, InsuranceClaimService};
pub use context::{InvoiceGuard, InvoiceLocks, ServiceContext};
pub use invoice_service::{CancelInvoice, InvoiceService};
pub use payment_plan_service::{
    InstallmentPayment, InstallmentQuote, PayInstallment, PaymentPlanService,
};
pub use payment_service::{CreatedPayment, PaymentAction, PaymentService, SettledPayment};
pub use pricing_service::{PriceResolver, PriceTableService};
pub use report_service::{ReportQuery, ReportService};
