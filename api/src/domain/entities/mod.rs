//! Domain entities
//!
//! Pure domain models for the billing engine.
//! These are separate from the SeaORM entities in the `entity` module.

pub mod event;
pub mod ids;
pub mod insurance_claim;
pub mod invoice;
pub mod money;
pub mod payment;
pub mod payment_plan;
pub mod price_table;

pub use event::{AuditEntry, BillingEvent};
pub use ids::{
    BatchId, ClaimId, ClinicId, InsurerId, InvoiceId, PatientId, PaymentId, PaymentPlanId,
    PriceTableId, UserId,
};
pub use insurance_claim::{
    competence_month, format_batch_number, format_claim_number, BatchStatus, ClaimAppeal,
    ClaimFilter, ClaimStatus, ClaimUpdate, InsuranceBatch, InsuranceClaim, NewBatch, NewClaim,
    ReviewEffect,
};
pub use invoice::{
    compute_totals, format_invoice_number, Invoice, InvoiceFilter, InvoiceItem, InvoiceStatus,
    InvoiceTax, InvoiceTotals, InvoiceUpdate, NewInvoice, NewInvoiceItem, NewTax, Settlement,
    SettlementSource,
};
pub use money::{discount_value, percentage, ratio, round_money, DiscountType};
pub use payment::{
    CardInput, InstallmentRef, ManualPayment, NewPayment, Payment, PaymentDetails, PaymentFilter,
    PaymentMethod, PaymentStatus, RefundReason, RefundRecord,
};
pub use payment_plan::{
    amortized_installment, build_schedule, schedule_due_dates, Installment, InstallmentStatus,
    LateCharges, NewPaymentPlan, PaymentPlan, PlanStatus, PlanTerms, Schedule,
};
pub use price_table::{
    NewPriceTable, PriceTable, PriceTableItem, PriceTableType, PriceTableUpdate,
};
