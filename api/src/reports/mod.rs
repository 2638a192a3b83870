//! Reports module
//!
//! Read-only aggregations over invoices, payments and claims. Nothing here
//! touches a repository; callers load the rows and pass slices in.

pub mod aging;
pub mod cash_flow;
pub mod period;
pub mod revenue;
pub mod statistics;

pub use aging::{aging_report, days_overdue, AgingBucket, AgingGroup, AgingGroupBy, AgingReport, OverdueInvoice};
pub use cash_flow::{cash_flow_report, project_inflows, CashFlowBucket, CashFlowReport, ProjectedInflow};
pub use period::{Granularity, ReportPeriod};
pub use revenue::{revenue_report, RevenueBucket, RevenueReport};
pub use statistics::{
    billing_statistics, dashboard, BillingStatistics, Breakdown, ClaimStatistics, Dashboard,
    InvoiceStatistics, PaymentStatistics,
};
