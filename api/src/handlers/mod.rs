//! HTTP handlers
//!
//! Axum request handlers for the API endpoints. Handlers only translate
//! between JSON and service calls; every rule lives in `app`.

pub mod claims;
pub mod invoices;
pub mod payment_plans;
pub mod payments;
pub mod price_tables;
pub mod reports;

use serde::Deserialize;

use crate::domain::entities::UserId;
use crate::error::AppError;

pub use claims::{
    appeal_claim, create_batch, create_claim, get_batch, get_claim, list_claims, submit_batch,
    submit_claim, update_claim,
};
pub use invoices::{
    cancel_invoice, create_invoice, delete_invoice, finalize_invoice, get_invoice,
    list_invoice_payments, list_invoices, send_invoice, update_invoice,
};
pub use payment_plans::{
    cancel_payment_plan, create_payment_plan, get_payment_plan, pay_installment,
    quote_installment,
};
pub use payments::{
    confirm_payment, create_payment, fail_payment, get_payment, record_manual_payment,
    refund_payment,
};
pub use price_tables::{
    create_price_table, get_price_table, list_price_tables, resolve_price, update_price_table,
};
pub use reports::{
    aging_report, cash_flow_report, dashboard, revenue_report, statistics_report,
};

/// `?user_id=` on endpoints whose only input is who acted
#[derive(Debug, Default, Deserialize)]
pub struct ActorQuery {
    #[serde(default)]
    pub user_id: Option<UserId>,
}

/// Parse a comma-separated list such as `?status=SENT,OVERDUE`
pub(crate) fn parse_list<T>(raw: Option<&str>) -> Result<Vec<T>, AppError>
where
    T: std::str::FromStr<Err = String>,
{
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse().map_err(AppError::BadRequest))
            .collect()
    })
    .unwrap_or_else(|| Ok(Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::InvoiceStatus;

    #[test]
    fn parse_list_splits_and_trims() {
        let statuses: Vec<InvoiceStatus> = parse_list(Some("SENT, overdue")).unwrap();
        assert_eq!(statuses, vec![InvoiceStatus::Sent, InvoiceStatus::Overdue]);
        assert!(parse_list::<InvoiceStatus>(None).unwrap().is_empty());
    }

    #[test]
    fn parse_list_rejects_unknown_values() {
        let result = parse_list::<InvoiceStatus>(Some("SENT,LOST"));
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}
