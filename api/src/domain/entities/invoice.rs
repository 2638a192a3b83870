//! Invoice aggregate
//!
//! An invoice is the bill issued to a patient. Its money fields are only ever
//! changed through [`Invoice::apply_totals`] (editing) and
//! [`Invoice::apply_settlement`] (payments, refunds, insurance credits), so
//! `total = subtotal - discount_total + tax_total` and
//! `amount_due = total - amount_paid >= 0` hold after every mutation.

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ids::{ClaimId, ClinicId, InsurerId, InvoiceId, PatientId, PaymentId, PaymentPlanId, PriceTableId, UserId};
use super::money::{discount_value, round_money, DiscountType};
use crate::error::DomainError;

/// Invoice status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Draft,
    Pending,
    Sent,
    PartiallyPaid,
    Paid,
    Overdue,
    Cancelled,
    Refunded,
}

impl InvoiceStatus {
    /// Statuses that still expect money from the patient
    pub const OPEN: [InvoiceStatus; 4] = [
        InvoiceStatus::Pending,
        InvoiceStatus::Sent,
        InvoiceStatus::PartiallyPaid,
        InvoiceStatus::Overdue,
    ];

    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InvoiceStatus::Draft => "DRAFT",
            InvoiceStatus::Pending => "PENDING",
            InvoiceStatus::Sent => "SENT",
            InvoiceStatus::PartiallyPaid => "PARTIALLY_PAID",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Overdue => "OVERDUE",
            InvoiceStatus::Cancelled => "CANCELLED",
            InvoiceStatus::Refunded => "REFUNDED",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DRAFT" => Ok(InvoiceStatus::Draft),
            "PENDING" => Ok(InvoiceStatus::Pending),
            "SENT" => Ok(InvoiceStatus::Sent),
            "PARTIALLY_PAID" => Ok(InvoiceStatus::PartiallyPaid),
            "PAID" => Ok(InvoiceStatus::Paid),
            "OVERDUE" => Ok(InvoiceStatus::Overdue),
            "CANCELLED" => Ok(InvoiceStatus::Cancelled),
            "REFUNDED" => Ok(InvoiceStatus::Refunded),
            _ => Err(format!("Unknown invoice status: {}", s)),
        }
    }
}

/// A billed line with its computed amounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItem {
    /// Service code used for price resolution, if any
    pub code: Option<String>,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount: Decimal,
    pub discount_type: DiscountType,
    pub subtotal: Decimal,
    pub discount_value: Decimal,
    pub total: Decimal,
}

impl InvoiceItem {
    /// Build an item and compute `subtotal`, `discount_value` and `total`
    pub fn compute(
        code: Option<String>,
        description: String,
        quantity: Decimal,
        unit_price: Decimal,
        discount: Decimal,
        discount_type: DiscountType,
    ) -> Result<Self, DomainError> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::Validation(format!(
                "Item '{}' quantity must be positive, got {}",
                description, quantity
            )));
        }
        if unit_price < Decimal::ZERO || discount < Decimal::ZERO {
            return Err(DomainError::Validation(format!(
                "Item '{}' price and discount must not be negative",
                description
            )));
        }
        if discount_type == DiscountType::Percentage && discount > Decimal::ONE_HUNDRED {
            return Err(DomainError::Validation(format!(
                "Item '{}' percentage discount {} exceeds 100",
                description, discount
            )));
        }

        let subtotal = round_money(quantity * unit_price);
        let discount_value = discount_value(subtotal, discount, discount_type);
        if discount_value > subtotal {
            return Err(DomainError::InvariantViolation(format!(
                "Item '{}' discount {} exceeds its subtotal {}",
                description, discount_value, subtotal
            )));
        }

        Ok(Self {
            code,
            description,
            quantity,
            unit_price,
            discount,
            discount_type,
            subtotal,
            discount_value,
            total: subtotal - discount_value,
        })
    }
}

/// A declared tax applied to the discounted subtotal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceTax {
    pub name: String,
    pub percentage: Decimal,
    pub value: Decimal,
}

/// Item as requested by a caller; `unit_price` may be left for price resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInvoiceItem {
    #[serde(default)]
    pub code: Option<String>,
    pub description: String,
    pub quantity: Decimal,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub discount: Option<Decimal>,
    #[serde(default)]
    pub discount_type: Option<DiscountType>,
}

/// Tax as requested by a caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTax {
    pub name: String,
    pub percentage: Decimal,
}

/// Result of the invoice arithmetic
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceTotals {
    pub items: Vec<InvoiceItem>,
    pub subtotal: Decimal,
    pub global_discount: Decimal,
    pub global_discount_type: DiscountType,
    pub discount_total: Decimal,
    pub taxes: Vec<InvoiceTax>,
    pub tax_total: Decimal,
    pub total: Decimal,
}

/// Compute invoice-level discount, taxes and total from already computed items
pub fn compute_totals(
    items: Vec<InvoiceItem>,
    global_discount: Decimal,
    global_discount_type: DiscountType,
    taxes: &[NewTax],
) -> Result<InvoiceTotals, DomainError> {
    if items.is_empty() {
        return Err(DomainError::Validation(
            "Invoice must have at least one item".to_string(),
        ));
    }
    if global_discount < Decimal::ZERO {
        return Err(DomainError::Validation(
            "Global discount must not be negative".to_string(),
        ));
    }

    let subtotal: Decimal = items.iter().map(|i| i.total).sum();
    let discount_total = discount_value(subtotal, global_discount, global_discount_type);
    if discount_total > subtotal {
        return Err(DomainError::InvariantViolation(format!(
            "Global discount {} exceeds invoice subtotal {}",
            discount_total, subtotal
        )));
    }

    let taxable = subtotal - discount_total;
    let mut computed_taxes = Vec::with_capacity(taxes.len());
    for tax in taxes {
        if tax.percentage < Decimal::ZERO {
            return Err(DomainError::Validation(format!(
                "Tax '{}' percentage must not be negative",
                tax.name
            )));
        }
        computed_taxes.push(InvoiceTax {
            name: tax.name.clone(),
            percentage: tax.percentage,
            value: round_money(taxable * tax.percentage / Decimal::ONE_HUNDRED),
        });
    }
    let tax_total: Decimal = computed_taxes.iter().map(|t| t.value).sum();

    Ok(InvoiceTotals {
        items,
        subtotal,
        global_discount,
        global_discount_type,
        discount_total,
        taxes: computed_taxes,
        tax_total,
        total: round_money(subtotal - discount_total + tax_total),
    })
}

/// Who moved money on an invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SettlementSource {
    Payment(PaymentId),
    Refund(PaymentId),
    Insurance(ClaimId),
}

/// A signed change to an invoice's paid amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// Positive credits the invoice, negative gives money back
    pub amount_delta: Decimal,
    pub source: SettlementSource,
}

impl Settlement {
    pub fn payment(payment_id: PaymentId, amount: Decimal) -> Self {
        Self {
            amount_delta: amount,
            source: SettlementSource::Payment(payment_id),
        }
    }

    pub fn refund(payment_id: PaymentId, amount: Decimal) -> Self {
        Self {
            amount_delta: -amount,
            source: SettlementSource::Refund(payment_id),
        }
    }

    pub fn insurance(claim_id: ClaimId, amount: Decimal) -> Self {
        Self {
            amount_delta: amount,
            source: SettlementSource::Insurance(claim_id),
        }
    }
}

/// Bill issued to a patient
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    /// Human number, `INV-<year>-<seq>` scoped per clinic per year
    pub invoice_number: String,
    pub clinic_id: ClinicId,
    pub patient_id: PatientId,
    pub insurer_id: Option<InsurerId>,
    pub consultation_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub price_table_id: Option<PriceTableId>,
    pub payment_plan_id: Option<PaymentPlanId>,
    pub has_payment_plan: bool,
    pub items: Vec<InvoiceItem>,
    pub subtotal: Decimal,
    pub global_discount: Decimal,
    pub global_discount_type: DiscountType,
    pub discount_total: Decimal,
    pub taxes: Vec<InvoiceTax>,
    pub tax_total: Decimal,
    pub total: Decimal,
    pub amount_paid: Decimal,
    pub amount_due: Decimal,
    /// Portion of `amount_paid` credited by insurance settlements
    pub insurance_coverage: Decimal,
    pub status: InvoiceStatus,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub paid_date: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<UserId>,
    pub notes: Option<String>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped by every persisted write
    pub version: i32,
}

impl Invoice {
    /// Only drafts and not-yet-sent invoices may have their items changed
    pub fn is_editable(&self) -> bool {
        matches!(self.status, InvoiceStatus::Draft | InvoiceStatus::Pending)
    }

    /// Whether a new payment may be started against this invoice
    pub fn accepts_payment(&self) -> bool {
        !matches!(
            self.status,
            InvoiceStatus::Cancelled | InvoiceStatus::Refunded | InvoiceStatus::Paid
        )
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Status as seen at `at`: open invoices past their due date read as OVERDUE
    pub fn effective_status(&self, at: DateTime<Utc>) -> InvoiceStatus {
        if self.status.is_open() && self.due_date < at {
            InvoiceStatus::Overdue
        } else {
            self.status
        }
    }

    /// Status an open invoice falls back to when nothing is paid
    fn unpaid_status(&self) -> InvoiceStatus {
        if self.sent_at.is_some() {
            InvoiceStatus::Sent
        } else {
            InvoiceStatus::Pending
        }
    }

    /// Recompute the status from the money fields alone
    pub fn derive_status(&self) -> InvoiceStatus {
        if self.status == InvoiceStatus::Cancelled {
            return InvoiceStatus::Cancelled;
        }
        if self.amount_paid > Decimal::ZERO {
            if self.amount_due <= Decimal::ZERO {
                InvoiceStatus::Paid
            } else {
                InvoiceStatus::PartiallyPaid
            }
        } else {
            match self.status {
                InvoiceStatus::Draft | InvoiceStatus::Refunded | InvoiceStatus::Overdue => {
                    self.status
                }
                _ => self.unpaid_status(),
            }
        }
    }

    /// Replace the computed money fields after an edit
    pub fn apply_totals(&mut self, totals: InvoiceTotals) -> Result<(), DomainError> {
        if totals.total < self.amount_paid {
            return Err(DomainError::InvariantViolation(format!(
                "Invoice {} total {} would fall below the {} already paid",
                self.invoice_number, totals.total, self.amount_paid
            )));
        }
        self.items = totals.items;
        self.subtotal = totals.subtotal;
        self.global_discount = totals.global_discount;
        self.global_discount_type = totals.global_discount_type;
        self.discount_total = totals.discount_total;
        self.taxes = totals.taxes;
        self.tax_total = totals.tax_total;
        self.total = totals.total;
        self.amount_due = self.total - self.amount_paid;
        Ok(())
    }

    /// The single entry point for every balance change on an invoice
    pub fn apply_settlement(
        &mut self,
        settlement: &Settlement,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let delta = settlement.amount_delta;
        if delta.is_zero() {
            return Err(DomainError::Validation(
                "Settlement amount must not be zero".to_string(),
            ));
        }

        if delta > Decimal::ZERO {
            if matches!(
                self.status,
                InvoiceStatus::Cancelled | InvoiceStatus::Refunded
            ) {
                return Err(DomainError::InvalidState(format!(
                    "Invoice {} is {} and accepts no further payment",
                    self.invoice_number, self.status
                )));
            }
            if delta > self.amount_due {
                return Err(DomainError::InvariantViolation(format!(
                    "Payment of {} exceeds balance due {} on invoice {}",
                    delta, self.amount_due, self.invoice_number
                )));
            }
        } else if -delta > self.amount_paid {
            return Err(DomainError::InvariantViolation(format!(
                "Refund of {} exceeds the {} paid on invoice {}",
                -delta, self.amount_paid, self.invoice_number
            )));
        }

        let was_paid = self.status == InvoiceStatus::Paid;
        self.amount_paid += delta;
        self.amount_due = (self.total - self.amount_paid).max(Decimal::ZERO);
        if let SettlementSource::Insurance(_) = settlement.source {
            self.insurance_coverage += delta;
        }

        self.status = if self.amount_paid <= Decimal::ZERO {
            self.paid_date = None;
            if was_paid && matches!(settlement.source, SettlementSource::Refund(_)) {
                InvoiceStatus::Refunded
            } else {
                self.unpaid_status()
            }
        } else if self.amount_due <= Decimal::ZERO {
            self.paid_date = Some(at);
            InvoiceStatus::Paid
        } else {
            self.paid_date = None;
            InvoiceStatus::PartiallyPaid
        };
        self.updated_at = at;
        Ok(())
    }

    /// DRAFT -> PENDING
    pub fn finalize(&mut self, at: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != InvoiceStatus::Draft {
            return Err(DomainError::InvalidState(format!(
                "Only DRAFT invoices can be finalized; invoice {} is {}",
                self.invoice_number, self.status
            )));
        }
        self.status = InvoiceStatus::Pending;
        self.updated_at = at;
        Ok(())
    }

    /// DRAFT/PENDING -> SENT; other open invoices keep their status and are re-sent
    pub fn mark_sent(&mut self, at: DateTime<Utc>) -> Result<(), DomainError> {
        match self.status {
            InvoiceStatus::Cancelled | InvoiceStatus::Refunded => {
                return Err(DomainError::InvalidState(format!(
                    "Invoice {} is {} and cannot be sent",
                    self.invoice_number, self.status
                )));
            }
            InvoiceStatus::Draft | InvoiceStatus::Pending => {
                self.status = InvoiceStatus::Sent;
            }
            _ => {}
        }
        self.sent_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// Mark cancelled; every paid amount must have been refunded first
    pub fn cancel(
        &mut self,
        reason: &str,
        actor: Option<UserId>,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if matches!(
            self.status,
            InvoiceStatus::Paid | InvoiceStatus::Cancelled | InvoiceStatus::Refunded
        ) {
            return Err(DomainError::InvalidState(format!(
                "Invoice {} is {} and cannot be cancelled",
                self.invoice_number, self.status
            )));
        }
        if self.amount_paid > Decimal::ZERO {
            return Err(DomainError::InvalidState(format!(
                "Invoice {} still holds {} in payments; refund them before cancelling",
                self.invoice_number, self.amount_paid
            )));
        }
        self.status = InvoiceStatus::Cancelled;
        self.cancelled_at = Some(at);
        self.cancellation_reason = Some(reason.to_string());
        self.cancelled_by = actor;
        self.updated_at = at;
        Ok(())
    }
}

/// Format an invoice number from its year and per-clinic sequence
pub fn format_invoice_number(at: DateTime<Utc>, sequence: u64) -> String {
    format!("INV-{}-{:06}", at.year(), sequence)
}

/// Data needed to create a new invoice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInvoice {
    pub clinic_id: ClinicId,
    pub patient_id: PatientId,
    #[serde(default)]
    pub insurer_id: Option<InsurerId>,
    #[serde(default)]
    pub consultation_id: Option<Uuid>,
    #[serde(default)]
    pub appointment_id: Option<Uuid>,
    /// Explicit table for items that omit `unit_price`
    #[serde(default)]
    pub price_table_id: Option<PriceTableId>,
    pub items: Vec<NewInvoiceItem>,
    #[serde(default)]
    pub global_discount: Option<Decimal>,
    #[serde(default)]
    pub global_discount_type: Option<DiscountType>,
    #[serde(default)]
    pub taxes: Vec<NewTax>,
    #[serde(default)]
    pub issue_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Send to the patient right after creation
    #[serde(default)]
    pub send_to_patient: bool,
}

/// Editable fields of an invoice; `None` keeps the current value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceUpdate {
    #[serde(default)]
    pub items: Option<Vec<NewInvoiceItem>>,
    #[serde(default)]
    pub global_discount: Option<Decimal>,
    #[serde(default)]
    pub global_discount_type: Option<DiscountType>,
    #[serde(default)]
    pub taxes: Option<Vec<NewTax>>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Query filter for invoice listings and reports
#[derive(Debug, Clone, Default)]
pub struct InvoiceFilter {
    pub clinic_id: Option<ClinicId>,
    pub patient_id: Option<PatientId>,
    pub insurer_id: Option<InsurerId>,
    pub statuses: Vec<InvoiceStatus>,
    pub issued_from: Option<DateTime<Utc>>,
    pub issued_to: Option<DateTime<Utc>>,
}

impl InvoiceFilter {
    /// In-memory evaluation of the filter (soft-deleted invoices never match)
    pub fn matches(&self, invoice: &Invoice) -> bool {
        !invoice.is_deleted()
            && self.clinic_id.map_or(true, |c| invoice.clinic_id == c)
            && self.patient_id.map_or(true, |p| invoice.patient_id == p)
            && self.insurer_id.map_or(true, |i| invoice.insurer_id == Some(i))
            && (self.statuses.is_empty() || self.statuses.contains(&invoice.status))
            && self.issued_from.map_or(true, |from| invoice.issue_date >= from)
            && self.issued_to.map_or(true, |to| invoice.issue_date <= to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_invoice;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn item(qty: Decimal, price: Decimal, discount: Decimal, kind: DiscountType) -> InvoiceItem {
        InvoiceItem::compute(None, "Consulta".to_string(), qty, price, discount, kind).unwrap()
    }

    #[test]
    fn two_item_scenario_totals() {
        let items = vec![
            item(dec!(2), dec!(100), Decimal::ZERO, DiscountType::Fixed),
            item(dec!(1), dec!(50), dec!(10), DiscountType::Percentage),
        ];
        let totals = compute_totals(items, Decimal::ZERO, DiscountType::Fixed, &[]).unwrap();

        assert_eq!(totals.subtotal, dec!(245));
        assert_eq!(totals.discount_total, Decimal::ZERO);
        assert_eq!(totals.tax_total, Decimal::ZERO);
        assert_eq!(totals.total, dec!(245));
    }

    #[test]
    fn taxes_apply_after_global_discount() {
        let items = vec![item(dec!(1), dec!(200), Decimal::ZERO, DiscountType::Fixed)];
        let taxes = vec![
            NewTax {
                name: "ISS".to_string(),
                percentage: dec!(5),
            },
            NewTax {
                name: "PIS".to_string(),
                percentage: dec!(0.65),
            },
        ];
        let totals = compute_totals(items, dec!(10), DiscountType::Percentage, &taxes).unwrap();

        assert_eq!(totals.discount_total, dec!(20.00));
        assert_eq!(totals.taxes[0].value, dec!(9.00));
        assert_eq!(totals.taxes[1].value, dec!(1.17));
        assert_eq!(totals.tax_total, dec!(10.17));
        assert_eq!(
            totals.total,
            totals.subtotal - totals.discount_total + totals.tax_total
        );
        assert_eq!(totals.total, dec!(190.17));
    }

    #[test]
    fn total_identity_holds_for_varied_items() {
        let cases = [
            (dec!(3), dec!(33.33), dec!(12.5), DiscountType::Percentage),
            (dec!(1.5), dec!(19.99), dec!(2), DiscountType::Fixed),
            (dec!(7), dec!(0.01), Decimal::ZERO, DiscountType::Fixed),
        ];
        let items: Vec<_> = cases
            .iter()
            .map(|(q, p, d, k)| item(*q, *p, *d, *k))
            .collect();
        let taxes = vec![NewTax {
            name: "ISS".to_string(),
            percentage: dec!(2.5),
        }];
        let totals = compute_totals(items, dec!(3.33), DiscountType::Fixed, &taxes).unwrap();

        assert_eq!(
            totals.total,
            totals.subtotal - totals.discount_total + totals.tax_total
        );
        assert_eq!(totals.total, totals.total.round_dp(2));
    }

    #[test]
    fn global_discount_larger_than_subtotal_is_rejected() {
        let items = vec![item(dec!(1), dec!(50), Decimal::ZERO, DiscountType::Fixed)];
        let result = compute_totals(items, dec!(60), DiscountType::Fixed, &[]);
        assert!(matches!(result, Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn empty_item_list_is_rejected() {
        let result = compute_totals(vec![], Decimal::ZERO, DiscountType::Fixed, &[]);
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn item_with_zero_quantity_is_rejected() {
        let result = InvoiceItem::compute(
            None,
            "x".to_string(),
            Decimal::ZERO,
            dec!(10),
            Decimal::ZERO,
            DiscountType::Fixed,
        );
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn partial_then_full_payment() {
        let mut invoice = test_invoice(dec!(245));
        let now = Utc::now();

        invoice
            .apply_settlement(&Settlement::payment(PaymentId::new(), dec!(100)), now)
            .unwrap();
        assert_eq!(invoice.amount_paid, dec!(100));
        assert_eq!(invoice.amount_due, dec!(145));
        assert_eq!(invoice.status, InvoiceStatus::PartiallyPaid);
        assert!(invoice.paid_date.is_none());

        invoice
            .apply_settlement(&Settlement::payment(PaymentId::new(), dec!(145)), now)
            .unwrap();
        assert_eq!(invoice.amount_due, Decimal::ZERO);
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert_eq!(invoice.paid_date, Some(now));
    }

    #[test]
    fn overpayment_is_rejected() {
        let mut invoice = test_invoice(dec!(100));
        let result =
            invoice.apply_settlement(&Settlement::payment(PaymentId::new(), dec!(100.01)), Utc::now());
        assert!(matches!(result, Err(DomainError::InvariantViolation(_))));
        assert_eq!(invoice.amount_paid, Decimal::ZERO);
    }

    #[test]
    fn full_refund_of_paid_invoice_marks_refunded() {
        let mut invoice = test_invoice(dec!(100));
        let payment = PaymentId::new();
        let now = Utc::now();
        invoice
            .apply_settlement(&Settlement::payment(payment, dec!(100)), now)
            .unwrap();
        invoice
            .apply_settlement(&Settlement::refund(payment, dec!(100)), now)
            .unwrap();

        assert_eq!(invoice.status, InvoiceStatus::Refunded);
        assert_eq!(invoice.amount_due, dec!(100));
        assert!(invoice.paid_date.is_none());
    }

    #[test]
    fn partial_refund_of_paid_invoice_reopens_balance() {
        let mut invoice = test_invoice(dec!(100));
        let payment = PaymentId::new();
        let now = Utc::now();
        invoice
            .apply_settlement(&Settlement::payment(payment, dec!(100)), now)
            .unwrap();
        invoice
            .apply_settlement(&Settlement::refund(payment, dec!(30)), now)
            .unwrap();

        assert_eq!(invoice.status, InvoiceStatus::PartiallyPaid);
        assert_eq!(invoice.amount_paid, dec!(70));
        assert_eq!(invoice.amount_due, dec!(30));
    }

    #[test]
    fn refund_of_partially_paid_invoice_returns_to_unpaid_status() {
        let mut invoice = test_invoice(dec!(100));
        invoice.sent_at = Some(Utc::now());
        invoice.status = InvoiceStatus::Sent;
        let payment = PaymentId::new();
        let now = Utc::now();
        invoice
            .apply_settlement(&Settlement::payment(payment, dec!(40)), now)
            .unwrap();
        invoice
            .apply_settlement(&Settlement::refund(payment, dec!(40)), now)
            .unwrap();

        assert_eq!(invoice.status, InvoiceStatus::Sent);
    }

    #[test]
    fn insurance_credit_tracks_coverage() {
        let mut invoice = test_invoice(dec!(300));
        invoice
            .apply_settlement(&Settlement::insurance(ClaimId::new(), dec!(200)), Utc::now())
            .unwrap();
        assert_eq!(invoice.insurance_coverage, dec!(200));
        assert_eq!(invoice.amount_due, dec!(100));
    }

    #[test]
    fn derived_status_matches_stored_after_each_settlement() {
        let mut invoice = test_invoice(dec!(120));
        let p1 = PaymentId::new();
        let p2 = PaymentId::new();
        let now = Utc::now();
        let steps = [
            Settlement::payment(p1, dec!(20)),
            Settlement::payment(p2, dec!(100)),
            Settlement::refund(p2, dec!(50)),
            Settlement::refund(p1, dec!(20)),
            Settlement::refund(p2, dec!(50)),
        ];
        for step in steps.iter() {
            invoice.apply_settlement(step, now).unwrap();
            assert_eq!(invoice.derive_status(), invoice.status);
            assert_eq!(invoice.derive_status(), invoice.derive_status());
            assert!(invoice.amount_due >= Decimal::ZERO);
        }
    }

    #[test]
    fn effective_status_classifies_overdue() {
        let mut invoice = test_invoice(dec!(50));
        invoice.status = InvoiceStatus::Sent;
        invoice.due_date = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(invoice.effective_status(later), InvoiceStatus::Overdue);
        assert_eq!(invoice.effective_status(earlier), InvoiceStatus::Sent);

        invoice.status = InvoiceStatus::Paid;
        assert_eq!(invoice.effective_status(later), InvoiceStatus::Paid);
    }

    #[test]
    fn send_moves_draft_to_sent() {
        let mut invoice = test_invoice(dec!(50));
        invoice.mark_sent(Utc::now()).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Sent);
        assert!(invoice.sent_at.is_some());
    }

    #[test]
    fn cannot_cancel_with_outstanding_payments() {
        let mut invoice = test_invoice(dec!(50));
        invoice
            .apply_settlement(&Settlement::payment(PaymentId::new(), dec!(10)), Utc::now())
            .unwrap();
        let result = invoice.cancel("duplicate", None, Utc::now());
        assert!(matches!(result, Err(DomainError::InvalidState(_))));
    }

    #[test]
    fn edit_cannot_drop_total_below_paid() {
        let mut invoice = test_invoice(dec!(100));
        invoice
            .apply_settlement(&Settlement::payment(PaymentId::new(), dec!(80)), Utc::now())
            .unwrap();
        let items = vec![item(dec!(1), dec!(50), Decimal::ZERO, DiscountType::Fixed)];
        let totals = compute_totals(items, Decimal::ZERO, DiscountType::Fixed, &[]).unwrap();
        assert!(matches!(
            invoice.apply_totals(totals),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn invoice_number_format() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(format_invoice_number(at, 42), "INV-2026-000042");
    }

    #[test]
    fn invoice_status_round_trips_through_strings() {
        for status in [
            InvoiceStatus::Draft,
            InvoiceStatus::PartiallyPaid,
            InvoiceStatus::Refunded,
        ] {
            assert_eq!(status.to_string().parse::<InvoiceStatus>().unwrap(), status);
        }
        assert!("settled".parse::<InvoiceStatus>().is_err());
    }

    #[test]
    fn filter_excludes_deleted_invoices() {
        let mut invoice = test_invoice(dec!(10));
        let filter = InvoiceFilter::default();
        assert!(filter.matches(&invoice));
        invoice.deleted_at = Some(Utc::now());
        assert!(!filter.matches(&invoice));
    }
}
