//! Test fixtures
//!
//! Factory functions for creating test data with sensible defaults.
//! Each fixture function creates a valid entity that can be customized.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::domain::entities::{
    ClaimId, ClaimStatus, ClinicId, DiscountType, InsuranceClaim, InsurerId, Invoice, InvoiceId,
    InvoiceItem, InvoiceStatus, NewInvoice, NewInvoiceItem, PatientId, Payment, PaymentId,
    PaymentMethod, PaymentStatus, PriceTable, PriceTableId, PriceTableItem, PriceTableType,
};

/// The instant every test harness starts at: 2026-05-01 12:00 UTC
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
}

/// A DRAFT invoice with a single item worth `total` and nothing paid
pub fn test_invoice(total: Decimal) -> Invoice {
    let now = fixed_now();
    let item = InvoiceItem::compute(
        None,
        "Consulta".to_string(),
        Decimal::ONE,
        total,
        Decimal::ZERO,
        DiscountType::Fixed,
    )
    .unwrap();
    Invoice {
        id: InvoiceId::new(),
        invoice_number: "INV-2026-900001".to_string(),
        clinic_id: ClinicId::new(),
        patient_id: PatientId::new(),
        insurer_id: None,
        consultation_id: None,
        appointment_id: None,
        price_table_id: None,
        payment_plan_id: None,
        has_payment_plan: false,
        items: vec![item],
        subtotal: total,
        global_discount: Decimal::ZERO,
        global_discount_type: DiscountType::Fixed,
        discount_total: Decimal::ZERO,
        taxes: vec![],
        tax_total: Decimal::ZERO,
        total,
        amount_paid: Decimal::ZERO,
        amount_due: total,
        insurance_coverage: Decimal::ZERO,
        status: InvoiceStatus::Draft,
        issue_date: now,
        due_date: now + Duration::days(30),
        paid_date: None,
        sent_at: None,
        cancelled_at: None,
        cancellation_reason: None,
        cancelled_by: None,
        notes: None,
        created_by: None,
        created_at: now,
        updated_at: now,
        deleted_at: None,
        version: 0,
    }
}

/// A PENDING cash payment of `amount`
pub fn test_payment(invoice_id: InvoiceId, amount: Decimal) -> Payment {
    let now = fixed_now();
    Payment {
        id: PaymentId::new(),
        invoice_id,
        clinic_id: ClinicId::new(),
        patient_id: PatientId::new(),
        amount,
        surcharge: Decimal::ZERO,
        refunded_amount: Decimal::ZERO,
        method: PaymentMethod::Cash,
        status: PaymentStatus::Pending,
        details: None,
        is_manual: true,
        installment: None,
        paid_at: None,
        failed_at: None,
        failure_reason: None,
        refunded_at: None,
        refund_reason: None,
        refunds: Vec::new(),
        notes: None,
        created_by: None,
        created_at: now,
        updated_at: now,
        version: 0,
    }
}

/// A DRAFT claim over `total`
pub fn test_claim(invoice_id: InvoiceId, total: Decimal) -> InsuranceClaim {
    let now = fixed_now();
    InsuranceClaim {
        id: ClaimId::new(),
        claim_number: "CLM-2026-900001".to_string(),
        clinic_id: ClinicId::new(),
        invoice_id,
        insurer_id: InsurerId::new(),
        patient_id: PatientId::new(),
        batch_id: None,
        status: ClaimStatus::Draft,
        total_amount: total,
        approved_amount: None,
        paid_amount: None,
        denial_reason: None,
        appeal_justification: None,
        appeal_evidence: vec![],
        submitted_at: None,
        reviewed_at: None,
        appealed_at: None,
        paid_at: None,
        notes: None,
        created_by: None,
        created_at: now,
        updated_at: now,
        version: 0,
    }
}

/// An active default table valid for a year around `fixed_now`
pub fn test_price_table(
    table_type: PriceTableType,
    insurer_id: Option<InsurerId>,
    items: &[(&str, Decimal)],
) -> PriceTable {
    let now = fixed_now();
    PriceTable {
        id: PriceTableId::new(),
        clinic_id: None,
        name: format!("{} 2026", table_type),
        table_type,
        insurer_id,
        is_default: true,
        is_active: true,
        multiplier: None,
        valid_from: now - Duration::days(30),
        valid_until: Some(now + Duration::days(365)),
        items: items
            .iter()
            .map(|(code, price)| PriceTableItem {
                code: code.to_string(),
                tuss_code: None,
                cbhpm_code: None,
                description: None,
                price: *price,
            })
            .collect(),
        created_at: now,
        updated_at: now,
    }
}

/// Item with an explicit price and no discount
pub fn plain_item(description: &str, quantity: Decimal, unit_price: Decimal) -> NewInvoiceItem {
    NewInvoiceItem {
        code: None,
        description: description.to_string(),
        quantity,
        unit_price: Some(unit_price),
        discount: None,
        discount_type: None,
    }
}

/// Invoice request for a fresh patient with no discount or taxes
pub fn new_invoice(items: Vec<NewInvoiceItem>) -> NewInvoice {
    NewInvoice {
        clinic_id: ClinicId::new(),
        patient_id: PatientId::new(),
        insurer_id: None,
        consultation_id: None,
        appointment_id: None,
        price_table_id: None,
        items,
        global_discount: None,
        global_discount_type: None,
        taxes: vec![],
        issue_date: None,
        due_date: None,
        notes: None,
        send_to_patient: false,
    }
}
