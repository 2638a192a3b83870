//! PostgreSQL adapter for InvoiceRepository

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};

use super::{db_err, from_db_time, from_json, parse_column, stale_write, to_db_time, to_json};
use crate::domain::entities::{Invoice, InvoiceFilter, InvoiceId};
use crate::domain::ports::InvoiceRepository;
use crate::entity::invoices;
use crate::error::DomainError;

/// PostgreSQL implementation of InvoiceRepository
pub struct PostgresInvoiceRepository {
    db: DatabaseConnection,
}

impl PostgresInvoiceRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

/// Write `invoice` if the stored row still carries its version
pub(crate) async fn update_invoice<C: ConnectionTrait>(
    conn: &C,
    invoice: &Invoice,
) -> Result<Invoice, DomainError> {
    let mut model = active_model(invoice)?;
    model.id = NotSet;
    model.version = Set(invoice.version + 1);

    let result = invoices::Entity::update_many()
        .set(model)
        .filter(invoices::Column::Id.eq(invoice.id.0))
        .filter(invoices::Column::Version.eq(invoice.version))
        .exec(conn)
        .await
        .map_err(db_err)?;

    if result.rows_affected == 0 {
        let exists = invoices::Entity::find_by_id(invoice.id.0)
            .count(conn)
            .await
            .map_err(db_err)?
            > 0;
        return Err(stale_write("Invoice", invoice.id, exists));
    }

    let mut updated = invoice.clone();
    updated.version += 1;
    Ok(updated)
}

#[async_trait]
impl InvoiceRepository for PostgresInvoiceRepository {
    async fn find_by_id(&self, id: &InvoiceId) -> Result<Option<Invoice>, DomainError> {
        let result = invoices::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .map_err(db_err)?;

        result.map(Invoice::try_from).transpose()
    }

    async fn find_by_ids(&self, ids: &[InvoiceId]) -> Result<Vec<Invoice>, DomainError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let results = invoices::Entity::find()
            .filter(invoices::Column::Id.is_in(ids.iter().map(|id| id.0)))
            .all(&self.db)
            .await
            .map_err(db_err)?;

        results.into_iter().map(Invoice::try_from).collect()
    }

    async fn list(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, DomainError> {
        let mut query = invoices::Entity::find().filter(invoices::Column::DeletedAt.is_null());
        if let Some(clinic_id) = filter.clinic_id {
            query = query.filter(invoices::Column::ClinicId.eq(clinic_id.0));
        }
        if let Some(patient_id) = filter.patient_id {
            query = query.filter(invoices::Column::PatientId.eq(patient_id.0));
        }
        if let Some(insurer_id) = filter.insurer_id {
            query = query.filter(invoices::Column::InsurerId.eq(insurer_id.0));
        }
        if !filter.statuses.is_empty() {
            query = query.filter(
                invoices::Column::Status.is_in(filter.statuses.iter().map(|s| s.to_string())),
            );
        }
        if let Some(from) = filter.issued_from {
            query = query.filter(invoices::Column::IssueDate.gte(to_db_time(from)));
        }
        if let Some(to) = filter.issued_to {
            query = query.filter(invoices::Column::IssueDate.lte(to_db_time(to)));
        }

        let results = query
            .order_by_desc(invoices::Column::IssueDate)
            .all(&self.db)
            .await
            .map_err(db_err)?;

        results.into_iter().map(Invoice::try_from).collect()
    }

    async fn create(&self, invoice: &Invoice) -> Result<Invoice, DomainError> {
        let model = active_model(invoice)?
            .insert(&self.db)
            .await
            .map_err(db_err)?;

        model.try_into()
    }

    async fn update(&self, invoice: &Invoice) -> Result<Invoice, DomainError> {
        update_invoice(&self.db, invoice).await
    }
}

fn active_model(invoice: &Invoice) -> Result<invoices::ActiveModel, DomainError> {
    Ok(invoices::ActiveModel {
        id: Set(invoice.id.0),
        invoice_number: Set(invoice.invoice_number.clone()),
        clinic_id: Set(invoice.clinic_id.0),
        patient_id: Set(invoice.patient_id.0),
        insurer_id: Set(invoice.insurer_id.map(|i| i.0)),
        consultation_id: Set(invoice.consultation_id),
        appointment_id: Set(invoice.appointment_id),
        price_table_id: Set(invoice.price_table_id.map(|t| t.0)),
        payment_plan_id: Set(invoice.payment_plan_id.map(|p| p.0)),
        has_payment_plan: Set(invoice.has_payment_plan),
        items: Set(to_json(&invoice.items)?),
        subtotal: Set(invoice.subtotal),
        global_discount: Set(invoice.global_discount),
        global_discount_type: Set(invoice.global_discount_type.to_string()),
        discount_total: Set(invoice.discount_total),
        taxes: Set(to_json(&invoice.taxes)?),
        tax_total: Set(invoice.tax_total),
        total: Set(invoice.total),
        amount_paid: Set(invoice.amount_paid),
        amount_due: Set(invoice.amount_due),
        insurance_coverage: Set(invoice.insurance_coverage),
        status: Set(invoice.status.to_string()),
        issue_date: Set(to_db_time(invoice.issue_date)),
        due_date: Set(to_db_time(invoice.due_date)),
        paid_date: Set(invoice.paid_date.map(to_db_time)),
        sent_at: Set(invoice.sent_at.map(to_db_time)),
        cancelled_at: Set(invoice.cancelled_at.map(to_db_time)),
        cancellation_reason: Set(invoice.cancellation_reason.clone()),
        cancelled_by: Set(invoice.cancelled_by.map(|u| u.0)),
        notes: Set(invoice.notes.clone()),
        created_by: Set(invoice.created_by.map(|u| u.0)),
        created_at: Set(to_db_time(invoice.created_at)),
        updated_at: Set(to_db_time(invoice.updated_at)),
        deleted_at: Set(invoice.deleted_at.map(to_db_time)),
        version: Set(invoice.version),
    })
}

/// Convert SeaORM model to domain entity
impl TryFrom<invoices::Model> for Invoice {
    type Error = DomainError;

    fn try_from(model: invoices::Model) -> Result<Self, Self::Error> {
        Ok(Invoice {
            id: model.id.into(),
            invoice_number: model.invoice_number,
            clinic_id: model.clinic_id.into(),
            patient_id: model.patient_id.into(),
            insurer_id: model.insurer_id.map(Into::into),
            consultation_id: model.consultation_id,
            appointment_id: model.appointment_id,
            price_table_id: model.price_table_id.map(Into::into),
            payment_plan_id: model.payment_plan_id.map(Into::into),
            has_payment_plan: model.has_payment_plan,
            items: from_json(model.items, "invoices.items")?,
            subtotal: model.subtotal,
            global_discount: model.global_discount,
            global_discount_type: parse_column(
                &model.global_discount_type,
                "invoices.global_discount_type",
            )?,
            discount_total: model.discount_total,
            taxes: from_json(model.taxes, "invoices.taxes")?,
            tax_total: model.tax_total,
            total: model.total,
            amount_paid: model.amount_paid,
            amount_due: model.amount_due,
            insurance_coverage: model.insurance_coverage,
            status: parse_column(&model.status, "invoices.status")?,
            issue_date: from_db_time(model.issue_date),
            due_date: from_db_time(model.due_date),
            paid_date: model.paid_date.map(from_db_time),
            sent_at: model.sent_at.map(from_db_time),
            cancelled_at: model.cancelled_at.map(from_db_time),
            cancellation_reason: model.cancellation_reason,
            cancelled_by: model.cancelled_by.map(Into::into),
            notes: model.notes,
            created_by: model.created_by.map(Into::into),
            created_at: from_db_time(model.created_at),
            updated_at: from_db_time(model.updated_at),
            deleted_at: model.deleted_at.map(from_db_time),
            version: model.version,
        })
    }
}
