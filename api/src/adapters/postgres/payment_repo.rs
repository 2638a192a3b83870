//! PostgreSQL adapter for PaymentRepository

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};

use super::{db_err, from_db_time, from_json, parse_column, stale_write, to_db_time, to_json};
use crate::domain::entities::{
    InstallmentRef, InvoiceId, Payment, PaymentFilter, PaymentId, PaymentPlanId,
};
use crate::domain::ports::PaymentRepository;
use crate::entity::payments;
use crate::error::DomainError;

/// PostgreSQL implementation of PaymentRepository
pub struct PostgresPaymentRepository {
    db: DatabaseConnection,
}

impl PostgresPaymentRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

pub(crate) async fn insert_payment<C: ConnectionTrait>(
    conn: &C,
    payment: &Payment,
) -> Result<Payment, DomainError> {
    let model = active_model(payment)?.insert(conn).await.map_err(db_err)?;
    model.try_into()
}

/// Write `payment` if the stored row still carries its version
pub(crate) async fn update_payment<C: ConnectionTrait>(
    conn: &C,
    payment: &Payment,
) -> Result<Payment, DomainError> {
    let mut model = active_model(payment)?;
    model.id = NotSet;
    model.version = Set(payment.version + 1);

    let result = payments::Entity::update_many()
        .set(model)
        .filter(payments::Column::Id.eq(payment.id.0))
        .filter(payments::Column::Version.eq(payment.version))
        .exec(conn)
        .await
        .map_err(db_err)?;

    if result.rows_affected == 0 {
        let exists = payments::Entity::find_by_id(payment.id.0)
            .count(conn)
            .await
            .map_err(db_err)?
            > 0;
        return Err(stale_write("Payment", payment.id, exists));
    }

    let mut updated = payment.clone();
    updated.version += 1;
    Ok(updated)
}

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError> {
        let result = payments::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .map_err(db_err)?;

        result.map(Payment::try_from).transpose()
    }

    async fn list_by_invoice(&self, invoice_id: &InvoiceId) -> Result<Vec<Payment>, DomainError> {
        let results = payments::Entity::find()
            .filter(payments::Column::InvoiceId.eq(invoice_id.0))
            .order_by_asc(payments::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_err)?;

        results.into_iter().map(Payment::try_from).collect()
    }

    async fn list(&self, filter: &PaymentFilter) -> Result<Vec<Payment>, DomainError> {
        let mut query = payments::Entity::find();
        if let Some(clinic_id) = filter.clinic_id {
            query = query.filter(payments::Column::ClinicId.eq(clinic_id.0));
        }
        if let Some(invoice_id) = filter.invoice_id {
            query = query.filter(payments::Column::InvoiceId.eq(invoice_id.0));
        }
        if !filter.statuses.is_empty() {
            query = query.filter(
                payments::Column::Status.is_in(filter.statuses.iter().map(|s| s.to_string())),
            );
        }
        if let Some(to) = filter.active_to {
            query = query.filter(payments::Column::CreatedAt.lte(to_db_time(to)));
        }
        if let Some(from) = filter.active_from.map(to_db_time) {
            query = query.filter(
                Condition::any()
                    .add(payments::Column::CreatedAt.gte(from))
                    .add(payments::Column::PaidAt.gte(from))
                    .add(payments::Column::RefundedAt.gte(from)),
            );
        }

        let results = query
            .order_by_asc(payments::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_err)?;

        results.into_iter().map(Payment::try_from).collect()
    }

    async fn create(&self, payment: &Payment) -> Result<Payment, DomainError> {
        insert_payment(&self.db, payment).await
    }

    async fn update(&self, payment: &Payment) -> Result<Payment, DomainError> {
        update_payment(&self.db, payment).await
    }
}

fn active_model(payment: &Payment) -> Result<payments::ActiveModel, DomainError> {
    Ok(payments::ActiveModel {
        id: Set(payment.id.0),
        invoice_id: Set(payment.invoice_id.0),
        clinic_id: Set(payment.clinic_id.0),
        patient_id: Set(payment.patient_id.0),
        amount: Set(payment.amount),
        surcharge: Set(payment.surcharge),
        refunded_amount: Set(payment.refunded_amount),
        method: Set(payment.method.to_string()),
        status: Set(payment.status.to_string()),
        details: Set(payment.details.as_ref().map(to_json).transpose()?),
        is_manual: Set(payment.is_manual),
        plan_id: Set(payment.installment.map(|i| i.plan_id.0)),
        installment_number: Set(payment.installment.map(|i| i.number as i32)),
        paid_at: Set(payment.paid_at.map(to_db_time)),
        failed_at: Set(payment.failed_at.map(to_db_time)),
        failure_reason: Set(payment.failure_reason.clone()),
        refunded_at: Set(payment.refunded_at.map(to_db_time)),
        refund_reason: Set(payment.refund_reason.map(|r| r.to_string())),
        refunds: Set(to_json(&payment.refunds)?),
        notes: Set(payment.notes.clone()),
        created_by: Set(payment.created_by.map(|u| u.0)),
        created_at: Set(to_db_time(payment.created_at)),
        updated_at: Set(to_db_time(payment.updated_at)),
        version: Set(payment.version),
    })
}

/// Convert SeaORM model to domain entity
impl TryFrom<payments::Model> for Payment {
    type Error = DomainError;

    fn try_from(model: payments::Model) -> Result<Self, Self::Error> {
        let installment = match (model.plan_id, model.installment_number) {
            (Some(plan_id), Some(number)) => Some(InstallmentRef {
                plan_id: PaymentPlanId(plan_id),
                number: number as u32,
            }),
            _ => None,
        };

        Ok(Payment {
            id: model.id.into(),
            invoice_id: model.invoice_id.into(),
            clinic_id: model.clinic_id.into(),
            patient_id: model.patient_id.into(),
            amount: model.amount,
            surcharge: model.surcharge,
            refunded_amount: model.refunded_amount,
            method: parse_column(&model.method, "payments.method")?,
            status: parse_column(&model.status, "payments.status")?,
            details: model
                .details
                .map(|d| from_json(d, "payments.details"))
                .transpose()?,
            is_manual: model.is_manual,
            installment,
            paid_at: model.paid_at.map(from_db_time),
            failed_at: model.failed_at.map(from_db_time),
            failure_reason: model.failure_reason,
            refunded_at: model.refunded_at.map(from_db_time),
            refund_reason: model
                .refund_reason
                .map(|r| parse_column(&r, "payments.refund_reason"))
                .transpose()?,
            refunds: from_json(model.refunds, "payments.refunds")?,
            notes: model.notes,
            created_by: model.created_by.map(Into::into),
            created_at: from_db_time(model.created_at),
            updated_at: from_db_time(model.updated_at),
            version: model.version,
        })
    }
}
