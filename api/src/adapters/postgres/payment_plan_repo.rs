//! PostgreSQL adapter for PaymentPlanRepository

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, Set,
};

use super::{db_err, from_db_time, from_json, parse_column, stale_write, to_db_time, to_json};
use crate::domain::entities::{InvoiceId, PaymentPlan, PaymentPlanId, PlanStatus};
use crate::domain::ports::PaymentPlanRepository;
use crate::entity::payment_plans;
use crate::error::DomainError;

/// PostgreSQL implementation of PaymentPlanRepository
pub struct PostgresPaymentPlanRepository {
    db: DatabaseConnection,
}

impl PostgresPaymentPlanRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

pub(crate) async fn insert_plan<C: ConnectionTrait>(
    conn: &C,
    plan: &PaymentPlan,
) -> Result<PaymentPlan, DomainError> {
    let model = active_model(plan)?.insert(conn).await.map_err(db_err)?;
    model.try_into()
}

/// Write `plan` if the stored row still carries its version
pub(crate) async fn update_plan<C: ConnectionTrait>(
    conn: &C,
    plan: &PaymentPlan,
) -> Result<PaymentPlan, DomainError> {
    let mut model = active_model(plan)?;
    model.id = NotSet;
    model.version = Set(plan.version + 1);

    let result = payment_plans::Entity::update_many()
        .set(model)
        .filter(payment_plans::Column::Id.eq(plan.id.0))
        .filter(payment_plans::Column::Version.eq(plan.version))
        .exec(conn)
        .await
        .map_err(db_err)?;

    if result.rows_affected == 0 {
        let exists = payment_plans::Entity::find_by_id(plan.id.0)
            .count(conn)
            .await
            .map_err(db_err)?
            > 0;
        return Err(stale_write("Payment plan", plan.id, exists));
    }

    let mut updated = plan.clone();
    updated.version += 1;
    Ok(updated)
}

#[async_trait]
impl PaymentPlanRepository for PostgresPaymentPlanRepository {
    async fn find_by_id(&self, id: &PaymentPlanId) -> Result<Option<PaymentPlan>, DomainError> {
        let result = payment_plans::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .map_err(db_err)?;

        result.map(PaymentPlan::try_from).transpose()
    }

    async fn find_active_by_invoice(
        &self,
        invoice_id: &InvoiceId,
    ) -> Result<Option<PaymentPlan>, DomainError> {
        let result = payment_plans::Entity::find()
            .filter(payment_plans::Column::InvoiceId.eq(invoice_id.0))
            .filter(payment_plans::Column::Status.eq(PlanStatus::Active.to_string()))
            .one(&self.db)
            .await
            .map_err(db_err)?;

        result.map(PaymentPlan::try_from).transpose()
    }

    async fn create(&self, plan: &PaymentPlan) -> Result<PaymentPlan, DomainError> {
        insert_plan(&self.db, plan).await
    }

    async fn update(&self, plan: &PaymentPlan) -> Result<PaymentPlan, DomainError> {
        update_plan(&self.db, plan).await
    }
}

fn active_model(plan: &PaymentPlan) -> Result<payment_plans::ActiveModel, DomainError> {
    Ok(payment_plans::ActiveModel {
        id: Set(plan.id.0),
        invoice_id: Set(plan.invoice_id.0),
        clinic_id: Set(plan.clinic_id.0),
        patient_id: Set(plan.patient_id.0),
        status: Set(plan.status.to_string()),
        installments_count: Set(plan.installments_count as i32),
        installment_amount: Set(plan.installment_amount),
        down_payment: Set(plan.down_payment),
        financed_amount: Set(plan.financed_amount),
        monthly_interest_rate: Set(plan.monthly_interest_rate),
        total_amount: Set(plan.total_amount),
        paid_installments: Set(plan.paid_installments as i32),
        pending_installments: Set(plan.pending_installments as i32),
        total_paid: Set(plan.total_paid),
        total_pending: Set(plan.total_pending),
        first_due_date: Set(to_db_time(plan.first_due_date)),
        due_day: Set(plan.due_day.map(|d| d as i32)),
        installments: Set(to_json(&plan.installments)?),
        created_by: Set(plan.created_by.map(|u| u.0)),
        created_at: Set(to_db_time(plan.created_at)),
        updated_at: Set(to_db_time(plan.updated_at)),
        completed_at: Set(plan.completed_at.map(to_db_time)),
        cancelled_at: Set(plan.cancelled_at.map(to_db_time)),
        version: Set(plan.version),
    })
}

/// Convert SeaORM model to domain entity
impl TryFrom<payment_plans::Model> for PaymentPlan {
    type Error = DomainError;

    fn try_from(model: payment_plans::Model) -> Result<Self, Self::Error> {
        Ok(PaymentPlan {
            id: model.id.into(),
            invoice_id: model.invoice_id.into(),
            clinic_id: model.clinic_id.into(),
            patient_id: model.patient_id.into(),
            status: parse_column(&model.status, "payment_plans.status")?,
            installments_count: model.installments_count as u32,
            installment_amount: model.installment_amount,
            down_payment: model.down_payment,
            financed_amount: model.financed_amount,
            monthly_interest_rate: model.monthly_interest_rate,
            total_amount: model.total_amount,
            paid_installments: model.paid_installments as u32,
            pending_installments: model.pending_installments as u32,
            total_paid: model.total_paid,
            total_pending: model.total_pending,
            first_due_date: from_db_time(model.first_due_date),
            due_day: model.due_day.map(|d| d as u32),
            installments: from_json(model.installments, "payment_plans.installments")?,
            created_by: model.created_by.map(Into::into),
            created_at: from_db_time(model.created_at),
            updated_at: from_db_time(model.updated_at),
            completed_at: model.completed_at.map(from_db_time),
            cancelled_at: model.cancelled_at.map(from_db_time),
            version: model.version,
        })
    }
}
