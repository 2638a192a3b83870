//! Wiring for service-level tests
//!
//! One harness owns every in-memory adapter plus a context whose clock starts
//! at [`fixed_now`]. Services built from the same harness share state.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::fixtures::fixed_now;
use super::mocks::*;
use crate::app::{
    InsuranceClaimService, InvoiceLocks, InvoiceService, PaymentPlanService, PaymentService,
    PriceResolver, PriceTableService, ReportService, ServiceContext,
};
use crate::config::BillingConfig;
use crate::domain::ports::Clock;

pub type TestPaymentService = PaymentService<
    InMemoryInvoiceRepository,
    InMemoryPaymentRepository,
    InMemoryPaymentPlanRepository,
    MockPaymentGateway,
>;

pub struct TestHarness {
    pub invoices: Arc<InMemoryInvoiceRepository>,
    pub payments: Arc<InMemoryPaymentRepository>,
    pub plans: Arc<InMemoryPaymentPlanRepository>,
    pub claims: Arc<InMemoryClaimRepository>,
    pub price_tables: Arc<InMemoryPriceTableRepository>,
    pub store: Arc<InMemoryUnitOfWork>,
    pub gateway: Arc<MockPaymentGateway>,
    pub clock: Arc<FixedClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub audit: Arc<InMemoryAuditSink>,
    pub ctx: ServiceContext,
}

impl TestHarness {
    pub fn new() -> Self {
        let clock = Arc::new(FixedClock::new(fixed_now()));
        let notifier = Arc::new(RecordingNotifier::new());
        let audit = Arc::new(InMemoryAuditSink::new());
        let invoices = Arc::new(InMemoryInvoiceRepository::new());
        let payments = Arc::new(InMemoryPaymentRepository::new());
        let plans = Arc::new(InMemoryPaymentPlanRepository::new());
        let claims = Arc::new(InMemoryClaimRepository::new());
        let store = Arc::new(InMemoryUnitOfWork::new(
            invoices.clone(),
            payments.clone(),
            plans.clone(),
            claims.clone(),
        ));
        let ctx = ServiceContext {
            clock: clock.clone(),
            notifier: notifier.clone(),
            audit: audit.clone(),
            sequences: Arc::new(InMemorySequenceGenerator::new()),
            store: store.clone(),
            locks: Arc::new(InvoiceLocks::new()),
            config: BillingConfig::default(),
        };

        Self {
            invoices,
            payments,
            plans,
            claims,
            price_tables: Arc::new(InMemoryPriceTableRepository::new()),
            store,
            gateway: Arc::new(MockPaymentGateway::new()),
            clock,
            notifier,
            audit,
            ctx,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn price_resolver(&self) -> PriceResolver<InMemoryPriceTableRepository> {
        PriceResolver::new(self.price_tables.clone(), self.clock.clone())
    }

    pub fn price_table_service(&self) -> PriceTableService<InMemoryPriceTableRepository> {
        PriceTableService::new(self.price_tables.clone(), self.ctx.clone())
    }

    pub fn payment_service(&self) -> TestPaymentService {
        PaymentService::new(
            self.invoices.clone(),
            self.payments.clone(),
            self.plans.clone(),
            self.gateway.clone(),
            self.ctx.clone(),
        )
    }

    pub fn invoice_service(
        &self,
    ) -> InvoiceService<
        InMemoryInvoiceRepository,
        InMemoryPriceTableRepository,
        InMemoryPaymentRepository,
        InMemoryPaymentPlanRepository,
        MockPaymentGateway,
    > {
        InvoiceService::new(
            self.invoices.clone(),
            self.payments.clone(),
            Arc::new(self.price_resolver()),
            Arc::new(self.payment_service()),
            self.ctx.clone(),
        )
    }

    pub fn payment_plan_service(
        &self,
    ) -> PaymentPlanService<
        InMemoryInvoiceRepository,
        InMemoryPaymentRepository,
        InMemoryPaymentPlanRepository,
        MockPaymentGateway,
    > {
        PaymentPlanService::new(
            self.invoices.clone(),
            self.plans.clone(),
            Arc::new(self.payment_service()),
            self.ctx.clone(),
        )
    }

    pub fn claim_service(
        &self,
    ) -> InsuranceClaimService<
        InMemoryInvoiceRepository,
        InMemoryClaimRepository,
        InMemoryPaymentPlanRepository,
    > {
        InsuranceClaimService::new(
            self.invoices.clone(),
            self.claims.clone(),
            self.plans.clone(),
            self.ctx.clone(),
        )
    }

    pub fn report_service(
        &self,
    ) -> ReportService<InMemoryInvoiceRepository, InMemoryPaymentRepository, InMemoryClaimRepository>
    {
        ReportService::new(
            self.invoices.clone(),
            self.payments.clone(),
            self.claims.clone(),
            self.ctx.clone(),
        )
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
