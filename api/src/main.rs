//! Clinic Billing API Server
//!
//! Invoicing, payment collection, installment plans, insurance claims and
//! financial reporting for outpatient clinics.
//! Uses hexagonal (ports & adapters) architecture for clean separation of concerns.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Json, Router,
};
use sea_orm::Database;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod adapters;
mod app;
mod config;
mod domain;
mod entity;
mod error;
mod handlers;
mod reports;

#[cfg(test)]
mod test_utils;


use adapters::{
    ConfiguredGateway, PostgresAuditSink, PostgresClaimRepository, PostgresInvoiceRepository,
    PostgresPaymentPlanRepository, PostgresPaymentRepository, PostgresPriceTableRepository,
    PostgresSequenceGenerator, PostgresUnitOfWork, SystemClock, WebhookNotifier,
};
use app::{
    InsuranceClaimService, InvoiceLocks, InvoiceService, PaymentPlanService, PaymentService,
    PriceResolver, PriceTableService, ReportService, ServiceContext,
};
use config::Config;

type Invoices = PostgresInvoiceRepository;
type Payments = PostgresPaymentRepository;
type Plans = PostgresPaymentPlanRepository;
type Claims = PostgresClaimRepository;
type PriceTables = PostgresPriceTableRepository;
type Gateway = ConfiguredGateway;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub price_resolver: Arc<PriceResolver<PriceTables>>,
    pub price_tables: Arc<PriceTableService<PriceTables>>,
    pub invoices: Arc<InvoiceService<Invoices, PriceTables, Payments, Plans, Gateway>>,
    pub payments: Arc<PaymentService<Invoices, Payments, Plans, Gateway>>,
    pub payment_plans: Arc<PaymentPlanService<Invoices, Payments, Plans, Gateway>>,
    pub claims: Arc<InsuranceClaimService<Invoices, Claims, Plans>>,
    pub reports: Arc<ReportService<Invoices, Payments, Claims>>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Price tables
        .route(
            "/price-tables",
            get(handlers::list_price_tables).post(handlers::create_price_table),
        )
        .route("/price-tables/resolve", get(handlers::resolve_price))
        .route(
            "/price-tables/:id",
            get(handlers::get_price_table).patch(handlers::update_price_table),
        )
        // Invoices
        .route(
            "/invoices",
            get(handlers::list_invoices).post(handlers::create_invoice),
        )
        .route(
            "/invoices/:id",
            get(handlers::get_invoice)
                .patch(handlers::update_invoice)
                .delete(handlers::delete_invoice),
        )
        .route("/invoices/:id/finalize", post(handlers::finalize_invoice))
        .route("/invoices/:id/send", post(handlers::send_invoice))
        .route("/invoices/:id/cancel", post(handlers::cancel_invoice))
        .route("/invoices/:id/payments", get(handlers::list_invoice_payments))
        // Payments
        .route("/payments", post(handlers::create_payment))
        .route("/payments/manual", post(handlers::record_manual_payment))
        .route("/payments/:id", get(handlers::get_payment))
        .route("/payments/:id/confirm", post(handlers::confirm_payment))
        .route("/payments/:id/fail", post(handlers::fail_payment))
        .route("/payments/:id/refund", post(handlers::refund_payment))
        // Payment plans
        .route("/payment-plans", post(handlers::create_payment_plan))
        .route("/payment-plans/:id", get(handlers::get_payment_plan))
        .route("/payment-plans/:id/cancel", post(handlers::cancel_payment_plan))
        .route(
            "/payment-plans/:id/installments/:number",
            get(handlers::quote_installment),
        )
        .route(
            "/payment-plans/:id/installments/:number/pay",
            post(handlers::pay_installment),
        )
        // Insurance claims
        .route(
            "/claims",
            get(handlers::list_claims).post(handlers::create_claim),
        )
        .route(
            "/claims/:id",
            get(handlers::get_claim).patch(handlers::update_claim),
        )
        .route("/claims/:id/submit", post(handlers::submit_claim))
        .route("/claims/:id/appeal", post(handlers::appeal_claim))
        .route("/claim-batches", post(handlers::create_batch))
        .route("/claim-batches/:id", get(handlers::get_batch))
        .route("/claim-batches/:id/submit", post(handlers::submit_batch))
        // Reports
        .route("/reports/revenue", get(handlers::revenue_report))
        .route("/reports/cash-flow", get(handlers::cash_flow_report))
        .route("/reports/aging", get(handlers::aging_report))
        .route("/reports/statistics", get(handlers::statistics_report))
        .route("/reports/dashboard", get(handlers::dashboard))
        // Middleware
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,clinic_billing_api=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Clinic Billing API...");

    // Load configuration
    let config = Config::from_env()?;

    // Connect to PostgreSQL
    tracing::info!("Connecting to database...");
    let db = Database::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Create adapters
    let invoice_repo = Arc::new(PostgresInvoiceRepository::new(db.clone()));
    let payment_repo = Arc::new(PostgresPaymentRepository::new(db.clone()));
    let plan_repo = Arc::new(PostgresPaymentPlanRepository::new(db.clone()));
    let claim_repo = Arc::new(PostgresClaimRepository::new(db.clone()));
    let price_table_repo = Arc::new(PostgresPriceTableRepository::new(db.clone()));
    let gateway = Arc::new(ConfiguredGateway::from_config(
        config.gateway_url.as_deref(),
        config.gateway_api_key.as_deref(),
    ));

    if config.notify_webhook_url.is_none() {
        tracing::info!("NOTIFY_WEBHOOK_URL not set, billing events are only logged");
    }

    let clock = Arc::new(SystemClock);
    let ctx = ServiceContext {
        clock: clock.clone(),
        notifier: Arc::new(WebhookNotifier::new(config.notify_webhook_url.clone())),
        audit: Arc::new(PostgresAuditSink::new(db.clone())),
        sequences: Arc::new(PostgresSequenceGenerator::new(db.clone())),
        store: Arc::new(PostgresUnitOfWork::new(db.clone())),
        locks: Arc::new(InvoiceLocks::new()),
        config: config.billing.clone(),
    };

    // Create application services
    let price_resolver = Arc::new(PriceResolver::new(price_table_repo.clone(), clock));
    let price_tables = Arc::new(PriceTableService::new(price_table_repo, ctx.clone()));

    let payments = Arc::new(PaymentService::new(
        invoice_repo.clone(),
        payment_repo.clone(),
        plan_repo.clone(),
        gateway,
        ctx.clone(),
    ));

    let invoices = Arc::new(InvoiceService::new(
        invoice_repo.clone(),
        payment_repo.clone(),
        price_resolver.clone(),
        payments.clone(),
        ctx.clone(),
    ));

    let payment_plans = Arc::new(PaymentPlanService::new(
        invoice_repo.clone(),
        plan_repo.clone(),
        payments.clone(),
        ctx.clone(),
    ));

    let claims = Arc::new(InsuranceClaimService::new(
        invoice_repo.clone(),
        claim_repo.clone(),
        plan_repo,
        ctx.clone(),
    ));

    let reports = Arc::new(ReportService::new(
        invoice_repo,
        payment_repo,
        claim_repo,
        ctx,
    ));

    // Create app state
    let state = AppState {
        price_resolver,
        price_tables,
        invoices,
        payments,
        payment_plans,
        claims,
        reports,
    };

    let app = router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
