//! Payment gateway adapters
//!
//! `HttpPaymentGateway` talks to a real acquirer; `SandboxGateway` approves
//! every request locally. `ConfiguredGateway` picks one at startup.

pub mod http;
pub mod sandbox;

pub use http::HttpPaymentGateway;
pub use sandbox::SandboxGateway;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::ports::{
    BoletoCharge, BoletoRequest, CardAuthorization, CardCharge, PaymentGateway, PixCharge,
    PixRequest,
};
use crate::error::GatewayError;

/// Gateway selected from configuration
pub enum ConfiguredGateway {
    Http(HttpPaymentGateway),
    Sandbox(SandboxGateway),
}

impl ConfiguredGateway {
    pub fn from_config(base_url: Option<&str>, api_key: Option<&str>) -> Self {
        match (base_url, api_key) {
            (Some(url), Some(key)) => {
                tracing::info!(gateway_url = %url, "Using HTTP payment gateway");
                ConfiguredGateway::Http(HttpPaymentGateway::new(url.to_string(), key.to_string()))
            }
            _ => {
                tracing::warn!("No payment gateway configured, using sandbox rails");
                ConfiguredGateway::Sandbox(SandboxGateway::new())
            }
        }
    }

    fn inner(&self) -> &dyn PaymentGateway {
        match self {
            ConfiguredGateway::Http(gateway) => gateway,
            ConfiguredGateway::Sandbox(gateway) => gateway,
        }
    }
}

#[async_trait]
impl PaymentGateway for ConfiguredGateway {
    async fn charge_card(&self, charge: &CardCharge) -> Result<CardAuthorization, GatewayError> {
        self.inner().charge_card(charge).await
    }

    async fn create_pix(&self, request: &PixRequest) -> Result<PixCharge, GatewayError> {
        self.inner().create_pix(request).await
    }

    async fn create_boleto(&self, request: &BoletoRequest) -> Result<BoletoCharge, GatewayError> {
        self.inner().create_boleto(request).await
    }

    async fn refund_card(&self, transaction_id: &str, amount: Decimal) -> Result<(), GatewayError> {
        self.inner().refund_card(transaction_id, amount).await
    }
}
