//! HTTP payment gateway client

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::ports::{
    BoletoCharge, BoletoRequest, CardAuthorization, CardCharge, PaymentGateway, PixCharge,
    PixRequest,
};
use crate::error::GatewayError;

/// Client for an acquirer exposing card, PIX and boleto charges over JSON
pub struct HttpPaymentGateway {
    http: Client,
    base_url: String,
    api_key: String,
}

impl HttpPaymentGateway {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v1{}", self.base_url, path)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, GatewayError> {
        Ok(self
            .http
            .post(self.api_url(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?)
    }

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| GatewayError::Deserialization(e.to_string()))
        } else if status.is_server_error() || status.as_u16() == 429 {
            let message = response.text().await.unwrap_or_default();
            Err(GatewayError::Unavailable(format!("{} {}", status.as_u16(), message)))
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[derive(Serialize)]
struct RefundRequest<'a> {
    transaction_id: &'a str,
    amount: Decimal,
}

#[derive(Deserialize)]
struct RefundResponse {
    refunded: bool,
    #[serde(default)]
    message: Option<String>,
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn charge_card(&self, charge: &CardCharge) -> Result<CardAuthorization, GatewayError> {
        let response = self.post("/charges/card", charge).await?;
        let authorization: CardAuthorization = self.handle_response(response).await?;
        tracing::debug!(
            payment_id = %charge.payment_id,
            transaction_id = %authorization.transaction_id,
            "Card charge authorized"
        );
        Ok(authorization)
    }

    async fn create_pix(&self, request: &PixRequest) -> Result<PixCharge, GatewayError> {
        let response = self.post("/charges/pix", request).await?;
        self.handle_response(response).await
    }

    async fn create_boleto(&self, request: &BoletoRequest) -> Result<BoletoCharge, GatewayError> {
        let response = self.post("/charges/boleto", request).await?;
        self.handle_response(response).await
    }

    async fn refund_card(&self, transaction_id: &str, amount: Decimal) -> Result<(), GatewayError> {
        let response = self
            .post(
                "/refunds",
                &RefundRequest {
                    transaction_id,
                    amount,
                },
            )
            .await?;
        let result: RefundResponse = self.handle_response(response).await?;
        if result.refunded {
            Ok(())
        } else {
            Err(GatewayError::Rejected {
                status: 200,
                message: result
                    .message
                    .unwrap_or_else(|| format!("Refund of {} declined", transaction_id)),
            })
        }
    }
}
