//! Payment gateway port trait
//!
//! The engine treats every rail as opaque: it sends an amount and gets back
//! a transaction id, a PIX code or a boleto barcode plus an expiry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::entities::{PatientId, PaymentId};
use crate::error::GatewayError;

/// Card authorization request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardCharge {
    pub payment_id: PaymentId,
    pub amount: Decimal,
    pub card_token: String,
    pub installments: u32,
    pub description: String,
}

/// Card authorization started by the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardAuthorization {
    pub transaction_id: String,
    /// 3-D Secure or hosted checkout page, when the issuer requires it
    #[serde(default)]
    pub authorization_url: Option<String>,
}

/// PIX charge request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PixRequest {
    pub payment_id: PaymentId,
    pub amount: Decimal,
    pub expires_at: DateTime<Utc>,
    pub description: String,
}

/// PIX copy-and-paste code with its QR image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PixCharge {
    pub code: String,
    /// Base64 encoded QR payload
    pub qr_code: String,
    pub expires_at: DateTime<Utc>,
}

/// Boleto issuance request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoletoRequest {
    pub payment_id: PaymentId,
    pub amount: Decimal,
    pub payer: PatientId,
    pub expires_at: DateTime<Utc>,
}

/// Issued boleto
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoletoCharge {
    pub barcode: String,
    pub digitable_line: String,
    #[serde(default)]
    pub url: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Port trait for payment rails
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Start a card authorization
    async fn charge_card(&self, charge: &CardCharge) -> Result<CardAuthorization, GatewayError>;

    /// Create a PIX charge
    async fn create_pix(&self, request: &PixRequest) -> Result<PixCharge, GatewayError>;

    /// Issue a boleto
    async fn create_boleto(&self, request: &BoletoRequest) -> Result<BoletoCharge, GatewayError>;

    /// Reverse (part of) a captured card transaction
    async fn refund_card(&self, transaction_id: &str, amount: Decimal)
        -> Result<(), GatewayError>;
}
