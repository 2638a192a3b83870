//! Local payment rails for development
//!
//! Approves every charge and fabricates PIX / boleto payloads shaped like the
//! real ones. Nothing leaves the process.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::Rng;
use rust_decimal::Decimal;

use crate::domain::ports::{
    BoletoCharge, BoletoRequest, CardAuthorization, CardCharge, PaymentGateway, PixCharge,
    PixRequest,
};
use crate::error::GatewayError;

#[derive(Default)]
pub struct SandboxGateway;

impl SandboxGateway {
    pub fn new() -> Self {
        Self
    }

    fn random_digits(len: usize) -> String {
        let mut rng = rand::thread_rng();
        (0..len)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn charge_card(&self, charge: &CardCharge) -> Result<CardAuthorization, GatewayError> {
        let transaction_id = format!("sbx_{}", Self::random_digits(16));
        tracing::info!(
            payment_id = %charge.payment_id,
            amount = %charge.amount,
            transaction_id = %transaction_id,
            "Sandbox card charge approved"
        );
        Ok(CardAuthorization {
            transaction_id,
            authorization_url: None,
        })
    }

    async fn create_pix(&self, request: &PixRequest) -> Result<PixCharge, GatewayError> {
        let code = format!(
            "00020126580014BR.GOV.BCB.PIX0136{}5204000053039865404{}5802BR",
            request.payment_id, request.amount
        );
        let qr_code = format!("data:text/plain;base64,{}", STANDARD.encode(code.as_bytes()));
        Ok(PixCharge {
            code,
            qr_code,
            expires_at: request.expires_at,
        })
    }

    async fn create_boleto(&self, request: &BoletoRequest) -> Result<BoletoCharge, GatewayError> {
        let barcode = Self::random_digits(44);
        let digitable_line = format!(
            "{}.{} {}.{} {}.{} {} {}",
            &barcode[0..5],
            &barcode[5..10],
            &barcode[10..15],
            &barcode[15..21],
            &barcode[21..26],
            &barcode[26..32],
            &barcode[32..33],
            &barcode[33..44]
        );
        Ok(BoletoCharge {
            barcode,
            digitable_line,
            url: Some(format!("https://sandbox.invalid/boletos/{}", request.payment_id)),
            expires_at: request.expires_at,
        })
    }

    async fn refund_card(&self, transaction_id: &str, amount: Decimal) -> Result<(), GatewayError> {
        tracing::info!(transaction_id, amount = %amount, "Sandbox card refund accepted");
        Ok(())
    }
}
