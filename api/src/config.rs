use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use rust_decimal::Decimal;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Payment gateway base URL; the sandbox gateway is used when unset
    pub gateway_url: Option<String>,
    pub gateway_api_key: Option<String>,
    /// Webhook that receives billing events; events are only logged when unset
    pub notify_webhook_url: Option<String>,
    pub billing: BillingConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: parse_var("PORT", 8080)?,
            gateway_url: env::var("PAYMENT_GATEWAY_URL").ok(),
            gateway_api_key: env::var("PAYMENT_GATEWAY_KEY").ok(),
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL").ok(),
            billing: BillingConfig::from_env()?,
        })
    }

    /// Check if a real payment gateway is configured
    pub fn gateway_enabled(&self) -> bool {
        self.gateway_url.is_some() && self.gateway_api_key.is_some()
    }
}

/// Billing rules passed to every service
#[derive(Debug, Clone, PartialEq)]
pub struct BillingConfig {
    /// Flat fee on a late installment (0.02 = 2%)
    pub late_fee_rate: Decimal,
    /// Simple interest per day late (0.00033 = 0.033%)
    pub daily_interest_rate: Decimal,
    /// Price table validity when `valid_until` is omitted
    pub default_validity_days: i64,
    /// Invoice due date when none is given
    pub default_due_in_days: i64,
    pub pix_expiration_minutes: i64,
    pub boleto_days_to_expire: i64,
    /// Report window when no range is given
    pub default_report_days: i64,
    /// Cash-flow projection horizon
    pub projection_days: i64,
    pub max_installments: u32,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            late_fee_rate: Decimal::new(2, 2),
            daily_interest_rate: Decimal::new(33, 5),
            default_validity_days: 365,
            default_due_in_days: 30,
            pix_expiration_minutes: 30,
            boleto_days_to_expire: 3,
            default_report_days: 30,
            projection_days: 30,
            max_installments: 120,
        }
    }
}

impl BillingConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            late_fee_rate: parse_var("BILLING_LATE_FEE_RATE", defaults.late_fee_rate)?,
            daily_interest_rate: parse_var(
                "BILLING_DAILY_INTEREST_RATE",
                defaults.daily_interest_rate,
            )?,
            default_validity_days: parse_var(
                "BILLING_DEFAULT_VALIDITY_DAYS",
                defaults.default_validity_days,
            )?,
            default_due_in_days: parse_var(
                "BILLING_DEFAULT_DUE_IN_DAYS",
                defaults.default_due_in_days,
            )?,
            pix_expiration_minutes: parse_var(
                "BILLING_PIX_EXPIRATION_MINUTES",
                defaults.pix_expiration_minutes,
            )?,
            boleto_days_to_expire: parse_var(
                "BILLING_BOLETO_DAYS_TO_EXPIRE",
                defaults.boleto_days_to_expire,
            )?,
            default_report_days: parse_var(
                "BILLING_DEFAULT_REPORT_DAYS",
                defaults.default_report_days,
            )?,
            projection_days: parse_var("BILLING_PROJECTION_DAYS", defaults.projection_days)?,
            max_installments: parse_var("BILLING_MAX_INSTALLMENTS", defaults.max_installments)?,
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", name, raw, e)),
        Err(_) => Ok(default),
    }
}
