//! Price table domain entity

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{ClinicId, InsurerId, PriceTableId};
use super::money::round_money;
use crate::error::DomainError;

/// Kind of price list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceTableType {
    Private,
    Insurance,
    Sus,
    Custom,
}

impl std::fmt::Display for PriceTableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceTableType::Private => write!(f, "PRIVATE"),
            PriceTableType::Insurance => write!(f, "INSURANCE"),
            PriceTableType::Sus => write!(f, "SUS"),
            PriceTableType::Custom => write!(f, "CUSTOM"),
        }
    }
}

impl std::str::FromStr for PriceTableType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PRIVATE" => Ok(PriceTableType::Private),
            "INSURANCE" => Ok(PriceTableType::Insurance),
            "SUS" => Ok(PriceTableType::Sus),
            "CUSTOM" => Ok(PriceTableType::Custom),
            _ => Err(format!("Unknown price table type: {}", s)),
        }
    }
}

/// One billable service in a price table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTableItem {
    pub code: String,
    #[serde(default)]
    pub tuss_code: Option<String>,
    #[serde(default)]
    pub cbhpm_code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
}

impl PriceTableItem {
    /// Matches the internal code or either terminology code
    pub fn answers_to(&self, code: &str) -> bool {
        self.code == code
            || self.tuss_code.as_deref() == Some(code)
            || self.cbhpm_code.as_deref() == Some(code)
    }
}

/// Versioned price list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTable {
    pub id: PriceTableId,
    pub clinic_id: Option<ClinicId>,
    pub name: String,
    pub table_type: PriceTableType,
    pub insurer_id: Option<InsurerId>,
    pub is_default: bool,
    pub is_active: bool,
    pub multiplier: Option<Decimal>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub items: Vec<PriceTableItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PriceTable {
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.is_active && self.valid_from <= at && self.valid_until.map_or(true, |until| at <= until)
    }

    pub fn find_item(&self, code: &str) -> Option<&PriceTableItem> {
        self.items.iter().find(|item| item.answers_to(code))
    }

    /// Item price scaled by the table multiplier
    pub fn unit_price(&self, code: &str) -> Result<Decimal, DomainError> {
        let item = self.find_item(code).ok_or_else(|| {
            DomainError::NotFound(format!(
                "Service code {} not found in price table {}",
                code, self.name
            ))
        })?;
        Ok(round_money(
            item.price * self.multiplier.unwrap_or(Decimal::ONE),
        ))
    }
}

fn validate_table(
    table_type: PriceTableType,
    insurer_id: Option<InsurerId>,
    multiplier: Option<Decimal>,
    valid_from: DateTime<Utc>,
    valid_until: Option<DateTime<Utc>>,
    items: &[PriceTableItem],
) -> Result<(), DomainError> {
    if table_type == PriceTableType::Insurance && insurer_id.is_none() {
        return Err(DomainError::Validation(
            "Insurance price tables require an insurer".to_string(),
        ));
    }
    if multiplier.is_some_and(|m| m <= Decimal::ZERO) {
        return Err(DomainError::Validation(
            "Price multiplier must be positive".to_string(),
        ));
    }
    if valid_until.is_some_and(|until| until < valid_from) {
        return Err(DomainError::Validation(
            "validUntil must not precede validFrom".to_string(),
        ));
    }
    for item in items {
        if item.code.trim().is_empty() {
            return Err(DomainError::Validation(
                "Price table items need a code".to_string(),
            ));
        }
        if item.price < Decimal::ZERO {
            return Err(DomainError::Validation(format!(
                "Price for {} cannot be negative",
                item.code
            )));
        }
    }
    Ok(())
}

/// Data needed to create a price table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPriceTable {
    #[serde(default)]
    pub clinic_id: Option<ClinicId>,
    pub name: String,
    pub table_type: PriceTableType,
    #[serde(default)]
    pub insurer_id: Option<InsurerId>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub multiplier: Option<Decimal>,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items: Vec<PriceTableItem>,
}

impl NewPriceTable {
    /// Build the table, filling validity from `now` and `validity_days`
    pub fn into_table(
        self,
        now: DateTime<Utc>,
        validity_days: i64,
    ) -> Result<PriceTable, DomainError> {
        let valid_from = self.valid_from.unwrap_or(now);
        let valid_until = self
            .valid_until
            .or_else(|| Some(valid_from + chrono::Duration::days(validity_days)));
        if self.name.trim().is_empty() {
            return Err(DomainError::Validation(
                "Price table name is required".to_string(),
            ));
        }
        validate_table(
            self.table_type,
            self.insurer_id,
            self.multiplier,
            valid_from,
            valid_until,
            &self.items,
        )?;

        Ok(PriceTable {
            id: PriceTableId::new(),
            clinic_id: self.clinic_id,
            name: self.name,
            table_type: self.table_type,
            insurer_id: self.insurer_id,
            is_default: self.is_default,
            is_active: true,
            multiplier: self.multiplier,
            valid_from,
            valid_until,
            items: self.items,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial update of a price table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceTableUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_default: Option<bool>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub multiplier: Option<Decimal>,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items: Option<Vec<PriceTableItem>>,
}

impl PriceTableUpdate {
    pub fn apply(self, table: &mut PriceTable, now: DateTime<Utc>) -> Result<(), DomainError> {
        let valid_from = self.valid_from.unwrap_or(table.valid_from);
        let valid_until = self.valid_until.or(table.valid_until);
        let multiplier = self.multiplier.or(table.multiplier);
        validate_table(
            table.table_type,
            table.insurer_id,
            multiplier,
            valid_from,
            valid_until,
            self.items.as_deref().unwrap_or(&table.items),
        )?;

        if let Some(name) = self.name {
            table.name = name;
        }
        if let Some(is_default) = self.is_default {
            table.is_default = is_default;
        }
        if let Some(is_active) = self.is_active {
            table.is_active = is_active;
        }
        if let Some(items) = self.items {
            table.items = items;
        }
        table.multiplier = multiplier;
        table.valid_from = valid_from;
        table.valid_until = valid_until;
        table.updated_at = now;
        Ok(())
    }
}
