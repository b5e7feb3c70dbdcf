//! Product and stock-level models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A sellable product
///
/// `stock_quantity` is the sum of the product's stock levels and only
/// changes through the stock ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub sku: String,
    pub barcode: Option<String>,
    pub category_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    pub unit_price: Decimal,
    pub cost_price: Decimal,
    pub stock_quantity: i32,
    pub min_stock_level: i32,
    pub max_stock_level: Option<i32>,
    pub unit_of_measure: String,
    /// Percentage, e.g. 19 for 19% VAT
    pub tax_rate: Decimal,
    pub is_active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn stock_status(&self) -> StockStatus {
        StockStatus::classify(self.stock_quantity, self.min_stock_level, self.max_stock_level)
    }

    pub fn profit_margin(&self) -> Decimal {
        profit_margin(self.unit_price, self.cost_price)
    }

    pub fn stock_value(&self) -> Decimal {
        Decimal::from(self.stock_quantity) * self.cost_price
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

string_enum! {
    /// Stock position relative to the product's thresholds
    pub enum StockStatus as "stock_status" {
        OutOfStock => "out_of_stock",
        LowStock => "low_stock",
        Normal => "normal",
        Overstock => "overstock",
    }
}

impl StockStatus {
    pub fn classify(quantity: i32, min_level: i32, max_level: Option<i32>) -> Self {
        if quantity <= 0 {
            StockStatus::OutOfStock
        } else if quantity <= min_level {
            StockStatus::LowStock
        } else if max_level.map_or(false, |max| quantity >= max) {
            StockStatus::Overstock
        } else {
            StockStatus::Normal
        }
    }
}

/// Margin over cost as a percentage, 0 when cost is 0
pub fn profit_margin(unit_price: Decimal, cost_price: Decimal) -> Decimal {
    if cost_price.is_zero() {
        Decimal::ZERO
    } else {
        ((unit_price - cost_price) / cost_price * Decimal::from(100)).round_dp(2)
    }
}

/// Quantity of one product held at a warehouse, optionally at a location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockLevel {
    pub id: Uuid,
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub location_id: Option<Uuid>,
    pub quantity: i32,
    pub updated_at: DateTime<Utc>,
}
