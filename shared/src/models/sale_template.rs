//! Sale templates
//!
//! A template is a saved set of lines plus the commercial defaults a sale
//! is drafted with: customer, site, payment method, a discount percentage
//! applied to every line and an optional VAT override.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::payment::PaymentMethod;
use super::sale::{round_money, LineTotals};
use crate::error::{DomainError, DomainResult};
use crate::validation::line_amount;

/// Longest template name the column holds
pub const TEMPLATE_NAME_MAX: usize = 255;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleTemplate {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub warehouse_id: Uuid,
    pub location_id: Option<Uuid>,
    pub payment_method: PaymentMethod,
    pub discount_percentage: Decimal,
    /// Overrides the product's VAT rate when set
    pub tax_rate: Option<Decimal>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub usage_count: i32,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub items: Vec<SaleTemplateItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleTemplateItem {
    pub id: Uuid,
    pub sale_template_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Current list price and VAT of a product a template line refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductPrice {
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
}

/// A template line priced for a new sale
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discount_amount: Decimal,
    pub tax_rate: Decimal,
}

/// Name given to a duplicated template
pub fn copy_name(name: &str) -> String {
    const SUFFIX: &str = " (Copy)";
    let keep = TEMPLATE_NAME_MAX - SUFFIX.chars().count();
    let base: String = name.chars().take(keep).collect();
    format!("{}{}", base, SUFFIX)
}

impl SaleTemplate {
    pub fn ensure_active(&self) -> DomainResult<()> {
        if !self.is_active {
            return Err(DomainError::validation("is_active", "Sale template is not active"));
        }
        Ok(())
    }

    /// Price every line at today's product prices
    ///
    /// Each line gets `discount_percentage` of its subtotal as discount and
    /// the template's VAT override, or the product's rate without one.
    pub fn price_lines(&self, prices: &HashMap<Uuid, ProductPrice>) -> DomainResult<Vec<TemplateLine>> {
        if self.items.is_empty() {
            return Err(DomainError::validation("items", "A sale template needs at least one item"));
        }
        self.items
            .iter()
            .map(|item| {
                let price = prices.get(&item.product_id).ok_or_else(|| {
                    DomainError::validation(
                        "items",
                        format!("Product {} is no longer available", item.product_id),
                    )
                })?;
                let subtotal = line_amount("unit_price", item.quantity, price.unit_price)?;
                let discount_amount =
                    round_money(subtotal * self.discount_percentage / Decimal::from(100));
                Ok(TemplateLine {
                    product_id: item.product_id,
                    quantity: item.quantity,
                    unit_price: price.unit_price,
                    discount_amount,
                    tax_rate: self.tax_rate.unwrap_or(price.tax_rate),
                })
            })
            .collect()
    }

    /// Total a sale drafted from this template would have today
    pub fn estimated_total(&self, prices: &HashMap<Uuid, ProductPrice>) -> DomainResult<Decimal> {
        self.price_lines(prices)?
            .iter()
            .map(|line| {
                LineTotals::compute(line.quantity, line.unit_price, line.discount_amount, line.tax_rate)
                    .map(|totals| totals.total)
            })
            .sum()
    }

    /// Count one more sale drafted from the template
    pub fn record_use(&mut self, now: DateTime<Utc>) {
        self.usage_count = self.usage_count.saturating_add(1);
        self.last_used_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(lines: &[(Uuid, i32)]) -> SaleTemplate {
        let id = Uuid::new_v4();
        SaleTemplate {
            id,
            name: "Weekly restock".into(),
            description: None,
            created_by: None,
            customer_id: None,
            warehouse_id: Uuid::new_v4(),
            location_id: None,
            payment_method: PaymentMethod::Cash,
            discount_percentage: Decimal::from(10),
            tax_rate: None,
            notes: None,
            is_active: true,
            usage_count: 0,
            last_used_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            items: lines
                .iter()
                .map(|(product_id, quantity)| SaleTemplateItem {
                    id: Uuid::new_v4(),
                    sale_template_id: id,
                    product_id: *product_id,
                    quantity: *quantity,
                })
                .collect(),
        }
    }

    #[test]
    fn test_price_lines_apply_discount_and_product_vat() {
        let product = Uuid::new_v4();
        let t = template(&[(product, 3)]);
        let prices: HashMap<Uuid, ProductPrice> = [(
            product,
            ProductPrice {
                unit_price: Decimal::new(1250, 2),
                tax_rate: Decimal::from(19),
            },
        )]
        .into_iter()
        .collect();

        let lines = t.price_lines(&prices).unwrap();
        assert_eq!(lines[0].discount_amount, Decimal::new(375, 2));
        assert_eq!(lines[0].tax_rate, Decimal::from(19));
        // 37.50 - 3.75 = 33.75, plus 19% = 6.41
        assert_eq!(t.estimated_total(&prices).unwrap(), Decimal::new(4016, 2));
    }

    #[test]
    fn test_missing_product_is_refused() {
        let t = template(&[(Uuid::new_v4(), 1)]);
        assert!(t.price_lines(&HashMap::new()).is_err());
    }

    #[test]
    fn test_copy_name_fits_column() {
        assert_eq!(copy_name("Weekly restock"), "Weekly restock (Copy)");
        assert_eq!(copy_name(&"x".repeat(300)).chars().count(), TEMPLATE_NAME_MAX);
    }

    #[test]
    fn test_record_use() {
        let mut t = template(&[(Uuid::new_v4(), 1)]);
        let now = Utc::now();
        t.record_use(now);
        assert_eq!(t.usage_count, 1);
        assert_eq!(t.last_used_at, Some(now));
        t.is_active = false;
        assert!(t.ensure_active().is_err());
    }
}
