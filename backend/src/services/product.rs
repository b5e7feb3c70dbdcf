//! Product catalog service
//!
//! Stock quantities are never written here; a product's opening stock is
//! posted to the ledger as a purchase.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    validate_barcode, validate_non_negative_amount, validate_percentage, validate_sku,
    MovementRequest, MovementType, PaginatedResponse, Pagination, Product, StockStatus,
};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use super::search_pattern;
use super::stock::{ensure_site, StockLedger};
use crate::error::{AppError, AppResult};

/// Product with derived stock and margin figures
#[derive(Debug, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub stock_status: StockStatus,
    pub profit_margin: Decimal,
    pub stock_value: Decimal,
}

impl From<Product> for ProductView {
    fn from(product: Product) -> Self {
        Self {
            stock_status: product.stock_status(),
            profit_margin: product.profit_margin(),
            stock_value: product.stock_value(),
            product,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub category_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    pub is_active: Option<bool>,
    /// Only products at or below their minimum level
    pub low_stock: Option<bool>,
}

/// Opening stock posted when a product is created
#[derive(Debug, Deserialize)]
pub struct InitialStockInput {
    pub warehouse_id: Uuid,
    pub location_id: Option<Uuid>,
    pub quantity: i32,
}

impl InitialStockInput {
    fn opening_request(&self, product_id: Uuid, actor: Option<Uuid>) -> MovementRequest {
        MovementRequest {
            product_id,
            warehouse_id: self.warehouse_id,
            location_id: self.location_id,
            movement_type: MovementType::Purchase,
            quantity_delta: self.quantity,
            reference: None,
            notes: Some("Opening stock".to_string()),
            actor,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,
    pub description: Option<String>,
    pub sku: String,
    pub barcode: Option<String>,
    pub category_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    pub unit_price: Decimal,
    pub cost_price: Decimal,
    #[validate(range(min = 0, message = "Minimum stock level cannot be negative"))]
    pub min_stock_level: Option<i32>,
    #[validate(range(min = 0, message = "Maximum stock level cannot be negative"))]
    pub max_stock_level: Option<i32>,
    #[validate(length(min = 1, max = 20, message = "Unit of measure must be 1-20 characters"))]
    pub unit_of_measure: Option<String>,
    pub tax_rate: Option<Decimal>,
    pub is_active: Option<bool>,
    pub initial_stock: Option<InitialStockInput>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProductInput {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub category_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    pub unit_price: Option<Decimal>,
    pub cost_price: Option<Decimal>,
    #[validate(range(min = 0, message = "Minimum stock level cannot be negative"))]
    pub min_stock_level: Option<i32>,
    #[validate(range(min = 0, message = "Maximum stock level cannot be negative"))]
    pub max_stock_level: Option<i32>,
    #[validate(length(min = 1, max = 20, message = "Unit of measure must be 1-20 characters"))]
    pub unit_of_measure: Option<String>,
    pub tax_rate: Option<Decimal>,
    pub is_active: Option<bool>,
}

/// Field checks shared by create and update
struct ProductFields<'a> {
    sku: Option<&'a str>,
    barcode: Option<&'a str>,
    unit_price: Option<Decimal>,
    cost_price: Option<Decimal>,
    tax_rate: Option<Decimal>,
    min_stock_level: Option<i32>,
    max_stock_level: Option<i32>,
}

impl ProductFields<'_> {
    fn check(&self) -> AppResult<()> {
        if let Some(sku) = self.sku {
            validate_sku(sku).map_err(|msg| AppError::validation("sku", msg))?;
        }
        if let Some(barcode) = self.barcode {
            validate_barcode(barcode).map_err(|msg| AppError::validation("barcode", msg))?;
        }
        if let Some(price) = self.unit_price {
            validate_non_negative_amount(price).map_err(|msg| AppError::validation("unit_price", msg))?;
        }
        if let Some(cost) = self.cost_price {
            validate_non_negative_amount(cost).map_err(|msg| AppError::validation("cost_price", msg))?;
        }
        if let Some(rate) = self.tax_rate {
            validate_percentage(rate).map_err(|msg| AppError::validation("tax_rate", msg))?;
        }
        if let (Some(min), Some(max)) = (self.min_stock_level, self.max_stock_level) {
            if max < min {
                return Err(AppError::validation(
                    "max_stock_level",
                    "Maximum stock level must not be below the minimum",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct ProductService {
    db: PgPool,
    default_tax_rate: Decimal,
}

impl ProductService {
    pub fn new(db: PgPool, default_tax_rate: Decimal) -> Self {
        Self { db, default_tax_rate }
    }

    pub async fn list_products(
        &self,
        filter: &ProductFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<ProductView>> {
        let pattern = search_pattern(filter.search.as_deref());
        let low_stock = filter.low_stock.unwrap_or(false);

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM products
            WHERE deleted_at IS NULL
              AND ($1::text IS NULL OR name ILIKE $1 OR sku ILIKE $1 OR barcode ILIKE $1)
              AND ($2::uuid IS NULL OR category_id = $2)
              AND ($3::uuid IS NULL OR brand_id = $3)
              AND ($4::boolean IS NULL OR is_active = $4)
              AND (NOT $5 OR stock_quantity <= min_stock_level)
            "#,
        )
        .bind(&pattern)
        .bind(filter.category_id)
        .bind(filter.brand_id)
        .bind(filter.is_active)
        .bind(low_stock)
        .fetch_one(&self.db)
        .await?;

        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT * FROM products
            WHERE deleted_at IS NULL
              AND ($1::text IS NULL OR name ILIKE $1 OR sku ILIKE $1 OR barcode ILIKE $1)
              AND ($2::uuid IS NULL OR category_id = $2)
              AND ($3::uuid IS NULL OR brand_id = $3)
              AND ($4::boolean IS NULL OR is_active = $4)
              AND (NOT $5 OR stock_quantity <= min_stock_level)
            ORDER BY name
            LIMIT $6 OFFSET $7
            "#,
        )
        .bind(&pattern)
        .bind(filter.category_id)
        .bind(filter.brand_id)
        .bind(filter.is_active)
        .bind(low_stock)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let views = products.into_iter().map(ProductView::from).collect();
        Ok(PaginatedResponse::new(views, pagination, total as u64))
    }

    pub async fn get_product(&self, product_id: Uuid) -> AppResult<ProductView> {
        let mut conn = self.db.acquire().await?;
        Ok(fetch_product(&mut conn, product_id).await?.into())
    }

    /// Create a product, posting its opening stock when given
    pub async fn create_product(
        &self,
        input: CreateProductInput,
        actor: Option<Uuid>,
    ) -> AppResult<ProductView> {
        input.validate()?;
        let sku = input.sku.trim().to_uppercase();
        ProductFields {
            sku: Some(&sku),
            barcode: input.barcode.as_deref(),
            unit_price: Some(input.unit_price),
            cost_price: Some(input.cost_price),
            tax_rate: input.tax_rate,
            min_stock_level: input.min_stock_level,
            max_stock_level: input.max_stock_level,
        }
        .check()?;

        let mut tx = self.db.begin().await?;
        ensure_classification(&mut tx, input.category_id, input.brand_id).await?;

        let product = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (
                name, description, sku, barcode, category_id, brand_id, unit_price, cost_price,
                min_stock_level, max_stock_level, unit_of_measure, tax_rate, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(&sku)
        .bind(&input.barcode)
        .bind(input.category_id)
        .bind(input.brand_id)
        .bind(input.unit_price)
        .bind(input.cost_price)
        .bind(input.min_stock_level.unwrap_or(0))
        .bind(input.max_stock_level)
        .bind(input.unit_of_measure.as_deref().unwrap_or("unit"))
        .bind(input.tax_rate.unwrap_or(self.default_tax_rate))
        .bind(input.is_active.unwrap_or(true))
        .fetch_one(&mut *tx)
        .await?;

        let product = match input.initial_stock {
            Some(stock) if stock.quantity != 0 => {
                ensure_site(&mut tx, stock.warehouse_id, stock.location_id).await?;
                StockLedger::post(&mut tx, &stock.opening_request(product.id, actor)).await?;
                fetch_product(&mut tx, product.id).await?
            }
            _ => product,
        };

        tx.commit().await?;

        tracing::info!(product_id = %product.id, sku = %product.sku, "product created");
        Ok(product.into())
    }

    pub async fn update_product(
        &self,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> AppResult<ProductView> {
        input.validate()?;
        let sku = input.sku.as_deref().map(|s| s.trim().to_uppercase());

        let mut tx = self.db.begin().await?;
        let existing = fetch_product(&mut tx, product_id).await?;
        ProductFields {
            sku: sku.as_deref(),
            barcode: input.barcode.as_deref(),
            unit_price: input.unit_price,
            cost_price: input.cost_price,
            tax_rate: input.tax_rate,
            min_stock_level: Some(input.min_stock_level.unwrap_or(existing.min_stock_level)),
            max_stock_level: input.max_stock_level.or(existing.max_stock_level),
        }
        .check()?;
        ensure_classification(&mut tx, input.category_id, input.brand_id).await?;

        let product = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products
            SET name = COALESCE($1, name),
                description = COALESCE($2, description),
                sku = COALESCE($3, sku),
                barcode = COALESCE($4, barcode),
                category_id = COALESCE($5, category_id),
                brand_id = COALESCE($6, brand_id),
                unit_price = COALESCE($7, unit_price),
                cost_price = COALESCE($8, cost_price),
                min_stock_level = COALESCE($9, min_stock_level),
                max_stock_level = COALESCE($10, max_stock_level),
                unit_of_measure = COALESCE($11, unit_of_measure),
                tax_rate = COALESCE($12, tax_rate),
                is_active = COALESCE($13, is_active),
                updated_at = NOW()
            WHERE id = $14
            RETURNING *
            "#,
        )
        .bind(input.name.as_deref().map(str::trim))
        .bind(&input.description)
        .bind(&sku)
        .bind(&input.barcode)
        .bind(input.category_id)
        .bind(input.brand_id)
        .bind(input.unit_price)
        .bind(input.cost_price)
        .bind(input.min_stock_level)
        .bind(input.max_stock_level)
        .bind(&input.unit_of_measure)
        .bind(input.tax_rate)
        .bind(input.is_active)
        .bind(product_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(product.into())
    }

    /// Soft-delete a product no document or movement references
    pub async fn delete_product(&self, product_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        let product = fetch_product(&mut tx, product_id).await?;

        let referenced: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(SELECT 1 FROM stock_movements WHERE product_id = $1)
                OR EXISTS(SELECT 1 FROM sale_items WHERE product_id = $1)
                OR EXISTS(SELECT 1 FROM stock_adjustment_items WHERE product_id = $1)
                OR EXISTS(SELECT 1 FROM stock_transfer_items WHERE product_id = $1)
            "#,
        )
        .bind(product_id)
        .fetch_one(&mut *tx)
        .await?;
        if referenced || product.stock_quantity != 0 {
            return Err(AppError::conflict(
                "product",
                "Product has stock history or open documents and cannot be deleted",
            ));
        }

        sqlx::query("UPDATE products SET deleted_at = NOW(), is_active = FALSE, updated_at = NOW() WHERE id = $1")
            .bind(product_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(product_id = %product_id, "product deleted");
        Ok(())
    }
}

pub(crate) async fn fetch_product(conn: &mut PgConnection, product_id: Uuid) -> AppResult<Product> {
    sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1 AND deleted_at IS NULL")
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))
}

async fn ensure_classification(
    conn: &mut PgConnection,
    category_id: Option<Uuid>,
    brand_id: Option<Uuid>,
) -> AppResult<()> {
    if let Some(category_id) = category_id {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1)")
            .bind(category_id)
            .fetch_one(&mut *conn)
            .await?;
        if !exists {
            return Err(AppError::NotFound("Category".to_string()));
        }
    }
    if let Some(brand_id) = brand_id {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM brands WHERE id = $1)")
            .bind(brand_id)
            .fetch_one(&mut *conn)
            .await?;
        if !exists {
            return Err(AppError::NotFound("Brand".to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> ProductFields<'static> {
        ProductFields {
            sku: Some("CAFE-500"),
            barcode: Some("7702001234567"),
            unit_price: Some(Decimal::from(18_000)),
            cost_price: Some(Decimal::from(12_000)),
            tax_rate: Some(Decimal::from(19)),
            min_stock_level: Some(5),
            max_stock_level: Some(100),
        }
    }

    #[test]
    fn test_valid_fields() {
        assert!(fields().check().is_ok());
    }

    #[test]
    fn test_opening_stock_is_an_unreferenced_purchase() {
        let product_id = Uuid::new_v4();
        let stock = InitialStockInput {
            warehouse_id: Uuid::new_v4(),
            location_id: None,
            quantity: 40,
        };
        let request = stock.opening_request(product_id, None);
        assert_eq!(request.product_id, product_id);
        assert_eq!(request.movement_type, MovementType::Purchase);
        assert_eq!(request.quantity_delta, 40);
        assert!(request.reference.is_none());
    }

    #[test]
    fn test_rejects_inverted_levels() {
        let f = ProductFields {
            min_stock_level: Some(50),
            max_stock_level: Some(10),
            ..fields()
        };
        assert!(matches!(f.check(), Err(AppError::Validation { ref field, .. }) if field == "max_stock_level"));
    }

    #[test]
    fn test_rejects_bad_sku_and_price() {
        let f = ProductFields { sku: Some("cafe"), ..fields() };
        assert!(f.check().is_err());
        let f = ProductFields {
            cost_price: Some(Decimal::from(-1)),
            ..fields()
        };
        assert!(f.check().is_err());
    }
}
