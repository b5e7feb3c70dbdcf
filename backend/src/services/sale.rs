//! Sale service
//!
//! Sales are drafted against one warehouse (optionally one location) and
//! only touch stock when completed. Completion and cancellation lock the
//! sale row, re-check its status and post every line through the stock
//! ledger in the same transaction.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{
    aggregate_requests, check_availability, completed_total, require_positive_quantity,
    validate_non_negative_amount, DocumentKind, DomainResult, Lifecycle, LineTotals,
    PaginatedResponse, Pagination, Payment, PaymentMethod, PaymentStatus, PaymentTerms, Sale,
    SaleItem, SaleStatus,
};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::customer::{fetch_customer, outstanding_balance};
use super::sequence::next_number;
use super::stock::{ensure_site, site_quantities, StockLedger};
use crate::config::Config;
use crate::error::{AppError, AppResult};

#[derive(Debug, Default, Deserialize)]
pub struct SaleFilter {
    pub status: Option<SaleStatus>,
    pub customer_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    pub payment_status: Option<PaymentStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct SaleItemInput {
    pub product_id: Uuid,
    pub quantity: i32,
    /// Defaults to the product's list price
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub discount_amount: Decimal,
    /// Line VAT percentage; falls back to the product's, then the configured default
    pub tax_rate: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSaleInput {
    pub customer_id: Option<Uuid>,
    pub warehouse_id: Uuid,
    pub location_id: Option<Uuid>,
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub order_discount: Decimal,
    #[serde(default)]
    pub requires_electronic_invoice: bool,
    pub notes: Option<String>,
    pub items: Vec<SaleItemInput>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSaleInput {
    pub customer_id: Option<Uuid>,
    pub payment_method: Option<PaymentMethod>,
    pub order_discount: Option<Decimal>,
    pub requires_electronic_invoice: Option<bool>,
    pub notes: Option<String>,
    /// Replaces every line when present
    pub items: Option<Vec<SaleItemInput>>,
}

/// Product fields a sale line is priced from
#[derive(Debug, Clone, sqlx::FromRow)]
struct PricedProduct {
    id: Uuid,
    unit_price: Decimal,
    tax_rate: Decimal,
    is_active: bool,
}

/// Price one line: explicit values first, then the product, then `default_tax_rate`
fn price_line(
    input: &SaleItemInput,
    product: &PricedProduct,
    default_tax_rate: Decimal,
) -> AppResult<(Decimal, Decimal, LineTotals)> {
    require_positive_quantity("quantity", input.quantity)?;
    let unit_price = input.unit_price.unwrap_or(product.unit_price);
    validate_non_negative_amount(unit_price).map_err(|msg| AppError::validation("unit_price", msg))?;
    validate_non_negative_amount(input.discount_amount)
        .map_err(|msg| AppError::validation("discount_amount", msg))?;

    let tax_rate = match input.tax_rate {
        Some(rate) => rate,
        None if product.tax_rate > Decimal::ZERO => product.tax_rate,
        None => default_tax_rate,
    };
    if tax_rate < Decimal::ZERO || tax_rate > Decimal::from(100) {
        return Err(AppError::validation("tax_rate", "Tax rate must be between 0 and 100"));
    }

    let totals = LineTotals::compute(input.quantity, unit_price, input.discount_amount, tax_rate)?;
    if totals.discount > totals.subtotal {
        return Err(AppError::validation(
            "discount_amount",
            "Discount cannot exceed the line subtotal",
        ));
    }
    Ok((unit_price, tax_rate, totals))
}

#[derive(Clone)]
pub struct SaleService {
    db: PgPool,
    config: Arc<Config>,
}

impl SaleService {
    pub fn new(db: PgPool, config: Arc<Config>) -> Self {
        Self { db, config }
    }

    pub async fn list_sales(
        &self,
        filter: &SaleFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<Sale>> {
        let today = Utc::now().date_naive();
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM sales
            WHERE ($1::sale_status IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR customer_id = $2)
              AND ($3::uuid IS NULL OR warehouse_id = $3)
              AND ($4::payment_status IS NULL OR (
                    CASE WHEN status = 'completed'
                          AND payment_status IN ('pending', 'partial')
                          AND due_date < $7
                         THEN 'overdue'::payment_status
                         ELSE payment_status
                    END) = $4)
              AND ($5::date IS NULL OR COALESCE(sale_date, created_at) >= $5::date)
              AND ($6::date IS NULL OR COALESCE(sale_date, created_at) < $6::date + INTERVAL '1 day')
            "#,
        )
        .bind(filter.status)
        .bind(filter.customer_id)
        .bind(filter.warehouse_id)
        .bind(filter.payment_status)
        .bind(filter.date_from)
        .bind(filter.date_to)
        .bind(today)
        .fetch_one(&self.db)
        .await?;

        let sales: Vec<Sale> = sqlx::query_as::<_, Sale>(
            r#"
            SELECT * FROM sales
            WHERE ($1::sale_status IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR customer_id = $2)
              AND ($3::uuid IS NULL OR warehouse_id = $3)
              AND ($4::payment_status IS NULL OR (
                    CASE WHEN status = 'completed'
                          AND payment_status IN ('pending', 'partial')
                          AND due_date < $9
                         THEN 'overdue'::payment_status
                         ELSE payment_status
                    END) = $4)
              AND ($5::date IS NULL OR COALESCE(sale_date, created_at) >= $5::date)
              AND ($6::date IS NULL OR COALESCE(sale_date, created_at) < $6::date + INTERVAL '1 day')
            ORDER BY created_at DESC
            LIMIT $7 OFFSET $8
            "#,
        )
        .bind(filter.status)
        .bind(filter.customer_id)
        .bind(filter.warehouse_id)
        .bind(filter.payment_status)
        .bind(filter.date_from)
        .bind(filter.date_to)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .bind(today)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(|mut sale| {
            sale.payment_status = sale.payment_status_on(today);
            sale
        })
        .collect();

        Ok(PaginatedResponse::new(sales, pagination, total as u64))
    }

    /// Sale with its items and payments
    pub async fn get_sale(&self, sale_id: Uuid) -> AppResult<Sale> {
        let mut conn = self.db.acquire().await?;
        let mut sale = load_sale(&mut conn, sale_id, false).await?;
        sale.payments = fetch_payments(&mut conn, sale_id).await?;
        sale.payment_status = sale.payment_status_on(Utc::now().date_naive());
        Ok(sale)
    }

    /// Draft a sale; every line must be covered by stock at the sale's site
    pub async fn create_sale(&self, input: CreateSaleInput, seller: Option<Uuid>) -> AppResult<Sale> {
        let mut tx = self.db.begin().await?;
        let sale = self.draft_sale(&mut tx, input, seller).await?;
        tx.commit().await?;

        tracing::info!(
            sale_id = %sale.id,
            sale_number = %sale.sale_number,
            total = %sale.total_amount,
            "sale drafted"
        );
        Ok(sale)
    }

    /// Insert a draft sale and its lines inside the caller's transaction
    pub(crate) async fn draft_sale(
        &self,
        conn: &mut PgConnection,
        input: CreateSaleInput,
        seller: Option<Uuid>,
    ) -> AppResult<Sale> {
        validate_non_negative_amount(input.order_discount)
            .map_err(|msg| AppError::validation("order_discount", msg))?;

        ensure_site(&mut *conn, input.warehouse_id, input.location_id).await?;
        if let Some(customer_id) = input.customer_id {
            ensure_active_customer(&mut *conn, customer_id).await?;
        }

        let sale_number = next_number(&mut *conn, DocumentKind::Sale, Utc::now().date_naive()).await?;
        let mut sale = sqlx::query_as::<_, Sale>(
            r#"
            INSERT INTO sales (
                sale_number, customer_id, warehouse_id, location_id, seller_id, status,
                payment_method, payment_status, order_discount, requires_electronic_invoice, notes
            )
            VALUES ($1, $2, $3, $4, $5, 'draft', $6, 'pending', $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(&sale_number)
        .bind(input.customer_id)
        .bind(input.warehouse_id)
        .bind(input.location_id)
        .bind(seller)
        .bind(input.payment_method.unwrap_or(PaymentMethod::Cash))
        .bind(input.order_discount)
        .bind(input.requires_electronic_invoice)
        .bind(&input.notes)
        .fetch_one(&mut *conn)
        .await?;

        self.replace_items(&mut *conn, &mut sale, &input.items).await?;
        Ok(sale)
    }

    pub async fn update_sale(&self, sale_id: Uuid, input: UpdateSaleInput) -> AppResult<Sale> {
        if let Some(discount) = input.order_discount {
            validate_non_negative_amount(discount)
                .map_err(|msg| AppError::validation("order_discount", msg))?;
        }

        let mut tx = self.db.begin().await?;
        let mut sale = load_sale(&mut tx, sale_id, true).await?;
        refuse_logged(sale.ensure_editable(), sale_id, "update")?;

        if let Some(customer_id) = input.customer_id {
            ensure_active_customer(&mut tx, customer_id).await?;
            sale.customer_id = Some(customer_id);
        }
        if let Some(method) = input.payment_method {
            sale.payment_method = method;
        }
        if let Some(discount) = input.order_discount {
            sale.order_discount = discount;
        }
        if let Some(flag) = input.requires_electronic_invoice {
            sale.requires_electronic_invoice = flag;
        }
        if input.notes.is_some() {
            sale.notes = input.notes;
        }

        match input.items {
            Some(items) => self.replace_items(&mut tx, &mut sale, &items).await?,
            None => {
                sale.recalculate();
                save_sale(&mut tx, &sale).await?;
            }
        }
        tx.commit().await?;

        tracing::info!(sale_id = %sale_id, total = %sale.total_amount, "sale updated");
        Ok(sale)
    }

    /// Delete a draft sale
    pub async fn delete_sale(&self, sale_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        let sale = load_sale(&mut tx, sale_id, true).await?;
        refuse_logged(sale.ensure_editable(), sale_id, "delete")?;

        let payments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE sale_id = $1")
            .bind(sale_id)
            .fetch_one(&mut *tx)
            .await?;
        if payments > 0 {
            return Err(AppError::conflict(
                "sale",
                format!("Sale has {} payment(s)", payments),
            ));
        }

        sqlx::query("DELETE FROM sale_items WHERE sale_id = $1")
            .bind(sale_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sales WHERE id = $1")
            .bind(sale_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(sale_id = %sale_id, "sale deleted");
        Ok(())
    }

    /// Complete the sale, drawing every line from stock
    pub async fn complete_sale(&self, sale_id: Uuid, actor: Option<Uuid>) -> AppResult<Sale> {
        let mut tx = self.db.begin().await?;
        let mut sale = load_sale(&mut tx, sale_id, true).await?;
        refuse_logged(sale.status.transition(SaleStatus::Completed, "complete"), sale_id, "complete")?;

        let now = Utc::now();
        let customer = match sale.customer_id {
            Some(customer_id) => Some(fetch_customer(&mut tx, customer_id).await?),
            None => None,
        };

        if sale.payment_method == PaymentMethod::Credit {
            let customer = customer.as_ref().ok_or_else(|| {
                AppError::validation("customer_id", "Credit sales need a customer")
            })?;
            let outstanding = outstanding_balance(&mut tx, customer.id).await?;
            if !customer.has_available_credit(outstanding, sale.total_amount) {
                tracing::warn!(
                    sale_id = %sale_id,
                    customer_id = %customer.id,
                    outstanding = %outstanding,
                    "sale refused: credit limit exceeded"
                );
                return Err(AppError::validation(
                    "payment_method",
                    format!(
                        "Customer credit limit exceeded (available {})",
                        customer.available_credit(outstanding)
                    ),
                ));
            }
        }

        let invoice_number = if sale.needs_invoice_number() {
            Some(next_number(&mut tx, DocumentKind::SaleInvoice, now.date_naive()).await?)
        } else {
            None
        };
        let terms: Option<PaymentTerms> = customer.as_ref().map(|c| c.payment_terms);

        let plan = refuse_logged(sale.complete(invoice_number, terms, actor, now), sale_id, "complete")?;
        let movements = StockLedger::post_all(&mut tx, &plan).await?;

        let payments = fetch_payments(&mut tx, sale_id).await?;
        sale.refresh_payment_status(completed_total(&payments), now.date_naive());
        if sale.requires_electronic_invoice(self.config.invoicing.electronic_invoice_threshold) {
            sale.requires_electronic_invoice = true;
        }
        save_sale(&mut tx, &sale).await?;
        tx.commit().await?;

        sale.payments = payments;
        tracing::info!(
            sale_id = %sale_id,
            sale_number = %sale.sale_number,
            movements = movements.len(),
            total = %sale.total_amount,
            "sale completed"
        );
        Ok(sale)
    }

    /// Cancel the sale; a completed sale returns its stock
    pub async fn cancel_sale(&self, sale_id: Uuid, actor: Option<Uuid>) -> AppResult<Sale> {
        let mut tx = self.db.begin().await?;
        let mut sale = load_sale(&mut tx, sale_id, true).await?;
        let plan = refuse_logged(sale.cancel(actor), sale_id, "cancel")?;

        let movements = StockLedger::post_all(&mut tx, &plan).await?;
        save_sale(&mut tx, &sale).await?;
        tx.commit().await?;

        tracing::info!(sale_id = %sale_id, returned = movements.len(), "sale cancelled");
        Ok(sale)
    }

    pub async fn sale_payments(&self, sale_id: Uuid) -> AppResult<Vec<Payment>> {
        let mut conn = self.db.acquire().await?;
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sales WHERE id = $1)")
            .bind(sale_id)
            .fetch_one(&mut *conn)
            .await?;
        if !exists {
            return Err(AppError::NotFound("Sale".to_string()));
        }
        fetch_payments(&mut conn, sale_id).await
    }

    /// Price and insert `items` in place of the sale's lines, check them
    /// against site stock and refresh the header totals
    async fn replace_items(
        &self,
        conn: &mut PgConnection,
        sale: &mut Sale,
        items: &[SaleItemInput],
    ) -> AppResult<()> {
        if items.is_empty() {
            return Err(AppError::validation("items", "A sale needs at least one item"));
        }

        let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let products: HashMap<Uuid, PricedProduct> = sqlx::query_as::<_, PricedProduct>(
            r#"
            SELECT id, unit_price, tax_rate, is_active
            FROM products WHERE id = ANY($1) AND deleted_at IS NULL
            "#,
        )
        .bind(&product_ids)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

        let requested = aggregate_requests(items.iter().map(|i| (i.product_id, i.quantity)));
        let available = site_quantities(conn, sale.warehouse_id, sale.location_id, &product_ids).await?;
        if let Err(err) = check_availability(&requested, &available) {
            tracing::warn!(sale_id = %sale.id, "sale line refused: {}", err);
            return Err(err.into());
        }

        sqlx::query("DELETE FROM sale_items WHERE sale_id = $1")
            .bind(sale.id)
            .execute(&mut *conn)
            .await?;

        let default_tax_rate = self.config.sales.default_tax_rate;
        let mut saved = Vec::with_capacity(items.len());
        for item in items {
            let product = products
                .get(&item.product_id)
                .ok_or_else(|| AppError::NotFound(format!("Product {}", item.product_id)))?;
            if !product.is_active {
                return Err(AppError::validation(
                    "product_id",
                    format!("Product {} is inactive", item.product_id),
                ));
            }
            let (unit_price, tax_rate, totals) = price_line(item, product, default_tax_rate)?;

            let line = sqlx::query_as::<_, SaleItem>(
                r#"
                INSERT INTO sale_items (
                    sale_id, product_id, quantity, unit_price, discount_amount, tax_rate,
                    subtotal, tax_amount, total_amount
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING *
                "#,
            )
            .bind(sale.id)
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(unit_price)
            .bind(totals.discount)
            .bind(tax_rate)
            .bind(totals.subtotal)
            .bind(totals.tax)
            .bind(totals.total)
            .fetch_one(&mut *conn)
            .await?;
            saved.push(line);
        }

        sale.items = saved;
        sale.recalculate();
        if sale.total_amount < Decimal::ZERO {
            return Err(AppError::validation(
                "order_discount",
                "Discount cannot exceed the sale subtotal",
            ));
        }
        save_sale(conn, sale).await
    }
}

fn refuse_logged<T>(result: DomainResult<T>, sale_id: Uuid, action: &str) -> AppResult<T> {
    result.map_err(|err| {
        tracing::warn!(sale_id = %sale_id, action, "sale transition refused: {}", err);
        AppError::from(err)
    })
}

pub(crate) async fn ensure_active_customer(conn: &mut PgConnection, customer_id: Uuid) -> AppResult<()> {
    let customer = fetch_customer(conn, customer_id).await?;
    if !customer.is_active {
        return Err(AppError::validation("customer_id", "Customer is inactive"));
    }
    Ok(())
}

/// Load a sale and its items, optionally locking the sale row
pub(crate) async fn load_sale(conn: &mut PgConnection, sale_id: Uuid, lock: bool) -> AppResult<Sale> {
    let sql = if lock {
        "SELECT * FROM sales WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT * FROM sales WHERE id = $1"
    };
    let mut sale = sqlx::query_as::<_, Sale>(sql)
        .bind(sale_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Sale".to_string()))?;

    sale.items = sqlx::query_as::<_, SaleItem>("SELECT * FROM sale_items WHERE sale_id = $1 ORDER BY id")
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(sale)
}

pub(crate) async fn fetch_payments(conn: &mut PgConnection, sale_id: Uuid) -> AppResult<Vec<Payment>> {
    let payments = sqlx::query_as::<_, Payment>(
        "SELECT * FROM payments WHERE sale_id = $1 ORDER BY payment_date, created_at",
    )
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(payments)
}

/// Persist the header fields a sale's lifecycle and totals change
pub(crate) async fn save_sale(conn: &mut PgConnection, sale: &Sale) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE sales
        SET customer_id = $1, status = $2, sale_date = $3, payment_method = $4,
            payment_status = $5, subtotal = $6, tax_amount = $7, order_discount = $8,
            discount_amount = $9, total_amount = $10, invoice_number = $11,
            invoice_date = $12, due_date = $13, requires_electronic_invoice = $14,
            electronic_invoice_sent = $15, electronic_invoice_sent_at = $16,
            notes = $17, updated_at = NOW()
        WHERE id = $18
        "#,
    )
    .bind(sale.customer_id)
    .bind(sale.status)
    .bind(sale.sale_date)
    .bind(sale.payment_method)
    .bind(sale.payment_status)
    .bind(sale.subtotal)
    .bind(sale.tax_amount)
    .bind(sale.order_discount)
    .bind(sale.discount_amount)
    .bind(sale.total_amount)
    .bind(&sale.invoice_number)
    .bind(sale.invoice_date)
    .bind(sale.due_date)
    .bind(sale.requires_electronic_invoice)
    .bind(sale.electronic_invoice_sent)
    .bind(sale.electronic_invoice_sent_at)
    .bind(&sale.notes)
    .bind(sale.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(price: i64, tax: i64) -> PricedProduct {
        PricedProduct {
            id: Uuid::new_v4(),
            unit_price: Decimal::from(price),
            tax_rate: Decimal::from(tax),
            is_active: true,
        }
    }

    fn line(product_id: Uuid, quantity: i32) -> SaleItemInput {
        SaleItemInput {
            product_id,
            quantity,
            unit_price: None,
            discount_amount: Decimal::ZERO,
            tax_rate: None,
        }
    }

    #[test]
    fn test_price_line_falls_back_to_product_then_default() {
        let taxed = product(1000, 5);
        let (price, rate, totals) = price_line(&line(taxed.id, 2), &taxed, Decimal::from(19)).unwrap();
        assert_eq!(price, Decimal::from(1000));
        assert_eq!(rate, Decimal::from(5));
        assert_eq!(totals.total, Decimal::from(2100));

        let untaxed = product(1000, 0);
        let (_, rate, _) = price_line(&line(untaxed.id, 1), &untaxed, Decimal::from(19)).unwrap();
        assert_eq!(rate, Decimal::from(19));

        let mut explicit = line(untaxed.id, 1);
        explicit.tax_rate = Some(Decimal::ZERO);
        let (_, rate, _) = price_line(&explicit, &untaxed, Decimal::from(19)).unwrap();
        assert_eq!(rate, Decimal::ZERO);
    }

    #[test]
    fn test_price_line_rejects_bad_lines() {
        let p = product(100, 19);
        assert!(price_line(&line(p.id, 0), &p, Decimal::from(19)).is_err());

        let mut discounted = line(p.id, 1);
        discounted.discount_amount = Decimal::from(150);
        assert!(price_line(&discounted, &p, Decimal::from(19)).is_err());

        let mut negative = line(p.id, 1);
        negative.unit_price = Some(Decimal::from(-1));
        assert!(price_line(&negative, &p, Decimal::from(19)).is_err());
    }
}
