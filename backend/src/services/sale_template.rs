//! Sale template service
//!
//! Templates are priced when they are read or used, never when saved, so
//! the estimated total and the drafted sale follow current product prices.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    copy_name, require_positive_quantity, validate_percentage, PaginatedResponse, Pagination,
    PaymentMethod, ProductPrice, Sale, SaleTemplate, SaleTemplateItem, TemplateLine,
};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use super::sale::{ensure_active_customer, CreateSaleInput, SaleItemInput, SaleService};
use super::search_pattern;
use super::stock::ensure_site;
use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Template with the total a sale drafted from it would have today
#[derive(Debug, Serialize)]
pub struct SaleTemplateView {
    #[serde(flatten)]
    pub template: SaleTemplate,
    /// `None` when a line's product is no longer sold
    pub estimated_total: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TemplateFilter {
    pub search: Option<String>,
    pub customer_id: Option<Uuid>,
    pub is_active: Option<bool>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct MostUsedQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TemplateItemInput {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTemplateInput {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,
    pub description: Option<String>,
    pub customer_id: Option<Uuid>,
    pub warehouse_id: Uuid,
    pub location_id: Option<Uuid>,
    pub payment_method: Option<PaymentMethod>,
    pub discount_percentage: Option<Decimal>,
    pub tax_rate: Option<Decimal>,
    pub notes: Option<String>,
    pub is_active: Option<bool>,
    pub items: Vec<TemplateItemInput>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTemplateInput {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub customer_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub payment_method: Option<PaymentMethod>,
    pub discount_percentage: Option<Decimal>,
    pub tax_rate: Option<Decimal>,
    pub notes: Option<String>,
    pub is_active: Option<bool>,
    /// Replaces every line when present
    pub items: Option<Vec<TemplateItemInput>>,
}

/// Overrides for a sale drafted from a template; all optional
#[derive(Debug, Default, Deserialize)]
pub struct TemplateSaleInput {
    pub customer_id: Option<Uuid>,
    /// A different site; its location is then taken from this input only
    pub warehouse_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub notes: Option<String>,
}

fn check_rates(discount_percentage: Option<Decimal>, tax_rate: Option<Decimal>) -> AppResult<()> {
    if let Some(discount) = discount_percentage {
        validate_percentage(discount).map_err(|msg| AppError::validation("discount_percentage", msg))?;
    }
    if let Some(rate) = tax_rate {
        validate_percentage(rate).map_err(|msg| AppError::validation("tax_rate", msg))?;
    }
    Ok(())
}

fn check_items(items: &[TemplateItemInput]) -> AppResult<()> {
    if items.is_empty() {
        return Err(AppError::validation("items", "A sale template needs at least one item"));
    }
    for item in items {
        require_positive_quantity("quantity", item.quantity)?;
    }
    Ok(())
}

/// Sale draft for `template`, with the caller's overrides applied
fn sale_input(template: &SaleTemplate, lines: Vec<TemplateLine>, overrides: TemplateSaleInput) -> CreateSaleInput {
    let (warehouse_id, location_id) = match overrides.warehouse_id {
        Some(warehouse_id) => (warehouse_id, overrides.location_id),
        None => (template.warehouse_id, overrides.location_id.or(template.location_id)),
    };
    CreateSaleInput {
        customer_id: overrides.customer_id.or(template.customer_id),
        warehouse_id,
        location_id,
        payment_method: Some(template.payment_method),
        order_discount: Decimal::ZERO,
        requires_electronic_invoice: false,
        notes: overrides.notes.or_else(|| template.notes.clone()),
        items: lines
            .into_iter()
            .map(|line| SaleItemInput {
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: Some(line.unit_price),
                discount_amount: line.discount_amount,
                tax_rate: Some(line.tax_rate),
            })
            .collect(),
    }
}

#[derive(Clone)]
pub struct SaleTemplateService {
    db: PgPool,
    config: Arc<Config>,
}

impl SaleTemplateService {
    pub fn new(db: PgPool, config: Arc<Config>) -> Self {
        Self { db, config }
    }

    pub async fn list_templates(
        &self,
        filter: &TemplateFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<SaleTemplateView>> {
        let pattern = search_pattern(filter.search.as_deref());

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM sale_templates
            WHERE ($1::text IS NULL OR name ILIKE $1 OR description ILIKE $1)
              AND ($2::uuid IS NULL OR customer_id = $2)
              AND ($3::boolean IS NULL OR is_active = $3)
              AND ($4::uuid IS NULL OR created_by = $4)
            "#,
        )
        .bind(&pattern)
        .bind(filter.customer_id)
        .bind(filter.is_active)
        .bind(filter.created_by)
        .fetch_one(&self.db)
        .await?;

        let templates = sqlx::query_as::<_, SaleTemplate>(
            r#"
            SELECT * FROM sale_templates
            WHERE ($1::text IS NULL OR name ILIKE $1 OR description ILIKE $1)
              AND ($2::uuid IS NULL OR customer_id = $2)
              AND ($3::boolean IS NULL OR is_active = $3)
              AND ($4::uuid IS NULL OR created_by = $4)
            ORDER BY usage_count DESC, name
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(&pattern)
        .bind(filter.customer_id)
        .bind(filter.is_active)
        .bind(filter.created_by)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let mut conn = self.db.acquire().await?;
        let views = self.views(&mut conn, templates).await?;
        Ok(PaginatedResponse::new(views, pagination, total as u64))
    }

    /// Active templates, most used first
    pub async fn most_used(&self, limit: Option<i64>) -> AppResult<Vec<SaleTemplateView>> {
        let templates = sqlx::query_as::<_, SaleTemplate>(
            r#"
            SELECT * FROM sale_templates
            WHERE is_active
            ORDER BY usage_count DESC, last_used_at DESC NULLS LAST
            LIMIT $1
            "#,
        )
        .bind(limit.unwrap_or(10).clamp(1, 100))
        .fetch_all(&self.db)
        .await?;

        let mut conn = self.db.acquire().await?;
        self.views(&mut conn, templates).await
    }

    pub async fn get_template(&self, template_id: Uuid) -> AppResult<SaleTemplateView> {
        let mut conn = self.db.acquire().await?;
        let template = load_template(&mut conn, template_id, false).await?;
        self.view(&mut conn, template).await
    }

    pub async fn create_template(
        &self,
        input: CreateTemplateInput,
        owner: Option<Uuid>,
    ) -> AppResult<SaleTemplateView> {
        input.validate()?;
        check_rates(input.discount_percentage, input.tax_rate)?;
        check_items(&input.items)?;

        let mut tx = self.db.begin().await?;
        ensure_site(&mut tx, input.warehouse_id, input.location_id).await?;
        if let Some(customer_id) = input.customer_id {
            ensure_active_customer(&mut tx, customer_id).await?;
        }

        let template = sqlx::query_as::<_, SaleTemplate>(
            r#"
            INSERT INTO sale_templates (
                name, description, created_by, customer_id, warehouse_id, location_id,
                payment_method, discount_percentage, tax_rate, notes, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(owner)
        .bind(input.customer_id)
        .bind(input.warehouse_id)
        .bind(input.location_id)
        .bind(input.payment_method.unwrap_or(PaymentMethod::Cash))
        .bind(input.discount_percentage.unwrap_or(Decimal::ZERO))
        .bind(input.tax_rate)
        .bind(&input.notes)
        .bind(input.is_active.unwrap_or(true))
        .fetch_one(&mut *tx)
        .await?;

        replace_items(&mut tx, template.id, &input.items).await?;
        let template = load_template(&mut tx, template.id, false).await?;
        tx.commit().await?;

        tracing::info!(template_id = %template.id, name = %template.name, "sale template created");
        let mut conn = self.db.acquire().await?;
        self.view(&mut conn, template).await
    }

    pub async fn update_template(
        &self,
        template_id: Uuid,
        input: UpdateTemplateInput,
    ) -> AppResult<SaleTemplateView> {
        input.validate()?;
        check_rates(input.discount_percentage, input.tax_rate)?;
        if let Some(items) = &input.items {
            check_items(items)?;
        }

        let mut tx = self.db.begin().await?;
        let current = load_template(&mut tx, template_id, true).await?;
        let warehouse_id = input.warehouse_id.unwrap_or(current.warehouse_id);
        let location_id = input.location_id.or(current.location_id);
        ensure_site(&mut tx, warehouse_id, location_id).await?;
        if let Some(customer_id) = input.customer_id {
            ensure_active_customer(&mut tx, customer_id).await?;
        }

        sqlx::query(
            r#"
            UPDATE sale_templates
            SET name = COALESCE($1, name),
                description = COALESCE($2, description),
                customer_id = COALESCE($3, customer_id),
                warehouse_id = $4,
                location_id = $5,
                payment_method = COALESCE($6, payment_method),
                discount_percentage = COALESCE($7, discount_percentage),
                tax_rate = COALESCE($8, tax_rate),
                notes = COALESCE($9, notes),
                is_active = COALESCE($10, is_active),
                updated_at = NOW()
            WHERE id = $11
            "#,
        )
        .bind(input.name.as_deref().map(str::trim))
        .bind(&input.description)
        .bind(input.customer_id)
        .bind(warehouse_id)
        .bind(location_id)
        .bind(input.payment_method)
        .bind(input.discount_percentage)
        .bind(input.tax_rate)
        .bind(&input.notes)
        .bind(input.is_active)
        .bind(template_id)
        .execute(&mut *tx)
        .await?;

        if let Some(items) = &input.items {
            replace_items(&mut tx, template_id, items).await?;
        }
        let template = load_template(&mut tx, template_id, false).await?;
        tx.commit().await?;

        let mut conn = self.db.acquire().await?;
        self.view(&mut conn, template).await
    }

    pub async fn delete_template(&self, template_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM sale_templates WHERE id = $1")
            .bind(template_id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Sale template".to_string()));
        }
        tracing::info!(template_id = %template_id, "sale template deleted");
        Ok(())
    }

    pub async fn toggle_active(&self, template_id: Uuid) -> AppResult<SaleTemplateView> {
        let mut conn = self.db.acquire().await?;
        let updated: Option<Uuid> = sqlx::query_scalar(
            "UPDATE sale_templates SET is_active = NOT is_active, updated_at = NOW() WHERE id = $1 RETURNING id",
        )
        .bind(template_id)
        .fetch_optional(&mut *conn)
        .await?;
        if updated.is_none() {
            return Err(AppError::NotFound("Sale template".to_string()));
        }

        let template = load_template(&mut conn, template_id, false).await?;
        tracing::info!(template_id = %template_id, is_active = template.is_active, "sale template toggled");
        self.view(&mut conn, template).await
    }

    /// Copy a template and its lines under a new name with a fresh usage count
    pub async fn duplicate_template(
        &self,
        template_id: Uuid,
        owner: Option<Uuid>,
    ) -> AppResult<SaleTemplateView> {
        let mut tx = self.db.begin().await?;
        let source = load_template(&mut tx, template_id, false).await?;

        let copy_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO sale_templates (
                name, description, created_by, customer_id, warehouse_id, location_id,
                payment_method, discount_percentage, tax_rate, notes, is_active
            )
            SELECT $1, description, COALESCE($2, created_by), customer_id, warehouse_id, location_id,
                   payment_method, discount_percentage, tax_rate, notes, is_active
            FROM sale_templates
            WHERE id = $3
            RETURNING id
            "#,
        )
        .bind(copy_name(&source.name))
        .bind(owner)
        .bind(template_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO sale_template_items (sale_template_id, product_id, quantity)
            SELECT $1, product_id, quantity
            FROM sale_template_items
            WHERE sale_template_id = $2
            "#,
        )
        .bind(copy_id)
        .bind(template_id)
        .execute(&mut *tx)
        .await?;

        let copy = load_template(&mut tx, copy_id, false).await?;
        tx.commit().await?;

        tracing::info!(template_id = %template_id, copy_id = %copy_id, "sale template duplicated");
        let mut conn = self.db.acquire().await?;
        self.view(&mut conn, copy).await
    }

    /// Draft a sale from an active template and count the use
    ///
    /// The sale goes through the same drafting path as any other sale, so
    /// site stock is checked for every line.
    pub async fn create_sale(
        &self,
        template_id: Uuid,
        overrides: TemplateSaleInput,
        seller: Option<Uuid>,
    ) -> AppResult<Sale> {
        let mut tx = self.db.begin().await?;
        let mut template = load_template(&mut tx, template_id, true).await?;
        template.ensure_active().map_err(|err| {
            tracing::warn!(template_id = %template_id, "sale from template refused: {}", err);
            AppError::from(err)
        })?;

        let prices = self.prices(&mut tx, &template).await?;
        let lines = template.price_lines(&prices)?;
        let input = sale_input(&template, lines, overrides);

        let sales = SaleService::new(self.db.clone(), self.config.clone());
        let sale = sales.draft_sale(&mut tx, input, seller).await?;

        template.record_use(Utc::now());
        sqlx::query("UPDATE sale_templates SET usage_count = $1, last_used_at = $2 WHERE id = $3")
            .bind(template.usage_count)
            .bind(template.last_used_at)
            .bind(template_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(
            template_id = %template_id,
            sale_id = %sale.id,
            sale_number = %sale.sale_number,
            "sale drafted from template"
        );
        Ok(sale)
    }

    /// Current prices of the template's products; VAT falls back to the configured default
    async fn prices(
        &self,
        conn: &mut PgConnection,
        template: &SaleTemplate,
    ) -> AppResult<HashMap<Uuid, ProductPrice>> {
        let product_ids: Vec<Uuid> = template.items.iter().map(|i| i.product_id).collect();
        let default_tax_rate = self.config.sales.default_tax_rate;
        let rows = sqlx::query_as::<_, (Uuid, Decimal, Decimal)>(
            r#"
            SELECT id, unit_price, tax_rate FROM products
            WHERE id = ANY($1) AND is_active AND deleted_at IS NULL
            "#,
        )
        .bind(&product_ids)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, unit_price, tax_rate)| {
                let tax_rate = if tax_rate > Decimal::ZERO { tax_rate } else { default_tax_rate };
                (id, ProductPrice { unit_price, tax_rate })
            })
            .collect())
    }

    async fn view(&self, conn: &mut PgConnection, template: SaleTemplate) -> AppResult<SaleTemplateView> {
        let prices = self.prices(conn, &template).await?;
        let estimated_total = template.estimated_total(&prices).ok();
        Ok(SaleTemplateView {
            template,
            estimated_total,
        })
    }

    async fn views(
        &self,
        conn: &mut PgConnection,
        templates: Vec<SaleTemplate>,
    ) -> AppResult<Vec<SaleTemplateView>> {
        let ids: Vec<Uuid> = templates.iter().map(|t| t.id).collect();
        let mut items: HashMap<Uuid, Vec<SaleTemplateItem>> = HashMap::new();
        for item in sqlx::query_as::<_, SaleTemplateItem>(
            "SELECT * FROM sale_template_items WHERE sale_template_id = ANY($1) ORDER BY id",
        )
        .bind(&ids)
        .fetch_all(&mut *conn)
        .await?
        {
            items.entry(item.sale_template_id).or_default().push(item);
        }

        let mut views = Vec::with_capacity(templates.len());
        for mut template in templates {
            template.items = items.remove(&template.id).unwrap_or_default();
            views.push(self.view(conn, template).await?);
        }
        Ok(views)
    }
}

async fn load_template(conn: &mut PgConnection, template_id: Uuid, lock: bool) -> AppResult<SaleTemplate> {
    let sql = if lock {
        "SELECT * FROM sale_templates WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT * FROM sale_templates WHERE id = $1"
    };
    let mut template = sqlx::query_as::<_, SaleTemplate>(sql)
        .bind(template_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Sale template".to_string()))?;

    template.items = sqlx::query_as::<_, SaleTemplateItem>(
        "SELECT * FROM sale_template_items WHERE sale_template_id = $1 ORDER BY id",
    )
    .bind(template_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(template)
}

async fn replace_items(conn: &mut PgConnection, template_id: Uuid, items: &[TemplateItemInput]) -> AppResult<()> {
    let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
    let known: i64 = sqlx::query_scalar(
        "SELECT COUNT(DISTINCT id) FROM products WHERE id = ANY($1) AND deleted_at IS NULL",
    )
    .bind(&product_ids)
    .fetch_one(&mut *conn)
    .await?;
    let distinct = product_ids.iter().collect::<std::collections::HashSet<_>>().len();
    if known as usize != distinct {
        return Err(AppError::validation("items", "Every item must reference an existing product"));
    }

    sqlx::query("DELETE FROM sale_template_items WHERE sale_template_id = $1")
        .bind(template_id)
        .execute(&mut *conn)
        .await?;
    for item in items {
        sqlx::query(
            "INSERT INTO sale_template_items (sale_template_id, product_id, quantity) VALUES ($1, $2, $3)",
        )
        .bind(template_id)
        .bind(item.product_id)
        .bind(item.quantity)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}
