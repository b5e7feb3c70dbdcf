//! Stock adjustment service
//!
//! Workflow: draft → pending → approved → applied, with cancellation
//! allowed until the adjustment is applied. Every status change locks the
//! adjustment row and re-reads its status inside the transaction, so a
//! concurrent second `apply` sees `applied` and fails.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{
    adjustment_totals, count_differences, require_non_negative_quantity, AdjustmentReason,
    AdjustmentStatus, AdjustmentType, DocumentKind, DomainResult, LineAdjustment,
    PaginatedResponse, Pagination, StockAdjustment, StockAdjustmentItem,
};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::sequence::next_number;
use super::stock::{ensure_site, site_quantities, StockLedger};
use crate::error::{AppError, AppResult};

#[derive(Debug, Default, Deserialize)]
pub struct AdjustmentFilter {
    pub status: Option<AdjustmentStatus>,
    pub warehouse_id: Option<Uuid>,
    pub adjustment_type: Option<AdjustmentType>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustmentItemInput {
    pub product_id: Uuid,
    /// Counted quantity
    pub adjusted_quantity: i32,
    /// System quantity; read from the stock level when omitted
    pub current_quantity: Option<i32>,
    /// Defaults to the product's cost price
    pub unit_cost: Option<Decimal>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAdjustmentInput {
    pub warehouse_id: Uuid,
    pub location_id: Option<Uuid>,
    pub adjustment_type: AdjustmentType,
    pub reason: AdjustmentReason,
    pub adjustment_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub items: Vec<AdjustmentItemInput>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAdjustmentInput {
    pub adjustment_type: Option<AdjustmentType>,
    pub reason: Option<AdjustmentReason>,
    pub adjustment_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub notes: Option<String>,
    /// Replaces every line when present
    pub items: Option<Vec<AdjustmentItemInput>>,
}

#[derive(Debug, Deserialize)]
pub struct CountLine {
    pub product_id: Uuid,
    pub counted_quantity: i32,
}

/// Physical count to reconcile against system stock
#[derive(Debug, Deserialize)]
pub struct FromCountInput {
    pub warehouse_id: Uuid,
    pub location_id: Option<Uuid>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub counts: Vec<CountLine>,
}

/// Line ready to insert, with deltas computed
#[derive(Debug, Clone, PartialEq)]
struct PreparedLine {
    product_id: Uuid,
    current_quantity: i32,
    adjusted_quantity: i32,
    unit_cost: Decimal,
    change: LineAdjustment,
    reason: Option<String>,
    notes: Option<String>,
}

fn reject_duplicate_products<'a>(ids: impl Iterator<Item = &'a Uuid>) -> AppResult<()> {
    let mut seen = Vec::new();
    for id in ids {
        if seen.contains(id) {
            return Err(AppError::validation(
                "items",
                format!("Product {} appears more than once", id),
            ));
        }
        seen.push(*id);
    }
    Ok(())
}

#[derive(Clone)]
pub struct AdjustmentService {
    db: PgPool,
}

impl AdjustmentService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_adjustments(
        &self,
        filter: &AdjustmentFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<StockAdjustment>> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM stock_adjustments
            WHERE ($1::adjustment_status IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR warehouse_id = $2)
              AND ($3::adjustment_type IS NULL OR adjustment_type = $3)
              AND ($4::date IS NULL OR adjustment_date >= $4::date)
              AND ($5::date IS NULL OR adjustment_date < $5::date + INTERVAL '1 day')
            "#,
        )
        .bind(filter.status)
        .bind(filter.warehouse_id)
        .bind(filter.adjustment_type)
        .bind(filter.date_from)
        .bind(filter.date_to)
        .fetch_one(&self.db)
        .await?;

        let adjustments = sqlx::query_as::<_, StockAdjustment>(
            r#"
            SELECT * FROM stock_adjustments
            WHERE ($1::adjustment_status IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR warehouse_id = $2)
              AND ($3::adjustment_type IS NULL OR adjustment_type = $3)
              AND ($4::date IS NULL OR adjustment_date >= $4::date)
              AND ($5::date IS NULL OR adjustment_date < $5::date + INTERVAL '1 day')
            ORDER BY adjustment_date DESC, adjustment_number DESC
            LIMIT $6 OFFSET $7
            "#,
        )
        .bind(filter.status)
        .bind(filter.warehouse_id)
        .bind(filter.adjustment_type)
        .bind(filter.date_from)
        .bind(filter.date_to)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse::new(adjustments, pagination, total as u64))
    }

    pub async fn get_adjustment(&self, adjustment_id: Uuid) -> AppResult<StockAdjustment> {
        let mut conn = self.db.acquire().await?;
        load_adjustment(&mut conn, adjustment_id, false).await
    }

    pub async fn create_adjustment(
        &self,
        input: CreateAdjustmentInput,
        creator: Uuid,
    ) -> AppResult<StockAdjustment> {
        let mut tx = self.db.begin().await?;
        ensure_site(&mut tx, input.warehouse_id, input.location_id).await?;

        let lines = prepare_lines(&mut tx, input.warehouse_id, input.location_id, input.items).await?;
        let now = Utc::now();
        let adjustment_number = next_number(&mut tx, DocumentKind::StockAdjustment, now.date_naive()).await?;

        let adjustment_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO stock_adjustments (
                adjustment_number, warehouse_id, location_id, adjustment_type, reason, status,
                adjustment_date, description, notes, created_by
            )
            VALUES ($1, $2, $3, $4, $5, 'draft', $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(&adjustment_number)
        .bind(input.warehouse_id)
        .bind(input.location_id)
        .bind(input.adjustment_type)
        .bind(input.reason)
        .bind(input.adjustment_date.unwrap_or(now))
        .bind(&input.description)
        .bind(&input.notes)
        .bind(creator)
        .fetch_one(&mut *tx)
        .await?;

        replace_lines(&mut tx, adjustment_id, &lines).await?;
        let adjustment = load_adjustment(&mut tx, adjustment_id, false).await?;
        tx.commit().await?;

        tracing::info!(
            adjustment_id = %adjustment.id,
            number = %adjustment.adjustment_number,
            items = adjustment.total_items,
            created_by = %creator,
            "stock adjustment created"
        );
        Ok(adjustment)
    }

    /// Update header fields and, when given, replace all lines
    pub async fn update_adjustment(
        &self,
        adjustment_id: Uuid,
        input: UpdateAdjustmentInput,
    ) -> AppResult<StockAdjustment> {
        let mut tx = self.db.begin().await?;
        let adjustment = load_adjustment(&mut tx, adjustment_id, true).await?;
        adjustment.ensure_editable()?;

        sqlx::query(
            r#"
            UPDATE stock_adjustments
            SET adjustment_type = COALESCE($1, adjustment_type),
                reason = COALESCE($2, reason),
                adjustment_date = COALESCE($3, adjustment_date),
                description = COALESCE($4, description),
                notes = COALESCE($5, notes),
                updated_at = NOW()
            WHERE id = $6
            "#,
        )
        .bind(input.adjustment_type)
        .bind(input.reason)
        .bind(input.adjustment_date)
        .bind(&input.description)
        .bind(&input.notes)
        .bind(adjustment_id)
        .execute(&mut *tx)
        .await?;

        if let Some(items) = input.items {
            let lines = prepare_lines(&mut tx, adjustment.warehouse_id, adjustment.location_id, items).await?;
            replace_lines(&mut tx, adjustment_id, &lines).await?;
        }

        let adjustment = load_adjustment(&mut tx, adjustment_id, false).await?;
        tx.commit().await?;
        Ok(adjustment)
    }

    pub async fn delete_adjustment(&self, adjustment_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        let adjustment = load_adjustment(&mut tx, adjustment_id, true).await?;
        adjustment.ensure_deletable()?;

        sqlx::query("DELETE FROM stock_adjustment_items WHERE stock_adjustment_id = $1")
            .bind(adjustment_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM stock_adjustments WHERE id = $1")
            .bind(adjustment_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(adjustment_id = %adjustment_id, "stock adjustment deleted");
        Ok(())
    }

    pub async fn submit_adjustment(&self, adjustment_id: Uuid) -> AppResult<StockAdjustment> {
        let mut tx = self.db.begin().await?;
        let mut adjustment = load_adjustment(&mut tx, adjustment_id, true).await?;
        if adjustment.items.is_empty() {
            return Err(AppError::validation("items", "An adjustment needs at least one item"));
        }
        refuse_logged(adjustment.submit(), adjustment_id, "submit")?;

        save_status(&mut tx, &adjustment).await?;
        tx.commit().await?;

        tracing::info!(adjustment_id = %adjustment_id, status = %adjustment.status, "stock adjustment submitted");
        Ok(adjustment)
    }

    pub async fn approve_adjustment(
        &self,
        adjustment_id: Uuid,
        approver: Uuid,
    ) -> AppResult<StockAdjustment> {
        let mut tx = self.db.begin().await?;
        let mut adjustment = load_adjustment(&mut tx, adjustment_id, true).await?;
        refuse_logged(adjustment.approve(approver, Utc::now()), adjustment_id, "approve")?;

        save_status(&mut tx, &adjustment).await?;
        tx.commit().await?;

        tracing::info!(adjustment_id = %adjustment_id, approved_by = %approver, "stock adjustment approved");
        Ok(adjustment)
    }

    /// Post every non-zero line to the ledger and mark the adjustment applied
    ///
    /// One transaction: a single refused line rolls back all of them.
    pub async fn apply_adjustment(
        &self,
        adjustment_id: Uuid,
        actor: Option<Uuid>,
    ) -> AppResult<StockAdjustment> {
        let mut tx = self.db.begin().await?;
        let mut adjustment = load_adjustment(&mut tx, adjustment_id, true).await?;
        let plan = refuse_logged(adjustment.apply(actor, Utc::now()), adjustment_id, "apply")?;

        let movements = StockLedger::post_all(&mut tx, &plan).await?;
        save_status(&mut tx, &adjustment).await?;
        tx.commit().await?;

        tracing::info!(
            adjustment_id = %adjustment_id,
            movements = movements.len(),
            actor = ?actor,
            "stock adjustment applied"
        );
        Ok(adjustment)
    }

    pub async fn cancel_adjustment(&self, adjustment_id: Uuid) -> AppResult<StockAdjustment> {
        let mut tx = self.db.begin().await?;
        let mut adjustment = load_adjustment(&mut tx, adjustment_id, true).await?;
        refuse_logged(adjustment.cancel(), adjustment_id, "cancel")?;

        save_status(&mut tx, &adjustment).await?;
        tx.commit().await?;

        tracing::info!(adjustment_id = %adjustment_id, "stock adjustment cancelled");
        Ok(adjustment)
    }

    /// Draft a recount adjustment from a physical count
    ///
    /// Only products whose count differs from the site's stock level become
    /// lines; a count with no differences is refused.
    pub async fn create_from_count(
        &self,
        input: FromCountInput,
        creator: Uuid,
    ) -> AppResult<StockAdjustment> {
        for line in &input.counts {
            require_non_negative_quantity("counted_quantity", line.counted_quantity)?;
        }
        reject_duplicate_products(input.counts.iter().map(|c| &c.product_id))?;

        let product_ids: Vec<Uuid> = input.counts.iter().map(|c| c.product_id).collect();
        let mut conn = self.db.acquire().await?;
        let levels = site_quantities(&mut conn, input.warehouse_id, input.location_id, &product_ids).await?;
        drop(conn);

        let counts: Vec<(Uuid, i32)> = input
            .counts
            .iter()
            .map(|c| (c.product_id, c.counted_quantity))
            .collect();
        let differences = count_differences(&counts, &levels)?;

        let items = differences
            .into_iter()
            .map(|d| AdjustmentItemInput {
                product_id: d.product_id,
                adjusted_quantity: d.counted_quantity,
                current_quantity: Some(d.current_quantity),
                unit_cost: None,
                reason: None,
                notes: None,
            })
            .collect();

        self.create_adjustment(
            CreateAdjustmentInput {
                warehouse_id: input.warehouse_id,
                location_id: input.location_id,
                adjustment_type: AdjustmentType::Recount,
                reason: AdjustmentReason::PhysicalCount,
                adjustment_date: None,
                description: input
                    .description
                    .or_else(|| Some("Physical count reconciliation".to_string())),
                notes: input.notes,
                items,
            },
            creator,
        )
        .await
    }
}

fn refuse_logged<T>(result: DomainResult<T>, adjustment_id: Uuid, action: &str) -> AppResult<T> {
    result.map_err(|err| {
        tracing::warn!(adjustment_id = %adjustment_id, action, "stock adjustment transition refused: {}", err);
        AppError::from(err)
    })
}

/// Load an adjustment with its lines, locking the header when `lock` is set
async fn load_adjustment(
    conn: &mut PgConnection,
    adjustment_id: Uuid,
    lock: bool,
) -> AppResult<StockAdjustment> {
    let sql = if lock {
        "SELECT * FROM stock_adjustments WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT * FROM stock_adjustments WHERE id = $1"
    };
    let mut adjustment = sqlx::query_as::<_, StockAdjustment>(sql)
        .bind(adjustment_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Stock adjustment".to_string()))?;

    adjustment.items = sqlx::query_as::<_, StockAdjustmentItem>(
        "SELECT * FROM stock_adjustment_items WHERE stock_adjustment_id = $1 ORDER BY id",
    )
    .bind(adjustment_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(adjustment)
}

async fn save_status(conn: &mut PgConnection, adjustment: &StockAdjustment) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE stock_adjustments
        SET status = $1, approved_by = $2, approved_at = $3, applied_at = $4, updated_at = NOW()
        WHERE id = $5
        "#,
    )
    .bind(adjustment.status)
    .bind(adjustment.approved_by)
    .bind(adjustment.approved_at)
    .bind(adjustment.applied_at)
    .bind(adjustment.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Resolve system quantity and unit cost for each line, then compute deltas
async fn prepare_lines(
    conn: &mut PgConnection,
    warehouse_id: Uuid,
    location_id: Option<Uuid>,
    items: Vec<AdjustmentItemInput>,
) -> AppResult<Vec<PreparedLine>> {
    if items.is_empty() {
        return Err(AppError::validation("items", "An adjustment needs at least one item"));
    }
    reject_duplicate_products(items.iter().map(|i| &i.product_id))?;
    for item in &items {
        require_non_negative_quantity("adjusted_quantity", item.adjusted_quantity)?;
        if let Some(current) = item.current_quantity {
            require_non_negative_quantity("current_quantity", current)?;
        }
    }

    let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
    let costs: HashMap<Uuid, Decimal> = sqlx::query_as::<_, (Uuid, Decimal)>(
        "SELECT id, cost_price FROM products WHERE id = ANY($1) AND deleted_at IS NULL",
    )
    .bind(&product_ids)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .collect();
    let levels = site_quantities(conn, warehouse_id, location_id, &product_ids).await?;

    items
        .into_iter()
        .map(|item| {
            let product_cost = costs
                .get(&item.product_id)
                .copied()
                .ok_or_else(|| AppError::NotFound(format!("Product {}", item.product_id)))?;
            let current = item
                .current_quantity
                .unwrap_or_else(|| levels.get(&item.product_id).copied().unwrap_or(0));
            let unit_cost = item.unit_cost.unwrap_or(product_cost);
            Ok(PreparedLine {
                product_id: item.product_id,
                current_quantity: current,
                adjusted_quantity: item.adjusted_quantity,
                unit_cost,
                change: LineAdjustment::compute(current, item.adjusted_quantity, unit_cost)?,
                reason: item.reason,
                notes: item.notes,
            })
        })
        .collect()
}

/// Replace the adjustment's lines and refresh its header totals
async fn replace_lines(
    conn: &mut PgConnection,
    adjustment_id: Uuid,
    lines: &[PreparedLine],
) -> AppResult<()> {
    sqlx::query("DELETE FROM stock_adjustment_items WHERE stock_adjustment_id = $1")
        .bind(adjustment_id)
        .execute(&mut *conn)
        .await?;

    let mut items = Vec::with_capacity(lines.len());
    for line in lines {
        let item = sqlx::query_as::<_, StockAdjustmentItem>(
            r#"
            INSERT INTO stock_adjustment_items (
                stock_adjustment_id, product_id, current_quantity, adjusted_quantity,
                quantity_adjustment, unit_cost, value_adjustment, reason, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(adjustment_id)
        .bind(line.product_id)
        .bind(line.current_quantity)
        .bind(line.adjusted_quantity)
        .bind(line.change.quantity_adjustment)
        .bind(line.unit_cost)
        .bind(line.change.value_adjustment)
        .bind(&line.reason)
        .bind(&line.notes)
        .fetch_one(&mut *conn)
        .await?;
        items.push(item);
    }

    let (total_items, total_value) = adjustment_totals(&items);
    sqlx::query(
        "UPDATE stock_adjustments SET total_items = $1, total_value_adjustment = $2, updated_at = NOW() WHERE id = $3",
    )
    .bind(total_items)
    .bind(total_value)
    .bind(adjustment_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_products_rejected() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert!(reject_duplicate_products([a, b].iter()).is_ok());
        assert!(matches!(
            reject_duplicate_products([a, b, a].iter()),
            Err(AppError::Validation { ref field, .. }) if field == "items"
        ));
    }
}
