//! Stock transfer service
//!
//! Transfers move stock between two warehouse/location sites. Source
//! availability is checked when the transfer is started; the ledger is only
//! written on completion, as one `transfer_out` and one `transfer_in` per
//! line inside a single transaction.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{
    check_availability, ensure_distinct_sites, require_positive_quantity, transfer_totals,
    validate_non_negative_amount, DocumentKind, DomainError, DomainResult, Lifecycle,
    PaginatedResponse, Pagination, StockTransfer, StockTransferItem, TransferPriority,
    TransferStatus, TransferType,
};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::sequence::next_number;
use super::stock::{ensure_site, site_quantities, StockLedger};
use crate::error::{AppError, AppResult};

#[derive(Debug, Default, Deserialize)]
pub struct TransferFilter {
    pub status: Option<TransferStatus>,
    pub priority: Option<TransferPriority>,
    pub from_warehouse_id: Option<Uuid>,
    pub to_warehouse_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct TransferItemInput {
    pub product_id: Uuid,
    pub quantity: i32,
    /// Defaults to the product's cost price
    pub unit_cost: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTransferInput {
    pub from_warehouse_id: Uuid,
    pub from_location_id: Option<Uuid>,
    pub to_warehouse_id: Uuid,
    pub to_location_id: Option<Uuid>,
    pub transfer_type: Option<TransferType>,
    pub priority: Option<TransferPriority>,
    pub expected_date: Option<DateTime<Utc>>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub shipping_cost: Option<Decimal>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub items: Vec<TransferItemInput>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTransferInput {
    pub transfer_type: Option<TransferType>,
    pub priority: Option<TransferPriority>,
    pub expected_date: Option<DateTime<Utc>>,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub shipping_cost: Option<Decimal>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    /// Replaces every line when present
    pub items: Option<Vec<TransferItemInput>>,
}

#[derive(Debug, Deserialize)]
pub struct ReceivedItemInput {
    pub item_id: Uuid,
    pub quantity_received: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteTransferInput {
    /// Lines not listed are received in full
    #[serde(default)]
    pub items: Vec<ReceivedItemInput>,
    pub receiving_notes: Option<String>,
}

#[derive(Clone)]
pub struct TransferService {
    db: PgPool,
}

impl TransferService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_transfers(
        &self,
        filter: &TransferFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<StockTransfer>> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM stock_transfers
            WHERE ($1::transfer_status IS NULL OR status = $1)
              AND ($2::transfer_priority IS NULL OR priority = $2)
              AND ($3::uuid IS NULL OR from_warehouse_id = $3)
              AND ($4::uuid IS NULL OR to_warehouse_id = $4)
            "#,
        )
        .bind(filter.status)
        .bind(filter.priority)
        .bind(filter.from_warehouse_id)
        .bind(filter.to_warehouse_id)
        .fetch_one(&self.db)
        .await?;

        let transfers = sqlx::query_as::<_, StockTransfer>(
            r#"
            SELECT * FROM stock_transfers
            WHERE ($1::transfer_status IS NULL OR status = $1)
              AND ($2::transfer_priority IS NULL OR priority = $2)
              AND ($3::uuid IS NULL OR from_warehouse_id = $3)
              AND ($4::uuid IS NULL OR to_warehouse_id = $4)
            ORDER BY transfer_date DESC, transfer_number DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(filter.status)
        .bind(filter.priority)
        .bind(filter.from_warehouse_id)
        .bind(filter.to_warehouse_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse::new(transfers, pagination, total as u64))
    }

    pub async fn get_transfer(&self, transfer_id: Uuid) -> AppResult<StockTransfer> {
        let mut conn = self.db.acquire().await?;
        load_transfer(&mut conn, transfer_id, false).await
    }

    pub async fn create_transfer(
        &self,
        input: CreateTransferInput,
        requester: Uuid,
    ) -> AppResult<StockTransfer> {
        ensure_distinct_sites(
            (input.from_warehouse_id, input.from_location_id),
            (input.to_warehouse_id, input.to_location_id),
        )?;
        if let Some(cost) = input.shipping_cost {
            validate_non_negative_amount(cost).map_err(|msg| AppError::validation("shipping_cost", msg))?;
        }

        let mut tx = self.db.begin().await?;
        ensure_site(&mut tx, input.from_warehouse_id, input.from_location_id).await?;
        ensure_site(&mut tx, input.to_warehouse_id, input.to_location_id).await?;

        let now = Utc::now();
        let transfer_number = next_number(&mut tx, DocumentKind::StockTransfer, now.date_naive()).await?;

        let transfer_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO stock_transfers (
                transfer_number, from_warehouse_id, from_location_id, to_warehouse_id, to_location_id,
                status, transfer_type, priority, transfer_date, expected_date, carrier,
                tracking_number, shipping_cost, requested_by, reason, notes
            )
            VALUES ($1, $2, $3, $4, $5, 'draft', $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING id
            "#,
        )
        .bind(&transfer_number)
        .bind(input.from_warehouse_id)
        .bind(input.from_location_id)
        .bind(input.to_warehouse_id)
        .bind(input.to_location_id)
        .bind(input.transfer_type.unwrap_or(TransferType::Internal))
        .bind(input.priority.unwrap_or(TransferPriority::Normal))
        .bind(now)
        .bind(input.expected_date)
        .bind(&input.carrier)
        .bind(&input.tracking_number)
        .bind(input.shipping_cost.unwrap_or(Decimal::ZERO))
        .bind(requester)
        .bind(&input.reason)
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await?;

        replace_items(&mut tx, transfer_id, input.items).await?;
        let transfer = load_transfer(&mut tx, transfer_id, false).await?;
        tx.commit().await?;

        tracing::info!(
            transfer_id = %transfer.id,
            number = %transfer.transfer_number,
            from = %transfer.from_warehouse_id,
            to = %transfer.to_warehouse_id,
            requested_by = %requester,
            "stock transfer created"
        );
        Ok(transfer)
    }

    pub async fn update_transfer(
        &self,
        transfer_id: Uuid,
        input: UpdateTransferInput,
    ) -> AppResult<StockTransfer> {
        if let Some(cost) = input.shipping_cost {
            validate_non_negative_amount(cost).map_err(|msg| AppError::validation("shipping_cost", msg))?;
        }

        let mut tx = self.db.begin().await?;
        let transfer = load_transfer(&mut tx, transfer_id, true).await?;
        transfer.ensure_editable()?;

        sqlx::query(
            r#"
            UPDATE stock_transfers
            SET transfer_type = COALESCE($1, transfer_type),
                priority = COALESCE($2, priority),
                expected_date = COALESCE($3, expected_date),
                carrier = COALESCE($4, carrier),
                tracking_number = COALESCE($5, tracking_number),
                shipping_cost = COALESCE($6, shipping_cost),
                reason = COALESCE($7, reason),
                notes = COALESCE($8, notes),
                updated_at = NOW()
            WHERE id = $9
            "#,
        )
        .bind(input.transfer_type)
        .bind(input.priority)
        .bind(input.expected_date)
        .bind(&input.carrier)
        .bind(&input.tracking_number)
        .bind(input.shipping_cost)
        .bind(&input.reason)
        .bind(&input.notes)
        .bind(transfer_id)
        .execute(&mut *tx)
        .await?;

        if let Some(items) = input.items {
            replace_items(&mut tx, transfer_id, items).await?;
        }

        let transfer = load_transfer(&mut tx, transfer_id, false).await?;
        tx.commit().await?;
        Ok(transfer)
    }

    /// Delete a transfer that is still a draft
    pub async fn delete_transfer(&self, transfer_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        let transfer = load_transfer(&mut tx, transfer_id, true).await?;
        if transfer.status != TransferStatus::Draft {
            return Err(DomainError::invalid_transition(TransferStatus::ENTITY, transfer.status, "delete").into());
        }

        sqlx::query("DELETE FROM stock_transfer_items WHERE stock_transfer_id = $1")
            .bind(transfer_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM stock_transfers WHERE id = $1")
            .bind(transfer_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(transfer_id = %transfer_id, "stock transfer deleted");
        Ok(())
    }

    pub async fn approve_transfer(&self, transfer_id: Uuid, approver: Uuid) -> AppResult<StockTransfer> {
        let mut tx = self.db.begin().await?;
        let mut transfer = load_transfer(&mut tx, transfer_id, true).await?;
        if transfer.items.is_empty() {
            return Err(AppError::validation("items", "A transfer needs at least one item"));
        }
        refuse_logged(transfer.approve(approver, Utc::now()), transfer_id, "approve")?;

        save_status(&mut tx, &transfer).await?;
        tx.commit().await?;

        tracing::info!(transfer_id = %transfer_id, approved_by = %approver, "stock transfer approved");
        Ok(transfer)
    }

    /// Ship the transfer once the source holds every requested quantity
    pub async fn start_transfer(&self, transfer_id: Uuid) -> AppResult<StockTransfer> {
        let mut tx = self.db.begin().await?;
        let mut transfer = load_transfer(&mut tx, transfer_id, true).await?;
        refuse_logged(transfer.start(Utc::now()), transfer_id, "start")?;

        let requested = transfer.shipping_requirements();
        let product_ids: Vec<Uuid> = requested.iter().map(|(id, _)| *id).collect();
        let available = site_quantities(
            &mut tx,
            transfer.from_warehouse_id,
            transfer.from_location_id,
            &product_ids,
        )
        .await?;
        refuse_logged(check_availability(&requested, &available), transfer_id, "start")?;

        save_status(&mut tx, &transfer).await?;
        tx.commit().await?;

        tracing::info!(transfer_id = %transfer_id, "stock transfer in transit");
        Ok(transfer)
    }

    /// Receive the transfer and post both legs of every line
    pub async fn complete_transfer(
        &self,
        transfer_id: Uuid,
        input: CompleteTransferInput,
        receiver: Uuid,
    ) -> AppResult<StockTransfer> {
        let received: HashMap<Uuid, i32> = input
            .items
            .iter()
            .map(|r| (r.item_id, r.quantity_received))
            .collect();

        let mut tx = self.db.begin().await?;
        let mut transfer = load_transfer(&mut tx, transfer_id, true).await?;
        let plan = refuse_logged(transfer.complete(receiver, &received, Utc::now()), transfer_id, "complete")?;

        let movements = StockLedger::post_all(&mut tx, &plan).await?;

        for item in &transfer.items {
            sqlx::query("UPDATE stock_transfer_items SET quantity_received = $1 WHERE id = $2")
                .bind(item.quantity_received)
                .bind(item.id)
                .execute(&mut *tx)
                .await?;
        }
        if input.receiving_notes.is_some() {
            transfer.receiving_notes = input.receiving_notes;
        }
        save_status(&mut tx, &transfer).await?;
        tx.commit().await?;

        let short: Vec<(Uuid, i32)> = transfer
            .items
            .iter()
            .filter_map(|i| i.discrepancy().filter(|d| *d != 0).map(|d| (i.product_id, d)))
            .collect();
        if !short.is_empty() {
            tracing::warn!(transfer_id = %transfer_id, discrepancies = ?short, "stock transfer received short");
        }
        tracing::info!(
            transfer_id = %transfer_id,
            movements = movements.len(),
            completed_by = %receiver,
            "stock transfer completed"
        );
        Ok(transfer)
    }

    pub async fn cancel_transfer(&self, transfer_id: Uuid) -> AppResult<StockTransfer> {
        let mut tx = self.db.begin().await?;
        let mut transfer = load_transfer(&mut tx, transfer_id, true).await?;
        refuse_logged(transfer.cancel(), transfer_id, "cancel")?;

        save_status(&mut tx, &transfer).await?;
        tx.commit().await?;

        tracing::info!(transfer_id = %transfer_id, "stock transfer cancelled");
        Ok(transfer)
    }
}

fn refuse_logged<T>(result: DomainResult<T>, transfer_id: Uuid, action: &str) -> AppResult<T> {
    result.map_err(|err| {
        tracing::warn!(transfer_id = %transfer_id, action, "stock transfer transition refused: {}", err);
        AppError::from(err)
    })
}

async fn load_transfer(conn: &mut PgConnection, transfer_id: Uuid, lock: bool) -> AppResult<StockTransfer> {
    let sql = if lock {
        "SELECT * FROM stock_transfers WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT * FROM stock_transfers WHERE id = $1"
    };
    let mut transfer = sqlx::query_as::<_, StockTransfer>(sql)
        .bind(transfer_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Stock transfer".to_string()))?;

    transfer.items = sqlx::query_as::<_, StockTransferItem>(
        "SELECT * FROM stock_transfer_items WHERE stock_transfer_id = $1 ORDER BY id",
    )
    .bind(transfer_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(transfer)
}

async fn save_status(conn: &mut PgConnection, transfer: &StockTransfer) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE stock_transfers
        SET status = $1, approved_by = $2, approved_at = $3, shipped_at = $4,
            completed_by = $5, received_at = $6, receiving_notes = $7, updated_at = NOW()
        WHERE id = $8
        "#,
    )
    .bind(transfer.status)
    .bind(transfer.approved_by)
    .bind(transfer.approved_at)
    .bind(transfer.shipped_at)
    .bind(transfer.completed_by)
    .bind(transfer.received_at)
    .bind(&transfer.receiving_notes)
    .bind(transfer.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Replace the transfer's lines and refresh its header totals
async fn replace_items(
    conn: &mut PgConnection,
    transfer_id: Uuid,
    items: Vec<TransferItemInput>,
) -> AppResult<()> {
    if items.is_empty() {
        return Err(AppError::validation("items", "A transfer needs at least one item"));
    }
    for item in &items {
        require_positive_quantity("quantity", item.quantity)?;
        if let Some(cost) = item.unit_cost {
            validate_non_negative_amount(cost).map_err(|msg| AppError::validation("unit_cost", msg))?;
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

    sqlx::query("DELETE FROM stock_transfer_items WHERE stock_transfer_id = $1")
        .bind(transfer_id)
        .execute(&mut *conn)
        .await?;

    let mut saved = Vec::with_capacity(items.len());
    for item in items {
        let product_cost = costs
            .get(&item.product_id)
            .copied()
            .ok_or_else(|| AppError::NotFound(format!("Product {}", item.product_id)))?;
        let row = sqlx::query_as::<_, StockTransferItem>(
            r#"
            INSERT INTO stock_transfer_items (stock_transfer_id, product_id, quantity, unit_cost, notes)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(transfer_id)
        .bind(item.product_id)
        .bind(item.quantity)
        .bind(item.unit_cost.unwrap_or(product_cost))
        .bind(&item.notes)
        .fetch_one(&mut *conn)
        .await?;
        saved.push(row);
    }

    let (total_items, total_quantity, total_value) = transfer_totals(&saved)?;
    sqlx::query(
        r#"
        UPDATE stock_transfers
        SET total_items = $1, total_quantity = $2, total_value = $3, updated_at = NOW()
        WHERE id = $4
        "#,
    )
    .bind(total_items)
    .bind(total_quantity)
    .bind(total_value)
    .bind(transfer_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
