//! Stock ledger service
//!
//! [`StockLedger::post`] is the only code that writes product quantities
//! and stock levels. Callers hand it a transaction; the product row and the
//! site's stock level are locked before the delta is applied, so the
//! sufficiency check and the write cannot interleave with another post.
//! Locks are always taken product first, then stock level.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use shared::{
    posting, MovementRequest, MovementType, PaginatedResponse, Pagination,
    ReferenceType, StockLevel, StockMovement,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Writes quantity changes to the ledger
pub struct StockLedger;

impl StockLedger {
    /// Post one movement inside the caller's transaction
    pub async fn post(conn: &mut PgConnection, req: &MovementRequest) -> AppResult<StockMovement> {
        req.validate()?;

        let product_quantity: i32 = sqlx::query_scalar(
            "SELECT stock_quantity FROM products WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(req.product_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Product {}", req.product_id)))?;

        sqlx::query(
            r#"
            INSERT INTO stock_levels (product_id, warehouse_id, location_id, quantity)
            VALUES ($1, $2, $3, 0)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(req.product_id)
        .bind(req.warehouse_id)
        .bind(req.location_id)
        .execute(&mut *conn)
        .await?;

        let (level_id, site_quantity): (Uuid, i32) = sqlx::query_as(
            r#"
            SELECT id, quantity FROM stock_levels
            WHERE product_id = $1 AND warehouse_id = $2 AND location_id IS NOT DISTINCT FROM $3
            FOR UPDATE
            "#,
        )
        .bind(req.product_id)
        .bind(req.warehouse_id)
        .bind(req.location_id)
        .fetch_one(&mut *conn)
        .await?;

        let change = posting(req.product_id, site_quantity, product_quantity, req.quantity_delta)
            .map_err(|err| {
                tracing::warn!(
                    product_id = %req.product_id,
                    warehouse_id = %req.warehouse_id,
                    delta = req.quantity_delta,
                    "stock movement refused: {}",
                    err
                );
                AppError::from(err)
            })?;

        sqlx::query("UPDATE stock_levels SET quantity = $1, updated_at = NOW() WHERE id = $2")
            .bind(change.site.new)
            .bind(level_id)
            .execute(&mut *conn)
            .await?;

        sqlx::query("UPDATE products SET stock_quantity = $1, updated_at = NOW() WHERE id = $2")
            .bind(change.product.new)
            .bind(req.product_id)
            .execute(&mut *conn)
            .await?;

        let movement = sqlx::query_as::<_, StockMovement>(
            r#"
            INSERT INTO stock_movements (
                product_id, warehouse_id, location_id, movement_type, quantity_delta,
                previous_quantity, new_quantity, reference_type, reference_id, notes, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(req.product_id)
        .bind(req.warehouse_id)
        .bind(req.location_id)
        .bind(req.movement_type)
        .bind(req.quantity_delta)
        .bind(change.site.previous)
        .bind(change.site.new)
        .bind(req.reference.map(|r| r.reference_type))
        .bind(req.reference.map(|r| r.reference_id))
        .bind(&req.notes)
        .bind(req.actor)
        .fetch_one(&mut *conn)
        .await?;

        tracing::info!(
            movement_id = %movement.id,
            product_id = %movement.product_id,
            warehouse_id = %movement.warehouse_id,
            movement_type = %movement.movement_type,
            delta = movement.quantity_delta,
            new_quantity = movement.new_quantity,
            actor = ?req.actor,
            "stock movement posted"
        );

        Ok(movement)
    }

    /// Post a batch of movements
    ///
    /// Every product in the batch is locked up front in id order, so two
    /// batches touching the same products cannot deadlock.
    pub async fn post_all(
        conn: &mut PgConnection,
        requests: &[MovementRequest],
    ) -> AppResult<Vec<StockMovement>> {
        let mut product_ids: Vec<Uuid> = requests.iter().map(|r| r.product_id).collect();
        product_ids.sort();
        product_ids.dedup();

        let locked: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM products WHERE id = ANY($1) AND deleted_at IS NULL ORDER BY id FOR UPDATE",
        )
        .bind(&product_ids)
        .fetch_all(&mut *conn)
        .await?;

        if let Some(missing) = product_ids.iter().find(|id| !locked.contains(id)) {
            return Err(AppError::NotFound(format!("Product {}", missing)));
        }

        let mut movements = Vec::with_capacity(requests.len());
        for req in requests {
            movements.push(Self::post(conn, req).await?);
        }
        Ok(movements)
    }
}

/// Balances of `product_ids` at exactly one (warehouse, location) site
///
/// Products with no stock level at the site are absent from the map.
pub async fn site_quantities(
    conn: &mut PgConnection,
    warehouse_id: Uuid,
    location_id: Option<Uuid>,
    product_ids: &[Uuid],
) -> AppResult<HashMap<Uuid, i32>> {
    let rows: Vec<(Uuid, i32)> = sqlx::query_as(
        r#"
        SELECT product_id, quantity FROM stock_levels
        WHERE warehouse_id = $1 AND location_id IS NOT DISTINCT FROM $2 AND product_id = ANY($3)
        "#,
    )
    .bind(warehouse_id)
    .bind(location_id)
    .bind(product_ids)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().collect())
}

/// Movement list filters
#[derive(Debug, Default, Deserialize)]
pub struct MovementFilter {
    pub product_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    pub movement_type: Option<MovementType>,
    pub reference_type: Option<ReferenceType>,
    pub reference_id: Option<Uuid>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

/// Input for a movement recorded outside any document (receipts, damage, loss)
#[derive(Debug, Deserialize)]
pub struct RecordMovementInput {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub location_id: Option<Uuid>,
    pub movement_type: MovementType,
    /// Signed; purchases and returns are positive, damage and loss negative
    pub quantity_delta: i32,
    pub notes: Option<String>,
}

impl RecordMovementInput {
    /// Ledger request for this movement; it points at no document
    fn into_request(self, actor: Option<Uuid>) -> AppResult<MovementRequest> {
        if matches!(
            self.movement_type,
            MovementType::Sale | MovementType::TransferIn | MovementType::TransferOut | MovementType::Adjustment
        ) {
            return Err(AppError::validation(
                "movement_type",
                format!("{} movements are posted by their documents", self.movement_type),
            ));
        }
        Ok(MovementRequest {
            product_id: self.product_id,
            warehouse_id: self.warehouse_id,
            location_id: self.location_id,
            movement_type: self.movement_type,
            quantity_delta: self.quantity_delta,
            reference: None,
            notes: self.notes,
            actor,
        })
    }
}

/// Stock on hand for one product at a site
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SiteStock {
    pub product_id: Uuid,
    pub product_name: String,
    pub sku: String,
    pub quantity: i32,
    pub unit_cost: rust_decimal::Decimal,
}

/// Input for the current-stock lookup used when preparing counts
#[derive(Debug, Deserialize)]
pub struct CurrentStockInput {
    pub warehouse_id: Uuid,
    pub location_id: Option<Uuid>,
    pub product_ids: Vec<Uuid>,
}

const MOVEMENT_FILTER: &str = r#"
    WHERE ($1::uuid IS NULL OR product_id = $1)
      AND ($2::uuid IS NULL OR warehouse_id = $2)
      AND ($3::movement_type IS NULL OR movement_type = $3)
      AND ($4::movement_reference_type IS NULL OR reference_type = $4)
      AND ($5::uuid IS NULL OR reference_id = $5)
      AND ($6::date IS NULL OR created_at >= $6::date)
      AND ($7::date IS NULL OR created_at < $7::date + INTERVAL '1 day')
"#;

/// Ledger queries and manual movements
#[derive(Clone)]
pub struct StockService {
    db: PgPool,
}

impl StockService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// List movements, newest first
    pub async fn list_movements(
        &self,
        filter: &MovementFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<StockMovement>> {
        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM stock_movements {}",
            MOVEMENT_FILTER
        ))
        .bind(filter.product_id)
        .bind(filter.warehouse_id)
        .bind(filter.movement_type)
        .bind(filter.reference_type)
        .bind(filter.reference_id)
        .bind(filter.date_from)
        .bind(filter.date_to)
        .fetch_one(&self.db)
        .await?;

        let movements = sqlx::query_as::<_, StockMovement>(&format!(
            "SELECT * FROM stock_movements {} ORDER BY created_at DESC, id LIMIT $8 OFFSET $9",
            MOVEMENT_FILTER
        ))
        .bind(filter.product_id)
        .bind(filter.warehouse_id)
        .bind(filter.movement_type)
        .bind(filter.reference_type)
        .bind(filter.reference_id)
        .bind(filter.date_from)
        .bind(filter.date_to)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse::new(movements, pagination, total as u64))
    }

    pub async fn get_movement(&self, movement_id: Uuid) -> AppResult<StockMovement> {
        sqlx::query_as::<_, StockMovement>("SELECT * FROM stock_movements WHERE id = $1")
            .bind(movement_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Stock movement".to_string()))
    }

    /// Record a movement that no adjustment, transfer or sale owns
    pub async fn record_movement(
        &self,
        input: RecordMovementInput,
        actor: Option<Uuid>,
    ) -> AppResult<StockMovement> {
        let request = input.into_request(actor)?;

        let mut tx = self.db.begin().await?;
        ensure_site(&mut tx, request.warehouse_id, request.location_id).await?;

        let movement = StockLedger::post(&mut tx, &request).await?;
        tx.commit().await?;

        Ok(movement)
    }

    /// Every stock level a product has, per site
    pub async fn product_stock(&self, product_id: Uuid) -> AppResult<Vec<StockLevel>> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1 AND deleted_at IS NULL)")
            .bind(product_id)
            .fetch_one(&self.db)
            .await?;
        if !exists {
            return Err(AppError::NotFound("Product".to_string()));
        }

        let levels = sqlx::query_as::<_, StockLevel>(
            r#"
            SELECT id, product_id, warehouse_id, location_id, quantity, updated_at
            FROM stock_levels
            WHERE product_id = $1
            ORDER BY warehouse_id, location_id NULLS FIRST
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.db)
        .await?;

        Ok(levels)
    }

    /// Current stock of the given products at a site, zero where none is held
    pub async fn current_stock(&self, input: &CurrentStockInput) -> AppResult<Vec<SiteStock>> {
        let stock = sqlx::query_as::<_, SiteStock>(
            r#"
            SELECT p.id AS product_id, p.name AS product_name, p.sku,
                   COALESCE(sl.quantity, 0) AS quantity, p.cost_price AS unit_cost
            FROM products p
            LEFT JOIN stock_levels sl
              ON sl.product_id = p.id
             AND sl.warehouse_id = $1
             AND sl.location_id IS NOT DISTINCT FROM $2
            WHERE p.id = ANY($3) AND p.deleted_at IS NULL
            ORDER BY p.name
            "#,
        )
        .bind(input.warehouse_id)
        .bind(input.location_id)
        .bind(&input.product_ids)
        .fetch_all(&self.db)
        .await?;

        Ok(stock)
    }
}

/// Check that a warehouse exists and, when given, that the location belongs to it
pub async fn ensure_site(
    conn: &mut PgConnection,
    warehouse_id: Uuid,
    location_id: Option<Uuid>,
) -> AppResult<()> {
    let active: Option<bool> = sqlx::query_scalar("SELECT is_active FROM warehouses WHERE id = $1")
        .bind(warehouse_id)
        .fetch_optional(&mut *conn)
        .await?;
    match active {
        None => return Err(AppError::NotFound(format!("Warehouse {}", warehouse_id))),
        Some(false) => {
            return Err(AppError::validation("warehouse_id", "Warehouse is inactive"));
        }
        Some(true) => {}
    }

    if let Some(location_id) = location_id {
        let owner: Option<Uuid> = sqlx::query_scalar("SELECT warehouse_id FROM locations WHERE id = $1")
            .bind(location_id)
            .fetch_optional(&mut *conn)
            .await?;
        match owner {
            None => return Err(AppError::NotFound(format!("Location {}", location_id))),
            Some(owner) if owner != warehouse_id => {
                return Err(AppError::validation(
                    "location_id",
                    "Location does not belong to the warehouse",
                ));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(movement_type: MovementType, quantity_delta: i32) -> RecordMovementInput {
        RecordMovementInput {
            product_id: Uuid::new_v4(),
            warehouse_id: Uuid::new_v4(),
            location_id: None,
            movement_type,
            quantity_delta,
            notes: Some("Water damage".into()),
        }
    }

    #[test]
    fn test_recorded_movement_has_no_document() {
        let actor = Uuid::new_v4();
        let request = input(MovementType::Damage, -2).into_request(Some(actor)).unwrap();
        assert_eq!(request.reference, None);
        assert_eq!(request.quantity_delta, -2);
        assert_eq!(request.actor, Some(actor));
    }

    #[test]
    fn test_document_movement_types_are_refused() {
        for kind in [MovementType::Sale, MovementType::TransferOut, MovementType::Adjustment] {
            assert!(matches!(
                input(kind, -1).into_request(None),
                Err(AppError::Validation { .. })
            ));
        }
    }
}
