//! Warehouse and location service

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    warehouse_code, warehouse_deletion_blocker, Location, LocationType, PaginatedResponse,
    Pagination, Warehouse, WarehouseStats,
};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use super::search_pattern;
use crate::error::{AppError, AppResult};

/// Warehouse with its derived figures
#[derive(Debug, Serialize)]
pub struct WarehouseView {
    #[serde(flatten)]
    pub warehouse: Warehouse,
    pub utilization_percentage: Decimal,
    pub available_capacity: Option<Decimal>,
    pub full_address: String,
}

impl From<Warehouse> for WarehouseView {
    fn from(warehouse: Warehouse) -> Self {
        Self {
            utilization_percentage: warehouse.utilization_percentage(),
            available_capacity: warehouse.available_capacity(),
            full_address: warehouse.full_address(),
            warehouse,
        }
    }
}

/// Single warehouse with occupancy
#[derive(Debug, Serialize)]
pub struct WarehouseDetail {
    #[serde(flatten)]
    pub view: WarehouseView,
    pub stats: WarehouseStats,
}

#[derive(Debug, Default, Deserialize)]
pub struct WarehouseFilter {
    pub search: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateWarehouseInput {
    #[validate(length(min = 1, max = 20, message = "Code must be 1-20 characters"))]
    pub code: Option<String>,
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub manager_name: Option<String>,
    pub phone: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub is_active: Option<bool>,
    pub capacity: Option<Decimal>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateWarehouseInput {
    #[validate(length(min = 1, max = 20, message = "Code must be 1-20 characters"))]
    pub code: Option<String>,
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub manager_name: Option<String>,
    pub phone: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub is_active: Option<bool>,
    pub capacity: Option<Decimal>,
    pub current_utilization: Option<Decimal>,
}

#[derive(Clone)]
pub struct WarehouseService {
    db: PgPool,
}

impl WarehouseService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_warehouses(
        &self,
        filter: &WarehouseFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<WarehouseView>> {
        let pattern = search_pattern(filter.search.as_deref());

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM warehouses
            WHERE ($1::text IS NULL OR name ILIKE $1 OR code ILIKE $1 OR city ILIKE $1)
              AND ($2::boolean IS NULL OR is_active = $2)
            "#,
        )
        .bind(&pattern)
        .bind(filter.is_active)
        .fetch_one(&self.db)
        .await?;

        let warehouses = sqlx::query_as::<_, Warehouse>(
            r#"
            SELECT * FROM warehouses
            WHERE ($1::text IS NULL OR name ILIKE $1 OR code ILIKE $1 OR city ILIKE $1)
              AND ($2::boolean IS NULL OR is_active = $2)
            ORDER BY is_main DESC, code
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(&pattern)
        .bind(filter.is_active)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let views = warehouses.into_iter().map(WarehouseView::from).collect();
        Ok(PaginatedResponse::new(views, pagination, total as u64))
    }

    async fn fetch_warehouse(&self, warehouse_id: Uuid) -> AppResult<Warehouse> {
        sqlx::query_as::<_, Warehouse>("SELECT * FROM warehouses WHERE id = $1")
            .bind(warehouse_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Warehouse".to_string()))
    }

    /// Warehouse with location, stock and transfer counts
    pub async fn get_warehouse(&self, warehouse_id: Uuid) -> AppResult<WarehouseDetail> {
        let warehouse = self.fetch_warehouse(warehouse_id).await?;

        let (total_locations, active_locations): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COUNT(*) FILTER (WHERE is_active)
            FROM locations WHERE warehouse_id = $1
            "#,
        )
        .bind(warehouse_id)
        .fetch_one(&self.db)
        .await?;

        let (total_stock, unique_products): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(quantity), 0)::BIGINT,
                   COUNT(DISTINCT product_id) FILTER (WHERE quantity > 0)
            FROM stock_levels WHERE warehouse_id = $1
            "#,
        )
        .bind(warehouse_id)
        .fetch_one(&self.db)
        .await?;

        let (open_transfers_in, open_transfers_out) = self.open_transfers(warehouse_id).await?;

        let stats = WarehouseStats {
            warehouse_id,
            total_locations,
            active_locations,
            total_stock,
            unique_products,
            utilization_percentage: warehouse.utilization_percentage(),
            available_capacity: warehouse.available_capacity(),
            open_transfers_in,
            open_transfers_out,
        };

        Ok(WarehouseDetail {
            view: warehouse.into(),
            stats,
        })
    }

    async fn open_transfers(&self, warehouse_id: Uuid) -> AppResult<(i64, i64)> {
        let counts: (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FILTER (WHERE to_warehouse_id = $1),
                   COUNT(*) FILTER (WHERE from_warehouse_id = $1)
            FROM stock_transfers
            WHERE status IN ('draft', 'pending', 'in_transit')
              AND (to_warehouse_id = $1 OR from_warehouse_id = $1)
            "#,
        )
        .bind(warehouse_id)
        .fetch_one(&self.db)
        .await?;
        Ok(counts)
    }

    /// Create a warehouse; the first one becomes the main warehouse
    pub async fn create_warehouse(&self, input: CreateWarehouseInput) -> AppResult<WarehouseView> {
        input.validate()?;
        if let Some(capacity) = input.capacity {
            if capacity < Decimal::ZERO {
                return Err(AppError::validation("capacity", "Capacity cannot be negative"));
            }
        }

        let mut tx = self.db.begin().await?;

        // serialize code generation and the main flag
        sqlx::query("LOCK TABLE warehouses IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;

        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM warehouses")
            .fetch_one(&mut *tx)
            .await?;
        let code = match input.code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => code.to_uppercase(),
            None => {
                let highest: Option<i64> = sqlx::query_scalar(
                    "SELECT MAX(SUBSTRING(code FROM 3)::BIGINT) FROM warehouses WHERE code ~ '^WH[0-9]{1,18}$'",
                )
                .fetch_one(&mut *tx)
                .await?;
                warehouse_code(highest)
            }
        };

        let warehouse = sqlx::query_as::<_, Warehouse>(
            r#"
            INSERT INTO warehouses (
                code, name, description, address, city, state, postal_code, country,
                manager_name, phone, email, is_active, is_main, capacity
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(&code)
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(&input.address)
        .bind(&input.city)
        .bind(&input.state)
        .bind(&input.postal_code)
        .bind(&input.country)
        .bind(&input.manager_name)
        .bind(&input.phone)
        .bind(&input.email)
        .bind(input.is_active.unwrap_or(true))
        .bind(existing == 0)
        .bind(input.capacity)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(warehouse_id = %warehouse.id, code = %warehouse.code, "warehouse created");
        Ok(warehouse.into())
    }

    pub async fn update_warehouse(
        &self,
        warehouse_id: Uuid,
        input: UpdateWarehouseInput,
    ) -> AppResult<WarehouseView> {
        input.validate()?;
        let existing = self.fetch_warehouse(warehouse_id).await?;
        if existing.is_main && input.is_active == Some(false) {
            return Err(AppError::validation("is_active", "The main warehouse cannot be deactivated"));
        }

        let warehouse = sqlx::query_as::<_, Warehouse>(
            r#"
            UPDATE warehouses
            SET code = COALESCE($1, code),
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                address = COALESCE($4, address),
                city = COALESCE($5, city),
                state = COALESCE($6, state),
                postal_code = COALESCE($7, postal_code),
                country = COALESCE($8, country),
                manager_name = COALESCE($9, manager_name),
                phone = COALESCE($10, phone),
                email = COALESCE($11, email),
                is_active = COALESCE($12, is_active),
                capacity = COALESCE($13, capacity),
                current_utilization = COALESCE($14, current_utilization),
                updated_at = NOW()
            WHERE id = $15
            RETURNING *
            "#,
        )
        .bind(input.code.as_deref().map(|c| c.trim().to_uppercase()))
        .bind(input.name.as_deref().map(str::trim))
        .bind(&input.description)
        .bind(&input.address)
        .bind(&input.city)
        .bind(&input.state)
        .bind(&input.postal_code)
        .bind(&input.country)
        .bind(&input.manager_name)
        .bind(&input.phone)
        .bind(&input.email)
        .bind(input.is_active)
        .bind(input.capacity)
        .bind(input.current_utilization)
        .bind(warehouse_id)
        .fetch_one(&self.db)
        .await?;

        Ok(warehouse.into())
    }

    /// Make `warehouse_id` the only main warehouse
    pub async fn set_main(&self, warehouse_id: Uuid) -> AppResult<WarehouseView> {
        let mut tx = self.db.begin().await?;

        let active: bool = sqlx::query_scalar("SELECT is_active FROM warehouses WHERE id = $1 FOR UPDATE")
            .bind(warehouse_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Warehouse".to_string()))?;
        if !active {
            return Err(AppError::validation("is_main", "An inactive warehouse cannot be main"));
        }

        sqlx::query("UPDATE warehouses SET is_main = FALSE, updated_at = NOW() WHERE is_main AND id <> $1")
            .bind(warehouse_id)
            .execute(&mut *tx)
            .await?;

        let warehouse = sqlx::query_as::<_, Warehouse>(
            "UPDATE warehouses SET is_main = TRUE, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(warehouse_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(warehouse_id = %warehouse_id, "main warehouse changed");
        Ok(warehouse.into())
    }

    /// Delete an empty, non-main warehouse without open transfers or history
    pub async fn delete_warehouse(&self, warehouse_id: Uuid) -> AppResult<()> {
        let warehouse = self.fetch_warehouse(warehouse_id).await?;

        let total_stock: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM stock_levels WHERE warehouse_id = $1",
        )
        .bind(warehouse_id)
        .fetch_one(&self.db)
        .await?;
        let (open_in, open_out) = self.open_transfers(warehouse_id).await?;

        if let Some(reason) = warehouse_deletion_blocker(warehouse.is_main, total_stock, open_in + open_out) {
            return Err(AppError::conflict("warehouse", reason));
        }

        let history: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(SELECT 1 FROM stock_movements WHERE warehouse_id = $1)
                OR EXISTS(SELECT 1 FROM sales WHERE warehouse_id = $1)
                OR EXISTS(SELECT 1 FROM stock_adjustments WHERE warehouse_id = $1)
                OR EXISTS(SELECT 1 FROM stock_transfers WHERE from_warehouse_id = $1 OR to_warehouse_id = $1)
            "#,
        )
        .bind(warehouse_id)
        .fetch_one(&self.db)
        .await?;
        if history {
            return Err(AppError::conflict(
                "warehouse",
                "Warehouse has stock history; deactivate it instead",
            ));
        }

        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM stock_levels WHERE warehouse_id = $1")
            .bind(warehouse_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM locations WHERE warehouse_id = $1")
            .bind(warehouse_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM warehouses WHERE id = $1")
            .bind(warehouse_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(warehouse_id = %warehouse_id, "warehouse deleted");
        Ok(())
    }
}

// ============================================================================
// Locations
// ============================================================================

#[derive(Debug, Serialize)]
pub struct LocationView {
    #[serde(flatten)]
    pub location: Location,
    pub position: Option<String>,
}

impl From<Location> for LocationView {
    fn from(location: Location) -> Self {
        Self {
            position: location.position(),
            location,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LocationFilter {
    pub warehouse_id: Option<Uuid>,
    pub search: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateLocationInput {
    pub warehouse_id: Uuid,
    #[validate(length(min = 1, max = 50, message = "Code must be 1-50 characters"))]
    pub code: String,
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,
    pub description: Option<String>,
    pub location_type: Option<LocationType>,
    pub aisle: Option<String>,
    pub rack: Option<String>,
    pub shelf: Option<String>,
    pub bin: Option<String>,
    #[validate(range(min = 0, message = "Capacity cannot be negative"))]
    pub capacity: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateLocationInput {
    #[validate(length(min = 1, max = 50, message = "Code must be 1-50 characters"))]
    pub code: Option<String>,
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub location_type: Option<LocationType>,
    pub aisle: Option<String>,
    pub rack: Option<String>,
    pub shelf: Option<String>,
    pub bin: Option<String>,
    #[validate(range(min = 0, message = "Capacity cannot be negative"))]
    pub capacity: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Clone)]
pub struct LocationService {
    db: PgPool,
}

impl LocationService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_locations(
        &self,
        filter: &LocationFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<LocationView>> {
        let pattern = search_pattern(filter.search.as_deref());

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM locations
            WHERE ($1::uuid IS NULL OR warehouse_id = $1)
              AND ($2::text IS NULL OR name ILIKE $2 OR code ILIKE $2)
              AND ($3::boolean IS NULL OR is_active = $3)
            "#,
        )
        .bind(filter.warehouse_id)
        .bind(&pattern)
        .bind(filter.is_active)
        .fetch_one(&self.db)
        .await?;

        let locations = sqlx::query_as::<_, Location>(
            r#"
            SELECT * FROM locations
            WHERE ($1::uuid IS NULL OR warehouse_id = $1)
              AND ($2::text IS NULL OR name ILIKE $2 OR code ILIKE $2)
              AND ($3::boolean IS NULL OR is_active = $3)
            ORDER BY warehouse_id, code
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.warehouse_id)
        .bind(&pattern)
        .bind(filter.is_active)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let views = locations.into_iter().map(LocationView::from).collect();
        Ok(PaginatedResponse::new(views, pagination, total as u64))
    }

    pub async fn get_location(&self, location_id: Uuid) -> AppResult<LocationView> {
        sqlx::query_as::<_, Location>("SELECT * FROM locations WHERE id = $1")
            .bind(location_id)
            .fetch_optional(&self.db)
            .await?
            .map(LocationView::from)
            .ok_or_else(|| AppError::NotFound("Location".to_string()))
    }

    pub async fn create_location(&self, input: CreateLocationInput) -> AppResult<LocationView> {
        input.validate()?;

        let warehouse_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM warehouses WHERE id = $1)")
            .bind(input.warehouse_id)
            .fetch_one(&self.db)
            .await?;
        if !warehouse_exists {
            return Err(AppError::NotFound("Warehouse".to_string()));
        }

        let location = sqlx::query_as::<_, Location>(
            r#"
            INSERT INTO locations (
                warehouse_id, code, name, description, location_type,
                aisle, rack, shelf, bin, capacity, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(input.warehouse_id)
        .bind(input.code.trim().to_uppercase())
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(input.location_type.unwrap_or_default())
        .bind(&input.aisle)
        .bind(&input.rack)
        .bind(&input.shelf)
        .bind(&input.bin)
        .bind(input.capacity)
        .bind(input.is_active.unwrap_or(true))
        .fetch_one(&self.db)
        .await?;

        tracing::info!(location_id = %location.id, warehouse_id = %location.warehouse_id, "location created");
        Ok(location.into())
    }

    pub async fn update_location(
        &self,
        location_id: Uuid,
        input: UpdateLocationInput,
    ) -> AppResult<LocationView> {
        input.validate()?;

        sqlx::query_as::<_, Location>(
            r#"
            UPDATE locations
            SET code = COALESCE($1, code),
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                location_type = COALESCE($4, location_type),
                aisle = COALESCE($5, aisle),
                rack = COALESCE($6, rack),
                shelf = COALESCE($7, shelf),
                bin = COALESCE($8, bin),
                capacity = COALESCE($9, capacity),
                is_active = COALESCE($10, is_active),
                updated_at = NOW()
            WHERE id = $11
            RETURNING *
            "#,
        )
        .bind(input.code.as_deref().map(|c| c.trim().to_uppercase()))
        .bind(input.name.as_deref().map(str::trim))
        .bind(&input.description)
        .bind(input.location_type)
        .bind(&input.aisle)
        .bind(&input.rack)
        .bind(&input.shelf)
        .bind(&input.bin)
        .bind(input.capacity)
        .bind(input.is_active)
        .bind(location_id)
        .fetch_optional(&self.db)
        .await?
        .map(LocationView::from)
        .ok_or_else(|| AppError::NotFound("Location".to_string()))
    }

    /// Delete a location that holds no stock and has no history
    pub async fn delete_location(&self, location_id: Uuid) -> AppResult<()> {
        let held: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM stock_levels WHERE location_id = $1",
        )
        .bind(location_id)
        .fetch_one(&self.db)
        .await?;
        if held > 0 {
            return Err(AppError::conflict(
                "location",
                format!("Location still holds {} unit(s) of stock", held),
            ));
        }

        let history: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(SELECT 1 FROM stock_movements WHERE location_id = $1)
                OR EXISTS(SELECT 1 FROM sales WHERE location_id = $1)
                OR EXISTS(SELECT 1 FROM stock_adjustments WHERE location_id = $1)
                OR EXISTS(SELECT 1 FROM stock_transfers WHERE from_location_id = $1 OR to_location_id = $1)
            "#,
        )
        .bind(location_id)
        .fetch_one(&self.db)
        .await?;
        if history {
            return Err(AppError::conflict(
                "location",
                "Location has stock history; deactivate it instead",
            ));
        }

        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM stock_levels WHERE location_id = $1")
            .bind(location_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM locations WHERE id = $1")
            .bind(location_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Location".to_string()));
        }
        tx.commit().await?;

        tracing::info!(location_id = %location_id, "location deleted");
        Ok(())
    }
}
