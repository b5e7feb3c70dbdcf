//! HTTP handlers for the stock ledger

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{ApiResponse, PaginatedResponse, Pagination, StockMovement};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::Actor;
use crate::services::stock::{
    CurrentStockInput, MovementFilter, RecordMovementInput, SiteStock, StockService,
};
use crate::AppState;

pub async fn list_movements(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<MovementFilter>,
) -> AppResult<Json<ApiResponse<PaginatedResponse<StockMovement>>>> {
    let service = StockService::new(state.db);
    let movements = service.list_movements(&filter, &pagination).await?;
    Ok(Json(ApiResponse::ok(movements)))
}

pub async fn get_movement(
    State(state): State<AppState>,
    Path(movement_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<StockMovement>>> {
    let service = StockService::new(state.db);
    let movement = service.get_movement(movement_id).await?;
    Ok(Json(ApiResponse::ok(movement)))
}

/// Record a receipt, damage or loss outside any document
pub async fn record_movement(
    State(state): State<AppState>,
    actor: Actor,
    Json(input): Json<RecordMovementInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<StockMovement>>)> {
    let service = StockService::new(state.db);
    let movement = service.record_movement(input, actor.0).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(movement, "Stock movement recorded")),
    ))
}

/// Current quantities of a set of products at one site
pub async fn current_stock(
    State(state): State<AppState>,
    Json(input): Json<CurrentStockInput>,
) -> AppResult<Json<ApiResponse<Vec<SiteStock>>>> {
    let service = StockService::new(state.db);
    let stock = service.current_stock(&input).await?;
    Ok(Json(ApiResponse::ok(stock)))
}
