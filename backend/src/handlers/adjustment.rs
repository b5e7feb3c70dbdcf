//! HTTP handlers for stock adjustments

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{ApiResponse, PaginatedResponse, Pagination, StockAdjustment};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::Actor;
use crate::services::adjustment::{
    AdjustmentFilter, AdjustmentService, CreateAdjustmentInput, FromCountInput,
    UpdateAdjustmentInput,
};
use crate::AppState;

pub async fn list_adjustments(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<AdjustmentFilter>,
) -> AppResult<Json<ApiResponse<PaginatedResponse<StockAdjustment>>>> {
    let service = AdjustmentService::new(state.db);
    let adjustments = service.list_adjustments(&filter, &pagination).await?;
    Ok(Json(ApiResponse::ok(adjustments)))
}

pub async fn get_adjustment(
    State(state): State<AppState>,
    Path(adjustment_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<StockAdjustment>>> {
    let service = AdjustmentService::new(state.db);
    let adjustment = service.get_adjustment(adjustment_id).await?;
    Ok(Json(ApiResponse::ok(adjustment)))
}

pub async fn create_adjustment(
    State(state): State<AppState>,
    actor: Actor,
    Json(input): Json<CreateAdjustmentInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<StockAdjustment>>)> {
    let creator = actor.require()?;
    let service = AdjustmentService::new(state.db);
    let adjustment = service.create_adjustment(input, creator).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(adjustment, "Stock adjustment created")),
    ))
}

/// Draft an adjustment from a physical count
pub async fn create_adjustment_from_count(
    State(state): State<AppState>,
    actor: Actor,
    Json(input): Json<FromCountInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<StockAdjustment>>)> {
    let creator = actor.require()?;
    let service = AdjustmentService::new(state.db);
    let adjustment = service.create_from_count(input, creator).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(adjustment, "Stock adjustment created from count")),
    ))
}

pub async fn update_adjustment(
    State(state): State<AppState>,
    Path(adjustment_id): Path<Uuid>,
    Json(input): Json<UpdateAdjustmentInput>,
) -> AppResult<Json<ApiResponse<StockAdjustment>>> {
    let service = AdjustmentService::new(state.db);
    let adjustment = service.update_adjustment(adjustment_id, input).await?;
    Ok(Json(ApiResponse::with_message(adjustment, "Stock adjustment updated")))
}

pub async fn delete_adjustment(
    State(state): State<AppState>,
    Path(adjustment_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    let service = AdjustmentService::new(state.db);
    service.delete_adjustment(adjustment_id).await?;
    Ok(Json(ApiResponse::message("Stock adjustment deleted")))
}

pub async fn submit_adjustment(
    State(state): State<AppState>,
    Path(adjustment_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<StockAdjustment>>> {
    let service = AdjustmentService::new(state.db);
    let adjustment = service.submit_adjustment(adjustment_id).await?;
    Ok(Json(ApiResponse::with_message(adjustment, "Stock adjustment submitted")))
}

/// Approve a pending adjustment; the approver must not be its creator
pub async fn approve_adjustment(
    State(state): State<AppState>,
    actor: Actor,
    Path(adjustment_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<StockAdjustment>>> {
    let approver = actor.require()?;
    let service = AdjustmentService::new(state.db);
    let adjustment = service.approve_adjustment(adjustment_id, approver).await?;
    Ok(Json(ApiResponse::with_message(adjustment, "Stock adjustment approved")))
}

/// Post every non-zero line to the ledger
pub async fn apply_adjustment(
    State(state): State<AppState>,
    actor: Actor,
    Path(adjustment_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<StockAdjustment>>> {
    let service = AdjustmentService::new(state.db);
    let adjustment = service.apply_adjustment(adjustment_id, actor.0).await?;
    Ok(Json(ApiResponse::with_message(adjustment, "Stock adjustment applied")))
}

pub async fn cancel_adjustment(
    State(state): State<AppState>,
    Path(adjustment_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<StockAdjustment>>> {
    let service = AdjustmentService::new(state.db);
    let adjustment = service.cancel_adjustment(adjustment_id).await?;
    Ok(Json(ApiResponse::with_message(adjustment, "Stock adjustment cancelled")))
}
