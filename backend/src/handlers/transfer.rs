//! HTTP handlers for stock transfers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{ApiResponse, PaginatedResponse, Pagination, StockTransfer};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::{Actor, OptionalJson};
use crate::services::transfer::{
    CompleteTransferInput, CreateTransferInput, TransferFilter, TransferService,
    UpdateTransferInput,
};
use crate::AppState;

pub async fn list_transfers(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<TransferFilter>,
) -> AppResult<Json<ApiResponse<PaginatedResponse<StockTransfer>>>> {
    let service = TransferService::new(state.db);
    let transfers = service.list_transfers(&filter, &pagination).await?;
    Ok(Json(ApiResponse::ok(transfers)))
}

pub async fn get_transfer(
    State(state): State<AppState>,
    Path(transfer_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<StockTransfer>>> {
    let service = TransferService::new(state.db);
    let transfer = service.get_transfer(transfer_id).await?;
    Ok(Json(ApiResponse::ok(transfer)))
}

pub async fn create_transfer(
    State(state): State<AppState>,
    actor: Actor,
    Json(input): Json<CreateTransferInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<StockTransfer>>)> {
    let requester = actor.require()?;
    let service = TransferService::new(state.db);
    let transfer = service.create_transfer(input, requester).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(transfer, "Stock transfer created")),
    ))
}

pub async fn update_transfer(
    State(state): State<AppState>,
    Path(transfer_id): Path<Uuid>,
    Json(input): Json<UpdateTransferInput>,
) -> AppResult<Json<ApiResponse<StockTransfer>>> {
    let service = TransferService::new(state.db);
    let transfer = service.update_transfer(transfer_id, input).await?;
    Ok(Json(ApiResponse::with_message(transfer, "Stock transfer updated")))
}

pub async fn delete_transfer(
    State(state): State<AppState>,
    Path(transfer_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    let service = TransferService::new(state.db);
    service.delete_transfer(transfer_id).await?;
    Ok(Json(ApiResponse::message("Stock transfer deleted")))
}

pub async fn approve_transfer(
    State(state): State<AppState>,
    actor: Actor,
    Path(transfer_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<StockTransfer>>> {
    let approver = actor.require()?;
    let service = TransferService::new(state.db);
    let transfer = service.approve_transfer(transfer_id, approver).await?;
    Ok(Json(ApiResponse::with_message(transfer, "Stock transfer approved")))
}

/// Ship the transfer after checking stock at the source
pub async fn start_transfer(
    State(state): State<AppState>,
    Path(transfer_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<StockTransfer>>> {
    let service = TransferService::new(state.db);
    let transfer = service.start_transfer(transfer_id).await?;
    Ok(Json(ApiResponse::with_message(transfer, "Stock transfer in transit")))
}

/// Receive the transfer; an empty body receives every line in full
pub async fn complete_transfer(
    State(state): State<AppState>,
    actor: Actor,
    Path(transfer_id): Path<Uuid>,
    OptionalJson(input): OptionalJson<CompleteTransferInput>,
) -> AppResult<Json<ApiResponse<StockTransfer>>> {
    let receiver = actor.require()?;
    let service = TransferService::new(state.db);
    let transfer = service.complete_transfer(transfer_id, input, receiver).await?;
    Ok(Json(ApiResponse::with_message(transfer, "Stock transfer completed")))
}

pub async fn cancel_transfer(
    State(state): State<AppState>,
    Path(transfer_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<StockTransfer>>> {
    let service = TransferService::new(state.db);
    let transfer = service.cancel_transfer(transfer_id).await?;
    Ok(Json(ApiResponse::with_message(transfer, "Stock transfer cancelled")))
}
