//! HTTP handlers for sales

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{ApiResponse, PaginatedResponse, Pagination, Payment, Sale};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::Actor;
use crate::services::sale::{CreateSaleInput, SaleFilter, SaleService, UpdateSaleInput};
use crate::AppState;

pub async fn list_sales(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<SaleFilter>,
) -> AppResult<Json<ApiResponse<PaginatedResponse<Sale>>>> {
    let service = SaleService::new(state.db, state.config);
    let sales = service.list_sales(&filter, &pagination).await?;
    Ok(Json(ApiResponse::ok(sales)))
}

pub async fn get_sale(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Sale>>> {
    let service = SaleService::new(state.db, state.config);
    let sale = service.get_sale(sale_id).await?;
    Ok(Json(ApiResponse::ok(sale)))
}

/// Draft a sale; the acting user is recorded as the seller
pub async fn create_sale(
    State(state): State<AppState>,
    actor: Actor,
    Json(input): Json<CreateSaleInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<Sale>>)> {
    let service = SaleService::new(state.db, state.config);
    let sale = service.create_sale(input, actor.0).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(sale, "Sale created")),
    ))
}

pub async fn update_sale(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
    Json(input): Json<UpdateSaleInput>,
) -> AppResult<Json<ApiResponse<Sale>>> {
    let service = SaleService::new(state.db, state.config);
    let sale = service.update_sale(sale_id, input).await?;
    Ok(Json(ApiResponse::with_message(sale, "Sale updated")))
}

pub async fn delete_sale(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    let service = SaleService::new(state.db, state.config);
    service.delete_sale(sale_id).await?;
    Ok(Json(ApiResponse::message("Sale deleted")))
}

pub async fn complete_sale(
    State(state): State<AppState>,
    actor: Actor,
    Path(sale_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Sale>>> {
    let service = SaleService::new(state.db, state.config);
    let sale = service.complete_sale(sale_id, actor.0).await?;
    Ok(Json(ApiResponse::with_message(sale, "Sale completed")))
}

pub async fn cancel_sale(
    State(state): State<AppState>,
    actor: Actor,
    Path(sale_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Sale>>> {
    let service = SaleService::new(state.db, state.config);
    let sale = service.cancel_sale(sale_id, actor.0).await?;
    Ok(Json(ApiResponse::with_message(sale, "Sale cancelled")))
}

pub async fn list_sale_payments(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Vec<Payment>>>> {
    let service = SaleService::new(state.db, state.config);
    let payments = service.sale_payments(sale_id).await?;
    Ok(Json(ApiResponse::ok(payments)))
}
