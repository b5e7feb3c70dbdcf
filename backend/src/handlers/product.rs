//! HTTP handlers for products

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{ApiResponse, PaginatedResponse, Pagination, StockLevel, StockMovement};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::Actor;
use crate::services::product::{
    CreateProductInput, ProductFilter, ProductService, ProductView, UpdateProductInput,
};
use crate::services::stock::{MovementFilter, StockService};
use crate::AppState;

fn product_service(state: AppState) -> ProductService {
    let default_tax_rate = state.config.sales.default_tax_rate;
    ProductService::new(state.db, default_tax_rate)
}

pub async fn list_products(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<ProductFilter>,
) -> AppResult<Json<ApiResponse<PaginatedResponse<ProductView>>>> {
    let products = product_service(state).list_products(&filter, &pagination).await?;
    Ok(Json(ApiResponse::ok(products)))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ProductView>>> {
    let product = product_service(state).get_product(product_id).await?;
    Ok(Json(ApiResponse::ok(product)))
}

/// Create a product, optionally posting its opening stock
pub async fn create_product(
    State(state): State<AppState>,
    actor: Actor,
    Json(input): Json<CreateProductInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<ProductView>>)> {
    let product = product_service(state).create_product(input, actor.0).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(product, "Product created")),
    ))
}

pub async fn update_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(input): Json<UpdateProductInput>,
) -> AppResult<Json<ApiResponse<ProductView>>> {
    let product = product_service(state).update_product(product_id, input).await?;
    Ok(Json(ApiResponse::with_message(product, "Product updated")))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    product_service(state).delete_product(product_id).await?;
    Ok(Json(ApiResponse::message("Product deleted")))
}

/// Ledger history of one product
pub async fn list_product_movements(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<MovementFilter>,
) -> AppResult<Json<ApiResponse<PaginatedResponse<StockMovement>>>> {
    let filter = MovementFilter {
        product_id: Some(product_id),
        ..filter
    };
    let service = StockService::new(state.db);
    let movements = service.list_movements(&filter, &pagination).await?;
    Ok(Json(ApiResponse::ok(movements)))
}

/// Stock levels of one product across every site
pub async fn get_product_stock(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Vec<StockLevel>>>> {
    let service = StockService::new(state.db);
    let levels = service.product_stock(product_id).await?;
    Ok(Json(ApiResponse::ok(levels)))
}
