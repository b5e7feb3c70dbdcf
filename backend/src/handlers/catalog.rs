//! HTTP handlers for categories and brands

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{ApiResponse, Brand, Category, PaginatedResponse, Pagination};
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::catalog::{
    BrandService, CatalogFilter, CategoryService, CreateBrandInput, CreateCategoryInput,
    UpdateBrandInput, UpdateCategoryInput,
};
use crate::AppState;

pub async fn list_categories(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<CatalogFilter>,
) -> AppResult<Json<ApiResponse<PaginatedResponse<Category>>>> {
    let service = CategoryService::new(state.db);
    let categories = service.list_categories(&filter, &pagination).await?;
    Ok(Json(ApiResponse::ok(categories)))
}

pub async fn get_category(
    State(state): State<AppState>,
    Path(category_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Category>>> {
    let service = CategoryService::new(state.db);
    let category = service.get_category(category_id).await?;
    Ok(Json(ApiResponse::ok(category)))
}

pub async fn create_category(
    State(state): State<AppState>,
    Json(input): Json<CreateCategoryInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<Category>>)> {
    let service = CategoryService::new(state.db);
    let category = service.create_category(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(category, "Category created")),
    ))
}

pub async fn update_category(
    State(state): State<AppState>,
    Path(category_id): Path<Uuid>,
    Json(input): Json<UpdateCategoryInput>,
) -> AppResult<Json<ApiResponse<Category>>> {
    let service = CategoryService::new(state.db);
    let category = service.update_category(category_id, input).await?;
    Ok(Json(ApiResponse::with_message(category, "Category updated")))
}

pub async fn delete_category(
    State(state): State<AppState>,
    Path(category_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    let service = CategoryService::new(state.db);
    service.delete_category(category_id).await?;
    Ok(Json(ApiResponse::message("Category deleted")))
}

pub async fn list_brands(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<CatalogFilter>,
) -> AppResult<Json<ApiResponse<PaginatedResponse<Brand>>>> {
    let service = BrandService::new(state.db);
    let brands = service.list_brands(&filter, &pagination).await?;
    Ok(Json(ApiResponse::ok(brands)))
}

pub async fn get_brand(
    State(state): State<AppState>,
    Path(brand_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Brand>>> {
    let service = BrandService::new(state.db);
    let brand = service.get_brand(brand_id).await?;
    Ok(Json(ApiResponse::ok(brand)))
}

pub async fn create_brand(
    State(state): State<AppState>,
    Json(input): Json<CreateBrandInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<Brand>>)> {
    let service = BrandService::new(state.db);
    let brand = service.create_brand(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(brand, "Brand created")),
    ))
}

pub async fn update_brand(
    State(state): State<AppState>,
    Path(brand_id): Path<Uuid>,
    Json(input): Json<UpdateBrandInput>,
) -> AppResult<Json<ApiResponse<Brand>>> {
    let service = BrandService::new(state.db);
    let brand = service.update_brand(brand_id, input).await?;
    Ok(Json(ApiResponse::with_message(brand, "Brand updated")))
}

pub async fn delete_brand(
    State(state): State<AppState>,
    Path(brand_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    let service = BrandService::new(state.db);
    service.delete_brand(brand_id).await?;
    Ok(Json(ApiResponse::message("Brand deleted")))
}
