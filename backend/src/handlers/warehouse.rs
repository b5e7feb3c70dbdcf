//! HTTP handlers for warehouses and their locations

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{ApiResponse, PaginatedResponse, Pagination};
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::warehouse::{
    CreateLocationInput, CreateWarehouseInput, LocationFilter, LocationService, LocationView,
    UpdateLocationInput, UpdateWarehouseInput, WarehouseDetail, WarehouseFilter,
    WarehouseService, WarehouseView,
};
use crate::AppState;

pub async fn list_warehouses(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<WarehouseFilter>,
) -> AppResult<Json<ApiResponse<PaginatedResponse<WarehouseView>>>> {
    let service = WarehouseService::new(state.db);
    let warehouses = service.list_warehouses(&filter, &pagination).await?;
    Ok(Json(ApiResponse::ok(warehouses)))
}

/// Warehouse with location and stock statistics
pub async fn get_warehouse(
    State(state): State<AppState>,
    Path(warehouse_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<WarehouseDetail>>> {
    let service = WarehouseService::new(state.db);
    let warehouse = service.get_warehouse(warehouse_id).await?;
    Ok(Json(ApiResponse::ok(warehouse)))
}

pub async fn create_warehouse(
    State(state): State<AppState>,
    Json(input): Json<CreateWarehouseInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<WarehouseView>>)> {
    let service = WarehouseService::new(state.db);
    let warehouse = service.create_warehouse(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(warehouse, "Warehouse created")),
    ))
}

pub async fn update_warehouse(
    State(state): State<AppState>,
    Path(warehouse_id): Path<Uuid>,
    Json(input): Json<UpdateWarehouseInput>,
) -> AppResult<Json<ApiResponse<WarehouseView>>> {
    let service = WarehouseService::new(state.db);
    let warehouse = service.update_warehouse(warehouse_id, input).await?;
    Ok(Json(ApiResponse::with_message(warehouse, "Warehouse updated")))
}

/// Make this the main warehouse
pub async fn set_main_warehouse(
    State(state): State<AppState>,
    Path(warehouse_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<WarehouseView>>> {
    let service = WarehouseService::new(state.db);
    let warehouse = service.set_main(warehouse_id).await?;
    Ok(Json(ApiResponse::with_message(warehouse, "Main warehouse updated")))
}

pub async fn delete_warehouse(
    State(state): State<AppState>,
    Path(warehouse_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    let service = WarehouseService::new(state.db);
    service.delete_warehouse(warehouse_id).await?;
    Ok(Json(ApiResponse::message("Warehouse deleted")))
}

pub async fn list_locations(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<LocationFilter>,
) -> AppResult<Json<ApiResponse<PaginatedResponse<LocationView>>>> {
    let service = LocationService::new(state.db);
    let locations = service.list_locations(&filter, &pagination).await?;
    Ok(Json(ApiResponse::ok(locations)))
}

pub async fn get_location(
    State(state): State<AppState>,
    Path(location_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<LocationView>>> {
    let service = LocationService::new(state.db);
    let location = service.get_location(location_id).await?;
    Ok(Json(ApiResponse::ok(location)))
}

pub async fn create_location(
    State(state): State<AppState>,
    Json(input): Json<CreateLocationInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<LocationView>>)> {
    let service = LocationService::new(state.db);
    let location = service.create_location(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(location, "Location created")),
    ))
}

pub async fn update_location(
    State(state): State<AppState>,
    Path(location_id): Path<Uuid>,
    Json(input): Json<UpdateLocationInput>,
) -> AppResult<Json<ApiResponse<LocationView>>> {
    let service = LocationService::new(state.db);
    let location = service.update_location(location_id, input).await?;
    Ok(Json(ApiResponse::with_message(location, "Location updated")))
}

pub async fn delete_location(
    State(state): State<AppState>,
    Path(location_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    let service = LocationService::new(state.db);
    service.delete_location(location_id).await?;
    Ok(Json(ApiResponse::message("Location deleted")))
}
