//! HTTP handlers for customers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{ApiResponse, Customer, PaginatedResponse, Pagination};
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::customer::{
    CreateCustomerInput, CustomerDetail, CustomerFilter, CustomerService, UpdateCustomerInput,
};
use crate::AppState;

pub async fn list_customers(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<CustomerFilter>,
) -> AppResult<Json<ApiResponse<PaginatedResponse<Customer>>>> {
    let service = CustomerService::new(state.db);
    let customers = service.list_customers(&filter, &pagination).await?;
    Ok(Json(ApiResponse::ok(customers)))
}

/// Customer with purchase statistics and available credit
pub async fn get_customer(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<CustomerDetail>>> {
    let service = CustomerService::new(state.db);
    let customer = service.get_customer(customer_id).await?;
    Ok(Json(ApiResponse::ok(customer)))
}

pub async fn create_customer(
    State(state): State<AppState>,
    Json(input): Json<CreateCustomerInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<Customer>>)> {
    let service = CustomerService::new(state.db);
    let customer = service.create_customer(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(customer, "Customer created")),
    ))
}

pub async fn update_customer(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    Json(input): Json<UpdateCustomerInput>,
) -> AppResult<Json<ApiResponse<Customer>>> {
    let service = CustomerService::new(state.db);
    let customer = service.update_customer(customer_id, input).await?;
    Ok(Json(ApiResponse::with_message(customer, "Customer updated")))
}

pub async fn delete_customer(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    let service = CustomerService::new(state.db);
    service.delete_customer(customer_id).await?;
    Ok(Json(ApiResponse::message("Customer deleted")))
}
