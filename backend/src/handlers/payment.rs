//! HTTP handlers for payments

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{ApiResponse, PaginatedResponse, Pagination, Payment};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::Actor;
use crate::services::payment::{CreatePaymentInput, PaymentFilter, PaymentService};
use crate::AppState;

pub async fn list_payments(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<PaymentFilter>,
) -> AppResult<Json<ApiResponse<PaginatedResponse<Payment>>>> {
    let service = PaymentService::new(state.db);
    let payments = service.list_payments(&filter, &pagination).await?;
    Ok(Json(ApiResponse::ok(payments)))
}

pub async fn get_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    let service = PaymentService::new(state.db);
    let payment = service.get_payment(payment_id).await?;
    Ok(Json(ApiResponse::ok(payment)))
}

pub async fn create_payment(
    State(state): State<AppState>,
    actor: Actor,
    Json(input): Json<CreatePaymentInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<Payment>>)> {
    let service = PaymentService::new(state.db);
    let payment = service.create_payment(input, actor.0).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(payment, "Payment recorded")),
    ))
}

pub async fn complete_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    let service = PaymentService::new(state.db);
    let payment = service.complete_payment(payment_id).await?;
    Ok(Json(ApiResponse::with_message(payment, "Payment completed")))
}

pub async fn cancel_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    let service = PaymentService::new(state.db);
    let payment = service.cancel_payment(payment_id).await?;
    Ok(Json(ApiResponse::with_message(payment, "Payment cancelled")))
}

pub async fn fail_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    let service = PaymentService::new(state.db);
    let payment = service.fail_payment(payment_id).await?;
    Ok(Json(ApiResponse::with_message(payment, "Payment marked as failed")))
}
