//! HTTP handlers for electronic invoices

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{ApiResponse, ElectronicInvoice, PaginatedResponse, Pagination};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::OptionalJson;
use crate::services::invoice::{AuthorityResponse, InvoiceFilter, InvoiceService};
use crate::AppState;

pub async fn list_invoices(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<InvoiceFilter>,
) -> AppResult<Json<ApiResponse<PaginatedResponse<ElectronicInvoice>>>> {
    let service = InvoiceService::new(state.db, state.config);
    let invoices = service.list_invoices(&filter, &pagination).await?;
    Ok(Json(ApiResponse::ok(invoices)))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ElectronicInvoice>>> {
    let service = InvoiceService::new(state.db, state.config);
    let invoice = service.get_invoice(invoice_id).await?;
    Ok(Json(ApiResponse::ok(invoice)))
}

/// Issue the sale's electronic invoice; 200 with the existing one on repeat calls
pub async fn issue_invoice(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<ApiResponse<ElectronicInvoice>>)> {
    let service = InvoiceService::new(state.db, state.config);
    let (invoice, created) = service.issue_invoice(sale_id).await?;
    if created {
        Ok((
            StatusCode::CREATED,
            Json(ApiResponse::with_message(invoice, "Electronic invoice issued")),
        ))
    } else {
        Ok((
            StatusCode::OK,
            Json(ApiResponse::with_message(invoice, "Electronic invoice already issued")),
        ))
    }
}

pub async fn send_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ElectronicInvoice>>> {
    let service = InvoiceService::new(state.db, state.config);
    let invoice = service.send_invoice(invoice_id).await?;
    Ok(Json(ApiResponse::with_message(invoice, "Electronic invoice sent")))
}

pub async fn accept_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    OptionalJson(response): OptionalJson<AuthorityResponse>,
) -> AppResult<Json<ApiResponse<ElectronicInvoice>>> {
    let service = InvoiceService::new(state.db, state.config);
    let invoice = service.accept_invoice(invoice_id, response).await?;
    Ok(Json(ApiResponse::with_message(invoice, "Electronic invoice accepted")))
}

pub async fn reject_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    OptionalJson(response): OptionalJson<AuthorityResponse>,
) -> AppResult<Json<ApiResponse<ElectronicInvoice>>> {
    let service = InvoiceService::new(state.db, state.config);
    let invoice = service.reject_invoice(invoice_id, response).await?;
    Ok(Json(ApiResponse::with_message(invoice, "Electronic invoice rejected")))
}

pub async fn cancel_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ElectronicInvoice>>> {
    let service = InvoiceService::new(state.db, state.config);
    let invoice = service.cancel_invoice(invoice_id).await?;
    Ok(Json(ApiResponse::with_message(invoice, "Electronic invoice cancelled")))
}
