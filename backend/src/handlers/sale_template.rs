//! HTTP handlers for sale templates

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{ApiResponse, PaginatedResponse, Pagination, Sale};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::{Actor, OptionalJson};
use crate::services::sale_template::{
    CreateTemplateInput, MostUsedQuery, SaleTemplateService, SaleTemplateView, TemplateFilter,
    TemplateSaleInput, UpdateTemplateInput,
};
use crate::AppState;

pub async fn list_sale_templates(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<TemplateFilter>,
) -> AppResult<Json<ApiResponse<PaginatedResponse<SaleTemplateView>>>> {
    let service = SaleTemplateService::new(state.db, state.config);
    let templates = service.list_templates(&filter, &pagination).await?;
    Ok(Json(ApiResponse::ok(templates)))
}

pub async fn most_used_sale_templates(
    State(state): State<AppState>,
    Query(query): Query<MostUsedQuery>,
) -> AppResult<Json<ApiResponse<Vec<SaleTemplateView>>>> {
    let service = SaleTemplateService::new(state.db, state.config);
    let templates = service.most_used(query.limit).await?;
    Ok(Json(ApiResponse::ok(templates)))
}

pub async fn get_sale_template(
    State(state): State<AppState>,
    Path(template_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<SaleTemplateView>>> {
    let service = SaleTemplateService::new(state.db, state.config);
    let template = service.get_template(template_id).await?;
    Ok(Json(ApiResponse::ok(template)))
}

/// Save a template owned by the acting user
pub async fn create_sale_template(
    State(state): State<AppState>,
    actor: Actor,
    Json(input): Json<CreateTemplateInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<SaleTemplateView>>)> {
    let service = SaleTemplateService::new(state.db, state.config);
    let template = service.create_template(input, actor.0).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(template, "Sale template created")),
    ))
}

pub async fn update_sale_template(
    State(state): State<AppState>,
    Path(template_id): Path<Uuid>,
    Json(input): Json<UpdateTemplateInput>,
) -> AppResult<Json<ApiResponse<SaleTemplateView>>> {
    let service = SaleTemplateService::new(state.db, state.config);
    let template = service.update_template(template_id, input).await?;
    Ok(Json(ApiResponse::with_message(template, "Sale template updated")))
}

pub async fn delete_sale_template(
    State(state): State<AppState>,
    Path(template_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    let service = SaleTemplateService::new(state.db, state.config);
    service.delete_template(template_id).await?;
    Ok(Json(ApiResponse::message("Sale template deleted")))
}

pub async fn toggle_sale_template(
    State(state): State<AppState>,
    Path(template_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<SaleTemplateView>>> {
    let service = SaleTemplateService::new(state.db, state.config);
    let template = service.toggle_active(template_id).await?;
    Ok(Json(ApiResponse::ok(template)))
}

pub async fn duplicate_sale_template(
    State(state): State<AppState>,
    Path(template_id): Path<Uuid>,
    actor: Actor,
) -> AppResult<(StatusCode, Json<ApiResponse<SaleTemplateView>>)> {
    let service = SaleTemplateService::new(state.db, state.config);
    let template = service.duplicate_template(template_id, actor.0).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(template, "Sale template duplicated")),
    ))
}

/// Draft a sale from a template; an empty body keeps every template default
pub async fn create_sale_from_template(
    State(state): State<AppState>,
    Path(template_id): Path<Uuid>,
    actor: Actor,
    OptionalJson(input): OptionalJson<TemplateSaleInput>,
) -> AppResult<(StatusCode, Json<ApiResponse<Sale>>)> {
    let service = SaleTemplateService::new(state.db, state.config);
    let sale = service.create_sale(template_id, input, actor.0).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(sale, "Sale created from template")),
    ))
}
