// src/handlers/stock.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{Datelike, Utc};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    handlers::page_bounds,
    middleware::{auth::AuthenticatedUser, i18n::Locale},
    models::{
        pharmacy::Pharmacy,
        stock::{MutationStatus, StockMutation, StockMutationView, StockRecord, StockReportEntry},
    },
};

// =============================================================================
//  1. TRANSFERÊNCIAS ENTRE FARMÁCIAS
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestMutationPayload {
    /// Produto da farmácia do admin que vai receber o estoque
    pub to_pharmacy_product_id: Uuid,

    /// Farmácia que vai ceder o estoque
    pub from_pharmacy_id: Uuid,

    #[validate(range(min = 1, message = "A quantidade deve ser maior que zero."))]
    #[schema(example = 2)]
    pub quantity: i32,
}

// POST /api/stock-mutations
#[utoipa::path(
    post,
    path = "/api/stock-mutations",
    tag = "Stock",
    request_body = RequestMutationPayload,
    responses(
        (status = 201, description = "Transferência pendente criada", body = StockMutation),
        (status = 403, description = "O destino não é da farmácia do admin"),
        (status = 422, description = "Origem sem estoque suficiente")
    ),
    security(("api_jwt" = []))
)]
pub async fn request_mutation(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedUser(actor): AuthenticatedUser,
    Json(payload): Json<RequestMutationPayload>,
) -> Result<impl IntoResponse, ApiError> {

    payload.validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let mutation = app_state.stock_mutation_service
        .request_mutation(
            &actor,
            payload.to_pharmacy_product_id,
            payload.from_pharmacy_id,
            payload.quantity,
        )
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(mutation)))
}

#[derive(Debug, Deserialize, Validate, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListMutationsQuery {
    pub status: Option<MutationStatus>,

    #[validate(range(min = 1, max = 100))]
    pub limit: Option<i64>,

    #[validate(range(min = 0))]
    pub offset: Option<i64>,
}

// GET /api/stock-mutations
#[utoipa::path(
    get,
    path = "/api/stock-mutations",
    tag = "Stock",
    params(ListMutationsQuery),
    responses(
        (status = 200, description = "Transferências em que o admin é origem ou destino", body = Vec<StockMutationView>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_mutations(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedUser(actor): AuthenticatedUser,
    Query(query): Query<ListMutationsQuery>,
) -> Result<impl IntoResponse, ApiError> {

    query.validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let (limit, offset) = page_bounds(query.limit, query.offset);

    let mutations = app_state.stock_mutation_service
        .list_mutations(&actor, query.status, limit, offset)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(mutations))
}

// GET /api/stock-mutations/{id}
#[utoipa::path(
    get,
    path = "/api/stock-mutations/{id}",
    tag = "Stock",
    responses(
        (status = 200, description = "Detalhe da transferência", body = StockMutationView),
        (status = 404, description = "Transferência não encontrada")
    ),
    params(
        ("id" = Uuid, Path, description = "ID da Transferência")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_mutation(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(mutation_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {

    let mutation = app_state.stock_mutation_service
        .mutation_detail(&actor, mutation_id)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(mutation))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DecideMutationPayload {
    #[schema(example = true)]
    pub accept: bool,
}

// PATCH /api/stock-mutations/{id}
#[utoipa::path(
    patch,
    path = "/api/stock-mutations/{id}",
    tag = "Stock",
    request_body = DecideMutationPayload,
    responses(
        (status = 200, description = "Transferência aceita ou recusada", body = StockMutation),
        (status = 403, description = "Só o admin da origem decide"),
        (status = 409, description = "Transferência já decidida"),
        (status = 422, description = "Origem sem estoque: recusada automaticamente")
    ),
    params(
        ("id" = Uuid, Path, description = "ID da Transferência")
    ),
    security(("api_jwt" = []))
)]
pub async fn decide_mutation(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(mutation_id): Path<Uuid>,
    Json(payload): Json<DecideMutationPayload>,
) -> Result<impl IntoResponse, ApiError> {

    let mutation = app_state.stock_mutation_service
        .decide_mutation(&actor, mutation_id, payload.accept)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(mutation))
}

// GET /api/pharmacy-products/{id}/available-pharmacies
#[utoipa::path(
    get,
    path = "/api/pharmacy-products/{id}/available-pharmacies",
    tag = "Stock",
    responses(
        (status = 200, description = "Outras farmácias com o mesmo produto", body = Vec<Pharmacy>)
    ),
    params(
        ("id" = Uuid, Path, description = "ID do Produto da Farmácia")
    ),
    security(("api_jwt" = []))
)]
pub async fn available_pharmacies(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(pharmacy_product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {

    let pharmacies = app_state.stock_mutation_service
        .available_pharmacies(&actor, pharmacy_product_id)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(pharmacies))
}

// =============================================================================
//  2. REGISTROS DE ESTOQUE
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordStockPayload {
    pub pharmacy_product_id: Uuid,

    #[validate(range(min = 1, message = "A quantidade deve ser maior que zero."))]
    #[schema(example = 10)]
    pub quantity: i32,

    #[serde(default)]
    pub is_reduction: bool,
}

// POST /api/stock-records
#[utoipa::path(
    post,
    path = "/api/stock-records",
    tag = "Stock",
    request_body = RecordStockPayload,
    responses(
        (status = 201, description = "Entrada ou saída registrada", body = StockRecord),
        (status = 422, description = "A saída deixaria o estoque negativo")
    ),
    security(("api_jwt" = []))
)]
pub async fn record_stock_change(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedUser(actor): AuthenticatedUser,
    Json(payload): Json<RecordStockPayload>,
) -> Result<impl IntoResponse, ApiError> {

    payload.validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let record = app_state.stock_ledger
        .record_stock_change(&actor, payload.pharmacy_product_id, payload.quantity, payload.is_reduction)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Deserialize, Validate, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListRecordsQuery {
    pub pharmacy_product_id: Option<Uuid>,

    #[validate(range(min = 1, max = 100))]
    pub limit: Option<i64>,

    #[validate(range(min = 0))]
    pub offset: Option<i64>,
}

// GET /api/stock-records
#[utoipa::path(
    get,
    path = "/api/stock-records",
    tag = "Stock",
    params(ListRecordsQuery),
    responses(
        (status = 200, description = "Histórico de estoque das farmácias do admin", body = Vec<StockRecord>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_stock_records(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedUser(actor): AuthenticatedUser,
    Query(query): Query<ListRecordsQuery>,
) -> Result<impl IntoResponse, ApiError> {

    query.validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let (limit, offset) = page_bounds(query.limit, query.offset);

    let records = app_state.stock_ledger
        .list_stock_records(&actor, query.pharmacy_product_id, limit, offset)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(records))
}

#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StockReportQuery {
    /// Ano do relatório (padrão: ano atual)
    #[validate(range(min = 2000, max = 9999))]
    pub year: Option<i32>,

    #[validate(range(min = 1, max = 12))]
    pub month: Option<i32>,
}

// GET /api/stock-records/report
#[utoipa::path(
    get,
    path = "/api/stock-records/report",
    tag = "Stock",
    params(StockReportQuery),
    responses(
        (status = 200, description = "Entradas, saídas e saldo por produto e mês", body = Vec<StockReportEntry>)
    ),
    security(("api_jwt" = []))
)]
pub async fn stock_report(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedUser(actor): AuthenticatedUser,
    Query(query): Query<StockReportQuery>,
) -> Result<impl IntoResponse, ApiError> {

    query.validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let year = query.year.unwrap_or_else(|| Utc::now().year());

    let report = app_state.stock_ledger
        .stock_report(&actor, year, query.month)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(report))
}
