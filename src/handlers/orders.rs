// src/handlers/orders.rs

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    handlers::page_bounds,
    middleware::{auth::AuthenticatedUser, i18n::Locale},
    models::order::{
        CheckoutPreview, OrderDetail, OrderFilter, OrderStatus, ProductOrder, ShippingChoice,
    },
};

fn validate_not_negative(val: &Decimal) -> Result<(), ValidationError> {
    if val.is_sign_negative() {
        let mut err = ValidationError::new("range");
        err.message = Some("O valor não pode ser negativo.".into());
        return Err(err);
    }
    Ok(())
}

// =============================================================================
//  1. CHECKOUT
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderPayload {
    pub address_id: Uuid,

    #[validate(length(min = 1, message = "required"))]
    #[schema(example = "JNE")]
    pub shipping_name: String,

    #[validate(custom(function = "validate_not_negative"))]
    #[schema(example = "9000.00")]
    pub shipping_price: Decimal,

    #[validate(length(min = 1, message = "required"))]
    #[schema(example = "2-3 dias")]
    pub shipping_eta: String,

    #[validate(length(min = 1, message = "required"))]
    #[schema(example = "Transferência Bancária")]
    pub payment_method: String,
}

// POST /api/orders
#[utoipa::path(
    post,
    path = "/api/orders",
    tag = "Orders",
    request_body = CreateOrderPayload,
    responses(
        (status = 201, description = "Pedido criado a partir dos itens marcados do carrinho", body = ProductOrder),
        (status = 409, description = "Carrinho vazio"),
        (status = 422, description = "Nenhuma farmácia próxima tem estoque")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_order(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedUser(actor): AuthenticatedUser,
    Json(payload): Json<CreateOrderPayload>,
) -> Result<impl IntoResponse, ApiError> {

    payload.validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let shipping = ShippingChoice {
        name: payload.shipping_name,
        price: payload.shipping_price,
        eta: payload.shipping_eta,
    };

    let order = app_state.order_service
        .create_order(&actor, payload.address_id, &shipping, &payload.payment_method)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(order)))
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct PreviewOrderQuery {
    /// Endereço de entrega usado para achar as farmácias próximas
    pub address_id: Uuid,
}

// GET /api/orders/preview
#[utoipa::path(
    get,
    path = "/api/orders/preview",
    tag = "Orders",
    params(PreviewOrderQuery),
    responses(
        (status = 200, description = "Farmácias que atenderiam o carrinho e o total sem frete", body = CheckoutPreview),
        (status = 404, description = "Endereço não encontrado"),
        (status = 409, description = "Carrinho vazio"),
        (status = 422, description = "Nenhuma farmácia próxima tem estoque")
    ),
    security(("api_jwt" = []))
)]
pub async fn preview_order(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedUser(actor): AuthenticatedUser,
    Query(query): Query<PreviewOrderQuery>,
) -> Result<impl IntoResponse, ApiError> {

    let preview = app_state.order_service
        .preview_order(&actor, query.address_id)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(preview))
}

// =============================================================================
//  2. CONSULTAS
// =============================================================================

#[derive(Debug, Deserialize, Validate, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListOrdersQuery {
    pub status: Option<OrderStatus>,

    #[validate(range(min = 1, max = 100))]
    pub limit: Option<i64>,

    #[validate(range(min = 0))]
    pub offset: Option<i64>,
}

// GET /api/orders
#[utoipa::path(
    get,
    path = "/api/orders",
    tag = "Orders",
    params(ListOrdersQuery),
    responses(
        (status = 200, description = "Pedidos do cliente, ou das farmácias do admin", body = Vec<ProductOrder>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_orders(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedUser(actor): AuthenticatedUser,
    Query(query): Query<ListOrdersQuery>,
) -> Result<impl IntoResponse, ApiError> {

    query.validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let (limit, offset) = page_bounds(query.limit, query.offset);
    let filter = OrderFilter { status: query.status, limit, offset };

    let orders = app_state.order_service
        .list_orders(&actor, filter)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(orders))
}

// GET /api/orders/{id}
#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    tag = "Orders",
    responses(
        (status = 200, description = "Pedido com itens e transferências de estoque", body = OrderDetail),
        (status = 404, description = "Pedido não encontrado")
    ),
    params(
        ("id" = Uuid, Path, description = "ID do Pedido")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_order(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {

    let detail = app_state.order_service
        .order_detail(&actor, order_id)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(detail))
}

// =============================================================================
//  3. PAGAMENTO E TRANSIÇÕES
// =============================================================================

// POST /api/orders/{id}/payment-proof
#[utoipa::path(
    post,
    path = "/api/orders/{id}/payment-proof",
    tag = "Orders",
    request_body(content = Vec<u8>, content_type = "application/octet-stream", description = "Imagem do comprovante"),
    responses(
        (status = 200, description = "Comprovante recebido, pedido aguardando confirmação", body = ProductOrder),
        (status = 409, description = "Pedido já pago ou prazo expirado")
    ),
    params(
        ("id" = Uuid, Path, description = "ID do Pedido")
    ),
    security(("api_jwt" = []))
)]
pub async fn upload_payment_proof(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(order_id): Path<Uuid>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {

    let order = app_state.order_service
        .upload_payment_proof(&actor, order_id, &body)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(order))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceOrderPayload {
    #[schema(example = "ORDER_CONFIRMED")]
    pub status: OrderStatus,
}

// PATCH /api/orders/{id}/status
#[utoipa::path(
    patch,
    path = "/api/orders/{id}/status",
    tag = "Orders",
    request_body = AdvanceOrderPayload,
    responses(
        (status = 200, description = "Pedido confirmado ou cancelado pelo cliente", body = ProductOrder),
        (status = 409, description = "Transição não permitida no status atual")
    ),
    params(
        ("id" = Uuid, Path, description = "ID do Pedido")
    ),
    security(("api_jwt" = []))
)]
pub async fn user_advance_order(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<AdvanceOrderPayload>,
) -> Result<impl IntoResponse, ApiError> {

    let order = app_state.order_service
        .user_advance_order(&actor, order_id, payload.status)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(order))
}

// PATCH /api/admin/orders/{id}/status
#[utoipa::path(
    patch,
    path = "/api/admin/orders/{id}/status",
    tag = "Orders",
    request_body = AdvanceOrderPayload,
    responses(
        (status = 200, description = "Pedido processado, enviado ou cancelado pela farmácia", body = ProductOrder),
        (status = 403, description = "Admin não atende este pedido"),
        (status = 409, description = "Transição não permitida ou estoque insuficiente (pedido cancelado)")
    ),
    params(
        ("id" = Uuid, Path, description = "ID do Pedido")
    ),
    security(("api_jwt" = []))
)]
pub async fn admin_advance_order(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedUser(actor): AuthenticatedUser,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<AdvanceOrderPayload>,
) -> Result<impl IntoResponse, ApiError> {

    let order = app_state.order_service
        .admin_advance_order(&actor, order_id, payload.status)
        .await
        .map_err(|app_err| app_err.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(Json(order))
}
