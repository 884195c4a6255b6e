// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- ORDERS ---
        handlers::orders::create_order,
        handlers::orders::preview_order,
        handlers::orders::list_orders,
        handlers::orders::get_order,
        handlers::orders::upload_payment_proof,
        handlers::orders::user_advance_order,
        handlers::orders::admin_advance_order,

        // --- STOCK ---
        handlers::stock::request_mutation,
        handlers::stock::list_mutations,
        handlers::stock::get_mutation,
        handlers::stock::decide_mutation,
        handlers::stock::available_pharmacies,
        handlers::stock::record_stock_change,
        handlers::stock::list_stock_records,
        handlers::stock::stock_report,
    ),
    components(
        schemas(
            // --- Orders ---
            models::order::OrderStatus,
            models::order::ProductOrder,
            models::order::OrderItem,
            models::order::OrderItemDetail,
            models::order::OrderDetail,
            models::order::ShippingChoice,
            models::order::NewOrderItem,
            models::order::CheckoutPreview,

            // --- Pharmacy ---
            models::pharmacy::Coordinate,
            models::pharmacy::Pharmacy,
            models::pharmacy::PharmacyProduct,

            // --- Stock ---
            models::stock::MutationStatus,
            models::stock::StockMutation,
            models::stock::StockMutationView,
            models::stock::StockRecord,
            models::stock::StockReportEntry,

            // --- Auth ---
            models::auth::Role,

            // --- Payloads ---
            handlers::orders::CreateOrderPayload,
            handlers::orders::AdvanceOrderPayload,
            handlers::stock::RequestMutationPayload,
            handlers::stock::DecideMutationPayload,
            handlers::stock::RecordStockPayload,
        )
    ),
    tags(
        (name = "Orders", description = "Checkout e ciclo de vida do pedido"),
        (name = "Stock", description = "Transferências entre farmácias e livro-razão de estoque")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(
                Http::new(HttpAuthScheme::Bearer)
            ),
        );
    }
}
