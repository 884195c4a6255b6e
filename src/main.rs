//src/main.rs

use anyhow::Context;
use axum::{
    routing::{get, patch, post},
    Router,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use pharmacy_backend::{config::AppState, docs::ApiDoc, handlers, services::scheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG controla o nível; padrão "info".
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    // Se a configuração falhar, a aplicação não deve iniciar.
    let app_state = AppState::new()
        .await
        .context("Falha ao inicializar o estado da aplicação.")?;

    // Faz o app rodar as migrações do SQLx na inicialização
    sqlx::migrate!()
        .run(&app_state.db_pool)
        .await
        .context("Falha ao rodar as migrações do banco de dados.")?;

    tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

    // Tarefas periódicas (pedidos expirados e confirmação automática)
    scheduler::spawn(app_state.order_service.clone());

    // Pedidos (cliente)
    let order_routes = Router::new()
        .route("/"
               ,post(handlers::orders::create_order)
               .get(handlers::orders::list_orders)
        )
        .route("/preview", get(handlers::orders::preview_order))
        .route("/{id}", get(handlers::orders::get_order))
        .route("/{id}/payment-proof", post(handlers::orders::upload_payment_proof))
        .route("/{id}/status", patch(handlers::orders::user_advance_order));

    // Pedidos (farmácia)
    let admin_order_routes = Router::new()
        .route("/{id}/status", patch(handlers::orders::admin_advance_order));

    let mutation_routes = Router::new()
        .route("/"
               ,post(handlers::stock::request_mutation)
               .get(handlers::stock::list_mutations)
        )
        .route("/{id}"
               ,get(handlers::stock::get_mutation)
               .patch(handlers::stock::decide_mutation)
        );

    let record_routes = Router::new()
        .route("/"
               ,post(handlers::stock::record_stock_change)
               .get(handlers::stock::list_stock_records)
        )
        .route("/report", get(handlers::stock::stock_report));

    // Combina tudo no router principal
    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/api/health", get(|| async { "OK" }))
        .nest("/api/orders", order_routes)
        .nest("/api/admin/orders", admin_order_routes)
        .nest("/api/stock-mutations", mutation_routes)
        .nest("/api/stock-records", record_routes)
        .route(
            "/api/pharmacy-products/{id}/available-pharmacies",
            get(handlers::stock::available_pharmacies),
        )
        .with_state(app_state.clone());

    // Inicia o servidor
    let listener = TcpListener::bind(&app_state.settings.bind_addr)
        .await
        .context("Falha ao iniciar o listener TCP")?;
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr()?);

    axum::serve(listener, app)
        .await
        .context("Erro no servidor Axum")?;

    Ok(())
}
