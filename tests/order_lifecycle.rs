// tests/order_lifecycle.rs
//
// Cenários completos contra um Postgres com PostGIS.
// Rodar com: DATABASE_URL=postgres://... cargo test -- --ignored

use axum::http::StatusCode;
use chrono::Datelike;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use pharmacy_backend::{
    common::error::AppError,
    config::{AppState, Settings},
    models::{
        auth::{Actor, Role},
        order::{OrderFilter, OrderStatus, ShippingChoice},
        stock::MutationStatus,
    },
    services::scheduler,
};

// Ponto de entrega e farmácias ao redor (1 grau de latitude ~ 111 km)
const HOME: (f64, f64) = (-6.200, 106.800);
const NEAR: (f64, f64) = (-6.209, 106.800); // ~1 km
const FAR: (f64, f64) = (-6.227, 106.800); // ~3 km

struct Fixture {
    state: AppState,
    pool: PgPool,
    customer: Actor,
    admin_x: Actor,
    admin_w: Actor,
    product_id: Uuid,
    x: Uuid,
    w: Uuid,
    pharmacy_w: Uuid,
    address_id: Uuid,
}

fn settings() -> Settings {
    settings_with(&[])
}

fn settings_with(overrides: &[(&str, &str)]) -> Settings {
    let storage_dir = std::env::temp_dir()
        .join(format!("proofs-{}", Uuid::new_v4()))
        .to_string_lossy()
        .to_string();
    let overrides: Vec<(String, String)> = overrides
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    Settings::from_lookup(move |key: &str| {
        if let Some((_, value)) = overrides.iter().find(|(k, _)| k == key) {
            return Some(value.clone());
        }
        match key {
            "DATABASE_URL" => Some("postgres://unused".to_string()),
            "JWT_SECRET" => Some("segredo".to_string()),
            "PROOF_STORAGE_DIR" => Some(storage_dir.clone()),
            _ => None,
        }
    })
    .unwrap()
}

async fn insert_user(pool: &PgPool, role: &str) -> Uuid {
    sqlx::query_scalar("INSERT INTO users (email, role) VALUES ($1, $2) RETURNING id")
        .bind(format!("{}@example.com", Uuid::new_v4()))
        .bind(role)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn insert_pharmacy(pool: &PgPool, name: &str, admin_id: Uuid, (lat, lng): (f64, f64)) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO pharmacies (name, admin_id, location) \
         VALUES ($1, $2, ST_SetSRID(ST_MakePoint($3, $4), 4326)::geography) RETURNING id",
    )
    .bind(name)
    .bind(admin_id)
    .bind(lng)
    .bind(lat)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn insert_pharmacy_product(pool: &PgPool, pharmacy_id: Uuid, product_id: Uuid, stock: i32) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO pharmacy_products (pharmacy_id, product_id, stock, price) \
         VALUES ($1, $2, $3, 100) RETURNING id",
    )
    .bind(pharmacy_id)
    .bind(product_id)
    .bind(stock)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn add_to_cart(pool: &PgPool, user_id: Uuid, product_id: Uuid, quantity: i32) {
    sqlx::query("INSERT INTO cart_items (user_id, product_id, quantity) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(product_id)
        .bind(quantity)
        .execute(pool)
        .await
        .unwrap();
}

async fn stock_of(pool: &PgPool, pharmacy_product_id: Uuid) -> i32 {
    sqlx::query_scalar("SELECT stock FROM pharmacy_products WHERE id = $1")
        .bind(pharmacy_product_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Saldo líquido do livro-razão de um produto.
async fn ledger_net(pool: &PgPool, pharmacy_product_id: Uuid) -> i64 {
    sqlx::query_scalar(
        "SELECT COALESCE(SUM(CASE WHEN is_reduction THEN -quantity ELSE quantity END), 0)::BIGINT \
         FROM stock_records WHERE pharmacy_product_id = $1",
    )
    .bind(pharmacy_product_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

/// X (perto, estoque `x_stock`) e W (mais longe, estoque `w_stock`), com admins diferentes.
async fn fixture(pool: PgPool, x_stock: i32, w_stock: i32) -> Fixture {
    let customer_id = insert_user(&pool, "user").await;
    let admin_x_id = insert_user(&pool, "admin").await;
    let admin_w_id = insert_user(&pool, "admin").await;

    let product_id: Uuid = sqlx::query_scalar("INSERT INTO products (name) VALUES ('Paracetamol') RETURNING id")
        .fetch_one(&pool)
        .await
        .unwrap();

    let pharmacy_x = insert_pharmacy(&pool, "Farmácia X", admin_x_id, NEAR).await;
    let pharmacy_w = insert_pharmacy(&pool, "Farmácia W", admin_w_id, FAR).await;
    let x = insert_pharmacy_product(&pool, pharmacy_x, product_id, x_stock).await;
    let w = insert_pharmacy_product(&pool, pharmacy_w, product_id, w_stock).await;

    let address_id: Uuid = sqlx::query_scalar(
        "INSERT INTO addresses (user_id, label, location) \
         VALUES ($1, 'Casa', ST_SetSRID(ST_MakePoint($2, $3), 4326)::geography) RETURNING id",
    )
    .bind(customer_id)
    .bind(HOME.1)
    .bind(HOME.0)
    .fetch_one(&pool)
    .await
    .unwrap();

    Fixture {
        state: AppState::from_parts(pool.clone(), settings()),
        pool,
        customer: Actor { id: customer_id, role: Role::User },
        admin_x: Actor { id: admin_x_id, role: Role::Admin },
        admin_w: Actor { id: admin_w_id, role: Role::Admin },
        product_id,
        x,
        w,
        pharmacy_w,
        address_id,
    }
}

fn shipping() -> ShippingChoice {
    ShippingChoice {
        name: "JNE".into(),
        price: Decimal::new(9000, 2),
        eta: "2-3 dias".into(),
    }
}

/// Cria um pedido de `quantity` e envia o comprovante.
async fn paid_order(f: &Fixture, quantity: i32) -> Uuid {
    add_to_cart(&f.pool, f.customer.id, f.product_id, quantity).await;
    let order = f
        .state
        .order_service
        .create_order(&f.customer, f.address_id, &shipping(), "transfer")
        .await
        .unwrap();

    f.state
        .order_service
        .upload_payment_proof(&f.customer, order.id, b"comprovante")
        .await
        .unwrap();

    order.id
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "precisa de Postgres com PostGIS"]
async fn checkout_assigns_the_nearest_pharmacy_and_clears_the_cart(pool: PgPool) {
    let f = fixture(pool, 10, 10).await;
    add_to_cart(&f.pool, f.customer.id, f.product_id, 5).await;

    let order = f
        .state
        .order_service
        .create_order(&f.customer, f.address_id, &shipping(), "transfer")
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::WaitingForPayment);
    assert_eq!(order.item_order_qty, 1);
    // 5 x 100 + frete 90
    assert_eq!(order.total_payment, Decimal::new(59000, 2));

    let detail = f.state.order_service.order_detail(&f.customer, order.id).await.unwrap();
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].pharmacy_product_id, f.x);

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cart_items WHERE user_id = $1")
        .bind(f.customer.id)
        .fetch_one(&f.pool)
        .await
        .unwrap();
    assert_eq!(remaining, 0);

    // Checkout não mexe no estoque.
    assert_eq!(stock_of(&f.pool, f.x).await, 10);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "precisa de Postgres com PostGIS"]
async fn checkout_with_empty_cart_is_a_conflict(pool: PgPool) {
    let f = fixture(pool, 10, 10).await;

    let err = f
        .state
        .order_service
        .create_order(&f.customer, f.address_id, &shipping(), "transfer")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::StateConflict(_)));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "precisa de Postgres com PostGIS"]
async fn processing_sources_the_shortfall_and_cancel_reverses_it(pool: PgPool) {
    let f = fixture(pool, 5, 10).await;
    let order_id = paid_order(&f, 5).await;

    // Depois do checkout, X vende 2 por fora: fica com 3 para um item de 5.
    f.state
        .stock_ledger
        .record_stock_change(&f.admin_x, f.x, 2, true)
        .await
        .unwrap();
    assert_eq!(stock_of(&f.pool, f.x).await, 3);

    let processed = f
        .state
        .order_service
        .admin_advance_order(&f.admin_x, order_id, OrderStatus::Processed)
        .await
        .unwrap();
    assert_eq!(processed.status, OrderStatus::Processed);

    // W cedeu 2 para X; X baixou os 5 do pedido.
    assert_eq!(stock_of(&f.pool, f.x).await, 0);
    assert_eq!(stock_of(&f.pool, f.w).await, 8);

    let detail = f.state.order_service.order_detail(&f.admin_x, order_id).await.unwrap();
    assert_eq!(detail.stock_mutations.len(), 1);
    let transfer = &detail.stock_mutations[0];
    assert_eq!(transfer.from_pharmacy_product_id, f.w);
    assert_eq!(transfer.to_pharmacy_product_id, f.x);
    assert_eq!(transfer.quantity, 2);
    assert_eq!(transfer.status, MutationStatus::Accepted);
    assert_eq!(transfer.order_id, Some(order_id));

    // Processar de novo é conflito.
    let err = f
        .state
        .order_service
        .admin_advance_order(&f.admin_x, order_id, OrderStatus::Processed)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::StateConflict(_)));

    // Cancelar devolve tudo ao estado anterior ao processamento.
    let canceled = f
        .state
        .order_service
        .admin_advance_order(&f.admin_x, order_id, OrderStatus::Canceled)
        .await
        .unwrap();
    assert_eq!(canceled.status, OrderStatus::Canceled);
    assert_eq!(stock_of(&f.pool, f.x).await, 3);
    assert_eq!(stock_of(&f.pool, f.w).await, 10);

    let detail = f.state.order_service.order_detail(&f.customer, order_id).await.unwrap();
    assert_eq!(detail.stock_mutations.len(), 2);
    assert!(detail
        .stock_mutations
        .iter()
        .any(|m| m.from_pharmacy_product_id == f.x && m.to_pharmacy_product_id == f.w && m.quantity == 2));

    // O livro-razão bate com o estoque (contando o estoque inicial semeado sem registro).
    assert_eq!(ledger_net(&f.pool, f.x).await, 3 - 5);
    assert_eq!(ledger_net(&f.pool, f.w).await, 0);

    // X: -2 manual, +2 transferência, -5 pedido, +5 devolução, -2 reversão
    let records = f
        .state
        .stock_ledger
        .list_stock_records(&f.admin_x, Some(f.x), 50, 0)
        .await
        .unwrap();
    assert_eq!(records.len(), 5);
    assert!(records.iter().all(|r| r.pharmacy_product_id == f.x));

    let year = records[0].change_at.year();
    let report = f.state.stock_ledger.stock_report(&f.admin_x, year, None).await.unwrap();
    let (additions, deductions) = report
        .iter()
        .filter(|e| e.pharmacy_product_id == f.x)
        .fold((0, 0), |(a, d), e| (a + e.additions, d + e.deductions));
    assert_eq!((additions, deductions), (7, 9));
    assert!(report.iter().all(|e| e.pharmacy_product_id != f.w));

    let err = f
        .state
        .stock_ledger
        .stock_report(&f.admin_x, year, Some(13))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "precisa de Postgres com PostGIS"]
async fn unsourced_shortfall_cancels_the_order_without_touching_stock(pool: PgPool) {
    let f = fixture(pool, 5, 1).await;
    let order_id = paid_order(&f, 5).await;

    f.state
        .stock_ledger
        .record_stock_change(&f.admin_x, f.x, 2, true)
        .await
        .unwrap();

    let err = f
        .state
        .order_service
        .admin_advance_order(&f.admin_x, order_id, OrderStatus::Processed)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::StateConflict(_)));

    assert_eq!(stock_of(&f.pool, f.x).await, 3);
    assert_eq!(stock_of(&f.pool, f.w).await, 1);

    let detail = f.state.order_service.order_detail(&f.customer, order_id).await.unwrap();
    assert_eq!(detail.header.status, OrderStatus::Canceled);
    assert!(detail.stock_mutations.is_empty());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "precisa de Postgres com PostGIS"]
async fn only_the_fulfilling_admin_moves_the_order(pool: PgPool) {
    let f = fixture(pool, 10, 10).await;
    let order_id = paid_order(&f, 2).await;

    let err = f
        .state
        .order_service
        .admin_advance_order(&f.admin_w, order_id, OrderStatus::Processed)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    // O cliente não pode cancelar depois de pagar.
    let err = f
        .state
        .order_service
        .user_advance_order(&f.customer, order_id, OrderStatus::Canceled)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::StateConflict(_)));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "precisa de Postgres com PostGIS"]
async fn full_happy_path_ends_confirmed(pool: PgPool) {
    let f = fixture(pool, 10, 10).await;
    let order_id = paid_order(&f, 2).await;
    let orders = &f.state.order_service;

    orders.admin_advance_order(&f.admin_x, order_id, OrderStatus::Processed).await.unwrap();
    let sent = orders.admin_advance_order(&f.admin_x, order_id, OrderStatus::Sent).await.unwrap();
    assert!(sent.sent_at.is_some());

    let err = orders
        .admin_advance_order(&f.admin_x, order_id, OrderStatus::Canceled)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::StateConflict(_)));

    let confirmed = orders
        .user_advance_order(&f.customer, order_id, OrderStatus::OrderConfirmed)
        .await
        .unwrap();
    assert_eq!(confirmed.status, OrderStatus::OrderConfirmed);
    assert_eq!(stock_of(&f.pool, f.x).await, 8);

    let filter = OrderFilter { status: Some(OrderStatus::OrderConfirmed), limit: 20, offset: 0 };
    let mine = orders.list_orders(&f.customer, filter).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, order_id);

    // X atende o pedido; W não tem nenhum item dele.
    assert_eq!(orders.list_orders(&f.admin_x, filter).await.unwrap().len(), 1);
    assert!(orders.list_orders(&f.admin_w, filter).await.unwrap().is_empty());

    let pending = OrderFilter { status: Some(OrderStatus::WaitingForPayment), limit: 20, offset: 0 };
    assert!(orders.list_orders(&f.customer, pending).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "precisa de Postgres com PostGIS"]
async fn declined_mutation_leaves_stock_unchanged(pool: PgPool) {
    let f = fixture(pool, 3, 10).await;
    let mutations = &f.state.stock_mutation_service;

    let request = mutations.request_mutation(&f.admin_x, f.x, f.pharmacy_w, 2).await.unwrap();
    assert_eq!(request.status, MutationStatus::Pending);
    assert_eq!(request.order_id, None);

    // Só o dono da origem decide.
    let err = mutations.decide_mutation(&f.admin_x, request.id, true).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let declined = mutations.decide_mutation(&f.admin_w, request.id, false).await.unwrap();
    assert_eq!(declined.status, MutationStatus::Declined);
    assert_eq!(stock_of(&f.pool, f.x).await, 3);
    assert_eq!(stock_of(&f.pool, f.w).await, 10);

    let err = mutations.decide_mutation(&f.admin_w, request.id, true).await.unwrap_err();
    assert!(matches!(err, AppError::StateConflict(_)));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "precisa de Postgres com PostGIS"]
async fn accepted_mutation_conserves_stock(pool: PgPool) {
    let f = fixture(pool, 3, 10).await;
    let mutations = &f.state.stock_mutation_service;

    let request = mutations.request_mutation(&f.admin_x, f.x, f.pharmacy_w, 4).await.unwrap();
    let accepted = mutations.decide_mutation(&f.admin_w, request.id, true).await.unwrap();

    assert_eq!(accepted.status, MutationStatus::Accepted);
    assert_eq!(stock_of(&f.pool, f.x).await, 7);
    assert_eq!(stock_of(&f.pool, f.w).await, 6);
    assert_eq!(ledger_net(&f.pool, f.x).await, 4);
    assert_eq!(ledger_net(&f.pool, f.w).await, -4);

    let view = mutations.mutation_detail(&f.admin_w, request.id).await.unwrap();
    assert!(view.is_request);
    assert_eq!(view.from_pharmacy_name, "Farmácia W");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "precisa de Postgres com PostGIS"]
async fn accepting_without_stock_auto_declines(pool: PgPool) {
    let f = fixture(pool, 3, 10).await;
    let mutations = &f.state.stock_mutation_service;

    let request = mutations.request_mutation(&f.admin_x, f.x, f.pharmacy_w, 8).await.unwrap();
    // W vende 5 antes de decidir.
    f.state.stock_ledger.record_stock_change(&f.admin_w, f.w, 5, true).await.unwrap();

    let err = mutations.decide_mutation(&f.admin_w, request.id, true).await.unwrap_err();
    assert!(matches!(err, AppError::ResourceExhausted(_)));

    let view = mutations.mutation_detail(&f.admin_x, request.id).await.unwrap();
    assert_eq!(view.mutation.status, MutationStatus::Declined);
    assert_eq!(stock_of(&f.pool, f.w).await, 5);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "precisa de Postgres com PostGIS"]
async fn mutation_requests_are_validated(pool: PgPool) {
    let f = fixture(pool, 3, 10).await;
    let mutations = &f.state.stock_mutation_service;

    // Destino de outra farmácia
    let err = mutations.request_mutation(&f.admin_w, f.x, f.pharmacy_w, 1).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    // Origem sem estoque suficiente
    let err = mutations.request_mutation(&f.admin_x, f.x, f.pharmacy_w, 11).await.unwrap_err();
    assert!(matches!(err, AppError::ResourceExhausted(_)));

    // Quantidade zero
    let err = mutations.request_mutation(&f.admin_x, f.x, f.pharmacy_w, 0).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    let others = mutations.available_pharmacies(&f.admin_x, f.x).await.unwrap();
    assert_eq!(others.len(), 1);
    assert_eq!(others[0].id, f.pharmacy_w);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "precisa de Postgres com PostGIS"]
async fn scheduler_cancels_only_expired_unpaid_orders(pool: PgPool) {
    let f = fixture(pool, 10, 10).await;
    add_to_cart(&f.pool, f.customer.id, f.product_id, 1).await;
    let unpaid = f
        .state
        .order_service
        .create_order(&f.customer, f.address_id, &shipping(), "transfer")
        .await
        .unwrap();
    let paid = paid_order(&f, 1).await;

    // Roda a varredura como se fosse dois dias depois.
    let later = chrono::Utc::now() + chrono::TimeDelta::days(2);
    let canceled = scheduler::run_expiry_sweep(&f.state.order_service, later).await.unwrap();
    assert_eq!(canceled, 1);

    let unpaid = f.state.order_service.order_detail(&f.customer, unpaid.id).await.unwrap();
    let paid = f.state.order_service.order_detail(&f.customer, paid).await.unwrap();
    assert_eq!(unpaid.header.status, OrderStatus::Canceled);
    assert_eq!(paid.header.status, OrderStatus::WaitingForPaymentConfirmation);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "precisa de Postgres com PostGIS"]
async fn manual_reduction_cannot_go_negative(pool: PgPool) {
    let f = fixture(pool, 3, 10).await;

    let err = f
        .state
        .stock_ledger
        .record_stock_change(&f.admin_x, f.x, 4, true)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ResourceExhausted(_)));
    assert_eq!(stock_of(&f.pool, f.x).await, 3);

    let err = f
        .state
        .stock_ledger
        .record_stock_change(&f.admin_w, f.x, 1, false)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "precisa de Postgres com PostGIS"]
async fn preview_shows_the_allocation_without_consuming_the_cart(pool: PgPool) {
    let f = fixture(pool, 10, 10).await;
    add_to_cart(&f.pool, f.customer.id, f.product_id, 5).await;

    let preview = f.state.order_service.preview_order(&f.customer, f.address_id).await.unwrap();
    assert_eq!(preview.address_id, f.address_id);
    assert_eq!(preview.total, Decimal::new(500, 0));
    assert_eq!(preview.items.len(), 1);
    assert_eq!(preview.items[0].pharmacy_product_id, f.x);
    assert_eq!(preview.items[0].unit_price, Decimal::new(100, 0));

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cart_items WHERE user_id = $1")
        .bind(f.customer.id)
        .fetch_one(&f.pool)
        .await
        .unwrap();
    assert_eq!(remaining, 1);
    assert_eq!(stock_of(&f.pool, f.x).await, 10);

    // Endereço de outro usuário
    let err = f.state.order_service.preview_order(&f.admin_x, f.address_id).await.unwrap_err();
    assert!(matches!(err, AppError::ResourceNotFound(_)));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "precisa de Postgres com PostGIS"]
async fn concurrent_checkouts_of_the_same_cart_create_one_order(pool: PgPool) {
    let f = fixture(pool, 10, 10).await;
    add_to_cart(&f.pool, f.customer.id, f.product_id, 3).await;
    let orders = &f.state.order_service;

    let shipping_first = shipping();
    let shipping_second = shipping();
    let (first, second) = tokio::join!(
        orders.create_order(&f.customer, f.address_id, &shipping_first, "transfer"),
        orders.create_order(&f.customer, f.address_id, &shipping_second, "transfer"),
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(AppError::StateConflict(_)))));

    let created: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM product_orders WHERE user_id = $1")
        .bind(f.customer.id)
        .fetch_one(&f.pool)
        .await
        .unwrap();
    assert_eq!(created, 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "precisa de Postgres com PostGIS"]
async fn concurrent_processing_deducts_stock_once(pool: PgPool) {
    let f = fixture(pool, 10, 10).await;
    let order_id = paid_order(&f, 2).await;
    let orders = &f.state.order_service;

    let (first, second) = tokio::join!(
        orders.admin_advance_order(&f.admin_x, order_id, OrderStatus::Processed),
        orders.admin_advance_order(&f.admin_x, order_id, OrderStatus::Processed),
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(AppError::StateConflict(_)))));

    assert_eq!(stock_of(&f.pool, f.x).await, 8);
    assert_eq!(ledger_net(&f.pool, f.x).await, -2);
    assert_eq!(stock_of(&f.pool, f.w).await, 10);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "precisa de Postgres com PostGIS"]
async fn processing_racing_a_cancel_leaves_stock_untouched(pool: PgPool) {
    let f = fixture(pool, 3, 10).await;
    // X tem 3 para um pedido de 5: processar traz 2 de W.
    add_to_cart(&f.pool, f.customer.id, f.product_id, 3).await;
    let order = f
        .state
        .order_service
        .create_order(&f.customer, f.address_id, &shipping(), "transfer")
        .await
        .unwrap();
    f.state
        .order_service
        .upload_payment_proof(&f.customer, order.id, b"comprovante")
        .await
        .unwrap();
    sqlx::query("UPDATE order_items SET quantity = 5 WHERE order_id = $1")
        .bind(order.id)
        .execute(&f.pool)
        .await
        .unwrap();

    let orders = &f.state.order_service;
    let (processed, canceled) = tokio::join!(
        orders.admin_advance_order(&f.admin_x, order.id, OrderStatus::Processed),
        orders.admin_advance_order(&f.admin_x, order.id, OrderStatus::Canceled),
    );

    // Cancelar vale nos dois sentidos; processar só se vier antes.
    assert_eq!(canceled.unwrap().status, OrderStatus::Canceled);
    if let Err(err) = processed {
        assert!(matches!(err, AppError::StateConflict(_)));
    }

    assert_eq!(stock_of(&f.pool, f.x).await, 3);
    assert_eq!(stock_of(&f.pool, f.w).await, 10);
    assert_eq!(ledger_net(&f.pool, f.x).await, 0);
    assert_eq!(ledger_net(&f.pool, f.w).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "precisa de Postgres com PostGIS"]
async fn waiting_on_a_locked_order_times_out_as_a_retryable_conflict(pool: PgPool) {
    let f = fixture(pool, 10, 10).await;
    let order_id = paid_order(&f, 2).await;
    let impatient = AppState::from_parts(f.pool.clone(), settings_with(&[("LOCK_TIMEOUT_MS", "100")]));

    let mut holder = f.pool.begin().await.unwrap();
    sqlx::query("SELECT id FROM product_orders WHERE id = $1 FOR UPDATE")
        .bind(order_id)
        .execute(&mut *holder)
        .await
        .unwrap();

    let err = impatient
        .order_service
        .admin_advance_order(&f.admin_x, order_id, OrderStatus::Processed)
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.status(), StatusCode::CONFLICT);
    assert_eq!(stock_of(&f.pool, f.x).await, 10);

    holder.rollback().await.unwrap();

    let processed = impatient
        .order_service
        .admin_advance_order(&f.admin_x, order_id, OrderStatus::Processed)
        .await
        .unwrap();
    assert_eq!(processed.status, OrderStatus::Processed);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "precisa de Postgres com PostGIS"]
async fn expired_order_rejects_the_proof_before_storing_it(pool: PgPool) {
    let f = fixture(pool, 10, 10).await;
    add_to_cart(&f.pool, f.customer.id, f.product_id, 1).await;
    let order = f
        .state
        .order_service
        .create_order(&f.customer, f.address_id, &shipping(), "transfer")
        .await
        .unwrap();

    sqlx::query("UPDATE product_orders SET expired_at = now() - INTERVAL '1 minute' WHERE id = $1")
        .bind(order.id)
        .execute(&f.pool)
        .await
        .unwrap();

    let err = f
        .state
        .order_service
        .upload_payment_proof(&f.customer, order.id, b"comprovante")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::StateConflict(_)));

    let stored = std::fs::read_dir(&f.state.settings.proof_storage_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(stored, 0);
}
