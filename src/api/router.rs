use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers::{
    AppState, create_loan, get_loan_by_id, mark_loan_lost, renew_loan, return_loan,
};
use super::inventory_handlers::{
    InventoryState, add_edition_copy, borrow_copy, get_book, get_copy, get_edition,
    list_edition_copies, mark_copy_lost, return_copy,
};

/// 貸出サービスのエンドポイント
///
/// - POST /loans - 貸出を作成
/// - GET /loans/:id - 貸出詳細
/// - POST /loans/:id/renew - 延長
/// - POST /loans/:id/return - 返却
/// - POST /loans/:id/lost - 紛失
fn loan_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/loans", post(create_loan))
        .route("/loans/:id", get(get_loan_by_id))
        .route("/loans/:id/renew", post(renew_loan))
        .route("/loans/:id/return", post(return_loan))
        .route("/loans/:id/lost", post(mark_loan_lost))
        .with_state(state)
}

/// 在庫サービスのエンドポイント
fn inventory_routes(state: Arc<InventoryState>) -> Router {
    Router::new()
        .route("/copies/:id", get(get_copy))
        .route("/copies/:id/borrow", post(borrow_copy))
        .route("/copies/:id/return", post(return_copy))
        .route("/copies/:id/mark-lost", post(mark_copy_lost))
        .route("/editions/:id", get(get_edition))
        .route(
            "/editions/:id/copies",
            get(list_edition_copies).post(add_edition_copy),
        )
        .route("/books/:id", get(get_book))
        .with_state(state)
}

/// 貸出サービス単体のルーター
pub fn create_loan_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(loan_routes(state))
        .layer(TraceLayer::new_for_http())
}

/// 在庫サービス単体のルーター
pub fn create_inventory_router(state: Arc<InventoryState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(inventory_routes(state))
        .layer(TraceLayer::new_for_http())
}

/// 貸出と在庫を1つのプロセスで提供するルーター
pub fn create_router(loans: Arc<AppState>, inventory: Arc<InventoryState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(loan_routes(loans))
        .merge(inventory_routes(inventory))
        .layer(TraceLayer::new_for_http())
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
