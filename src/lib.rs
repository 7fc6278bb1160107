pub mod cache;
pub mod config;
pub mod db;
pub mod discount;
pub mod error;
pub mod handlers;
pub mod services;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use crate::services::ledger::LedgerService;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub ledger: LedgerService,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/wallets", post(handlers::wallet::create_wallet))
        .route("/wallets/transfer", post(handlers::wallet::transfer))
        .route("/wallets/gift", post(handlers::wallet::add_gift))
        .route("/wallets/discount/:code", get(handlers::wallet::get_wallets_by_discount_code))
        .route(
            "/wallets/:id",
            get(handlers::wallet::get_wallet).delete(handlers::wallet::delete_wallet),
        )
        .route("/wallets/:id/balance", get(handlers::wallet::get_wallet_balance))
        .route(
            "/wallets/:id/transactions",
            get(handlers::wallet::list_wallet_transactions),
        )
        .route("/wallets/:id/recharge", post(handlers::wallet::recharge))
        .route("/wallets/:id/withdraw", post(handlers::wallet::withdraw))
        .route("/transactions/:id", get(handlers::wallet::get_transaction))
        .route("/transactions/:id/refund", post(handlers::wallet::refund))
        .route(
            "/members/:member_id/wallets",
            get(handlers::wallet::get_member_wallets).delete(handlers::wallet::delete_member_wallets),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
