use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::AppState;
use crate::error::AppError;
use crate::services::ledger::DEFAULT_PAGE_LIMIT;

#[derive(Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_LIMIT)
    }

    fn offset(&self) -> i64 {
        self.offset.unwrap_or(0)
    }
}

#[derive(Deserialize)]
pub struct CreateWalletRequest {
    pub member_id: i64,
    pub wallet_name: String,
    #[serde(default)]
    pub balance: i64,
}

#[derive(Deserialize)]
pub struct AmountRequest {
    pub amount: i64,
}

#[derive(Deserialize)]
pub struct TransferRequest {
    pub from_wallet_id: i64,
    pub to_wallet_id: i64,
    pub amount: i64,
}

#[derive(Deserialize)]
pub struct AddGiftRequest {
    pub member_id: i64,
    pub wallet_id: i64,
    pub gift_code: String,
}

pub async fn create_wallet(
    State(state): State<AppState>,
    Json(req): Json<CreateWalletRequest>,
) -> Result<impl IntoResponse, AppError> {
    let wallet = state
        .ledger
        .create_wallet(req.member_id, &req.wallet_name, req.balance)
        .await?;
    Ok((StatusCode::CREATED, Json(wallet)))
}

pub async fn get_wallet(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.ledger.get_wallet(id).await?))
}

pub async fn delete_wallet(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    state.ledger.delete_wallet(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_member_wallets(
    State(state): State<AppState>,
    Path(member_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.ledger.get_wallets_by_member(member_id).await?))
}

pub async fn delete_member_wallets(
    State(state): State<AppState>,
    Path(member_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    state.ledger.delete_wallets_by_member(member_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn recharge(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<AmountRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.ledger.recharge(id, req.amount).await?))
}

pub async fn withdraw(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<AmountRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.ledger.withdraw(id, req.amount).await?))
}

pub async fn transfer(
    State(state): State<AppState>,
    Json(req): Json<TransferRequest>,
) -> Result<impl IntoResponse, AppError> {
    let source = state
        .ledger
        .transfer(req.from_wallet_id, req.to_wallet_id, req.amount)
        .await?;
    Ok(Json(source))
}

pub async fn refund(
    State(state): State<AppState>,
    Path(transaction_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.ledger.refund(transaction_id).await?))
}

pub async fn add_gift(
    State(state): State<AppState>,
    Json(req): Json<AddGiftRequest>,
) -> Result<impl IntoResponse, AppError> {
    let wallet = state
        .ledger
        .add_gift(req.member_id, req.wallet_id, &req.gift_code)
        .await?;
    Ok(Json(wallet))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.ledger.get_transaction(id).await?))
}

pub async fn list_wallet_transactions(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(page): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let transactions = state
        .ledger
        .get_wallet_transactions(id, page.limit(), page.offset())
        .await?;
    Ok(Json(transactions))
}

pub async fn get_wallet_balance(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let balance = state.ledger.get_wallet_balance(id).await?;
    Ok(Json(serde_json::json!({ "wallet_id": id, "balance": balance })))
}

pub async fn get_wallets_by_discount_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(page): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let wallets = state
        .ledger
        .get_wallets_by_discount_code(&code, page.limit(), page.offset())
        .await?;
    Ok(Json(wallets))
}
