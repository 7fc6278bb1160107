use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::db::models::{NewWallet, Wallet};
use crate::db::session::{Backend, Session, on_executor};
use crate::error::AppError;

/// Postgres-backed wallet store. Pool-backed by default; [`bind`] derives a
/// transaction-scoped copy that runs against an open unit of work.
///
/// [`bind`]: WalletStore::bind
#[derive(Clone, Debug)]
pub struct WalletStore {
    backend: Backend,
}

impl WalletStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            backend: Backend::Pool(pool),
        }
    }

    pub fn bind(&self, session: &Session) -> Result<Self, AppError> {
        Ok(Self {
            backend: self.backend.bind(session)?,
        })
    }

    pub async fn create(&self, wallet: &NewWallet) -> Result<Wallet, AppError> {
        on_executor!(&self.backend, ex => {
            sqlx::query_as::<_, Wallet>(
                "INSERT INTO wallet (member_id, wallet_name, balance) VALUES ($1, $2, $3) \
                 RETURNING *",
            )
            .bind(wallet.member_id)
            .bind(&wallet.wallet_name)
            .bind(wallet.balance)
            .fetch_one(ex)
            .await
        })
        .map_err(|e| AppError::db("Create", "wallet", e))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Wallet, AppError> {
        on_executor!(&self.backend, ex => {
            sqlx::query_as::<_, Wallet>("SELECT * FROM wallet WHERE id = $1")
                .bind(id)
                .fetch_optional(ex)
                .await
        })
        .map_err(|e| AppError::db("GetByID", "wallet", e))?
        .ok_or(AppError::NotFound { entity: "wallet" })
    }

    /// Row-locked read. Only legal inside a unit of work; the lock is held
    /// until the transaction commits or rolls back, so a read-modify-write of
    /// the balance done under it cannot lose a concurrent update.
    pub async fn get_by_id_for_update(&self, id: i64) -> Result<Wallet, AppError> {
        if !self.backend.is_bound() {
            return Err(AppError::NoTransaction);
        }
        on_executor!(&self.backend, ex => {
            sqlx::query_as::<_, Wallet>("SELECT * FROM wallet WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(ex)
                .await
        })
        .map_err(|e| AppError::db("GetByIDForUpdate", "wallet", e))?
        .ok_or(AppError::NotFound { entity: "wallet" })
    }

    pub async fn get_by_member_id(&self, member_id: i64) -> Result<Vec<Wallet>, AppError> {
        on_executor!(&self.backend, ex => {
            sqlx::query_as::<_, Wallet>("SELECT * FROM wallet WHERE member_id = $1")
                .bind(member_id)
                .fetch_all(ex)
                .await
        })
        .map_err(|e| AppError::db("GetByMemberID", "wallet", e))
    }

    /// Unconditional overwrite of the cached balance. Returns the new
    /// `updated_at`; updating a missing wallet is a not-found error.
    pub async fn update_balance(&self, id: i64, balance: i64) -> Result<DateTime<Utc>, AppError> {
        on_executor!(&self.backend, ex => {
            sqlx::query_scalar::<_, DateTime<Utc>>(
                "UPDATE wallet SET balance = $1, updated_at = now() WHERE id = $2 \
                 RETURNING updated_at",
            )
            .bind(balance)
            .bind(id)
            .fetch_optional(ex)
            .await
        })
        .map_err(|e| AppError::db("UpdateBalance", "wallet", e))?
        .ok_or(AppError::NotFound { entity: "wallet" })
    }

    pub async fn delete(&self, id: i64) -> Result<(), AppError> {
        let result = on_executor!(&self.backend, ex => {
            sqlx::query("DELETE FROM wallet WHERE id = $1")
                .bind(id)
                .execute(ex)
                .await
        })
        .map_err(|e| AppError::db("Delete", "wallet", e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound { entity: "wallet" });
        }
        Ok(())
    }

    pub async fn delete_by_member_id(&self, member_id: i64) -> Result<(), AppError> {
        let result = on_executor!(&self.backend, ex => {
            sqlx::query("DELETE FROM wallet WHERE member_id = $1")
                .bind(member_id)
                .execute(ex)
                .await
        })
        .map_err(|e| AppError::db("DeleteByMemberID", "wallet", e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound { entity: "wallet" });
        }
        Ok(())
    }
}
