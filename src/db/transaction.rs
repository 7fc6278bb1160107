use sqlx::PgPool;

use crate::db::models::{NewTransaction, Transaction, TransactionType};
use crate::db::session::{Backend, Session, on_executor};
use crate::error::AppError;

/// Append-only store of money-movement entries. Entries are immutable once
/// inserted; deletion exists only for wallet teardown, never as a reversal.
#[derive(Clone)]
pub struct TransactionStore {
    backend: Backend,
}

impl TransactionStore {
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

    pub async fn insert(&self, entry: &NewTransaction) -> Result<Transaction, AppError> {
        on_executor!(&self.backend, ex => {
            sqlx::query_as::<_, Transaction>(
                "INSERT INTO transaction \
                     (wallet_id, amount, transaction_type, description, discount_code) \
                 VALUES ($1, $2, $3, $4, $5) \
                 RETURNING *",
            )
            .bind(entry.wallet_id)
            .bind(entry.amount)
            .bind(entry.transaction_type)
            .bind(&entry.description)
            .bind(&entry.discount_code)
            .fetch_one(ex)
            .await
        })
        .map_err(|e| AppError::db("Insert", "transaction", e))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Transaction, AppError> {
        on_executor!(&self.backend, ex => {
            sqlx::query_as::<_, Transaction>("SELECT * FROM transaction WHERE id = $1")
                .bind(id)
                .fetch_optional(ex)
                .await
        })
        .map_err(|e| AppError::db("GetByID", "transaction", e))?
        .ok_or(AppError::NotFound {
            entity: "transaction",
        })
    }

    pub async fn get_by_wallet_id(&self, wallet_id: i64) -> Result<Vec<Transaction>, AppError> {
        on_executor!(&self.backend, ex => {
            sqlx::query_as::<_, Transaction>(
                "SELECT * FROM transaction WHERE wallet_id = $1 ORDER BY created_at DESC",
            )
            .bind(wallet_id)
            .fetch_all(ex)
            .await
        })
        .map_err(|e| AppError::db("GetByWalletID", "transaction", e))
    }

    pub async fn get_by_wallet_id_paged(
        &self,
        wallet_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, AppError> {
        on_executor!(&self.backend, ex => {
            sqlx::query_as::<_, Transaction>(
                "SELECT * FROM transaction WHERE wallet_id = $1 \
                 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            )
            .bind(wallet_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(ex)
            .await
        })
        .map_err(|e| AppError::db("GetByWalletIDPaged", "transaction", e))
    }

    pub async fn get_by_wallet_id_and_type(
        &self,
        wallet_id: i64,
        transaction_type: TransactionType,
    ) -> Result<Vec<Transaction>, AppError> {
        on_executor!(&self.backend, ex => {
            sqlx::query_as::<_, Transaction>(
                "SELECT * FROM transaction WHERE wallet_id = $1 AND transaction_type = $2 \
                 ORDER BY created_at DESC",
            )
            .bind(wallet_id)
            .bind(transaction_type)
            .fetch_all(ex)
            .await
        })
        .map_err(|e| AppError::db("GetByWalletIDAndType", "transaction", e))
    }

    pub async fn get_by_wallet_id_and_discount_code(
        &self,
        wallet_id: i64,
        discount_code: &str,
    ) -> Result<Vec<Transaction>, AppError> {
        on_executor!(&self.backend, ex => {
            sqlx::query_as::<_, Transaction>(
                "SELECT * FROM transaction WHERE wallet_id = $1 AND discount_code = $2 \
                 ORDER BY created_at DESC",
            )
            .bind(wallet_id)
            .bind(discount_code)
            .fetch_all(ex)
            .await
        })
        .map_err(|e| AppError::db("GetByWalletIDAndDiscountCode", "transaction", e))
    }

    pub async fn get_by_wallet_id_and_type_and_discount_code(
        &self,
        wallet_id: i64,
        transaction_type: TransactionType,
        discount_code: &str,
    ) -> Result<Vec<Transaction>, AppError> {
        on_executor!(&self.backend, ex => {
            sqlx::query_as::<_, Transaction>(
                "SELECT * FROM transaction \
                 WHERE wallet_id = $1 AND transaction_type = $2 AND discount_code = $3 \
                 ORDER BY created_at DESC",
            )
            .bind(wallet_id)
            .bind(transaction_type)
            .bind(discount_code)
            .fetch_all(ex)
            .await
        })
        .map_err(|e| AppError::db("GetByWalletIDAndTypeAndDiscountCode", "transaction", e))
    }

    pub async fn get_by_discount_code_paged(
        &self,
        discount_code: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, AppError> {
        on_executor!(&self.backend, ex => {
            sqlx::query_as::<_, Transaction>(
                "SELECT * FROM transaction WHERE discount_code = $1 \
                 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            )
            .bind(discount_code)
            .bind(limit)
            .bind(offset)
            .fetch_all(ex)
            .await
        })
        .map_err(|e| AppError::db("GetByDiscountCodePaged", "transaction", e))
    }

    pub async fn delete_by_id(&self, id: i64) -> Result<(), AppError> {
        on_executor!(&self.backend, ex => {
            sqlx::query("DELETE FROM transaction WHERE id = $1")
                .bind(id)
                .execute(ex)
                .await
        })
        .map_err(|e| AppError::db("DeleteByID", "transaction", e))?;
        Ok(())
    }

    pub async fn delete_by_wallet_id(&self, wallet_id: i64) -> Result<(), AppError> {
        on_executor!(&self.backend, ex => {
            sqlx::query("DELETE FROM transaction WHERE wallet_id = $1")
                .bind(wallet_id)
                .execute(ex)
                .await
        })
        .map_err(|e| AppError::db("DeleteByWalletID", "transaction", e))?;
        Ok(())
    }

    pub async fn delete_by_wallet_id_and_type(
        &self,
        wallet_id: i64,
        transaction_type: TransactionType,
    ) -> Result<(), AppError> {
        on_executor!(&self.backend, ex => {
            sqlx::query("DELETE FROM transaction WHERE wallet_id = $1 AND transaction_type = $2")
                .bind(wallet_id)
                .bind(transaction_type)
                .execute(ex)
                .await
        })
        .map_err(|e| AppError::db("DeleteByWalletIDAndType", "transaction", e))?;
        Ok(())
    }

    pub async fn delete_by_wallet_id_and_discount_code(
        &self,
        wallet_id: i64,
        discount_code: &str,
    ) -> Result<(), AppError> {
        on_executor!(&self.backend, ex => {
            sqlx::query("DELETE FROM transaction WHERE wallet_id = $1 AND discount_code = $2")
                .bind(wallet_id)
                .bind(discount_code)
                .execute(ex)
                .await
        })
        .map_err(|e| AppError::db("DeleteByWalletIDAndDiscountCode", "transaction", e))?;
        Ok(())
    }

    /// Sum of all entry amounts for a wallet; 0 for an empty history.
    pub async fn balance(&self, wallet_id: i64) -> Result<i64, AppError> {
        on_executor!(&self.backend, ex => {
            sqlx::query_scalar::<_, i64>(
                "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM transaction WHERE wallet_id = $1",
            )
            .bind(wallet_id)
            .fetch_one(ex)
            .await
        })
        .map_err(|e| AppError::db("Balance", "transaction", e))
    }
}
