//! Ledger service: every money movement flows through here.
//!
//! The one rule this module exists to uphold: a wallet's balance always
//! equals the sum of its transaction amounts. Every balance change pairs a
//! transaction insert with a balance overwrite inside one unit of work, with
//! the wallet row locked for the duration, so concurrent movements against
//! the same wallet serialize instead of losing updates.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::cache::{CACHE_TTL, Cache};
use crate::db::models::{NewTransaction, NewWallet, Transaction, TransactionType, Wallet};
use crate::db::session::within_transaction;
use crate::db::transaction::TransactionStore;
use crate::db::wallet::WalletStore;
use crate::discount::{DiscountApi, Gift};
use crate::error::{AppError, ErrorCode};

/// Page size the handler layer uses by default; only this page of the
/// wallets-by-discount-code lookup is memoized so eviction can target an
/// exact key.
pub const DEFAULT_PAGE_LIMIT: i64 = 20;

#[derive(Clone)]
pub struct LedgerService {
    pool: PgPool,
    wallets: WalletStore,
    transactions: TransactionStore,
    discount: Arc<dyn DiscountApi>,
    cache: Cache,
}

impl LedgerService {
    pub fn new(pool: PgPool, discount: Arc<dyn DiscountApi>, cache: Cache) -> Self {
        Self {
            wallets: WalletStore::new(pool.clone()),
            transactions: TransactionStore::new(pool.clone()),
            pool,
            discount,
            cache,
        }
    }

    /// Create a wallet. A non-zero opening balance is recorded as an opening
    /// recharge entry in the same unit of work, so the balance invariant
    /// holds from the first row.
    pub async fn create_wallet(
        &self,
        member_id: i64,
        wallet_name: &str,
        balance: i64,
    ) -> Result<Wallet, AppError> {
        if balance < 0 {
            return Err(AppError::validation(
                ErrorCode::InvalidAmount,
                "opening balance cannot be negative",
            ));
        }

        let wallet = within_transaction(&self.pool, |session| async move {
            let wallets = self.wallets.bind(&session)?;
            let mut wallet = wallets
                .create(&NewWallet {
                    member_id,
                    wallet_name: wallet_name.to_string(),
                    balance: 0,
                })
                .await?;

            if balance > 0 {
                let transactions = self.transactions.bind(&session)?;
                transactions
                    .insert(&NewTransaction {
                        wallet_id: wallet.id,
                        amount: balance,
                        transaction_type: TransactionType::Recharge,
                        description: "opening balance".to_string(),
                        discount_code: String::new(),
                    })
                    .await?;
                wallet.updated_at = wallets.update_balance(wallet.id, balance).await?;
                wallet.balance = balance;
            }
            Ok(wallet)
        })
        .await?;

        tracing::info!(wallet_id = wallet.id, member_id, "wallet created");
        Ok(wallet)
    }

    pub async fn get_wallet(&self, id: i64) -> Result<Wallet, AppError> {
        let key = Cache::wallet_key(id);
        if let Some(wallet) = self.cache.get_json::<Wallet>(&key).await {
            return Ok(wallet);
        }
        let wallet = self.wallets.get_by_id(id).await?;
        self.cache.set_json(&key, &wallet, CACHE_TTL).await;
        Ok(wallet)
    }

    pub async fn get_wallets_by_member(&self, member_id: i64) -> Result<Vec<Wallet>, AppError> {
        self.wallets.get_by_member_id(member_id).await
    }

    /// The single chokepoint for balance changes outside of transfers: lock
    /// the wallet row, insert the entry, overwrite the balance, all in one
    /// unit of work.
    pub async fn create_transaction_and_update_balance(
        &self,
        wallet_id: i64,
        amount: i64,
        transaction_type: TransactionType,
        description: &str,
        discount_code: &str,
    ) -> Result<Wallet, AppError> {
        let wallet = within_transaction(&self.pool, |session| async move {
            let wallets = self.wallets.bind(&session)?;
            let transactions = self.transactions.bind(&session)?;
            apply_movement(
                &wallets,
                &transactions,
                wallet_id,
                amount,
                transaction_type,
                description,
                discount_code,
            )
            .await
        })
        .await?;

        self.cache.delete(&[Cache::wallet_key(wallet_id)]).await;
        Ok(wallet)
    }

    pub async fn recharge(&self, wallet_id: i64, amount: i64) -> Result<Wallet, AppError> {
        if amount <= 0 {
            return Err(AppError::validation(
                ErrorCode::InvalidAmount,
                "recharge amount must be positive",
            ));
        }
        self.create_transaction_and_update_balance(
            wallet_id,
            amount,
            TransactionType::Recharge,
            "recharge transaction",
            "",
        )
        .await
    }

    pub async fn withdraw(&self, wallet_id: i64, amount: i64) -> Result<Wallet, AppError> {
        if amount <= 0 {
            return Err(AppError::validation(
                ErrorCode::InvalidAmount,
                "withdraw amount must be positive",
            ));
        }
        let wallet = self.wallets.get_by_id(wallet_id).await?;
        if wallet.balance < amount {
            return Err(AppError::validation(
                ErrorCode::NotEnoughBalance,
                "not enough balance",
            ));
        }
        self.create_transaction_and_update_balance(
            wallet_id,
            -amount,
            TransactionType::Withdraw,
            "withdraw transaction",
            "",
        )
        .await
    }

    /// Reverse a withdrawal by crediting its magnitude back as a refund
    /// entry. Only withdrawals are refundable.
    pub async fn refund(&self, transaction_id: i64) -> Result<Wallet, AppError> {
        let entry = self.transactions.get_by_id(transaction_id).await?;
        if entry.transaction_type != TransactionType::Withdraw {
            return Err(AppError::validation(
                ErrorCode::TransactionTypeNotWithdrawal,
                "transaction type is not withdraw",
            ));
        }
        // withdrawals are stored with a negative amount
        self.create_transaction_and_update_balance(
            entry.wallet_id,
            -entry.amount,
            TransactionType::Refund,
            "refund transaction",
            "",
        )
        .await
    }

    /// Move `amount` between two wallets as a debit and a credit entry in
    /// one unit of work. Rows are locked in ascending id order so two
    /// opposite transfers cannot deadlock on each other. Returns the updated
    /// source wallet.
    pub async fn transfer(&self, from_id: i64, to_id: i64, amount: i64) -> Result<Wallet, AppError> {
        if amount <= 0 {
            return Err(AppError::validation(
                ErrorCode::InvalidAmount,
                "transfer amount must be positive",
            ));
        }
        if from_id == to_id {
            return Err(AppError::validation(
                ErrorCode::InvalidWalletId,
                "source and destination wallets must differ",
            ));
        }

        let source = self.wallets.get_by_id(from_id).await?;
        if source.balance < amount {
            return Err(AppError::validation(
                ErrorCode::NotEnoughBalance,
                "not enough balance",
            ));
        }
        self.wallets.get_by_id(to_id).await?;

        let wallet = within_transaction(&self.pool, |session| async move {
            let wallets = self.wallets.bind(&session)?;
            let transactions = self.transactions.bind(&session)?;

            let (first, second) = if from_id < to_id {
                (from_id, to_id)
            } else {
                (to_id, from_id)
            };
            let first_wallet = wallets.get_by_id_for_update(first).await?;
            let second_wallet = wallets.get_by_id_for_update(second).await?;
            let (mut source, destination) = if first == from_id {
                (first_wallet, second_wallet)
            } else {
                (second_wallet, first_wallet)
            };

            if source.balance < amount {
                return Err(AppError::validation(
                    ErrorCode::NotEnoughBalance,
                    "not enough balance",
                ));
            }

            transactions
                .insert(&NewTransaction {
                    wallet_id: from_id,
                    amount: -amount,
                    transaction_type: TransactionType::Transfer,
                    description: "transfer transaction".to_string(),
                    discount_code: String::new(),
                })
                .await?;
            transactions
                .insert(&NewTransaction {
                    wallet_id: to_id,
                    amount,
                    transaction_type: TransactionType::Transfer,
                    description: "transfer transaction".to_string(),
                    discount_code: String::new(),
                })
                .await?;

            source.updated_at = wallets.update_balance(from_id, source.balance - amount).await?;
            source.balance -= amount;
            wallets
                .update_balance(to_id, destination.balance + amount)
                .await?;
            Ok(source)
        })
        .await?;

        self.cache
            .delete(&[Cache::wallet_key(from_id), Cache::wallet_key(to_id)])
            .await;
        Ok(wallet)
    }

    /// Redeem a gift code into a wallet. A code can be consumed by a member
    /// at most once across all of that member's wallets.
    pub async fn add_gift(
        &self,
        member_id: i64,
        wallet_id: i64,
        gift_code: &str,
    ) -> Result<Wallet, AppError> {
        let gift = self.discount.get_gift_by_code(gift_code).await?;
        validate_gift(&gift, Utc::now())?;

        let wallets = self.wallets.get_by_member_id(member_id).await?;
        for wallet in &wallets {
            let used = self
                .transactions
                .get_by_wallet_id_and_discount_code(wallet.id, gift_code)
                .await?;
            if !used.is_empty() {
                return Err(AppError::validation(
                    ErrorCode::DiscountCodeUsed,
                    "discount code has been used",
                ));
            }
        }

        // The remote side marks the code consumed here; there is no
        // compensating call, so a failure in the local credit below leaves
        // the code used with no credit recorded.
        let gift = self.discount.use_gift(gift_code).await?;

        self.cache.delete(&[Cache::discount_key(gift_code)]).await;

        let wallet = self
            .create_transaction_and_update_balance(
                wallet_id,
                gift.gift_amount,
                TransactionType::Gift,
                "add gift transaction",
                &gift.code,
            )
            .await?;
        tracing::info!(wallet_id, member_id, code = %gift.code, "gift redeemed");
        Ok(wallet)
    }

    /// Delete a wallet together with its whole transaction history.
    pub async fn delete_wallet(&self, id: i64) -> Result<(), AppError> {
        within_transaction(&self.pool, |session| async move {
            let wallets = self.wallets.bind(&session)?;
            let transactions = self.transactions.bind(&session)?;
            transactions.delete_by_wallet_id(id).await?;
            wallets.delete(id).await?;
            Ok(())
        })
        .await?;

        self.cache.delete(&[Cache::wallet_key(id)]).await;
        Ok(())
    }

    /// Delete every wallet a member owns, histories included. Deleting a
    /// member with no wallets is a no-op, not an error.
    pub async fn delete_wallets_by_member(&self, member_id: i64) -> Result<(), AppError> {
        let keys = within_transaction(&self.pool, |session| async move {
            let wallets = self.wallets.bind(&session)?;
            let transactions = self.transactions.bind(&session)?;
            let owned = wallets.get_by_member_id(member_id).await?;
            for wallet in &owned {
                transactions.delete_by_wallet_id(wallet.id).await?;
                wallets.delete(wallet.id).await?;
            }
            Ok(owned.iter().map(|w| Cache::wallet_key(w.id)).collect::<Vec<_>>())
        })
        .await?;

        self.cache.delete(&keys).await;
        Ok(())
    }

    /// Wallets holding a transaction tagged with the given discount code,
    /// newest redemption first. The default first page is memoized.
    pub async fn get_wallets_by_discount_code(
        &self,
        code: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Wallet>, AppError> {
        let cacheable = offset == 0 && limit == DEFAULT_PAGE_LIMIT;
        let key = Cache::discount_key(code);
        if cacheable {
            if let Some(wallets) = self.cache.get_json::<Vec<Wallet>>(&key).await {
                return Ok(wallets);
            }
        }

        let entries = self
            .transactions
            .get_by_discount_code_paged(code, limit, offset)
            .await?;
        let mut wallets = Vec::with_capacity(entries.len());
        for entry in entries {
            wallets.push(self.wallets.get_by_id(entry.wallet_id).await?);
        }

        if cacheable {
            self.cache.set_json(&key, &wallets, CACHE_TTL).await;
        }
        Ok(wallets)
    }

    pub async fn get_transaction(&self, id: i64) -> Result<Transaction, AppError> {
        self.transactions.get_by_id(id).await
    }

    pub async fn get_wallet_transactions(
        &self,
        wallet_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, AppError> {
        self.transactions
            .get_by_wallet_id_paged(wallet_id, limit, offset)
            .await
    }

    /// Balance recomputed from the transaction history; diverging from the
    /// wallet row's cached balance indicates a consistency bug.
    pub async fn get_wallet_balance(&self, wallet_id: i64) -> Result<i64, AppError> {
        self.transactions.balance(wallet_id).await
    }
}

/// Lock the wallet row, append the entry, overwrite the balance. Debits that
/// would take the balance negative are rejected here, under the lock, which
/// is what makes concurrent debits safe.
async fn apply_movement(
    wallets: &WalletStore,
    transactions: &TransactionStore,
    wallet_id: i64,
    amount: i64,
    transaction_type: TransactionType,
    description: &str,
    discount_code: &str,
) -> Result<Wallet, AppError> {
    let mut wallet = wallets.get_by_id_for_update(wallet_id).await?;
    let new_balance = wallet.balance + amount;
    if new_balance < 0 {
        return Err(AppError::validation(
            ErrorCode::NotEnoughBalance,
            "not enough balance",
        ));
    }

    transactions
        .insert(&NewTransaction {
            wallet_id,
            amount,
            transaction_type,
            description: description.to_string(),
            discount_code: discount_code.to_string(),
        })
        .await?;

    wallet.updated_at = wallets.update_balance(wallet_id, new_balance).await?;
    wallet.balance = new_balance;
    Ok(wallet)
}

/// Window and usage checks against a fetched gift. Pure so the edge cases
/// stay unit-testable.
fn validate_gift(gift: &Gift, now: DateTime<Utc>) -> Result<(), AppError> {
    if gift.used_count >= gift.usage_limit {
        return Err(AppError::validation(
            ErrorCode::GiftUsageLimitReached,
            "gift usage limit reached",
        ));
    }

    let expiration = DateTime::parse_from_rfc3339(&gift.expiration_date)
        .map_err(|e| {
            AppError::validation(
                ErrorCode::DiscountClient,
                format!("gift has a malformed expiration date: {e}"),
            )
        })?
        .with_timezone(&Utc);
    let start = DateTime::parse_from_rfc3339(&gift.start_date_time)
        .map_err(|e| {
            AppError::validation(
                ErrorCode::DiscountClient,
                format!("gift has a malformed start date: {e}"),
            )
        })?
        .with_timezone(&Utc);

    if expiration < now {
        return Err(AppError::validation(ErrorCode::GiftExpired, "gift expired"));
    }
    if start > now {
        return Err(AppError::validation(
            ErrorCode::GiftNotStarted,
            "gift not started",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gift(used_count: i64, start: &str, expiration: &str) -> Gift {
        Gift {
            id: 1,
            code: "WELCOME10".to_string(),
            gift_amount: 1000,
            usage_limit: 3,
            used_count,
            expiration_date: expiration.to_string(),
            start_date_time: start.to_string(),
        }
    }

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_valid_gift_passes() {
        let g = gift(1, "2024-01-01T00:00:00Z", "2030-01-01T00:00:00Z");
        assert!(validate_gift(&g, at("2025-06-01T00:00:00Z")).is_ok());
    }

    #[test]
    fn test_usage_limit_reached() {
        let g = gift(3, "2024-01-01T00:00:00Z", "2030-01-01T00:00:00Z");
        let err = validate_gift(&g, at("2025-06-01T00:00:00Z")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::GiftUsageLimitReached);
    }

    #[test]
    fn test_expired_gift() {
        let g = gift(0, "2024-01-01T00:00:00Z", "2025-01-01T00:00:00Z");
        let err = validate_gift(&g, at("2025-06-01T00:00:00Z")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::GiftExpired);
    }

    #[test]
    fn test_not_started_gift() {
        let g = gift(0, "2026-01-01T00:00:00Z", "2030-01-01T00:00:00Z");
        let err = validate_gift(&g, at("2025-06-01T00:00:00Z")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::GiftNotStarted);
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let g = gift(0, "2024-01-01T00:00:00Z", "2025-06-01T00:00:00Z");
        // exactly at expiry the gift is still redeemable
        assert!(validate_gift(&g, at("2025-06-01T00:00:00Z")).is_ok());
    }

    #[test]
    fn test_malformed_dates_are_client_errors() {
        let g = gift(0, "not-a-date", "2030-01-01T00:00:00Z");
        let err = validate_gift(&g, at("2025-06-01T00:00:00Z")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DiscountClient);

        let g = gift(0, "2024-01-01T00:00:00Z", "never");
        let err = validate_gift(&g, at("2025-06-01T00:00:00Z")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DiscountClient);
    }
}
