use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Money-movement kinds. Closed set; the `payment` kind is recorded by
/// external settlement flows and never created by the ledger service itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Recharge,
    Gift,
    Withdraw,
    Payment,
    Refund,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Recharge => "recharge",
            TransactionType::Gift => "gift",
            TransactionType::Withdraw => "withdraw",
            TransactionType::Payment => "payment",
            TransactionType::Refund => "refund",
            TransactionType::Transfer => "transfer",
        }
    }
}

/// Balance-holding account owned by a member. `balance` is denominated in the
/// smallest currency unit and must always equal the sum of the wallet's
/// transaction amounts.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Wallet {
    pub id: i64,
    pub member_id: i64,
    pub wallet_name: String,
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable signed monetary event against a wallet. Positive amounts credit,
/// negative amounts debit. An empty `discount_code` means the entry is not
/// gift-related.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub wallet_id: i64,
    pub amount: i64,
    pub transaction_type: TransactionType,
    pub description: String,
    pub discount_code: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload; id and created_at are store-assigned.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub wallet_id: i64,
    pub amount: i64,
    pub transaction_type: TransactionType,
    pub description: String,
    pub discount_code: String,
}

#[derive(Debug, Clone)]
pub struct NewWallet {
    pub member_id: i64,
    pub wallet_name: String,
    pub balance: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_type_serializes_lowercase() {
        let json = serde_json::to_string(&TransactionType::Withdraw).unwrap();
        assert_eq!(json, "\"withdraw\"");

        let parsed: TransactionType = serde_json::from_str("\"transfer\"").unwrap();
        assert_eq!(parsed, TransactionType::Transfer);
    }

    #[test]
    fn test_transaction_type_as_str_round_trips() {
        for kind in [
            TransactionType::Recharge,
            TransactionType::Gift,
            TransactionType::Withdraw,
            TransactionType::Payment,
            TransactionType::Refund,
            TransactionType::Transfer,
        ] {
            let parsed: TransactionType =
                serde_json::from_str(&format!("\"{}\"", kind.as_str())).unwrap();
            assert_eq!(parsed, kind);
        }
    }
}
