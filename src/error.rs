use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Machine-stable error codes surfaced to clients. The boundary layer keys
/// localization off these, so they must never change once published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Internal,
    NotFound,
    InvalidAmount,
    InvalidWalletId,
    NotEnoughBalance,
    DiscountCodeUsed,
    GiftNotFound,
    GiftUsageLimitReached,
    GiftExpired,
    GiftNotStarted,
    TransactionTypeNotWithdrawal,
    DiscountClient,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Internal => "INTERNAL",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InvalidAmount => "INVALID_AMOUNT",
            ErrorCode::InvalidWalletId => "INVALID_WALLET_ID",
            ErrorCode::NotEnoughBalance => "NOT_ENOUGH_BALANCE",
            ErrorCode::DiscountCodeUsed => "DISCOUNT_CODE_USED",
            ErrorCode::GiftNotFound => "GIFT_NOT_FOUND",
            ErrorCode::GiftUsageLimitReached => "GIFT_USAGE_LIMIT_REACHED",
            ErrorCode::GiftExpired => "GIFT_EXPIRED",
            ErrorCode::GiftNotStarted => "GIFT_NOT_STARTED",
            ErrorCode::TransactionTypeNotWithdrawal => "TRANSACTION_TYPE_NOT_WITHDRAWAL",
            ErrorCode::DiscountClient => "DISCOUNT_CLIENT",
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{entity}.{method}: {source}")]
    Database {
        method: &'static str,
        entity: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("{message}")]
    Validation { code: ErrorCode, message: String },

    #[error("discount service request failed: {0}")]
    DiscountTransport(#[from] reqwest::Error),

    #[error("discount service unavailable")]
    DiscountUnavailable,

    #[error("storage is already bound to a transaction")]
    AlreadyInTransaction,

    #[error("no active transaction to bind to")]
    NoTransaction,
}

impl AppError {
    /// Wrap a store failure with the failing method and entity. `RowNotFound`
    /// becomes the not-found kind, everything else stays internal.
    pub fn db(method: &'static str, entity: &'static str, source: sqlx::Error) -> Self {
        match source {
            sqlx::Error::RowNotFound => AppError::NotFound { entity },
            source => AppError::Database {
                method,
                entity,
                source,
            },
        }
    }

    pub fn validation(code: ErrorCode, message: impl Into<String>) -> Self {
        AppError::Validation {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Database { .. } => ErrorCode::Internal,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::Validation { code, .. } => *code,
            AppError::DiscountTransport(_) | AppError::DiscountUnavailable => {
                ErrorCode::DiscountClient
            }
            AppError::AlreadyInTransaction | AppError::NoTransaction => ErrorCode::Internal,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::DiscountTransport(_) | AppError::DiscountUnavailable => {
                StatusCode::BAD_GATEWAY
            }
            AppError::AlreadyInTransaction | AppError::NoTransaction => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }
        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code().as_str(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_status_code() {
        let error = AppError::validation(ErrorCode::NotEnoughBalance, "not enough balance");
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(error.code().as_str(), "NOT_ENOUGH_BALANCE");
    }

    #[test]
    fn test_not_found_error_status_code() {
        let error = AppError::NotFound { entity: "wallet" };
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(error.to_string(), "wallet not found");
    }

    #[test]
    fn test_database_error_status_code() {
        let error = AppError::db("Insert", "transaction", sqlx::Error::PoolTimedOut);
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.code(), ErrorCode::Internal);
    }

    #[test]
    fn test_row_not_found_becomes_not_found() {
        let error = AppError::db("GetByID", "wallet", sqlx::Error::RowNotFound);
        assert!(matches!(error, AppError::NotFound { entity: "wallet" }));
    }

    #[test]
    fn test_tx_binding_errors_are_internal() {
        assert_eq!(
            AppError::AlreadyInTransaction.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::NoTransaction.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_validation_error_response() {
        let error = AppError::validation(ErrorCode::GiftExpired, "gift expired");
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_discount_unavailable_response() {
        let error = AppError::DiscountUnavailable;
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
