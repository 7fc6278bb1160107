use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{Config, Error as FailsafeError, StateMachine, backoff, failure_policy};
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{AppError, ErrorCode};

/// Gift voucher as reported by the discount service. Field names follow the
/// remote JSON wire format. Dates are RFC 3339 strings; parsing and window
/// validation belong to the ledger service, not the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gift {
    pub id: i64,
    pub code: String,
    pub gift_amount: i64,
    pub usage_limit: i64,
    pub used_count: i64,
    pub expiration_date: String,
    pub start_date_time: String,
}

/// Interface to the external gift/discount issuing service. `use_gift` marks
/// the code consumed remotely; there is no compensating call to undo it.
#[async_trait]
pub trait DiscountApi: Send + Sync {
    async fn get_gift_by_code(&self, code: &str) -> Result<Gift, AppError>;
    async fn use_gift(&self, code: &str) -> Result<Gift, AppError>;
}

/// Non-success responses carry a human-readable message we surface as a
/// validation error.
#[derive(Debug, Deserialize)]
struct RemoteFailure {
    message: String,
}

/// HTTP client for the discount service.
#[derive(Clone)]
pub struct DiscountClient {
    client: Client,
    base_url: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl DiscountClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(Duration::from_secs(60), Duration::from_secs(120));
        let policy = failure_policy::consecutive_failures(3, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        DiscountClient {
            client,
            base_url,
            circuit_breaker,
        }
    }

    async fn request_gift(&self, method: Method, url: String) -> Result<Gift, AppError> {
        let client = self.client.clone();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client.request(method, &url).send().await?;

                if response.status() == StatusCode::NOT_FOUND {
                    return Err(AppError::validation(
                        ErrorCode::GiftNotFound,
                        "gift not found",
                    ));
                }
                if !response.status().is_success() {
                    let failure = response.json::<RemoteFailure>().await?;
                    return Err(AppError::validation(
                        ErrorCode::DiscountClient,
                        failure.message,
                    ));
                }

                let gift = response.json::<Gift>().await?;
                Ok(gift)
            })
            .await;

        match result {
            Ok(gift) => Ok(gift),
            Err(FailsafeError::Rejected) => Err(AppError::DiscountUnavailable),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

#[async_trait]
impl DiscountApi for DiscountClient {
    async fn get_gift_by_code(&self, code: &str) -> Result<Gift, AppError> {
        let url = format!("{}/gift/{}", self.base_url.trim_end_matches('/'), code);
        self.request_gift(Method::GET, url).await
    }

    async fn use_gift(&self, code: &str) -> Result<Gift, AppError> {
        let url = format!("{}/gift/use/{}", self.base_url.trim_end_matches('/'), code);
        self.request_gift(Method::POST, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIFT_BODY: &str = r#"{
        "id": 7,
        "code": "WELCOME10",
        "giftAmount": 1000,
        "usageLimit": 5,
        "usedCount": 1,
        "expirationDate": "2030-01-01T00:00:00Z",
        "startDateTime": "2020-01-01T00:00:00Z",
        "createdAt": "2020-01-01T00:00:00Z",
        "updatedAt": "2020-01-01T00:00:00Z"
    }"#;

    #[test]
    fn test_client_creation() {
        let client = DiscountClient::new("http://localhost:9000".to_string(), Duration::from_secs(10));
        assert_eq!(client.base_url, "http://localhost:9000");
    }

    #[tokio::test]
    async fn test_get_gift_by_code() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/gift/WELCOME10")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(GIFT_BODY)
            .create_async()
            .await;

        let client = DiscountClient::new(server.url(), Duration::from_secs(10));
        let gift = client.get_gift_by_code("WELCOME10").await.unwrap();

        assert_eq!(gift.code, "WELCOME10");
        assert_eq!(gift.gift_amount, 1000);
        assert_eq!(gift.used_count, 1);
    }

    #[tokio::test]
    async fn test_get_gift_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/gift/MISSING")
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message": "no such gift"}"#)
            .create_async()
            .await;

        let client = DiscountClient::new(server.url(), Duration::from_secs(10));
        let result = client.get_gift_by_code("MISSING").await;

        match result {
            Err(AppError::Validation { code, .. }) => assert_eq!(code, ErrorCode::GiftNotFound),
            other => panic!("expected gift-not-found validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_remote_failure_message_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/gift/use/WELCOME10")
            .with_status(422)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message": "gift already consumed"}"#)
            .create_async()
            .await;

        let client = DiscountClient::new(server.url(), Duration::from_secs(10));
        let result = client.use_gift("WELCOME10").await;

        match result {
            Err(AppError::Validation { code, message }) => {
                assert_eq!(code, ErrorCode::DiscountClient);
                assert_eq!(message, "gift already consumed");
            }
            other => panic!("expected remote validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_use_gift_marks_code_consumed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/gift/use/WELCOME10")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(GIFT_BODY)
            .create_async()
            .await;

        let client = DiscountClient::new(server.url(), Duration::from_secs(10));
        let gift = client.use_gift("WELCOME10").await.unwrap();

        assert_eq!(gift.code, "WELCOME10");
    }

    #[tokio::test]
    #[ignore]
    async fn test_circuit_breaker_opens_after_failures() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Regex(r".*/gift/.*".into()))
            .with_status(500)
            .with_body(r#"{"message": "boom"}"#)
            .expect_at_least(3)
            .create_async()
            .await;

        let client = DiscountClient::new(server.url(), Duration::from_secs(1));
        for _ in 0..3 {
            let _ = client.get_gift_by_code("ANY").await;
        }

        let result = client.get_gift_by_code("ANY").await;
        assert!(matches!(result, Err(AppError::DiscountUnavailable)));
    }
}
