//! Supabase RPC counter for multi-instance deployments.
//!
//! Calls the `increment_ai_usage(p_user_id)` stored procedure, which bumps
//! the row for the user and the database's current date atomically and
//! returns the new count.

use super::{CounterError, UsageCounter};
use crate::config::SupabaseConfig;
use crate::http::create_client;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

pub struct SupabaseCounter {
    client: Client,
    rpc_url: String,
    service_key: String,
}

impl SupabaseCounter {
    pub fn new(base_url: &str, service_key: &str) -> Self {
        Self {
            client: create_client(),
            rpc_url: format!(
                "{}/rest/v1/rpc/increment_ai_usage",
                base_url.trim_end_matches('/')
            ),
            service_key: service_key.to_string(),
        }
    }

    pub fn from_config(config: &SupabaseConfig) -> Result<Self, CounterError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| CounterError::Remote("SUPABASE_URL not configured".to_string()))?;
        let key = config
            .service_key
            .as_deref()
            .or(config.anon_key.as_deref())
            .ok_or_else(|| CounterError::Remote("Supabase key not configured".to_string()))?;
        Ok(Self::new(url, key))
    }
}

#[async_trait]
impl UsageCounter for SupabaseCounter {
    /// The stored procedure keys on the database's own date, so `day` is
    /// not sent.
    async fn increment(&self, key: &str, _day: &str) -> Result<u32, CounterError> {
        let response = self
            .client
            .post(&self.rpc_url)
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
            .json(&serde_json::json!({ "p_user_id": key }))
            .send()
            .await
            .map_err(|e| CounterError::Remote(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CounterError::Remote(format!("{}: {}", status, body)));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| CounterError::Remote(format!("Invalid response: {}", e)))?;

        value
            .as_u64()
            .map(|n| n.min(u32::MAX as u64) as u32)
            .ok_or_else(|| CounterError::Remote(format!("Expected integer count, got {}", value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_count_from_rpc() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/rest/v1/rpc/increment_ai_usage")
            .match_header("apikey", "service-key")
            .match_body(mockito::Matcher::Json(serde_json::json!({"p_user_id": "user-42"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("7")
            .create_async()
            .await;

        let counter = SupabaseCounter::new(&server.url(), "service-key");
        let count = counter.increment("user-42", "2026-03-01").await.unwrap();

        mock.assert_async().await;
        assert_eq!(count, 7);
    }

    #[tokio::test]
    async fn rpc_failure_is_an_error() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/rest/v1/rpc/increment_ai_usage")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let counter = SupabaseCounter::new(&server.url(), "service-key");
        let result = counter.increment("user-42", "2026-03-01").await;

        mock.assert_async().await;
        assert!(matches!(result, Err(CounterError::Remote(_))));
    }

    #[tokio::test]
    async fn non_integer_payload_is_an_error() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/rest/v1/rpc/increment_ai_usage")
            .with_status(200)
            .with_body(r#"{"count": "seven"}"#)
            .create_async()
            .await;

        let counter = SupabaseCounter::new(&server.url(), "service-key");
        assert!(counter.increment("user-42", "2026-03-01").await.is_err());
    }

    #[test]
    fn from_config_requires_url() {
        let result = SupabaseCounter::from_config(&SupabaseConfig::default());
        assert!(result.is_err());
    }
}
