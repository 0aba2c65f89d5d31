//! HTTP client for the pizza factory.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::FactoryConfig;

use super::{FactoryClient, FactoryOrderRequest, FulfillmentOutcome};

/// Shape shared by the factory's success and failure bodies.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FactoryResponseBody {
    jwt: Option<String>,
    message: Option<String>,
    report_url: Option<String>,
}

/// Factory client that POSTs orders over HTTP with a bounded timeout.
pub struct HttpFactoryClient {
    client: reqwest::Client,
    order_url: String,
    api_key: String,
}

impl HttpFactoryClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("pizza-service/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            order_url: format!("{}/api/order", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
        })
    }

    pub fn from_config(config: &FactoryConfig) -> Result<Self> {
        Self::new(&config.url, &config.api_key, config.timeout())
    }

    pub fn order_url(&self) -> &str {
        &self.order_url
    }
}

#[async_trait]
impl FactoryClient for HttpFactoryClient {
    async fn submit_order(&self, request: &FactoryOrderRequest) -> FulfillmentOutcome {
        let request_body = serde_json::to_string(request).unwrap_or_default();

        let response = self
            .client
            .post(&self.order_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    method = "POST",
                    url = %self.order_url,
                    request_body = %request_body,
                    timed_out = e.is_timeout(),
                    error = %e,
                    "Factory request failed"
                );
                return FulfillmentOutcome::Failed {
                    status: None,
                    message: format!("factory unreachable: {}", e),
                    report_url: None,
                };
            }
        };

        let status = response.status();
        let response_body = response.text().await.unwrap_or_default();
        info!(
            method = "POST",
            url = %self.order_url,
            request_body = %request_body,
            response_body = %response_body,
            status = status.as_u16(),
            "Factory request"
        );

        let parsed: FactoryResponseBody = serde_json::from_str(&response_body).unwrap_or_default();

        match (status.is_success(), parsed.jwt) {
            (true, Some(jwt)) => FulfillmentOutcome::Fulfilled {
                jwt,
                report_url: parsed.report_url,
            },
            (true, None) => FulfillmentOutcome::Failed {
                status: Some(status.as_u16()),
                message: "factory response carried no tracking token".to_string(),
                report_url: parsed.report_url,
            },
            (false, _) => FulfillmentOutcome::Failed {
                status: Some(status.as_u16()),
                message: parsed
                    .message
                    .unwrap_or_else(|| format!("factory returned {}", status)),
                report_url: parsed.report_url,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_url_joins_base() {
        let client = HttpFactoryClient::new("https://factory.example.com/", "k", Duration::from_secs(1)).unwrap();
        assert_eq!(client.order_url(), "https://factory.example.com/api/order");

        let client = HttpFactoryClient::new("http://localhost:4000", "k", Duration::from_secs(1)).unwrap();
        assert_eq!(client.order_url(), "http://localhost:4000/api/order");
    }

    #[test]
    fn test_response_body_is_lenient() {
        let body: FactoryResponseBody =
            serde_json::from_str(r#"{"message":"no","reportUrl":"http://r/1","extra":1}"#).unwrap();
        assert_eq!(body.message.as_deref(), Some("no"));
        assert_eq!(body.report_url.as_deref(), Some("http://r/1"));
        assert!(body.jwt.is_none());
    }
}
