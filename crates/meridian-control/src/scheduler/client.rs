//! HTTP client for the scheduler API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;

use crate::config::SchedulerConfig;
use crate::error::{EngineError, EngineResult};

use super::{ScheduleRequest, Scheduler};

/// Body for scale requests.
#[derive(Serialize)]
struct ScaleBody {
    release: i64,
    quantity: u32,
}

/// HTTP client for interacting with the scheduler service.
#[derive(Debug, Clone)]
pub struct SchedulerClient {
    client: Client,
    base_url: String,
}

impl SchedulerClient {
    /// Create a new scheduler client from configuration.
    pub fn new(config: &SchedulerConfig) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(EngineError::Http)?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_owned(),
        })
    }

    /// Create a new scheduler client with a custom base URL.
    pub fn with_url(url: impl Into<String>) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(EngineError::Http)?;

        Ok(Self {
            client,
            base_url: url.into().trim_end_matches('/').to_owned(),
        })
    }
}

#[async_trait]
impl Scheduler for SchedulerClient {
    async fn apply(&self, request: &ScheduleRequest) -> EngineResult<()> {
        let url = format!("{}/releases", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(EngineError::Http)?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNPROCESSABLE_ENTITY => {
                let body = response.text().await.unwrap_or_default();
                Err(EngineError::scheduler(format!(
                    "release rejected: {body}"
                )))
            }
            status => Err(EngineError::scheduler(format!(
                "failed to apply release: {status}"
            ))),
        }
    }

    async fn apply_scale(
        &self,
        app: &str,
        release: i64,
        process_type: &str,
        count: u32,
    ) -> EngineResult<()> {
        let url = format!(
            "{}/apps/{}/processes/{}/scale",
            self.base_url, app, process_type
        );
        let response = self
            .client
            .post(&url)
            .json(&ScaleBody {
                release,
                quantity: count,
            })
            .send()
            .await
            .map_err(EngineError::Http)?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(EngineError::scheduler(format!(
                "unknown process type: {process_type}"
            ))),
            status => Err(EngineError::scheduler(format!(
                "failed to apply scale: {status}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        let config = SchedulerConfig::default();
        let client = SchedulerClient::new(&config);
        assert!(client.is_ok());
    }

    #[test]
    fn client_with_url_trims_trailing_slash() {
        let client = SchedulerClient::with_url("http://localhost:8082/").unwrap();
        assert_eq!(client.base_url, "http://localhost:8082");
    }
}
