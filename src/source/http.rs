//! HTTP task source backed by the task service's query endpoint.

use super::{parse_task_list, SourceError, TaskRecord, TaskSource};
use crate::config::SourceConfig;
use reqwest::Client;
use serde_json::Value;
use tracing::{error, info};

pub struct HttpTaskSource {
    client: Client,
    url: String,
}

impl HttpTaskSource {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(SourceError::Client)?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl TaskSource for HttpTaskSource {
    async fn fetch(&self) -> Result<Vec<TaskRecord>, SourceError> {
        info!(url = %self.url, "Fetching task list");

        let request_error = |source| SourceError::Request {
            url: self.url.clone(),
            source,
        };

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), %body, "Task source rejected the request");
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await.map_err(request_error)?;
        let records = parse_task_list(body)?;
        info!(count = records.len(), "Task list received");
        Ok(records)
    }
}
