//! Alert delivery. One attempt per escalated payload; failures go back to the caller
//! which logs and counts them. Nothing here retries.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("http request failed: {0}")] Http(#[from] reqwest::Error),
    #[error("alert endpoint answered {0}")] Status(StatusCode),
    #[error("nats publish failed: {0}")] Publish(String),
    #[error("encode failed: {0}")] Encode(#[from] serde_json::Error),
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, alert: &Value) -> Result<(), DeliveryError>;
    fn name(&self) -> &str;
}

/// JSON POST to a fixed endpoint; any non-2xx answer is a failed delivery.
pub struct HttpAlertSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAlertSink {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint: endpoint.into() })
    }

    pub fn endpoint(&self) -> &str { &self.endpoint }
}

#[async_trait]
impl AlertSink for HttpAlertSink {
    async fn deliver(&self, alert: &Value) -> Result<(), DeliveryError> {
        let resp = self.client.post(&self.endpoint).json(alert).send().await?;
        let status = resp.status();
        if !status.is_success() { return Err(DeliveryError::Status(status)); }
        debug!(target: "anomaly.sink", endpoint = %self.endpoint, %status, "alert delivered");
        Ok(())
    }

    fn name(&self) -> &str { "http" }
}

pub struct NatsAlertSink {
    client: async_nats::Client,
    subject: String,
}

impl NatsAlertSink {
    pub fn new(client: async_nats::Client, subject: impl Into<String>) -> Self { Self { client, subject: subject.into() } }
}

#[async_trait]
impl AlertSink for NatsAlertSink {
    async fn deliver(&self, alert: &Value) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(alert)?;
        self.client.publish(self.subject.clone(), body.into()).await.map_err(|e| DeliveryError::Publish(e.to_string()))?;
        self.client.flush().await.map_err(|e| DeliveryError::Publish(e.to_string()))?;
        debug!(target: "anomaly.sink", subject = %self.subject, "alert published");
        Ok(())
    }

    fn name(&self) -> &str { "nats" }
}
