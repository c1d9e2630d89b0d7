//! Notification publishers.

use super::NotificationPublisher;
use crate::error::StoreError;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

/// Envelope posted to the notification endpoint.
#[derive(Debug, Serialize)]
struct PublishRequest<'a> {
    channel: &'a str,
    subject: &'a str,
    message: &'a str,
    attributes: &'a BTreeMap<String, String>,
}

/// Posts notifications as JSON to an HTTP endpoint (a topic gateway or webhook).
pub struct HttpPublisher {
    endpoint: String,
    http_client: reqwest::Client,
}

impl HttpPublisher {
    pub fn new(endpoint: impl Into<String>, timeout_seconds: u64) -> Result<Self, StoreError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;

        Ok(Self {
            endpoint: endpoint.into(),
            http_client,
        })
    }
}

#[async_trait]
impl NotificationPublisher for HttpPublisher {
    async fn publish(
        &self,
        channel: &str,
        subject: &str,
        body: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        let request = PublishRequest {
            channel,
            subject,
            message: body,
            attributes,
        };

        debug!("Posting notification '{}' to {}", subject, self.endpoint);

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status { status, body });
        }

        Ok(())
    }
}

/// Writes notifications to the log. Used when no endpoint is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPublisher;

#[async_trait]
impl NotificationPublisher for LogPublisher {
    async fn publish(
        &self,
        channel: &str,
        subject: &str,
        body: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        info!(channel, ?attributes, "{}", subject);
        debug!("{}", body);
        Ok(())
    }
}
