//! Outbound delivery of produced resources
//!
//! The pipeline hands each produced resource to a [`DeliverySink`] on a
//! spawned task and never waits for the outcome.

use crate::config::DeliveryConfig;
use crate::remote::http::FHIR_JSON;
use crate::remote::FetchError;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Outcome of one successful delivery
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReceipt {
    pub status: u16,
    pub resource_type: String,
    pub id: Option<String>,
    /// `Location` header, when the server sent one
    pub location: Option<String>,
}

/// Accepts produced resources one at a time
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, resource: &Value) -> Result<DeliveryReceipt>;
}

/// Deliver on a background task, logging the outcome
pub fn deliver_detached(sink: Arc<dyn DeliverySink>, resource: Value) {
    tokio::spawn(async move {
        match sink.deliver(&resource).await {
            Ok(receipt) => tracing::debug!(
                resource_type = %receipt.resource_type,
                id = receipt.id.as_deref().unwrap_or("-"),
                status = receipt.status,
                "resource delivered"
            ),
            Err(e) => tracing::warn!(error = %e, "delivery failed"),
        }
    });
}

/// Creates resources with POST, or updates them with PUT when they carry an id
#[derive(Debug, Clone)]
pub struct HttpDeliverySink {
    client: Client,
    base_url: String,
}

impl HttpDeliverySink {
    pub fn new(config: &DeliveryConfig) -> Result<Self> {
        Url::parse(&config.base_url)
            .map_err(|e| Error::invalid_input(format!("Invalid delivery URL '{}': {e}", config.base_url)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Http {
                message: format!("Failed to create HTTP client: {e}"),
                source: Some(e),
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Target URL and whether the request is an update
    pub fn endpoint(&self, resource_type: &str, id: Option<&str>) -> (String, bool) {
        match id {
            Some(id) => (format!("{}/{resource_type}/{id}", self.base_url), true),
            None => (format!("{}/{resource_type}", self.base_url), false),
        }
    }
}

#[async_trait]
impl DeliverySink for HttpDeliverySink {
    async fn deliver(&self, resource: &Value) -> Result<DeliveryReceipt> {
        let resource_type = resource
            .get("resourceType")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_input("Cannot deliver an object without resourceType"))?;
        let id = resource.get("id").and_then(Value::as_str);
        let (url, update) = self.endpoint(resource_type, id);

        let request = if update { self.client.put(&url) } else { self.client.post(&url) };
        let response = request
            .header(ACCEPT, FHIR_JSON)
            .header(CONTENT_TYPE, FHIR_JSON)
            .body(serde_json::to_vec(resource)?)
            .send()
            .await
            .map_err(FetchError::from_request_error)?;

        if !response.status().is_success() {
            return Err(FetchError::from_response(response).await.into());
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(DeliveryReceipt {
            status: response.status().as_u16(),
            resource_type: resource_type.to_string(),
            id: id.map(str::to_string),
            location,
        })
    }
}
