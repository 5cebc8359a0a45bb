//! Delivery channels for assembled notification bundles.
//!
//! The engine only decides *that* a bundle must go out; the transport is a
//! transport-layer concern (see SPEC Non-goals). [`SubscriptionChannel`] is
//! the seam: [`RestHookChannel`] is the one concrete channel carried here
//! since `rest-hook` is the FHIR-defined default, everything else (email,
//! websocket, message) is left to the embedding application.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::error::NotifyError;

#[async_trait]
pub trait SubscriptionChannel: Send + Sync {
    /// Deliver an already-assembled notification bundle to `endpoint`.
    async fn deliver(&self, endpoint: &str, bundle: &Value) -> Result<(), NotifyError>;

    fn supports(&self, channel_code: &str) -> bool;
}

/// POSTs the notification bundle as `application/fhir+json`, per the FHIR
/// `rest-hook` channel definition.
pub struct RestHookChannel {
    http_client: Client,
}

impl RestHookChannel {
    pub fn new() -> Self {
        Self { http_client: Client::new() }
    }
}

impl Default for RestHookChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubscriptionChannel for RestHookChannel {
    async fn deliver(&self, endpoint: &str, bundle: &Value) -> Result<(), NotifyError> {
        let response = self
            .http_client
            .post(endpoint)
            .header("Content-Type", "application/fhir+json")
            .json(bundle)
            .send()
            .await
            .map_err(|e| NotifyError::DeliveryFailed(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(NotifyError::DeliveryFailed(format!("{status}: {body}")))
        }
    }

    fn supports(&self, channel_code: &str) -> bool {
        channel_code == "rest-hook"
    }
}

/// Records deliveries in memory instead of sending them; used by tests and by
/// embedders that want to poll rather than receive pushes.
#[derive(Default)]
pub struct NullChannel;

#[async_trait]
impl SubscriptionChannel for NullChannel {
    async fn deliver(&self, _endpoint: &str, _bundle: &Value) -> Result<(), NotifyError> {
        Ok(())
    }

    fn supports(&self, _channel_code: &str) -> bool {
        true
    }
}
