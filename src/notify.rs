use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::settings::WebhookSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failure,
}

#[derive(Debug, Serialize)]
struct Payload<'a> {
    status: RunStatus,
    message: &'a str,
    venues_processed_count: usize,
    service_name: &'a str,
}

/// Why a delivery did not land. Logged, never returned to callers.
#[derive(Debug, Error)]
enum DeliveryError {
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("endpoint answered {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Best-effort completion webhook.
pub struct Notifier {
    client: reqwest::Client,
    url: Option<String>,
    service_name: String,
}

impl Notifier {
    pub fn new(settings: &WebhookSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .unwrap_or_default();
        Notifier {
            client,
            url: settings.url.clone().filter(|u| !u.is_empty()),
            service_name: settings.service_name.clone(),
        }
    }

    /// Report the run outcome. Delivery problems are logged and dropped.
    pub async fn notify(&self, status: RunStatus, message: &str, count: usize) {
        let Some(url) = self.url.as_deref() else {
            debug!("COMPLETION_WEBHOOK_URL not set, skipping webhook");
            return;
        };

        let payload = Payload {
            status,
            message,
            venues_processed_count: count,
            service_name: &self.service_name,
        };
        match self.deliver(url, &payload).await {
            Ok(code) => info!("Webhook sent to {} ({})", url, code),
            Err(e) => warn!("Error sending webhook to {}: {}", url, e),
        }
    }

    async fn deliver(
        &self,
        url: &str,
        payload: &Payload<'_>,
    ) -> Result<reqwest::StatusCode, DeliveryError> {
        let resp = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(DeliveryError::Request)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DeliveryError::Status { status, body });
        }
        Ok(status)
    }
}
