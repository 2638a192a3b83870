//! Billing event delivery
//!
//! Events are always logged; when a webhook URL is configured they are also
//! POSTed there as JSON with an `event` name field.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::domain::entities::BillingEvent;
use crate::domain::ports::Notifier;
use crate::error::NotifyError;

#[derive(Serialize)]
struct WebhookPayload<'a> {
    event: &'a str,
    data: &'a BillingEvent,
}

pub struct WebhookNotifier {
    http: Client,
    url: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: Option<String>) -> Self {
        Self {
            http: Client::new(),
            url,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &BillingEvent) -> Result<(), NotifyError> {
        tracing::info!(event = event.name(), "Billing event");

        let Some(url) = &self.url else {
            return Ok(());
        };

        let response = self
            .http
            .post(url)
            .json(&WebhookPayload {
                event: event.name(),
                data: event,
            })
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotifyError::Status(response.status().as_u16()))
        }
    }
}
