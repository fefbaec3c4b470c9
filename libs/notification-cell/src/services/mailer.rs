use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use shared_config::AppConfig;

use crate::error::NotificationError;
use crate::models::EmailMessage;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotificationError>;
}

/// Writes the envelope to the log instead of delivering it.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotificationError> {
        info!("Email to {}: {}", message.to, message.subject);
        debug!("Email body:\n{}", message.body);
        Ok(())
    }
}

/// Posts each message as JSON to an HTTP relay.
#[derive(Debug, Clone)]
pub struct WebhookMailer {
    client: reqwest::Client,
    url: String,
}

impl WebhookMailer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotificationError> {
        let response = self.client.post(&self.url).json(message).send().await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(NotificationError::Delivery(format!(
                "relay responded {}: {}",
                status, detail
            )));
        }

        debug!("Relay accepted email to {}", message.to);
        Ok(())
    }
}

pub fn mailer_from_config(config: &AppConfig) -> Arc<dyn Mailer> {
    match &config.notification_webhook_url {
        Some(url) => {
            info!("Delivering notifications through webhook relay");
            Arc::new(WebhookMailer::new(url.clone()))
        }
        None => Arc::new(LogMailer),
    }
}
