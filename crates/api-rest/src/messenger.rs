//! Outbound message delivery.
//!
//! Replies go back to the patient through the WhatsApp Cloud API. Delivery is fire-and-forget
//! from the webhook's point of view: failures are logged by the caller and never reported to
//! the sender.

use intake_core::config::{parse_setting, required_setting};
use intake_core::ConfigError;
use intake_types::{mask, NonEmptyText};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Default Graph API base URL.
pub const DEFAULT_GRAPH_URL: &str = "https://graph.facebook.com/v19.0";

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum MessengerError {
    #[error("message delivery failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("messaging endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Sends a text reply to a user.
pub trait Messenger: Send + Sync {
    fn send_text(
        &self,
        to: &str,
        body: &str,
    ) -> impl Future<Output = Result<(), MessengerError>> + Send;
}

/// Webhook and Graph API settings, resolved once at startup.
#[derive(Clone)]
pub struct MessengerConfig {
    pub verify_token: NonEmptyText,
    pub access_token: NonEmptyText,
    pub phone_number_id: NonEmptyText,
    pub graph_url: String,
}

impl std::fmt::Debug for MessengerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessengerConfig")
            .field("verify_token", &self.verify_token.masked())
            .field("access_token", &self.access_token.masked())
            .field("phone_number_id", &self.phone_number_id)
            .field("graph_url", &self.graph_url)
            .finish()
    }
}

impl MessengerConfig {
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            verify_token: required_setting(lookup, "FB_VERIFY_TOKEN")?,
            access_token: required_setting(lookup, "FB_ACCESS_TOKEN")?,
            phone_number_id: required_setting(lookup, "FB_PHONE_NUMBER_ID")?,
            graph_url: parse_setting(lookup, "FB_GRAPH_URL", DEFAULT_GRAPH_URL.to_owned())?,
        })
    }
}

#[derive(Debug, Serialize)]
struct OutboundText<'a> {
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct OutboundMessage<'a> {
    messaging_product: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text: OutboundText<'a>,
}

impl<'a> OutboundMessage<'a> {
    fn text(to: &'a str, body: &'a str) -> Self {
        Self {
            messaging_product: "whatsapp",
            to,
            kind: "text",
            text: OutboundText { body },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

/// WhatsApp Cloud API client.
#[derive(Clone)]
pub struct WhatsAppMessenger {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
}

impl WhatsAppMessenger {
    pub fn new(config: &MessengerConfig) -> Result<Self, MessengerError> {
        let client = reqwest::Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/{}/messages",
                config.graph_url.trim_end_matches('/'),
                config.phone_number_id
            ),
            access_token: config.access_token.as_str().to_owned(),
        })
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.access_token)) {
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }
}

impl Messenger for WhatsAppMessenger {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), MessengerError> {
        let response = self
            .client
            .post(&self.endpoint)
            .headers(self.headers())
            .json(&OutboundMessage::text(to, body))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(MessengerError::Status { status, body });
        }

        let sent: SendResponse = response.json().await.unwrap_or_default();
        let message_id = sent.messages.into_iter().next().map(|m| m.id);
        tracing::info!(to = %mask(to), message_id = ?message_id, "message sent");
        Ok(())
    }
}
