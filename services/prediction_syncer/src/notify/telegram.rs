use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::{LinkButton, Notifier, OutboundMessage};
use crate::config::TelegramConfig;
use crate::error::{Result, SyncError};

const PARSE_MODE: &str = "MarkdownV2";

fn reply_markup(button: &LinkButton) -> Value {
    let button = match button {
        LinkButton::WebApp { text, url } => json!({ "text": text, "web_app": { "url": url } }),
        LinkButton::Url { text, url } => json!({ "text": text, "url": url }),
    };
    json!({ "inline_keyboard": [[button]] })
}

/// Bot API client sending `sendMessage` and `sendPhoto` requests.
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_url: String,
}

impl TelegramNotifier {
    pub fn from_config(config: &TelegramConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self::new(client, &config.api_base_url, &config.bot_token))
    }

    pub fn new(client: reqwest::Client, api_base_url: &str, bot_token: &str) -> Self {
        Self {
            client,
            api_url: format!("{}/bot{}", api_base_url.trim_end_matches('/'), bot_token),
        }
    }

    async fn check(method: &str, response: reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        warn!("Telegram {} failed: {} {}", method, status, body);
        Err(SyncError::Notifier(format!("{method} failed with {status}: {body}")))
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_text(&self, message: &OutboundMessage) -> Result<()> {
        let mut body = json!({
            "chat_id": message.chat_id,
            "text": message.text,
            "parse_mode": PARSE_MODE,
            "disable_web_page_preview": true,
        });
        if let Some(button) = &message.button {
            body["reply_markup"] = reply_markup(button);
        }

        let response = self
            .client
            .post(format!("{}/sendMessage", self.api_url))
            .json(&body)
            .send()
            .await?;
        Self::check("sendMessage", response).await?;
        debug!("Sent text message to chat {}", message.chat_id);
        Ok(())
    }

    async fn send_photo(&self, message: &OutboundMessage) -> Result<()> {
        let Some(image) = &message.image else {
            return self.send_text(message).await;
        };

        let photo = Part::bytes(image.clone())
            .file_name("preview.png")
            .mime_str("image/png")?;
        let mut form = Form::new()
            .text("chat_id", message.chat_id.to_string())
            .text("caption", message.text.clone())
            .text("parse_mode", PARSE_MODE)
            .part("photo", photo);
        if let Some(button) = &message.button {
            form = form.text("reply_markup", reply_markup(button).to_string());
        }

        let response = self
            .client
            .post(format!("{}/sendPhoto", self.api_url))
            .multipart(form)
            .send()
            .await?;
        Self::check("sendPhoto", response).await?;
        debug!("Sent photo message to chat {}", message.chat_id);
        Ok(())
    }
}
