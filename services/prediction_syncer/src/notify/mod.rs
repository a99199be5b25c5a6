use async_trait::async_trait;

use crate::error::Result;

pub mod dispatcher;
pub mod messages;
pub mod preview;
pub mod telegram;

pub use dispatcher::{DispatchReport, DispatchSettings, NotificationDispatcher};
pub use preview::{HttpImageRenderer, ImageRenderer};
pub use telegram::TelegramNotifier;

/// Inline button attached under a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkButton {
    /// Opens the mini app inside Telegram. Only valid in private chats.
    WebApp { text: String, url: String },
    /// Plain link, used for channel posts.
    Url { text: String, url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub chat_id: i64,
    /// Already escaped for MarkdownV2.
    pub text: String,
    pub image: Option<Vec<u8>>,
    pub button: Option<LinkButton>,
}

/// Outbound message transport.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(&self, message: &OutboundMessage) -> Result<()>;

    /// Sends `message.image` with the text as caption. Falls back to a text
    /// message when there is no image.
    async fn send_photo(&self, message: &OutboundMessage) -> Result<()>;
}
