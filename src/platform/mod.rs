pub mod discord;

use anyhow::Result;
use async_trait::async_trait;

/// A file attached to a platform message.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub url: String,
    pub size: u64,
}

/// Read-only view of a platform message, created per event and per history
/// entry, discarded once the pipeline is done with it.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: u64,
    pub author_id: u64,
    /// Display name of the author.
    pub author_name: String,
    pub author_is_bot: bool,
    pub channel_id: u64,
    /// True when the message already lives in a thread.
    pub is_thread: bool,
    pub text: String,
    pub attachments: Vec<Attachment>,
    /// User IDs mentioned in the message.
    pub mentions: Vec<u64>,
}

/// Platform operations the pipeline depends on. The gateway connection
/// itself lives behind this trait, so the whole pipeline can be exercised
/// against an in-memory implementation.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// The last `limit` messages of a channel, newest first
    /// (platform-native order).
    async fn history(&self, channel_id: u64, limit: u8) -> Result<Vec<IncomingMessage>>;

    async fn fetch_attachment(&self, attachment: &Attachment) -> Result<Vec<u8>>;

    async fn send_text(&self, channel_id: u64, text: &str) -> Result<()>;

    async fn send_file(&self, channel_id: u64, filename: &str, bytes: Vec<u8>) -> Result<()>;

    /// Create a thread hanging off `message_id` and return its channel ID.
    async fn create_thread(&self, channel_id: u64, message_id: u64, name: &str) -> Result<u64>;
}
