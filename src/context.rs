use tracing::warn;

use crate::platform::{Attachment, ChatPlatform};

/// Conversation role attached to each context turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One role-tagged unit of conversation content.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

/// Build the conversation context for a channel: the last `limit` messages,
/// oldest first, with readable text attachments inlined into their turns.
///
/// The platform returns history newest-first; each mapped turn is pushed to
/// the front of the result, which amounts to a stable reverse. An
/// unreachable history degrades to an empty context rather than failing
/// the pipeline.
pub async fn build_context<P: ChatPlatform + ?Sized>(
    platform: &P,
    channel_id: u64,
    limit: u8,
) -> Vec<ConversationTurn> {
    let history = match platform.history(channel_id, limit).await {
        Ok(messages) => messages,
        Err(e) => {
            warn!(
                "Failed to fetch history for channel {}: {:#}",
                channel_id, e
            );
            return Vec::new();
        }
    };

    let mut turns: Vec<ConversationTurn> = Vec::with_capacity(history.len());
    for msg in &history {
        let role = if msg.author_is_bot {
            Role::Assistant
        } else {
            Role::User
        };

        let mut content = msg.text.clone();
        for attachment in &msg.attachments {
            if let Some(text) = read_text_attachment(platform, attachment).await {
                content.push_str(&format!("\n\n# {}\n{}\n", attachment.filename, text));
            }
        }

        turns.insert(0, ConversationTurn { role, content });
    }

    turns
}

/// Fetch and decode a text-like attachment. Any failure (unrecognized kind,
/// fetch error, non-UTF-8 bytes) skips the attachment without touching the
/// rest of the turn.
async fn read_text_attachment<P: ChatPlatform + ?Sized>(
    platform: &P,
    attachment: &Attachment,
) -> Option<String> {
    if !is_text_filename(&attachment.filename) {
        return None;
    }

    let bytes = match platform.fetch_attachment(attachment).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to fetch attachment '{}': {:#}", attachment.filename, e);
            return None;
        }
    };

    match String::from_utf8(bytes) {
        Ok(text) => Some(text),
        Err(_) => {
            warn!("Attachment '{}' is not UTF-8 text", attachment.filename);
            None
        }
    }
}

/// Recognized text-like kinds, inferred from the filename: plain text,
/// JSON, JavaScript, and YAML.
fn is_text_filename(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    matches!(
        lower.rsplit('.').next(),
        Some("txt" | "md" | "log" | "csv" | "json" | "js" | "mjs" | "yaml" | "yml")
    )
}
