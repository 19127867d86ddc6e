use crate::config::Config;
use crate::platform::IncomingMessage;

/// Decide whether an inbound message should trigger a response.
///
/// Pure and total: runs on every message, never fails, no side effects.
/// The bot's own identity is passed in explicitly rather than read from
/// any global client handle.
///
/// Allow/deny filters run first and short-circuit; mention-based and
/// trigger-word activation are independent entry points on top of them,
/// so "only these channels" composes with "only when @mentioned or
/// keyword-triggered".
pub fn should_respond(msg: &IncomingMessage, bot_id: u64, config: &Config) -> bool {
    if !config.allowed_channels.is_empty() && !config.allowed_channels.contains(&msg.channel_id) {
        return false;
    }
    if !config.allowed_users.is_empty() && !config.allowed_users.contains(&msg.author_id) {
        return false;
    }
    if msg.author_is_bot && !config.allow_bots {
        return false;
    }
    if !config.name_pattern.is_match(&msg.author_name) {
        return false;
    }
    if msg.mentions.contains(&bot_id) {
        return true;
    }
    config
        .trigger_words
        .iter()
        .any(|pattern| pattern.is_match(&msg.text))
}
