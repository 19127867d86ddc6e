use anyhow::Result;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::context::build_context;
use crate::gate;
use crate::llm::Completer;
use crate::platform::{ChatPlatform, IncomingMessage};
use crate::split::split_text;

/// Discord's hard per-message ceiling. Responses above it are additionally
/// delivered as a file attachment before the inline chunks.
pub const PLATFORM_MESSAGE_LIMIT: usize = 2000;

/// Handle one inbound message end to end: gate, context, completion,
/// delivery. Nothing escapes this function: any failure past the gate is
/// logged and surfaced to the channel as a short plain-text notice, so one
/// bad message can never take down the event loop.
pub async fn handle_message<P, C>(
    platform: &P,
    completer: &C,
    config: &Config,
    bot_id: u64,
    msg: &IncomingMessage,
) where
    P: ChatPlatform + ?Sized,
    C: Completer + ?Sized,
{
    if !gate::should_respond(msg, bot_id, config) {
        return;
    }

    info!(
        "Responding to message {} in channel {}",
        msg.id, msg.channel_id
    );

    if let Err(e) = respond(platform, completer, config, msg).await {
        error!("Failed to handle message {}: {:#}", msg.id, e);
        let notice = format!("I couldn't process the request. Please try again later. Debug:{e}");
        if let Err(e) = platform.send_text(msg.channel_id, &notice).await {
            error!("Failed to deliver failure notice: {:#}", e);
        }
    }
}

async fn respond<P, C>(
    platform: &P,
    completer: &C,
    config: &Config,
    msg: &IncomingMessage,
) -> Result<()>
where
    P: ChatPlatform + ?Sized,
    C: Completer + ?Sized,
{
    let target = resolve_target(platform, config, msg).await;
    let context = build_context(platform, msg.channel_id, config.history_limit).await;
    let response = completer.complete(&config.msg_prompt, &context).await;
    deliver(platform, target, &response, config.max_response_chars).await
}

/// Where the reply goes: the originating channel, or (when `AUTO_THREAD` is
/// on and the message is not already in one) a fresh thread named after the
/// message. Thread creation failure falls back to the channel.
async fn resolve_target<P: ChatPlatform + ?Sized>(
    platform: &P,
    config: &Config,
    msg: &IncomingMessage,
) -> u64 {
    if !config.auto_thread || msg.is_thread {
        return msg.channel_id;
    }

    let name = thread_name(msg);
    match platform.create_thread(msg.channel_id, msg.id, &name).await {
        Ok(thread_id) => thread_id,
        Err(e) => {
            warn!("Failed to create thread, replying in channel: {:#}", e);
            msg.channel_id
        }
    }
}

fn thread_name(msg: &IncomingMessage) -> String {
    let excerpt: String = msg.text.chars().take(50).collect();
    let excerpt = excerpt.replace('\n', " ").trim().to_string();
    if excerpt.is_empty() {
        format!("Response to {}", msg.author_name)
    } else {
        excerpt
    }
}

/// Send `response` to `channel_id` in order. An oversized response is first
/// uploaded whole as `response.txt`, then chunked inline; each send is
/// awaited before the next to preserve reading order.
async fn deliver<P: ChatPlatform + ?Sized>(
    platform: &P,
    channel_id: u64,
    response: &str,
    max_len: usize,
) -> Result<()> {
    if response.len() > PLATFORM_MESSAGE_LIMIT {
        platform
            .send_file(channel_id, "response.txt", response.as_bytes().to_vec())
            .await?;
    }

    for chunk in split_text(response, max_len) {
        // A response starting with a newline splits into an empty first
        // chunk; Discord rejects empty messages, so skip them.
        if chunk.is_empty() {
            continue;
        }
        platform.send_text(channel_id, &chunk).await?;
    }

    Ok(())
}
