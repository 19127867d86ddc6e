use std::sync::{Arc, OnceLock};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serenity::builder::{CreateAttachment, CreateMessage, CreateThread, GetMessages};
use serenity::http::Http;
use serenity::model::channel::{AutoArchiveDuration, ChannelType, Message};
use serenity::model::gateway::{GatewayIntents, Ready};
use serenity::model::id::{ChannelId, MessageId};
use serenity::prelude::{Context, EventHandler};
use serenity::Client;
use tracing::info;

use crate::bot;
use crate::config::Config;
use crate::llm::CompletionClient;
use crate::platform::{Attachment, ChatPlatform, IncomingMessage};

/// Discord implementation of the platform boundary, backed by serenity's
/// REST client for history, sends, and thread creation.
pub struct DiscordPlatform {
    discord: Arc<Http>,
    http: reqwest::Client,
}

#[async_trait]
impl ChatPlatform for DiscordPlatform {
    async fn history(&self, channel_id: u64, limit: u8) -> Result<Vec<IncomingMessage>> {
        let messages = ChannelId::new(channel_id)
            .messages(&self.discord, GetMessages::new().limit(limit))
            .await
            .context("Failed to fetch channel history")?;
        // Discord returns newest first; the context builder reverses.
        Ok(messages.iter().map(map_message).collect())
    }

    async fn fetch_attachment(&self, attachment: &Attachment) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(&attachment.url)
            .send()
            .await
            .context("Failed to download attachment")?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn send_text(&self, channel_id: u64, text: &str) -> Result<()> {
        ChannelId::new(channel_id)
            .say(&self.discord, text)
            .await
            .context("Failed to send message")?;
        Ok(())
    }

    async fn send_file(&self, channel_id: u64, filename: &str, bytes: Vec<u8>) -> Result<()> {
        ChannelId::new(channel_id)
            .send_files(
                &self.discord,
                [CreateAttachment::bytes(bytes, filename)],
                CreateMessage::new(),
            )
            .await
            .context("Failed to upload file")?;
        Ok(())
    }

    async fn create_thread(&self, channel_id: u64, message_id: u64, name: &str) -> Result<u64> {
        let thread = ChannelId::new(channel_id)
            .create_thread_from_message(
                &self.discord,
                MessageId::new(message_id),
                CreateThread::new(name)
                    .kind(ChannelType::PublicThread)
                    .auto_archive_duration(AutoArchiveDuration::ThreeDays),
            )
            .await
            .context("Failed to create thread")?;
        Ok(thread.id.get())
    }
}

struct Handler {
    config: Arc<Config>,
    completer: Arc<CompletionClient>,
    http_client: reqwest::Client,
    bot_id: OnceLock<u64>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        self.bot_id.set(ready.user.id.get()).ok();
        info!("Logged in as {}", ready.user.name);
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let Some(&bot_id) = self.bot_id.get() else {
            return;
        };

        let incoming = to_incoming(&ctx, &msg);
        let platform = DiscordPlatform {
            discord: Arc::clone(&ctx.http),
            http: self.http_client.clone(),
        };

        bot::handle_message(
            &platform,
            self.completer.as_ref(),
            &self.config,
            bot_id,
            &incoming,
        )
        .await;
    }
}

/// Connect to the Discord gateway and dispatch events until the process
/// exits.
pub async fn run(config: Arc<Config>) -> Result<()> {
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let handler = Handler {
        completer: Arc::new(CompletionClient::new(Arc::clone(&config))),
        config: Arc::clone(&config),
        http_client: reqwest::Client::new(),
        bot_id: OnceLock::new(),
    };

    let mut client = Client::builder(&config.bot_token, intents)
        .event_handler(handler)
        .await
        .context("Failed to build Discord client")?;

    info!("Connecting to Discord...");

    client
        .start()
        .await
        .context("Discord client exited with an error")?;

    Ok(())
}

fn to_incoming(ctx: &Context, msg: &Message) -> IncomingMessage {
    let mut incoming = map_message(msg);
    incoming.is_thread = is_thread(ctx, msg);
    incoming
}

fn map_message(msg: &Message) -> IncomingMessage {
    IncomingMessage {
        id: msg.id.get(),
        author_id: msg.author.id.get(),
        author_name: msg.author.name.clone(),
        author_is_bot: msg.author.bot,
        channel_id: msg.channel_id.get(),
        is_thread: false,
        text: msg.content.clone(),
        attachments: msg
            .attachments
            .iter()
            .map(|att| Attachment {
                filename: att.filename.clone(),
                url: att.url.clone(),
                size: u64::from(att.size),
            })
            .collect(),
        mentions: msg.mentions.iter().map(|user| user.id.get()).collect(),
    }
}

/// Whether the message already lives in a thread, resolved via the guild
/// cache. DMs and cache misses count as plain channels.
fn is_thread(ctx: &Context, msg: &Message) -> bool {
    let kind = msg.guild_id.and_then(|guild_id| {
        ctx.cache
            .guild(guild_id)
            .and_then(|guild| guild.channels.get(&msg.channel_id).map(|channel| channel.kind))
    });

    match kind {
        Some(kind) => matches!(
            kind,
            ChannelType::PublicThread | ChannelType::PrivateThread | ChannelType::NewsThread
        ),
        None => false,
    }
}
