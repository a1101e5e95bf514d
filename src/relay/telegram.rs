//! Telegram side of the relay, on top of teloxide.

use std::time::Duration;

use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{
    AllowedUpdate, ChatAction, FileId, MessageId, ParseMode, ReplyParameters, UpdateKind,
};
use teloxide::utils::command::BotCommands;
use tracing::{debug, info, warn};

use crate::relay::chat::{
    classify_text, AudioSource, ChatApi, ChatError, Command, EventKind, InboundEvent, TextFormat,
};
use crate::relay::poll::{EventSource, PollError};

/// Build a bot whose HTTP client outlasts the long-poll wait.
pub fn build_bot(
    token: &str,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Bot, reqwest::Error> {
    let client = teloxide::net::default_reqwest_settings()
        .connect_timeout(connect_timeout)
        .timeout(read_timeout)
        .build()?;
    Ok(Bot::with_client(token, client))
}

/// Look up the bot's username and publish the command menu.
///
/// Neither step is required to serve messages, so failures are only logged.
pub async fn prepare_bot(bot: &Bot) -> String {
    let username = match bot.get_me().await {
        Ok(me) => {
            info!("Bot user ID: {}, username: @{}", me.id, me.username());
            me.username().to_string()
        }
        Err(e) => {
            warn!("Failed to get bot info: {e}; accepting commands with any @mention");
            String::new()
        }
    };

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register bot commands: {e}");
    }
    username
}

/// Reduce a Telegram message to an event the dispatcher understands.
///
/// Returns `None` for content the bot does not handle (photos, stickers,
/// commands for other bots, ...).
pub fn inbound_event(msg: &Message, bot_username: &str) -> Option<InboundEvent> {
    let kind = if let Some(text) = msg.text() {
        classify_text(text, bot_username)?
    } else if let Some(voice) = msg.voice() {
        EventKind::Audio(AudioSource::Voice {
            file_id: voice.file.id.0.clone(),
        })
    } else if let Some(audio) = msg.audio() {
        EventKind::Audio(AudioSource::Audio {
            file_id: audio.file.id.0.clone(),
        })
    } else if let Some(document) = msg.document() {
        EventKind::Audio(AudioSource::Document {
            file_id: document.file.id.0.clone(),
            mime_type: document.mime_type.as_ref().map(|m| m.to_string()),
        })
    } else {
        return None;
    };

    let sender = msg
        .from
        .as_ref()
        .map(|u| u.username.clone().unwrap_or_else(|| u.first_name.clone()))
        .unwrap_or_else(|| "unknown".to_string());

    Some(InboundEvent {
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
        sender,
        kind,
    })
}

/// Outbound Telegram API client.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

impl ChatApi for TelegramClient {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        format: TextFormat,
        reply_to: Option<i32>,
    ) -> Result<(), ChatError> {
        let mut request = self.bot.send_message(ChatId(chat_id), text);
        if format == TextFormat::Html {
            request = request.parse_mode(ParseMode::Html);
        }
        if let Some(msg_id) = reply_to {
            let reply_params = ReplyParameters::new(MessageId(msg_id));
            request = request.reply_parameters(reply_params);
        }
        request.await?;
        Ok(())
    }

    async fn send_typing(&self, chat_id: i64) -> Result<(), ChatError> {
        self.bot
            .send_chat_action(ChatId(chat_id), ChatAction::Typing)
            .await?;
        Ok(())
    }

    async fn file_path(&self, file_id: &str) -> Result<String, ChatError> {
        let file = self.bot.get_file(FileId(file_id.to_string())).await?;
        Ok(file.path)
    }

    async fn download(
        &self,
        remote_path: &str,
        destination: &mut tokio::fs::File,
    ) -> Result<(), ChatError> {
        self.bot.download_file(remote_path, destination).await?;
        Ok(())
    }
}

/// Long-polling `getUpdates` reader that tracks the update offset.
pub struct TelegramPoller {
    bot: Bot,
    bot_username: String,
    offset: i32,
    long_poll_secs: u32,
}

impl TelegramPoller {
    pub fn new(bot: Bot, bot_username: String, long_poll_secs: u32) -> Self {
        Self {
            bot,
            bot_username,
            offset: 0,
            long_poll_secs,
        }
    }

    /// Acknowledge updates that arrived while the bot was down.
    pub async fn skip_pending(&mut self) -> Result<(), PollError> {
        let updates = self
            .bot
            .get_updates()
            .offset(-1)
            .timeout(0)
            .await
            .map_err(|e| PollError(e.to_string()))?;

        if let Some(last) = updates.last() {
            self.offset = last.id.0 as i32 + 1;
            info!("Skipped pending updates up to {}", last.id.0);
        }
        Ok(())
    }
}

impl EventSource for TelegramPoller {
    async fn next_batch(&mut self) -> Result<Vec<InboundEvent>, PollError> {
        let updates = self
            .bot
            .get_updates()
            .offset(self.offset)
            .timeout(self.long_poll_secs)
            .allowed_updates(vec![AllowedUpdate::Message])
            .await
            .map_err(|e| PollError(e.to_string()))?;

        let mut events = Vec::with_capacity(updates.len());
        for update in updates {
            self.offset = update.id.0 as i32 + 1;
            match update.kind {
                UpdateKind::Message(msg) => match inbound_event(&msg, &self.bot_username) {
                    Some(event) => events.push(event),
                    None => debug!("Ignoring message {} in {}", msg.id.0, msg.chat.id),
                },
                other => debug!("Ignoring update: {other:?}"),
            }
        }
        Ok(events)
    }
}
