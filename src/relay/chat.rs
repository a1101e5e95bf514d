//! Inbound events and the outbound chat boundary the dispatcher talks to.

use std::borrow::Cow;
use std::future::Future;
use std::path::Path;

use teloxide::utils::command::{BotCommands, ParseError};
use thiserror::Error;

/// Bot commands. Parsed with the bot's username so `/lang@other_bot` is
/// not picked up.
#[derive(BotCommands, Debug, Clone, PartialEq, Eq)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    #[command(description = "help and current settings")]
    Start,
    #[command(description = "help and current settings")]
    Help,
    #[command(description = "email language: pl, en or ua", parse_with = first_word)]
    Lang(String),
    #[command(description = "email tone: formal, friendly or firm", parse_with = first_word)]
    Tone(String),
}

/// Keep only the first argument; a missing one becomes an empty string so
/// the handler can answer with usage text.
fn first_word(input: String) -> Result<(String,), ParseError> {
    Ok((input.split_whitespace().next().unwrap_or_default().to_string(),))
}

/// Where a piece of audio came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    Voice { file_id: String },
    Audio { file_id: String },
    Document { file_id: String, mime_type: Option<String> },
}

impl AudioSource {
    pub fn file_id(&self) -> &str {
        match self {
            AudioSource::Voice { file_id }
            | AudioSource::Audio { file_id }
            | AudioSource::Document { file_id, .. } => file_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Command(Command),
    UnknownCommand(String),
    Text(String),
    Audio(AudioSource),
}

/// One message from a user, reduced to what the dispatcher needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub chat_id: i64,
    pub message_id: i32,
    pub sender: String,
    pub kind: EventKind,
}

/// Classify message text as a command or plain text.
///
/// Returns `None` for commands addressed to a different bot.
pub fn classify_text(text: &str, bot_username: &str) -> Option<EventKind> {
    if !text.starts_with('/') {
        return Some(EventKind::Text(text.to_string()));
    }
    let text = strip_unverifiable_mention(text, bot_username);
    let text = text.as_ref();
    let head = text.split_whitespace().next().unwrap_or(text);
    let unknown = || {
        let name = head.trim_start_matches('/').split('@').next().unwrap_or_default();
        EventKind::UnknownCommand(name.to_string())
    };

    match Command::parse(text, bot_username) {
        Ok(command) => Some(EventKind::Command(command)),
        Err(ParseError::WrongBotName(_)) => None,
        Err(ParseError::UnknownCommand(_)) => Some(unknown()),
        // Known command with arguments it does not take, e.g. `/start now`
        Err(_) => Some(
            Command::parse(head, bot_username)
                .map(EventKind::Command)
                .unwrap_or_else(|_| unknown()),
        ),
    }
}

/// Drop the `@mention` from the command word when it cannot be checked:
/// the bot's username is unknown, or the mention is empty (`/start@`).
fn strip_unverifiable_mention<'a>(text: &'a str, bot_username: &str) -> Cow<'a, str> {
    let head_end = text.find(char::is_whitespace).unwrap_or(text.len());
    let (head, rest) = text.split_at(head_end);
    match head.split_once('@') {
        Some((command, mention)) if bot_username.is_empty() || mention.is_empty() => {
            Cow::Owned(format!("{command}{rest}"))
        }
        _ => Cow::Borrowed(text),
    }
}

/// Uploaded documents are only transcribed when they look like audio.
pub fn is_audio_mime(mime_type: &str) -> bool {
    let mime = mime_type.trim().to_lowercase();
    mime.starts_with("audio/") || mime == "application/ogg" || mime == "video/mp4"
}

/// Suffix for the local copy of a remote file, e.g. `.oga` for
/// `voice/file_12.oga`. Telegram voice notes without an extension are OGG.
pub fn local_suffix(remote_path: &str) -> String {
    match Path::new(remote_path).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!(".{ext}"),
        _ => ".oga".to_string(),
    }
}

/// How Telegram should render an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    Html,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Telegram request failed: {0}")]
    Request(#[from] teloxide::RequestError),
    #[error("download failed: {0}")]
    Download(#[from] teloxide::DownloadError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outbound side of the chat platform.
pub trait ChatApi {
    fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        format: TextFormat,
        reply_to: Option<i32>,
    ) -> impl Future<Output = Result<(), ChatError>> + Send;

    /// Show "typing..." while a slow request is running.
    fn send_typing(&self, chat_id: i64) -> impl Future<Output = Result<(), ChatError>> + Send;

    /// Resolve a file id to the platform's download path.
    fn file_path(&self, file_id: &str) -> impl Future<Output = Result<String, ChatError>> + Send;

    fn download(
        &self,
        remote_path: &str,
        destination: &mut tokio::fs::File,
    ) -> impl Future<Output = Result<(), ChatError>> + Send;
}
