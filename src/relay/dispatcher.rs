//! Routes inbound events to handlers and turns failures into replies.

use std::path::PathBuf;

use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::relay::chat::{
    is_audio_mime, local_suffix, AudioSource, ChatApi, ChatError, Command, EventKind,
    InboundEvent, TextFormat,
};
use crate::relay::chunk::{chunk, MAX_CHUNK_CHARS};
use crate::relay::provider::{Provider, ProviderError};
use crate::relay::session::{ChatSession, Language, SessionStore, Tone};

pub const NOT_AUDIO_REPLY: &str = "⚠️ Send a voice message or an audio file (mp3/m4a/ogg/opus).";

pub const NO_SPEECH_REPLY: &str = "🤷 No speech recognised in that recording.";

pub const QUOTA_REPLY: &str = "❌ The API key hit its rate limit or quota. \
Top up the balance or switch providers:\n\
1) Get a GROQ_API_KEY\n\
2) Set PROVIDER=groq and GROQ_API_KEY=... in .env\n\
3) Restart the bot.";

/// Everything that can go wrong while handling a text or audio message.
#[derive(Debug, Error)]
pub enum HandleError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("could not fetch the audio file: {0}")]
    Chat(#[from] ChatError),
    #[error("temporary file error: {0}")]
    TempFile(#[from] std::io::Error),
}

impl HandleError {
    pub fn is_quota_exhausted(&self) -> bool {
        match self {
            HandleError::Provider(e) => e.is_quota_exhausted(),
            _ => false,
        }
    }
}

pub fn help_text(provider: &str, session: ChatSession) -> String {
    format!(
        "🎙️ <b>Voice → Email Bot</b>\n\
         Send a voice message, an audio file or plain text and I will draft an email (Subject + body).\n\n\
         <b>Commands:</b>\n\
         • /lang {langs}: email language\n\
         • /tone {tones}: tone\n\
         • /start: this help\n\
         <i>Example:</i> /lang pl, /tone friendly\n\n\
         <i>Provider</i>: {provider}\n\n\
         Current: lang={lang}, tone={tone}",
        langs = Language::CHOICES,
        tones = Tone::CHOICES,
        lang = session.language,
        tone = session.tone,
    )
}

/// Handles one event at a time. Owns the session store; nothing a handler
/// does can fail the caller.
pub struct Dispatcher<P, C> {
    provider: P,
    chat: C,
    sessions: SessionStore,
    temp_dir: Option<PathBuf>,
}

impl<P: Provider, C: ChatApi> Dispatcher<P, C> {
    pub fn new(provider: P, chat: C, sessions: SessionStore, temp_dir: Option<PathBuf>) -> Self {
        Self {
            provider,
            chat,
            sessions,
            temp_dir,
        }
    }

    pub async fn handle(&mut self, event: InboundEvent) {
        let InboundEvent {
            chat_id,
            message_id,
            sender,
            kind,
        } = event;

        match kind {
            EventKind::Command(command) => {
                info!("⌨️ {sender} in {chat_id}: {command:?}");
                self.handle_command(chat_id, message_id, command).await;
            }
            EventKind::UnknownCommand(name) => {
                debug!("Unknown command /{name} from {sender}");
                let text = format!("Unknown command /{name}. Send /start for help.");
                self.reply(chat_id, message_id, &text, TextFormat::Plain).await;
            }
            EventKind::Text(text) => {
                info!("📨 Text from {sender} in {chat_id} ({} chars)", text.chars().count());
                let result = self.draft_from_text(chat_id, &text).await;
                self.deliver(chat_id, message_id, result).await;
            }
            EventKind::Audio(source) => {
                if let AudioSource::Document { mime_type, .. } = &source {
                    let mime = mime_type.as_deref().unwrap_or_default();
                    if !is_audio_mime(mime) {
                        info!("Rejected document from {sender} with MIME '{mime}'");
                        self.reply(chat_id, message_id, NOT_AUDIO_REPLY, TextFormat::Plain).await;
                        return;
                    }
                }
                info!("🎙️ Audio from {sender} in {chat_id}: {source:?}");
                let result = self.draft_from_audio(chat_id, source.file_id()).await;
                self.deliver(chat_id, message_id, result).await;
            }
        }
    }

    async fn handle_command(&mut self, chat_id: i64, message_id: i32, command: Command) {
        let (text, format) = match command {
            Command::Start | Command::Help => {
                let session = self.sessions.get_or_create(chat_id);
                (help_text(self.provider.name(), session), TextFormat::Html)
            }
            Command::Lang(value) => match self.sessions.set_language(chat_id, &value) {
                Ok(language) => (
                    format!("✅ Language set to {}", language.code().to_uppercase()),
                    TextFormat::Plain,
                ),
                Err(e) => {
                    debug!("{e}");
                    (format!("Usage: /lang {}", Language::CHOICES), TextFormat::Plain)
                }
            },
            Command::Tone(value) => match self.sessions.set_tone(chat_id, &value) {
                Ok(tone) => (format!("✅ Tone set to {tone}"), TextFormat::Plain),
                Err(e) => {
                    debug!("{e}");
                    (format!("Usage: /tone {}", Tone::CHOICES), TextFormat::Plain)
                }
            },
        };
        self.reply(chat_id, message_id, &text, format).await;
    }

    async fn draft_from_text(&mut self, chat_id: i64, text: &str) -> Result<String, HandleError> {
        let session = self.sessions.get_or_create(chat_id);
        self.typing(chat_id).await;
        let draft = self
            .provider
            .complete(text, session.language, session.tone)
            .await?;
        Ok(draft)
    }

    async fn draft_from_audio(&mut self, chat_id: i64, file_id: &str) -> Result<String, HandleError> {
        let session = self.sessions.get_or_create(chat_id);
        let audio = self.download_to_temp(file_id).await?;
        self.typing(chat_id).await;

        let transcript = self.provider.transcribe(audio.path()).await?;
        // Removes the local copy
        drop(audio);

        if transcript.is_empty() {
            return Ok(NO_SPEECH_REPLY.to_string());
        }

        let draft = self
            .provider
            .complete(&transcript, session.language, session.tone)
            .await?;
        Ok(format!("📝 Transcript:\n{transcript}\n\n{draft}"))
    }

    /// Download a chat file into a temporary file that is deleted on drop.
    async fn download_to_temp(&self, file_id: &str) -> Result<NamedTempFile, HandleError> {
        let remote_path = self.chat.file_path(file_id).await?;
        let suffix = local_suffix(&remote_path);

        let mut builder = tempfile::Builder::new();
        builder.prefix("mailrelay-").suffix(&suffix);
        let temp = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        let mut file = tokio::fs::File::from_std(temp.reopen()?);
        self.chat.download(&remote_path, &mut file).await?;
        file.flush().await?;

        debug!("Downloaded {} to {}", remote_path, temp.path().display());
        Ok(temp)
    }

    async fn deliver(&self, chat_id: i64, message_id: i32, result: Result<String, HandleError>) {
        match result {
            Ok(text) => self.send_chunked(chat_id, message_id, &text).await,
            Err(e) if e.is_quota_exhausted() => {
                warn!("Quota exhausted for {}: {e}", self.provider.name());
                self.reply(chat_id, message_id, QUOTA_REPLY, TextFormat::Plain).await;
            }
            Err(e) => {
                warn!("Failed to handle message {message_id} in {chat_id}: {e}");
                let text = format!("❌ Error: {e}");
                self.reply(chat_id, message_id, &text, TextFormat::Plain).await;
            }
        }
    }

    /// Send `text` as consecutive replies. Stops at the first failed send
    /// so the recipient never sees pieces out of order.
    async fn send_chunked(&self, chat_id: i64, message_id: i32, text: &str) {
        let pieces = chunk(text, MAX_CHUNK_CHARS);
        let total = pieces.len();
        for (i, piece) in pieces.into_iter().enumerate() {
            if let Err(e) = self
                .chat
                .send_text(chat_id, piece, TextFormat::Plain, Some(message_id))
                .await
            {
                warn!("Failed to send part {}/{} to {}: {e}", i + 1, total, chat_id);
                return;
            }
        }
    }

    async fn reply(&self, chat_id: i64, message_id: i32, text: &str, format: TextFormat) {
        if let Err(e) = self.chat.send_text(chat_id, text, format, Some(message_id)).await {
            warn!("Failed to reply in {chat_id}: {e}");
        }
    }

    async fn typing(&self, chat_id: i64) {
        if let Err(e) = self.chat.send_typing(chat_id).await {
            debug!("Typing indicator failed in {chat_id}: {e}");
        }
    }
}
