//! Relay module - turns Telegram text and voice messages into email drafts.

pub mod chat;
pub mod chunk;
pub mod dispatcher;
pub mod openai;
pub mod poll;
pub mod provider;
pub mod session;
pub mod telegram;


pub use dispatcher::Dispatcher;
pub use openai::{HttpProvider, ProviderSettings};
pub use poll::Backoff;
pub use session::{ChatSession, Language, SessionStore, Tone};
pub use telegram::{TelegramClient, TelegramPoller};
