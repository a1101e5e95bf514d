//! Forwards warnings and errors to an operator Telegram chat.

use std::time::Duration;

use teloxide::prelude::*;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::relay::chunk::{chunk, MAX_CHUNK_CHARS};

/// Lines arriving within this window go out as one message.
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Flush early once this many lines are waiting.
const MAX_BUFFERED: usize = 30;

pub struct TelegramLogLayer {
    tx: mpsc::UnboundedSender<String>,
}

impl TelegramLogLayer {
    /// Must be called inside a tokio runtime.
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let mut buffer: Vec<String> = Vec::new();
            let mut interval = tokio::time::interval(FLUSH_INTERVAL);

            loop {
                tokio::select! {
                    line = rx.recv() => match line {
                        Some(line) => {
                            buffer.push(line);
                            if buffer.len() >= MAX_BUFFERED {
                                flush(&bot, chat_id, &mut buffer).await;
                            }
                        }
                        None => {
                            flush(&bot, chat_id, &mut buffer).await;
                            break;
                        }
                    },
                    _ = interval.tick() => flush(&bot, chat_id, &mut buffer).await,
                }
            }
        });

        Self { tx }
    }
}

async fn flush(bot: &Bot, chat_id: ChatId, buffer: &mut Vec<String>) {
    if buffer.is_empty() {
        return;
    }
    let combined = buffer.join("\n");
    buffer.clear();

    // Only the head of an oversized burst is forwarded
    let Some(head) = chunk(&combined, MAX_CHUNK_CHARS).into_iter().next() else {
        return;
    };
    // Sending through the bot must not log, or failures would feed back here
    if let Err(e) = bot.send_message(chat_id, head).await {
        eprintln!("Failed to send log to Telegram: {e}");
    }
}

/// Collects the message and any structured fields of an event.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl MessageVisitor {
    fn into_line(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields.join(", "),
            (false, false) => format!("{}, {}", self.message, self.fields.join(", ")),
        }
    }
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{} = {:?}", field.name(), value));
        }
    }
}

impl<S: Subscriber> Layer<S> for TelegramLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > Level::WARN {
            return;
        }
        // teloxide and reqwest failures are reported by our own call sites
        if !event.metadata().target().starts_with(env!("CARGO_CRATE_NAME")) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let prefix = if level == Level::ERROR { "❌" } else { "⚠️" };
        if self.tx.send(format!("{prefix} {}", visitor.into_line())).is_err() {
            eprintln!("Log channel closed, message dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::layer::SubscriberExt;

    /// Runs events through `MessageVisitor` and keeps the lines.
    struct Capture(Arc<Mutex<Vec<String>>>);

    impl<S: Subscriber> Layer<S> for Capture {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut visitor = MessageVisitor::default();
            event.record(&mut visitor);
            self.0.lock().unwrap().push(visitor.into_line());
        }
    }

    fn capture(f: impl FnOnce()) -> Vec<String> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(Capture(seen.clone()));
        tracing::subscriber::with_default(subscriber, f);
        let lines = seen.lock().unwrap().clone();
        lines
    }

    #[test]
    fn test_message_only() {
        let lines = capture(|| tracing::warn!("send failed in {}", 42));
        assert_eq!(lines, vec!["send failed in 42".to_string()]);
    }

    #[test]
    fn test_message_with_fields() {
        let lines = capture(|| tracing::warn!(chat_id = 42, part = 2, "send failed"));
        assert_eq!(lines, vec!["send failed, chat_id = 42, part = 2".to_string()]);
    }

    #[test]
    fn test_fields_only() {
        let lines = capture(|| tracing::error!(status = 429));
        assert_eq!(lines, vec!["status = 429".to_string()]);
    }
}
