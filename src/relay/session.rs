//! Per-chat drafting settings, held in memory for the process lifetime.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Rejected `/lang` or `/tone` argument (or default from the environment).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} '{value}' (expected one of: {expected})")]
pub struct InvalidOption {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}

/// Language the email draft is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Pl,
    En,
    Ua,
}

impl Language {
    pub const CHOICES: &'static str = "pl|en|ua";

    pub fn code(self) -> &'static str {
        match self {
            Language::Pl => "pl",
            Language::En => "en",
            Language::Ua => "ua",
        }
    }

    /// Name used in the completion prompt.
    pub fn english_name(self) -> &'static str {
        match self {
            Language::Pl => "Polish",
            Language::En => "English",
            Language::Ua => "Ukrainian",
        }
    }
}

impl FromStr for Language {
    type Err = InvalidOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pl" => Ok(Language::Pl),
            "en" => Ok(Language::En),
            "ua" => Ok(Language::Ua),
            _ => Err(InvalidOption {
                kind: "language",
                value: s.to_string(),
                expected: Self::CHOICES,
            }),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Register of the email draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tone {
    Formal,
    Friendly,
    Firm,
}

impl Tone {
    pub const CHOICES: &'static str = "formal|friendly|firm";

    pub fn as_str(self) -> &'static str {
        match self {
            Tone::Formal => "formal",
            Tone::Friendly => "friendly",
            Tone::Firm => "firm",
        }
    }
}

impl FromStr for Tone {
    type Err = InvalidOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "formal" => Ok(Tone::Formal),
            "friendly" => Ok(Tone::Friendly),
            "firm" => Ok(Tone::Firm),
            _ => Err(InvalidOption {
                kind: "tone",
                value: s.to_string(),
                expected: Self::CHOICES,
            }),
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for one chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatSession {
    pub language: Language,
    pub tone: Tone,
}

/// Chat id -> session map. Missing entries are created from `defaults`
/// on first access.
#[derive(Debug)]
pub struct SessionStore {
    defaults: ChatSession,
    sessions: HashMap<i64, ChatSession>,
}

impl SessionStore {
    pub fn new(defaults: ChatSession) -> Self {
        Self {
            defaults,
            sessions: HashMap::new(),
        }
    }

    pub fn get_or_create(&mut self, chat_id: i64) -> ChatSession {
        *self.sessions.entry(chat_id).or_insert(self.defaults)
    }

    /// Parse and store a language. State is untouched on error.
    pub fn set_language(&mut self, chat_id: i64, value: &str) -> Result<Language, InvalidOption> {
        let language: Language = value.parse()?;
        self.entry(chat_id).language = language;
        Ok(language)
    }

    /// Parse and store a tone. State is untouched on error.
    pub fn set_tone(&mut self, chat_id: i64, value: &str) -> Result<Tone, InvalidOption> {
        let tone: Tone = value.parse()?;
        self.entry(chat_id).tone = tone;
        Ok(tone)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.sessions.len()
    }

    fn entry(&mut self, chat_id: i64) -> &mut ChatSession {
        self.sessions.entry(chat_id).or_insert(self.defaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(ChatSession {
            language: Language::Pl,
            tone: Tone::Formal,
        })
    }

    #[test]
    fn test_defaults_on_first_access() {
        let mut store = store();
        assert_eq!(store.len(), 0);
        let session = store.get_or_create(42);
        assert_eq!(session.language, Language::Pl);
        assert_eq!(session.tone, Tone::Formal);
        assert_eq!(store.len(), 1);

        // Second access reuses the entry
        store.get_or_create(42);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_set_language_case_insensitive() {
        let mut store = store();
        assert_eq!(store.set_language(1, "EN"), Ok(Language::En));
        assert_eq!(store.get_or_create(1).language, Language::En);
        assert_eq!(store.get_or_create(1).tone, Tone::Formal);
    }

    #[test]
    fn test_invalid_language_leaves_state() {
        let mut store = store();
        store.set_language(1, "ua").unwrap();

        let err = store.set_language(1, "de").unwrap_err();
        assert_eq!(err.kind, "language");
        assert_eq!(err.value, "de");
        assert_eq!(store.get_or_create(1).language, Language::Ua);
    }

    #[test]
    fn test_invalid_tone_does_not_create_session() {
        let mut store = store();
        assert!(store.set_tone(7, "rude").is_err());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_sessions_are_per_chat() {
        let mut store = store();
        store.set_tone(1, "firm").unwrap();
        assert_eq!(store.get_or_create(1).tone, Tone::Firm);
        assert_eq!(store.get_or_create(2).tone, Tone::Formal);
    }

    #[test]
    fn test_invalid_option_message() {
        let err = "loud".parse::<Tone>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid tone 'loud' (expected one of: formal|friendly|firm)"
        );
    }
}
