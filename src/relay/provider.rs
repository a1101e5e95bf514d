//! Speech-to-text and completion capability, independent of the backend.

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::relay::session::{Language, Tone};

/// Sampling temperature for drafts. Low to keep the format stable.
pub const DRAFT_TEMPERATURE: f32 = 0.3;

const SYSTEM_PROMPT: &str = "You write concise professional emails. \
Output strictly in this format:\n\
Subject: <short subject>\n\n<body>\n\
No extra notes.";

/// Error texts that mean the account is out of quota or rate limited.
static QUOTA_SIGNATURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)insufficient_quota|rate_limit|429").expect("quota regex is valid")
});

/// Hosted backend, chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Groq,
}

impl ProviderKind {
    pub fn base_url(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::Groq => "https://api.groq.com/openai/v1",
        }
    }

    pub fn default_transcribe_model(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "whisper-1",
            ProviderKind::Groq => "whisper-large-v3",
        }
    }

    pub fn default_chat_model(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::Groq => "llama-3.1-8b-instant",
        }
    }

    /// Environment variable holding this backend's API key.
    pub fn api_key_var(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Groq => "GROQ_API_KEY",
        }
    }

    /// Environment variable overriding the chat model.
    pub fn chat_model_var(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_CHAT_MODEL",
            ProviderKind::Groq => "GROQ_CHAT_MODEL",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "groq" => Ok(ProviderKind::Groq),
            other => Err(format!("unknown provider '{other}' (expected openai or groq)")),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::OpenAi => f.write_str("OPENAI"),
            ProviderKind::Groq => f.write_str("GROQ"),
        }
    }
}

/// Failure talking to a hosted API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("failed to read audio: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("empty response")]
    Empty,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transcription failed: {0}")]
    Transcription(#[source] ApiError),
    #[error("completion failed: {0}")]
    Completion(#[source] ApiError),
}

impl ProviderError {
    pub fn is_quota_exhausted(&self) -> bool {
        is_quota_error(&self.to_string())
    }
}

/// True when an error text carries a quota or rate limit signature.
pub fn is_quota_error(text: &str) -> bool {
    QUOTA_SIGNATURE.is_match(text)
}

/// Transcription and drafting backend.
pub trait Provider {
    /// Display name, shown in the help text.
    fn name(&self) -> &str;

    /// Transcribe the audio file at `audio`. Returns trimmed text.
    fn transcribe(&self, audio: &Path) -> impl Future<Output = Result<String, ProviderError>> + Send;

    /// Turn `text` into a `Subject:` + body email draft. Returns trimmed text.
    fn complete(
        &self,
        text: &str,
        language: Language,
        tone: Tone,
    ) -> impl Future<Output = Result<String, ProviderError>> + Send;
}

/// System and user instructions for drafting an email from `text`.
pub fn draft_prompts(text: &str, language: Language, tone: Tone) -> (&'static str, String) {
    let user = format!(
        "Language: {} ({}). Tone: {}. \
         Draft a short, clear, polite email based on this input:\n---\n{}\n---",
        language.english_name(),
        language.code(),
        tone,
        text
    );
    (SYSTEM_PROMPT, user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!("openai".parse::<ProviderKind>(), Ok(ProviderKind::OpenAi));
        assert_eq!(" GROQ ".parse::<ProviderKind>(), Ok(ProviderKind::Groq));
        assert!("anthropic".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_provider_profiles() {
        assert_eq!(ProviderKind::OpenAi.default_transcribe_model(), "whisper-1");
        assert_eq!(ProviderKind::Groq.default_transcribe_model(), "whisper-large-v3");
        assert!(ProviderKind::Groq.base_url().starts_with("https://api.groq.com/"));
        assert_eq!(ProviderKind::Groq.to_string(), "GROQ");
    }

    #[test]
    fn test_quota_signatures() {
        assert!(is_quota_error("API error 429: Too Many Requests"));
        assert!(is_quota_error("You exceeded your current quota: insufficient_quota"));
        assert!(is_quota_error("code: rate_limit_exceeded"));
        assert!(is_quota_error("HTTP429"));
        assert!(is_quota_error("error code 429Too Many Requests"));
        assert!(is_quota_error("upstream said e429"));
        assert!(is_quota_error("status=429"));
        assert!(!is_quota_error("API error 401: invalid api key"));
        assert!(!is_quota_error("HTTP error: connection reset"));
    }

    #[test]
    fn test_provider_error_quota() {
        let err = ProviderError::Completion(ApiError::Status {
            status: 429,
            body: "slow down".to_string(),
        });
        assert!(err.is_quota_exhausted());

        let err = ProviderError::Completion(ApiError::Parse("upstream said e429".to_string()));
        assert!(err.is_quota_exhausted());

        let err = ProviderError::Transcription(ApiError::Empty);
        assert!(!err.is_quota_exhausted());
        assert_eq!(err.to_string(), "transcription failed: empty response");
    }

    #[test]
    fn test_draft_prompts() {
        let (system, user) = draft_prompts("meeting moved to friday", Language::Ua, Tone::Firm);
        assert!(system.contains("Subject: <short subject>\n\n<body>"));
        assert!(user.starts_with("Language: Ukrainian (ua). Tone: firm."));
        assert!(user.ends_with("---\nmeeting moved to friday\n---"));
    }
}
