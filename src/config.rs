use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::relay::provider::ProviderKind;
use crate::relay::{ChatSession, Language, ProviderSettings, Tone};

/// Errors that can occur when loading configuration. All are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set (environment or .env)")]
    Missing(&'static str),
    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

pub struct Config {
    pub telegram_bot_token: String,
    pub provider: ProviderSettings,
    /// Language and tone for chats that have not chosen their own.
    pub defaults: ChatSession,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Long-poll wait passed to `getUpdates`.
    pub poll_timeout_secs: u32,
    pub poll_retry: Duration,
    pub poll_retry_max: Duration,
    /// Where downloaded audio is stored while it is transcribed.
    pub audio_tmp_dir: Option<PathBuf>,
    pub log_dir: PathBuf,
    /// Chat that receives warnings and errors.
    pub log_chat_id: Option<i64>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the config from a variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let telegram_bot_token =
            get("TELEGRAM_BOT_TOKEN").ok_or(ConfigError::Missing("TELEGRAM_BOT_TOKEN"))?;
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        match telegram_bot_token.split_once(':') {
            Some((id, secret)) if id.parse::<u64>().is_ok() && !secret.is_empty() => {}
            _ => {
                return Err(ConfigError::Invalid {
                    var: "TELEGRAM_BOT_TOKEN",
                    reason: "expected format <numeric bot id>:<secret>".into(),
                });
            }
        }

        let kind: ProviderKind = parse_or(&get, "PROVIDER", ProviderKind::OpenAi)?;
        let api_key_var = kind.api_key_var();
        let api_key = get(api_key_var).ok_or(ConfigError::Missing(api_key_var))?;

        let chat_model = get(kind.chat_model_var())
            .unwrap_or_else(|| kind.default_chat_model().to_string());
        let transcribe_model = get("TRANSCRIBE_MODEL")
            .unwrap_or_else(|| kind.default_transcribe_model().to_string());

        let defaults = ChatSession {
            language: parse_or(&get, "DEFAULT_LANG", Language::Pl)?,
            tone: parse_or(&get, "DEFAULT_TONE", Tone::Formal)?,
        };

        let connect_timeout = Duration::from_secs(parse_or(&get, "CONNECT_TIMEOUT_SECS", 15)?);
        let read_timeout = Duration::from_secs(parse_or(&get, "READ_TIMEOUT_SECS", 90)?);
        let poll_timeout_secs: u32 = parse_or(&get, "POLL_TIMEOUT_SECS", 25)?;
        if u64::from(poll_timeout_secs) >= read_timeout.as_secs() {
            return Err(ConfigError::Invalid {
                var: "POLL_TIMEOUT_SECS",
                reason: format!(
                    "long-poll wait {poll_timeout_secs}s must be shorter than READ_TIMEOUT_SECS ({}s)",
                    read_timeout.as_secs()
                ),
            });
        }

        Ok(Self {
            telegram_bot_token,
            provider: ProviderSettings {
                kind,
                api_key,
                chat_model,
                transcribe_model,
                connect_timeout,
                read_timeout,
            },
            defaults,
            connect_timeout,
            read_timeout,
            poll_timeout_secs,
            poll_retry: Duration::from_secs(parse_or(&get, "POLL_RETRY_SECS", 3)?),
            poll_retry_max: Duration::from_secs(parse_or(&get, "POLL_RETRY_MAX_SECS", 60)?),
            audio_tmp_dir: get("AUDIO_TMP_DIR").map(PathBuf::from),
            log_dir: get("LOG_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("logs")),
            log_chat_id: get("LOG_CHAT_ID").map(|v| parse_value("LOG_CHAT_ID", &v)).transpose()?,
        })
    }
}

fn parse_or<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        Some(value) => parse_value(var, &value),
        None => Ok(default),
    }
}

fn parse_value<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        reason: format!("'{value}': {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const TOKEN: &str = "123456789:ABCdefGHIjklMNOpqrsTUVwxyz";

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|var| map.get(var).cloned())
    }

    fn assert_err(result: Result<Config, ConfigError>) -> ConfigError {
        match result {
            Ok(_) => panic!("expected error, got Ok"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_minimal_openai_config() {
        let config = load(&[("TELEGRAM_BOT_TOKEN", TOKEN), ("OPENAI_API_KEY", "sk-1")])
            .expect("should load minimal config");
        assert_eq!(config.provider.kind, ProviderKind::OpenAi);
        assert_eq!(config.provider.api_key, "sk-1");
        assert_eq!(config.provider.chat_model, "gpt-4o-mini");
        assert_eq!(config.provider.transcribe_model, "whisper-1");
        assert_eq!(config.defaults.language, Language::Pl);
        assert_eq!(config.defaults.tone, Tone::Formal);
        assert_eq!(config.connect_timeout, Duration::from_secs(15));
        assert_eq!(config.read_timeout, Duration::from_secs(90));
        assert_eq!(config.poll_timeout_secs, 25);
        assert_eq!(config.poll_retry, Duration::from_secs(3));
        assert_eq!(config.log_dir, PathBuf::from("logs"));
        assert!(config.log_chat_id.is_none());
        assert!(config.audio_tmp_dir.is_none());
    }

    #[test]
    fn test_groq_config() {
        let config = load(&[
            ("TELEGRAM_BOT_TOKEN", TOKEN),
            ("PROVIDER", "Groq"),
            ("GROQ_API_KEY", "gsk-1"),
            ("GROQ_CHAT_MODEL", "llama-3.3-70b-versatile"),
            ("DEFAULT_LANG", "UA"),
            ("DEFAULT_TONE", "friendly"),
            ("LOG_CHAT_ID", "-100123"),
        ])
        .unwrap();
        assert_eq!(config.provider.kind, ProviderKind::Groq);
        assert_eq!(config.provider.chat_model, "llama-3.3-70b-versatile");
        assert_eq!(config.provider.transcribe_model, "whisper-large-v3");
        assert_eq!(config.defaults.language, Language::Ua);
        assert_eq!(config.defaults.tone, Tone::Friendly);
        assert_eq!(config.log_chat_id, Some(-100123));
    }

    #[test]
    fn test_missing_token() {
        let err = assert_err(load(&[("OPENAI_API_KEY", "sk-1")]));
        assert!(matches!(err, ConfigError::Missing("TELEGRAM_BOT_TOKEN")));
    }

    #[test]
    fn test_blank_token_is_missing() {
        let err = assert_err(load(&[("TELEGRAM_BOT_TOKEN", "  "), ("OPENAI_API_KEY", "sk-1")]));
        assert!(matches!(err, ConfigError::Missing("TELEGRAM_BOT_TOKEN")));
    }

    #[test]
    fn test_invalid_token_format() {
        for token in ["invalid_token_no_colon", "notanumber:ABCdef", "123456789:"] {
            let err = assert_err(load(&[("TELEGRAM_BOT_TOKEN", token), ("OPENAI_API_KEY", "sk-1")]));
            assert!(matches!(err, ConfigError::Invalid { var: "TELEGRAM_BOT_TOKEN", .. }));
            assert!(!err.to_string().contains(token));
        }
    }

    #[test]
    fn test_missing_key_for_selected_provider() {
        let err = assert_err(load(&[
            ("TELEGRAM_BOT_TOKEN", TOKEN),
            ("PROVIDER", "groq"),
            ("OPENAI_API_KEY", "sk-1"),
        ]));
        assert!(matches!(err, ConfigError::Missing("GROQ_API_KEY")));
        assert!(err.to_string().contains("GROQ_API_KEY"));
    }

    #[test]
    fn test_unknown_provider() {
        let err = assert_err(load(&[
            ("TELEGRAM_BOT_TOKEN", TOKEN),
            ("PROVIDER", "mistral"),
            ("OPENAI_API_KEY", "sk-1"),
        ]));
        assert!(matches!(err, ConfigError::Invalid { var: "PROVIDER", .. }));
    }

    #[test]
    fn test_invalid_defaults() {
        let err = assert_err(load(&[
            ("TELEGRAM_BOT_TOKEN", TOKEN),
            ("OPENAI_API_KEY", "sk-1"),
            ("DEFAULT_LANG", "de"),
        ]));
        assert!(matches!(err, ConfigError::Invalid { var: "DEFAULT_LANG", .. }));

        let err = assert_err(load(&[
            ("TELEGRAM_BOT_TOKEN", TOKEN),
            ("OPENAI_API_KEY", "sk-1"),
            ("DEFAULT_TONE", "sarcastic"),
        ]));
        assert!(matches!(err, ConfigError::Invalid { var: "DEFAULT_TONE", .. }));
    }

    #[test]
    fn test_invalid_numbers() {
        let err = assert_err(load(&[
            ("TELEGRAM_BOT_TOKEN", TOKEN),
            ("OPENAI_API_KEY", "sk-1"),
            ("POLL_RETRY_SECS", "soon"),
        ]));
        assert!(matches!(err, ConfigError::Invalid { var: "POLL_RETRY_SECS", .. }));
    }

    #[test]
    fn test_long_poll_must_fit_read_timeout() {
        let err = assert_err(load(&[
            ("TELEGRAM_BOT_TOKEN", TOKEN),
            ("OPENAI_API_KEY", "sk-1"),
            ("POLL_TIMEOUT_SECS", "60"),
            ("READ_TIMEOUT_SECS", "30"),
        ]));
        assert!(matches!(err, ConfigError::Invalid { var: "POLL_TIMEOUT_SECS", .. }));
    }
}
