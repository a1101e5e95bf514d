//! Client for OpenAI-compatible transcription and chat completion endpoints.
//!
//! OpenAI and Groq expose the same API surface, so one client serves both;
//! only the base URL, key and model names differ.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::relay::provider::{
    draft_prompts, ApiError, Provider, ProviderError, ProviderKind, DRAFT_TEMPERATURE,
};
use crate::relay::session::{Language, Tone};

/// Connection settings and model names for one backend.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub api_key: String,
    pub chat_model: String,
    pub transcribe_model: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

pub struct HttpProvider {
    kind: ProviderKind,
    name: String,
    api_key: String,
    chat_model: String,
    transcribe_model: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl HttpProvider {
    pub fn new(settings: ProviderSettings) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.read_timeout)
            .build()?;

        Ok(Self {
            kind: settings.kind,
            name: settings.kind.to_string(),
            api_key: settings.api_key,
            chat_model: settings.chat_model,
            transcribe_model: settings.transcribe_model,
            http,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.kind.base_url(), endpoint)
    }

    async fn post_transcription(&self, audio: &Path) -> Result<String, ApiError> {
        let data = tokio::fs::read(audio).await?;
        let file_name = audio
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.oga")
            .to_string();
        debug!("Uploading {} bytes of audio as {}", data.len(), file_name);

        let form = Form::new()
            .text("model", self.transcribe_model.clone())
            .part("file", Part::bytes(data).file_name(file_name));

        let response = self
            .http
            .post(self.url("audio/transcriptions"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let response = check_status(response).await?;
        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;

        Ok(parsed.text.trim().to_string())
    }

    async fn post_chat(&self, system: &str, user: &str) -> Result<String, ApiError> {
        let request = ChatRequest {
            model: &self.chat_model,
            messages: [
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            temperature: DRAFT_TEMPERATURE,
        };

        let response = self
            .http
            .post(self.url("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let response = check_status(response).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(ApiError::Empty)?;

        let content = content.trim();
        if content.is_empty() {
            return Err(ApiError::Empty);
        }
        Ok(content.to_string())
    }
}

/// Turn a non-2xx response into `ApiError::Status`, keeping the body so
/// quota errors stay recognisable.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

impl Provider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn transcribe(&self, audio: &Path) -> Result<String, ProviderError> {
        let text = self
            .post_transcription(audio)
            .await
            .map_err(ProviderError::Transcription)?;
        info!("Transcribed {} chars with {}", text.chars().count(), self.transcribe_model);
        Ok(text)
    }

    async fn complete(
        &self,
        text: &str,
        language: Language,
        tone: Tone,
    ) -> Result<String, ProviderError> {
        let (system, user) = draft_prompts(text, language, tone);
        let draft = self
            .post_chat(system, &user)
            .await
            .map_err(ProviderError::Completion)?;
        info!("Drafted {} chars with {} ({language}, {tone})", draft.chars().count(), self.chat_model);
        Ok(draft)
    }
}
