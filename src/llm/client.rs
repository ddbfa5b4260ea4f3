//! Generative text client.
//!
//! The engine only ever needs one complete text blob per call; the
//! streaming variant exists so a presentation layer can render tokens as
//! they arrive, and the buffered path is just a fold over the same stream
//! shape. Everything behind the `GenerativeClient` trait so the phase
//! controller can be driven by a test double.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Service rate limited")]
    RateLimited,

    #[error("Service error: {status} - {message}")]
    Status { status: u16, message: String },

    #[error("Completion contained no content")]
    EmptyCompletion,

    #[error("Stream error: {0}")]
    Stream(String),
}

pub type Result<T> = std::result::Result<T, LlmError>;

/// One chat turn sent to the service
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Per-call generation settings; the timeout is tiered by phase cost
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            max_tokens: 1024,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Incremental text chunks with an explicit end (stream exhaustion)
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Seam between the phase controller and the generative service
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    /// Buffered generation: one complete text blob
    async fn generate(
        &self,
        system: &str,
        messages: &[ChatMessage],
        options: &GenerateOptions,
    ) -> Result<String>;

    /// Streaming generation; the buffered path is a fold over this
    async fn generate_stream(
        &self,
        system: &str,
        messages: &[ChatMessage],
        options: &GenerateOptions,
    ) -> Result<TextStream>;
}

/// Fold a text stream into the single blob the extractor needs
pub async fn collect_stream(mut stream: TextStream) -> Result<String> {
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        text.push_str(&chunk?);
    }
    if text.is_empty() {
        return Err(LlmError::EmptyCompletion);
    }
    Ok(text)
}

/// Fixed backoff before the single automatic retry on a rate-limit signal
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(2);

/// Client for an OpenAI-compatible chat-completions endpoint
pub struct HttpGenerativeClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpGenerativeClient {
    pub fn new(base_url: String, api_key: Option<String>, model: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }

    fn request(
        &self,
        system: &str,
        messages: &[ChatMessage],
        options: &GenerateOptions,
        stream: bool,
    ) -> reqwest::RequestBuilder {
        let mut wire_messages = vec![serde_json::json!({
            "role": "system",
            "content": system,
        })];
        for message in messages {
            wire_messages.push(serde_json::json!({
                "role": message.role,
                "content": message.content,
            }));
        }

        let body = serde_json::json!({
            "model": self.model,
            "messages": wire_messages,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
            "stream": stream,
        });

        let mut builder = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .timeout(options.timeout)
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    async fn generate_once(
        &self,
        system: &str,
        messages: &[ChatMessage],
        options: &GenerateOptions,
    ) -> Result<String> {
        let response = self.request(system, messages, options, false).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let completion: ChatCompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::EmptyCompletion)
    }
}

#[async_trait]
impl GenerativeClient for HttpGenerativeClient {
    async fn generate(
        &self,
        system: &str,
        messages: &[ChatMessage],
        options: &GenerateOptions,
    ) -> Result<String> {
        match self.generate_once(system, messages, options).await {
            Err(LlmError::RateLimited) => {
                // One bounded retry with fixed backoff, then surface
                log::warn!("Generative service rate limited; retrying once");
                tokio::time::sleep(RATE_LIMIT_BACKOFF).await;
                self.generate_once(system, messages, options).await
            }
            other => other,
        }
    }

    async fn generate_stream(
        &self,
        system: &str,
        messages: &[ChatMessage],
        options: &GenerateOptions,
    ) -> Result<TextStream> {
        let builder = self.request(system, messages, options, true);
        let mut source =
            EventSource::new(builder).map_err(|e| LlmError::Stream(e.to_string()))?;

        let stream = async_stream::stream! {
            while let Some(event) = source.next().await {
                match event {
                    Ok(Event::Open) => {}
                    Ok(Event::Message(message)) => {
                        if message.data == "[DONE]" {
                            break;
                        }
                        match serde_json::from_str::<StreamChunk>(&message.data) {
                            Ok(chunk) => {
                                let delta = chunk
                                    .choices
                                    .into_iter()
                                    .next()
                                    .and_then(|c| c.delta.content)
                                    .unwrap_or_default();
                                if !delta.is_empty() {
                                    yield Ok(delta);
                                }
                            }
                            Err(e) => {
                                yield Err(LlmError::Stream(e.to_string()));
                                break;
                            }
                        }
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(e) => {
                        yield Err(LlmError::Stream(e.to_string()));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collect_stream_folds_chunks() {
        let chunks: Vec<Result<String>> =
            vec![Ok("Good ".to_string()), Ok("morning".to_string())];
        let stream: TextStream = Box::pin(futures_util::stream::iter(chunks));
        assert_eq!(collect_stream(stream).await.unwrap(), "Good morning");
    }

    #[tokio::test]
    async fn test_collect_stream_empty_is_an_error() {
        let stream: TextStream =
            Box::pin(futures_util::stream::iter(Vec::<Result<String>>::new()));
        assert!(matches!(
            collect_stream(stream).await,
            Err(LlmError::EmptyCompletion)
        ));
    }

    #[tokio::test]
    async fn test_collect_stream_surfaces_mid_stream_error() {
        let chunks: Vec<Result<String>> = vec![
            Ok("partial".to_string()),
            Err(LlmError::Stream("connection reset".to_string())),
        ];
        let stream: TextStream = Box::pin(futures_util::stream::iter(chunks));
        assert!(collect_stream(stream).await.is_err());
    }
}
