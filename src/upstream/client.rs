//! HTTP client for the AI completion backend.

use futures_util::future::BoxFuture;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::UpstreamConfig;
use crate::models::message::ChatMessage;
use crate::{AppError, Result};

use super::CompletionBackend;

/// One prior turn in the upstream request payload.
#[derive(Debug, Serialize)]
struct HistoryEntry<'a> {
    role: &'static str,
    content: &'a str,
}

/// Request body shared by the completion and start-stream calls.
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    message: &'a str,
    conversation_history: Vec<HistoryEntry<'a>>,
    system_prompt: &'a str,
    model: &'a str,
    temperature: f64,
    max_tokens: u32,
}

/// Response body of the blocking completion call.
#[derive(Debug, Deserialize)]
struct CompletionResponse {
    response: String,
}

/// Response body of the start-stream call.
#[derive(Debug, Deserialize)]
struct StartStreamResponse {
    stream_id: String,
}

/// Response body of the health probe.
#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

/// `reqwest`-backed [`CompletionBackend`] implementation.
pub struct AiServiceClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    system_fallback: String,
}

impl AiServiceClient {
    /// Build a client from the upstream configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the underlying HTTP client cannot be
    /// constructed.
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            system_fallback: config.system_prompt.clone(),
        })
    }

    fn request_body<'a>(
        &'a self,
        prompt: &'a str,
        history: &'a [ChatMessage],
        system_prompt: &'a str,
    ) -> CompletionRequest<'a> {
        let conversation_history = history
            .iter()
            .map(|message| HistoryEntry {
                role: message.role.as_str(),
                content: &message.content,
            })
            .collect();
        CompletionRequest {
            message: prompt,
            conversation_history,
            system_prompt: if system_prompt.is_empty() {
                &self.system_fallback
            } else {
                system_prompt
            },
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    fn check_status(status: StatusCode, call: &str) -> Result<()> {
        if status.is_success() {
            Ok(())
        } else {
            Err(AppError::UpstreamUnavailable(format!(
                "{call} returned {status}"
            )))
        }
    }
}

impl CompletionBackend for AiServiceClient {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
        history: &'a [ChatMessage],
        system_prompt: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let body = self.request_body(prompt, history, system_prompt);
            let response = self
                .http
                .post(format!("{}/chat", self.base_url))
                .json(&body)
                .send()
                .await?;
            Self::check_status(response.status(), "completion call")?;
            let parsed: CompletionResponse = response.json().await?;
            Ok(parsed.response)
        })
    }

    fn start_stream<'a>(
        &'a self,
        prompt: &'a str,
        history: &'a [ChatMessage],
        system_prompt: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let body = self.request_body(prompt, history, system_prompt);
            let response = self
                .http
                .post(format!("{}/chat/stream", self.base_url))
                .json(&body)
                .send()
                .await?;
            Self::check_status(response.status(), "start-stream call")?;
            let parsed: StartStreamResponse = response.json().await?;
            debug!(stream_id = %parsed.stream_id, "upstream stream opened");
            Ok(parsed.stream_id)
        })
    }

    fn fetch_chunk<'a>(&'a self, correlation_id: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let response = self
                .http
                .get(format!("{}/chat/stream/{correlation_id}", self.base_url))
                .header(ACCEPT, "text/event-stream")
                .send()
                .await?;
            Self::check_status(response.status(), "chunk fetch")?;
            Ok(response.text().await?)
        })
    }

    fn stop_stream<'a>(&'a self, correlation_id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let response = self
                .http
                .delete(format!("{}/chat/stream/{correlation_id}", self.base_url))
                .send()
                .await?;
            Self::check_status(response.status(), "stop-stream call")
        })
    }

    fn health(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let response = self
                .http
                .get(format!("{}/health", self.base_url))
                .send()
                .await;
            match response {
                Ok(response) if response.status().is_success() => response
                    .json::<HealthResponse>()
                    .await
                    .map(|health| health.status == "healthy")
                    .unwrap_or(false),
                _ => false,
            }
        })
    }
}
