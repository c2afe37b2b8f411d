//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Environment variable holding the JWT signing secret.
///
/// Secrets are loaded at runtime from the environment, never from the TOML
/// config file.
pub const JWT_SECRET_ENV: &str = "CHAT_RELAY_JWT_SECRET";

/// Nested configuration for the AI completion backend.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct UpstreamConfig {
    /// Base URL of the completion service, e.g. `http://localhost:8000`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-call network timeout.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// Model name forwarded with every request.
    #[serde(default = "default_model")]
    pub model: String,
    /// Sampling temperature forwarded with every request.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Maximum completion tokens forwarded with every request.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// System prompt applied to every chat turn.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_base_url() -> String {
    "http://localhost:8000".into()
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_model() -> String {
    "gpt-3.5-turbo".into()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_system_prompt() -> String {
    "You are a helpful AI assistant.".into()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_seconds: default_request_timeout_seconds(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl UpstreamConfig {
    /// Per-call network timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Timing and capacity knobs for the streaming relay.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RelayConfig {
    /// Delay between upstream fetch polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Overall wall-clock budget for one upstream stream.
    #[serde(default = "default_stream_budget_seconds")]
    pub stream_budget_seconds: u64,
    /// Delay between paced tokens in the fallback strategy.
    #[serde(default = "default_pacer_delay_ms")]
    pub pacer_delay_ms: u64,
    /// Idle timeout after which an attached channel is force-closed.
    #[serde(default = "default_idle_timeout_seconds")]
    pub idle_timeout_seconds: u64,
    /// Window within which a created session must be attached before the
    /// reaper sweeps it.
    #[serde(default = "default_attach_window_seconds")]
    pub attach_window_seconds: u64,
    /// Most recent messages included as upstream request context.
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,
    /// Buffered frames per client channel before send applies backpressure.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_stream_budget_seconds() -> u64 {
    30
}

fn default_pacer_delay_ms() -> u64 {
    50
}

fn default_idle_timeout_seconds() -> u64 {
    60
}

fn default_attach_window_seconds() -> u64 {
    60
}

fn default_history_limit() -> u32 {
    10
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            stream_budget_seconds: default_stream_budget_seconds(),
            pacer_delay_ms: default_pacer_delay_ms(),
            idle_timeout_seconds: default_idle_timeout_seconds(),
            attach_window_seconds: default_attach_window_seconds(),
            history_limit: default_history_limit(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl RelayConfig {
    /// Delay between upstream fetch polls as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Wall-clock budget for one upstream stream as a [`Duration`].
    #[must_use]
    pub fn stream_budget(&self) -> Duration {
        Duration::from_secs(self.stream_budget_seconds)
    }

    /// Delay between paced tokens as a [`Duration`].
    #[must_use]
    pub fn pacer_delay(&self) -> Duration {
        Duration::from_millis(self.pacer_delay_ms)
    }

    /// Idle timeout for an attached channel as a [`Duration`].
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    /// Attach window for a created-but-unattached session as a [`Duration`].
    #[must_use]
    pub fn attach_window(&self) -> Duration {
        Duration::from_secs(self.attach_window_seconds)
    }
}

/// Bearer-token validation settings.
///
/// The signing secret is populated at runtime from [`JWT_SECRET_ENV`];
/// when empty, attach requests carrying a token are rejected.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AuthConfig {
    /// HS256 signing secret (populated at runtime).
    #[serde(skip)]
    pub jwt_secret: String,
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// TCP port the HTTP API binds on localhost.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Path of the `SQLite` database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// AI completion backend settings.
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Streaming relay settings.
    #[serde(default)]
    pub relay: RelayConfig,
    /// Bearer-token validation settings.
    #[serde(default)]
    pub auth: AuthConfig,
}

fn default_http_port() -> u16 {
    3000
}

fn default_db_path() -> PathBuf {
    PathBuf::from("chat-relay.db")
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            db_path: default_db_path(),
            upstream: UpstreamConfig::default(),
            relay: RelayConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Parse and validate configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing fails or a value is out of range.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.upstream.base_url.is_empty() {
            return Err(AppError::Config("upstream.base_url must not be empty".into()));
        }
        if self.relay.poll_interval_ms == 0 {
            return Err(AppError::Config("relay.poll_interval_ms must be positive".into()));
        }
        if self.relay.stream_budget_seconds == 0 {
            return Err(AppError::Config(
                "relay.stream_budget_seconds must be positive".into(),
            ));
        }
        if self.relay.history_limit == 0 {
            return Err(AppError::Config("relay.history_limit must be positive".into()));
        }
        if self.relay.channel_capacity == 0 {
            return Err(AppError::Config("relay.channel_capacity must be positive".into()));
        }
        Ok(())
    }

    /// Populate runtime secrets from the environment.
    ///
    /// A missing secret is not an error: anonymous attach still works, but
    /// any attach that does present a token is rejected.
    pub fn load_credentials(&mut self) {
        match env::var(JWT_SECRET_ENV) {
            Ok(secret) if !secret.trim().is_empty() => {
                self.auth.jwt_secret = secret;
            }
            _ => {
                warn!("{JWT_SECRET_ENV} not set; attach tokens will be rejected");
            }
        }
    }
}
