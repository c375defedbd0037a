//! Runtime configuration for the negotiator and the OpenAI-compatible oracle.

use std::env;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_MAX_ROUNDS: u32 = 30;
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MAX_TOKENS: u32 = 3000;

/// Bounds on a single negotiation.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct NegotiationConfig {
    /// How many oracle answers are judged before giving up.
    pub max_rounds: u32,

    /// Deadline for one oracle call. `None` waits forever.
    #[serde(with = "duration_secs_opt")]
    pub request_timeout: Option<Duration>,

    /// Consecutive unreachable-oracle failures tolerated before giving up.
    /// These do not count against `max_rounds`.
    pub max_transport_retries: u32,

    /// Delay before the first transport retry; doubled on every further retry.
    #[serde(with = "duration_millis")]
    pub transport_backoff: Duration,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            request_timeout: Some(Duration::from_secs(120)),
            max_transport_retries: 3,
            transport_backoff: Duration::from_millis(500),
        }
    }
}

/// Connection settings for an OpenAI-compatible chat completions endpoint.
#[derive(Deserialize, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: default_model(),
            base_url: default_base_url(),
            max_tokens: default_max_tokens(),
        }
    }

    /// Reads `OPENAI_API_KEY` (required), `OPENAI_MODEL` and `OPENAI_BASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key =
            env::var("OPENAI_API_KEY").map_err(|_| ConfigError::MissingVar("OPENAI_API_KEY"))?;
        if api_key.trim().is_empty() {
            return Err(ConfigError::InvalidVar {
                name: "OPENAI_API_KEY",
                reason: "empty".to_string(),
            });
        }

        let mut config = Self::new(api_key);
        if let Ok(model) = env::var("OPENAI_MODEL") {
            config.model = model;
        }
        if let Ok(base_url) = env::var("OPENAI_BASE_URL") {
            config.base_url = base_url;
        }
        Ok(config)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

fn default_model() -> String {
    DEFAULT_OPENAI_MODEL.to_string()
}

fn default_base_url() -> String {
    DEFAULT_OPENAI_BASE_URL.to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

mod duration_secs_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
