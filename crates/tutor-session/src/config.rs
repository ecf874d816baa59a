//! Voice tutor configuration.
//!
//! Configuration is loaded from environment variables with sensible
//! defaults. Only the credential endpoint URL is required; everything
//! else mirrors the hosted realtime API defaults.

use common::retry::RetryConfig;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default realtime negotiation endpoint.
pub const DEFAULT_REALTIME_URL: &str = "https://api.openai.com/v1/realtime";

/// Default realtime model identifier.
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-realtime-preview-2024-12-17";

/// Default tutor voice.
pub const DEFAULT_VOICE: &str = "sage";

/// Default hard session limit in seconds.
pub const DEFAULT_SESSION_LIMIT_SECONDS: u64 = 300;

/// Default credential refresh interval in seconds. Must stay shorter
/// than the server-side credential lifetime (about five minutes).
pub const DEFAULT_REFRESH_INTERVAL_SECONDS: u64 = 240;

/// Default cap on consecutive transport failures before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default HTTP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default wait for the control channel to open after negotiation.
pub const DEFAULT_CHANNEL_OPEN_TIMEOUT: Duration = Duration::from_secs(15);

/// Default session instructions sent in the `session.update` event.
pub const DEFAULT_INSTRUCTIONS: &str = "You are a warm and encouraging \
Mandarin tutor helping a learner practice Chinese New Year greetings. \
Teach one greeting at a time, say it slowly, ask the learner to repeat \
it, and praise genuine attempts. Keep every turn short.";

/// Voice tutor configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Credential endpoint URL (trusted backend issuing ephemeral keys).
    pub credential_url: String,

    /// Realtime negotiation endpoint URL.
    pub realtime_url: String,

    /// Target model, passed as the `model` query parameter.
    pub model: String,

    /// Tutor voice requested in `response.create`.
    pub voice: String,

    /// Session instructions (system prompt) for `session.update`.
    pub instructions: String,

    /// Hard session limit; the countdown starts here.
    pub session_limit_seconds: u64,

    /// Credential refresh cadence while active.
    pub refresh_interval: Duration,

    /// Consecutive transport failures tolerated before the session
    /// ends with a reconnect-exhausted error.
    pub max_reconnect_attempts: u32,

    /// HTTP request timeout for both endpoints.
    pub http_timeout: Duration,

    /// HTTP connect timeout for both endpoints.
    pub connect_timeout: Duration,

    /// How long to wait for the control channel to open.
    pub channel_open_timeout: Duration,

    /// Retry policy for the initial credential fetch.
    pub retry: RetryConfig,
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// An environment variable is set but cannot be parsed.
    #[error("invalid value for {var}: {message}")]
    InvalidVar {
        /// Variable name.
        var: &'static str,
        /// Parse failure detail.
        message: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

impl Config {
    /// Create a configuration with defaults for everything except the
    /// credential endpoint.
    #[must_use]
    pub fn new(credential_url: impl Into<String>) -> Self {
        Self {
            credential_url: credential_url.into(),
            realtime_url: DEFAULT_REALTIME_URL.to_string(),
            model: DEFAULT_REALTIME_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            session_limit_seconds: DEFAULT_SESSION_LIMIT_SECONDS,
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECONDS),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            channel_open_timeout: DEFAULT_CHANNEL_OPEN_TIMEOUT,
            retry: RetryConfig::default(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVar`] if `TUTOR_CREDENTIAL_URL`
    /// is unset, or [`ConfigError::InvalidVar`] if a numeric variable
    /// fails to parse or is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        let credential_url =
            env::var("TUTOR_CREDENTIAL_URL").map_err(|_| ConfigError::MissingVar("TUTOR_CREDENTIAL_URL"))?;

        let mut config = Self::new(credential_url);

        if let Ok(url) = env::var("TUTOR_REALTIME_URL") {
            config.realtime_url = url;
        }
        if let Ok(model) = env::var("TUTOR_REALTIME_MODEL") {
            config.model = model;
        }
        if let Ok(voice) = env::var("TUTOR_VOICE") {
            config.voice = voice;
        }
        if let Ok(instructions) = env::var("TUTOR_INSTRUCTIONS") {
            config.instructions = instructions;
        }

        config.session_limit_seconds =
            parse_var("TUTOR_SESSION_LIMIT_SECONDS", config.session_limit_seconds)?;
        config.refresh_interval = Duration::from_secs(parse_var(
            "TUTOR_REFRESH_INTERVAL_SECONDS",
            config.refresh_interval.as_secs(),
        )?);
        config.max_reconnect_attempts =
            parse_var("TUTOR_MAX_RECONNECT_ATTEMPTS", config.max_reconnect_attempts)?;

        if config.session_limit_seconds == 0 {
            return Err(ConfigError::InvalidVar {
                var: "TUTOR_SESSION_LIMIT_SECONDS",
                message: "session limit must be at least one second".to_string(),
            });
        }
        if config.refresh_interval.is_zero() {
            return Err(ConfigError::InvalidVar {
                var: "TUTOR_REFRESH_INTERVAL_SECONDS",
                message: "refresh interval must be at least one second".to_string(),
            });
        }

        Ok(config)
    }
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_var<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidVar {
            var,
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
