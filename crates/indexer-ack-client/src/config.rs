//! Configuration for the ingestion client.
//!
//! Everything the client needs is passed in at construction time. Defaults
//! suit a local collector; `ClientConfig::from_env()` overrides them from
//! `INGEST_*` environment variables.

use crate::error::{IngestError, IngestResult};
use std::time::Duration;
use url::Url;

/// Where the channel id travels on ingestion requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelPlacement {
    /// `X-Splunk-Request-Channel` request header.
    #[default]
    Header,
    /// `channel` query parameter.
    Query,
}

/// What `submit` does when no pending slot is free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackpressureMode {
    /// Wait for a slot, forcing a poll cycle to free one.
    #[default]
    Wait,
    /// Fail the submission with a capacity error.
    Reject,
}

/// Ingestion and acknowledgment endpoint settings.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Base URL of the collector, e.g. `https://collector.example.com:8088`.
    pub base_url: String,
    /// Token presented on every request.
    pub token: String,
    /// Authorization scheme placed before the token.
    pub auth_scheme: String,
    /// How the channel id is attached to ingestion requests.
    pub channel_placement: ChannelPlacement,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8088".to_string(),
            token: String::new(),
            auth_scheme: "Splunk".to_string(),
            channel_placement: ChannelPlacement::Header,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Sender-level retry of transport failures.
#[derive(Debug, Clone)]
pub struct SendRetryConfig {
    /// Initial retry delay.
    pub initial_retry_delay: Duration,
    /// Maximum retry delay.
    pub max_retry_delay: Duration,
    /// Maximum attempts per send, including the first.
    pub max_send_retries: u32,
}

impl Default for SendRetryConfig {
    fn default() -> Self {
        Self {
            initial_retry_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(30),
            max_send_retries: 5,
        }
    }
}

impl SendRetryConfig {
    /// Delay before retry number `retry` (1-based), doubling up to the cap.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_retry_delay
            .saturating_mul(factor)
            .min(self.max_retry_delay)
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Endpoint settings
    pub endpoint: EndpointConfig,
    /// Transport retry settings
    pub send_retry: SendRetryConfig,
    /// Cadence of acknowledgment polls, expiry sweeps and idle checks.
    pub poll_interval: Duration,
    /// Age after which an unconfirmed handle expires and is resent.
    pub per_handle_timeout: Duration,
    /// Idle time after which an empty channel is retired.
    pub channel_idle_threshold: Duration,
    /// Ceiling on outstanding handles per channel.
    pub max_pending_per_channel: usize,
    /// Ceiling on outstanding handles across all channels.
    pub max_pending_total: usize,
    /// Maximum send attempts per payload before it is reported failed.
    pub max_attempts: u32,
    /// Behaviour at the pending ceiling.
    pub backpressure: BackpressureMode,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            send_retry: SendRetryConfig::default(),
            poll_interval: Duration::from_secs(2),
            per_handle_timeout: Duration::from_secs(60),
            channel_idle_threshold: Duration::from_secs(300),
            max_pending_per_channel: 1000,
            max_pending_total: 10_000,
            max_attempts: 5,
            backpressure: BackpressureMode::Wait,
        }
    }
}

impl ClientConfig {
    /// Build a configuration for the given collector and token.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint: EndpointConfig {
                base_url: base_url.into(),
                token: token.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Build a configuration from `INGEST_*` environment variables.
    ///
    /// Unset or unparseable values fall back to the defaults.
    pub fn from_env() -> IngestResult<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("INGEST_URL") {
            config.endpoint.base_url = url;
        }
        if let Ok(token) = std::env::var("INGEST_TOKEN") {
            config.endpoint.token = token;
        }
        if let Ok(scheme) = std::env::var("INGEST_AUTH_SCHEME") {
            config.endpoint.auth_scheme = scheme;
        }
        if let Some(ms) = env_parse::<u64>("INGEST_POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse::<u64>("INGEST_ACK_TIMEOUT_SECS") {
            config.per_handle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("INGEST_CHANNEL_IDLE_SECS") {
            config.channel_idle_threshold = Duration::from_secs(secs);
        }
        if let Some(n) = env_parse::<usize>("INGEST_MAX_PENDING_PER_CHANNEL") {
            config.max_pending_per_channel = n;
        }
        if let Some(n) = env_parse::<usize>("INGEST_MAX_PENDING_TOTAL") {
            config.max_pending_total = n;
        }
        if let Some(n) = env_parse::<u32>("INGEST_MAX_ATTEMPTS") {
            config.max_attempts = n;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the client cannot run with.
    pub fn validate(&self) -> IngestResult<()> {
        Url::parse(&self.endpoint.base_url).map_err(|e| {
            IngestError::Config(format!("invalid base URL {}: {}", self.endpoint.base_url, e))
        })?;
        if self.endpoint.token.trim().is_empty() {
            return Err(IngestError::Config("missing ingestion token".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(IngestError::Config("poll interval must be non-zero".to_string()));
        }
        if self.per_handle_timeout.is_zero() {
            return Err(IngestError::Config("ack timeout must be non-zero".to_string()));
        }
        if self.max_pending_per_channel == 0 || self.max_pending_total == 0 {
            return Err(IngestError::Config("pending ceilings must be non-zero".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(IngestError::Config("max attempts must be at least 1".to_string()));
        }
        if self.send_retry.max_send_retries == 0 {
            return Err(IngestError::Config("max send retries must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
