//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` bind address (default: `"0.0.0.0"`)
/// - `PORT` listen port (default: `3000`)
/// - `RUST_LOG` tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` `text` or `json` (default: `text`)
/// - `DATABASE_URL` PostgreSQL ledger; unset keeps rows in memory
/// - `REDIS_URL` Redis cache; unset uses the in-memory cache
/// - `KAFKA_BROKERS` Kafka-compatible brokers; unset uses the in-process bus
/// - `KAFKA_TIMEOUT_SECS` broker publish timeout (default: `5`)
/// - `CACHE_TTL_SECS` cache entry lifetime (default: `600`)
/// - `STRIPE_SECRET_KEY` gateway key; unset uses the in-memory gateway
/// - `STRIPE_API_BASE` gateway base URL (default: `https://api.stripe.com`)
/// - `STRIPE_WEBHOOK_SECRET` webhook signing secret; unset rejects webhooks
/// - `WEBHOOK_TOLERANCE_SECS` accepted webhook clock skew (default: `300`)
/// - `GATEWAY_TIMEOUT_SECS` gateway request timeout (default: `10`)
/// - `PENDING_ORDER_MAX_AGE_SECS` age at which pending orders are cancelled (default: `1800`)
/// - `SWEEP_INTERVAL_SECS` how often the stale-order sweep runs (default: `60`)
#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub kafka_brokers: Option<String>,
    pub kafka_timeout: Duration,
    pub cache_ttl: Duration,
    pub stripe_secret_key: Option<String>,
    pub stripe_api_base: String,
    pub stripe_webhook_secret: Option<String>,
    pub webhook_tolerance: Duration,
    pub gateway_timeout: Duration,
    pub pending_order_max_age: Duration,
    pub sweep_interval: Duration,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .field("redis_url", &self.redis_url.as_ref().map(|_| "<set>"))
            .field("kafka_brokers", &self.kafka_brokers)
            .field("kafka_timeout", &self.kafka_timeout)
            .field("cache_ttl", &self.cache_ttl)
            .field("stripe_secret_key", &self.stripe_secret_key.as_ref().map(|_| "<redacted>"))
            .field("stripe_api_base", &self.stripe_api_base)
            .field(
                "stripe_webhook_secret",
                &self.stripe_webhook_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("webhook_tolerance", &self.webhook_tolerance)
            .field("gateway_timeout", &self.gateway_timeout)
            .field("pending_order_max_age", &self.pending_order_max_age)
            .field("sweep_interval", &self.sweep_interval)
            .finish()
    }
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let secs = |key: &str, default: Duration| {
            text(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            host: text("HOST").unwrap_or(defaults.host),
            port: text("PORT")
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(defaults.port),
            log_level: text("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: text("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            database_url: text("DATABASE_URL"),
            redis_url: text("REDIS_URL"),
            kafka_brokers: text("KAFKA_BROKERS"),
            kafka_timeout: secs("KAFKA_TIMEOUT_SECS", defaults.kafka_timeout),
            cache_ttl: secs("CACHE_TTL_SECS", defaults.cache_ttl),
            stripe_secret_key: text("STRIPE_SECRET_KEY"),
            stripe_api_base: text("STRIPE_API_BASE").unwrap_or(defaults.stripe_api_base),
            stripe_webhook_secret: text("STRIPE_WEBHOOK_SECRET"),
            webhook_tolerance: secs("WEBHOOK_TOLERANCE_SECS", defaults.webhook_tolerance),
            gateway_timeout: secs("GATEWAY_TIMEOUT_SECS", defaults.gateway_timeout),
            pending_order_max_age: secs("PENDING_ORDER_MAX_AGE_SECS", defaults.pending_order_max_age),
            sweep_interval: secs("SWEEP_INTERVAL_SECS", defaults.sweep_interval),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            redis_url: None,
            kafka_brokers: None,
            kafka_timeout: Duration::from_secs(5),
            cache_ttl: domain::DEFAULT_CACHE_TTL,
            stripe_secret_key: None,
            stripe_api_base: "https://api.stripe.com".to_string(),
            stripe_webhook_secret: None,
            webhook_tolerance: gateway::DEFAULT_TOLERANCE,
            gateway_timeout: Duration::from_secs(10),
            pending_order_max_age: domain::order::DEFAULT_PENDING_MAX_AGE,
            sweep_interval: Duration::from_secs(60),
        }
    }
}
