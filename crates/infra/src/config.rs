//! Batching configuration.

use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_MAX_BATCH_SIZE: i64 = 10;

/// Batching configuration.
///
/// Loaded by the host (environment or a JSON document); the coordinator only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Install the interceptors at all. When off, dispatches go straight to the queue.
    pub enabled: bool,
    /// Execute wrapper tasks inline instead of enqueueing them (deterministic tests).
    pub synchronous_testing: bool,
    /// Maximum number of buffered items per wrapper task. Values below 1 act as 1.
    pub max_batch_size: i64,
    /// Whether the host should bracket each request with a batching scope.
    pub enable_middleware: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            synchronous_testing: false,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            enable_middleware: true,
        }
    }
}

impl BatchConfig {
    /// Read `BATCH_DISPATCHER_*` variables, falling back to defaults.
    ///
    /// `synchronous_testing` defaults to on when `APP_ENV=testing`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`BatchConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let testing = lookup("APP_ENV").is_some_and(|env| env == "testing");

        Self {
            enabled: parse_bool(&lookup, "BATCH_DISPATCHER_ENABLED", defaults.enabled),
            synchronous_testing: parse_bool(&lookup, "BATCH_DISPATCHER_SYNC_TESTING", testing),
            max_batch_size: match lookup("BATCH_DISPATCHER_MAX_SIZE") {
                Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                    warn!(
                        key = "BATCH_DISPATCHER_MAX_SIZE",
                        value = %raw,
                        "invalid integer, using default"
                    );
                    defaults.max_batch_size
                }),
                None => defaults.max_batch_size,
            },
            enable_middleware: parse_bool(
                &lookup,
                "BATCH_DISPATCHER_ENABLE_MIDDLEWARE",
                defaults.enable_middleware,
            ),
        }
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn with_synchronous_testing(mut self, on: bool) -> Self {
        self.synchronous_testing = on;
        self
    }

    pub fn with_max_batch_size(mut self, max: i64) -> Self {
        self.max_batch_size = max;
        self
    }

    pub fn with_enabled(mut self, on: bool) -> Self {
        self.enabled = on;
        self
    }

    /// Chunk size actually used by the flush (never below 1).
    pub fn effective_batch_size(&self) -> usize {
        usize::try_from(self.max_batch_size.max(1)).unwrap_or(usize::MAX)
    }
}

fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    let Some(raw) = lookup(key) else {
        return default;
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => true,
        "0" | "false" | "off" | "no" | "" => false,
        _ => {
            warn!(key, value = %raw, "invalid boolean, using default");
            default
        }
    }
}
