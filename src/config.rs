//! Configuration for the Floodgate limiter.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{ConfigError, FloodgateError, Result};

/// Default maximum identifier length in bytes.
pub const DEFAULT_MAX_IDENTIFIER_LEN: usize = 256;

/// Default idle TTL after which an identifier's state is evicted.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(300);

/// The accounting strategy used to count requests against capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Tokens refill continuously at `capacity / window` per second,
    /// capped at capacity. Allows smooth bursts up to capacity.
    TokenBucket,
    /// A counter resets at epoch-aligned window boundaries. Simple, but a
    /// boundary straddle can admit up to twice the capacity.
    FixedWindow,
    /// Two adjacent fixed-window counters blended by the elapsed fraction
    /// of the current window. Tighter than fixed window near boundaries.
    SlidingWindow,
}

impl Default for Algorithm {
    fn default() -> Self {
        Algorithm::TokenBucket
    }
}

/// Configuration for a rate limiter.
///
/// Immutable for the lifetime of a limiter instance; validated once at
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Maximum permits grantable to one identifier per window.
    pub capacity: u64,

    /// The time span over which capacity is enforced.
    #[serde(with = "duration_ms", rename = "window_ms")]
    pub window: Duration,

    /// Accounting strategy.
    #[serde(default)]
    pub algorithm: Algorithm,

    /// Maximum accepted identifier length in bytes.
    #[serde(default = "default_max_identifier_len")]
    pub max_identifier_len: usize,

    /// Idle time after which an identifier's state is evicted.
    #[serde(default = "default_idle_ttl", with = "duration_ms", rename = "idle_ttl_ms")]
    pub idle_ttl: Duration,
}

fn default_max_identifier_len() -> usize {
    DEFAULT_MAX_IDENTIFIER_LEN
}

fn default_idle_ttl() -> Duration {
    DEFAULT_IDLE_TTL
}

impl LimiterConfig {
    /// Create a configuration with the default algorithm and limits.
    pub fn new(capacity: u64, window: Duration) -> Self {
        Self {
            capacity,
            window,
            algorithm: Algorithm::default(),
            max_identifier_len: DEFAULT_MAX_IDENTIFIER_LEN,
            idle_ttl: DEFAULT_IDLE_TTL,
        }
    }

    /// Select the accounting algorithm.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Override the maximum identifier length.
    pub fn with_max_identifier_len(mut self, max: usize) -> Self {
        self.max_identifier_len = max;
        self
    }

    /// Override the idle TTL used for eviction.
    pub fn with_idle_ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = ttl;
        self
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::InvalidCapacity);
        }
        if self.window.is_zero() || self.idle_ttl.is_zero() {
            return Err(ConfigError::InvalidWindow);
        }
        Ok(())
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading limiter configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: LimiterConfig = serde_yaml::from_str(yaml)
            .map_err(|e| FloodgateError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// Serde helper storing a `Duration` as integer milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}
