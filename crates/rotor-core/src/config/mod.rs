//! Router configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: Hardcoded in struct `Default` implementations
//! 2. **Config file**: TOML file specified by `ROTOR_CONFIG` env var
//! 3. **Environment variables**: `ROTOR__*` env vars override specific fields
//!
//! # Configuration Sections
//!
//! - [`RotationConfig`]: cooldown length, failure threshold, attempt bounds
//! - [`ProvidersConfig`]: preferred and fallback endpoints with rate limits
//! - [`LoggingConfig`]: Log level and format
//! - [`MetricsConfig`]: Prometheus metrics toggle
//!
//! # Example
//!
//! ```toml
//! [rotation]
//! fallback_cooldown_calls = 50
//! attempt_timeout_ms = 10000
//!
//! [providers]
//! preferred = [
//!     { url = "https://polygon.drpc.org/", limit_per_minute = 100 },
//!     "https://polygon-rpc.com",
//! ]
//! fallback = ["https://polygon.api.onfinality.io/public"]
//! ```

use crate::upstream::{
    endpoint::EndpointConfig,
    pool::MAX_FALLBACK_ATTEMPTS,
    rotation::{RotationPolicy, FALLBACK_COOLDOWN_CALLS, MAX_CONSECUTIVE_FAILURES},
};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// Path used when `ROTOR_CONFIG` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "config/rotor.toml";

/// Tier switching and attempt bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Calls to stay on the fallback tier after every preferred provider failed.
    pub fallback_cooldown_calls: u32,

    /// Consecutive fallback failures that end a cooldown early.
    pub max_consecutive_failures: u32,

    /// Cap on fallback providers tried within one call.
    pub max_fallback_attempts: usize,

    /// Bound on a single attempt in milliseconds.
    pub attempt_timeout_ms: u64,

    /// Preferred provider the router starts on.
    pub starting_preferred_index: usize,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            fallback_cooldown_calls: FALLBACK_COOLDOWN_CALLS,
            max_consecutive_failures: MAX_CONSECUTIVE_FAILURES,
            max_fallback_attempts: MAX_FALLBACK_ATTEMPTS,
            attempt_timeout_ms: 30_000,
            starting_preferred_index: 0,
        }
    }
}

impl RotationConfig {
    #[must_use]
    pub fn policy(&self) -> RotationPolicy {
        RotationPolicy {
            fallback_cooldown_calls: self.fallback_cooldown_calls,
            max_consecutive_failures: self.max_consecutive_failures,
        }
    }

    #[must_use]
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

/// A provider entry: either a bare URL or a table with limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EndpointSpec {
    Url(String),
    Detailed(EndpointConfig),
}

impl EndpointSpec {
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Url(url) => url,
            Self::Detailed(config) => &config.url,
        }
    }
}

impl From<EndpointSpec> for EndpointConfig {
    fn from(spec: EndpointSpec) -> Self {
        match spec {
            EndpointSpec::Url(url) => EndpointConfig::new(url),
            EndpointSpec::Detailed(config) => config,
        }
    }
}

impl From<&EndpointSpec> for EndpointConfig {
    fn from(spec: &EndpointSpec) -> Self {
        spec.clone().into()
    }
}

/// The two provider tiers, each tried in order.
///
/// When the `[providers]` section is missing entirely the public Polygon set
/// below is used. A section that is present replaces both lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub preferred: Vec<EndpointSpec>,
    #[serde(default)]
    pub fallback: Vec<EndpointSpec>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        let limited = |url: &str, per_minute: u64| {
            EndpointSpec::Detailed(EndpointConfig::new(url).per_minute(per_minute))
        };
        let bare = |url: &str| EndpointSpec::Url(url.to_string());

        Self {
            preferred: vec![
                EndpointSpec::Detailed(
                    EndpointConfig::new("https://polygon.drpc.org/")
                        .per_minute(100)
                        .per_hour(1_000)
                        .per_day(25_000),
                ),
                limited("https://1rpc.io/matic", 70),
                limited("https://polygon-rpc.com", 70),
                limited("https://polygon-bor.publicnode.com", 100),
            ],
            fallback: vec![
                bare("https://polygon-mainnet.gateway.tatum.io/"),
                bare("https://api.noderpc.xyz/rpc-polygon-pos/public"),
                bare("https://endpoints.omniatech.io/v1/matic/mainnet/public"),
                bare("https://polygon.api.onfinality.io/public"),
                bare("https://poly.api.pocket.network/"),
                bare("https://polygon-public.nodies.app"),
            ],
        }
    }
}

impl ProvidersConfig {
    #[must_use]
    pub fn preferred_configs(&self) -> Vec<EndpointConfig> {
        self.preferred.iter().map(EndpointConfig::from).collect()
    }

    #[must_use]
    pub fn fallback_configs(&self) -> Vec<EndpointConfig> {
        self.fallback.iter().map(EndpointConfig::from).collect()
    }

    fn all(&self) -> impl Iterator<Item = &EndpointSpec> {
        self.preferred.iter().chain(&self.fallback)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., `info`, `rotor_core=debug`).
    pub level: String,

    /// Output format: `json` for structured logs, `pretty` for human-readable.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

/// Prometheus metrics configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Complete router configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotorConfig {
    #[serde(default)]
    pub rotation: RotationConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl RotorConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// Use `__` as a separator for nested fields
    /// (e.g., `ROTOR__ROTATION__ATTEMPT_TIMEOUT_MS=5000`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config_builder = Config::builder()
            .set_default("rotation.fallback_cooldown_calls", 50)?
            .set_default("rotation.max_consecutive_failures", 4)?
            .set_default("rotation.max_fallback_attempts", 4)?
            .set_default("rotation.attempt_timeout_ms", 30_000)?
            .set_default("rotation.starting_preferred_index", 0)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .set_default("metrics.enabled", true)?
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(Environment::with_prefix("ROTOR").separator("__"))
            .build()?;

        config_builder.try_deserialize()
    }

    /// Loads configuration from `config/rotor.toml`, or the path in `ROTOR_CONFIG`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("ROTOR_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::from_file(&config_path)
    }

    /// Validates configuration values.
    ///
    /// Checks that:
    /// - At least one provider is configured
    /// - Every provider URL parses and uses `http` or `https`
    /// - Cooldown, failure threshold and attempt timeout are greater than zero
    /// - The starting index names a preferred provider
    /// - Logging format is either `"json"` or `"pretty"`
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.providers.preferred.is_empty() && self.providers.fallback.is_empty() {
            return Err("No RPC providers configured".to_string());
        }

        for spec in self.providers.all() {
            let raw = spec.url();
            if raw.is_empty() {
                return Err("Empty provider URL".to_string());
            }
            let parsed =
                url::Url::parse(raw).map_err(|e| format!("Invalid provider URL {raw}: {e}"))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(format!("Provider URL must use http or https: {raw}"));
            }
        }

        if self.rotation.fallback_cooldown_calls == 0 {
            return Err("Fallback cooldown calls must be greater than 0".to_string());
        }

        if self.rotation.max_consecutive_failures == 0 {
            return Err("Max consecutive failures must be greater than 0".to_string());
        }

        if self.rotation.attempt_timeout_ms == 0 {
            return Err("Attempt timeout must be greater than 0".to_string());
        }

        let preferred = self.providers.preferred.len();
        if preferred > 0 && self.rotation.starting_preferred_index >= preferred {
            return Err(format!(
                "Starting preferred index {} is out of range for {preferred} preferred provider(s)",
                self.rotation.starting_preferred_index
            ));
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        Ok(())
    }
}
