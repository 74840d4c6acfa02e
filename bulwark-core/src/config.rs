//! Configuration types for tool execution
//!
//! [`ToolConfig`] can only be obtained through [`ToolConfigBuilder::build`] or through
//! deserialization, and both paths validate it, so an executor never sees inverted
//! jitter bounds at sleep time.

use crate::breaker::CircuitBreakerConfig;
use crate::error::{BulwarkError, ConfigError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_SOFT_TIMEOUT: Duration = Duration::from_millis(2000);
const DEFAULT_HARD_TIMEOUT: Duration = Duration::from_millis(4000);
const DEFAULT_RETRY_COUNT: u32 = 1;
const DEFAULT_JITTER_MIN: Duration = Duration::from_millis(200);
const DEFAULT_JITTER_MAX: Duration = Duration::from_millis(500);
const DEFAULT_BREAKER_FAILURES: u32 = 5;
const DEFAULT_BREAKER_WINDOW: Duration = Duration::from_secs(60);
const DEFAULT_BREAKER_HALF_OPEN: Duration = Duration::from_secs(30);

/// Per-call execution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ToolConfigSpec", into = "ToolConfigSpec")]
pub struct ToolConfig {
    soft_timeout: Duration,
    hard_timeout: Duration,
    retry_count: u32,
    jitter_min: Duration,
    jitter_max: Duration,
    breaker_failure_threshold: u32,
    breaker_window: Duration,
    breaker_half_open_delay: Duration,
    cache_ttl: Duration,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            soft_timeout: DEFAULT_SOFT_TIMEOUT,
            hard_timeout: DEFAULT_HARD_TIMEOUT,
            retry_count: DEFAULT_RETRY_COUNT,
            jitter_min: DEFAULT_JITTER_MIN,
            jitter_max: DEFAULT_JITTER_MAX,
            breaker_failure_threshold: DEFAULT_BREAKER_FAILURES,
            breaker_window: DEFAULT_BREAKER_WINDOW,
            breaker_half_open_delay: DEFAULT_BREAKER_HALF_OPEN,
            cache_ttl: Duration::ZERO,
        }
    }
}

impl ToolConfig {
    /// Start from the defaults
    pub fn builder() -> ToolConfigBuilder {
        ToolConfigBuilder::new()
    }

    /// Start from this config
    pub fn to_builder(&self) -> ToolConfigBuilder {
        ToolConfigBuilder {
            spec: ToolConfigSpec::from(self.clone()),
        }
    }

    /// Reserved. Carried and serialized, never consulted by the executor.
    pub fn soft_timeout(&self) -> Duration {
        self.soft_timeout
    }

    /// Deadline applied to each attempt independently
    pub fn hard_timeout(&self) -> Duration {
        self.hard_timeout
    }

    /// Retries after the first attempt
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Lower bound of the retry sleep
    pub fn jitter_min(&self) -> Duration {
        self.jitter_min
    }

    /// Upper bound of the retry sleep
    pub fn jitter_max(&self) -> Duration {
        self.jitter_max
    }

    /// Failures inside the window that open the breaker
    pub fn breaker_failure_threshold(&self) -> u32 {
        self.breaker_failure_threshold
    }

    /// Width of the sliding failure window
    pub fn breaker_window(&self) -> Duration {
        self.breaker_window
    }

    /// Cooldown before an open breaker admits a trial call
    pub fn breaker_half_open_delay(&self) -> Duration {
        self.breaker_half_open_delay
    }

    /// Cache lifetime of a fresh result; zero disables caching
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Breaker settings derived from this config
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.breaker_failure_threshold,
            failure_window: self.breaker_window,
            half_open_delay: self.breaker_half_open_delay,
        }
    }

    /// Draw a retry delay uniformly from `[jitter_min, jitter_max]`
    pub fn sample_jitter(&self) -> Duration {
        if self.jitter_min == self.jitter_max {
            return self.jitter_min;
        }
        rand::thread_rng().gen_range(self.jitter_min..=self.jitter_max)
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.jitter_min > self.jitter_max {
            return Err(ConfigError::JitterBounds {
                min: self.jitter_min,
                max: self.jitter_max,
            });
        }
        if self.hard_timeout.is_zero() {
            return Err(ConfigError::ZeroHardTimeout);
        }
        if self.breaker_failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        Ok(self)
    }
}

/// Builder for [`ToolConfig`]
#[derive(Debug, Clone)]
pub struct ToolConfigBuilder {
    spec: ToolConfigSpec,
}

impl ToolConfigBuilder {
    /// Create a builder seeded with defaults
    pub fn new() -> Self {
        Self {
            spec: ToolConfigSpec::from(ToolConfig::default()),
        }
    }

    /// Set the reserved soft timeout
    pub fn soft_timeout(mut self, timeout: Duration) -> Self {
        self.spec.soft_timeout = timeout;
        self
    }

    /// Set the per-attempt deadline
    pub fn hard_timeout(mut self, timeout: Duration) -> Self {
        self.spec.hard_timeout = timeout;
        self
    }

    /// Set the number of retries
    pub fn retry_count(mut self, retries: u32) -> Self {
        self.spec.retry_count = retries;
        self
    }

    /// Set both jitter bounds
    pub fn jitter(mut self, min: Duration, max: Duration) -> Self {
        self.spec.jitter_min = min;
        self.spec.jitter_max = max;
        self
    }

    /// Set the breaker failure threshold
    pub fn breaker_failure_threshold(mut self, threshold: u32) -> Self {
        self.spec.breaker_failure_threshold = threshold;
        self
    }

    /// Set the breaker failure window
    pub fn breaker_window(mut self, window: Duration) -> Self {
        self.spec.breaker_window = window;
        self
    }

    /// Set the breaker half-open delay
    pub fn breaker_half_open_delay(mut self, delay: Duration) -> Self {
        self.spec.breaker_half_open_delay = delay;
        self
    }

    /// Set the cache TTL (zero disables caching)
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.spec.cache_ttl = ttl;
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<ToolConfig, ConfigError> {
        ToolConfig::try_from(self.spec)
    }

    fn apply(mut self, overrides: &ToolOverrides) -> Self {
        let spec = &mut self.spec;
        if let Some(v) = overrides.soft_timeout {
            spec.soft_timeout = v;
        }
        if let Some(v) = overrides.hard_timeout {
            spec.hard_timeout = v;
        }
        if let Some(v) = overrides.retry_count {
            spec.retry_count = v;
        }
        if let Some(v) = overrides.jitter_min {
            spec.jitter_min = v;
        }
        if let Some(v) = overrides.jitter_max {
            spec.jitter_max = v;
        }
        if let Some(v) = overrides.breaker_failure_threshold {
            spec.breaker_failure_threshold = v;
        }
        if let Some(v) = overrides.breaker_window {
            spec.breaker_window = v;
        }
        if let Some(v) = overrides.breaker_half_open_delay {
            spec.breaker_half_open_delay = v;
        }
        if let Some(v) = overrides.cache_ttl {
            spec.cache_ttl = v;
        }
        self
    }
}

impl Default for ToolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Wire form of [`ToolConfig`]; every field falls back to its default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct ToolConfigSpec {
    #[serde(with = "humantime_serde")]
    soft_timeout: Duration,
    #[serde(with = "humantime_serde")]
    hard_timeout: Duration,
    retry_count: u32,
    #[serde(with = "humantime_serde")]
    jitter_min: Duration,
    #[serde(with = "humantime_serde")]
    jitter_max: Duration,
    breaker_failure_threshold: u32,
    #[serde(with = "humantime_serde")]
    breaker_window: Duration,
    #[serde(with = "humantime_serde")]
    breaker_half_open_delay: Duration,
    #[serde(with = "humantime_serde")]
    cache_ttl: Duration,
}

impl Default for ToolConfigSpec {
    fn default() -> Self {
        ToolConfig::default().into()
    }
}

impl From<ToolConfig> for ToolConfigSpec {
    fn from(c: ToolConfig) -> Self {
        Self {
            soft_timeout: c.soft_timeout,
            hard_timeout: c.hard_timeout,
            retry_count: c.retry_count,
            jitter_min: c.jitter_min,
            jitter_max: c.jitter_max,
            breaker_failure_threshold: c.breaker_failure_threshold,
            breaker_window: c.breaker_window,
            breaker_half_open_delay: c.breaker_half_open_delay,
            cache_ttl: c.cache_ttl,
        }
    }
}

impl TryFrom<ToolConfigSpec> for ToolConfig {
    type Error = ConfigError;

    fn try_from(s: ToolConfigSpec) -> Result<Self, Self::Error> {
        ToolConfig {
            soft_timeout: s.soft_timeout,
            hard_timeout: s.hard_timeout,
            retry_count: s.retry_count,
            jitter_min: s.jitter_min,
            jitter_max: s.jitter_max,
            breaker_failure_threshold: s.breaker_failure_threshold,
            breaker_window: s.breaker_window,
            breaker_half_open_delay: s.breaker_half_open_delay,
            cache_ttl: s.cache_ttl,
        }
        .validate()
    }
}

/// Partial per-tool settings layered over [`BulwarkConfig::defaults`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolOverrides {
    /// Reserved soft timeout
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub soft_timeout: Option<Duration>,
    /// Per-attempt deadline
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub hard_timeout: Option<Duration>,
    /// Retries after the first attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    /// Lower jitter bound
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub jitter_min: Option<Duration>,
    /// Upper jitter bound
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub jitter_max: Option<Duration>,
    /// Breaker failure threshold
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breaker_failure_threshold: Option<u32>,
    /// Breaker window
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub breaker_window: Option<Duration>,
    /// Breaker half-open delay
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub breaker_half_open_delay: Option<Duration>,
    /// Cache TTL
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub cache_ttl: Option<Duration>,
}

/// Main configuration: shared defaults plus per-tool overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulwarkConfig {
    /// Settings applied to every tool
    #[serde(default)]
    pub defaults: ToolConfig,

    /// Per-tool overrides keyed by tool name
    #[serde(default)]
    pub tools: HashMap<String, ToolOverrides>,
}

impl BulwarkConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Loads in this order:
    /// 1. Default configuration
    /// 2. `bulwark.toml` in the working directory
    /// 3. File named by `BULWARK_CONFIG_PATH`
    /// 4. `BULWARK_*` environment variables, nested with `__`
    ///    (e.g. `BULWARK_DEFAULTS__HARD_TIMEOUT=2s`)
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or a merged value is invalid.
    pub fn load() -> crate::error::Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Serialized, Toml},
        };

        let mut figment = Figment::from(Serialized::defaults(BulwarkConfig::default()))
            .merge(Toml::file("bulwark.toml"));

        if let Ok(path) = std::env::var("BULWARK_CONFIG_PATH") {
            figment = figment.merge(Toml::file(path));
        }

        let config: BulwarkConfig = figment
            .merge(Env::prefixed("BULWARK_").ignore(&["config_path"]).split("__"))
            .extract()
            .map_err(|e| {
                BulwarkError::Configuration(format!("Failed to load configuration: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::error::Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Serialized, Toml},
        };

        let config: BulwarkConfig = Figment::from(Serialized::defaults(BulwarkConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .extract()
            .map_err(|e| {
                BulwarkError::Configuration(format!(
                    "Failed to load configuration from {}: {}",
                    path.as_ref().display(),
                    e
                ))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Effective config for a tool: defaults with that tool's overrides applied
    pub fn config_for(&self, tool_name: &str) -> Result<ToolConfig, ConfigError> {
        match self.tools.get(tool_name) {
            Some(overrides) => self.defaults.to_builder().apply(overrides).build(),
            None => Ok(self.defaults.clone()),
        }
    }

    /// Check every override merges into a valid config
    fn validate(&self) -> crate::error::Result<()> {
        for name in self.tools.keys() {
            self.config_for(name).map_err(|e| {
                BulwarkError::Configuration(format!("Invalid settings for tool '{}': {}", name, e))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = ToolConfig::default();
        assert_eq!(config.soft_timeout(), Duration::from_secs(2));
        assert_eq!(config.hard_timeout(), Duration::from_secs(4));
        assert_eq!(config.retry_count(), 1);
        assert_eq!(config.jitter_min(), Duration::from_millis(200));
        assert_eq!(config.jitter_max(), Duration::from_millis(500));
        assert_eq!(config.breaker_failure_threshold(), 5);
        assert_eq!(config.breaker_window(), Duration::from_secs(60));
        assert_eq!(config.breaker_half_open_delay(), Duration::from_secs(30));
        assert!(config.cache_ttl().is_zero());
    }

    #[test]
    fn test_inverted_jitter_rejected_at_build() {
        let err = ToolConfig::builder()
            .jitter(Duration::from_millis(500), Duration::from_millis(200))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::JitterBounds { .. }));
    }

    #[test]
    fn test_equal_jitter_bounds_allowed() {
        let config = ToolConfig::builder()
            .jitter(Duration::from_millis(50), Duration::from_millis(50))
            .build()
            .unwrap();
        assert_eq!(config.sample_jitter(), Duration::from_millis(50));
    }

    #[test]
    fn test_zero_values_rejected() {
        assert_eq!(
            ToolConfig::builder().hard_timeout(Duration::ZERO).build(),
            Err(ConfigError::ZeroHardTimeout)
        );
        assert_eq!(
            ToolConfig::builder().breaker_failure_threshold(0).build(),
            Err(ConfigError::ZeroFailureThreshold)
        );
    }

    #[test]
    fn test_sample_jitter_within_bounds() {
        let config = ToolConfig::builder()
            .jitter(Duration::from_millis(10), Duration::from_millis(20))
            .build()
            .unwrap();
        for _ in 0..200 {
            let d = config.sample_jitter();
            assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(20));
        }
    }

    #[test]
    fn test_sample_jitter_handles_durations_beyond_u64_nanos() {
        let min = Duration::from_secs(1 << 40);
        let max = min + Duration::from_secs(60);
        let config = ToolConfig::builder().jitter(min, max).build().unwrap();
        for _ in 0..50 {
            let d = config.sample_jitter();
            assert!(d >= min && d <= max, "{d:?} outside [{min:?}, {max:?}]");
        }
    }

    #[test]
    fn test_deserialize_validates() {
        let err = serde_json::from_str::<ToolConfig>(
            r#"{"jitter_min": "900ms", "jitter_max": "100ms"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("jitter_min"));

        let config: ToolConfig =
            serde_json::from_str(r#"{"hard_timeout": "250ms", "retry_count": 3}"#).unwrap();
        assert_eq!(config.hard_timeout(), Duration::from_millis(250));
        assert_eq!(config.retry_count(), 3);
        assert_eq!(config.jitter_max(), Duration::from_millis(500));
    }

    #[test]
    fn test_serialization_roundtrip_keeps_soft_timeout() {
        let config = ToolConfig::builder()
            .soft_timeout(Duration::from_millis(1500))
            .build()
            .unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("soft_timeout"));
        let parsed: ToolConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_config_for_merges_overrides() {
        let mut config = BulwarkConfig::default();
        config.tools.insert(
            "weather".into(),
            ToolOverrides {
                cache_ttl: Some(Duration::from_secs(24 * 3600)),
                retry_count: Some(0),
                ..Default::default()
            },
        );

        let weather = config.config_for("weather").unwrap();
        assert_eq!(weather.cache_ttl(), Duration::from_secs(24 * 3600));
        assert_eq!(weather.retry_count(), 0);
        assert_eq!(weather.hard_timeout(), config.defaults.hard_timeout());

        let other = config.config_for("flights").unwrap();
        assert_eq!(other, config.defaults);
    }

    #[test]
    fn test_config_for_rejects_invalid_override() {
        let mut config = BulwarkConfig::default();
        config.tools.insert(
            "fx".into(),
            ToolOverrides {
                jitter_min: Some(Duration::from_secs(1)),
                ..Default::default()
            },
        );
        assert!(config.config_for("fx").is_err());
    }

    #[test]
    fn test_load_from_file_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "bulwark.toml",
                r#"
                [defaults]
                hard_timeout = "2s"
                retry_count = 2

                [tools.weather]
                cache_ttl = "24h"
                "#,
            )?;
            jail.set_env("BULWARK_DEFAULTS__JITTER_MAX", "300ms");

            let config = BulwarkConfig::load().expect("config should load");
            assert_eq!(config.defaults.hard_timeout(), Duration::from_secs(2));
            assert_eq!(config.defaults.retry_count(), 2);
            assert_eq!(config.defaults.jitter_max(), Duration::from_millis(300));
            assert_eq!(
                config.config_for("weather").unwrap().cache_ttl(),
                Duration::from_secs(24 * 3600)
            );
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_inverted_jitter() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "custom.toml",
                r#"
                [defaults]
                jitter_min = "800ms"
                jitter_max = "100ms"
                "#,
            )?;
            let result = BulwarkConfig::from_file("custom.toml");
            assert!(matches!(result, Err(BulwarkError::Configuration(_))));
            Ok(())
        });
    }
}
