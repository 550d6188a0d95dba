use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use quill_state::RateLimiterConfig;

/// Broker configuration loaded from TOML. Every field has a default so an
/// empty file (or none at all) yields a working broker.
#[derive(Debug, Default, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub connection_calls: u32,
    pub connection_window_secs: u64,
    pub transaction_calls: u32,
    pub transaction_window_secs: u64,
    pub general_calls: u32,
    pub general_window_secs: u64,
    /// Hard cap on serialized request params, applied before any other work.
    pub max_params_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            connection_calls: RateLimiterConfig::CONNECTION.max_calls,
            connection_window_secs: RateLimiterConfig::CONNECTION.window.as_secs(),
            transaction_calls: RateLimiterConfig::TRANSACTION.max_calls,
            transaction_window_secs: RateLimiterConfig::TRANSACTION.window.as_secs(),
            general_calls: RateLimiterConfig::GENERAL.max_calls,
            general_window_secs: RateLimiterConfig::GENERAL.window.as_secs(),
            max_params_bytes: 64 * 1024,
        }
    }
}

impl LimitsConfig {
    pub fn connection(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            max_calls: self.connection_calls,
            window: Duration::from_secs(self.connection_window_secs),
        }
    }

    pub fn transaction(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            max_calls: self.transaction_calls,
            window: Duration::from_secs(self.transaction_window_secs),
        }
    }

    pub fn general(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            max_calls: self.general_calls,
            window: Duration::from_secs(self.general_window_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// Single-step approvals (connect, sign).
    pub approval_secs: u64,
    /// Multi-step compose flows.
    pub compose_secs: u64,
    /// Waiting for the user to unlock the keychain.
    pub unlock_secs: u64,
    /// One attempt at opening a UI surface.
    pub surface_attempt_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self { approval_secs: 300, compose_secs: 600, unlock_secs: 60, surface_attempt_secs: 5 }
    }
}

impl TimeoutsConfig {
    pub fn approval(&self) -> Duration {
        Duration::from_secs(self.approval_secs)
    }

    pub fn compose(&self) -> Duration {
        Duration::from_secs(self.compose_secs)
    }

    pub fn unlock(&self) -> Duration {
        Duration::from_secs(self.unlock_secs)
    }

    pub fn surface_attempt(&self) -> Duration {
        Duration::from_secs(self.surface_attempt_secs)
    }
}

impl BrokerConfig {
    pub fn from_toml(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_defaults() {
        let cfg = BrokerConfig::from_toml("").expect("parse");
        assert_eq!(cfg.limits.general_calls, 10);
        assert_eq!(cfg.limits.max_params_bytes, 64 * 1024);
        assert_eq!(cfg.timeouts.approval(), Duration::from_secs(300));
        assert_eq!(cfg.timeouts.compose(), Duration::from_secs(600));
    }

    #[test]
    fn overrides_apply_per_section() {
        let input = r#"
[limits]
general_calls = 100
general_window_secs = 60

[timeouts]
unlock_secs = 30
"#;
        let cfg = BrokerConfig::from_toml(input).expect("parse");
        let general = cfg.limits.general();
        assert_eq!(general.max_calls, 100);
        assert_eq!(general.window, Duration::from_secs(60));
        assert_eq!(cfg.timeouts.unlock(), Duration::from_secs(30));
        // Untouched sections keep defaults.
        assert_eq!(cfg.limits.connection_calls, 5);
    }

    #[test]
    fn loads_config_from_file() {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        std::fs::write(file.path(), "[limits]\ntransaction_calls = 3\n").expect("write");
        let cfg = BrokerConfig::from_path(file.path()).expect("load");
        assert_eq!(cfg.limits.transaction().max_calls, 3);
    }
}
