// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use deferclient::ConfigError;
use std::env;
use std::time::Duration;

const DEFAULT_LATENCY_THRESHOLD_MS: u64 = 500;
const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 60;

/// Configuration for request instrumentation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsConfig {
    /// Requests slower than this many milliseconds are recorded
    pub latency_threshold_ms: u64,
    /// Seconds between two stats uploads
    pub flush_interval_secs: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            latency_threshold_ms: DEFAULT_LATENCY_THRESHOLD_MS,
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
        }
    }
}

impl StatsConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let latency_threshold_ms = parse_env("DEFERPANIC_LATENCY_THRESHOLD_MS")?
            .unwrap_or(defaults.latency_threshold_ms);
        let flush_interval_secs = parse_env("DEFERPANIC_FLUSH_INTERVAL_SECS")?
            .unwrap_or(defaults.flush_interval_secs);

        let config = Self {
            latency_threshold_ms,
            flush_interval_secs,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "flush_interval_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

fn parse_env(name: &str) -> Result<Option<u64>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid(format!("{name}={value}: {e}"))),
        Err(_) => Ok(None),
    }
}
