// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use deferclient::{ClientConfig, ConfigError};
use deferstats::StatsConfig;
use std::env;

const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub port: u16,
    pub client: ClientConfig,
    pub stats: StatsConfig,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match env::var("DEFERPANIC_PORT") {
            Ok(port) => port
                .trim()
                .parse::<u16>()
                .map_err(|e| ConfigError::Invalid(format!("DEFERPANIC_PORT={port}: {e}")))?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(Self {
            port,
            client: ClientConfig::from_env()?,
            stats: StatsConfig::from_env()?,
        })
    }
}

/// Log level for the subscriber filter, lowercased
pub fn log_level() -> String {
    env::var("DEFERPANIC_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string())
}
