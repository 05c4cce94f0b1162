// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::ConfigError;
use std::env;
use std::time::Duration;

/// Version of the collector API this client speaks
pub const API_VERSION: &str = "v1.17";

pub const DEFAULT_API_BASE: &str = "https://api.deferpanic.com/v1.17";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const ERRORS_PATH: &str = "/panics/create";
pub const CPU_PROFILE_PATH: &str = "/uploads/cpuprofile/create";
pub const MEM_PROFILE_PATH: &str = "/uploads/memprofile/create";
pub const TRACE_PATH: &str = "/uploads/trace/create";
pub const STATS_PATH: &str = "/uploads/stats/create";

/// Configuration for the collector client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Static token sent with every request
    pub token: String,
    /// Collector base url, including the API version
    pub api_base: String,
    pub user_agent: String,
    /// Environment tag (e.g. production, staging)
    pub environment: String,
    /// Application group tag
    pub app_group: String,
    /// Name this agent reports itself as
    pub agent_name: String,
    /// Disables every send, useful for dev/test environments
    pub no_post: bool,
    /// Logs the full backtrace of every reported panic
    pub print_panics: bool,
    /// Timeout for each request to the collector
    pub timeout: Duration,
    /// HTTPS proxy URL
    pub https_proxy: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            user_agent: format!("deferclient {API_VERSION}"),
            environment: "production".to_string(),
            app_group: "default".to_string(),
            agent_name: "unknown".to_string(),
            no_post: false,
            print_panics: false,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            https_proxy: None,
        }
    }
}

impl ClientConfig {
    /// Config that talks to the collector with the given token and defaults for the rest
    pub fn with_token(token: &str) -> Self {
        Self {
            token: token.to_string(),
            ..Default::default()
        }
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let token = env::var("DEFERPANIC_TOKEN").unwrap_or_default();
        let api_base = env::var("DEFERPANIC_API_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_base);
        let environment = env::var("DEFERPANIC_ENVIRONMENT").unwrap_or(defaults.environment);
        let app_group = env::var("DEFERPANIC_APP_GROUP").unwrap_or(defaults.app_group);
        let agent_name = env::var("DEFERPANIC_AGENT_NAME")
            .or_else(|_| env::var("HOSTNAME"))
            .unwrap_or(defaults.agent_name);
        let no_post = env_flag("DEFERPANIC_NO_POST");
        let print_panics = env_flag("DEFERPANIC_PRINT_PANICS");
        let timeout = env::var("DEFERPANIC_TIMEOUT_SECS")
            .ok()
            .and_then(|secs| secs.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);
        let https_proxy = env::var("DEFERPANIC_PROXY_HTTPS")
            .or_else(|_| env::var("HTTPS_PROXY"))
            .ok();

        let config = Self {
            token,
            api_base,
            user_agent: defaults.user_agent,
            environment,
            app_group,
            agent_name,
            no_post,
            print_panics,
            timeout,
            https_proxy,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.no_post && self.token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }

        if self.api_base.trim().is_empty() {
            return Err(ConfigError::Invalid("api_base cannot be empty".to_string()));
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Full url of a collector endpoint
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|val| matches!(val.to_lowercase().as_str(), "true" | "1"))
        .unwrap_or(false)
}
