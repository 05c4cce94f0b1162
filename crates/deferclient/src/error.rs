// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors raised while building or validating a [`crate::config::ClientConfig`]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing API token, set DEFERPANIC_TOKEN or enable no_post")]
    MissingToken,
}

/// Errors returned by a [`crate::transport::Transport`]
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to build HTTP client: {0}")]
    Build(String),

    #[error("Failed to send request to {url}: {message}")]
    Send { url: String, message: String },

    #[error("Failed to read response body: {0}")]
    Body(String),
}

/// Errors raised while constructing a [`crate::client::DeferPanicClient`]
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("No tokio runtime available to run background reports")]
    NoRuntime,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors returned by a [`crate::profiler::Profiler`]
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("{0} capture is not supported by this profiler")]
    Unsupported(&'static str),

    #[error("{kind} capture failed: {message}")]
    Failed { kind: &'static str, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ConfigError::Invalid("api_base cannot be empty".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: api_base cannot be empty"
        );
    }

    #[test]
    fn test_client_error_wraps_config_error() {
        let error: ClientError = ConfigError::MissingToken.into();
        assert_eq!(
            error.to_string(),
            "Missing API token, set DEFERPANIC_TOKEN or enable no_post"
        );
    }

    #[test]
    fn test_capture_error_display() {
        let error = CaptureError::Unsupported("cpu-profile");
        assert_eq!(
            error.to_string(),
            "cpu-profile capture is not supported by this profiler"
        );
    }
}
