// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::ConfigError;
use std::env;
use std::time::Duration;

/// Default lockdown delay applied after the first consecutive failure.
pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(1);
/// Ceiling for the lockdown delay; once reached it no longer grows.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(60 * 60);
/// Default cap on the number of pending, not-yet-started sends.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Configuration for the delivery pipeline (async decorator, lockdown
/// decorator and marshaller).
///
/// The pipeline does not discover any of these values itself; they are
/// supplied by the embedding application, either directly or through
/// [`PipelineConfig::from_env`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Lockdown delay after the first consecutive transport failure.
    pub base_backoff: Duration,
    /// Ceiling for the lockdown delay.
    pub max_backoff: Duration,
    /// Number of concurrent delivery workers.
    pub worker_count: usize,
    /// Cap on pending sends; `None` means unbounded.
    pub queue_capacity: Option<usize>,
    /// Whether `close()` drains pending and in-flight sends.
    pub graceful_shutdown: bool,
    /// Upper bound on the graceful drain; `None` waits indefinitely.
    pub shutdown_timeout: Option<Duration>,
    /// Whether the marshaller deflate-compresses and base64-encodes events.
    pub compression: bool,
    /// Whether frames shared with the enclosing exception are forced out of
    /// the in-app set.
    pub hide_common_frames: bool,
    /// Module prefixes considered not part of the application's own code.
    pub not_in_app_prefixes: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_backoff: DEFAULT_BASE_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            worker_count: std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(1),
            queue_capacity: Some(DEFAULT_QUEUE_CAPACITY),
            graceful_shutdown: true,
            shutdown_timeout: None,
            compression: true,
            hide_common_frames: true,
            not_in_app_prefixes: default_not_in_app_prefixes(),
        }
    }
}

/// Module prefixes treated as platform/runtime code rather than
/// application code.
pub fn default_not_in_app_prefixes() -> Vec<String> {
    ["std::", "core::", "alloc::", "tokio::", "futures::", "rayon::", "test::"]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

impl PipelineConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let base_backoff = env::var("COURIER_BASE_BACKOFF_MS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.base_backoff);
        let max_backoff = env::var("COURIER_MAX_BACKOFF_MS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.max_backoff);
        let worker_count = env::var("COURIER_WORKERS")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(defaults.worker_count);
        let queue_capacity = match env::var("COURIER_QUEUE_SIZE") {
            Ok(val) => val.parse::<usize>().ok().map(Some).unwrap_or(defaults.queue_capacity),
            Err(_) => defaults.queue_capacity,
        };
        let graceful_shutdown = env::var("COURIER_GRACEFUL_SHUTDOWN")
            .map(|val| val.to_lowercase() != "false")
            .unwrap_or(true);
        let shutdown_timeout = env::var("COURIER_SHUTDOWN_TIMEOUT_MS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .map(Duration::from_millis);
        let compression = env::var("COURIER_COMPRESSION")
            .map(|val| val.to_lowercase() != "false")
            .unwrap_or(true);
        let hide_common_frames = env::var("COURIER_HIDE_COMMON_FRAMES")
            .map(|val| val.to_lowercase() != "false")
            .unwrap_or(true);

        let config = Self {
            base_backoff,
            max_backoff,
            worker_count,
            queue_capacity,
            graceful_shutdown,
            shutdown_timeout,
            compression,
            hide_common_frames,
            not_in_app_prefixes: defaults.not_in_app_prefixes,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::Invalid(
                "worker count must be greater than 0".to_string(),
            ));
        }

        if self.base_backoff.is_zero() {
            return Err(ConfigError::Invalid(
                "base backoff must be greater than 0".to_string(),
            ));
        }

        if self.max_backoff < self.base_backoff {
            return Err(ConfigError::Invalid(
                "max backoff must be at least the base backoff".to_string(),
            ));
        }

        if self.queue_capacity == Some(0) {
            return Err(ConfigError::Invalid(
                "queue capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_workers() {
        let config = PipelineConfig {
            worker_count: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_base_backoff() {
        let config = PipelineConfig {
            base_backoff: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_max_below_base() {
        let config = PipelineConfig {
            base_backoff: Duration::from_secs(10),
            max_backoff: Duration::from_secs(1),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_queue_capacity() {
        let config = PipelineConfig {
            queue_capacity: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            queue_capacity: None,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_prefixes_cover_runtime() {
        let prefixes = default_not_in_app_prefixes();
        assert!(prefixes.iter().any(|p| p == "std::"));
        assert!(prefixes.iter().any(|p| p == "tokio::"));
    }
}
