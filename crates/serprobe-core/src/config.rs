//! Environment-driven engine configuration.
//!
//! Every tunable is adjustable without code changes. Invalid values are
//! rejected synchronously here — this is the only place the engine raises
//! for programmer/config errors.

use std::time::Duration;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::AppError;
use crate::limiter::LimiterConfig;
use crate::orchestrator::BackoffConfig;
use crate::rotation::RotationConfig;

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of results requested per query.
    pub num_results: usize,
    /// Bounded worker pool size for bulk runs.
    pub max_concurrency: usize,
    /// Same-strategy retries on soft blocks.
    pub max_retries: u32,
    pub backoff: BackoffConfig,
    pub limiter: LimiterConfig,
    pub rotation: RotationConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_results: 6,
            max_concurrency: 3,
            max_retries: 3,
            backoff: BackoffConfig::default(),
            limiter: LimiterConfig::default(),
            rotation: RotationConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Read configuration from `SERP_*` environment variables, falling
    /// back to defaults for anything unset.
    ///
    /// - `SERP_NUM_RESULTS` — results requested per query (default 6)
    /// - `SERP_MAX_CONCURRENCY` — bulk pool size (default 3, must be ≥ 1)
    /// - `SERP_MAX_RETRIES` — soft-block retries per strategy (default 3)
    /// - `SERP_BACKOFF_BASE_MS` / `SERP_BACKOFF_STEP_MS` / `SERP_BACKOFF_JITTER_MS`
    /// - `SERP_MIN_REQUEST_INTERVAL_MS` / `SERP_REQUEST_JITTER_MS`
    /// - `SERP_ROTATION_MIN_SECS` / `SERP_ROTATION_MAX_SECS`
    /// - `SERP_BREAKER_THRESHOLD` / `SERP_BREAKER_RESET_SECS`
    /// - `SERP_EGRESS_KEYS` — comma-separated rotation keys
    /// - `ROTATING_PROXY_ENDPOINT` — proxy URL template, `{key}` substituted
    pub fn from_env() -> Result<Self, AppError> {
        let mut config = Self::default();

        if let Some(n) = read_usize("SERP_NUM_RESULTS")? {
            config.num_results = require_nonzero("SERP_NUM_RESULTS", n)?;
        }
        if let Some(n) = read_usize("SERP_MAX_CONCURRENCY")? {
            config.max_concurrency = require_nonzero("SERP_MAX_CONCURRENCY", n)?;
        }
        if let Some(n) = read_usize("SERP_MAX_RETRIES")? {
            config.max_retries = n as u32;
        }

        if let Some(ms) = read_usize("SERP_BACKOFF_BASE_MS")? {
            config.backoff.base = Duration::from_millis(ms as u64);
        }
        if let Some(ms) = read_usize("SERP_BACKOFF_STEP_MS")? {
            config.backoff.step = Duration::from_millis(ms as u64);
        }
        if let Some(ms) = read_usize("SERP_BACKOFF_JITTER_MS")? {
            config.backoff.jitter = Duration::from_millis(ms as u64);
        }

        if let Some(ms) = read_usize("SERP_MIN_REQUEST_INTERVAL_MS")? {
            config.limiter.min_interval = Duration::from_millis(ms as u64);
        }
        if let Some(ms) = read_usize("SERP_REQUEST_JITTER_MS")? {
            config.limiter.jitter = Duration::from_millis(ms as u64);
        }

        if let Some(secs) = read_usize("SERP_ROTATION_MIN_SECS")? {
            config.rotation.min_interval = Duration::from_secs(secs as u64);
        }
        if let Some(secs) = read_usize("SERP_ROTATION_MAX_SECS")? {
            config.rotation.max_interval = Duration::from_secs(secs as u64);
        }
        if config.rotation.max_interval < config.rotation.min_interval {
            return Err(AppError::ConfigError(
                "SERP_ROTATION_MAX_SECS must not be below SERP_ROTATION_MIN_SECS".into(),
            ));
        }

        if let Some(n) = read_usize("SERP_BREAKER_THRESHOLD")? {
            config.rotation.breaker.failure_threshold =
                require_nonzero("SERP_BREAKER_THRESHOLD", n)? as u32;
        }
        if let Some(secs) = read_usize("SERP_BREAKER_RESET_SECS")? {
            config.rotation.breaker.reset_timeout = Duration::from_secs(secs as u64);
        }

        if let Ok(raw) = std::env::var("SERP_EGRESS_KEYS") {
            let keys: Vec<String> = raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if keys.is_empty() {
                return Err(AppError::ConfigError(
                    "SERP_EGRESS_KEYS is set but contains no keys".into(),
                ));
            }
            config.rotation.keys = keys;
        }

        if let Ok(endpoint) = std::env::var("ROTATING_PROXY_ENDPOINT") {
            if !endpoint.is_empty() {
                config.rotation.proxy_template = Some(endpoint);
            }
        }

        Ok(config)
    }

    /// Breaker config shared by every egress key.
    pub fn breaker(&self) -> &CircuitBreakerConfig {
        &self.rotation.breaker
    }
}

fn read_usize(name: &str) -> Result<Option<usize>, AppError> {
    match std::env::var(name) {
        Err(_) => Ok(None),
        Ok(raw) => raw
            .parse::<usize>()
            .map(Some)
            .map_err(|_| {
                AppError::ConfigError(format!(
                    "Invalid {name} '{raw}': must be a non-negative integer"
                ))
            }),
    }
}

fn require_nonzero(name: &str, value: usize) -> Result<usize, AppError> {
    if value == 0 {
        return Err(AppError::ConfigError(format!("{name} must be at least 1")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = EngineConfig::default();
        assert_eq!(config.num_results, 6);
        assert_eq!(config.max_concurrency, 3);
        assert_eq!(config.max_retries, 3);
        assert!(config.rotation.max_interval >= config.rotation.min_interval);
        assert_eq!(config.rotation.breaker.failure_threshold, 2);
    }

    #[test]
    fn require_nonzero_rejects_zero() {
        assert!(require_nonzero("X", 0).is_err());
        assert_eq!(require_nonzero("X", 3).unwrap(), 3);
    }
}
