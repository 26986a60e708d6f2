//! Runner configuration
//!
//! Defines the tunables of a batch scan: the request ceiling, the pauses
//! between submissions and sweeps, the batch timeout and the findings policy.

use std::time::Duration;

/// Request ceiling of the scanning backend; beyond it the backend answers 503
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 4;

/// Lowest batch timeout accepted; shorter values are raised to this
pub const MIN_TIMEOUT_MINUTES: u64 = 1;

/// Longest batch timeout accepted (one week)
pub const MAX_TIMEOUT_MINUTES: u64 = 7 * 24 * 60;

/// Runner configuration
///
/// All intervals are configurable so slow backends can be polled less
/// aggressively and tests can run with short pauses.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of backend requests in flight at once
    pub max_concurrent_requests: usize,

    /// Pause inserted between successive submissions
    pub submit_pause: Duration,

    /// Minimum pause between two poll sweeps
    pub sweep_interval: Duration,

    /// Extra sleep after a sweep that leaves records unresolved
    pub backoff_interval: Duration,

    /// Wall-clock limit for the whole batch
    pub timeout: Duration,

    /// Whether findings should fail the build; read by the caller of the evaluator
    pub fail_on_findings: bool,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new() -> Self {
        Self {
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            submit_pause: Duration::from_millis(500),
            sweep_interval: Duration::from_millis(500),
            backoff_interval: Duration::from_secs(15),
            timeout: Duration::from_secs(10 * 60),
            fail_on_findings: true,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Every variable is optional:
    /// - SCANGATE_MAX_CONCURRENT_REQUESTS (default: 4)
    /// - SCANGATE_SUBMIT_PAUSE_MS (default: 500)
    /// - SCANGATE_SWEEP_INTERVAL_MS (default: 500)
    /// - SCANGATE_BACKOFF_SECS (default: 15)
    /// - SCANGATE_TIMEOUT_MINUTES (default: 10, minimum: 1)
    /// - SCANGATE_FAIL_ON_FINDINGS (default: true)
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::new();

        let max_concurrent_requests = std::env::var("SCANGATE_MAX_CONCURRENT_REQUESTS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(defaults.max_concurrent_requests);

        let submit_pause = std::env::var("SCANGATE_SUBMIT_PAUSE_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.submit_pause);

        let sweep_interval = std::env::var("SCANGATE_SWEEP_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.sweep_interval);

        let backoff_interval = std::env::var("SCANGATE_BACKOFF_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.backoff_interval);

        let fail_on_findings = match std::env::var("SCANGATE_FAIL_ON_FINDINGS") {
            Ok(s) => parse_bool(&s).ok_or_else(|| {
                anyhow::anyhow!("SCANGATE_FAIL_ON_FINDINGS must be true or false, got '{}'", s)
            })?,
            Err(_) => defaults.fail_on_findings,
        };

        let config = Self {
            max_concurrent_requests,
            submit_pause,
            sweep_interval,
            backoff_interval,
            timeout: defaults.timeout,
            fail_on_findings,
        };

        Ok(match std::env::var("SCANGATE_TIMEOUT_MINUTES")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            Some(minutes) => config.with_timeout_minutes(minutes),
            None => config,
        })
    }

    /// Sets the batch timeout, raising it to the enforced floor
    ///
    /// Values past [`MAX_TIMEOUT_MINUTES`] are kept so that `validate`
    /// reports them.
    pub fn with_timeout_minutes(mut self, minutes: u64) -> Self {
        self.timeout = Duration::from_secs(minutes.max(MIN_TIMEOUT_MINUTES).saturating_mul(60));
        self
    }

    pub fn with_max_concurrent_requests(mut self, max: usize) -> Self {
        self.max_concurrent_requests = max;
        self
    }

    pub fn with_fail_on_findings(mut self, fail: bool) -> Self {
        self.fail_on_findings = fail;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_concurrent_requests == 0 {
            anyhow::bail!("max_concurrent_requests must be greater than 0");
        }

        if self.sweep_interval.is_zero() {
            anyhow::bail!("sweep_interval must be greater than 0");
        }

        if self.backoff_interval.is_zero() {
            anyhow::bail!("backoff_interval must be greater than 0");
        }

        if self.timeout.is_zero() {
            anyhow::bail!("timeout must be greater than 0");
        }

        let max_timeout = Duration::from_secs(MAX_TIMEOUT_MINUTES * 60);
        if self.timeout > max_timeout {
            anyhow::bail!(
                "timeout must be at most {} minutes, got {} minutes",
                MAX_TIMEOUT_MINUTES,
                self.timeout.as_secs() / 60
            );
        }

        for (name, interval) in [
            ("submit_pause", self.submit_pause),
            ("sweep_interval", self.sweep_interval),
            ("backoff_interval", self.backoff_interval),
        ] {
            if interval > max_timeout {
                anyhow::bail!("{} must not exceed the maximum timeout", name);
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
