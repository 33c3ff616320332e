//! Configuration for the sync engine.

use possync_core::EpochMillis;
use std::time::Duration;

/// Configuration for queue draining and reference refresh.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Period of the background pass timer.
    pub sync_interval: Duration,
    /// Upper bound on each remote call.
    pub request_timeout: Duration,
    /// Attempt count at which a record is reported as stalled.
    pub high_water_mark: u32,
    /// Per-record backoff.
    pub retry: RetryConfig,
    /// Refresh the catalog at startup when the cache is empty.
    pub catalog_refresh_on_start: bool,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            sync_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            high_water_mark: 5,
            retry: RetryConfig::default(),
            catalog_refresh_on_start: true,
        }
    }

    /// Sets the background pass period.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the high-water mark.
    pub fn with_high_water_mark(mut self, mark: u32) -> Self {
        self.high_water_mark = mark;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets whether to refresh an empty catalog at startup.
    pub fn with_catalog_refresh_on_start(mut self, enabled: bool) -> Self {
        self.catalog_refresh_on_start = enabled;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Longest backoff a record can be given.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

fn sanitize_multiplier(multiplier: f64) -> f64 {
    if multiplier.is_finite() && multiplier >= 1.0 {
        multiplier
    } else {
        1.0
    }
}

/// Per-record backoff between delivery attempts.
///
/// Disabled by default: every pass retries every queued record. When
/// enabled, a record that has failed is skipped until its backoff delay has
/// elapsed since the last failure. Records are never dropped either way.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Whether backoff applies at all.
    pub enabled: bool,
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates an enabled backoff configuration.
    pub fn exponential() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Creates a configuration that retries every record on every pass.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay, capped at [`MAX_RETRY_DELAY`].
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay.min(MAX_RETRY_DELAY);
        self
    }

    /// Sets the backoff multiplier. Values below 1.0 or not finite fall back
    /// to 1.0 (a constant delay).
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = sanitize_multiplier(multiplier);
        self
    }

    /// Sets whether to add jitter.
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Calculates the wait after `attempts` failures.
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }

        // The fields are public and may bypass the setters.
        let max_delay = self.max_delay.min(MAX_RETRY_DELAY);
        let multiplier = sanitize_multiplier(self.backoff_multiplier);
        let exponent = i32::try_from(attempts.saturating_sub(1)).unwrap_or(i32::MAX);
        let base_delay = self.initial_delay.as_secs_f64() * multiplier.powi(exponent);
        let mut delay_secs = base_delay.min(max_delay.as_secs_f64());

        if self.add_jitter {
            // Add up to 25% jitter
            delay_secs += delay_secs * 0.25 * rand_jitter();
        }
        Duration::try_from_secs_f64(delay_secs).unwrap_or(max_delay)
    }

    /// Returns true if a record may be attempted at `now`.
    pub fn is_due(&self, attempts: u32, last_attempt_at: Option<EpochMillis>, now: EpochMillis) -> bool {
        if !self.enabled {
            return true;
        }
        let Some(last) = last_attempt_at else {
            return true;
        };
        let wait = i64::try_from(self.delay_for_attempt(attempts).as_millis()).unwrap_or(i64::MAX);
        now.saturating_sub(last) >= wait
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            initial_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(30 * 60),
            backoff_multiplier: 2.0,
            add_jitter: false,
        }
    }
}

/// Cheap time-derived jitter in `[0, 1)`.
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.sync_interval, Duration::from_secs(30));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.high_water_mark, 5);
        assert!(!config.retry.enabled);
        assert!(config.catalog_refresh_on_start);
    }

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new()
            .with_sync_interval(Duration::from_secs(5))
            .with_timeout(Duration::from_secs(2))
            .with_high_water_mark(3)
            .with_catalog_refresh_on_start(false);

        assert_eq!(config.sync_interval, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(2));
        assert_eq!(config.high_water_mark, 3);
        assert!(!config.catalog_refresh_on_start);
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::exponential()
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1).as_millis(), 100);
        assert_eq!(config.delay_for_attempt(3).as_millis(), 400);
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::exponential()
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0)
            .with_jitter(true);

        let delay = config.delay_for_attempt(5);
        assert!(delay <= Duration::from_millis(6250)); // 5s + 25% jitter
    }

    #[test]
    fn out_of_range_backoff_settings_do_not_panic() {
        for multiplier in [-2.0, 0.5, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let config = RetryConfig::exponential()
                .with_initial_delay(Duration::from_secs(1))
                .with_backoff_multiplier(multiplier)
                .with_jitter(true);
            assert_eq!(config.backoff_multiplier, 1.0);
            assert!(config.delay_for_attempt(4) <= Duration::from_millis(1250));
        }

        let config = RetryConfig::exponential()
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::MAX)
            .with_backoff_multiplier(1e300)
            .with_jitter(true);
        assert_eq!(config.max_delay, MAX_RETRY_DELAY);
        let delay = config.delay_for_attempt(u32::MAX);
        assert!(delay >= MAX_RETRY_DELAY);
        assert!(config.is_due(u32::MAX, Some(0), i64::MAX));
    }

    #[test]
    fn fields_set_directly_are_still_bounded() {
        let config = RetryConfig {
            max_delay: Duration::MAX,
            backoff_multiplier: f64::NAN,
            ..RetryConfig::exponential()
        };
        assert_eq!(config.delay_for_attempt(3), config.initial_delay);
        assert!(config.delay_for_attempt(3) <= MAX_RETRY_DELAY);
    }

    #[test]
    fn disabled_backoff_is_always_due() {
        let config = RetryConfig::disabled();
        assert!(config.is_due(10, Some(1_000), 1_001));
    }

    #[test]
    fn enabled_backoff_waits_after_failure() {
        let config = RetryConfig::exponential().with_initial_delay(Duration::from_secs(10));

        assert!(config.is_due(0, None, 0));
        assert!(!config.is_due(1, Some(1_000), 5_000));
        assert!(config.is_due(1, Some(1_000), 11_000));
        // Second failure doubles the wait.
        assert!(!config.is_due(2, Some(1_000), 11_000));
    }
}
