//! Tunables shared by every tier adapter and the composer.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{default_is_not_found, CacheError};

/// Default fractional TTL jitter (±10%).
pub const DEFAULT_JITTER: f64 = 0.10;
/// Default negative-cache TTL.
pub const DEFAULT_NEGATIVE_TTL: Duration = Duration::from_secs(30);
/// Default cap on any TTL an [`crate::unstable::UnstableTier`] will honor.
pub const DEFAULT_MAX_TTL: Duration = Duration::from_secs(15 * 60);
/// Default deadline for a single remote probe read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);
/// Default deadline for a single remote write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(500);

pub type OnErrorFn = Arc<dyn Fn(&str, &str, &str, &CacheError) + Send + Sync>;
pub type IsNotFoundFn = Arc<dyn Fn(&CacheError) -> bool + Send + Sync>;

/// Configuration shared by [`crate::stable::StableTier`],
/// [`crate::unstable::UnstableTier`] and [`crate::composer::Composer`].
///
/// Construct with [`Options::new`] and chain the `with_*` setters;
/// every field has the documented default if left unset.
#[derive(Clone)]
pub struct Options {
    pub prefix: Option<String>,
    pub jitter: f64,
    pub negative_ttl: Duration,
    pub max_ttl: Option<Duration>,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub is_not_found: IsNotFoundFn,
    pub on_error: Option<OnErrorFn>,
    pub skip_backfill: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            prefix: None,
            jitter: DEFAULT_JITTER,
            negative_ttl: DEFAULT_NEGATIVE_TTL,
            max_ttl: Some(DEFAULT_MAX_TTL),
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            is_not_found: Arc::new(default_is_not_found),
            on_error: None,
            skip_backfill: false,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    #[must_use]
    pub fn with_negative_ttl(mut self, ttl: Duration) -> Self {
        self.negative_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_max_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.max_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_is_not_found(mut self, predicate: IsNotFoundFn) -> Self {
        self.is_not_found = predicate;
        self
    }

    #[must_use]
    pub fn with_on_error(mut self, observer: OnErrorFn) -> Self {
        self.on_error = Some(observer);
        self
    }

    #[must_use]
    pub fn with_skip_backfill(mut self, skip: bool) -> Self {
        self.skip_backfill = skip;
        self
    }

    /// Apply the configured TTL cap, if any.
    pub fn cap_ttl(&self, ttl: Duration) -> Duration {
        match self.max_ttl {
            Some(max) if ttl > max => max,
            _ => ttl,
        }
    }

    /// Apply jitter to a TTL: `ttl * (1 + U(-jitter, jitter))`.
    pub fn jittered_ttl(&self, ttl: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return ttl;
        }
        let factor = 1.0 + (rand::random::<f64>() * 2.0 - 1.0) * self.jitter;
        let nanos = (ttl.as_nanos() as f64 * factor.max(0.0)) as u64;
        Duration::from_nanos(nanos)
    }

    /// Report an error to the configured observer, if any. `tier` and
    /// `op` identify where the error occurred, e.g. `("stable", "get")`.
    pub fn report_error(&self, tier: &str, op: &str, key: &str, err: &CacheError) {
        if let Some(observer) = &self.on_error {
            observer(tier, op, key, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let opts = Options::default();
        assert_eq!(opts.jitter, DEFAULT_JITTER);
        assert_eq!(opts.negative_ttl, DEFAULT_NEGATIVE_TTL);
        assert_eq!(opts.max_ttl, Some(DEFAULT_MAX_TTL));
        assert_eq!(opts.read_timeout, DEFAULT_READ_TIMEOUT);
        assert_eq!(opts.write_timeout, DEFAULT_WRITE_TIMEOUT);
        assert!(!opts.skip_backfill);
    }

    #[test]
    fn cap_ttl_clamps_above_max() {
        let opts = Options::new().with_max_ttl(Some(Duration::from_secs(10)));
        assert_eq!(opts.cap_ttl(Duration::from_secs(100)), Duration::from_secs(10));
        assert_eq!(opts.cap_ttl(Duration::from_secs(5)), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let opts = Options::new().with_jitter(0.10);
        let base = Duration::from_secs(100);
        for _ in 0..200 {
            let jittered = opts.jittered_ttl(base);
            assert!(jittered >= Duration::from_secs(89));
            assert!(jittered <= Duration::from_secs(111));
        }
    }

    #[test]
    fn zero_jitter_is_exact() {
        let opts = Options::new().with_jitter(0.0);
        let base = Duration::from_secs(42);
        assert_eq!(opts.jittered_ttl(base), base);
    }
}
