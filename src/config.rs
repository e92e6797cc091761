use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};

const DEFAULT_INITIAL_BACKOFF_DURATION: Duration = Duration::from_millis(100);
const DEFAULT_MAX_BACKOFF_DURATION: Duration = Duration::from_secs(300);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Configuration for automatic reconnection behavior.
///
/// The defaults retry forever, starting at 100 ms between attempts and
/// doubling after each consecutive failure up to a ceiling of five minutes.
/// A successful connection resets the delay to `initial_backoff`.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of consecutive failed connection attempts before
    /// giving up. `None` means infinite retries.
    pub max_attempts: Option<u32>,
    /// Delay before the first reconnection attempt
    pub initial_backoff: Duration,
    /// Maximum delay between reconnection attempts
    pub max_backoff: Duration,
    /// Multiplier applied to the delay after each consecutive failure
    pub backoff_multiplier: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_attempts: None, // Infinite reconnection by default
            initial_backoff: DEFAULT_INITIAL_BACKOFF_DURATION,
            max_backoff: DEFAULT_MAX_BACKOFF_DURATION,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl From<Config> for ExponentialBackoff {
    fn from(config: Config) -> Self {
        ExponentialBackoffBuilder::default()
            .with_initial_interval(config.initial_backoff)
            .with_max_interval(config.max_backoff)
            .with_multiplier(config.backoff_multiplier)
            // No jitter: the n-th consecutive failure waits exactly
            // min(initial * multiplier^(n-1), max).
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None) // We handle max attempts separately
            .build()
    }
}

#[cfg(test)]
mod tests {
    use backoff::backoff::Backoff as _;

    use super::*;

    #[test]
    fn backoff_doubles_from_initial() {
        let config = Config::default();
        let mut backoff: ExponentialBackoff = config.into();

        for expected_ms in [100, 200, 400, 800] {
            assert_eq!(
                backoff.next_backoff(),
                Some(Duration::from_millis(expected_ms)),
                "delay should double without jitter"
            );
        }
    }

    #[test]
    fn backoff_holds_at_ceiling() {
        let config = Config::default();
        let mut backoff: ExponentialBackoff = config.into();

        // 100 * 2^12 = 409_600 > 300_000, so the 13th delay is the ceiling.
        let mut last = Duration::ZERO;
        for _ in 0..13 {
            last = backoff.next_backoff().expect("backoff never exhausts");
        }
        assert_eq!(last, Duration::from_secs(300), "13th delay hits ceiling");

        // And it stays there.
        assert_eq!(
            backoff.next_backoff(),
            Some(Duration::from_secs(300)),
            "delay should plateau at the ceiling"
        );
    }

    #[test]
    fn reset_returns_to_initial() {
        let config = Config::default();
        let mut backoff: ExponentialBackoff = config.into();

        // Grow to 800 ms, as if three attempts had failed.
        for _ in 0..3 {
            let _delay = backoff.next_backoff();
        }

        backoff.reset();
        assert_eq!(
            backoff.next_backoff(),
            Some(Duration::from_millis(100)),
            "reset should return the delay to the initial interval"
        );
    }

    #[test]
    fn backoff_respects_custom_max() {
        let config = Config {
            max_attempts: None,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 3.0,
        };
        let mut backoff: ExponentialBackoff = config.into();

        for _ in 0..10 {
            let _next = backoff.next_backoff();
        }

        let duration = backoff.next_backoff().expect("backoff never exhausts");
        assert_eq!(duration, Duration::from_secs(2), "delay capped at max");
    }

    #[test]
    fn default_retries_forever() {
        let config = Config::default();
        assert_eq!(config.max_attempts, None, "default has no attempt limit");
    }
}
