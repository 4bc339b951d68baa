//! Retry/backoff as data, not control flow: an iterator of attempts bounded
//! by `retries + 1`, each yielding the sleep duration to wait before the
//! *next* attempt. The iterator itself never sleeps — callers drive an
//! injected [`Clock`] so the policy is testable without a wall clock.

use std::time::Duration;

/// Abstracts `std::thread::sleep`/`Instant::now` so retry loops can be
/// driven deterministically in tests.
pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps for real; used in production.
pub struct RealClock;

impl Clock for RealClock {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records requested sleeps instead of blocking; used in tests.
#[derive(Default)]
pub struct RecordingClock {
    pub slept: std::sync::Mutex<Vec<Duration>>,
}

impl RecordingClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for RecordingClock {
    fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

/// A bounded exponential backoff policy: `interval`, then
/// `interval * backoff`, capped at `max_interval`, for up to `retries`
/// additional attempts after the first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Policy {
    pub retries: u32,
    pub interval: Duration,
    pub backoff: f64,
    pub max_interval: Duration,
}

impl Default for Policy {
    fn default() -> Self {
        Policy {
            retries: 3,
            interval: Duration::from_millis(500),
            backoff: 2.0,
            max_interval: Duration::from_secs(30),
        }
    }
}

impl Policy {
    /// The sleep duration before attempt `attempt` (0-based; attempt 0 is
    /// the first retry, i.e. the delay after the initial try failed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self.interval.as_secs_f64() * self.backoff.powi(attempt as i32);
        Duration::from_secs_f64(scaled).min(self.max_interval)
    }

    /// Total attempts allowed, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.retries + 1
    }
}

/// Runs `f` under this policy, sleeping via `clock` between failed
/// attempts. Returns the last error if every attempt is exhausted.
pub fn retry<T, E>(policy: &Policy, clock: &dyn Clock, mut f: impl FnMut() -> Result<T, E>) -> Result<T, E> {
    let mut attempt = 0;
    loop {
        match f() {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.retries {
                    return Err(err);
                }
                clock.sleep(policy.delay_for(attempt));
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let policy = Policy {
            retries: 5,
            interval: Duration::from_millis(100),
            backoff: 2.0,
            max_interval: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
    }

    #[test]
    fn retry_succeeds_after_transient_failures() {
        let policy = Policy {
            retries: 3,
            interval: Duration::from_millis(10),
            backoff: 1.0,
            max_interval: Duration::from_secs(1),
        };
        let clock = RecordingClock::new();
        let attempts = AtomicU32::new(0);
        let result: Result<&str, &str> = retry(&policy, &clock, || {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err("transient")
            } else {
                Ok("ok")
            }
        });
        assert_eq!(result, Ok("ok"));
        assert_eq!(clock.slept.lock().unwrap().len(), 2);
    }

    #[test]
    fn retry_exhausts_and_returns_last_error() {
        let policy = Policy {
            retries: 2,
            interval: Duration::from_millis(1),
            backoff: 1.0,
            max_interval: Duration::from_secs(1),
        };
        let clock = RecordingClock::new();
        let result: Result<(), &str> = retry(&policy, &clock, || Err("down"));
        assert_eq!(result, Err("down"));
        assert_eq!(clock.slept.lock().unwrap().len(), 2);
    }
}
