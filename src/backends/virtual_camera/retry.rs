// SPDX-License-Identifier: GPL-3.0-only

//! Bounded retry with linear backoff for attaching to a published source

use crate::constants::retry;
use crate::errors::InputError;
use std::time::Duration;
use tracing::{debug, warn};

/// How many times to try, and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay after attempt `n` (1-based) is `base_delay * n`
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: retry::MAX_ATTEMPTS,
            base_delay: retry::BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Run `op` until it succeeds or attempts run out
    ///
    /// If every attempt failed with `NotFound`, that error is returned as is.
    /// Otherwise the result is [`InputError::Exhausted`] carrying the last error.
    pub fn run<T, F>(&self, what: &str, mut op: F) -> Result<T, InputError>
    where
        F: FnMut(u32) -> Result<T, InputError>,
    {
        let attempts = self.max_attempts.max(1);
        let mut all_not_found = true;
        let mut last = None;

        for attempt in 1..=attempts {
            match op(attempt) {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(what, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    all_not_found &= e.is_not_found();
                    if attempt < attempts {
                        let delay = self.delay_after(attempt);
                        warn!(what, attempt, max = attempts, ?delay, error = %e, "Attempt failed, retrying");
                        std::thread::sleep(delay);
                    } else {
                        warn!(what, attempt, error = %e, "Final attempt failed");
                    }
                    last = Some(e);
                }
            }
        }

        match last {
            Some(e) if all_not_found => Err(e),
            Some(e) => Err(InputError::Exhausted {
                attempts,
                last: e.to_string(),
            }),
            None => Err(InputError::Exhausted {
                attempts,
                last: "no attempt made".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(200));
        assert_eq!(policy.delay_after(2), Duration::from_millis(400));
    }

    #[test]
    fn test_succeeds_after_transient_failures() {
        let result = fast(3).run("test", |attempt| {
            if attempt < 3 {
                Err(InputError::Pipeline("busy".into()))
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result, Ok(3));
    }

    #[test]
    fn test_exhausted_is_distinct_from_not_found() {
        let mut calls = 0;
        let result: Result<(), _> = fast(3).run("test", |_| {
            calls += 1;
            Err(InputError::Pipeline("busy".into()))
        });
        assert_eq!(calls, 3);
        assert!(matches!(result, Err(InputError::Exhausted { attempts: 3, .. })));

        let result: Result<(), _> =
            fast(2).run("test", |_| Err(InputError::NotFound("camfx".into())));
        assert_eq!(result, Err(InputError::NotFound("camfx".into())));
    }
}
