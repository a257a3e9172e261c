//! Opt-in retry for transport failures.
//!
//! Only [`FetchErrorKind::Transport`] is retried. A rate-limit response is
//! returned to the caller immediately so it can back off between runs.

use std::time::Duration;

use rand::Rng;

use crate::error::{FetchError, FetchErrorKind};
use crate::logging::Reporter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Linear backoff with up to 50% random jitter.
    pub fn delay_for(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let base_ms = u64::try_from(self.base_delay.as_millis())
            .unwrap_or(u64::MAX)
            .saturating_mul(u64::from(attempt.max(1)));
        let jitter_ms = rng.gen_range(0..=base_ms / 2);
        Duration::from_millis(base_ms.saturating_add(jitter_ms))
    }

    pub fn run<T>(
        &self,
        reporter: &dyn Reporter,
        mut op: impl FnMut() -> Result<T, FetchError>,
    ) -> Result<T, FetchError> {
        let mut rng = rand::thread_rng();
        let mut attempt = 0u32;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.kind == FetchErrorKind::Transport && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.delay_for(attempt, &mut rng);
                    reporter.warn(&format!(
                        "{err}; retry {attempt}/{} in {:.1}s",
                        self.max_retries,
                        delay.as_secs_f64()
                    ));
                    std::thread::sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }
}
