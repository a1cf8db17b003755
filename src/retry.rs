use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::GenebaseError;

/// Shared cancellation flag. Sleeps taken through the token wake up as soon
/// as it is cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (lock, cvar) = &*self.inner;
        let mut cancelled = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *cancelled = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn check(&self) -> Result<(), GenebaseError> {
        if self.is_cancelled() {
            return Err(GenebaseError::Cancelled);
        }
        Ok(())
    }

    pub fn sleep(&self, duration: Duration) -> Result<(), GenebaseError> {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now() + duration;
        let mut cancelled = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        loop {
            if *cancelled {
                return Err(GenebaseError::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            let (guard, _) = cvar
                .wait_timeout(cancelled, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            cancelled = guard;
        }
    }
}

/// Bounded attempts with `backoff_unit * 2^attempt` waits between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub backoff_unit: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, backoff_unit: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_unit,
        }
    }

    pub fn delay_for(&self, attempt: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt as u32).unwrap_or(u32::MAX);
        self.backoff_unit.saturating_mul(factor)
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or the
    /// attempt budget is spent. Exhaustion and hard failures both surface as
    /// `GenebaseError::Fetch`; cancellation surfaces as `Cancelled`.
    pub fn run<T, F>(&self, label: &str, cancel: &CancelToken, mut op: F) -> Result<T, GenebaseError>
    where
        F: FnMut(usize) -> Result<T, GenebaseError>,
    {
        let mut attempt = 0usize;
        loop {
            cancel.check()?;
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(GenebaseError::Cancelled) => return Err(GenebaseError::Cancelled),
                Err(err) if err.is_transient() && attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        url = label,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure: {err}"
                    );
                    cancel.sleep(delay)?;
                    attempt += 1;
                }
                Err(err) => {
                    return Err(GenebaseError::Fetch {
                        url: label.to_string(),
                        attempts: attempt + 1,
                        reason: err.to_string(),
                    });
                }
            }
        }
    }
}
