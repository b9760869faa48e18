use std::thread;
use std::time::Duration;
use tracing::debug;

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval_ms: u64) -> Self {
        Self {
            max_attempts,
            interval: Duration::from_millis(interval_ms),
        }
    }
}

pub fn await_ready<S, F>(mut probe: F, policy: RetryPolicy, sleeper: &S) -> bool
where
    S: Sleeper + ?Sized,
    F: FnMut() -> bool,
{
    for attempt in 1..=policy.max_attempts {
        if probe() {
            debug!(attempt, "readiness probe succeeded");
            return true;
        }
        debug!(attempt, max_attempts = policy.max_attempts, "readiness probe failed");
        if attempt < policy.max_attempts {
            sleeper.sleep(policy.interval);
        }
    }
    false
}
