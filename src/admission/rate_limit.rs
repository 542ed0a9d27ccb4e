//! Lock-free token bucket.
//!
//! The bucket is kept as a single "theoretical arrival time" (generic cell
//! rate algorithm): the instant at which the bucket would be full again.
//! Admitting a caller pushes that instant one refill interval forward; the
//! caller is rejected if this would put it more than `capacity` intervals
//! ahead of now. A rejection leaves the state untouched.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::AdmissionPolicy;

/// A token bucket with atomic accounting.
#[derive(Debug)]
pub struct TokenBucket {
    /// Nanoseconds per token.
    interval: u64,
    /// Nanoseconds of credit a full bucket represents.
    burst: u64,
    /// Theoretical arrival time, in nanoseconds since the owner's epoch.
    tat: AtomicU64,
}

impl TokenBucket {
    pub fn new(policy: &AdmissionPolicy) -> Self {
        let interval = Duration::from_millis(policy.refill_interval_ms)
            .as_nanos()
            .clamp(1, u64::MAX as u128) as u64;
        Self {
            interval,
            burst: interval.saturating_mul(u64::from(policy.capacity)),
            tat: AtomicU64::new(0),
        }
    }

    /// Take one token at time `now` (nanoseconds since epoch).
    pub fn try_acquire(&self, now: u64) -> bool {
        let mut current = self.tat.load(Ordering::Acquire);
        loop {
            let next = current.max(now).saturating_add(self.interval);
            if next - now > self.burst {
                return false;
            }
            match self
                .tat
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Whole tokens available at `now`.
    pub fn available(&self, now: u64) -> u64 {
        let tat = self.tat.load(Ordering::Acquire).max(now);
        self.burst.saturating_sub(tat - now) / self.interval
    }

    /// Whether the bucket has fully refilled by `now`.
    pub fn is_full(&self, now: u64) -> bool {
        self.tat.load(Ordering::Acquire) <= now
    }
}
