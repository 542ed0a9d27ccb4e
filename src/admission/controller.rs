//! Admission controller: per-class token budgets for new callers.

use std::collections::HashMap;
use std::time::Instant;

use dashmap::DashMap;
use thiserror::Error;

use crate::admission::rate_limit::TokenBucket;
use crate::config::{AdmissionConfig, AdmissionPolicy};
use crate::observability::metrics;

/// Error type for admission configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmissionConfigError {
    /// A policy would never refill.
    #[error("admission class {class:?}: refill interval must be greater than 0")]
    ZeroRefillInterval { class: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    class: String,
    key: Option<String>,
}

/// Rate limiter gating new connections and logins.
///
/// Each `(class, key)` pair gets its own bucket, so exhausting one class
/// (or one remote address) never spends another's tokens.
#[derive(Debug)]
pub struct AdmissionController {
    default_policy: AdmissionPolicy,
    policies: HashMap<String, AdmissionPolicy>,
    buckets: DashMap<BucketKey, TokenBucket>,
    epoch: Instant,
}

impl AdmissionController {
    pub fn new(config: &AdmissionConfig) -> Result<Self, AdmissionConfigError> {
        if config.default.refill_interval_ms == 0 {
            return Err(AdmissionConfigError::ZeroRefillInterval {
                class: "default".to_string(),
            });
        }
        for (class, policy) in &config.classes {
            if policy.refill_interval_ms == 0 {
                return Err(AdmissionConfigError::ZeroRefillInterval {
                    class: class.clone(),
                });
            }
        }

        Ok(Self {
            default_policy: config.default,
            policies: config.classes.clone(),
            buckets: DashMap::new(),
            epoch: Instant::now(),
        })
    }

    /// Admit one caller of `class`. Never blocks.
    pub fn try_admit(&self, class: &str) -> bool {
        self.admit_at(class, None, Instant::now())
    }

    /// Admit one caller of `class` identified by `key` (e.g. a remote IP).
    pub fn try_admit_from(&self, class: &str, key: &str) -> bool {
        self.admit_at(class, Some(key), Instant::now())
    }

    /// Tokens currently available to `class`.
    pub fn available(&self, class: &str) -> u64 {
        let key = BucketKey {
            class: class.to_string(),
            key: None,
        };
        let now = self.nanos_since_epoch(Instant::now());
        match self.buckets.get(&key) {
            Some(bucket) => bucket.available(now),
            None => u64::from(self.policy_for(class).capacity),
        }
    }

    /// Drop buckets that have fully refilled; they carry no state.
    ///
    /// Returns the number of buckets removed.
    pub fn prune(&self) -> usize {
        let now = self.nanos_since_epoch(Instant::now());
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| !bucket.is_full(now));
        before.saturating_sub(self.buckets.len())
    }

    /// Policy applied to `class`; unknown classes use the default.
    pub fn policy_for(&self, class: &str) -> AdmissionPolicy {
        self.policies
            .get(class)
            .copied()
            .unwrap_or(self.default_policy)
    }

    pub(crate) fn admit_at(&self, class: &str, key: Option<&str>, at: Instant) -> bool {
        let now = self.nanos_since_epoch(at);
        let bucket_key = BucketKey {
            class: class.to_string(),
            key: key.map(str::to_string),
        };
        // The token is taken while the map entry is held, so `prune` cannot
        // swap the bucket out from under an admission. The read guard is
        // dropped before `entry` takes the shard's write lock.
        let existing = self.buckets.get(&bucket_key).map(|bucket| bucket.try_acquire(now));
        let admitted = match existing {
            Some(admitted) => admitted,
            None => {
                let policy = self.policy_for(class);
                self.buckets
                    .entry(bucket_key)
                    .or_insert_with(|| TokenBucket::new(&policy))
                    .try_acquire(now)
            }
        };

        if !admitted {
            tracing::debug!(class = %class, key = ?key, "Admission rejected");
            metrics::record_admission_rejected(class);
        }
        admitted
    }

    fn nanos_since_epoch(&self, at: Instant) -> u64 {
        at.saturating_duration_since(self.epoch)
            .as_nanos()
            .min(u64::MAX as u128) as u64
    }
}
