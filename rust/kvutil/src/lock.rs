/*
 * Copyright 2025 Carver Automation Corporation.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use crate::{KvError, KvStore};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Result of a single non-blocking acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired,
    Held,
    StoreUnavailable,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// Another holder kept the lock for the whole wait budget.
    #[error("lock {key} still held after waiting {waited:?}")]
    Busy { key: String, waited: Duration },
    /// The store could not be reached; the lock is treated as held.
    #[error("lock store unavailable while acquiring {key}: {reason}")]
    StoreUnavailable { key: String, reason: String },
}

/// Named, expiring mutexes over a [`KvStore`].
#[derive(Clone)]
pub struct LockService {
    store: Arc<dyn KvStore>,
    retry_interval: Duration,
}

impl LockService {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval.max(Duration::from_millis(1));
        self
    }

    /// Creates the lock entry only if it is absent or expired. Never waits.
    pub async fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> AcquireOutcome {
        match self
            .store
            .set_if_absent(key, holder.as_bytes().to_vec(), ttl)
            .await
        {
            Ok(true) => AcquireOutcome::Acquired,
            Ok(false) => AcquireOutcome::Held,
            Err(err) => {
                warn!(key, error = %err, "lock store unavailable; failing closed");
                AcquireOutcome::StoreUnavailable
            }
        }
    }

    /// Deletes the lock only while `holder` still owns it.
    pub async fn release(&self, key: &str, holder: &str) -> Result<bool, KvError> {
        self.store.delete_if_equals(key, holder.as_bytes()).await
    }

    /// Repeats non-blocking attempts until the lock is taken or `wait_budget`
    /// runs out. The returned guard releases the lock when released
    /// explicitly or dropped.
    pub async fn acquire_with_budget(
        &self,
        key: &str,
        ttl: Duration,
        wait_budget: Duration,
    ) -> Result<LockGuard, LockError> {
        let holder = Uuid::new_v4().to_string();
        let started = Instant::now();
        let deadline = started + wait_budget;

        loop {
            let outcome = self.try_acquire(key, &holder, ttl).await;
            if outcome == AcquireOutcome::Acquired {
                debug!(key, holder = %holder, "lock acquired");
                return Ok(LockGuard {
                    key: key.to_string(),
                    holder,
                    store: Arc::clone(&self.store),
                    released: false,
                });
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(match outcome {
                    AcquireOutcome::StoreUnavailable => LockError::StoreUnavailable {
                        key: key.to_string(),
                        reason: "store unreachable for the whole wait budget".into(),
                    },
                    _ => LockError::Busy {
                        key: key.to_string(),
                        waited: now - started,
                    },
                });
            }
            sleep(self.retry_interval.min(deadline - now)).await;
        }
    }
}

/// Scoped ownership of a lock.
///
/// Prefer [`LockGuard::release`]; dropping an unreleased guard (for example
/// when the owning future is cancelled by a timeout) spawns the release on
/// the current runtime.
pub struct LockGuard {
    key: String,
    holder: String,
    store: Arc<dyn KvStore>,
    released: bool,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Returns whether this holder still owned the lock when releasing it.
    pub async fn release(mut self) -> bool {
        self.released = true;
        match self
            .store
            .delete_if_equals(&self.key, self.holder.as_bytes())
            .await
        {
            Ok(owned) => {
                if !owned {
                    warn!(key = %self.key, "lock expired before release");
                }
                owned
            }
            Err(err) => {
                warn!(
                    key = %self.key,
                    error = %err,
                    "lock release failed; lock stays held until its ttl expires"
                );
                false
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let key = std::mem::take(&mut self.key);
        let holder = std::mem::take(&mut self.holder);
        let store = Arc::clone(&self.store);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = store.delete_if_equals(&key, holder.as_bytes()).await {
                        warn!(key = %key, error = %err, "deferred lock release failed");
                    } else {
                        debug!(key = %key, "lock released on drop");
                    }
                });
            }
            Err(_) => {
                warn!(key = %key, "lock guard dropped outside a runtime; relying on ttl");
            }
        }
    }
}
