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

use crate::{ResourceSample, Result, SampleSink, SinkError, TrafficSample};
use std::cmp::min;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, with `attempt` starting at 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let delay = self
            .initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff);
        min(delay, self.max_backoff)
    }
}

/// Writes `batch`, resuming after the samples a failed attempt already
/// stored.
pub async fn write_traffic_with_retry(
    sink: &dyn SampleSink,
    batch: &[TrafficSample],
    policy: &RetryPolicy,
) -> Result<()> {
    let mut attempt: u32 = 0;
    let mut stored = 0;
    loop {
        attempt += 1;
        match sink.write_traffic(&batch[stored..]).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                let written = err.written();
                if attempt >= policy.max_attempts.max(1) {
                    return Err(SinkError::after(stored + written, err));
                }
                stored += written;
                let delay = policy.backoff(attempt);
                warn!(attempt, stored, error = %err, ?delay, "traffic write failed; retrying");
                sleep(delay).await;
            }
        }
    }
}

pub async fn write_resources_with_retry(
    sink: &dyn SampleSink,
    batch: &[ResourceSample],
    policy: &RetryPolicy,
) -> Result<()> {
    let mut attempt: u32 = 0;
    let mut stored = 0;
    loop {
        attempt += 1;
        match sink.write_resources(&batch[stored..]).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                let written = err.written();
                if attempt >= policy.max_attempts.max(1) {
                    return Err(SinkError::after(stored + written, err));
                }
                stored += written;
                let delay = policy.backoff(attempt);
                warn!(attempt, stored, error = %err, ?delay, "resource write failed; retrying");
                sleep(delay).await;
            }
        }
    }
}
