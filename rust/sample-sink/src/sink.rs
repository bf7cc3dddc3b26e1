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

use crate::{ResourceSample, Result, SinkError, TrafficSample};
use async_trait::async_trait;
use parking_lot::Mutex;

/// Append-only destination for samples.
///
/// Implementations must accept out-of-order timestamps; samples from
/// different exporters and pollers interleave freely. A write that stored a
/// prefix of the batch before failing returns [`SinkError::Partial`].
#[async_trait]
pub trait SampleSink: Send + Sync {
    async fn write_traffic(&self, batch: &[TrafficSample]) -> Result<()>;

    async fn write_resources(&self, batch: &[ResourceSample]) -> Result<()>;
}

/// Sink that keeps everything in memory. Failures can be injected to drive
/// retry and drop paths.
#[derive(Default)]
pub struct MemorySink {
    traffic: Mutex<Vec<TrafficSample>>,
    resources: Mutex<Vec<ResourceSample>>,
    failures_remaining: Mutex<usize>,
    partial: Mutex<Option<usize>>,
    attempts: Mutex<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` writes fail.
    pub fn fail_next(&self, count: usize) {
        *self.failures_remaining.lock() = count;
    }

    /// Makes the next write store only its first `count` samples and fail.
    pub fn fail_after(&self, count: usize) {
        *self.partial.lock() = Some(count);
    }

    pub fn traffic(&self) -> Vec<TrafficSample> {
        self.traffic.lock().clone()
    }

    pub fn resources(&self) -> Vec<ResourceSample> {
        self.resources.lock().clone()
    }

    /// Total write calls, failed ones included.
    pub fn attempts(&self) -> usize {
        *self.attempts.lock()
    }

    fn check_failure(&self) -> Result<()> {
        *self.attempts.lock() += 1;
        let mut remaining = self.failures_remaining.lock();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(SinkError::Write("injected failure".into()));
        }
        Ok(())
    }

    fn store<T: Clone>(&self, into: &Mutex<Vec<T>>, batch: &[T]) -> Result<()> {
        self.check_failure()?;
        match self.partial.lock().take() {
            Some(count) if count < batch.len() => {
                into.lock().extend_from_slice(&batch[..count]);
                Err(SinkError::after(
                    count,
                    SinkError::Write("injected failure".into()),
                ))
            }
            _ => {
                into.lock().extend_from_slice(batch);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl SampleSink for MemorySink {
    async fn write_traffic(&self, batch: &[TrafficSample]) -> Result<()> {
        self.store(&self.traffic, batch)
    }

    async fn write_resources(&self, batch: &[ResourceSample]) -> Result<()> {
        self.store(&self.resources, batch)
    }
}
