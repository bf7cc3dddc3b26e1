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

use prometheus::{IntCounter, IntGauge, Opts, Registry};

const NAMESPACE: &str = "device_poller";

#[derive(Clone)]
pub struct PollerMetrics {
    pub polls_started: IntCounter,
    /// Every failed poll, timeouts included.
    pub polls_failed: IntCounter,
    pub polls_timed_out: IntCounter,
    /// Ticks skipped because the queue was full or the device was locked.
    pub polls_skipped: IntCounter,
    /// Samples that could not be persisted after retries.
    pub poll_samples_lost: IntCounter,
    pub devices_scheduled: IntGauge,
    pub devices_degraded: IntGauge,
}

fn counter(name: &str, help: &str) -> prometheus::Result<IntCounter> {
    IntCounter::with_opts(Opts::new(name, help).namespace(NAMESPACE))
}

fn gauge(name: &str, help: &str) -> prometheus::Result<IntGauge> {
    IntGauge::with_opts(Opts::new(name, help).namespace(NAMESPACE))
}

impl PollerMetrics {
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            polls_started: counter("polls_started_total", "Polls handed to a worker")?,
            polls_failed: counter("polls_failed_total", "Polls that failed")?,
            polls_timed_out: counter("polls_timed_out_total", "Polls cancelled by their timeout")?,
            polls_skipped: counter("polls_skipped_total", "Poll ticks that were skipped")?,
            poll_samples_lost: counter(
                "poll_samples_lost_total",
                "Polled samples dropped after sink retries",
            )?,
            devices_scheduled: gauge("devices_scheduled", "Devices with a running poll timer")?,
            devices_degraded: gauge("devices_degraded", "Devices currently marked degraded")?,
        })
    }

    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.polls_started.clone()))?;
        registry.register(Box::new(self.polls_failed.clone()))?;
        registry.register(Box::new(self.polls_timed_out.clone()))?;
        registry.register(Box::new(self.polls_skipped.clone()))?;
        registry.register(Box::new(self.poll_samples_lost.clone()))?;
        registry.register(Box::new(self.devices_scheduled.clone()))?;
        registry.register(Box::new(self.devices_degraded.clone()))?;
        Ok(())
    }
}
