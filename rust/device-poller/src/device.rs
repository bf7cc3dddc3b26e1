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

use crate::deltas::CounterTracker;
use crate::metrics::PollerMetrics;
use crate::poll::PollOutcome;
use crate::queries::PollReport;
use chrono::{DateTime, Utc};
use device_gateway::{DeviceRegistry, DeviceStatus, Reachability};
use kvutil::{keys, Cache};
use sample_sink::{write_resources_with_retry, write_traffic_with_retry, RetryPolicy, SampleSink};
use prometheus::IntGauge;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Collaborators shared by every device timer.
#[derive(Clone)]
pub struct PollContext {
    pub registry: Arc<dyn DeviceRegistry>,
    pub cache: Cache,
    pub sink: Arc<dyn SampleSink>,
    pub retry: RetryPolicy,
    pub metrics: PollerMetrics,
    /// Consecutive failures before a device is reported degraded.
    pub degraded_threshold: u32,
}

/// Per-device poll state, owned by that device's timer task.
///
/// A degraded poller holds one unit of the `devices_degraded` gauge and
/// gives it back on recovery or when dropped, so stopped timers do not leave
/// the gauge behind.
pub struct DevicePoller {
    device_id: String,
    status_ttl: Duration,
    tracker: CounterTracker,
    consecutive_failures: u32,
    degraded: Option<IntGauge>,
    last_success: Option<DateTime<Utc>>,
}

impl DevicePoller {
    pub fn new(device_id: impl Into<String>, status_ttl: Duration) -> Self {
        Self {
            device_id: device_id.into(),
            status_ttl,
            tracker: CounterTracker::new(),
            consecutive_failures: 0,
            degraded: None,
            last_success: None,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    /// Applies the result of one poll. Returns the status that was
    /// published, if any.
    pub async fn record(
        &mut self,
        ctx: &PollContext,
        outcome: PollOutcome,
    ) -> Option<DeviceStatus> {
        match outcome {
            PollOutcome::Success(report) => Some(self.record_success(ctx, report).await),
            PollOutcome::Failed(error) => Some(self.record_failure(ctx, error).await),
            PollOutcome::TimedOut => {
                ctx.metrics.polls_timed_out.inc();
                Some(self.record_failure(ctx, "poll timed out".to_string()).await)
            }
            PollOutcome::Skipped(reason) => {
                ctx.metrics.polls_skipped.inc();
                info!(device_id = %self.device_id, %reason, "poll skipped");
                None
            }
        }
    }

    async fn record_success(&mut self, ctx: &PollContext, report: PollReport) -> DeviceStatus {
        let samples = self
            .tracker
            .observe(&self.device_id, report.timestamp, &report.interfaces);

        // A lost sample does not fail the poll.
        if !samples.is_empty() {
            if let Err(err) = write_traffic_with_retry(ctx.sink.as_ref(), &samples, &ctx.retry).await
            {
                let lost = samples.len() - err.written();
                ctx.metrics.poll_samples_lost.inc_by(lost as u64);
                warn!(device_id = %self.device_id, error = %err, "dropping polled traffic samples");
            }
        }
        let resources = std::slice::from_ref(&report.resources);
        if let Err(err) = write_resources_with_retry(ctx.sink.as_ref(), resources, &ctx.retry).await {
            ctx.metrics.poll_samples_lost.inc();
            warn!(device_id = %self.device_id, error = %err, "dropping polled resource sample");
        }

        if let Some(gauge) = self.degraded.take() {
            gauge.dec();
            info!(
                device_id = %self.device_id,
                after_failures = self.consecutive_failures,
                "device recovered"
            );
        }
        self.consecutive_failures = 0;
        self.last_success = Some(report.timestamp);

        ctx.cache
            .set(&keys::poll_result(&self.device_id), &report.resources, self.status_ttl)
            .await;
        let status = DeviceStatus::up(&self.device_id, report.timestamp);
        self.publish(ctx, &status).await;
        status
    }

    async fn record_failure(&mut self, ctx: &PollContext, error: String) -> DeviceStatus {
        ctx.metrics.polls_failed.inc();
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        if self.degraded.is_none() && self.consecutive_failures >= ctx.degraded_threshold.max(1) {
            ctx.metrics.devices_degraded.inc();
            self.degraded = Some(ctx.metrics.devices_degraded.clone());
            warn!(
                device_id = %self.device_id,
                failures = self.consecutive_failures,
                %error,
                "device marked degraded"
            );
        } else {
            warn!(
                device_id = %self.device_id,
                failures = self.consecutive_failures,
                %error,
                "poll failed"
            );
        }

        let reachability = if self.is_degraded() {
            Reachability::Degraded
        } else if self.last_success.is_some() {
            Reachability::Up
        } else {
            Reachability::Unknown
        };
        let status = DeviceStatus {
            device_id: self.device_id.clone(),
            reachability,
            consecutive_failures: self.consecutive_failures,
            last_success: self.last_success,
            last_error: Some(error),
            updated_at: Utc::now(),
        };
        self.publish(ctx, &status).await;
        status
    }

    async fn publish(&self, ctx: &PollContext, status: &DeviceStatus) {
        ctx.cache
            .set(&keys::device_status(&self.device_id), status, self.status_ttl)
            .await;
        if let Err(err) = ctx.registry.record_status(status).await {
            warn!(device_id = %self.device_id, error = %err, "failed to record device status");
        }
    }
}

impl Drop for DevicePoller {
    fn drop(&mut self) {
        if let Some(gauge) = self.degraded.take() {
            gauge.dec();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use device_gateway::StaticRegistry;
    use kvutil::MemoryStore;
    use sample_sink::{MemorySink, ResourceSample};

    use crate::queries::InterfaceCounters;

    fn context(sink: Arc<MemorySink>, registry: Arc<StaticRegistry>) -> PollContext {
        PollContext {
            registry,
            cache: Cache::new(Arc::new(MemoryStore::new())),
            sink,
            retry: RetryPolicy {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(1),
            },
            metrics: PollerMetrics::new().unwrap(),
            degraded_threshold: 3,
        }
    }

    fn report(rx: u64) -> PollReport {
        let timestamp = Utc::now();
        PollReport {
            timestamp,
            interfaces: vec![InterfaceCounters {
                name: "ether1".into(),
                rx_bytes: rx,
                tx_bytes: rx * 2,
                rx_packets: 10,
                tx_packets: 20,
            }],
            resources: ResourceSample {
                device_id: "r1".into(),
                timestamp,
                cpu_load_percent: 3.0,
                memory_used_bytes: 1,
                memory_total_bytes: 2,
                active_sessions: 0,
                uptime_seconds: Some(60),
            },
        }
    }

    #[tokio::test]
    async fn degrades_after_threshold_and_recovers_on_success() {
        let registry = Arc::new(StaticRegistry::new(vec![]));
        let ctx = context(Arc::new(MemorySink::new()), Arc::clone(&registry));
        let mut poller = DevicePoller::new("r1", Duration::from_secs(60));

        for expected in 1..=2 {
            let status = poller
                .record(&ctx, PollOutcome::Failed("refused".into()))
                .await
                .unwrap();
            assert_eq!(status.consecutive_failures, expected);
            assert_eq!(status.reachability, Reachability::Unknown);
        }
        let status = poller.record(&ctx, PollOutcome::TimedOut).await.unwrap();
        assert_eq!(status.reachability, Reachability::Degraded);
        assert_eq!(ctx.metrics.devices_degraded.get(), 1);
        assert_eq!(ctx.metrics.polls_failed.get(), 3);
        assert_eq!(ctx.metrics.polls_timed_out.get(), 1);

        // Further failures keep the device degraded without double counting.
        poller.record(&ctx, PollOutcome::TimedOut).await;
        assert_eq!(ctx.metrics.devices_degraded.get(), 1);

        let status = poller.record(&ctx, PollOutcome::Success(report(100))).await.unwrap();
        assert_eq!(status.reachability, Reachability::Up);
        assert_eq!(status.consecutive_failures, 0);
        assert!(!poller.is_degraded());
        assert_eq!(ctx.metrics.devices_degraded.get(), 0);
        assert_eq!(registry.status("r1").unwrap().reachability, Reachability::Up);

        let cached: DeviceStatus = ctx.cache.get(&keys::device_status("r1")).await.unwrap();
        assert_eq!(cached.reachability, Reachability::Up);
    }

    #[tokio::test]
    async fn skipped_polls_leave_health_alone() {
        let registry = Arc::new(StaticRegistry::new(vec![]));
        let ctx = context(Arc::new(MemorySink::new()), registry);
        let mut poller = DevicePoller::new("r1", Duration::from_secs(60));

        poller.record(&ctx, PollOutcome::Failed("refused".into())).await;
        assert!(poller
            .record(&ctx, PollOutcome::Skipped("busy".into()))
            .await
            .is_none());
        assert_eq!(poller.consecutive_failures(), 1);
        assert_eq!(ctx.metrics.polls_skipped.get(), 1);
    }

    #[tokio::test]
    async fn sink_failure_loses_samples_but_completes_the_poll() {
        let sink = Arc::new(MemorySink::new());
        let ctx = context(Arc::clone(&sink), Arc::new(StaticRegistry::new(vec![])));
        let mut poller = DevicePoller::new("r1", Duration::from_secs(60));

        poller.record(&ctx, PollOutcome::Success(report(100))).await;
        assert_eq!(sink.resources().len(), 1);
        assert!(sink.traffic().is_empty());

        sink.fail_next(2);
        let status = poller.record(&ctx, PollOutcome::Success(report(400))).await.unwrap();
        assert_eq!(status.reachability, Reachability::Up);
        assert_eq!(ctx.metrics.poll_samples_lost.get(), 1);
        assert!(sink.traffic().is_empty());
        assert_eq!(sink.resources().len(), 2);
    }

    #[tokio::test]
    async fn dropping_a_degraded_poller_releases_the_gauge() {
        let ctx = context(
            Arc::new(MemorySink::new()),
            Arc::new(StaticRegistry::new(vec![])),
        );
        let mut healthy = DevicePoller::new("r1", Duration::from_secs(60));
        let mut failing = DevicePoller::new("r2", Duration::from_secs(60));
        healthy.record(&ctx, PollOutcome::Success(report(100))).await;
        for _ in 0..3 {
            failing.record(&ctx, PollOutcome::TimedOut).await;
        }
        assert!(failing.is_degraded());
        assert_eq!(ctx.metrics.devices_degraded.get(), 1);

        drop(healthy);
        assert_eq!(ctx.metrics.devices_degraded.get(), 1);
        drop(failing);
        assert_eq!(ctx.metrics.devices_degraded.get(), 0);
    }
}
