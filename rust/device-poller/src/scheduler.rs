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

use crate::device::{DevicePoller, PollContext};
use crate::worker::{PollJob, PollSubmitter, PollWorkerPool, SubmitError};
use device_gateway::Device;
use rand::Rng;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct TimerSettings {
    /// Used for devices without their own interval.
    pub interval: Duration,
    pub jitter: Duration,
    pub refresh: Duration,
    pub poll_timeout: Duration,
}

impl TimerSettings {
    fn interval_for(&self, device: &Device) -> Duration {
        device
            .poll_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(self.interval)
            .max(Duration::from_secs(1))
    }
}

struct DeviceTimer {
    device: Device,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl DeviceTimer {
    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

/// Keeps one timer task per poll-enabled device and feeds ticks into the
/// worker pool.
pub struct PollScheduler {
    ctx: PollContext,
    pool: PollWorkerPool,
    timers: TimerSettings,
}

impl PollScheduler {
    pub fn new(ctx: PollContext, pool: PollWorkerPool, timers: TimerSettings) -> Self {
        Self { ctx, pool, timers }
    }

    /// Runs until `shutdown` resolves, re-listing the registry every
    /// refresh period. In-flight polls are allowed to finish.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let submitter = self.pool.submitter();
        let mut running: HashMap<String, DeviceTimer> = HashMap::new();
        let mut refresh = tokio::time::interval(self.timers.refresh.max(Duration::from_secs(1)));
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = refresh.tick() => self.reconcile(&submitter, &mut running).await,
            }
        }

        info!(devices = running.len(), "stopping poll scheduler");
        for (_, mut timer) in running.drain() {
            timer.stop();
            timer.handle.abort();
            let _ = timer.handle.await;
        }
        self.ctx.metrics.devices_scheduled.set(0);
        drop(submitter);
        self.pool.shutdown().await;
    }

    async fn reconcile(
        &self,
        submitter: &PollSubmitter,
        running: &mut HashMap<String, DeviceTimer>,
    ) {
        let devices = match self.ctx.registry.list_devices().await {
            Ok(devices) => devices,
            Err(err) => {
                warn!(error = %err, "registry refresh failed; keeping current timers");
                return;
            }
        };
        let wanted: HashMap<String, Device> = devices
            .into_iter()
            .filter(|device| device.poll_enabled)
            .map(|device| (device.id.clone(), device))
            .collect();

        // Removed, disabled and changed devices are stopped; changed ones
        // restart below with the new settings.
        running.retain(|id, timer| {
            let keep = wanted.get(id) == Some(&timer.device);
            if !keep {
                debug!(device_id = %id, "stopping poll timer");
                timer.stop();
            }
            keep
        });

        for (id, device) in wanted {
            if running.contains_key(&id) {
                continue;
            }
            debug!(device_id = %id, "starting poll timer");
            let timer = self.start_timer(device, submitter.clone());
            running.insert(id, timer);
        }

        self.ctx.metrics.devices_scheduled.set(running.len() as i64);
    }

    fn start_timer(&self, device: Device, submitter: PollSubmitter) -> DeviceTimer {
        let (stop_tx, stop_rx) = oneshot::channel();
        let interval = self.timers.interval_for(&device);
        let status_ttl = interval + self.timers.poll_timeout;
        let poller = DevicePoller::new(device.id.clone(), status_ttl);
        let handle = tokio::spawn(device_loop(
            poller,
            self.ctx.clone(),
            submitter,
            interval,
            self.timers.jitter,
            stop_rx,
        ));
        DeviceTimer {
            device,
            stop: Some(stop_tx),
            handle,
        }
    }
}

fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

async fn device_loop(
    mut poller: DevicePoller,
    ctx: PollContext,
    submitter: PollSubmitter,
    interval: Duration,
    max_jitter: Duration,
    mut stop: oneshot::Receiver<()>,
) {
    // The first poll only waits for the jitter so devices spread out.
    let mut delay = jitter(max_jitter);
    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = sleep(delay) => {}
        }
        delay = interval + jitter(max_jitter);

        let (reply_tx, reply_rx) = oneshot::channel();
        let job = PollJob {
            device_id: poller.device_id().to_string(),
            reply: reply_tx,
        };
        match submitter.try_submit(job) {
            Ok(()) => {}
            Err(SubmitError::Full) => {
                ctx.metrics.polls_skipped.inc();
                warn!(device_id = %poller.device_id(), "poll queue full; skipping tick");
                continue;
            }
            Err(SubmitError::Closed) => break,
        }

        let outcome = tokio::select! {
            _ = &mut stop => break,
            outcome = reply_rx => match outcome {
                Ok(outcome) => outcome,
                Err(_) => break,
            },
        };
        poller.record(&ctx, outcome).await;
    }
    debug!(device_id = %poller.device_id(), "poll timer stopped");
}
