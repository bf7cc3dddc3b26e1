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

use crate::metrics::PollerMetrics;
use crate::poll::{run_poll, PollOutcome, PollSettings};
use device_gateway::CommandGateway;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct PollJob {
    pub device_id: String,
    pub reply: oneshot::Sender<PollOutcome>,
}

/// Error returned when a job cannot be queued.
#[derive(Debug, PartialEq, Eq)]
pub enum SubmitError {
    /// Every worker is busy and the queue is at capacity.
    Full,
    Closed,
}

/// Fixed set of workers draining a bounded job queue. The worker count is
/// the global cap on in-flight polls.
pub struct PollWorkerPool {
    tx: mpsc::Sender<PollJob>,
    workers: Vec<JoinHandle<()>>,
}

/// Cloneable handle for queueing jobs.
#[derive(Clone)]
pub struct PollSubmitter {
    tx: mpsc::Sender<PollJob>,
}

impl PollSubmitter {
    pub fn try_submit(&self, job: PollJob) -> Result<(), SubmitError> {
        self.tx.try_send(job).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => SubmitError::Full,
            mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
        })
    }
}

impl PollWorkerPool {
    pub fn spawn(
        gateway: Arc<CommandGateway>,
        settings: PollSettings,
        metrics: PollerMetrics,
        workers: usize,
        queue_depth: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<PollJob>(queue_depth.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let workers = (0..workers.max(1))
            .map(|id| {
                let rx = Arc::clone(&rx);
                let gateway = Arc::clone(&gateway);
                let metrics = metrics.clone();
                tokio::spawn(async move {
                    loop {
                        // Hold the receiver lock only while waiting for a job.
                        let job = { rx.lock().await.recv().await };
                        let Some(job) = job else { break };

                        metrics.polls_started.inc();
                        let outcome = run_poll(&gateway, &job.device_id, &settings).await;
                        if job.reply.send(outcome).is_err() {
                            debug!(device_id = %job.device_id, "poll result discarded; timer stopped");
                        }
                    }
                    debug!(worker = id, "poll worker exiting");
                })
            })
            .collect();
        Self { tx, workers }
    }

    pub fn submitter(&self) -> PollSubmitter {
        PollSubmitter {
            tx: self.tx.clone(),
        }
    }

    /// Closes the queue and waits for in-flight polls to finish. Submitter
    /// clones must be dropped first or the workers keep waiting.
    pub async fn shutdown(self) {
        drop(self.tx);
        for worker in self.workers {
            let _ = worker.await;
        }
        info!("poll workers stopped");
    }
}
