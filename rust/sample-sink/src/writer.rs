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

use crate::{write_traffic_with_retry, RetryPolicy, SampleSink, SinkMetrics, TrafficSample};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub workers: usize,
    pub retry: RetryPolicy,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            flush_interval: Duration::from_secs(1),
            workers: 2,
            retry: RetryPolicy::default(),
        }
    }
}

/// Persistence workers draining the bounded sample buffer.
///
/// Producers hand batches over with `try_send` on the paired sender and never
/// wait on the sink; the workers batch by size or flush interval and give up
/// on a batch once the retry policy is exhausted.
pub struct BatchWriter {
    sink: Arc<dyn SampleSink>,
    rx: Arc<Mutex<mpsc::Receiver<Vec<TrafficSample>>>>,
    config: WriterConfig,
    metrics: SinkMetrics,
}

impl BatchWriter {
    pub fn new(
        sink: Arc<dyn SampleSink>,
        rx: mpsc::Receiver<Vec<TrafficSample>>,
        config: WriterConfig,
        metrics: SinkMetrics,
    ) -> Self {
        Self {
            sink,
            rx: Arc::new(Mutex::new(rx)),
            config,
            metrics,
        }
    }

    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        let workers = self.config.workers.max(1);
        info!(workers, batch_size = self.config.batch_size, "starting sink writers");
        (0..workers)
            .map(|worker| {
                let sink = Arc::clone(&self.sink);
                let rx = Arc::clone(&self.rx);
                let config = self.config.clone();
                let metrics = self.metrics.clone();
                tokio::spawn(run_worker(worker, sink, rx, config, metrics))
            })
            .collect()
    }
}

async fn run_worker(
    worker: usize,
    sink: Arc<dyn SampleSink>,
    rx: Arc<Mutex<mpsc::Receiver<Vec<TrafficSample>>>>,
    config: WriterConfig,
    metrics: SinkMetrics,
) {
    let batch_size = config.batch_size.max(1);
    let mut batch: Vec<TrafficSample> = Vec::with_capacity(batch_size);
    let mut ticker = interval(config.flush_interval.max(Duration::from_millis(10)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let received = {
            let mut rx = rx.lock().await;
            tokio::select! {
                msg = rx.recv() => Some(msg),
                _ = ticker.tick() => None,
            }
        };

        match received {
            Some(Some(samples)) => {
                batch.extend(samples);
                if batch.len() >= batch_size {
                    flush(worker, sink.as_ref(), &mut batch, &config.retry, &metrics).await;
                }
            }
            Some(None) => {
                flush(worker, sink.as_ref(), &mut batch, &config.retry, &metrics).await;
                debug!(worker, "sample channel closed; writer exiting");
                return;
            }
            None => flush(worker, sink.as_ref(), &mut batch, &config.retry, &metrics).await,
        }
    }
}

async fn flush(
    worker: usize,
    sink: &dyn SampleSink,
    batch: &mut Vec<TrafficSample>,
    retry: &RetryPolicy,
    metrics: &SinkMetrics,
) {
    if batch.is_empty() {
        return;
    }
    let count = batch.len() as u64;
    match write_traffic_with_retry(sink, batch, retry).await {
        Ok(()) => metrics.samples_written.inc_by(count),
        Err(err) => {
            let stored = err.written() as u64;
            let dropped = count - stored;
            warn!(worker, samples = dropped, error = %err, "dropping batch after retries");
            metrics.samples_written.inc_by(stored);
            metrics.write_failures.inc();
            metrics.samples_dropped_after_retry.inc_by(dropped);
        }
    }
    batch.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemorySink, SampleOrigin};
    use chrono::Utc;

    fn sample(n: u64) -> TrafficSample {
        TrafficSample {
            device_id: "r1".into(),
            interface: format!("ifIndex:{n}"),
            timestamp: Utc::now(),
            bytes_in: n,
            bytes_out: 0,
            packets_in: 1,
            packets_out: 0,
            origin: SampleOrigin::FlowExport,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn drains_channel_and_flushes_on_close() {
        let sink = Arc::new(MemorySink::new());
        let (tx, rx) = mpsc::channel(8);
        let metrics = SinkMetrics::new("test").unwrap();
        let config = WriterConfig {
            batch_size: 3,
            workers: 1,
            ..WriterConfig::default()
        };
        let handles = BatchWriter::new(sink.clone(), rx, config, metrics.clone()).spawn();

        tx.send(vec![sample(1), sample(2)]).await.unwrap();
        tx.send(vec![sample(3)]).await.unwrap();
        tx.send(vec![sample(4)]).await.unwrap();
        drop(tx);
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(sink.traffic().len(), 4);
        assert_eq!(metrics.samples_written.get(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_failures_drop_the_batch_and_count_it() {
        let sink = Arc::new(MemorySink::new());
        sink.fail_next(usize::MAX);
        let (tx, rx) = mpsc::channel(8);
        let metrics = SinkMetrics::new("test").unwrap();
        let config = WriterConfig {
            batch_size: 2,
            workers: 1,
            retry: RetryPolicy {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(10),
                max_backoff: Duration::from_millis(10),
            },
            ..WriterConfig::default()
        };
        let handles = BatchWriter::new(sink.clone(), rx, config, metrics.clone()).spawn();

        tx.send(vec![sample(1), sample(2)]).await.unwrap();
        drop(tx);
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(sink.traffic().is_empty());
        assert_eq!(sink.attempts(), 2);
        assert_eq!(metrics.write_failures.get(), 1);
        assert_eq!(metrics.samples_dropped_after_retry.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_write_is_not_duplicated_on_retry() {
        let sink = Arc::new(MemorySink::new());
        sink.fail_after(1);
        let (tx, rx) = mpsc::channel(8);
        let metrics = SinkMetrics::new("test").unwrap();
        let config = WriterConfig {
            batch_size: 3,
            workers: 1,
            ..WriterConfig::default()
        };
        let handles = BatchWriter::new(sink.clone(), rx, config, metrics.clone()).spawn();

        tx.send(vec![sample(1), sample(2), sample(3)]).await.unwrap();
        drop(tx);
        for handle in handles {
            handle.await.unwrap();
        }

        let written: Vec<u64> = sink.traffic().iter().map(|s| s.bytes_in).collect();
        assert_eq!(written, vec![1, 2, 3]);
        assert_eq!(metrics.samples_written.get(), 3);
        assert_eq!(metrics.samples_dropped_after_retry.get(), 0);
    }
}
