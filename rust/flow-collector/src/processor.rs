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

use crate::{to_traffic_samples, CollectorMetrics, FlowDecoder, FlowRecord};
use sample_sink::TrafficSample;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, warn};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("sample channel closed")]
pub struct ChannelClosed;

/// Decode-convert-enqueue for one listener. Never waits on persistence:
/// batches that do not fit the bounded buffer are dropped and counted.
pub struct FlowProcessor {
    decoder: FlowDecoder,
    exporters: HashMap<IpAddr, String>,
    tx: mpsc::Sender<Vec<TrafficSample>>,
    metrics: CollectorMetrics,
}

impl FlowProcessor {
    pub fn new(
        decoder: FlowDecoder,
        exporters: HashMap<IpAddr, String>,
        tx: mpsc::Sender<Vec<TrafficSample>>,
        metrics: CollectorMetrics,
    ) -> Self {
        Self {
            decoder,
            exporters,
            tx,
            metrics,
        }
    }

    /// Handles one datagram and returns the number of samples enqueued.
    /// Only a closed channel is an error.
    pub fn process(
        &mut self,
        data: &[u8],
        peer: SocketAddr,
        now: Instant,
    ) -> Result<usize, ChannelClosed> {
        self.metrics.packets_received.inc();
        let exporter = peer.ip();

        let decoded = match self.decoder.decode(exporter, data, now) {
            Ok(decoded) => decoded,
            Err(err) if err.is_malformed() => {
                self.metrics.packets_malformed.inc();
                warn!(%exporter, bytes = data.len(), error = %err, "dropping malformed flow packet");
                // Buffered sets this datagram's templates released still count.
                let recovered = self.decoder.take_recovered();
                if recovered.is_empty() {
                    return Ok(0);
                }
                self.metrics.records_decoded.inc_by(recovered.len() as u64);
                return self.enqueue(exporter, &recovered);
            }
            Err(err) => {
                self.metrics.packets_ignored.inc();
                debug!(%exporter, error = %err, "ignoring flow packet");
                return Ok(0);
            }
        };

        self.metrics.records_decoded.inc_by(decoded.records.len() as u64);
        self.metrics.sets_buffered.inc_by(decoded.sets_buffered as u64);
        self.metrics.template_misses.inc_by(decoded.template_misses);
        self.metrics.packets_malformed.inc_by(decoded.malformed_sets);
        self.metrics
            .templates_active
            .set(self.decoder.template_count() as i64);

        debug!(
            %exporter,
            version = decoded.version,
            records = decoded.records.len(),
            buffered = decoded.sets_buffered,
            "decoded flow packet"
        );

        self.enqueue(exporter, &decoded.records)
    }

    fn enqueue(&self, exporter: IpAddr, records: &[FlowRecord]) -> Result<usize, ChannelClosed> {
        if records.is_empty() {
            return Ok(0);
        }
        let samples = to_traffic_samples(&self.device_id(exporter), records);
        let count = samples.len();

        match self.tx.try_send(samples) {
            Ok(()) => Ok(count),
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                self.metrics.samples_dropped.inc_by(dropped.len() as u64);
                warn!(%exporter, samples = dropped.len(), "sample buffer full, dropping samples");
                Ok(0)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("sample channel closed, stopping processor");
                Err(ChannelClosed)
            }
        }
    }

    /// Expires idle templates and data sets that waited too long.
    pub fn sweep(&mut self, now: Instant) {
        let stats = self.decoder.sweep(now);
        if stats.template_misses > 0 {
            warn!(
                discarded = stats.template_misses,
                "discarding data sets whose template never arrived"
            );
        }
        if stats.templates_expired > 0 {
            debug!(expired = stats.templates_expired, "expired idle templates");
        }
        self.metrics.template_misses.inc_by(stats.template_misses);
        self.metrics
            .templates_active
            .set(self.decoder.template_count() as i64);
    }

    fn device_id(&self, exporter: IpAddr) -> String {
        self.exporters
            .get(&exporter)
            .cloned()
            .unwrap_or_else(|| exporter.to_string())
    }
}
