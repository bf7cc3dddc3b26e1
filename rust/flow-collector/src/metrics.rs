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

const NAMESPACE: &str = "flow_collector";

/// Counters for the receive and decode path. Clones share the underlying
/// series.
#[derive(Clone)]
pub struct CollectorMetrics {
    pub packets_received: IntCounter,
    pub packets_malformed: IntCounter,
    /// Datagrams of a disabled export format.
    pub packets_ignored: IntCounter,
    pub records_decoded: IntCounter,
    pub sets_buffered: IntCounter,
    pub template_misses: IntCounter,
    /// Samples discarded because the persistence buffer was full.
    pub samples_dropped: IntCounter,
    pub templates_active: IntGauge,
}

fn counter(name: &str, help: &str) -> prometheus::Result<IntCounter> {
    IntCounter::with_opts(Opts::new(name, help).namespace(NAMESPACE))
}

impl CollectorMetrics {
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            packets_received: counter("packets_received_total", "Datagrams received")?,
            packets_malformed: counter("packets_malformed_total", "Datagrams that failed to decode")?,
            packets_ignored: counter("packets_ignored_total", "Datagrams of a disabled format")?,
            records_decoded: counter("records_decoded_total", "Flow records decoded")?,
            sets_buffered: counter("sets_buffered_total", "Data sets parked awaiting a template")?,
            template_misses: counter(
                "template_misses_total",
                "Data sets discarded because their template never arrived",
            )?,
            samples_dropped: counter(
                "samples_dropped_total",
                "Samples dropped because the persistence buffer was full",
            )?,
            templates_active: IntGauge::with_opts(
                Opts::new("templates_active", "Templates currently cached").namespace(NAMESPACE),
            )?,
        })
    }

    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.packets_received.clone()))?;
        registry.register(Box::new(self.packets_malformed.clone()))?;
        registry.register(Box::new(self.packets_ignored.clone()))?;
        registry.register(Box::new(self.records_decoded.clone()))?;
        registry.register(Box::new(self.sets_buffered.clone()))?;
        registry.register(Box::new(self.template_misses.clone()))?;
        registry.register(Box::new(self.samples_dropped.clone()))?;
        registry.register(Box::new(self.templates_active.clone()))?;
        Ok(())
    }
}
