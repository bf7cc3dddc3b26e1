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

use crate::queries::InterfaceCounters;
use chrono::{DateTime, Utc};
use sample_sink::{SampleOrigin, TrafficSample};
use std::collections::HashMap;

/// Turns cumulative device counters into per-interval samples.
///
/// Owned by one device's timer task. The first observation of an interface
/// only sets the baseline; a counter that went backwards is taken as a reset
/// and its current value is used as the delta.
#[derive(Debug, Default)]
pub struct CounterTracker {
    previous: HashMap<String, InterfaceCounters>,
}

fn delta(current: u64, previous: u64) -> u64 {
    if current >= previous {
        current - previous
    } else {
        current
    }
}

impl CounterTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(
        &mut self,
        device_id: &str,
        timestamp: DateTime<Utc>,
        interfaces: &[InterfaceCounters],
    ) -> Vec<TrafficSample> {
        let mut samples = Vec::with_capacity(interfaces.len());
        let mut next = HashMap::with_capacity(interfaces.len());

        for current in interfaces {
            if let Some(prev) = self.previous.get(&current.name) {
                samples.push(TrafficSample {
                    device_id: device_id.to_string(),
                    interface: current.name.clone(),
                    timestamp,
                    bytes_in: delta(current.rx_bytes, prev.rx_bytes),
                    bytes_out: delta(current.tx_bytes, prev.tx_bytes),
                    packets_in: delta(current.rx_packets, prev.rx_packets),
                    packets_out: delta(current.tx_packets, prev.tx_packets),
                    origin: SampleOrigin::Polled,
                });
            }
            next.insert(current.name.clone(), current.clone());
        }

        // Interfaces that disappeared are forgotten.
        self.previous = next;
        samples
    }
}
