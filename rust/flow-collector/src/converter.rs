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

use crate::FlowRecord;
use sample_sink::{SampleOrigin, TrafficSample};

pub fn interface_name(if_index: u32) -> String {
    format!("ifIndex:{if_index}")
}

/// Turns decoded flows into raw samples: one ingress sample on the input
/// interface and, when the exporter reports one, an egress sample on the
/// output interface. No aggregation happens here.
pub fn to_traffic_samples(device_id: &str, records: &[FlowRecord]) -> Vec<TrafficSample> {
    let mut samples = Vec::with_capacity(records.len() * 2);
    for record in records {
        samples.push(TrafficSample {
            device_id: device_id.to_string(),
            interface: interface_name(record.input_if),
            timestamp: record.end,
            bytes_in: record.bytes,
            bytes_out: 0,
            packets_in: record.packets,
            packets_out: 0,
            origin: SampleOrigin::FlowExport,
        });
        if record.output_if != 0 {
            samples.push(TrafficSample {
                device_id: device_id.to_string(),
                interface: interface_name(record.output_if),
                timestamp: record.end,
                bytes_in: 0,
                bytes_out: record.bytes,
                packets_in: 0,
                packets_out: record.packets,
                origin: SampleOrigin::FlowExport,
            });
        }
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn emits_ingress_and_egress_samples() {
        let mut record = FlowRecord::empty(Utc::now());
        record.bytes = 1500;
        record.packets = 3;
        record.input_if = 2;
        record.output_if = 7;

        let samples = to_traffic_samples("edge-1", &[record.clone()]);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].interface, "ifIndex:2");
        assert_eq!(samples[0].bytes_in, 1500);
        assert_eq!(samples[1].interface, "ifIndex:7");
        assert_eq!(samples[1].packets_out, 3);

        record.output_if = 0;
        assert_eq!(to_traffic_samples("edge-1", &[record]).len(), 1);
    }
}
