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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleOrigin {
    FlowExport,
    Polled,
}

/// Per-interface traffic counters, keyed in the sink by
/// `(device_id, interface, timestamp)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficSample {
    pub device_id: String,
    pub interface: String,
    pub timestamp: DateTime<Utc>,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub packets_in: u64,
    pub packets_out: u64,
    pub origin: SampleOrigin,
}

/// Device health gathered by the poller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub cpu_load_percent: f64,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    pub active_sessions: u64,
    pub uptime_seconds: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn traffic_sample_serializes_origin_in_snake_case() {
        let sample = TrafficSample {
            device_id: "r1".into(),
            interface: "ether1".into(),
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            bytes_in: 1500,
            bytes_out: 0,
            packets_in: 1,
            packets_out: 0,
            origin: SampleOrigin::FlowExport,
        };
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["origin"], "flow_export");
        assert_eq!(json["timestamp"], "2025-03-01T12:00:00Z");
    }
}
