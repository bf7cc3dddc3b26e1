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

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::net::{IpAddr, Ipv4Addr};

/// One decoded flow, independent of the export format it arrived in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRecord {
    pub src_addr: IpAddr,
    pub dst_addr: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
    pub tcp_flags: u8,
    pub tos: u8,
    pub bytes: u64,
    pub packets: u64,
    pub input_if: u32,
    pub output_if: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FlowRecord {
    pub(crate) fn empty(at: DateTime<Utc>) -> Self {
        Self {
            src_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            dst_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            src_port: 0,
            dst_port: 0,
            protocol: 0,
            tcp_flags: 0,
            tos: 0,
            bytes: 0,
            packets: 0,
            input_if: 0,
            output_if: 0,
            start: at,
            end: at,
        }
    }
}

/// Export timestamp carried in a packet header.
pub(crate) fn export_time(secs: u32, nanos: u32) -> DateTime<Utc> {
    Utc.timestamp_opt(i64::from(secs), nanos.min(999_999_999))
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Wall-clock time of an event stamped `event_uptime_ms` after the exporter
/// booted, given the exporter's uptime when the packet was sent. Uptime
/// counters wrap at 2^32 ms.
pub(crate) fn uptime_to_wall(
    export: DateTime<Utc>,
    sys_uptime_ms: u32,
    event_uptime_ms: u32,
) -> DateTime<Utc> {
    let age_ms = sys_uptime_ms.wrapping_sub(event_uptime_ms);
    export - Duration::milliseconds(i64::from(age_ms))
}
