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

//! Legacy fixed-format NetFlow v5.

use crate::record::{export_time, uptime_to_wall};
use crate::wire::Reader;
use crate::{DecodeError, FlowRecord};
use bytes::{BufMut, BytesMut};
use std::net::{IpAddr, Ipv4Addr};

pub const V5_VERSION: u16 = 5;
pub const V5_HEADER_LEN: usize = 24;
pub const V5_RECORD_LEN: usize = 48;
pub const V5_MAX_RECORDS: u16 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V5Header {
    pub count: u16,
    pub sys_uptime_ms: u32,
    pub unix_secs: u32,
    pub unix_nsecs: u32,
    pub flow_sequence: u32,
    pub engine_type: u8,
    pub engine_id: u8,
    pub sampling_interval: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V5Record {
    pub src_addr: Ipv4Addr,
    pub dst_addr: Ipv4Addr,
    pub next_hop: Ipv4Addr,
    pub input: u16,
    pub output: u16,
    pub packets: u32,
    pub octets: u32,
    /// Uptime in ms at the first packet of the flow.
    pub first: u32,
    pub last: u32,
    pub src_port: u16,
    pub dst_port: u16,
    pub tcp_flags: u8,
    pub protocol: u8,
    pub tos: u8,
    pub src_as: u16,
    pub dst_as: u16,
    pub src_mask: u8,
    pub dst_mask: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V5Packet {
    pub header: V5Header,
    pub records: Vec<V5Record>,
}

impl V5Packet {
    /// Decodes a whole datagram. The datagram length must match the declared
    /// record count exactly.
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < V5_HEADER_LEN {
            return Err(DecodeError::Truncated {
                needed: V5_HEADER_LEN,
                got: data.len(),
            });
        }
        let mut r = Reader::new(data);
        let version = r.u16()?;
        if version != V5_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }
        let count = r.u16()?;
        if count == 0 || count > V5_MAX_RECORDS {
            return Err(DecodeError::InvalidCount(count));
        }
        let expected = V5_HEADER_LEN + V5_RECORD_LEN * usize::from(count);
        if data.len() != expected {
            return Err(DecodeError::LengthMismatch {
                count,
                expected,
                actual: data.len(),
            });
        }

        let header = V5Header {
            count,
            sys_uptime_ms: r.u32()?,
            unix_secs: r.u32()?,
            unix_nsecs: r.u32()?,
            flow_sequence: r.u32()?,
            engine_type: r.u8()?,
            engine_id: r.u8()?,
            sampling_interval: r.u16()?,
        };

        let mut records = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let src_addr = Ipv4Addr::from(r.u32()?);
            let dst_addr = Ipv4Addr::from(r.u32()?);
            let next_hop = Ipv4Addr::from(r.u32()?);
            let input = r.u16()?;
            let output = r.u16()?;
            let packets = r.u32()?;
            let octets = r.u32()?;
            let first = r.u32()?;
            let last = r.u32()?;
            let src_port = r.u16()?;
            let dst_port = r.u16()?;
            let _pad1 = r.u8()?;
            let tcp_flags = r.u8()?;
            let protocol = r.u8()?;
            let tos = r.u8()?;
            let src_as = r.u16()?;
            let dst_as = r.u16()?;
            let src_mask = r.u8()?;
            let dst_mask = r.u8()?;
            let _pad2 = r.u16()?;
            records.push(V5Record {
                src_addr,
                dst_addr,
                next_hop,
                input,
                output,
                packets,
                octets,
                first,
                last,
                src_port,
                dst_port,
                tcp_flags,
                protocol,
                tos,
                src_as,
                dst_as,
                src_mask,
                dst_mask,
            });
        }

        Ok(Self { header, records })
    }

    /// Encodes the packet in wire format. `header.count` is taken from the
    /// record list.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(V5_HEADER_LEN + V5_RECORD_LEN * self.records.len());
        buf.put_u16(V5_VERSION);
        buf.put_u16(self.records.len() as u16);
        buf.put_u32(self.header.sys_uptime_ms);
        buf.put_u32(self.header.unix_secs);
        buf.put_u32(self.header.unix_nsecs);
        buf.put_u32(self.header.flow_sequence);
        buf.put_u8(self.header.engine_type);
        buf.put_u8(self.header.engine_id);
        buf.put_u16(self.header.sampling_interval);

        for rec in &self.records {
            buf.put_u32(u32::from(rec.src_addr));
            buf.put_u32(u32::from(rec.dst_addr));
            buf.put_u32(u32::from(rec.next_hop));
            buf.put_u16(rec.input);
            buf.put_u16(rec.output);
            buf.put_u32(rec.packets);
            buf.put_u32(rec.octets);
            buf.put_u32(rec.first);
            buf.put_u32(rec.last);
            buf.put_u16(rec.src_port);
            buf.put_u16(rec.dst_port);
            buf.put_u8(0);
            buf.put_u8(rec.tcp_flags);
            buf.put_u8(rec.protocol);
            buf.put_u8(rec.tos);
            buf.put_u16(rec.src_as);
            buf.put_u16(rec.dst_as);
            buf.put_u8(rec.src_mask);
            buf.put_u8(rec.dst_mask);
            buf.put_u16(0);
        }
        buf.to_vec()
    }

    pub fn flow_records(&self) -> Vec<FlowRecord> {
        let export = export_time(self.header.unix_secs, self.header.unix_nsecs);
        let uptime = self.header.sys_uptime_ms;
        self.records
            .iter()
            .map(|rec| FlowRecord {
                src_addr: IpAddr::V4(rec.src_addr),
                dst_addr: IpAddr::V4(rec.dst_addr),
                src_port: rec.src_port,
                dst_port: rec.dst_port,
                protocol: rec.protocol,
                tcp_flags: rec.tcp_flags,
                tos: rec.tos,
                bytes: u64::from(rec.octets),
                packets: u64::from(rec.packets),
                input_if: u32::from(rec.input),
                output_if: u32::from(rec.output),
                start: uptime_to_wall(export, uptime, rec.first),
                end: uptime_to_wall(export, uptime, rec.last),
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;

    pub(crate) fn sample_packet(count: usize) -> V5Packet {
        V5Packet {
            header: V5Header {
                count: count as u16,
                sys_uptime_ms: 600_000,
                unix_secs: 1_700_000_000,
                unix_nsecs: 0,
                flow_sequence: 42,
                engine_type: 0,
                engine_id: 1,
                sampling_interval: 0,
            },
            records: (0..count)
                .map(|i| V5Record {
                    src_addr: Ipv4Addr::new(10, 0, 0, i as u8 + 1),
                    dst_addr: Ipv4Addr::new(192, 168, 1, 10),
                    next_hop: Ipv4Addr::new(10, 0, 0, 254),
                    input: 2,
                    output: 3,
                    packets: 10 + i as u32,
                    octets: u32::MAX - i as u32,
                    first: 590_000,
                    last: 599_000,
                    src_port: 40_000 + i as u16,
                    dst_port: 443,
                    tcp_flags: 0x18,
                    protocol: 6,
                    tos: 0,
                    src_as: 0,
                    dst_as: 64_512,
                    src_mask: 24,
                    dst_mask: 24,
                })
                .collect(),
        }
    }

    #[test]
    fn reencoding_preserves_counters() {
        let packet = sample_packet(5);
        let bytes = packet.to_bytes();
        assert_eq!(bytes.len(), V5_HEADER_LEN + 5 * V5_RECORD_LEN);

        let decoded = V5Packet::parse(&bytes).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.to_bytes(), bytes);
    }

    #[test]
    fn declared_count_must_match_length() {
        let mut bytes = sample_packet(3).to_bytes();
        bytes[2..4].copy_from_slice(&10u16.to_be_bytes());
        assert_eq!(
            V5Packet::parse(&bytes),
            Err(DecodeError::LengthMismatch {
                count: 10,
                expected: V5_HEADER_LEN + 10 * V5_RECORD_LEN,
                actual: V5_HEADER_LEN + 3 * V5_RECORD_LEN,
            })
        );
    }

    #[test]
    fn rejects_zero_and_oversized_counts() {
        let mut bytes = sample_packet(1).to_bytes();
        bytes[2..4].copy_from_slice(&0u16.to_be_bytes());
        assert_eq!(V5Packet::parse(&bytes), Err(DecodeError::InvalidCount(0)));
        bytes[2..4].copy_from_slice(&31u16.to_be_bytes());
        assert_eq!(V5Packet::parse(&bytes), Err(DecodeError::InvalidCount(31)));
    }

    #[test]
    fn flow_times_derive_from_uptime() {
        let packet = sample_packet(1);
        let records = packet.flow_records();
        let export = export_time(1_700_000_000, 0);
        assert_eq!(records[0].start, export - Duration::seconds(10));
        assert_eq!(records[0].end, export - Duration::seconds(1));
        assert_eq!(records[0].bytes, u64::from(u32::MAX));
    }
}
