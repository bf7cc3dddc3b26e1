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

#![allow(dead_code)]

use bytes::{BufMut, BytesMut};
use flow_collector::v5::{V5Header, V5Packet, V5Record};
use std::net::Ipv4Addr;

pub const EXPORT_SECS: u32 = 1_700_000_000;
pub const SYS_UPTIME_MS: u32 = 3_600_000;

/// Field layout used by the v9 fixtures, including one type the decoder
/// does not know (999, three bytes).
pub const V9_FIELDS: &[(u16, u16)] = &[
    (8, 4),   // IPV4_SRC_ADDR
    (12, 4),  // IPV4_DST_ADDR
    (1, 4),   // IN_BYTES
    (2, 4),   // IN_PKTS
    (10, 2),  // INPUT_SNMP
    (14, 2),  // OUTPUT_SNMP
    (22, 4),  // FIRST_SWITCHED
    (21, 4),  // LAST_SWITCHED
    (7, 2),   // L4_SRC_PORT
    (11, 2),  // L4_DST_PORT
    (4, 1),   // PROTOCOL
    (999, 3), // vendor field
];

pub fn set(id: u16, body: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u16(id);
    buf.put_u16((body.len() + 4) as u16);
    buf.put_slice(body);
    buf.to_vec()
}

pub fn v9_packet(source_id: u32, sets: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u16(9);
    buf.put_u16(sets.len() as u16);
    buf.put_u32(SYS_UPTIME_MS);
    buf.put_u32(EXPORT_SECS);
    buf.put_u32(1);
    buf.put_u32(source_id);
    for s in sets {
        buf.put_slice(s);
    }
    buf.to_vec()
}

pub fn v9_template_set(template_id: u16, fields: &[(u16, u16)]) -> Vec<u8> {
    let mut body = BytesMut::new();
    body.put_u16(template_id);
    body.put_u16(fields.len() as u16);
    for (field_type, len) in fields {
        body.put_u16(*field_type);
        body.put_u16(*len);
    }
    set(0, &body)
}

/// One record matching [`V9_FIELDS`].
pub fn v9_record(src_last_octet: u8, bytes: u32, packets: u32) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u32(u32::from(Ipv4Addr::new(10, 1, 1, src_last_octet)));
    buf.put_u32(u32::from(Ipv4Addr::new(172, 16, 0, 9)));
    buf.put_u32(bytes);
    buf.put_u32(packets);
    buf.put_u16(4);
    buf.put_u16(5);
    buf.put_u32(SYS_UPTIME_MS - 30_000);
    buf.put_u32(SYS_UPTIME_MS - 1_000);
    buf.put_u16(51_000);
    buf.put_u16(53);
    buf.put_u8(17);
    buf.put_slice(&[0xde, 0xad, 0x00]);
    buf.to_vec()
}

pub fn v9_data_set(template_id: u16, records: &[Vec<u8>]) -> Vec<u8> {
    set(template_id, &records.concat())
}

pub fn ipfix_packet(domain_id: u32, sets: &[Vec<u8>]) -> Vec<u8> {
    let body: Vec<u8> = sets.concat();
    let mut buf = BytesMut::new();
    buf.put_u16(10);
    buf.put_u16((16 + body.len()) as u16);
    buf.put_u32(EXPORT_SECS);
    buf.put_u32(7);
    buf.put_u32(domain_id);
    buf.put_slice(&body);
    buf.to_vec()
}

pub fn v5_packet(count: usize) -> V5Packet {
    V5Packet {
        header: V5Header {
            count: count as u16,
            sys_uptime_ms: SYS_UPTIME_MS,
            unix_secs: EXPORT_SECS,
            unix_nsecs: 0,
            flow_sequence: 100,
            engine_type: 0,
            engine_id: 0,
            sampling_interval: 0,
        },
        records: (0..count)
            .map(|i| V5Record {
                src_addr: Ipv4Addr::new(10, 0, 0, i as u8 + 1),
                dst_addr: Ipv4Addr::new(8, 8, 8, 8),
                next_hop: Ipv4Addr::new(10, 0, 0, 254),
                input: 1,
                output: 2,
                packets: 5,
                octets: 1_000 * (i as u32 + 1),
                first: SYS_UPTIME_MS - 10_000,
                last: SYS_UPTIME_MS - 500,
                src_port: 33_000,
                dst_port: 443,
                tcp_flags: 0x10,
                protocol: 6,
                tos: 0,
                src_as: 0,
                dst_as: 15_169,
                src_mask: 24,
                dst_mask: 24,
            })
            .collect(),
    }
}

/// A v5 datagram whose header claims `declared` records but carries
/// `actual`.
pub fn v5_with_wrong_count(declared: u16, actual: usize) -> Vec<u8> {
    let mut bytes = v5_packet(actual).to_bytes();
    bytes[2..4].copy_from_slice(&declared.to_be_bytes());
    bytes
}
