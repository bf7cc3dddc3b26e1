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

//! Template-based decoding (NetFlow v9 and IPFIX) plus dispatch by version.

use crate::record::{export_time, uptime_to_wall};
use crate::templates::{
    FieldSpec, PacketContext, PendingSet, SweepStats, Template, TemplateCache, TemplateKey,
    TemplateKind, TemplateLimits,
};
use crate::v5::{V5Packet, V5_VERSION};
use crate::wire::{be_uint, Reader};
use crate::{DecodeError, FlowRecord};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tokio::time::Instant;
use tracing::debug;

pub const V9_VERSION: u16 = 9;
pub const IPFIX_VERSION: u16 = 10;

const V9_HEADER_LEN: usize = 20;
const IPFIX_HEADER_LEN: usize = 16;
const SET_HEADER_LEN: usize = 4;
const MIN_DATA_SET_ID: u16 = 256;

const V9_TEMPLATE_SET: u16 = 0;
const V9_OPTIONS_SET: u16 = 1;
const IPFIX_TEMPLATE_SET: u16 = 2;
const IPFIX_OPTIONS_SET: u16 = 3;

const ENTERPRISE_BIT: u16 = 0x8000;

// Information elements shared by v9 and IPFIX.
const IN_BYTES: u16 = 1;
const IN_PKTS: u16 = 2;
const PROTOCOL: u16 = 4;
const SRC_TOS: u16 = 5;
const TCP_FLAGS: u16 = 6;
const L4_SRC_PORT: u16 = 7;
const IPV4_SRC_ADDR: u16 = 8;
const INPUT_SNMP: u16 = 10;
const L4_DST_PORT: u16 = 11;
const IPV4_DST_ADDR: u16 = 12;
const OUTPUT_SNMP: u16 = 14;
const LAST_SWITCHED: u16 = 21;
const FIRST_SWITCHED: u16 = 22;
const IPV6_SRC_ADDR: u16 = 27;
const IPV6_DST_ADDR: u16 = 28;
const OCTET_TOTAL_COUNT: u16 = 85;
const PACKET_TOTAL_COUNT: u16 = 86;
const FLOW_START_SECONDS: u16 = 150;
const FLOW_END_SECONDS: u16 = 151;
const FLOW_START_MILLISECONDS: u16 = 152;
const FLOW_END_MILLISECONDS: u16 = 153;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatToggles {
    #[serde(default = "enabled")]
    pub netflow_v5: bool,
    #[serde(default = "enabled")]
    pub netflow_v9: bool,
    #[serde(default = "enabled")]
    pub ipfix: bool,
}

fn enabled() -> bool {
    true
}

impl Default for FormatToggles {
    fn default() -> Self {
        Self {
            netflow_v5: true,
            netflow_v9: true,
            ipfix: true,
        }
    }
}

/// What one datagram produced.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DecodedPacket {
    pub version: u16,
    pub records: Vec<FlowRecord>,
    pub templates_learned: usize,
    /// Data sets parked until their template arrives.
    pub sets_buffered: usize,
    /// Records decoded with options templates (exporter metadata).
    pub option_records: usize,
    pub template_misses: u64,
    /// Previously buffered sets that turned out not to match their template.
    pub malformed_sets: u64,
}

enum TemplateRecord {
    Define(Template),
    Withdraw(u16),
}

/// Stateful decoder for one listener. Holds the template table for every
/// exporter that sends to it.
pub struct FlowDecoder {
    templates: TemplateCache,
    formats: FormatToggles,
    /// Records released from the pending buffer by a datagram that then
    /// failed to decode.
    recovered: Vec<FlowRecord>,
}

impl FlowDecoder {
    pub fn new(formats: FormatToggles, limits: TemplateLimits) -> Self {
        Self {
            templates: TemplateCache::new(limits),
            formats,
            recovered: Vec::new(),
        }
    }

    /// Decodes one datagram. When it fails after a template in it already
    /// released buffered data sets, those earlier records are kept for
    /// [`FlowDecoder::take_recovered`] until the next call.
    pub fn decode(
        &mut self,
        exporter: IpAddr,
        data: &[u8],
        now: Instant,
    ) -> Result<DecodedPacket, DecodeError> {
        self.recovered.clear();
        if data.len() < 2 {
            return Err(DecodeError::Truncated {
                needed: 2,
                got: data.len(),
            });
        }
        let version = u16::from_be_bytes([data[0], data[1]]);
        match version {
            V5_VERSION if self.formats.netflow_v5 => Ok(DecodedPacket {
                version,
                records: V5Packet::parse(data)?.flow_records(),
                ..DecodedPacket::default()
            }),
            V9_VERSION if self.formats.netflow_v9 => self.decode_v9(exporter, data, now),
            IPFIX_VERSION if self.formats.ipfix => self.decode_ipfix(exporter, data, now),
            V5_VERSION | V9_VERSION | IPFIX_VERSION => Err(DecodeError::FormatDisabled(version)),
            other => Err(DecodeError::UnsupportedVersion(other)),
        }
    }

    /// Buffered records released by the last failed datagram.
    pub fn take_recovered(&mut self) -> Vec<FlowRecord> {
        std::mem::take(&mut self.recovered)
    }

    pub fn sweep(&mut self, now: Instant) -> SweepStats {
        self.templates.sweep(now)
    }

    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    pub fn pending_sets(&self) -> usize {
        self.templates.pending_len()
    }

    fn decode_v9(
        &mut self,
        exporter: IpAddr,
        data: &[u8],
        now: Instant,
    ) -> Result<DecodedPacket, DecodeError> {
        if data.len() < V9_HEADER_LEN {
            return Err(DecodeError::Truncated {
                needed: V9_HEADER_LEN,
                got: data.len(),
            });
        }
        let mut r = Reader::new(data);
        let version = r.u16()?;
        let _count = r.u16()?;
        let sys_uptime_ms = r.u32()?;
        let export_secs = r.u32()?;
        let _sequence = r.u32()?;
        let source_id = r.u32()?;

        let ctx = PacketContext {
            version,
            sys_uptime_ms: Some(sys_uptime_ms),
            export_secs,
        };
        let mut out = DecodedPacket {
            version,
            ..DecodedPacket::default()
        };
        let mut released = Vec::new();
        let walked = self.v9_sets(&mut r, exporter, source_id, ctx, now, &mut out, &mut released);
        self.finish(walked, out, released)
    }

    #[allow(clippy::too_many_arguments)]
    fn v9_sets(
        &mut self,
        r: &mut Reader<'_>,
        exporter: IpAddr,
        source_id: u32,
        ctx: PacketContext,
        now: Instant,
        out: &mut DecodedPacket,
        released: &mut Vec<FlowRecord>,
    ) -> Result<(), DecodeError> {
        while r.remaining() >= SET_HEADER_LEN {
            let (set_id, body) = next_set(r)?;
            match set_id {
                V9_TEMPLATE_SET => {
                    let parsed = parse_v9_templates(body)?;
                    self.install(exporter, source_id, parsed, now, out, released);
                }
                V9_OPTIONS_SET => {
                    let parsed = parse_v9_options(body)?;
                    self.install(exporter, source_id, parsed, now, out, released);
                }
                id if id >= MIN_DATA_SET_ID => {
                    self.data_set(exporter, source_id, id, body, ctx, now, out)?
                }
                reserved => debug!(set_id = reserved, "skipping reserved v9 flowset"),
            }
        }
        Ok(())
    }

    fn decode_ipfix(
        &mut self,
        exporter: IpAddr,
        data: &[u8],
        now: Instant,
    ) -> Result<DecodedPacket, DecodeError> {
        if data.len() < IPFIX_HEADER_LEN {
            return Err(DecodeError::Truncated {
                needed: IPFIX_HEADER_LEN,
                got: data.len(),
            });
        }
        let mut r = Reader::new(data);
        let version = r.u16()?;
        let length = usize::from(r.u16()?);
        if length < IPFIX_HEADER_LEN || length > data.len() {
            return Err(DecodeError::Truncated {
                needed: length.max(IPFIX_HEADER_LEN),
                got: data.len(),
            });
        }
        let export_secs = r.u32()?;
        let _sequence = r.u32()?;
        let domain_id = r.u32()?;

        let ctx = PacketContext {
            version,
            sys_uptime_ms: None,
            export_secs,
        };
        let mut out = DecodedPacket {
            version,
            ..DecodedPacket::default()
        };
        let mut released = Vec::new();

        let mut r = Reader::new(&data[IPFIX_HEADER_LEN..length]);
        let walked = self.ipfix_sets(&mut r, exporter, domain_id, ctx, now, &mut out, &mut released);
        self.finish(walked, out, released)
    }

    #[allow(clippy::too_many_arguments)]
    fn ipfix_sets(
        &mut self,
        r: &mut Reader<'_>,
        exporter: IpAddr,
        domain_id: u32,
        ctx: PacketContext,
        now: Instant,
        out: &mut DecodedPacket,
        released: &mut Vec<FlowRecord>,
    ) -> Result<(), DecodeError> {
        while r.remaining() >= SET_HEADER_LEN {
            let (set_id, body) = next_set(r)?;
            match set_id {
                IPFIX_TEMPLATE_SET => {
                    let parsed = parse_ipfix_templates(body, false)?;
                    self.install(exporter, domain_id, parsed, now, out, released);
                }
                IPFIX_OPTIONS_SET => {
                    let parsed = parse_ipfix_templates(body, true)?;
                    self.install(exporter, domain_id, parsed, now, out, released);
                }
                id if id >= MIN_DATA_SET_ID => {
                    self.data_set(exporter, domain_id, id, body, ctx, now, out)?
                }
                reserved => debug!(set_id = reserved, "skipping reserved ipfix set"),
            }
        }
        Ok(())
    }

    /// A datagram that fails part way is dropped as a whole, except for the
    /// records it released from the pending buffer: those came from earlier
    /// datagrams and are kept for [`FlowDecoder::take_recovered`].
    fn finish(
        &mut self,
        walked: Result<(), DecodeError>,
        out: DecodedPacket,
        released: Vec<FlowRecord>,
    ) -> Result<DecodedPacket, DecodeError> {
        match walked {
            Ok(()) => Ok(out),
            Err(err) => {
                self.recovered = released;
                Err(err)
            }
        }
    }

    fn install(
        &mut self,
        exporter: IpAddr,
        source_id: u32,
        parsed: Vec<TemplateRecord>,
        now: Instant,
        out: &mut DecodedPacket,
        released: &mut Vec<FlowRecord>,
    ) {
        for record in parsed {
            match record {
                TemplateRecord::Withdraw(template_id) => self.templates.withdraw(&TemplateKey {
                    exporter,
                    source_id,
                    template_id,
                }),
                TemplateRecord::Define(template) => {
                    let key = TemplateKey {
                        exporter,
                        source_id,
                        template_id: template.id,
                    };
                    let decoding = template.clone();
                    let learned = self.templates.learn(key, template, now);
                    out.templates_learned += 1;
                    out.template_misses += learned.expired;
                    for set in learned.ready {
                        let before = out.records.len();
                        if let Err(err) = decode_data_set(&decoding, &set.body, &set.context, out) {
                            debug!(%exporter, template_id = key.template_id, error = %err, "buffered set did not match its template");
                            out.malformed_sets += 1;
                        }
                        released.extend_from_slice(&out.records[before..]);
                    }
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn data_set(
        &mut self,
        exporter: IpAddr,
        source_id: u32,
        template_id: u16,
        body: &[u8],
        context: PacketContext,
        now: Instant,
        out: &mut DecodedPacket,
    ) -> Result<(), DecodeError> {
        let key = TemplateKey {
            exporter,
            source_id,
            template_id,
        };
        match self.templates.lookup(&key, now) {
            Some(template) => decode_data_set(&template, body, &context, out),
            None => {
                out.sets_buffered += 1;
                out.template_misses += self.templates.buffer(
                    key,
                    PendingSet {
                        body: body.to_vec(),
                        context,
                        received: now,
                    },
                );
                Ok(())
            }
        }
    }
}

fn next_set<'a>(r: &mut Reader<'a>) -> Result<(u16, &'a [u8]), DecodeError> {
    let set_id = r.u16()?;
    let length = r.u16()?;
    let body_len = usize::from(length).checked_sub(SET_HEADER_LEN);
    match body_len {
        Some(n) if n <= r.remaining() => Ok((set_id, r.take(n)?)),
        _ => Err(DecodeError::BadSetLength {
            set_id,
            length,
            remaining: r.remaining(),
        }),
    }
}

fn parse_v9_templates(body: &[u8]) -> Result<Vec<TemplateRecord>, DecodeError> {
    let mut r = Reader::new(body);
    let mut out = Vec::new();
    while r.remaining() >= 4 {
        let template_id = r.u16()?;
        let field_count = r.u16()?;
        if template_id == 0 && field_count == 0 {
            break;
        }
        if template_id < MIN_DATA_SET_ID {
            return Err(DecodeError::BadTemplate {
                template_id,
                reason: "template id below 256",
            });
        }
        let mut fields = Vec::with_capacity(usize::from(field_count));
        for _ in 0..field_count {
            fields.push(FieldSpec::new(r.u16()?, r.u16()?));
        }
        out.push(TemplateRecord::Define(Template {
            id: template_id,
            kind: TemplateKind::Data,
            fields,
        }));
    }
    Ok(out)
}

fn parse_v9_options(body: &[u8]) -> Result<Vec<TemplateRecord>, DecodeError> {
    let mut r = Reader::new(body);
    let mut out = Vec::new();
    while r.remaining() >= 6 {
        let template_id = r.u16()?;
        let scope_len = r.u16()?;
        let option_len = r.u16()?;
        if template_id == 0 {
            break;
        }
        if scope_len % 4 != 0 || option_len % 4 != 0 {
            return Err(DecodeError::BadTemplate {
                template_id,
                reason: "option lengths are not multiples of 4",
            });
        }
        let total = usize::from(scope_len / 4) + usize::from(option_len / 4);
        let mut fields = Vec::with_capacity(total);
        for _ in 0..total {
            fields.push(FieldSpec::new(r.u16()?, r.u16()?));
        }
        out.push(TemplateRecord::Define(Template {
            id: template_id,
            kind: TemplateKind::Options {
                scope_fields: scope_len / 4,
            },
            fields,
        }));
    }
    Ok(out)
}

fn parse_ipfix_templates(body: &[u8], options: bool) -> Result<Vec<TemplateRecord>, DecodeError> {
    let mut r = Reader::new(body);
    let mut out = Vec::new();
    while r.remaining() >= 4 {
        let template_id = r.u16()?;
        let field_count = r.u16()?;
        if template_id == 0 {
            break;
        }
        if template_id < MIN_DATA_SET_ID {
            return Err(DecodeError::BadTemplate {
                template_id,
                reason: "template id below 256",
            });
        }
        if field_count == 0 {
            out.push(TemplateRecord::Withdraw(template_id));
            continue;
        }
        let kind = if options {
            TemplateKind::Options {
                scope_fields: r.u16()?,
            }
        } else {
            TemplateKind::Data
        };
        let mut fields = Vec::with_capacity(usize::from(field_count));
        for _ in 0..field_count {
            let raw_type = r.u16()?;
            let length = r.u16()?;
            let enterprise = if raw_type & ENTERPRISE_BIT != 0 {
                Some(r.u32()?)
            } else {
                None
            };
            fields.push(FieldSpec {
                field_type: raw_type & !ENTERPRISE_BIT,
                length,
                enterprise,
            });
        }
        out.push(TemplateRecord::Define(Template {
            id: template_id,
            kind,
            fields,
        }));
    }
    Ok(out)
}

fn decode_data_set(
    template: &Template,
    body: &[u8],
    context: &PacketContext,
    out: &mut DecodedPacket,
) -> Result<(), DecodeError> {
    let min_len = template.min_record_len();
    if min_len == 0 {
        return Ok(());
    }
    let mut r = Reader::new(body);
    // Anything shorter than one record is set padding. Records shorter than
    // the set alignment make a zeroed tail of up to 3 bytes ambiguous; it is
    // taken as padding.
    while r.remaining() >= min_len {
        if r.remaining() < SET_HEADER_LEN && r.rest().iter().all(|b| *b == 0) {
            break;
        }
        let record = decode_record(template, &mut r, context)?;
        match template.kind {
            TemplateKind::Data => out.records.push(record),
            TemplateKind::Options { .. } => out.option_records += 1,
        }
    }
    Ok(())
}

#[derive(Default)]
struct FlowTimes {
    first_uptime: Option<u32>,
    last_uptime: Option<u32>,
    start_ms: Option<u64>,
    end_ms: Option<u64>,
}

/// Absolute timestamps win; otherwise uptime offsets are applied when the
/// header carries the exporter uptime (v9); otherwise the export time.
fn resolve_time(
    export: DateTime<Utc>,
    sys_uptime_ms: Option<u32>,
    absolute_ms: Option<u64>,
    event_uptime_ms: Option<u32>,
) -> DateTime<Utc> {
    let absolute = absolute_ms
        .and_then(|ms| i64::try_from(ms).ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
    if let Some(at) = absolute {
        return at;
    }
    match (sys_uptime_ms, event_uptime_ms) {
        (Some(sys), Some(event)) => uptime_to_wall(export, sys, event),
        _ => export,
    }
}

fn decode_record(
    template: &Template,
    r: &mut Reader<'_>,
    context: &PacketContext,
) -> Result<FlowRecord, DecodeError> {
    let export = export_time(context.export_secs, 0);
    let mut record = FlowRecord::empty(export);
    let mut times = FlowTimes::default();

    for field in &template.fields {
        let len = if field.is_variable() {
            match r.u8()? {
                255 => usize::from(r.u16()?),
                short => usize::from(short),
            }
        } else {
            usize::from(field.length)
        };
        let value = r.take(len)?;
        if field.enterprise.is_some() {
            continue;
        }
        apply_field(&mut record, &mut times, field.field_type, value);
    }

    record.start = resolve_time(export, context.sys_uptime_ms, times.start_ms, times.first_uptime);
    record.end = resolve_time(export, context.sys_uptime_ms, times.end_ms, times.last_uptime);
    Ok(record)
}

fn apply_field(record: &mut FlowRecord, times: &mut FlowTimes, field_type: u16, value: &[u8]) {
    match field_type {
        IN_BYTES | OCTET_TOTAL_COUNT => record.bytes = be_uint(value),
        IN_PKTS | PACKET_TOTAL_COUNT => record.packets = be_uint(value),
        PROTOCOL => record.protocol = be_uint(value) as u8,
        SRC_TOS => record.tos = be_uint(value) as u8,
        TCP_FLAGS => record.tcp_flags = be_uint(value) as u8,
        L4_SRC_PORT => record.src_port = be_uint(value) as u16,
        L4_DST_PORT => record.dst_port = be_uint(value) as u16,
        INPUT_SNMP => record.input_if = be_uint(value) as u32,
        OUTPUT_SNMP => record.output_if = be_uint(value) as u32,
        IPV4_SRC_ADDR => {
            if let Some(addr) = ipv4(value) {
                record.src_addr = addr;
            }
        }
        IPV4_DST_ADDR => {
            if let Some(addr) = ipv4(value) {
                record.dst_addr = addr;
            }
        }
        IPV6_SRC_ADDR => {
            if let Some(addr) = ipv6(value) {
                record.src_addr = addr;
            }
        }
        IPV6_DST_ADDR => {
            if let Some(addr) = ipv6(value) {
                record.dst_addr = addr;
            }
        }
        FIRST_SWITCHED => times.first_uptime = Some(be_uint(value) as u32),
        LAST_SWITCHED => times.last_uptime = Some(be_uint(value) as u32),
        FLOW_START_SECONDS => times.start_ms = Some(be_uint(value).saturating_mul(1000)),
        FLOW_END_SECONDS => times.end_ms = Some(be_uint(value).saturating_mul(1000)),
        FLOW_START_MILLISECONDS => times.start_ms = Some(be_uint(value)),
        FLOW_END_MILLISECONDS => times.end_ms = Some(be_uint(value)),
        _ => {}
    }
}

fn ipv4(value: &[u8]) -> Option<IpAddr> {
    let octets: [u8; 4] = value.try_into().ok()?;
    Some(IpAddr::V4(Ipv4Addr::from(octets)))
}

fn ipv6(value: &[u8]) -> Option<IpAddr> {
    let octets: [u8; 16] = value.try_into().ok()?;
    Some(IpAddr::V6(Ipv6Addr::from(octets)))
}
