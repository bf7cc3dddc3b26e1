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

//! Flow-export collector.
//!
//! Datagrams arrive on a UDP socket, are decoded in the receive loop
//! (NetFlow v5, NetFlow v9 and IPFIX), converted into raw
//! [`sample_sink::TrafficSample`]s and handed to persistence workers over a
//! bounded channel. A full channel drops samples instead of stalling the
//! socket.

pub mod config;
mod converter;
mod decoder;
mod error;
mod listener;
mod metrics;
mod processor;
mod record;
pub mod templates;
pub mod v5;
mod wire;

pub use config::Config;
pub use converter::{interface_name, to_traffic_samples};
pub use decoder::{DecodedPacket, FlowDecoder, FormatToggles, IPFIX_VERSION, V9_VERSION};
pub use error::DecodeError;
pub use listener::Listener;
pub use metrics::CollectorMetrics;
pub use processor::{ChannelClosed, FlowProcessor};
pub use record::FlowRecord;
pub use templates::{TemplateCache, TemplateLimits};
pub use v5::V5Packet;
