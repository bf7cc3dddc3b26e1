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

mod common;

use common::*;
use flow_collector::{
    CollectorMetrics, FlowDecoder, FlowProcessor, FormatToggles, Listener, TemplateLimits,
};
use sample_sink::{SampleOrigin, TrafficSample};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};

const PEER: &str = "10.0.0.1:40000";

fn processor(
    capacity: usize,
) -> (
    FlowProcessor,
    mpsc::Receiver<Vec<TrafficSample>>,
    CollectorMetrics,
) {
    let (tx, rx) = mpsc::channel(capacity);
    let metrics = CollectorMetrics::new().unwrap();
    let mut exporters = HashMap::new();
    exporters.insert(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), "edge-1".to_string());
    let processor = FlowProcessor::new(
        FlowDecoder::new(FormatToggles::default(), TemplateLimits::default()),
        exporters,
        tx,
        metrics.clone(),
    );
    (processor, rx, metrics)
}

#[tokio::test]
async fn malformed_v5_is_counted_and_later_packets_still_flow() {
    let (mut processor, mut rx, metrics) = processor(16);
    let peer: SocketAddr = PEER.parse().unwrap();

    let enqueued = processor
        .process(&v5_with_wrong_count(10, 3), peer, Instant::now())
        .unwrap();
    assert_eq!(enqueued, 0);
    assert_eq!(metrics.packets_malformed.get(), 1);

    let enqueued = processor
        .process(&v5_packet(3).to_bytes(), peer, Instant::now())
        .unwrap();
    assert_eq!(enqueued, 6);
    assert_eq!(metrics.packets_received.get(), 2);
    assert_eq!(metrics.packets_malformed.get(), 1);
    assert_eq!(metrics.records_decoded.get(), 3);

    let batch = rx.recv().await.unwrap();
    assert_eq!(batch.len(), 6);
    assert!(batch.iter().all(|s| s.device_id == "edge-1"));
    assert!(batch.iter().all(|s| s.origin == SampleOrigin::FlowExport));
    assert_eq!(batch[0].interface, "ifIndex:1");
    assert_eq!(batch[0].bytes_in, 1000);
    assert_eq!(batch[1].interface, "ifIndex:2");
    assert_eq!(batch[1].bytes_out, 1000);
}

#[tokio::test]
async fn full_buffer_drops_samples_without_blocking() {
    let (mut processor, _rx, metrics) = processor(1);
    let peer: SocketAddr = PEER.parse().unwrap();
    let packet = v5_packet(2).to_bytes();

    assert_eq!(processor.process(&packet, peer, Instant::now()).unwrap(), 4);
    assert_eq!(processor.process(&packet, peer, Instant::now()).unwrap(), 0);
    assert_eq!(metrics.samples_dropped.get(), 4);
}

#[tokio::test]
async fn unmapped_exporter_uses_its_address() {
    let (mut processor, mut rx, _metrics) = processor(4);
    let peer: SocketAddr = "192.0.2.7:9995".parse().unwrap();
    processor
        .process(&v5_packet(1).to_bytes(), peer, Instant::now())
        .unwrap();
    let batch = rx.recv().await.unwrap();
    assert_eq!(batch[0].device_id, "192.0.2.7");
}

#[tokio::test]
async fn closed_channel_stops_processing() {
    let (mut processor, rx, _metrics) = processor(4);
    drop(rx);
    let peer: SocketAddr = PEER.parse().unwrap();
    assert!(processor
        .process(&v5_packet(1).to_bytes(), peer, Instant::now())
        .is_err());
}

#[tokio::test]
async fn malformed_v9_still_forwards_released_sets() {
    let (mut processor, mut rx, metrics) = processor(4);
    let peer: SocketAddr = PEER.parse().unwrap();
    let t0 = Instant::now();
    let data = v9_packet(
        0,
        &[v9_data_set(256, &[v9_record(1, 1500, 3), v9_record(2, 64, 1)])],
    );
    assert_eq!(processor.process(&data, peer, t0).unwrap(), 0);

    let mut packet = v9_packet(0, &[v9_template_set(256, V9_FIELDS)]);
    packet.extend_from_slice(&[0x01, 0x00, 0x00, 0x40]);
    assert_eq!(processor.process(&packet, peer, t0).unwrap(), 4);
    assert_eq!(metrics.packets_malformed.get(), 1);
    assert_eq!(metrics.records_decoded.get(), 2);

    let batch = rx.recv().await.unwrap();
    assert_eq!(batch.len(), 4);
    assert_eq!(batch[0].device_id, "edge-1");
    assert_eq!(batch[0].bytes_in, 1500);
}

#[tokio::test(start_paused = true)]
async fn sweep_counts_template_misses() {
    let (tx, _rx) = mpsc::channel(4);
    let metrics = CollectorMetrics::new().unwrap();
    let mut processor = FlowProcessor::new(
        FlowDecoder::new(
            FormatToggles::default(),
            TemplateLimits {
                pending_window: Duration::from_secs(5),
                ..TemplateLimits::default()
            },
        ),
        HashMap::new(),
        tx,
        metrics.clone(),
    );
    let peer: SocketAddr = PEER.parse().unwrap();
    let t0 = Instant::now();
    let data = v9_packet(0, &[v9_data_set(256, &[v9_record(1, 100, 1)])]);

    assert_eq!(processor.process(&data, peer, t0).unwrap(), 0);
    assert_eq!(metrics.sets_buffered.get(), 1);
    processor.sweep(t0 + Duration::from_secs(6));
    assert_eq!(metrics.template_misses.get(), 1);
}

#[tokio::test]
async fn listener_decodes_datagrams_from_the_socket() {
    let (processor, mut rx, metrics) = processor(16);
    let listener = Listener::bind("127.0.0.1:0", 65535, Duration::from_secs(1), processor)
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(listener.run());

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sender
        .send_to(&v5_with_wrong_count(10, 3), addr)
        .await
        .unwrap();
    sender.send_to(&v5_packet(3).to_bytes(), addr).await.unwrap();

    let batch = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("samples in time")
        .unwrap();
    assert_eq!(batch.len(), 6);
    // Sender is 127.0.0.1, which is not in the exporter map.
    assert_eq!(batch[0].device_id, "127.0.0.1");
    assert_eq!(metrics.packets_malformed.get(), 1);
    assert_eq!(metrics.packets_received.get(), 2);

    handle.abort();
}
