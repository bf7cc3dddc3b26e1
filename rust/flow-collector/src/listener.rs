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

use crate::processor::{ChannelClosed, FlowProcessor};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{error, info};

/// Receive loop for one UDP socket. Decoding happens inline; persistence is
/// decoupled through the processor's bounded channel.
pub struct Listener {
    socket: UdpSocket,
    buffer_size: usize,
    sweep_interval: Duration,
    processor: FlowProcessor,
}

impl Listener {
    pub async fn bind(
        addr: &str,
        buffer_size: usize,
        sweep_interval: Duration,
        processor: FlowProcessor,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        info!(addr = %socket.local_addr()?, "flow collector listening");
        Ok(Self {
            socket,
            buffer_size,
            sweep_interval,
            processor,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Runs until the sample channel closes. Socket errors are logged and
    /// the loop continues.
    pub async fn run(mut self) -> Result<(), ChannelClosed> {
        let mut buf = vec![0u8; self.buffer_size.max(1)];
        let mut sweep = interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, peer)) => {
                        self.processor.process(&buf[..len], peer, Instant::now())?;
                    }
                    Err(err) => error!(error = %err, "error receiving flow datagram"),
                },
                _ = sweep.tick() => self.processor.sweep(Instant::now()),
            }
        }
    }
}
