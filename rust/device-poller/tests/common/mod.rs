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

use async_trait::async_trait;
use credential_codec::CredentialCodec;
use device_gateway::{
    Command, CommandGateway, CommandOutput, ConnectionParams, Credentials, Device,
    DeviceConnector, DeviceSession, GatewayConfig, MemoryAuditSink, SessionError, StaticRegistry,
};
use device_poller::{PollContext, PollerMetrics};
use kvutil::{keys, AcquireOutcome, Cache, LockService, MemoryStore};
use sample_sink::{MemorySink, RetryPolicy};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const KEY: [u8; 32] = [9u8; 32];

#[derive(Clone, Copy)]
pub enum Behavior {
    /// Answers the poll queries; interface counters grow on every poll.
    Answer,
    RejectAuth,
    Hang,
}

pub struct FakeDevice {
    behavior: Behavior,
    interface_reads: Arc<AtomicU64>,
}

impl FakeDevice {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            interface_reads: Arc::new(AtomicU64::new(0)),
        }
    }
}

fn answer(path: &str, interface_reads: &AtomicU64) -> Value {
    match path {
        "interface" => {
            let n = interface_reads.fetch_add(1, Ordering::SeqCst) + 1;
            json!([
                {
                    "name": "ether1",
                    "rx-byte": (1_000 * n).to_string(),
                    "tx-byte": (400 * n).to_string(),
                    "rx-packet": (10 * n).to_string(),
                    "tx-packet": (4 * n).to_string(),
                }
            ])
        }
        "system/resource" => json!({
            "cpu-load": "7",
            "total-memory": "1048576",
            "free-memory": "524288",
            "uptime": "1d2h",
        }),
        "ppp/active" => json!([{"name": "a"}, {"name": "b"}]),
        other => json!({ "path": other }),
    }
}

struct FakeSession {
    behavior: Behavior,
    interface_reads: Arc<AtomicU64>,
}

#[async_trait]
impl DeviceConnector for FakeDevice {
    async fn connect(
        &self,
        _device: &Device,
        _credentials: &Credentials,
        _timeout: Duration,
    ) -> Result<Box<dyn DeviceSession>, SessionError> {
        Ok(Box::new(FakeSession {
            behavior: self.behavior,
            interface_reads: Arc::clone(&self.interface_reads),
        }))
    }
}

#[async_trait]
impl DeviceSession for FakeSession {
    async fn authenticate(&mut self) -> Result<(), SessionError> {
        match self.behavior {
            Behavior::RejectAuth => Err(SessionError::AuthRejected("http 401".into())),
            _ => Ok(()),
        }
    }

    async fn execute(&mut self, command: &Command) -> Result<CommandOutput, SessionError> {
        match self.behavior {
            Behavior::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            _ => Ok(CommandOutput {
                body: answer(&command.path, &self.interface_reads),
            }),
        }
    }
}

pub fn device(id: &str, codec: &CredentialCodec) -> Device {
    Device {
        id: id.to_string(),
        management_addr: "10.0.0.1".into(),
        vendor: None,
        model: None,
        encrypted_credentials: codec
            .encrypt(&Credentials::new("poller", "s3cret"))
            .unwrap(),
        connection: ConnectionParams::default(),
        poll_enabled: true,
        poll_interval_secs: None,
    }
}

pub struct Harness {
    pub codec: CredentialCodec,
    pub gateway: Arc<CommandGateway>,
    pub registry: Arc<StaticRegistry>,
    pub store: Arc<MemoryStore>,
    pub audit: Arc<MemoryAuditSink>,
    pub sink: Arc<MemorySink>,
    pub metrics: PollerMetrics,
}

impl Harness {
    pub fn new(behavior: Behavior, config: GatewayConfig) -> Self {
        let codec = CredentialCodec::new(&KEY).unwrap();
        let registry = Arc::new(StaticRegistry::new(vec![device("r1", &codec)]));
        let store = Arc::new(MemoryStore::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let gateway = Arc::new(CommandGateway::new(
            config,
            registry.clone(),
            Arc::new(codec.clone()),
            Arc::new(FakeDevice::new(behavior)),
            store.clone(),
            audit.clone(),
        ));
        Self {
            codec,
            gateway,
            registry,
            store,
            audit,
            sink: Arc::new(MemorySink::new()),
            metrics: PollerMetrics::new().unwrap(),
        }
    }

    pub fn context(&self, degraded_threshold: u32) -> PollContext {
        PollContext {
            registry: self.registry.clone(),
            cache: Cache::new(self.store.clone()),
            sink: self.sink.clone(),
            retry: RetryPolicy {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(10),
                max_backoff: Duration::from_millis(10),
            },
            metrics: self.metrics.clone(),
            degraded_threshold,
        }
    }

    pub async fn lock_is_free(&self, device_id: &str) -> bool {
        LockService::new(self.store.clone())
            .try_acquire(&keys::device_lock(device_id), "probe", Duration::from_secs(1))
            .await
            == AcquireOutcome::Acquired
    }
}
