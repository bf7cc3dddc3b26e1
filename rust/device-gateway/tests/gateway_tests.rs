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

use async_trait::async_trait;
use credential_codec::CredentialCodec;
use device_gateway::{
    AuditFailureReason, AuditOutcome, Command, CommandGateway, CommandRequest, CommandState,
    ConnectionParams, Credentials, Device, DeviceConnector, DeviceSession, DeviceStatus,
    GatewayConfig, GatewayError, MemoryAuditSink, Reachability, SessionError, StaticRegistry,
    CommandOutput,
};
use kvutil::{keys, AcquireOutcome, KvStore, LockService, MemoryStore};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const KEY: [u8; 32] = [7u8; 32];

#[derive(Clone, Copy)]
enum Behavior {
    Succeed { work: Duration },
    RejectAuth,
    Hang,
}

struct FakeConnector {
    behavior: Behavior,
    connects: AtomicUsize,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl FakeConnector {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            connects: AtomicUsize::new(0),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        })
    }
}

struct ActiveSession(Arc<AtomicUsize>);

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct FakeSession {
    behavior: Behavior,
    _active: ActiveSession,
}

#[async_trait]
impl DeviceConnector for FakeConnector {
    async fn connect(
        &self,
        _device: &Device,
        credentials: &Credentials,
        _timeout: Duration,
    ) -> Result<Box<dyn DeviceSession>, SessionError> {
        assert_eq!(credentials.username, "admin");
        self.connects.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            behavior: self.behavior,
            _active: ActiveSession(Arc::clone(&self.active)),
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
            Behavior::Succeed { work } => {
                tokio::time::sleep(work).await;
                Ok(CommandOutput {
                    body: json!({ "path": command.path }),
                })
            }
            Behavior::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            Behavior::RejectAuth => unreachable!(),
        }
    }
}

fn device(id: &str, codec: &CredentialCodec) -> Device {
    Device {
        id: id.to_string(),
        management_addr: "10.0.0.1".into(),
        vendor: None,
        model: None,
        encrypted_credentials: codec
            .encrypt(&Credentials::new("admin", "s3cret"))
            .unwrap(),
        connection: ConnectionParams::default(),
        poll_enabled: true,
        poll_interval_secs: None,
    }
}

struct Harness {
    gateway: Arc<CommandGateway>,
    connector: Arc<FakeConnector>,
    store: Arc<MemoryStore>,
    audit: Arc<MemoryAuditSink>,
    registry: Arc<StaticRegistry>,
}

fn harness(behavior: Behavior, config: GatewayConfig) -> Harness {
    let codec = CredentialCodec::new(&KEY).unwrap();
    let registry = Arc::new(StaticRegistry::new(vec![device("r1", &codec)]));
    let connector = FakeConnector::new(behavior);
    let store = Arc::new(MemoryStore::new());
    let audit = Arc::new(MemoryAuditSink::new());
    let gateway = Arc::new(CommandGateway::new(
        config,
        registry.clone(),
        Arc::new(codec),
        connector.clone(),
        store.clone(),
        audit.clone(),
    ));
    Harness {
        gateway,
        connector,
        store,
        audit,
        registry,
    }
}

fn request(device_id: &str, timeout: Duration) -> CommandRequest {
    CommandRequest {
        device_id: device_id.to_string(),
        commands: vec![Command::read("interface")],
        actor: "user-42".into(),
        timeout,
    }
}

async fn lock_is_free(store: Arc<MemoryStore>, device_id: &str) -> bool {
    LockService::new(store)
        .try_acquire(&keys::device_lock(device_id), "probe", Duration::from_secs(1))
        .await
        == AcquireOutcome::Acquired
}

#[tokio::test(start_paused = true)]
async fn concurrent_commands_on_one_device_never_overlap() {
    let h = harness(
        Behavior::Succeed {
            work: Duration::from_millis(50),
        },
        GatewayConfig {
            lock_wait_budget: Duration::from_secs(5),
            ..GatewayConfig::default()
        },
    );

    let mut tasks = Vec::new();
    for _ in 0..5 {
        let gateway = Arc::clone(&h.gateway);
        tasks.push(tokio::spawn(async move {
            gateway.run(request("r1", Duration::from_secs(10))).await
        }));
    }
    for task in tasks {
        let outputs = task.await.unwrap().unwrap();
        assert_eq!(outputs[0].body, json!({"path": "interface"}));
    }

    assert_eq!(h.connector.connects.load(Ordering::SeqCst), 5);
    assert_eq!(h.connector.max_active.load(Ordering::SeqCst), 1);
    let records = h.audit.records();
    assert_eq!(records.len(), 5);
    assert!(records.iter().all(|r| r.outcome == AuditOutcome::Success));
    assert!(records.iter().all(|r| r.command == "read interface"));
}

#[tokio::test(start_paused = true)]
async fn lock_held_elsewhere_times_out_within_budget() {
    let h = harness(
        Behavior::Succeed {
            work: Duration::ZERO,
        },
        GatewayConfig {
            lock_wait_budget: Duration::from_millis(200),
            ..GatewayConfig::default()
        },
    );
    let other = LockService::new(h.store.clone());
    assert_eq!(
        other
            .try_acquire(&keys::device_lock("r1"), "other-instance", Duration::from_millis(500))
            .await,
        AcquireOutcome::Acquired
    );

    let started = Instant::now();
    let err = h
        .gateway
        .run(request("r1", Duration::from_secs(10)))
        .await
        .unwrap_err();
    let waited = started.elapsed();

    assert!(matches!(
        err,
        GatewayError::Busy {
            state: CommandState::LockTimeout,
            ..
        }
    ));
    assert_eq!(err.terminal_state(), CommandState::LockTimeout);
    assert!(waited >= Duration::from_millis(200), "waited {waited:?}");
    assert!(waited < Duration::from_millis(300), "waited {waited:?}");
    assert_eq!(h.connector.connects.load(Ordering::SeqCst), 0);

    let records = h.audit.records();
    assert_eq!(records.len(), 1);
    assert!(matches!(
        records[0].outcome,
        AuditOutcome::Failure {
            reason: AuditFailureReason::LockTimeout,
            ..
        }
    ));
}

#[tokio::test]
async fn auth_rejection_is_audited_and_releases_lock() {
    let h = harness(Behavior::RejectAuth, GatewayConfig::default());

    let err = h
        .gateway
        .run(request("r1", Duration::from_secs(5)))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::AuthRejected { .. }));
    assert!(!err.is_retryable());
    assert_eq!(h.connector.active.load(Ordering::SeqCst), 0);
    assert!(lock_is_free(h.store.clone(), "r1").await);

    let records = h.audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].actor, "user-42");
    assert!(matches!(
        records[0].outcome,
        AuditOutcome::Failure {
            reason: AuditFailureReason::AuthRejected,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn hanging_device_times_out_in_execution() {
    let h = harness(Behavior::Hang, GatewayConfig::default());

    let started = Instant::now();
    let err = h
        .gateway
        .run(request("r1", Duration::from_secs(15)))
        .await
        .unwrap_err();

    assert!(started.elapsed() <= Duration::from_secs(16));
    assert!(matches!(
        err,
        GatewayError::Timeout {
            phase: CommandState::Executing,
            ..
        }
    ));
    assert!(err.is_retryable());
    assert_eq!(h.connector.active.load(Ordering::SeqCst), 0);
    assert!(lock_is_free(h.store.clone(), "r1").await);
    assert!(matches!(
        h.audit.records()[0].outcome,
        AuditOutcome::Failure {
            reason: AuditFailureReason::TransportTimeout,
            ..
        }
    ));
}

#[tokio::test]
async fn unknown_device_is_rejected_and_audited() {
    let h = harness(
        Behavior::Succeed {
            work: Duration::ZERO,
        },
        GatewayConfig::default(),
    );

    let err = h
        .gateway
        .run(request("missing", Duration::from_secs(5)))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::UnknownDevice(ref id) if id == "missing"));
    assert_eq!(h.connector.connects.load(Ordering::SeqCst), 0);
    let records = h.audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].device_id, "missing");
    assert!(matches!(
        records[0].outcome,
        AuditOutcome::Failure {
            reason: AuditFailureReason::UnknownDevice,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn unreachable_lock_store_fails_closed() {
    let h = harness(
        Behavior::Succeed {
            work: Duration::ZERO,
        },
        GatewayConfig {
            lock_wait_budget: Duration::from_millis(100),
            ..GatewayConfig::default()
        },
    );
    h.store.set_reachable(false);

    let err = h
        .gateway
        .run(request("r1", Duration::from_secs(5)))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GatewayError::Busy {
            state: CommandState::Busy,
            ..
        }
    ));
    assert_eq!(h.connector.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn success_caches_up_status() {
    let h = harness(
        Behavior::Succeed {
            work: Duration::ZERO,
        },
        GatewayConfig::default(),
    );

    let output = h
        .gateway
        .execute("r1", Command::read("system/resource"), "poller", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(output.body, json!({"path": "system/resource"}));

    let status: DeviceStatus = h
        .gateway
        .cache()
        .get(&keys::device_status("r1"))
        .await
        .unwrap();
    assert_eq!(status.reachability, Reachability::Up);
    assert_eq!(status.consecutive_failures, 0);
    assert!(h.store.get(&keys::device_lock("r1")).await.unwrap().is_none());
}

#[tokio::test]
async fn undecryptable_credentials_fail_before_connecting() {
    let h = harness(
        Behavior::Succeed {
            work: Duration::ZERO,
        },
        GatewayConfig::default(),
    );
    let other_key = CredentialCodec::new(&[9u8; 32]).unwrap();
    h.registry.upsert(device("r2", &other_key));

    let err = h
        .gateway
        .run(request("r2", Duration::from_secs(5)))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Credentials { .. }));
    assert_eq!(h.connector.connects.load(Ordering::SeqCst), 0);
    assert!(lock_is_free(h.store.clone(), "r2").await);
    assert!(matches!(
        h.audit.records()[0].outcome,
        AuditOutcome::Failure {
            reason: AuditFailureReason::CredentialError,
            ..
        }
    ));
}
