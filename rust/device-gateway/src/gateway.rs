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

use crate::{
    AuditFailureReason, AuditOutcome, AuditSink, Command, CommandAuditRecord, CommandOutput,
    CommandRequest, CommandState, Device, DeviceConnector, DeviceRegistry, DeviceSession,
    DeviceStatus, GatewayError, SessionError,
};
use chrono::Utc;
use credential_codec::{CredentialCodec, Credentials};
use kvutil::{keys, Cache, KvStore, LockError, LockService};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Headroom added to the command timeout when sizing the lock TTL, so a lock
/// never expires under a session that is still inside its own timeout.
const LOCK_TTL_MARGIN: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// How long a request waits for another holder to release the device.
    pub lock_wait_budget: Duration,
    /// Floor for the device lock TTL.
    pub lock_ttl: Duration,
    pub lock_retry_interval: Duration,
    /// TTL of the `Up` status cached after a successful session.
    pub status_ttl: Duration,
    /// Process-wide cap on concurrently open device sessions.
    pub max_sessions: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            lock_wait_budget: Duration::from_secs(2),
            lock_ttl: Duration::from_secs(60),
            lock_retry_interval: kvutil::DEFAULT_RETRY_INTERVAL,
            status_ttl: Duration::from_secs(120),
            max_sessions: 32,
        }
    }
}

/// Serializes and audits every authenticated conversation with a device.
pub struct CommandGateway {
    config: GatewayConfig,
    registry: Arc<dyn DeviceRegistry>,
    codec: Arc<CredentialCodec>,
    connector: Arc<dyn DeviceConnector>,
    locks: LockService,
    cache: Cache,
    audit: Arc<dyn AuditSink>,
    sessions: Arc<Semaphore>,
}

impl CommandGateway {
    pub fn new(
        config: GatewayConfig,
        registry: Arc<dyn DeviceRegistry>,
        codec: Arc<CredentialCodec>,
        connector: Arc<dyn DeviceConnector>,
        store: Arc<dyn KvStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let locks =
            LockService::new(Arc::clone(&store)).with_retry_interval(config.lock_retry_interval);
        let sessions = Arc::new(Semaphore::new(config.max_sessions.max(1)));
        Self {
            config,
            registry,
            codec,
            connector,
            locks,
            cache: Cache::new(store),
            audit,
            sessions,
        }
    }

    pub fn registry(&self) -> &Arc<dyn DeviceRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Convenience wrapper for a single command.
    pub async fn execute(
        &self,
        device_id: &str,
        command: Command,
        actor: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, GatewayError> {
        let mut outputs = self
            .run(CommandRequest {
                device_id: device_id.to_string(),
                commands: vec![command],
                actor: actor.to_string(),
                timeout,
            })
            .await?;
        outputs.pop().ok_or_else(|| GatewayError::Transport {
            device_id: device_id.to_string(),
            message: "session produced no output".into(),
        })
    }

    /// Runs every command of `request` inside one locked session. The whole
    /// request, including lock and pool waits, is bounded by
    /// `request.timeout`. Failures are returned to the caller and never
    /// retried here.
    pub async fn run(&self, request: CommandRequest) -> Result<Vec<CommandOutput>, GatewayError> {
        let timestamp = Utc::now();
        let started = Instant::now();
        let result = self.run_locked(&request, started).await;

        match &result {
            Ok(_) => info!(
                device_id = %request.device_id,
                actor = %request.actor,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "command completed"
            ),
            Err(err) => warn!(
                device_id = %request.device_id,
                actor = %request.actor,
                state = %err.terminal_state(),
                error = %err,
                "command failed"
            ),
        }

        let outcome = match &result {
            Ok(_) => AuditOutcome::Success,
            Err(err) => AuditOutcome::Failure {
                reason: AuditFailureReason::from(err),
                message: err.to_string(),
            },
        };
        let record = CommandAuditRecord {
            id: Uuid::new_v4(),
            device_id: request.device_id.clone(),
            command: request.descriptor(),
            actor: request.actor.clone(),
            timestamp,
            duration_ms: started.elapsed().as_millis() as u64,
            outcome,
        };
        if let Err(err) = self.audit.record(&record).await {
            warn!(device_id = %request.device_id, error = %err, "failed to write audit record");
        }

        result
    }

    async fn run_locked(
        &self,
        request: &CommandRequest,
        started: Instant,
    ) -> Result<Vec<CommandOutput>, GatewayError> {
        let device_id = request.device_id.as_str();
        let deadline = started + request.timeout;
        let mut state = CommandState::Requested;

        let device = self
            .registry
            .get_device(device_id)
            .await?
            .ok_or_else(|| GatewayError::UnknownDevice(device_id.to_string()))?;

        let permit = match timeout(
            remaining(deadline),
            Arc::clone(&self.sessions).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            _ => {
                return Err(GatewayError::Busy {
                    device_id: device_id.to_string(),
                    state: CommandState::Busy,
                })
            }
        };

        state = transition(device_id, state, CommandState::LockWait);
        let lock_ttl = self.config.lock_ttl.max(request.timeout + LOCK_TTL_MARGIN);
        let budget = self.config.lock_wait_budget.min(remaining(deadline));
        let guard = self
            .locks
            .acquire_with_budget(&keys::device_lock(device_id), lock_ttl, budget)
            .await
            .map_err(|err| GatewayError::Busy {
                device_id: device_id.to_string(),
                state: match err {
                    LockError::Busy { .. } => CommandState::LockTimeout,
                    LockError::StoreUnavailable { .. } => CommandState::Busy,
                },
            })?;
        state = transition(device_id, state, CommandState::LockAcquired);

        let result = match self.codec.decrypt(&device.encrypted_credentials) {
            Ok(credentials) => {
                let session_budget = remaining(deadline);
                let outcome = timeout(
                    session_budget,
                    self.converse(&device, &credentials, &request.commands, session_budget, &mut state),
                )
                .await;
                match outcome {
                    Ok(Ok(outputs)) => Ok(outputs),
                    Ok(Err(SessionError::Timeout)) | Err(_) => Err(GatewayError::Timeout {
                        device_id: device_id.to_string(),
                        phase: state,
                    }),
                    Ok(Err(err)) => Err(GatewayError::from_session(device_id, err)),
                }
            }
            Err(source) => Err(GatewayError::Credentials {
                device_id: device_id.to_string(),
                source,
            }),
        };

        guard.release().await;
        drop(permit);

        match &result {
            Ok(_) => {
                transition(device_id, state, CommandState::Completed);
                self.cache
                    .set(
                        &keys::device_status(device_id),
                        &DeviceStatus::up(device_id, Utc::now()),
                        self.config.status_ttl,
                    )
                    .await;
            }
            Err(_) => {
                transition(device_id, state, CommandState::Failed);
            }
        }
        result
    }

    async fn converse(
        &self,
        device: &Device,
        credentials: &Credentials,
        commands: &[Command],
        timeout: Duration,
        state: &mut CommandState,
    ) -> Result<Vec<CommandOutput>, SessionError> {
        *state = transition(&device.id, *state, CommandState::Connecting);
        let mut session = self.connector.connect(device, credentials, timeout).await?;
        let result = drive(&device.id, session.as_mut(), commands, state).await;
        session.close().await;
        result
    }
}

async fn drive(
    device_id: &str,
    session: &mut dyn DeviceSession,
    commands: &[Command],
    state: &mut CommandState,
) -> Result<Vec<CommandOutput>, SessionError> {
    *state = transition(device_id, *state, CommandState::Authenticating);
    session.authenticate().await?;

    *state = transition(device_id, *state, CommandState::Executing);
    let mut outputs = Vec::with_capacity(commands.len());
    for command in commands {
        outputs.push(session.execute(command).await?);
    }
    Ok(outputs)
}

fn transition(device_id: &str, from: CommandState, to: CommandState) -> CommandState {
    debug!(device_id, from = %from, to = %to, "command state");
    to
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}
