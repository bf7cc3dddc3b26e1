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

use crate::GatewayError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sample_sink::JetStreamPublisher;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditFailureReason {
    UnknownDevice,
    LockTimeout,
    Busy,
    CredentialError,
    AuthRejected,
    TransportTimeout,
    TransportError,
    CommandRejected,
    RegistryUnavailable,
}

impl From<&GatewayError> for AuditFailureReason {
    fn from(err: &GatewayError) -> Self {
        match err {
            GatewayError::UnknownDevice(_) => AuditFailureReason::UnknownDevice,
            GatewayError::Busy { state, .. } => match state {
                crate::CommandState::LockTimeout => AuditFailureReason::LockTimeout,
                _ => AuditFailureReason::Busy,
            },
            GatewayError::Credentials { .. } => AuditFailureReason::CredentialError,
            GatewayError::AuthRejected { .. } => AuditFailureReason::AuthRejected,
            GatewayError::Timeout { .. } => AuditFailureReason::TransportTimeout,
            GatewayError::Transport { .. } => AuditFailureReason::TransportError,
            GatewayError::CommandRejected { .. } => AuditFailureReason::CommandRejected,
            GatewayError::Registry(_) => AuditFailureReason::RegistryUnavailable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure {
        reason: AuditFailureReason,
        message: String,
    },
}

/// Write-once record of one gateway request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAuditRecord {
    pub id: Uuid,
    pub device_id: String,
    pub command: String,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: AuditOutcome,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &CommandAuditRecord) -> sample_sink::Result<()>;
}

/// Publishes audit records as JSON to a JetStream subject.
pub struct JetStreamAuditSink {
    publisher: JetStreamPublisher,
    subject: String,
}

impl JetStreamAuditSink {
    pub fn new(publisher: JetStreamPublisher, subject: impl Into<String>) -> Self {
        Self {
            publisher,
            subject: subject.into(),
        }
    }
}

#[async_trait]
impl AuditSink for JetStreamAuditSink {
    async fn record(&self, record: &CommandAuditRecord) -> sample_sink::Result<()> {
        self.publisher.publish_json(&self.subject, record).await
    }
}

#[derive(Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<CommandAuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<CommandAuditRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: &CommandAuditRecord) -> sample_sink::Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_outcome_serializes_with_reason() {
        let outcome = AuditOutcome::Failure {
            reason: AuditFailureReason::AuthRejected,
            message: "bad password".into(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["reason"], "auth_rejected");
    }
}
