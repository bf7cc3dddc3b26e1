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

use crate::CommandState;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("device registry unavailable: {0}")]
    Unavailable(String),
}

/// Failures reported by a device transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    #[error("device did not answer in time")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    /// The device understood the request and refused it.
    #[error("command rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Protocol(String),
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("device {0} is not registered")]
    UnknownDevice(String),

    /// The device lock or the session pool could not be obtained in time.
    /// `state` is [`CommandState::LockTimeout`] when another holder kept the
    /// lock, [`CommandState::Busy`] when the lock store or pool was
    /// unavailable.
    #[error("device {device_id} is busy ({state:?})")]
    Busy {
        device_id: String,
        state: CommandState,
    },

    #[error("stored credentials for {device_id} are unusable: {source}")]
    Credentials {
        device_id: String,
        #[source]
        source: credential_codec::Error,
    },

    #[error("device {device_id} rejected authentication: {message}")]
    AuthRejected { device_id: String, message: String },

    #[error("device {device_id} timed out while {phase:?}")]
    Timeout {
        device_id: String,
        phase: CommandState,
    },

    #[error("transport error talking to {device_id}: {message}")]
    Transport { device_id: String, message: String },

    #[error("device {device_id} rejected command ({status}): {message}")]
    CommandRejected {
        device_id: String,
        status: u16,
        message: String,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl GatewayError {
    pub(crate) fn from_session(device_id: &str, err: SessionError) -> Self {
        let device_id = device_id.to_string();
        match err {
            SessionError::AuthRejected(message) => GatewayError::AuthRejected { device_id, message },
            SessionError::Timeout => GatewayError::Timeout {
                device_id,
                phase: CommandState::Executing,
            },
            SessionError::Transport(message) | SessionError::Protocol(message) => {
                GatewayError::Transport { device_id, message }
            }
            SessionError::Rejected { status, message } => GatewayError::CommandRejected {
                device_id,
                status,
                message,
            },
        }
    }

    /// Terminal state the command ended in.
    pub fn terminal_state(&self) -> CommandState {
        match self {
            GatewayError::Busy { state, .. } => *state,
            _ => CommandState::Failed,
        }
    }

    /// Whether retrying later can reasonably succeed. Callers own the retry
    /// policy; the gateway never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Busy { .. }
                | GatewayError::Timeout { .. }
                | GatewayError::Transport { .. }
                | GatewayError::Registry(_)
        )
    }
}
