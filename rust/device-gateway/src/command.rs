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

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Read,
    Create,
    Update,
    Delete,
    /// Runs a device-side action (reboot, ping, export...).
    Invoke,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Read => "read",
            CommandKind::Create => "create",
            CommandKind::Update => "update",
            CommandKind::Delete => "delete",
            CommandKind::Invoke => "invoke",
        }
    }
}

/// A single operation against a device's management API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub kind: CommandKind,
    pub path: String,
    #[serde(default)]
    pub body: Option<Value>,
}

impl Command {
    pub fn read(path: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::Read,
            path: path.into(),
            body: None,
        }
    }

    pub fn with_body(kind: CommandKind, path: impl Into<String>, body: Value) -> Self {
        Self {
            kind,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.kind == CommandKind::Read
    }

    /// Audit-safe description; the body is left out because it may carry
    /// secrets.
    pub fn descriptor(&self) -> String {
        format!("{} {}", self.kind.as_str(), self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub body: Value,
}

#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub device_id: String,
    /// Executed in order inside one session.
    pub commands: Vec<Command>,
    /// Who asked: a user id for administrative actions, `"poller"` for
    /// scheduled polls.
    pub actor: String,
    pub timeout: Duration,
}

impl CommandRequest {
    pub fn descriptor(&self) -> String {
        self.commands
            .iter()
            .map(Command::descriptor)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    Requested,
    LockWait,
    LockAcquired,
    Connecting,
    Authenticating,
    Executing,
    Completed,
    Failed,
    LockTimeout,
    Busy,
}

impl CommandState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CommandState::Completed
                | CommandState::Failed
                | CommandState::LockTimeout
                | CommandState::Busy
        )
    }
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn descriptor_omits_body() {
        let cmd = Command::with_body(
            CommandKind::Update,
            "user/admin",
            json!({"password": "new-secret"}),
        );
        assert_eq!(cmd.descriptor(), "update user/admin");
        assert!(!cmd.is_read_only());
    }

    #[test]
    fn request_descriptor_joins_commands() {
        let req = CommandRequest {
            device_id: "r1".into(),
            commands: vec![Command::read("interface"), Command::read("system/resource")],
            actor: "poller".into(),
            timeout: Duration::from_secs(5),
        };
        assert_eq!(req.descriptor(), "read interface; read system/resource");
    }

    #[test]
    fn terminal_states() {
        assert!(CommandState::Completed.is_terminal());
        assert!(CommandState::LockTimeout.is_terminal());
        assert!(CommandState::Busy.is_terminal());
        assert!(!CommandState::Executing.is_terminal());
    }
}
