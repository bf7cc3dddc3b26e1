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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A managed device as seen by the core. Owned by the platform registry; the
/// core reads connection parameters and credentials and writes back status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    /// `host[:port]` or a full base URL.
    pub management_addr: String,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Credential blob as produced by `credential_codec`.
    pub encrypted_credentials: String,
    #[serde(default)]
    pub connection: ConnectionParams,
    #[serde(default = "default_poll_enabled")]
    pub poll_enabled: bool,
    /// Overrides the scheduler's default interval.
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
}

fn default_poll_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: u32,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_sessions() -> u32 {
    1
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_sessions: default_max_sessions(),
            accept_invalid_certs: false,
        }
    }
}

impl ConnectionParams {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reachability {
    Up,
    Degraded,
    Unknown,
}

/// Last-known status, cached under `device:{id}:status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub device_id: String,
    pub reachability: Reachability,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl DeviceStatus {
    pub fn up(device_id: &str, at: DateTime<Utc>) -> Self {
        Self {
            device_id: device_id.to_string(),
            reachability: Reachability::Up,
            consecutive_failures: 0,
            last_success: Some(at),
            last_error: None,
            updated_at: at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_device_gets_defaults() {
        let device: Device = serde_json::from_str(
            r#"{"id": "r1", "management_addr": "10.0.0.1", "encrypted_credentials": "abc"}"#,
        )
        .unwrap();
        assert!(device.poll_enabled);
        assert_eq!(device.connection.timeout(), Duration::from_secs(10));
        assert_eq!(device.connection.max_sessions, 1);
        assert_eq!(device.poll_interval_secs, None);
    }
}
