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

use crate::poll::PollSettings;
use crate::scheduler::TimerSettings;
use anyhow::Context;
use credential_codec::CredentialCodec;
use device_gateway::{Device, GatewayConfig};
use sample_sink::{JetStreamConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Disables the scheduler while keeping the admin commands usable.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub schedule: ScheduleSettings,
    #[serde(default)]
    pub gateway: GatewaySettings,

    // Shared store; an in-process store is used when unset.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Environment variable holding the 32-byte credential key.
    #[serde(default = "default_credential_key_env")]
    pub credential_key_env: String,

    #[serde(default)]
    pub devices: Vec<Device>,

    // Persistence
    pub jetstream: JetStreamConfig,
    #[serde(default = "default_audit_subject")]
    pub audit_subject: String,
    #[serde(default)]
    pub sink: SinkSettings,

    // Observability
    #[serde(default)]
    pub metrics_addr: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ScheduleSettings {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Upper bound of the random delay added to every tick.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    /// Concurrent polls across all devices.
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    #[serde(default = "default_degraded_threshold")]
    pub degraded_threshold: u32,
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
    /// Attempts per poll for retryable failures.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            jitter_ms: default_jitter_ms(),
            poll_timeout_secs: default_poll_timeout_secs(),
            workers: default_workers(),
            queue_depth: default_queue_depth(),
            degraded_threshold: default_degraded_threshold(),
            refresh_secs: default_refresh_secs(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewaySettings {
    #[serde(default = "default_lock_wait_budget_ms")]
    pub lock_wait_budget_ms: u64,
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
    #[serde(default = "default_lock_retry_interval_ms")]
    pub lock_retry_interval_ms: u64,
    #[serde(default = "default_status_ttl_secs")]
    pub status_ttl_secs: u64,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            lock_wait_budget_ms: default_lock_wait_budget_ms(),
            lock_ttl_secs: default_lock_ttl_secs(),
            lock_retry_interval_ms: default_lock_retry_interval_ms(),
            status_ttl_secs: default_status_ttl_secs(),
            max_sessions: default_max_sessions(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SinkSettings {
    #[serde(default = "default_sink_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_sink_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_sink_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_sink_attempts(),
            initial_backoff_ms: default_sink_initial_backoff_ms(),
            max_backoff_ms: default_sink_max_backoff_ms(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_credential_key_env() -> String {
    "DEVICE_CREDENTIAL_KEY".to_string()
}

fn default_audit_subject() -> String {
    "telemetry.audit".to_string()
}

fn default_interval_secs() -> u64 {
    60
}

fn default_jitter_ms() -> u64 {
    5000
}

fn default_poll_timeout_secs() -> u64 {
    15
}

fn default_workers() -> usize {
    8
}

fn default_queue_depth() -> usize {
    256
}

fn default_degraded_threshold() -> u32 {
    3
}

fn default_refresh_secs() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    1
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_lock_wait_budget_ms() -> u64 {
    2000
}

fn default_lock_ttl_secs() -> u64 {
    60
}

fn default_lock_retry_interval_ms() -> u64 {
    25
}

fn default_status_ttl_secs() -> u64 {
    120
}

fn default_max_sessions() -> usize {
    32
}

fn default_sink_attempts() -> u32 {
    4
}

fn default_sink_initial_backoff_ms() -> u64 {
    100
}

fn default_sink_max_backoff_ms() -> u64 {
    2000
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.schedule.interval_secs == 0 {
            anyhow::bail!("schedule.interval_secs must be greater than zero");
        }
        if self.schedule.poll_timeout_secs == 0 {
            anyhow::bail!("schedule.poll_timeout_secs must be greater than zero");
        }
        if self.schedule.refresh_secs == 0 {
            anyhow::bail!("schedule.refresh_secs must be greater than zero");
        }
        if self.schedule.workers == 0 || self.schedule.queue_depth == 0 {
            anyhow::bail!("schedule.workers and schedule.queue_depth must be greater than zero");
        }
        if self.gateway.max_sessions == 0 {
            anyhow::bail!("gateway.max_sessions must be greater than zero");
        }
        if self.credential_key_env.is_empty() {
            anyhow::bail!("credential_key_env cannot be empty");
        }
        if self.jetstream.nats_url.is_empty() {
            anyhow::bail!("jetstream.nats_url cannot be empty");
        }
        if self.audit_subject.is_empty() {
            anyhow::bail!("audit_subject cannot be empty");
        }
        for device in &self.devices {
            if device.id.is_empty() || device.management_addr.is_empty() {
                anyhow::bail!("devices need an id and a management_addr");
            }
        }
        if let Some(addr) = &self.metrics_addr {
            addr.parse::<SocketAddr>()
                .with_context(|| format!("invalid metrics_addr {addr}"))?;
        }
        Ok(())
    }

    /// Reads the credential key from the configured environment variable.
    pub fn credential_codec(&self) -> anyhow::Result<CredentialCodec> {
        let secret = std::env::var(&self.credential_key_env)
            .with_context(|| format!("{} is not set", self.credential_key_env))?;
        CredentialCodec::from_secret(&secret)
            .with_context(|| format!("{} does not hold a 32-byte key", self.credential_key_env))
    }

    /// JetStream settings with the audit subject bound to the stream.
    pub fn jetstream_config(&self) -> JetStreamConfig {
        let mut jetstream = self.jetstream.clone();
        if !jetstream.extra_subjects.contains(&self.audit_subject) {
            jetstream.extra_subjects.push(self.audit_subject.clone());
        }
        jetstream
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            lock_wait_budget: Duration::from_millis(self.gateway.lock_wait_budget_ms),
            lock_ttl: Duration::from_secs(self.gateway.lock_ttl_secs),
            lock_retry_interval: Duration::from_millis(self.gateway.lock_retry_interval_ms),
            status_ttl: Duration::from_secs(self.gateway.status_ttl_secs),
            max_sessions: self.gateway.max_sessions,
        }
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            poll_timeout: Duration::from_secs(self.schedule.poll_timeout_secs),
            max_attempts: self.schedule.max_attempts.max(1),
            retry_backoff: Duration::from_millis(self.schedule.retry_backoff_ms),
        }
    }

    pub fn timer_settings(&self) -> TimerSettings {
        TimerSettings {
            interval: Duration::from_secs(self.schedule.interval_secs),
            jitter: Duration::from_millis(self.schedule.jitter_ms),
            refresh: Duration::from_secs(self.schedule.refresh_secs),
            poll_timeout: Duration::from_secs(self.schedule.poll_timeout_secs),
        }
    }

    pub fn sink_retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.sink.max_attempts,
            initial_backoff: Duration::from_millis(self.sink.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.sink.max_backoff_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONFIG: &str = r#"{
        "jetstream": {"nats_url": "nats://127.0.0.1:4222", "stream_name": "telemetry"},
        "schedule": {"interval_secs": 30},
        "devices": [
            {"id": "r1", "management_addr": "10.0.0.1", "encrypted_credentials": "blob"}
        ]
    }"#;

    #[test]
    fn loads_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(config.enabled);
        assert_eq!(config.schedule.interval_secs, 30);
        assert_eq!(config.schedule.poll_timeout_secs, 15);
        assert_eq!(config.credential_key_env, "DEVICE_CREDENTIAL_KEY");
        assert_eq!(config.devices.len(), 1);
        assert_eq!(
            config.gateway_config().lock_wait_budget,
            Duration::from_secs(2)
        );
        assert!(config
            .jetstream_config()
            .extra_subjects
            .contains(&"telemetry.audit".to_string()));
    }

    #[test]
    fn rejects_zero_workers() {
        let mut config: Config = serde_json::from_str(CONFIG).unwrap();
        config.schedule.workers = 0;
        assert!(config.validate().is_err());
    }
}
