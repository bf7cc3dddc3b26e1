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

use crate::templates::TemplateLimits;
use crate::FormatToggles;
use anyhow::Context;
use sample_sink::{JetStreamConfig, RetryPolicy, WriterConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    // UDP listener
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    // Buffering between decode and persistence
    #[serde(default = "default_channel_size")]
    pub channel_size: usize,
    #[serde(default)]
    pub writer: WriterSettings,

    // Decoding
    #[serde(default)]
    pub templates: TemplateSettings,
    #[serde(default)]
    pub formats: FormatToggles,
    /// Exporter address to device id. Unmapped exporters are recorded
    /// under their address.
    #[serde(default)]
    pub exporters: HashMap<String, String>,

    // Persistence
    pub jetstream: JetStreamConfig,

    // Observability
    #[serde(default)]
    pub metrics_addr: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WriterSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            workers: default_workers(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TemplateSettings {
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_pending_window_ms")]
    pub pending_window_ms: u64,
    #[serde(default = "default_pending_depth")]
    pub pending_depth: usize,
    #[serde(default = "default_max_templates")]
    pub max_templates: usize,
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            pending_window_ms: default_pending_window_ms(),
            pending_depth: default_pending_depth(),
            max_templates: default_max_templates(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_listen_addr() -> String {
    "0.0.0.0:2055".to_string()
}

fn default_buffer_size() -> usize {
    65535
}

fn default_channel_size() -> usize {
    10000
}

fn default_batch_size() -> usize {
    500
}

fn default_flush_interval_ms() -> u64 {
    1000
}

fn default_workers() -> usize {
    2
}

fn default_max_attempts() -> u32 {
    4
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    2000
}

fn default_idle_timeout_secs() -> u64 {
    1800
}

fn default_pending_window_ms() -> u64 {
    10_000
}

fn default_pending_depth() -> usize {
    32
}

fn default_max_templates() -> usize {
    10_000
}

fn default_sweep_interval_ms() -> u64 {
    1000
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
        if self.listen_addr.is_empty() {
            anyhow::bail!("listen_addr cannot be empty");
        }
        if self.buffer_size == 0 {
            anyhow::bail!("buffer_size must be greater than zero");
        }
        if self.channel_size == 0 {
            anyhow::bail!("channel_size must be greater than zero");
        }
        if self.writer.workers == 0 || self.writer.batch_size == 0 {
            anyhow::bail!("writer workers and batch_size must be greater than zero");
        }
        if self.templates.max_templates == 0 || self.templates.pending_depth == 0 {
            anyhow::bail!("max_templates and pending_depth must be greater than zero");
        }
        if self.jetstream.nats_url.is_empty() {
            anyhow::bail!("jetstream.nats_url cannot be empty");
        }
        if self.jetstream.stream_name.is_empty() {
            anyhow::bail!("jetstream.stream_name cannot be empty");
        }
        if let Some(addr) = &self.metrics_addr {
            addr.parse::<SocketAddr>()
                .with_context(|| format!("invalid metrics_addr {addr}"))?;
        }
        self.exporter_map()?;
        Ok(())
    }

    pub fn exporter_map(&self) -> anyhow::Result<HashMap<IpAddr, String>> {
        self.exporters
            .iter()
            .map(|(addr, device)| {
                let ip = addr
                    .parse::<IpAddr>()
                    .with_context(|| format!("invalid exporter address {addr}"))?;
                Ok((ip, device.clone()))
            })
            .collect()
    }

    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            batch_size: self.writer.batch_size,
            flush_interval: Duration::from_millis(self.writer.flush_interval_ms),
            workers: self.writer.workers,
            retry: RetryPolicy {
                max_attempts: self.writer.max_attempts,
                initial_backoff: Duration::from_millis(self.writer.initial_backoff_ms),
                max_backoff: Duration::from_millis(self.writer.max_backoff_ms),
            },
        }
    }

    pub fn template_limits(&self) -> TemplateLimits {
        TemplateLimits {
            idle_timeout: Duration::from_secs(self.templates.idle_timeout_secs),
            pending_window: Duration::from_millis(self.templates.pending_window_ms),
            pending_depth: self.templates.pending_depth,
            max_templates: self.templates.max_templates,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.templates.sweep_interval_ms.max(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"{
        "jetstream": {"nats_url": "nats://127.0.0.1:4222", "stream_name": "telemetry"},
        "exporters": {"10.0.0.1": "edge-router-1"},
        "formats": {"ipfix": false}
    }"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:2055");
        assert_eq!(config.buffer_size, 65535);
        assert!(config.formats.netflow_v5);
        assert!(!config.formats.ipfix);
        assert_eq!(config.writer_config().retry.max_attempts, 4);
        assert_eq!(
            config.exporter_map().unwrap().get(&"10.0.0.1".parse::<IpAddr>().unwrap()),
            Some(&"edge-router-1".to_string())
        );
    }

    #[test]
    fn rejects_bad_exporter_address() {
        let mut config: Config = serde_json::from_str(MINIMAL).unwrap();
        config.exporters.insert("not-an-ip".into(), "x".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_channel() {
        let mut config: Config = serde_json::from_str(MINIMAL).unwrap();
        config.channel_size = 0;
        assert!(config.validate().is_err());
    }
}
