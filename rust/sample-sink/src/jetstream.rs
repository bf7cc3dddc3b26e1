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

use crate::{ResourceSample, Result, SampleSink, SinkError, TrafficSample};
use async_nats::jetstream::{self, stream::StorageType};
use async_nats::ConnectOptions;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::min;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JetStreamConfig {
    pub nats_url: String,
    pub stream_name: String,
    /// Samples go to `<prefix>.traffic` and `<prefix>.resources`.
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
    /// Extra subjects bound to the same stream, e.g. the audit subject.
    #[serde(default)]
    pub extra_subjects: Vec<String>,
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default)]
    pub creds_file: Option<String>,
}

fn default_subject_prefix() -> String {
    "telemetry".to_string()
}

fn default_publish_timeout_ms() -> u64 {
    5000
}

fn default_connect_attempts() -> u32 {
    60
}

impl JetStreamConfig {
    pub fn traffic_subject(&self) -> String {
        format!("{}.traffic", self.subject_prefix)
    }

    pub fn resources_subject(&self) -> String {
        format!("{}.resources", self.subject_prefix)
    }

    fn stream_subjects(&self) -> Vec<String> {
        let mut subjects = vec![self.traffic_subject(), self.resources_subject()];
        subjects.extend(self.extra_subjects.iter().cloned());
        subjects
    }
}

/// Publishes JSON documents to a JetStream stream and waits for acks.
#[derive(Clone)]
pub struct JetStreamPublisher {
    js: jetstream::Context,
    publish_timeout: Duration,
}

impl JetStreamPublisher {
    pub async fn connect(config: &JetStreamConfig) -> Result<Self> {
        let js = connect_with_retry(config).await?;
        Ok(Self {
            js,
            publish_timeout: Duration::from_millis(config.publish_timeout_ms),
        })
    }

    pub async fn publish_json<T: Serialize + ?Sized>(&self, subject: &str, value: &T) -> Result<()> {
        let payload = serde_json::to_vec(value)?;
        let ack = self
            .js
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| SinkError::Write(e.to_string()))?;
        match timeout(self.publish_timeout, ack).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(SinkError::Write(e.to_string())),
            Err(_) => Err(SinkError::Timeout(self.publish_timeout)),
        }
    }
}

async fn connect_once(config: &JetStreamConfig) -> Result<jetstream::Context> {
    let mut options = ConnectOptions::new();
    if let Some(creds) = &config.creds_file {
        options = options
            .credentials_file(creds)
            .await
            .map_err(|e| SinkError::Connect(e.to_string()))?;
    }

    let client = options
        .connect(&config.nats_url)
        .await
        .map_err(|e| SinkError::Connect(e.to_string()))?;
    let js = jetstream::new(client);

    let stream_config = jetstream::stream::Config {
        name: config.stream_name.clone(),
        subjects: config.stream_subjects(),
        storage: StorageType::File,
        max_age: Duration::from_secs(24 * 60 * 60),
        ..Default::default()
    };
    js.get_or_create_stream(stream_config)
        .await
        .map_err(|e| SinkError::Connect(e.to_string()))?;

    info!(
        nats_url = %config.nats_url,
        stream = %config.stream_name,
        "connected to NATS and ensured stream exists"
    );
    Ok(js)
}

async fn connect_with_retry(config: &JetStreamConfig) -> Result<jetstream::Context> {
    let mut attempt: u32 = 0;
    let max_backoff = Duration::from_secs(30);
    let mut backoff = Duration::from_millis(500);
    let max_attempts = config.connect_attempts.max(1);

    loop {
        attempt += 1;
        match connect_once(config).await {
            Ok(js) => return Ok(js),
            Err(err) => {
                if attempt >= max_attempts {
                    error!(attempt, error = %err, "giving up on NATS connection");
                    return Err(err);
                }
                warn!(attempt, error = %err, ?backoff, "NATS connection failed; retrying");
                sleep(backoff).await;
                backoff = min(backoff.checked_mul(2).unwrap_or(max_backoff), max_backoff);
            }
        }
    }
}

/// [`SampleSink`] publishing one message per sample. A failure reports the
/// samples acked before it so retries do not publish them again.
pub struct JetStreamSink {
    publisher: JetStreamPublisher,
    traffic_subject: String,
    resources_subject: String,
}

impl JetStreamSink {
    pub fn new(publisher: JetStreamPublisher, config: &JetStreamConfig) -> Self {
        Self {
            publisher,
            traffic_subject: config.traffic_subject(),
            resources_subject: config.resources_subject(),
        }
    }
}

#[async_trait]
impl SampleSink for JetStreamSink {
    async fn write_traffic(&self, batch: &[TrafficSample]) -> Result<()> {
        for (acked, sample) in batch.iter().enumerate() {
            self.publisher
                .publish_json(&self.traffic_subject, sample)
                .await
                .map_err(|e| SinkError::after(acked, e))?;
        }
        Ok(())
    }

    async fn write_resources(&self, batch: &[ResourceSample]) -> Result<()> {
        for (acked, sample) in batch.iter().enumerate() {
            self.publisher
                .publish_json(&self.resources_subject, sample)
                .await
                .map_err(|e| SinkError::after(acked, e))?;
        }
        Ok(())
    }
}
