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

use crate::queries::{poll_commands, PollReport};
use chrono::Utc;
use device_gateway::{CommandGateway, CommandRequest, GatewayError};
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

pub const POLL_ACTOR: &str = "poller";

/// Slack on top of the gateway's own deadline before the poll future is
/// dropped outright.
const CANCEL_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub poll_timeout: Duration,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(15),
            max_attempts: 1,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Success(PollReport),
    Failed(String),
    TimedOut,
    /// Another session held the device; no health change.
    Skipped(String),
}

/// Runs the read-only query set against one device.
///
/// The whole poll, retries included, is bounded by `poll_timeout`. Dropping
/// the gateway future on cancellation releases the device lock through the
/// guard.
pub async fn run_poll(
    gateway: &CommandGateway,
    device_id: &str,
    settings: &PollSettings,
) -> PollOutcome {
    let deadline = Instant::now() + settings.poll_timeout;
    match timeout(
        settings.poll_timeout + CANCEL_GRACE,
        poll_with_retry(gateway, device_id, settings, deadline),
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(_) => PollOutcome::TimedOut,
    }
}

async fn poll_with_retry(
    gateway: &CommandGateway,
    device_id: &str,
    settings: &PollSettings,
    deadline: Instant,
) -> PollOutcome {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return PollOutcome::TimedOut;
        }

        let request = CommandRequest {
            device_id: device_id.to_string(),
            commands: poll_commands(),
            actor: POLL_ACTOR.to_string(),
            timeout: remaining,
        };
        let err = match gateway.run(request).await {
            Ok(outputs) => {
                return match PollReport::from_outputs(device_id, &outputs, Utc::now()) {
                    Ok(report) => PollOutcome::Success(report),
                    Err(err) => PollOutcome::Failed(err.to_string()),
                };
            }
            Err(err) => err,
        };

        match err {
            GatewayError::Busy { .. } => return PollOutcome::Skipped(err.to_string()),
            GatewayError::Timeout { .. } => return PollOutcome::TimedOut,
            _ if err.is_retryable() && attempt < settings.max_attempts => {
                debug!(device_id, attempt, error = %err, "poll failed; retrying");
                sleep(settings.retry_backoff.min(remaining)).await;
            }
            _ => return PollOutcome::Failed(err.to_string()),
        }
    }
}
