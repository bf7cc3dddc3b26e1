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

use crate::{Command, CommandKind, CommandOutput, Device, DeviceConnector, DeviceSession, SessionError};
use async_trait::async_trait;
use credential_codec::Credentials;
use reqwest::{Client, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Path probed to verify credentials before running commands.
const AUTH_PROBE_PATH: &str = "system/identity";

/// Talks to devices exposing a JSON REST management API under `/rest/`.
#[derive(Debug, Default, Clone)]
pub struct HttpConnector;

impl HttpConnector {
    pub fn new() -> Self {
        Self
    }
}

fn base_url(addr: &str) -> String {
    let trimmed = addr.trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

fn method_for(kind: CommandKind) -> Method {
    match kind {
        CommandKind::Read => Method::GET,
        CommandKind::Create => Method::PUT,
        CommandKind::Update => Method::PATCH,
        CommandKind::Delete => Method::DELETE,
        CommandKind::Invoke => Method::POST,
    }
}

fn map_reqwest(err: reqwest::Error) -> SessionError {
    if err.is_timeout() {
        SessionError::Timeout
    } else {
        SessionError::Transport(err.without_url().to_string())
    }
}

#[async_trait]
impl DeviceConnector for HttpConnector {
    async fn connect(
        &self,
        device: &Device,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Box<dyn DeviceSession>, SessionError> {
        let client = Client::builder()
            .connect_timeout(timeout.min(device.connection.timeout()))
            .timeout(timeout)
            .danger_accept_invalid_certs(device.connection.accept_invalid_certs)
            .pool_max_idle_per_host(device.connection.max_sessions.max(1) as usize)
            .build()
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        debug!(device_id = %device.id, "opened http session");
        Ok(Box::new(HttpSession {
            client,
            base: format!("{}/rest", base_url(&device.management_addr)),
            username: credentials.username.clone(),
            password: SecretString::from(credentials.password.expose_secret().to_string()),
        }))
    }
}

struct HttpSession {
    client: Client,
    base: String,
    username: String,
    password: SecretString,
}

impl HttpSession {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, SessionError> {
        let url = format!("{}/{}", self.base, path.trim_start_matches('/'));
        let mut request = self
            .client
            .request(method, url)
            .basic_auth(&self.username, Some(self.password.expose_secret()));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(map_reqwest)?;
        let status = response.status();
        let text = response.text().await.map_err(map_reqwest)?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SessionError::AuthRejected(format!("http {}", status.as_u16())));
        }
        if status.is_client_error() {
            return Err(SessionError::Rejected {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }
        if !status.is_success() {
            return Err(SessionError::Transport(format!(
                "http {}: {}",
                status.as_u16(),
                error_message(&text)
            )));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| SessionError::Protocol(e.to_string()))
    }
}

/// Pulls a readable message out of an error body: `{"message": ...}`,
/// `{"detail": ...}`, or the raw text.
fn error_message(text: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
        for field in ["message", "detail", "error"] {
            if let Some(Value::String(msg)) = map.get(field) {
                return msg.clone();
            }
        }
    }
    text.trim().chars().take(256).collect()
}

#[async_trait]
impl DeviceSession for HttpSession {
    async fn authenticate(&mut self) -> Result<(), SessionError> {
        self.send(Method::GET, AUTH_PROBE_PATH, None).await.map(|_| ())
    }

    async fn execute(&mut self, command: &Command) -> Result<CommandOutput, SessionError> {
        let body = self
            .send(method_for(command.kind), &command.path, command.body.as_ref())
            .await?;
        Ok(CommandOutput { body })
    }
}
