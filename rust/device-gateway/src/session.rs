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

use crate::{Command, CommandOutput, Device, SessionError};
use async_trait::async_trait;
use credential_codec::Credentials;
use std::time::Duration;

/// Opens sessions to a device's management endpoint.
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    /// Establishes transport to `device`. `timeout` bounds both the connect
    /// and every later request made through the session. The credentials are
    /// borrowed for the lifetime of the session only.
    async fn connect(
        &self,
        device: &Device,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Box<dyn DeviceSession>, SessionError>;
}

#[async_trait]
pub trait DeviceSession: Send {
    async fn authenticate(&mut self) -> Result<(), SessionError>;

    async fn execute(&mut self, command: &Command) -> Result<CommandOutput, SessionError>;

    async fn close(&mut self) {}
}
