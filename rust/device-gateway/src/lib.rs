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

//! Device command gateway.
//!
//! Every privileged conversation with a device goes through
//! [`CommandGateway`], which guarantees at most one in-flight session per
//! device across all process instances (via the shared lock store), caps the
//! total number of concurrent sessions, and emits exactly one
//! [`CommandAuditRecord`] per request.
//!
//! ```text
//! Requested -> LockWait -> LockAcquired -> Connecting -> Authenticating
//!           -> Executing -> Completed | Failed
//!                      \-> LockTimeout | Busy
//! ```

mod audit;
mod command;
mod device;
mod error;
mod gateway;
mod http;
mod registry;
mod session;

pub use audit::{
    AuditFailureReason, AuditOutcome, AuditSink, CommandAuditRecord, JetStreamAuditSink,
    MemoryAuditSink,
};
pub use command::{Command, CommandKind, CommandOutput, CommandRequest, CommandState};
pub use device::{ConnectionParams, Device, DeviceStatus, Reachability};
pub use error::{GatewayError, RegistryError, SessionError};
pub use gateway::{CommandGateway, GatewayConfig};
pub use http::HttpConnector;
pub use registry::{DeviceRegistry, StaticRegistry};
pub use session::{DeviceConnector, DeviceSession};

pub use credential_codec::Credentials;
