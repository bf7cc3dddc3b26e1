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

//! Periodic statistics polling of managed devices.
//!
//! Every poll-enabled device gets its own timer task. Ticks are queued into
//! a fixed pool of workers, which caps in-flight polls no matter how many
//! devices are registered. A poll is one locked gateway session running the
//! read-only query set; results become polled samples and a cached device
//! status.

pub mod app;
pub mod config;
mod deltas;
mod device;
mod metrics;
mod poll;
pub mod queries;
mod scheduler;
mod worker;

pub use config::Config;
pub use deltas::CounterTracker;
pub use device::{DevicePoller, PollContext};
pub use metrics::PollerMetrics;
pub use poll::{run_poll, PollOutcome, PollSettings, POLL_ACTOR};
pub use queries::{InterfaceCounters, PollReport};
pub use scheduler::{PollScheduler, TimerSettings};
pub use worker::{PollJob, PollSubmitter, PollWorkerPool, SubmitError};
