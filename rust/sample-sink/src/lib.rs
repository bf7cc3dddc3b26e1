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

//! Sample model and persistence path into the time-series sink.
//!
//! Flow and poll samples are immutable once built and are appended to the
//! sink; nothing here updates or aggregates them. Rollups are the sink's job.

mod error;
mod jetstream;
mod metrics;
mod model;
mod retry;
mod sink;
mod telemetry;
mod writer;

pub use error::{Result, SinkError};
pub use jetstream::{JetStreamConfig, JetStreamPublisher, JetStreamSink};
pub use metrics::{render_metrics, serve_metrics, SinkMetrics};
pub use model::{ResourceSample, SampleOrigin, TrafficSample};
pub use retry::{write_resources_with_retry, write_traffic_with_retry, RetryPolicy};
pub use sink::{MemorySink, SampleSink};
pub use telemetry::init_tracing;
pub use writer::{BatchWriter, WriterConfig};
