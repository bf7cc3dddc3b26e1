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

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Counters for the persistence path.
#[derive(Clone)]
pub struct SinkMetrics {
    pub samples_written: IntCounter,
    pub write_failures: IntCounter,
    pub samples_dropped_after_retry: IntCounter,
}

impl SinkMetrics {
    pub fn new(namespace: &str) -> prometheus::Result<Self> {
        Ok(Self {
            samples_written: IntCounter::with_opts(
                Opts::new("sink_samples_written_total", "Samples accepted by the sink")
                    .namespace(namespace),
            )?,
            write_failures: IntCounter::with_opts(
                Opts::new(
                    "sink_write_failures_total",
                    "Batches that failed after exhausting retries",
                )
                .namespace(namespace),
            )?,
            samples_dropped_after_retry: IntCounter::with_opts(
                Opts::new(
                    "sink_samples_dropped_total",
                    "Samples discarded because the sink kept failing",
                )
                .namespace(namespace),
            )?,
        })
    }

    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.samples_written.clone()))?;
        registry.register(Box::new(self.write_failures.clone()))?;
        registry.register(Box::new(self.samples_dropped_after_retry.clone()))?;
        Ok(())
    }
}

/// Text exposition of everything in `registry`.
pub fn render_metrics(registry: &Registry) -> prometheus::Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Serves `/metrics` and `/health` until the listener fails.
pub async fn serve_metrics(addr: SocketAddr, registry: Registry) -> std::io::Result<()> {
    let app = Router::new()
        .route(
            "/metrics",
            get(move || {
                let registry = registry.clone();
                async move {
                    match render_metrics(&registry) {
                        Ok(text) => (
                            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
                            text,
                        )
                            .into_response(),
                        Err(err) => {
                            error!(error = %err, "failed to gather metrics");
                            (StatusCode::INTERNAL_SERVER_ERROR, "error gathering metrics")
                                .into_response()
                        }
                    }
                }
            }),
        )
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "metrics endpoint listening");
    axum::serve(listener, app).await
}
