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

use anyhow::{Context, Result};
use clap::Parser;
use flow_collector::{CollectorMetrics, Config, FlowDecoder, FlowProcessor, Listener};
use prometheus::Registry;
use sample_sink::{
    init_tracing, serve_metrics, BatchWriter, JetStreamPublisher, JetStreamSink, SinkMetrics,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "FLOW_COLLECTOR_CONFIG", default_value = "flow-collector.json")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("flow-collector");
    let args = Args::parse();

    info!(config = %args.config, "starting flow collector");
    let config = Config::from_file(&args.config)?;
    if !config.enabled {
        info!("flow collector disabled in configuration");
        return Ok(());
    }
    info!(
        listen_addr = %config.listen_addr,
        channel_size = config.channel_size,
        workers = config.writer.workers,
        v5 = config.formats.netflow_v5,
        v9 = config.formats.netflow_v9,
        ipfix = config.formats.ipfix,
        "configuration loaded"
    );

    let registry = Registry::new();
    let metrics = CollectorMetrics::new()?;
    metrics.register(&registry)?;
    let sink_metrics = SinkMetrics::new("flow_collector")?;
    sink_metrics.register(&registry)?;

    if let Some(addr) = &config.metrics_addr {
        let addr: SocketAddr = addr.parse().context("invalid metrics_addr")?;
        let registry = registry.clone();
        tokio::spawn(async move {
            if let Err(err) = serve_metrics(addr, registry).await {
                error!(error = %err, "metrics endpoint failed");
            }
        });
    }

    let publisher = JetStreamPublisher::connect(&config.jetstream)
        .await
        .context("connecting to JetStream")?;
    let sink = Arc::new(JetStreamSink::new(publisher, &config.jetstream));

    let (tx, rx) = mpsc::channel(config.channel_size);
    let writers = BatchWriter::new(sink, rx, config.writer_config(), sink_metrics).spawn();

    let decoder = FlowDecoder::new(config.formats, config.template_limits());
    let processor = FlowProcessor::new(decoder, config.exporter_map()?, tx, metrics);
    let listener = Listener::bind(
        &config.listen_addr,
        config.buffer_size,
        config.sweep_interval(),
        processor,
    )
    .await
    .with_context(|| format!("binding {}", config.listen_addr))?;

    tokio::select! {
        result = listener.run() => {
            if let Err(err) = result {
                error!(error = %err, "listener stopped");
            }
        }
        _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
    }

    // The listener owned the sender; writers flush what is buffered and exit.
    for writer in writers {
        if tokio::time::timeout(Duration::from_secs(10), writer).await.is_err() {
            warn!("writer did not finish flushing in time");
        }
    }
    info!("flow collector stopped");
    Ok(())
}
