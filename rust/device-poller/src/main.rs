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
use clap::{Parser, Subcommand, ValueEnum};
use credential_codec::{CredentialCodec, Credentials};
use device_gateway::{Command, CommandKind};
use device_poller::app;
use device_poller::{Config, PollContext, PollScheduler, PollWorkerPool, PollerMetrics};
use kvutil::Cache;
use prometheus::Registry;
use sample_sink::{init_tracing, serve_metrics, JetStreamSink, SampleSink};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "DEVICE_POLLER_CONFIG", default_value = "device-poller.json")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll every enabled device until interrupted
    Run,
    /// Run one command against a device through the gateway
    Exec {
        #[arg(long)]
        device: String,
        /// Recorded in the audit trail
        #[arg(long, env = "USER")]
        actor: String,
        #[arg(long, value_enum, default_value = "read")]
        kind: KindArg,
        #[arg(long)]
        path: String,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
    /// Print the at-rest blob for a username and password
    EncryptCredential {
        #[arg(long)]
        username: String,
        #[arg(long, env = "DEVICE_PASSWORD")]
        password: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Read,
    Create,
    Update,
    Delete,
    Invoke,
}

impl From<KindArg> for CommandKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Read => CommandKind::Read,
            KindArg::Create => CommandKind::Create,
            KindArg::Update => CommandKind::Update,
            KindArg::Delete => CommandKind::Delete,
            KindArg::Invoke => CommandKind::Invoke,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("device-poller");
    let cli = Cli::parse();

    match cli.command {
        Commands::EncryptCredential { username, password } => {
            // Only the key is needed, so the config file is optional here.
            let key_env = Config::from_file(&cli.config)
                .map(|config| config.credential_key_env)
                .unwrap_or_else(|_| "DEVICE_CREDENTIAL_KEY".to_string());
            let secret =
                std::env::var(&key_env).with_context(|| format!("{key_env} is not set"))?;
            let codec = CredentialCodec::from_secret(&secret)?;
            println!("{}", codec.encrypt(&Credentials::new(&username, &password))?);
            Ok(())
        }
        Commands::Exec {
            device,
            actor,
            kind,
            path,
            body,
            timeout_secs,
        } => {
            let config = Config::from_file(&cli.config)?;
            let body: Option<serde_json::Value> = body
                .map(|raw| serde_json::from_str(&raw))
                .transpose()
                .context("--body is not valid JSON")?;
            let command = Command {
                kind: kind.into(),
                path,
                body,
            };
            let services = app::build(&config).await?;
            let output = services
                .gateway
                .execute(&device, command, &actor, Duration::from_secs(timeout_secs))
                .await?;
            println!("{}", serde_json::to_string_pretty(&output.body)?);
            Ok(())
        }
        Commands::Run => run(Config::from_file(&cli.config)?).await,
    }
}

async fn run(config: Config) -> Result<()> {
    if !config.enabled {
        info!("poller disabled in configuration");
        return Ok(());
    }
    info!(
        devices = config.devices.len(),
        interval_secs = config.schedule.interval_secs,
        workers = config.schedule.workers,
        "starting device poller"
    );

    let registry = Registry::new();
    let metrics = PollerMetrics::new()?;
    metrics.register(&registry)?;

    if let Some(addr) = &config.metrics_addr {
        let addr: SocketAddr = addr.parse().context("invalid metrics_addr")?;
        let registry = registry.clone();
        tokio::spawn(async move {
            if let Err(err) = serve_metrics(addr, registry).await {
                error!(error = %err, "metrics endpoint failed");
            }
        });
    }

    let services = app::build(&config).await?;
    let sink: Arc<dyn SampleSink> = Arc::new(JetStreamSink::new(
        services.publisher.clone(),
        &config.jetstream_config(),
    ));
    let ctx = PollContext {
        registry: services.registry.clone(),
        cache: Cache::new(Arc::clone(&services.store)),
        sink,
        retry: config.sink_retry(),
        metrics: metrics.clone(),
        degraded_threshold: config.schedule.degraded_threshold,
    };
    let pool = PollWorkerPool::spawn(
        Arc::clone(&services.gateway),
        config.poll_settings(),
        metrics,
        config.schedule.workers,
        config.schedule.queue_depth,
    );

    PollScheduler::new(ctx, pool, config.timer_settings())
        .run(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = %err, "failed to listen for shutdown signal");
            }
            info!("shutdown requested");
        })
        .await;

    info!("device poller stopped");
    Ok(())
}
