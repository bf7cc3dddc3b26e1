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

//! Wiring shared by the `run` and `exec` commands.

use crate::config::Config;
use anyhow::Context;
use device_gateway::{
    AuditSink, CommandGateway, DeviceRegistry, HttpConnector, JetStreamAuditSink, StaticRegistry,
};
use kvutil::{KvStore, MemoryStore, RedisStore};
use sample_sink::JetStreamPublisher;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Services {
    pub registry: Arc<StaticRegistry>,
    pub store: Arc<dyn KvStore>,
    pub publisher: JetStreamPublisher,
    pub gateway: Arc<CommandGateway>,
}

pub async fn connect_store(redis_url: Option<&str>) -> anyhow::Result<Arc<dyn KvStore>> {
    match redis_url {
        Some(url) => {
            let store = RedisStore::connect(url)
                .await
                .with_context(|| format!("connecting to {url}"))?;
            info!("using redis for cache and locks");
            Ok(Arc::new(store))
        }
        None => {
            warn!("no redis_url configured; locks only cover this process");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

pub async fn build(config: &Config) -> anyhow::Result<Services> {
    let codec = config.credential_codec()?;
    let store = connect_store(config.redis_url.as_deref()).await?;
    let registry = Arc::new(StaticRegistry::new(config.devices.clone()));

    let jetstream = config.jetstream_config();
    let publisher = JetStreamPublisher::connect(&jetstream)
        .await
        .context("connecting to JetStream")?;
    let audit: Arc<dyn AuditSink> = Arc::new(JetStreamAuditSink::new(
        publisher.clone(),
        config.audit_subject.clone(),
    ));

    let gateway = Arc::new(CommandGateway::new(
        config.gateway_config(),
        Arc::clone(&registry) as Arc<dyn DeviceRegistry>,
        Arc::new(codec),
        Arc::new(HttpConnector::new()),
        Arc::clone(&store),
        audit,
    ));

    Ok(Services {
        registry,
        store,
        publisher,
        gateway,
    })
}
