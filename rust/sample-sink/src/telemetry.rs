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

//! Process-wide tracing setup shared by the collector and poller binaries.

use once_cell::sync::OnceCell;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: OnceCell<()> = OnceCell::new();

/// Installs the fmt subscriber once per process. `RUST_LOG` overrides the
/// default `info` filter. Later calls are no-ops, and a subscriber installed
/// elsewhere is left in place.
pub fn init_tracing(service: &'static str) {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        if fmt().with_env_filter(filter).with_target(false).try_init().is_ok() {
            info!(service, version = env!("CARGO_PKG_VERSION"), "tracing initialized");
        }
    });
}
