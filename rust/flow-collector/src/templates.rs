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

//! Learned templates and data sets waiting for one.
//!
//! Everything here is keyed by `(exporter address, source id, template id)`
//! and owned by one decoder; nothing is persisted. Time is passed in
//! explicitly so the sweep is deterministic under test.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Field length marking an IPFIX variable-length field.
pub const VARIABLE_LENGTH: u16 = 65535;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemplateKey {
    pub exporter: IpAddr,
    /// v9 source id or IPFIX observation domain id.
    pub source_id: u32,
    pub template_id: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub field_type: u16,
    pub length: u16,
    /// Set for vendor-specific IPFIX fields.
    pub enterprise: Option<u32>,
}

impl FieldSpec {
    pub fn new(field_type: u16, length: u16) -> Self {
        Self {
            field_type,
            length,
            enterprise: None,
        }
    }

    pub fn is_variable(&self) -> bool {
        self.length == VARIABLE_LENGTH
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Data,
    /// Options templates describe exporter metadata, not flows.
    Options { scope_fields: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub id: u16,
    pub kind: TemplateKind,
    pub fields: Vec<FieldSpec>,
}

impl Template {
    /// Smallest number of bytes one record can occupy; variable-length
    /// fields count their one-byte length prefix.
    pub fn min_record_len(&self) -> usize {
        self.fields
            .iter()
            .map(|f| if f.is_variable() { 1 } else { usize::from(f.length) })
            .sum()
    }
}

/// Header context a data set needs to be decoded later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketContext {
    pub version: u16,
    /// Exporter uptime; v9 only.
    pub sys_uptime_ms: Option<u32>,
    pub export_secs: u32,
}

#[derive(Debug, Clone)]
pub struct PendingSet {
    pub body: Vec<u8>,
    pub context: PacketContext,
    pub received: Instant,
}

#[derive(Debug, Clone, Copy)]
pub struct TemplateLimits {
    /// Templates unseen for this long are dropped.
    pub idle_timeout: Duration,
    /// How long a data set may wait for its template.
    pub pending_window: Duration,
    /// Data sets held per key; the oldest is discarded beyond this.
    pub pending_depth: usize,
    pub max_templates: usize,
}

impl Default for TemplateLimits {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(1800),
            pending_window: Duration::from_secs(10),
            pending_depth: 32,
            max_templates: 10_000,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub templates_expired: usize,
    /// Buffered data sets discarded because their window elapsed.
    pub template_misses: u64,
}

/// Data sets released by [`TemplateCache::learn`].
#[derive(Debug, Default)]
pub struct Learned {
    pub ready: Vec<PendingSet>,
    /// Sets that waited longer than the window; counted as misses.
    pub expired: u64,
}

struct Entry {
    template: Arc<Template>,
    last_seen: Instant,
}

pub struct TemplateCache {
    limits: TemplateLimits,
    templates: HashMap<TemplateKey, Entry>,
    pending: HashMap<TemplateKey, VecDeque<PendingSet>>,
}

impl TemplateCache {
    pub fn new(limits: TemplateLimits) -> Self {
        Self {
            limits,
            templates: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    /// Installs or replaces the template for `key` and hands back the data
    /// sets that were waiting for it, oldest first.
    pub fn learn(&mut self, key: TemplateKey, template: Template, now: Instant) -> Learned {
        if !self.templates.contains_key(&key) && self.templates.len() >= self.limits.max_templates {
            self.evict_least_recent();
        }
        self.templates.insert(
            key,
            Entry {
                template: Arc::new(template),
                last_seen: now,
            },
        );

        let window = self.limits.pending_window;
        let mut learned = Learned::default();
        for set in self.pending.remove(&key).unwrap_or_default() {
            if now.saturating_duration_since(set.received) <= window {
                learned.ready.push(set);
            } else {
                learned.expired += 1;
            }
        }
        learned
    }

    /// IPFIX template withdrawal.
    pub fn withdraw(&mut self, key: &TemplateKey) {
        self.templates.remove(key);
    }

    pub fn lookup(&mut self, key: &TemplateKey, now: Instant) -> Option<Arc<Template>> {
        let entry = self.templates.get_mut(key)?;
        entry.last_seen = now;
        Some(Arc::clone(&entry.template))
    }

    /// Parks a data set until its template arrives. Returns the number of
    /// older sets discarded to stay within the per-key depth.
    pub fn buffer(&mut self, key: TemplateKey, set: PendingSet) -> u64 {
        let depth = self.limits.pending_depth.max(1);
        let queue = self.pending.entry(key).or_default();
        let mut discarded = 0;
        while queue.len() >= depth {
            queue.pop_front();
            discarded += 1;
        }
        queue.push_back(set);
        discarded
    }

    /// Drops idle templates and data sets whose wait window elapsed.
    pub fn sweep(&mut self, now: Instant) -> SweepStats {
        let idle = self.limits.idle_timeout;
        let window = self.limits.pending_window;

        let before = self.templates.len();
        self.templates
            .retain(|_, entry| now.saturating_duration_since(entry.last_seen) < idle);

        let mut misses = 0u64;
        self.pending.retain(|_, queue| {
            let len = queue.len();
            queue.retain(|set| now.saturating_duration_since(set.received) <= window);
            misses += (len - queue.len()) as u64;
            !queue.is_empty()
        });

        SweepStats {
            templates_expired: before - self.templates.len(),
            template_misses: misses,
        }
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.values().map(VecDeque::len).sum()
    }

    fn evict_least_recent(&mut self) {
        let oldest = self
            .templates
            .iter()
            .min_by_key(|(_, entry)| entry.last_seen)
            .map(|(key, _)| *key);
        if let Some(key) = oldest {
            self.templates.remove(&key);
        }
    }
}
