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

//! Cache and lock primitives shared by the device gateway and the poller.
//!
//! Both primitives sit on a [`KvStore`], a small contract over a shared
//! low-latency store reachable by every process instance:
//!
//! - [`Cache`] is a TTL'd, best-effort accelerator. Store failures read as a
//!   miss and writes are dropped with a warning.
//! - [`LockService`] hands out named, expiring mutexes. Store failures never
//!   grant a lock.
//!
//! Production deployments use [`RedisStore`]; tests and single-instance
//! setups use [`MemoryStore`].

mod cache;
pub mod keys;
mod lock;
mod memory;
mod redis_store;
mod store;

pub use cache::Cache;
pub use lock::{AcquireOutcome, LockError, LockGuard, LockService, DEFAULT_RETRY_INTERVAL};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use store::KvStore;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KvError {
    #[error("kv store unavailable: {0}")]
    Unavailable(String),
}

impl From<redis::RedisError> for KvError {
    fn from(err: redis::RedisError) -> Self {
        KvError::Unavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KvError>;
