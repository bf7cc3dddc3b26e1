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

use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Minimal contract over the shared store.
///
/// Every operation is non-blocking from the caller's point of view: it either
/// completes or fails with [`crate::KvError::Unavailable`]. Expired entries
/// must behave exactly like absent ones.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Atomically stores `value` only when `key` is absent or expired.
    /// Returns whether the write happened.
    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool>;

    /// Atomically deletes `key` only when its current value equals `expected`.
    /// Returns whether an entry was removed.
    async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> Result<bool>;
}
