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

use thiserror::Error;

/// Why a datagram could not be decoded. Returned as a value and counted by
/// the processor; never propagated out of the listener loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("datagram truncated: needed {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    #[error("unsupported export version {0}")]
    UnsupportedVersion(u16),

    #[error("export version {0} is disabled")]
    FormatDisabled(u16),

    #[error("invalid v5 record count {0}")]
    InvalidCount(u16),

    #[error("v5 length mismatch: {count} records need {expected} bytes, got {actual}")]
    LengthMismatch {
        count: u16,
        expected: usize,
        actual: usize,
    },

    #[error("set {set_id} declares length {length} with {remaining} bytes left")]
    BadSetLength {
        set_id: u16,
        length: u16,
        remaining: usize,
    },

    #[error("malformed template {template_id}: {reason}")]
    BadTemplate { template_id: u16, reason: &'static str },
}

impl DecodeError {
    /// Disabled formats are ignored, not malformed.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, DecodeError::FormatDisabled(_))
    }
}
