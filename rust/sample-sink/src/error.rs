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

pub type Result<T> = std::result::Result<T, SinkError>;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("sink connection failed: {0}")]
    Connect(String),

    #[error("sink write failed: {0}")]
    Write(String),

    #[error("sink write timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("failed to encode sample: {0}")]
    Encode(#[from] serde_json::Error),

    /// The first `written` samples of the batch were stored before `source`.
    #[error("sink write failed after {written} samples: {source}")]
    Partial {
        written: usize,
        #[source]
        source: Box<SinkError>,
    },
}

impl SinkError {
    /// Leading samples of the failed batch that were already stored.
    pub fn written(&self) -> usize {
        match self {
            SinkError::Partial { written, .. } => *written,
            _ => 0,
        }
    }

    pub(crate) fn after(written: usize, source: SinkError) -> Self {
        let source = match source {
            SinkError::Partial { source, .. } => *source,
            other => other,
        };
        if written == 0 {
            source
        } else {
            SinkError::Partial {
                written,
                source: Box::new(source),
            }
        }
    }
}
