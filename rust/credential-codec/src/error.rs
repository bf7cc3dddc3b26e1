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

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The operator secret is not 32 bytes long.
    #[error("credential key must be 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// Decoded blob cannot hold an IV and one cipher block.
    #[error("credential blob too short ({0} bytes)")]
    TooShort(usize),

    #[error("ciphertext length {0} is not a multiple of the block size")]
    NotBlockAligned(usize),

    /// Wrong key or corrupted ciphertext.
    #[error("invalid padding after decryption")]
    BadPadding,

    #[error("credential payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
