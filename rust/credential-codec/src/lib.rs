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

//! At-rest encryption for device credentials.
//!
//! A stored credential blob is `base64(iv || ciphertext)` where `iv` is 16
//! random bytes and `ciphertext` is the AES-256-CBC encryption of the JSON
//! document `{"username": .., "password": ..}` with PKCS#7 padding. The codec
//! holds only the key and is safe to share between tasks.

mod error;

pub use error::{Error, Result};

use aes::Aes256;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;
pub const BLOCK_LEN: usize = 16;

/// Decrypted device credentials. The password never shows up in `Debug`.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

#[derive(Serialize)]
struct PlainPayload<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct DecodedPayload {
    username: String,
    password: String,
}

#[derive(Clone)]
pub struct CredentialCodec {
    key: [u8; KEY_LEN],
}

impl fmt::Debug for CredentialCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCodec").finish_non_exhaustive()
    }
}

impl CredentialCodec {
    pub fn new(key: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LEN] = key
            .try_into()
            .map_err(|_| Error::InvalidKeyLength(key.len()))?;
        Ok(Self { key })
    }

    /// Accepts either 32 raw characters or the base64 encoding of 32 bytes.
    pub fn from_secret(secret: &str) -> Result<Self> {
        let trimmed = secret.trim();
        if trimmed.len() == KEY_LEN {
            return Self::new(trimmed.as_bytes());
        }
        let decoded = STANDARD.decode(trimmed)?;
        Self::new(&decoded)
    }

    pub fn encrypt(&self, credentials: &Credentials) -> Result<String> {
        let payload = PlainPayload {
            username: &credentials.username,
            password: credentials.password.expose_secret(),
        };
        let plaintext = serde_json::to_vec(&payload)?;
        Ok(self.encrypt_bytes(&plaintext))
    }

    pub fn decrypt(&self, blob: &str) -> Result<Credentials> {
        let plaintext = self.decrypt_bytes(blob)?;
        let payload: DecodedPayload = serde_json::from_slice(&plaintext)?;
        Ok(Credentials {
            username: payload.username,
            password: SecretString::from(payload.password),
        })
    }

    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> String {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);
        let ciphertext =
            Aes256CbcEnc::new(&self.key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut blob = Vec::with_capacity(IV_LEN + ciphertext.len());
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(&ciphertext);
        STANDARD.encode(blob)
    }

    pub fn decrypt_bytes(&self, blob: &str) -> Result<Vec<u8>> {
        let raw = STANDARD.decode(blob.trim())?;
        if raw.len() < IV_LEN + BLOCK_LEN {
            return Err(Error::TooShort(raw.len()));
        }
        let (iv, ciphertext) = raw.split_at(IV_LEN);
        if ciphertext.len() % BLOCK_LEN != 0 {
            return Err(Error::NotBlockAligned(ciphertext.len()));
        }
        let iv: [u8; IV_LEN] = iv
            .try_into()
            .map_err(|_| Error::TooShort(raw.len()))?;
        Aes256CbcDec::new(&self.key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| Error::BadPadding)
    }
}
