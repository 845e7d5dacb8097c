// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AES-256-GCM sealing of tenant credentials at rest.
//!
//! A sealed value is the 12-byte nonce followed by ciphertext and tag. Every
//! seal draws a fresh nonce from the system CSPRNG.

use callbridge_core::CallbridgeError;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};

const NONCE_LEN: usize = 12;

/// Key sealing tenant credentials.
#[derive(Clone)]
pub struct CredentialKey([u8; 32]);

impl std::fmt::Debug for CredentialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialKey([redacted])")
    }
}

impl CredentialKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse the 64-character hex form used in configuration.
    pub fn from_hex(hex_key: &str) -> Result<Self, CallbridgeError> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| CallbridgeError::Config(format!("credential key is not hex: {e}")))?;
        let key: [u8; 32] = bytes.try_into().map_err(|_| {
            CallbridgeError::Config("credential key must be exactly 32 bytes".to_string())
        })?;
        Ok(Self(key))
    }

    /// Generate a random key.
    pub fn generate() -> Result<Self, CallbridgeError> {
        let mut key = [0u8; 32];
        SystemRandom::new()
            .fill(&mut key)
            .map_err(|_| CallbridgeError::Internal("failed to generate random key".to_string()))?;
        Ok(Self(key))
    }

    /// Hex form, for printing a freshly generated key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn aead_key(&self) -> Result<LessSafeKey, CallbridgeError> {
        let unbound = UnboundKey::new(&AES_256_GCM, &self.0)
            .map_err(|_| CallbridgeError::Internal("failed to create AES-256-GCM key".to_string()))?;
        Ok(LessSafeKey::new(unbound))
    }
}

/// Encrypt `plaintext`, returning `nonce || ciphertext || tag`.
pub fn seal(key: &CredentialKey, plaintext: &[u8]) -> Result<Vec<u8>, CallbridgeError> {
    let aead = key.aead_key()?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce_bytes)
        .map_err(|_| CallbridgeError::Internal("failed to generate random nonce".to_string()))?;

    let mut in_out = plaintext.to_vec();
    aead.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce_bytes),
        Aad::empty(),
        &mut in_out,
    )
    .map_err(|_| CallbridgeError::Internal("AES-256-GCM encryption failed".to_string()))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&in_out);
    Ok(sealed)
}

/// Decrypt a value produced by [`seal`].
pub fn open(key: &CredentialKey, sealed: &[u8]) -> Result<Vec<u8>, CallbridgeError> {
    if sealed.len() < NONCE_LEN {
        return Err(CallbridgeError::Internal(
            "sealed credential is truncated".to_string(),
        ));
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(nonce);

    let aead = key.aead_key()?;
    let mut in_out = ciphertext.to_vec();
    let plaintext = aead
        .open_in_place(
            Nonce::assume_unique_for_key(nonce_bytes),
            Aad::empty(),
            &mut in_out,
        )
        .map_err(|_| {
            CallbridgeError::Internal(
                "credential decryption failed -- wrong key or corrupted data".to_string(),
            )
        })?;
    Ok(plaintext.to_vec())
}

/// Seal an optional text secret.
pub fn seal_text(
    key: &CredentialKey,
    value: Option<&str>,
) -> Result<Option<Vec<u8>>, CallbridgeError> {
    value.map(|v| seal(key, v.as_bytes())).transpose()
}

/// Open an optional sealed text secret.
pub fn open_text(
    key: &CredentialKey,
    sealed: Option<&[u8]>,
) -> Result<Option<String>, CallbridgeError> {
    sealed
        .map(|s| {
            let bytes = open(key, s)?;
            String::from_utf8(bytes)
                .map_err(|_| CallbridgeError::Internal("credential is not UTF-8".to_string()))
        })
        .transpose()
}
