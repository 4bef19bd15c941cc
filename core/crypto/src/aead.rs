//! Authenticated encryption using AES-256-GCM.
//!
//! Every call takes an explicit 12-byte IV and associated data; callers
//! generate IVs with [`generate_iv`] and store them next to the ciphertext.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};

use crate::keys::KEY_LENGTH;
use strongbox_common::{Error, Result};

/// IV size for AES-GCM (12 bytes).
pub const IV_SIZE: usize = 12;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// Generate a random IV.
pub fn generate_iv() -> [u8; IV_SIZE] {
    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// Encrypt plaintext under `key` and `iv`, binding `aad` into the tag.
///
/// # Postconditions
/// - Returns ciphertext || tag, `plaintext.len() + TAG_SIZE` bytes
///
/// # Security
/// - Caller is responsible for IV uniqueness per key
pub fn encrypt(
    key: &[u8; KEY_LENGTH],
    iv: &[u8; IV_SIZE],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .encrypt(
            Nonce::from_slice(iv),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| Error::Internal(format!("Encryption failed: {}", e)))
}

/// Decrypt ciphertext || tag under `key` and `iv`, checking `aad`.
///
/// # Errors
/// - `AuthenticationFailure` on a short input or a tag mismatch (wrong key,
///   wrong AAD, or tampered data; these are not distinguished)
pub fn decrypt(
    key: &[u8; KEY_LENGTH],
    iv: &[u8; IV_SIZE],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(Error::AuthenticationFailure(
            "Ciphertext too short".to_string(),
        ));
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(
            Nonce::from_slice(iv),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| Error::AuthenticationFailure("Tag mismatch".to_string()))
}
