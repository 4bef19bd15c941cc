//! AES key wrap (RFC 3394).
//!
//! Wrapping is deterministic and carries its own integrity check, so unwrapping
//! under the wrong KEK fails instead of yielding garbage key material.

use aes_kw::KekAes256;

use crate::keys::{KeyEncryptionKey, KEY_LENGTH, WRAPPED_KEY_LENGTH};
use strongbox_common::{Error, Result};

/// Wrap a 256-bit key under `kek`.
pub fn wrap_key(kek: &KeyEncryptionKey, key: &[u8; KEY_LENGTH]) -> Result<[u8; WRAPPED_KEY_LENGTH]> {
    let kek = KekAes256::from(*kek.as_bytes());
    let mut wrapped = [0u8; WRAPPED_KEY_LENGTH];
    kek.wrap(key, &mut wrapped)
        .map_err(|e| Error::Internal(format!("Key wrap failed: {}", e)))?;
    Ok(wrapped)
}

/// Unwrap a wrapped 256-bit key under `kek`.
///
/// # Errors
/// - `InvalidKey` if `wrapped` has the wrong length
/// - `WrongPassword` if the integrity check fails
pub fn unwrap_key(kek: &KeyEncryptionKey, wrapped: &[u8]) -> Result<[u8; KEY_LENGTH]> {
    if wrapped.len() != WRAPPED_KEY_LENGTH {
        return Err(Error::InvalidKey(format!(
            "Wrapped key must be {} bytes, got {}",
            WRAPPED_KEY_LENGTH,
            wrapped.len()
        )));
    }

    let kek = KekAes256::from(*kek.as_bytes());
    let mut key = [0u8; KEY_LENGTH];
    kek.unwrap(wrapped, &mut key)
        .map_err(|_| Error::WrongPassword)?;
    Ok(key)
}
