//! Key types with secure memory handling.
//!
//! All key types automatically zeroize their memory on drop to prevent
//! sensitive data from persisting in memory.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use strongbox_common::{Error, Result};

/// Length of AES-256 keys in bytes.
pub const KEY_LENGTH: usize = 32;

/// Length of the password-derived master key in bytes (512-bit).
pub const MASTER_KEY_LENGTH: usize = 64;

/// Length of the key-derivation salt in bytes.
pub const SALT_LENGTH: usize = 128;

/// Length of an AES-KW wrapped 256-bit key.
pub const WRAPPED_KEY_LENGTH: usize = KEY_LENGTH + 8;

fn random_key() -> [u8; KEY_LENGTH] {
    let mut key = [0u8; KEY_LENGTH];
    OsRng.fill_bytes(&mut key);
    key
}

fn key_from_slice(kind: &str, bytes: &[u8]) -> Result<[u8; KEY_LENGTH]> {
    bytes.try_into().map_err(|_| {
        Error::InvalidKey(format!(
            "{} must be {} bytes, got {}",
            kind,
            KEY_LENGTH,
            bytes.len()
        ))
    })
}

/// Master key derived from the user password.
///
/// Never stored. The two halves are used only as key-encryption keys.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; MASTER_KEY_LENGTH],
}

impl MasterKey {
    /// Create a master key from raw bytes.
    pub fn from_bytes(key: [u8; MASTER_KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; MASTER_KEY_LENGTH] {
        &self.key
    }

    /// KEK wrapping the content key: bytes `[0, 32)`.
    pub fn enc_kek(&self) -> KeyEncryptionKey {
        let mut kek = [0u8; KEY_LENGTH];
        kek.copy_from_slice(&self.key[..KEY_LENGTH]);
        KeyEncryptionKey { key: kek }
    }

    /// KEK wrapping the MAC key: bytes `[32, 64)`.
    pub fn auth_kek(&self) -> KeyEncryptionKey {
        let mut kek = [0u8; KEY_LENGTH];
        kek.copy_from_slice(&self.key[KEY_LENGTH..]);
        KeyEncryptionKey { key: kek }
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterKey([REDACTED])")
    }
}

/// Key-encryption key: only ever used to wrap another key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyEncryptionKey {
    key: [u8; KEY_LENGTH],
}

impl KeyEncryptionKey {
    /// Get the key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for KeyEncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyEncryptionKey([REDACTED])")
    }
}

/// Vault-wide key encrypting every item header.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ContentKey {
    key: [u8; KEY_LENGTH],
}

impl ContentKey {
    /// Create a content key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Create a content key from a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            key: key_from_slice("Content key", bytes)?,
        })
    }

    /// Generate a random content key.
    pub fn generate() -> Self {
        Self { key: random_key() }
    }

    /// Get the key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentKey([REDACTED])")
    }
}

/// Vault-wide key signing the configuration token.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MacKey {
    key: [u8; KEY_LENGTH],
}

impl MacKey {
    /// Create a MAC key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Create a MAC key from a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            key: key_from_slice("MAC key", bytes)?,
        })
    }

    /// Generate a random MAC key.
    pub fn generate() -> Self {
        Self { key: random_key() }
    }

    /// Get the key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for MacKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacKey([REDACTED])")
    }
}

/// Per-file key encrypting file content, stored inside the file's own header.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct FileKey {
    key: [u8; KEY_LENGTH],
}

impl FileKey {
    /// Create a file key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Create a file key from a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            key: key_from_slice("File key", bytes)?,
        })
    }

    /// Generate a random file key.
    pub fn generate() -> Self {
        Self { key: random_key() }
    }

    /// Get the key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileKey([REDACTED])")
    }
}

/// Salt for key derivation, fixed at `SALT_LENGTH` bytes.
///
/// Serialized as a base64 string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Salt(Vec<u8>);

impl Salt {
    /// Generate a random salt.
    pub fn generate() -> Self {
        let mut salt = vec![0u8; SALT_LENGTH];
        OsRng.fill_bytes(&mut salt);
        Self(salt)
    }

    /// Create from bytes.
    ///
    /// # Errors
    /// - `InvalidSalt` if `bytes` is not exactly `SALT_LENGTH` long
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.len() != SALT_LENGTH {
            return Err(Error::InvalidSalt(format!(
                "expected {} bytes, got {}",
                SALT_LENGTH,
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    /// Get the salt bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Salt {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Salt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)?;
        Salt::from_bytes(bytes).map_err(serde::de::Error::custom)
    }
}
