//! Unlocked vault session.
//!
//! A session exists only while the vault is unlocked. It holds the content
//! key, which is zeroized when the session is dropped on lock.

use std::fmt;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use strongbox_common::VaultId;
use strongbox_crypto::ContentKey;

/// Session handle for telling sessions apart in logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle(String);

impl SessionHandle {
    /// Generate a new unique session handle.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the handle string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lock state of a vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// Keys are available and tree operations are permitted.
    Unlocked,
    /// Only wrapped keys are held.
    Locked,
}

/// Keys and settings of an unlocked vault.
#[derive(Debug)]
pub struct VaultSession {
    handle: SessionHandle,
    vault_id: VaultId,
    content_key: ContentKey,
    destination: PathBuf,
}

impl VaultSession {
    /// Start a session.
    ///
    /// `destination` is where extracted plaintext is written.
    pub fn new(vault_id: VaultId, content_key: ContentKey, destination: impl Into<PathBuf>) -> Self {
        Self {
            handle: SessionHandle::new(),
            vault_id,
            content_key,
            destination: destination.into(),
        }
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn vault_id(&self) -> &VaultId {
        &self.vault_id
    }

    pub fn content_key(&self) -> &ContentKey {
        &self.content_key
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }
}
