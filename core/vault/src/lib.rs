//! Vault engine for Strongbox.
//!
//! This module provides:
//! - Vault creation, import, and lifecycle management
//! - The signed configuration token
//! - Encrypted file and directory items
//! - Tree operations on an unlocked vault
//!
//! # Architecture
//! A [`Vault`] owns its [`KeyManager`](strongbox_crypto::KeyManager) and, while
//! unlocked, a [`VaultSession`] holding the content key. Tree operations go
//! through [`VaultOperations`], which borrows the session.

pub mod config;
pub mod item;
pub mod manager;
pub mod operations;
pub mod session;
pub mod tree;
pub mod vault;

pub use config::{SignedToken, VaultConfiguration, VaultVersion};
pub use item::{DirectoryItem, FileItem, VaultItem};
pub use manager::{SharedVault, VaultManager};
pub use operations::VaultOperations;
pub use session::{LockState, SessionHandle, VaultSession};
pub use tree::{TreeEntry, VaultTree};
pub use vault::Vault;
