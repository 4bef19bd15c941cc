//! Cryptographic primitives for Strongbox.
//!
//! This module provides:
//! - Password policy and PBKDF2-HMAC-SHA512 key derivation
//! - The key hierarchy: master key, AES-KW wrapped content and MAC keys
//! - Authenticated encryption using AES-256-GCM
//! - The item header codec and chunked content encryption
//! - HMAC-SHA512 signing of the configuration token
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Constant-time comparison of MAC tags

pub mod aead;
pub mod header;
pub mod kdf;
pub mod key_manager;
pub mod keys;
pub mod keywrap;
pub mod mac;
pub mod password;
pub mod stream;

pub use aead::{decrypt, encrypt, IV_SIZE, TAG_SIZE};
pub use header::{ItemHeader, ItemKind, SealedHeader, ENCODED_NAME_LENGTH, FILENAME_MAX_SIZE};
pub use kdf::{derive_key, KdfParams, KeyDerivator};
pub use key_manager::{KeyManager, WrappedKeys};
pub use keys::{ContentKey, FileKey, MacKey, MasterKey, Salt, SALT_LENGTH};
pub use password::{BreachCheck, FileBlocklist, PasswordPolicy, WeakPasswordList};
pub use stream::{DecryptingStream, EncryptingStream, DEFAULT_CHUNK_SIZE};
