//! Common utilities and types shared across Strongbox modules.
//!
//! This module provides the error taxonomy and the identifier and path types
//! that every other crate in the workspace builds on.

pub mod error;
pub mod types;

pub use error::{Error, PasswordRule, Result};
pub use types::{SensitiveBytes, VaultId, VaultPath};
