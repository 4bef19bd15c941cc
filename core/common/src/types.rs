//! Common types used throughout Strongbox.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use zeroize::Zeroize;

/// Check that a single name is usable as one path component on disk.
///
/// # Errors
/// - `IllegalArgument` for empty names, `.`/`..`, and names containing a
///   separator or NUL
pub fn check_component(kind: &str, value: &str) -> crate::Result<()> {
    if value.is_empty() {
        return Err(crate::Error::IllegalArgument(format!(
            "{} cannot be empty",
            kind
        )));
    }
    if value == "." || value == ".." {
        return Err(crate::Error::IllegalArgument(format!(
            "{} cannot be a relative path marker",
            kind
        )));
    }
    if value.contains('/') || value.contains('\\') || value.contains('\0') {
        return Err(crate::Error::IllegalArgument(format!(
            "{} cannot contain separators",
            kind
        )));
    }
    Ok(())
}

/// Unique identifier for a vault.
///
/// The id names the vault's token file on disk, so it must be a single safe
/// path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VaultId(String);

impl VaultId {
    /// Create a new VaultId from a caller-supplied string.
    ///
    /// # Errors
    /// - Returns error if id is empty, a relative marker, or contains a separator
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        check_component("VaultId", &id)?;
        Ok(Self(id))
    }

    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VaultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A plaintext path within a vault, independent of the obfuscated on-disk names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VaultPath {
    components: Vec<String>,
}

impl VaultPath {
    /// Create a root path.
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Create a path from string components.
    ///
    /// # Errors
    /// - Returns error if any component is empty, `.`/`..`, or contains a separator
    pub fn from_components(components: Vec<String>) -> crate::Result<Self> {
        for comp in &components {
            check_component("Path component", comp)?;
        }
        Ok(Self { components })
    }

    /// Parse a path string into VaultPath.
    ///
    /// Uses '/' as separator.
    pub fn parse(path: &str) -> crate::Result<Self> {
        let path = path.trim_start_matches('/').trim_end_matches('/');
        if path.is_empty() {
            return Ok(Self::root());
        }

        let components: Vec<String> = path.split('/').map(String::from).collect();
        Self::from_components(components)
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Get the parent path, if any.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            None
        } else {
            let mut components = self.components.clone();
            components.pop();
            Some(Self { components })
        }
    }

    /// Get the file/directory name (last component).
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(|s| s.as_str())
    }

    /// Join this path with a child component.
    pub fn join(&self, child: &str) -> crate::Result<Self> {
        check_component("Child component", child)?;
        let mut components = self.components.clone();
        components.push(child.to_string());
        Ok(Self { components })
    }

    /// Whether `self` equals `ancestor` or lies below it.
    pub fn starts_with(&self, ancestor: &VaultPath) -> bool {
        self.components.starts_with(&ancestor.components)
    }

    /// Get the path components.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Convert to a string representation.
    pub fn to_string_path(&self) -> String {
        if self.is_root() {
            "/".to_string()
        } else {
            format!("/{}", self.components.join("/"))
        }
    }
}

impl fmt::Display for VaultPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_path())
    }
}

/// Sensitive data wrapper that zeroizes on drop.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SensitiveBytes(Vec<u8>);

impl SensitiveBytes {
    /// Create new sensitive bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Create a zero-filled buffer of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        Self(vec![0u8; len])
    }

    /// Get a reference to the inner bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Get a mutable reference to the inner bytes.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }

    /// Append bytes to the buffer.
    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.0.extend_from_slice(data);
    }

    /// Get the length.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SensitiveBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveBytes([REDACTED; {} bytes])", self.0.len())
    }
}
