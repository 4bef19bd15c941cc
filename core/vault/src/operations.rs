//! Tree operations of an unlocked vault.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::item::{root_items, VaultItem};
use crate::session::VaultSession;
use crate::tree::{delete_subtree, TreeEntry, VaultTree};
use strongbox_common::{Error, Result, VaultPath};

/// Vault operations handler.
///
/// Borrows an unlocked session and the vault's data directory.
pub struct VaultOperations<'a> {
    session: &'a VaultSession,
    data_root: &'a Path,
}

impl<'a> VaultOperations<'a> {
    pub fn new(session: &'a VaultSession, data_root: &'a Path) -> Self {
        Self { session, data_root }
    }

    /// Encrypt a regular file into the top level of the vault.
    ///
    /// # Preconditions
    /// - `source` is a regular file
    /// - no top-level item has the same plaintext name
    ///
    /// # Errors
    /// - `IllegalArgument` if `source` is not a regular file
    /// - `Io(AlreadyExists)` if the name is taken
    /// - `NameTooLong` if the name exceeds 255 bytes
    pub fn add_file(&self, source: &Path) -> Result<VaultItem> {
        if !fs::metadata(source)?.is_file() {
            return Err(Error::IllegalArgument(format!(
                "{} is not a file",
                source.display()
            )));
        }
        self.add(source)
    }

    /// Encrypt a directory tree into the top level of the vault.
    ///
    /// # Errors
    /// - `IllegalArgument` if `source` is not a directory
    /// - `Io(AlreadyExists)` if the name is taken
    pub fn add_directory(&self, source: &Path) -> Result<VaultItem> {
        if !fs::metadata(source)?.is_dir() {
            return Err(Error::IllegalArgument(format!(
                "{} is not a directory",
                source.display()
            )));
        }
        self.add(source)
    }

    fn add(&self, source: &Path) -> Result<VaultItem> {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::IllegalArgument(format!("{} has no UTF-8 name", source.display())))?;
        self.ensure_name_free(name)?;

        let item = VaultItem::encrypt(source, self.data_root, self.data_root, self.content_key())?;
        info!(enc_name = %item.enc_name(), kind = ?item.kind(), "Item added");
        Ok(item)
    }

    fn ensure_name_free(&self, name: &str) -> Result<()> {
        for mut item in root_items(self.data_root)? {
            if item.read_header(self.content_key())?.name() == name {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!("An item named {} is already in the vault", name),
                )));
            }
        }
        Ok(())
    }

    /// Decrypt the item at `path` into the session destination.
    ///
    /// Returns the path of the plaintext written.
    pub fn extract(&self, path: &VaultPath) -> Result<PathBuf> {
        let tree = self.list()?;
        let mut item = tree.require(path)?.item.clone();
        self.extract_item(&mut item)
    }

    fn extract_item(&self, item: &mut VaultItem) -> Result<PathBuf> {
        let destination = self.session.destination();
        fs::create_dir_all(destination)?;
        let written = item.decrypt(destination, self.content_key())?;
        debug!(enc_name = %item.enc_name(), "Item extracted");
        Ok(destination.join(written))
    }

    /// Extract the item at `path`, then delete it from the vault.
    ///
    /// Nothing is deleted unless the extraction succeeded.
    pub fn remove(&self, path: &VaultPath) -> Result<PathBuf> {
        let tree = self.list()?;
        let mut item = tree.require(path)?.item.clone();

        let extracted = self.extract_item(&mut item)?;
        let removed = delete_subtree(item)?;
        info!(path = %path, items = removed, "Item removed");
        Ok(extracted)
    }

    /// Remove every top-level item, returning the extracted paths.
    ///
    /// Stops at the first failure; items already removed stay removed.
    pub fn clear(&self) -> Result<Vec<PathBuf>> {
        let mut extracted = Vec::new();
        for mut item in root_items(self.data_root)? {
            extracted.push(self.extract_item(&mut item)?);
            delete_subtree(item)?;
        }
        info!(items = extracted.len(), "Vault cleared");
        Ok(extracted)
    }

    /// Decode the whole tree.
    pub fn list(&self) -> Result<VaultTree> {
        VaultTree::scan(self.data_root, self.content_key())
    }

    /// Decoded entries directly inside `dir`.
    pub fn list_dir(&self, dir: &VaultPath) -> Result<Vec<TreeEntry>> {
        let tree = self.list()?;
        if !dir.is_root() && !tree.require(dir)?.is_directory() {
            return Err(Error::IllegalArgument(format!("{} is not a directory", dir)));
        }
        Ok(tree.list(dir).into_iter().cloned().collect())
    }

    fn content_key(&self) -> &strongbox_crypto::ContentKey {
        self.session.content_key()
    }
}
