//! Plaintext view of the encrypted tree.
//!
//! Nothing about the tree is persisted besides the items themselves: the
//! view is rebuilt by walking the data directory and opening every header.

use std::path::Path;

use tracing::debug;

use crate::item::{root_items, VaultItem};
use strongbox_common::{Error, Result, VaultPath};
use strongbox_crypto::{ContentKey, ItemKind};

/// One decoded item of the vault.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    /// Plaintext path from the vault root.
    pub path: VaultPath,
    /// File or directory.
    pub kind: ItemKind,
    /// Plaintext size (only for files).
    pub size: Option<u64>,
    /// The encrypted item backing this entry.
    pub item: VaultItem,
}

impl TreeEntry {
    pub fn is_file(&self) -> bool {
        self.kind == ItemKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == ItemKind::Directory
    }
}

/// Every item of a vault, sorted by plaintext path.
#[derive(Debug, Clone, Default)]
pub struct VaultTree {
    entries: Vec<TreeEntry>,
}

impl VaultTree {
    /// Walk the data directory and decode every item's name.
    ///
    /// # Errors
    /// - `AuthenticationFailure` or `MalformedHeader` if any header fails
    ///   to open
    /// - `Io` on filesystem failure
    pub fn scan(data_root: &Path, content_key: &ContentKey) -> Result<Self> {
        let mut entries = Vec::new();
        let mut pending: Vec<(VaultPath, VaultItem)> = root_items(data_root)?
            .into_iter()
            .map(|item| (VaultPath::root(), item))
            .collect();

        while let Some((parent, mut item)) = pending.pop() {
            let header = item.read_header(content_key)?;
            let path = parent.join(header.name())?;

            let size = match &item {
                VaultItem::File(file) => Some(file.plaintext_size()?),
                VaultItem::Directory(dir) => {
                    pending.extend(dir.children()?.into_iter().map(|c| (path.clone(), c)));
                    None
                }
            };

            entries.push(TreeEntry {
                path,
                kind: item.kind(),
                size,
                item,
            });
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(entries = entries.len(), "Scanned vault tree");
        Ok(Self { entries })
    }

    /// All entries, sorted by path.
    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<TreeEntry> {
        self.entries
    }

    /// Entry at `path`.
    pub fn get(&self, path: &VaultPath) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| &e.path == path)
    }

    /// Entry at `path`, or `Io(NotFound)`.
    pub fn require(&self, path: &VaultPath) -> Result<&TreeEntry> {
        self.get(path).ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("No item at {}", path),
            ))
        })
    }

    /// Direct children of `dir`.
    pub fn list(&self, dir: &VaultPath) -> Vec<&TreeEntry> {
        self.entries
            .iter()
            .filter(|e| e.path.parent().as_ref() == Some(dir))
            .collect()
    }

    /// Number of files in the vault.
    pub fn count_files(&self) -> usize {
        self.entries.iter().filter(|e| e.is_file()).count()
    }

    /// Total plaintext size of all files.
    pub fn total_size(&self) -> u64 {
        self.entries.iter().filter_map(|e| e.size).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `item` and everything below it, children before parents.
///
/// Only the on-disk structure is walked; no header is opened, so this works
/// without the content key.
pub fn collect_subtree(item: VaultItem) -> Result<Vec<VaultItem>> {
    let mut collected = Vec::new();
    let mut pending = vec![item];

    while let Some(item) = pending.pop() {
        if let VaultItem::Directory(dir) = &item {
            pending.extend(dir.children()?);
        }
        collected.push(item);
    }

    collected.sort();
    Ok(collected)
}

/// Delete `item` and everything below it, returning the number of items
/// removed.
pub fn delete_subtree(item: VaultItem) -> Result<usize> {
    let items = collect_subtree(item)?;
    for item in &items {
        item.delete()?;
    }
    Ok(items.len())
}
