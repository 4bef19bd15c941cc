//! Encrypted vault items.
//!
//! A vault item is either a file or a directory living under the vault's data
//! directory. Its on-disk name is derived from its sealed header; the
//! plaintext name is only known after the header has been opened.
//!
//! On-disk layout:
//! - file: `<parent>/<E>` holding `header || chunk_0 || chunk_1 || ...`
//! - directory: `<parent>/<E>/` holding its children and `<E>/<E>.dir`,
//!   the directory header

mod directory;
mod file;

pub use directory::DirectoryItem;
pub use file::FileItem;

use std::cmp::Ordering;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use strongbox_common::{Error, Result};
use strongbox_crypto::{ContentKey, ItemHeader, ItemKind, SealedHeader};

/// Extension of a directory's header file.
pub const HEADER_EXTENSION: &str = "dir";

/// Location of an item: absolute on disk, and relative to the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ItemPaths {
    abs_path: PathBuf,
    rel_path: PathBuf,
}

impl ItemPaths {
    pub(crate) fn new(data_root: &Path, abs_path: PathBuf) -> Self {
        let rel_path = abs_path
            .strip_prefix(data_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| abs_path.clone());
        Self { abs_path, rel_path }
    }

    fn child(&self, name: &str) -> Self {
        Self {
            abs_path: self.abs_path.join(name),
            rel_path: self.rel_path.join(name),
        }
    }

    fn enc_name(&self) -> &str {
        self.abs_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

/// A file or directory stored in the vault.
///
/// Items order by absolute path, descending, so that sorting a subtree puts
/// every child before its parent.
#[derive(Debug, Clone)]
pub enum VaultItem {
    File(FileItem),
    Directory(DirectoryItem),
}

impl VaultItem {
    /// Encrypt `source` into `parent`, which lies under `data_root`.
    ///
    /// Directories are encrypted together with everything below them.
    ///
    /// # Errors
    /// - `IllegalArgument` if `source` is neither a file nor a directory, or
    ///   its name is not UTF-8
    /// - `NameTooLong` if a name exceeds 255 bytes
    /// - `Io` on filesystem failure
    pub fn encrypt(
        source: &Path,
        parent: &Path,
        data_root: &Path,
        content_key: &ContentKey,
    ) -> Result<Self> {
        let metadata = fs::metadata(source)?;
        if metadata.is_dir() {
            DirectoryItem::encrypt(source, parent, data_root, content_key).map(Self::Directory)
        } else if metadata.is_file() {
            FileItem::encrypt(source, parent, data_root, content_key).map(Self::File)
        } else {
            Err(Error::IllegalArgument(format!(
                "{} is neither a file nor a directory",
                source.display()
            )))
        }
    }

    /// Decrypt into `destination`, returning the name written there.
    pub fn decrypt(&mut self, destination: &Path, content_key: &ContentKey) -> Result<String> {
        match self {
            Self::File(file) => file.decrypt(destination, content_key),
            Self::Directory(dir) => dir.decrypt(destination, content_key),
        }
    }

    /// Open the item's header without touching its content.
    pub fn read_header(&mut self, content_key: &ContentKey) -> Result<ItemHeader> {
        match self {
            Self::File(file) => file.read_header(content_key),
            Self::Directory(dir) => dir.read_header(content_key),
        }
    }

    /// Remove this single item from disk. Directories must already be empty
    /// apart from their header.
    pub fn delete(&self) -> Result<()> {
        match self {
            Self::File(file) => fs::remove_file(file.abs_path())?,
            Self::Directory(dir) => {
                match fs::remove_file(dir.header_path()) {
                    Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
                    _ => {}
                }
                fs::remove_dir(dir.abs_path())?;
            }
        }
        Ok(())
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            Self::File(_) => ItemKind::File,
            Self::Directory(_) => ItemKind::Directory,
        }
    }

    pub fn abs_path(&self) -> &Path {
        &self.paths().abs_path
    }

    pub fn rel_path(&self) -> &Path {
        &self.paths().rel_path
    }

    /// Encoded on-disk name.
    pub fn enc_name(&self) -> &str {
        self.paths().enc_name()
    }

    /// Plaintext name, once the header has been read.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::File(file) => file.name(),
            Self::Directory(dir) => dir.name(),
        }
    }

    fn paths(&self) -> &ItemPaths {
        match self {
            Self::File(file) => &file.paths,
            Self::Directory(dir) => &dir.paths,
        }
    }
}

impl PartialEq for VaultItem {
    fn eq(&self, other: &Self) -> bool {
        self.abs_path() == other.abs_path()
    }
}

impl Eq for VaultItem {}

impl PartialOrd for VaultItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VaultItem {
    fn cmp(&self, other: &Self) -> Ordering {
        other.abs_path().cmp(self.abs_path())
    }
}

/// Items directly inside `dir`, sorted by encoded name.
///
/// Entries whose name contains a `.` are never items (header files, token
/// files, temporaries) and are skipped.
pub(crate) fn list_items(dir: &ItemPaths) -> Result<Vec<VaultItem>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(&dir.abs_path)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if name.contains('.') {
            continue;
        }
        let file_type = entry.file_type()?;
        if file_type.is_dir() || file_type.is_file() {
            names.push((name, file_type.is_dir()));
        }
    }
    names.sort();

    Ok(names
        .into_iter()
        .map(|(name, is_dir)| {
            let paths = dir.child(&name);
            if is_dir {
                VaultItem::Directory(DirectoryItem::at(paths))
            } else {
                VaultItem::File(FileItem::at(paths))
            }
        })
        .collect())
}

/// Items at the top of the data directory.
pub fn root_items(data_root: &Path) -> Result<Vec<VaultItem>> {
    list_items(&ItemPaths::new(data_root, data_root.to_path_buf()))
}

/// Open a header and check it belongs to the item at `enc_name`.
///
/// The encoded name is a function of the sealed header, so a header moved
/// onto another item no longer matches that item's name.
fn open_bound_header(
    sealed: &SealedHeader,
    enc_name: &str,
    content_key: &ContentKey,
) -> Result<ItemHeader> {
    let header = sealed.open(content_key)?;
    if sealed.encoded_name() != enc_name {
        return Err(Error::AuthenticationFailure(format!(
            "Header does not belong to item {}",
            enc_name
        )));
    }
    Ok(header)
}

/// Read exactly one header's worth of bytes from `reader`.
fn read_sealed_header<R: Read>(reader: R, kind: ItemKind) -> Result<SealedHeader> {
    let len = kind.header_len();
    let mut bytes = Vec::with_capacity(len);
    reader.take(len as u64).read_to_end(&mut bytes)?;
    SealedHeader::from_bytes(kind, bytes)
}

/// First free path for `name` in `dir`: `name`, then `0-name`, `1-name`, ...
pub(crate) fn unique_destination(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if fs::symlink_metadata(&candidate).is_err() {
        return candidate;
    }
    let mut index: u64 = 0;
    loop {
        let candidate = dir.join(format!("{}-{}", index, name));
        if fs::symlink_metadata(&candidate).is_err() {
            return candidate;
        }
        index += 1;
    }
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::IllegalArgument(format!("{} has no UTF-8 name", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unique_destination() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();

        assert_eq!(unique_destination(dir, "a.txt"), dir.join("a.txt"));
        fs::write(dir.join("a.txt"), b"").unwrap();
        assert_eq!(unique_destination(dir, "a.txt"), dir.join("0-a.txt"));
        fs::write(dir.join("0-a.txt"), b"").unwrap();
        fs::create_dir(dir.join("1-a.txt")).unwrap();
        assert_eq!(unique_destination(dir, "a.txt"), dir.join("2-a.txt"));
    }

    #[test]
    fn test_items_sort_children_first() {
        let root = Path::new("/data");
        let parent = VaultItem::Directory(DirectoryItem::at(ItemPaths::new(
            root,
            root.join("AAAA"),
        )));
        let child = VaultItem::File(FileItem::at(ItemPaths::new(
            root,
            root.join("AAAA").join("BBBB"),
        )));
        let sibling = VaultItem::File(FileItem::at(ItemPaths::new(root, root.join("ZZZZ"))));

        let mut items = vec![parent.clone(), sibling.clone(), child.clone()];
        items.sort();
        let pos = |item: &VaultItem| items.iter().position(|i| i == item).unwrap();
        assert!(pos(&child) < pos(&parent));
        assert_eq!(child.rel_path(), Path::new("AAAA/BBBB"));
        assert_eq!(child.enc_name(), "BBBB");
    }

    #[test]
    fn test_list_items_skips_dotted_names() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("FILE"), b"").unwrap();
        fs::create_dir(root.join("DIR")).unwrap();
        fs::write(root.join("DIR.dir"), b"").unwrap();
        fs::write(root.join("x.tmp"), b"").unwrap();

        let items = root_items(root).unwrap();
        assert_eq!(items.len(), 2);
        assert!(matches!(&items[0], VaultItem::Directory(d) if d.abs_path() == root.join("DIR")));
        assert!(matches!(&items[1], VaultItem::File(f) if f.abs_path() == root.join("FILE")));
    }
}
