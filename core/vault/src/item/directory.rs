//! Encrypted directories.
//!
//! Both directions walk the tree with an explicit worklist, so nesting depth
//! is bounded by heap rather than stack.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{
    file_name_of, list_items, open_bound_header, read_sealed_header, unique_destination,
    FileItem, ItemPaths, VaultItem, HEADER_EXTENSION,
};
use strongbox_common::{Error, Result};
use strongbox_crypto::{ContentKey, ItemHeader, ItemKind};

/// A directory stored in the vault.
#[derive(Debug, Clone)]
pub struct DirectoryItem {
    pub(super) paths: ItemPaths,
    name: Option<String>,
}

impl DirectoryItem {
    pub(super) fn at(paths: ItemPaths) -> Self {
        Self { paths, name: None }
    }

    /// Create an empty encrypted directory named `name` in `parent`.
    ///
    /// # Errors
    /// - `NameTooLong` if `name` exceeds 255 bytes
    /// - `Io` if the directory or its header cannot be written
    pub fn create(
        name: &str,
        parent: &Path,
        data_root: &Path,
        content_key: &ContentKey,
    ) -> Result<Self> {
        let header = ItemHeader::for_directory(name)?;
        let sealed = header.seal(content_key)?;
        let enc_name = sealed.encoded_name();
        let abs_path = parent.join(&enc_name);

        fs::create_dir(&abs_path)?;
        let item = Self {
            paths: ItemPaths::new(data_root, abs_path),
            name: Some(name.to_string()),
        };

        let written = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(item.header_path())
            .and_then(|mut file| {
                file.write_all(sealed.as_bytes())?;
                file.sync_all()
            });
        if let Err(e) = written {
            let _ = fs::remove_dir_all(item.abs_path());
            return Err(e.into());
        }

        Ok(item)
    }

    /// Encrypt the directory at `source`, and everything below it, into
    /// `parent`.
    ///
    /// Only regular files and directories are taken; other entries such as
    /// symlinks are skipped. On error the partially written tree is removed.
    pub fn encrypt(
        source: &Path,
        parent: &Path,
        data_root: &Path,
        content_key: &ContentKey,
    ) -> Result<Self> {
        let root = Self::create(&file_name_of(source)?, parent, data_root, content_key)?;

        let result = (|| -> Result<usize> {
            let mut count = 0;
            let mut pending = vec![(source.to_path_buf(), root.abs_path().to_path_buf())];

            while let Some((src_dir, vault_dir)) = pending.pop() {
                let mut entries = fs::read_dir(&src_dir)?.collect::<std::io::Result<Vec<_>>>()?;
                entries.sort_by_key(|e| e.file_name());

                for entry in entries {
                    let path = entry.path();
                    let file_type = entry.file_type()?;
                    if file_type.is_dir() {
                        let child =
                            Self::create(&file_name_of(&path)?, &vault_dir, data_root, content_key)?;
                        pending.push((path, child.paths.abs_path));
                    } else if file_type.is_file() {
                        FileItem::encrypt(&path, &vault_dir, data_root, content_key)?;
                    } else {
                        warn!(path = %path.display(), "Skipping entry that is not a file or directory");
                        continue;
                    }
                    count += 1;
                }
            }
            Ok(count)
        })();

        match result {
            Ok(count) => {
                debug!(enc_name = %root.paths.enc_name(), items = count, "Encrypted directory");
                Ok(root)
            }
            Err(e) => {
                let _ = fs::remove_dir_all(root.abs_path());
                Err(e)
            }
        }
    }

    /// Decrypt the directory and its subtree into `destination`, returning
    /// the name written there.
    ///
    /// The tree is rebuilt in a hidden staging directory which is renamed to
    /// the recovered plaintext name once every child has been decrypted. On
    /// error the staging directory is removed and nothing appears in
    /// `destination`.
    pub fn decrypt(&mut self, destination: &Path, content_key: &ContentKey) -> Result<String> {
        let header = self.read_header(content_key)?;
        let staging_name = format!(".{}.partial", self.paths.enc_name());
        let staging = unique_destination(destination, &staging_name);
        fs::create_dir(&staging)?;

        let result = (|| -> Result<()> {
            let mut pending = vec![(self.clone(), staging.clone())];

            while let Some((dir, out_dir)) = pending.pop() {
                for mut child in dir.children()? {
                    match child {
                        VaultItem::File(ref mut file) => {
                            file.decrypt(&out_dir, content_key)?;
                        }
                        VaultItem::Directory(ref mut sub) => {
                            let sub_header = sub.read_header(content_key)?;
                            let target = unique_destination(&out_dir, sub_header.name());
                            fs::create_dir(&target)?;
                            pending.push((sub.clone(), target));
                        }
                    }
                }
            }

            Ok(())
        })();

        if let Err(e) = result {
            warn!(enc_name = %self.paths.enc_name(), "Directory failed to decrypt, removing output");
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        let target = unique_destination(destination, header.name());
        if let Err(e) = fs::rename(&staging, &target) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e.into());
        }
        file_name_of(&target)
    }

    /// Open the header, recording the plaintext name.
    ///
    /// # Errors
    /// - `Io` if the header file is missing
    /// - `MalformedHeader` if it has the wrong size
    /// - `AuthenticationFailure` if it fails to verify or belongs elsewhere
    pub fn read_header(&mut self, content_key: &ContentKey) -> Result<ItemHeader> {
        let file = fs::File::open(self.header_path())?;
        if file.metadata()?.len() != ItemKind::Directory.header_len() as u64 {
            return Err(Error::MalformedHeader(format!(
                "Directory header of {} has the wrong size",
                self.paths.enc_name()
            )));
        }
        let sealed = read_sealed_header(file, ItemKind::Directory)?;
        let header = open_bound_header(&sealed, self.paths.enc_name(), content_key)?;
        self.name = Some(header.name().to_string());
        Ok(header)
    }

    /// Items directly inside this directory, excluding its header.
    pub fn children(&self) -> Result<Vec<VaultItem>> {
        list_items(&self.paths)
    }

    /// Path of the header file, `<E>/<E>.dir`.
    pub fn header_path(&self) -> PathBuf {
        self.paths
            .abs_path
            .join(format!("{}.{}", self.paths.enc_name(), HEADER_EXTENSION))
    }

    pub fn abs_path(&self) -> &Path {
        &self.paths.abs_path
    }

    pub fn rel_path(&self) -> &Path {
        &self.paths.rel_path
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}
