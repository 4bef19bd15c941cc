//! Encrypted files.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use tracing::{debug, warn};

use super::{file_name_of, open_bound_header, read_sealed_header, unique_destination, ItemPaths};
use strongbox_common::{Error, Result};
use strongbox_crypto::{
    stream::plaintext_len, ContentKey, DecryptingStream, EncryptingStream, ItemHeader, ItemKind,
    DEFAULT_CHUNK_SIZE,
};

/// A file stored in the vault.
#[derive(Debug, Clone)]
pub struct FileItem {
    pub(super) paths: ItemPaths,
    name: Option<String>,
}

impl FileItem {
    pub(super) fn at(paths: ItemPaths) -> Self {
        Self { paths, name: None }
    }

    /// Encrypt the file at `source` into `parent`.
    ///
    /// # Postconditions
    /// - `parent/<encoded name>` holds the sealed header followed by the
    ///   encrypted chunks
    /// - on error no partial output is left behind
    ///
    /// # Errors
    /// - `NameTooLong` if the source name exceeds 255 bytes
    /// - `Io` if the source cannot be read or the output cannot be created
    pub fn encrypt(
        source: &Path,
        parent: &Path,
        data_root: &Path,
        content_key: &ContentKey,
    ) -> Result<Self> {
        let name = file_name_of(source)?;
        let header = ItemHeader::for_file(&name)?;
        let sealed = header.seal(content_key)?;
        let file_key = header
            .file_key()
            .ok_or_else(|| Error::Internal("File header without file key".to_string()))?;

        let input = File::open(source)?;
        let abs_path = parent.join(sealed.encoded_name());
        let mut output = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&abs_path)?;

        let result = (|| -> Result<u64> {
            output.write_all(sealed.as_bytes())?;
            let written = EncryptingStream::new(file_key, sealed.iv())
                .encrypt_stream(BufReader::new(input), BufWriter::new(&mut output))?;
            output.sync_all()?;
            Ok(written)
        })();

        match result {
            Ok(written) => {
                debug!(enc_name = %sealed.encoded_name(), size = written, "Encrypted file");
                Ok(Self {
                    paths: ItemPaths::new(data_root, abs_path),
                    name: Some(name),
                })
            }
            Err(e) => {
                drop(output);
                let _ = fs::remove_file(&abs_path);
                Err(e)
            }
        }
    }

    /// Decrypt into `destination`, returning the name written there.
    ///
    /// The plaintext name comes from the header; if it is taken in
    /// `destination`, the first free `N-name` is used instead.
    ///
    /// # Errors
    /// - `MalformedHeader` if the file is shorter than a header
    /// - `AuthenticationFailure` if the header or any chunk fails to verify,
    ///   or the header does not belong to this file; the partial output is
    ///   removed
    pub fn decrypt(&mut self, destination: &Path, content_key: &ContentKey) -> Result<String> {
        let mut input = BufReader::new(File::open(&self.paths.abs_path)?);
        let sealed = read_sealed_header(&mut input, ItemKind::File)?;
        let header = open_bound_header(&sealed, self.paths.enc_name(), content_key)?;
        let file_key = header
            .file_key()
            .ok_or_else(|| Error::MalformedHeader("File header without file key".to_string()))?;

        let target = unique_destination(destination, header.name());
        let output = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)?;

        let result = DecryptingStream::new(file_key, sealed.iv())
            .decrypt_stream(input, BufWriter::new(output));
        if let Err(e) = result {
            warn!(enc_name = %self.paths.enc_name(), "File failed to decrypt, removing output");
            let _ = fs::remove_file(&target);
            return Err(e);
        }

        self.name = Some(header.name().to_string());
        file_name_of(&target)
    }

    /// Open the header, recording the plaintext name.
    pub fn read_header(&mut self, content_key: &ContentKey) -> Result<ItemHeader> {
        let input = File::open(&self.paths.abs_path)?;
        let sealed = read_sealed_header(input, ItemKind::File)?;
        let header = open_bound_header(&sealed, self.paths.enc_name(), content_key)?;
        self.name = Some(header.name().to_string());
        Ok(header)
    }

    /// Plaintext size, computed from the stored size.
    pub fn plaintext_size(&self) -> Result<u64> {
        let stored = fs::metadata(&self.paths.abs_path)?.len();
        let content = stored.saturating_sub(ItemKind::File.header_len() as u64);
        Ok(plaintext_len(content, DEFAULT_CHUNK_SIZE))
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        source: PathBuf,
        data: PathBuf,
        out: PathBuf,
        key: ContentKey,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        let data = temp.path().join("d");
        let out = temp.path().join("out");
        for dir in [&source, &data, &out] {
            fs::create_dir(dir).unwrap();
        }
        Fixture {
            _temp: temp,
            source,
            data,
            out,
            key: ContentKey::generate(),
        }
    }

    fn content(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 251) as u8).collect()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let f = fixture();
        let data = content(DEFAULT_CHUNK_SIZE * 5 / 2);
        let src = f.source.join("report.pdf");
        fs::write(&src, &data).unwrap();

        let mut item = FileItem::encrypt(&src, &f.data, &f.data, &f.key).unwrap();
        assert_eq!(item.rel_path(), Path::new(item.paths.enc_name()));
        assert_eq!(item.plaintext_size().unwrap(), data.len() as u64);

        let mut reopened = FileItem::at(ItemPaths::new(&f.data, item.abs_path().to_path_buf()));
        assert_eq!(reopened.name(), None);
        let written = reopened.decrypt(&f.out, &f.key).unwrap();

        assert_eq!(written, "report.pdf");
        assert_eq!(reopened.name(), Some("report.pdf"));
        assert_eq!(fs::read(f.out.join("report.pdf")).unwrap(), data);

        // second extraction lands next to the first
        assert_eq!(item.decrypt(&f.out, &f.key).unwrap(), "0-report.pdf");
        assert_eq!(fs::read(f.out.join("0-report.pdf")).unwrap(), data);
    }

    #[test]
    fn test_empty_file() {
        let f = fixture();
        let src = f.source.join("empty");
        fs::write(&src, b"").unwrap();

        let mut item = FileItem::encrypt(&src, &f.data, &f.data, &f.key).unwrap();
        assert_eq!(
            fs::metadata(item.abs_path()).unwrap().len(),
            ItemKind::File.header_len() as u64
        );
        item.decrypt(&f.out, &f.key).unwrap();
        assert!(fs::read(f.out.join("empty")).unwrap().is_empty());
    }

    #[test]
    fn test_tampered_chunk_leaves_no_output() {
        let f = fixture();
        let src = f.source.join("notes.txt");
        fs::write(&src, content(1000)).unwrap();
        let mut item = FileItem::encrypt(&src, &f.data, &f.data, &f.key).unwrap();

        let mut bytes = fs::read(item.abs_path()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        fs::write(item.abs_path(), bytes).unwrap();

        let result = item.decrypt(&f.out, &f.key);
        assert!(matches!(result, Err(Error::AuthenticationFailure(_))));
        assert_eq!(fs::read_dir(&f.out).unwrap().count(), 0);
    }

    #[test]
    fn test_tampered_header() {
        let f = fixture();
        let src = f.source.join("notes.txt");
        fs::write(&src, content(10)).unwrap();
        let mut item = FileItem::encrypt(&src, &f.data, &f.data, &f.key).unwrap();

        let mut bytes = fs::read(item.abs_path()).unwrap();
        bytes[20] ^= 0x80;
        fs::write(item.abs_path(), bytes).unwrap();

        assert!(matches!(
            item.decrypt(&f.out, &f.key),
            Err(Error::AuthenticationFailure(_))
        ));
        assert_eq!(fs::read_dir(&f.out).unwrap().count(), 0);
    }

    #[test]
    fn test_short_file_is_malformed() {
        let f = fixture();
        fs::write(f.data.join("SHORT"), [0u8; 40]).unwrap();
        let mut item = FileItem::at(ItemPaths::new(&f.data, f.data.join("SHORT")));

        assert!(matches!(
            item.decrypt(&f.out, &f.key),
            Err(Error::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_renamed_file_is_rejected() {
        let f = fixture();
        let src = f.source.join("a");
        fs::write(&src, b"alpha").unwrap();
        let item = FileItem::encrypt(&src, &f.data, &f.data, &f.key).unwrap();

        let moved = f.data.join("MOVED");
        fs::rename(item.abs_path(), &moved).unwrap();
        let mut moved = FileItem::at(ItemPaths::new(&f.data, moved));

        assert!(matches!(
            moved.decrypt(&f.out, &f.key),
            Err(Error::AuthenticationFailure(_))
        ));
    }

    #[test]
    fn test_wrong_content_key() {
        let f = fixture();
        let src = f.source.join("a");
        fs::write(&src, b"alpha").unwrap();
        let mut item = FileItem::encrypt(&src, &f.data, &f.data, &f.key).unwrap();

        assert!(matches!(
            item.read_header(&ContentKey::generate()),
            Err(Error::AuthenticationFailure(_))
        ));
    }

    #[test]
    fn test_missing_source_leaves_nothing() {
        let f = fixture();
        let result = FileItem::encrypt(&f.source.join("absent"), &f.data, &f.data, &f.key);
        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(fs::read_dir(&f.data).unwrap().count(), 0);
    }
}
