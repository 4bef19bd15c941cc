//! Item header codec.
//!
//! # Format
//! ```text
//! header := IV (12) || AES-GCM(contentKey, IV, AAD = empty,
//!               [FileKey (32)]? || NameLen (1) || Name zero-padded to FILENAME_MAX_SIZE)
//! ```
//! Directory headers carry no file key. The obfuscated on-disk name of an item
//! is derived from its sealed header, so the same header always maps to the
//! same name.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

use crate::aead::{decrypt, encrypt, generate_iv, IV_SIZE, TAG_SIZE};
use crate::keys::{ContentKey, FileKey, KEY_LENGTH};
use strongbox_common::{Error, Result, SensitiveBytes};

/// Maximum length of a plaintext item name, in bytes.
pub const FILENAME_MAX_SIZE: usize = 255;

/// Length of the obfuscated on-disk name.
pub const ENCODED_NAME_LENGTH: usize = 32;

/// Kind of vault item a header belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    File,
    Directory,
}

impl ItemKind {
    fn plaintext_len(self) -> usize {
        let key_len = match self {
            ItemKind::File => KEY_LENGTH,
            ItemKind::Directory => 0,
        };
        key_len + 1 + FILENAME_MAX_SIZE
    }

    /// Size of a sealed header of this kind.
    pub fn header_len(self) -> usize {
        IV_SIZE + self.plaintext_len() + TAG_SIZE
    }
}

/// Check a plaintext name fits the header and is a single path component.
fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::IllegalArgument("Item name cannot be empty".to_string()));
    }
    if name.len() > FILENAME_MAX_SIZE {
        return Err(Error::NameTooLong {
            len: name.len(),
            max: FILENAME_MAX_SIZE,
        });
    }
    if !is_safe_component(name) {
        return Err(Error::IllegalArgument(format!(
            "Item name {:?} is not a single path component",
            name
        )));
    }
    Ok(())
}

fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

/// Decrypted header contents.
#[derive(Debug, Clone)]
pub struct ItemHeader {
    kind: ItemKind,
    name: String,
    file_key: Option<FileKey>,
}

impl ItemHeader {
    /// Header for a new file, with a fresh random file key.
    ///
    /// # Errors
    /// - `IllegalArgument` for an empty name, `.`, `..`, or a name holding a
    ///   path separator or NUL
    /// - `NameTooLong` if the name exceeds `FILENAME_MAX_SIZE` bytes
    pub fn for_file(name: &str) -> Result<Self> {
        check_name(name)?;
        Ok(Self {
            kind: ItemKind::File,
            name: name.to_string(),
            file_key: Some(FileKey::generate()),
        })
    }

    /// Header for a new directory.
    pub fn for_directory(name: &str) -> Result<Self> {
        check_name(name)?;
        Ok(Self {
            kind: ItemKind::Directory,
            name: name.to_string(),
            file_key: None,
        })
    }

    /// Item kind.
    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    /// Plaintext name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Per-file key; `None` for directories.
    pub fn file_key(&self) -> Option<&FileKey> {
        self.file_key.as_ref()
    }

    /// Encrypt the header under the vault content key with a fresh IV.
    pub fn seal(&self, content_key: &ContentKey) -> Result<SealedHeader> {
        let mut plaintext = SensitiveBytes::new(Vec::with_capacity(self.kind.plaintext_len()));
        if let Some(file_key) = &self.file_key {
            plaintext.extend_from_slice(file_key.as_bytes());
        }
        let name = self.name.as_bytes();
        plaintext.extend_from_slice(&[name.len() as u8]);
        plaintext.extend_from_slice(name);
        plaintext.extend_from_slice(&vec![0u8; FILENAME_MAX_SIZE - name.len()]);

        let iv = generate_iv();
        let ciphertext = encrypt(content_key.as_bytes(), &iv, &[], plaintext.as_bytes())?;

        let mut bytes = Vec::with_capacity(self.kind.header_len());
        bytes.extend_from_slice(&iv);
        bytes.extend_from_slice(&ciphertext);
        Ok(SealedHeader {
            kind: self.kind,
            bytes,
        })
    }
}

/// Header in its encrypted, on-disk form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedHeader {
    kind: ItemKind,
    bytes: Vec<u8>,
}

impl SealedHeader {
    /// Wrap raw header bytes read from disk.
    ///
    /// # Errors
    /// - `MalformedHeader` if the length does not match the item kind
    pub fn from_bytes(kind: ItemKind, bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != kind.header_len() {
            return Err(Error::MalformedHeader(format!(
                "expected {} bytes, got {}",
                kind.header_len(),
                bytes.len()
            )));
        }
        Ok(Self { kind, bytes })
    }

    /// Raw header bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The header IV, which also seeds every content chunk's AAD.
    pub fn iv(&self) -> [u8; IV_SIZE] {
        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(&self.bytes[..IV_SIZE]);
        iv
    }

    /// Obfuscated on-disk name derived from the header ciphertext.
    pub fn encoded_name(&self) -> String {
        let mut encoded = URL_SAFE_NO_PAD.encode(&self.bytes[IV_SIZE..]);
        encoded.truncate(ENCODED_NAME_LENGTH);
        encoded
    }

    /// Decrypt the header.
    ///
    /// # Errors
    /// - `AuthenticationFailure` if the tag does not verify
    /// - `MalformedHeader` if the decrypted name is unusable
    pub fn open(&self, content_key: &ContentKey) -> Result<ItemHeader> {
        let plaintext = SensitiveBytes::new(decrypt(
            content_key.as_bytes(),
            &self.iv(),
            &[],
            &self.bytes[IV_SIZE..],
        )?);
        let plaintext = plaintext.as_bytes();

        let (file_key, rest) = match self.kind {
            ItemKind::File => {
                let (key, rest) = plaintext.split_at(KEY_LENGTH);
                (Some(FileKey::from_slice(key)?), rest)
            }
            ItemKind::Directory => (None, plaintext),
        };

        let name_len = rest[0] as usize;
        let name = std::str::from_utf8(&rest[1..1 + name_len])
            .map_err(|_| Error::MalformedHeader("Name is not valid UTF-8".to_string()))?;
        if !is_safe_component(name) {
            return Err(Error::MalformedHeader(
                "Name is not a single path component".to_string(),
            ));
        }

        Ok(ItemHeader {
            kind: self.kind,
            name: name.to_string(),
            file_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_sizes() {
        assert_eq!(ItemKind::File.header_len(), 12 + 32 + 1 + 255 + 16);
        assert_eq!(ItemKind::Directory.header_len(), 12 + 1 + 255 + 16);
    }

    #[test]
    fn test_file_header_roundtrip() {
        let key = ContentKey::generate();
        let header = ItemHeader::for_file("report.pdf").unwrap();
        let sealed = header.seal(&key).unwrap();
        assert_eq!(sealed.as_bytes().len(), ItemKind::File.header_len());

        let opened = sealed.open(&key).unwrap();
        assert_eq!(opened.name(), "report.pdf");
        assert_eq!(
            opened.file_key().unwrap().as_bytes(),
            header.file_key().unwrap().as_bytes()
        );
    }

    #[test]
    fn test_directory_header_has_no_key() {
        let key = ContentKey::generate();
        let sealed = ItemHeader::for_directory("photos").unwrap().seal(&key).unwrap();
        let opened = sealed.open(&key).unwrap();
        assert_eq!(opened.kind(), ItemKind::Directory);
        assert!(opened.file_key().is_none());
    }

    #[test]
    fn test_name_at_limit_and_beyond() {
        assert!(ItemHeader::for_file(&"a".repeat(FILENAME_MAX_SIZE)).is_ok());
        assert!(matches!(
            ItemHeader::for_file(&"a".repeat(FILENAME_MAX_SIZE + 1)),
            Err(Error::NameTooLong { len: 256, max: 255 })
        ));
        assert!(matches!(
            ItemHeader::for_directory(""),
            Err(Error::IllegalArgument(_))
        ));
    }

    #[test]
    fn test_unsafe_names_are_refused_when_sealing() {
        for name in [".", "..", "a/b", "a\\b", "x\0y"] {
            assert!(
                matches!(ItemHeader::for_file(name), Err(Error::IllegalArgument(_))),
                "{:?}",
                name
            );
            assert!(matches!(
                ItemHeader::for_directory(name),
                Err(Error::IllegalArgument(_))
            ));
        }
    }

    fn seal_raw_directory_name(key: &ContentKey, name: &[u8]) -> SealedHeader {
        let mut plaintext = vec![name.len() as u8];
        plaintext.extend_from_slice(name);
        plaintext.resize(ItemKind::Directory.plaintext_len(), 0);

        let iv = generate_iv();
        let mut bytes = iv.to_vec();
        bytes.extend(encrypt(key.as_bytes(), &iv, &[], &plaintext).unwrap());
        SealedHeader::from_bytes(ItemKind::Directory, bytes).unwrap()
    }

    #[test]
    fn test_unsafe_recovered_names_are_malformed() {
        let key = ContentKey::generate();
        let names: [&[u8]; 7] = [b"", b".", b"..", b"../etc", b"a\\b", b"x\0y", &[0xff, 0xfe]];
        for name in names {
            let sealed = seal_raw_directory_name(&key, name);
            assert!(
                matches!(sealed.open(&key), Err(Error::MalformedHeader(_))),
                "{:?}",
                name
            );
        }
        let sealed = seal_raw_directory_name(&key, b"fine");
        assert_eq!(sealed.open(&key).unwrap().name(), "fine");
    }

    #[test]
    fn test_encoded_name_is_deterministic_and_url_safe() {
        let key = ContentKey::generate();
        let sealed = ItemHeader::for_file("a.txt").unwrap().seal(&key).unwrap();
        let name = sealed.encoded_name();

        assert_eq!(name.len(), ENCODED_NAME_LENGTH);
        assert_eq!(name, sealed.encoded_name());
        assert!(name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));

        let reread = SealedHeader::from_bytes(ItemKind::File, sealed.as_bytes().to_vec()).unwrap();
        assert_eq!(reread.encoded_name(), name);
    }

    #[test]
    fn test_wrong_size_is_malformed() {
        assert!(matches!(
            SealedHeader::from_bytes(ItemKind::File, vec![0u8; 10]),
            Err(Error::MalformedHeader(_))
        ));
        assert!(matches!(
            SealedHeader::from_bytes(ItemKind::Directory, vec![0u8; ItemKind::File.header_len()]),
            Err(Error::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_any_flipped_byte_fails_authentication() {
        let key = ContentKey::generate();
        let sealed = ItemHeader::for_directory("docs").unwrap().seal(&key).unwrap();

        for i in [0, IV_SIZE - 1, IV_SIZE, IV_SIZE + 40, sealed.as_bytes().len() - 1] {
            let mut bytes = sealed.as_bytes().to_vec();
            bytes[i] ^= 0x01;
            let tampered = SealedHeader::from_bytes(ItemKind::Directory, bytes).unwrap();
            assert!(matches!(
                tampered.open(&key),
                Err(Error::AuthenticationFailure(_))
            ));
        }
    }

    #[test]
    fn test_wrong_content_key_fails() {
        let sealed = ItemHeader::for_file("x").unwrap().seal(&ContentKey::generate()).unwrap();
        assert!(matches!(
            sealed.open(&ContentKey::generate()),
            Err(Error::AuthenticationFailure(_))
        ));
    }
}
