//! Chunked content encryption for file items.
//!
//! # Format
//! Content is split into `chunk_size` plaintext chunks, each sealed on its own:
//! ```text
//! chunk_i := IV_i (12) || AES-GCM(fileKey, IV_i, AAD = decimal(i) || headerIV, plaintext_i)
//! ```
//! The AAD binds every chunk to its position and to the header of the file it
//! belongs to, so reordered or spliced chunks fail authentication.

use std::io::{ErrorKind, Read, Write};

use crate::aead::{decrypt, encrypt, generate_iv, IV_SIZE, TAG_SIZE};
use crate::keys::FileKey;
use strongbox_common::{Error, Result};

/// Default plaintext chunk size (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Bytes added to every chunk: its IV and tag.
pub const CHUNK_OVERHEAD: usize = IV_SIZE + TAG_SIZE;

/// Associated data for chunk `index` of the file whose header IV is `header_iv`.
pub fn chunk_aad(index: u64, header_iv: &[u8; IV_SIZE]) -> Vec<u8> {
    let index = index.to_string();
    let mut aad = Vec::with_capacity(index.len() + IV_SIZE);
    aad.extend_from_slice(index.as_bytes());
    aad.extend_from_slice(header_iv);
    aad
}

/// Plaintext length of `ciphertext_len` bytes of chunked content.
pub fn plaintext_len(ciphertext_len: u64, chunk_size: usize) -> u64 {
    let sealed = (chunk_size + CHUNK_OVERHEAD) as u64;
    let full = ciphertext_len / sealed;
    let rest = ciphertext_len % sealed;
    full * chunk_size as u64 + rest.saturating_sub(CHUNK_OVERHEAD as u64)
}

/// Fill `buf` from `reader`, stopping early only at end of input.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Encrypting stream that processes data in chunks.
pub struct EncryptingStream<'a> {
    key: &'a FileKey,
    header_iv: [u8; IV_SIZE],
    chunk_size: usize,
}

impl<'a> EncryptingStream<'a> {
    /// Create a new encrypting stream bound to a file header.
    pub fn new(key: &'a FileKey, header_iv: [u8; IV_SIZE]) -> Self {
        Self {
            key,
            header_iv,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set custom chunk size.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Encrypt data from reader and write the sealed chunks to writer.
    ///
    /// Empty input produces no chunks.
    ///
    /// # Errors
    /// - I/O errors from reader/writer
    /// - Encryption errors
    pub fn encrypt_stream<R: Read, W: Write>(&self, mut reader: R, mut writer: W) -> Result<u64> {
        let mut buffer = vec![0u8; self.chunk_size];
        let mut total_bytes = 0u64;
        let mut index = 0u64;

        loop {
            let bytes_read = read_full(&mut reader, &mut buffer)?;
            if bytes_read == 0 {
                break;
            }

            let iv = generate_iv();
            let aad = chunk_aad(index, &self.header_iv);
            let sealed = encrypt(self.key.as_bytes(), &iv, &aad, &buffer[..bytes_read])?;
            writer.write_all(&iv)?;
            writer.write_all(&sealed)?;

            total_bytes += bytes_read as u64;
            index += 1;
            if bytes_read < self.chunk_size {
                break;
            }
        }

        writer.flush()?;
        Ok(total_bytes)
    }
}

/// Decrypting stream that processes sealed chunks.
pub struct DecryptingStream<'a> {
    key: &'a FileKey,
    header_iv: [u8; IV_SIZE],
    chunk_size: usize,
}

impl<'a> DecryptingStream<'a> {
    /// Create a new decrypting stream bound to a file header.
    pub fn new(key: &'a FileKey, header_iv: [u8; IV_SIZE]) -> Self {
        Self {
            key,
            header_iv,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set custom chunk size; must match the size used to encrypt.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Decrypt chunks from reader and write plaintext to writer.
    ///
    /// Plaintext of a chunk is written only after its tag verifies; the caller
    /// must discard the writer's contents if an error is returned.
    ///
    /// # Errors
    /// - I/O errors
    /// - `AuthenticationFailure` for a truncated, reordered, spliced or tampered chunk
    pub fn decrypt_stream<R: Read, W: Write>(&self, mut reader: R, mut writer: W) -> Result<u64> {
        let sealed_size = self.chunk_size + CHUNK_OVERHEAD;
        let mut buffer = vec![0u8; sealed_size];
        let mut total_bytes = 0u64;
        let mut index = 0u64;

        loop {
            let bytes_read = read_full(&mut reader, &mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            if bytes_read < CHUNK_OVERHEAD {
                return Err(Error::AuthenticationFailure(format!(
                    "Truncated chunk {}",
                    index
                )));
            }

            let (iv_bytes, sealed) = buffer[..bytes_read].split_at(IV_SIZE);
            let mut iv = [0u8; IV_SIZE];
            iv.copy_from_slice(iv_bytes);
            let aad = chunk_aad(index, &self.header_iv);
            let plaintext = decrypt(self.key.as_bytes(), &iv, &aad, sealed).map_err(|_| {
                Error::AuthenticationFailure(format!("Chunk {} failed authentication", index))
            })?;

            writer.write_all(&plaintext)?;
            total_bytes += plaintext.len() as u64;
            index += 1;
            if bytes_read < sealed_size {
                break;
            }
        }

        writer.flush()?;
        Ok(total_bytes)
    }
}

/// Encrypt a complete byte slice.
pub fn encrypt_bytes(key: &FileKey, header_iv: [u8; IV_SIZE], data: &[u8], chunk_size: usize) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    EncryptingStream::new(key, header_iv)
        .with_chunk_size(chunk_size)
        .encrypt_stream(data, &mut output)?;
    Ok(output)
}

/// Decrypt a complete byte slice produced by [`encrypt_bytes`].
pub fn decrypt_bytes(key: &FileKey, header_iv: [u8; IV_SIZE], data: &[u8], chunk_size: usize) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    DecryptingStream::new(key, header_iv)
        .with_chunk_size(chunk_size)
        .decrypt_stream(data, &mut output)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const CHUNK: usize = 16;

    fn sealed_chunk(n: usize) -> usize {
        n + CHUNK_OVERHEAD
    }

    #[test]
    fn test_chunk_aad_layout() {
        let iv = [7u8; IV_SIZE];
        let aad = chunk_aad(12, &iv);
        assert_eq!(&aad[..2], b"12");
        assert_eq!(&aad[2..], &iv);
    }

    #[test]
    fn test_stream_multiple_chunks() {
        let key = FileKey::generate();
        let iv = generate_iv();
        let plaintext: Vec<u8> = (0..CHUNK * 5 / 2).map(|i| i as u8).collect();

        let encrypted = encrypt_bytes(&key, iv, &plaintext, CHUNK).unwrap();
        assert_eq!(encrypted.len(), 2 * sealed_chunk(CHUNK) + sealed_chunk(CHUNK / 2));

        let decrypted = decrypt_bytes(&key, iv, &encrypted, CHUNK).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_stream_exact_multiple_of_chunk() {
        let key = FileKey::generate();
        let iv = generate_iv();
        let plaintext = vec![0xAB; CHUNK * 3];

        let encrypted = encrypt_bytes(&key, iv, &plaintext, CHUNK).unwrap();
        assert_eq!(encrypted.len(), 3 * sealed_chunk(CHUNK));
        assert_eq!(decrypt_bytes(&key, iv, &encrypted, CHUNK).unwrap(), plaintext);
    }

    #[test]
    fn test_stream_empty_data() {
        let key = FileKey::generate();
        let iv = generate_iv();

        let encrypted = encrypt_bytes(&key, iv, b"", CHUNK).unwrap();
        assert!(encrypted.is_empty());
        assert!(decrypt_bytes(&key, iv, &encrypted, CHUNK).unwrap().is_empty());
    }

    #[test]
    fn test_default_chunk_size() {
        let key = FileKey::generate();
        let iv = generate_iv();
        let plaintext = vec![1u8; DEFAULT_CHUNK_SIZE + 1];

        let mut encrypted = Vec::new();
        EncryptingStream::new(&key, iv)
            .encrypt_stream(&plaintext[..], &mut encrypted)
            .unwrap();
        assert_eq!(encrypted.len(), DEFAULT_CHUNK_SIZE + 1 + 2 * CHUNK_OVERHEAD);

        let mut decrypted = Vec::new();
        DecryptingStream::new(&key, iv)
            .decrypt_stream(&encrypted[..], &mut decrypted)
            .unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_reordered_chunks_fail() {
        let key = FileKey::generate();
        let iv = generate_iv();
        let plaintext = vec![0x11; CHUNK * 2];
        let encrypted = encrypt_bytes(&key, iv, &plaintext, CHUNK).unwrap();

        let size = sealed_chunk(CHUNK);
        let mut swapped = encrypted[size..].to_vec();
        swapped.extend_from_slice(&encrypted[..size]);

        assert!(matches!(
            decrypt_bytes(&key, iv, &swapped, CHUNK),
            Err(Error::AuthenticationFailure(_))
        ));
    }

    #[test]
    fn test_spliced_chunk_from_other_file_fails() {
        let key = FileKey::generate();
        let iv_a = generate_iv();
        let iv_b = generate_iv();
        let a = encrypt_bytes(&key, iv_a, &[1u8; CHUNK], CHUNK).unwrap();
        let b = encrypt_bytes(&key, iv_b, &[2u8; CHUNK], CHUNK).unwrap();

        assert!(decrypt_bytes(&key, iv_a, &b, CHUNK).is_err());
        assert!(decrypt_bytes(&key, iv_a, &a, CHUNK).is_ok());
    }

    #[test]
    fn test_flipped_byte_fails() {
        let key = FileKey::generate();
        let iv = generate_iv();
        let encrypted = encrypt_bytes(&key, iv, &[9u8; CHUNK * 2], CHUNK).unwrap();

        for i in 0..encrypted.len() {
            let mut tampered = encrypted.clone();
            tampered[i] ^= 0x80;
            assert!(decrypt_bytes(&key, iv, &tampered, CHUNK).is_err(), "byte {}", i);
        }
    }

    #[test]
    fn test_truncated_chunk_fails() {
        let key = FileKey::generate();
        let iv = generate_iv();
        let encrypted = encrypt_bytes(&key, iv, &[3u8; CHUNK], CHUNK).unwrap();

        assert!(decrypt_bytes(&key, iv, &encrypted[..CHUNK_OVERHEAD - 1], CHUNK).is_err());
        assert!(decrypt_bytes(&key, iv, &encrypted[..encrypted.len() - 1], CHUNK).is_err());
    }

    // No final-chunk marker: dropping whole trailing chunks still decrypts.
    #[test]
    fn test_dropped_trailing_chunk_goes_unnoticed() {
        let key = FileKey::generate();
        let iv = generate_iv();
        let plaintext = vec![5u8; CHUNK * 2];
        let encrypted = encrypt_bytes(&key, iv, &plaintext, CHUNK).unwrap();

        let first = &encrypted[..sealed_chunk(CHUNK)];
        assert_eq!(decrypt_bytes(&key, iv, first, CHUNK).unwrap(), &plaintext[..CHUNK]);
    }

    #[test]
    fn test_plaintext_len() {
        assert_eq!(plaintext_len(0, CHUNK), 0);
        assert_eq!(plaintext_len(sealed_chunk(CHUNK) as u64, CHUNK), CHUNK as u64);
        assert_eq!(
            plaintext_len((2 * sealed_chunk(CHUNK) + sealed_chunk(3)) as u64, CHUNK),
            (2 * CHUNK + 3) as u64
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_roundtrip_any_payload(data in proptest::collection::vec(any::<u8>(), 0..200), chunk in 1usize..64) {
            let key = FileKey::generate();
            let iv = generate_iv();
            let encrypted = encrypt_bytes(&key, iv, &data, chunk).unwrap();
            prop_assert_eq!(plaintext_len(encrypted.len() as u64, chunk), data.len() as u64);
            prop_assert_eq!(decrypt_bytes(&key, iv, &encrypted, chunk).unwrap(), data);
        }
    }
}
