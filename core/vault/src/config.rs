//! Vault configuration and its signed on-disk token.
//!
//! The token is three unpadded URL-safe base64 fields joined by `.`:
//! the MAC algorithm name, the JSON configuration, and the HMAC-SHA512 tag
//! over the first two fields (including the separating dot).

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use strongbox_common::{Error, Result, VaultId};
use strongbox_crypto::mac::{self, MAC_ALGORITHM};
use strongbox_crypto::{KdfParams, KeyManager, MacKey, Salt, WrappedKeys};

/// Extension of the token file, `<vault id>.config`.
pub const CONFIG_EXTENSION: &str = "config";

/// Data directory name in the vault directory.
pub const DATA_DIRNAME: &str = "d";

/// Vault format version for migration support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultVersion {
    pub major: u32,
    pub minor: u32,
}

impl VaultVersion {
    /// Current vault format version.
    pub const CURRENT: Self = Self { major: 1, minor: 0 };

    /// Check if this version is compatible with the current version.
    pub fn is_compatible(&self) -> bool {
        self.major == Self::CURRENT.major
    }
}

impl Default for VaultVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Persisted vault configuration.
///
/// Holds everything needed to rebuild the key manager of an existing vault.
/// Nothing in here is secret on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfiguration {
    /// Unique vault identifier.
    pub vault_id: VaultId,
    /// Vault format version.
    pub version: VaultVersion,
    /// Salt for master key derivation.
    pub salt: Salt,
    /// KDF parameters the wrapped keys were produced with.
    pub kdf_params: KdfParams,
    /// Content key wrapped under the encryption KEK.
    #[serde(with = "base64_bytes")]
    pub wrapped_content_key: Vec<u8>,
    /// MAC key wrapped under the authentication KEK.
    #[serde(with = "base64_bytes")]
    pub wrapped_mac_key: Vec<u8>,
    /// Vault creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl VaultConfiguration {
    /// Build the configuration of a new vault from its freshly wrapped keys.
    ///
    /// # Preconditions
    /// - `keys` has been wrapped with the vault password
    ///
    /// # Errors
    /// - `InvalidKey` if `keys` holds no wrapped form
    pub fn new(vault_id: VaultId, keys: &KeyManager) -> Result<Self> {
        let wrapped = keys
            .wrapped()
            .ok_or_else(|| Error::InvalidKey("Keys have not been wrapped".to_string()))?;

        Ok(Self {
            vault_id,
            version: VaultVersion::CURRENT,
            salt: keys.salt().clone(),
            kdf_params: *keys.derivator().params(),
            wrapped_content_key: wrapped.content_key.clone(),
            wrapped_mac_key: wrapped.mac_key.clone(),
            created_at: Utc::now(),
        })
    }

    /// Copy of this configuration carrying a new wrapping of the same keys.
    pub fn rewrapped(&self, wrapped: &WrappedKeys) -> Self {
        Self {
            wrapped_content_key: wrapped.content_key.clone(),
            wrapped_mac_key: wrapped.mac_key.clone(),
            ..self.clone()
        }
    }

    /// The wrapped keys stored in this configuration.
    pub fn wrapped_keys(&self) -> WrappedKeys {
        WrappedKeys {
            content_key: self.wrapped_content_key.clone(),
            mac_key: self.wrapped_mac_key.clone(),
        }
    }

    /// Serialize to bytes for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Internal(e.to_string()))
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::InvalidConfiguration(e.to_string()))
    }

    /// Encode and sign this configuration as a token.
    pub fn sign(&self, mac_key: &MacKey) -> Result<SignedToken> {
        let header = URL_SAFE_NO_PAD.encode(MAC_ALGORITHM);
        let payload = URL_SAFE_NO_PAD.encode(self.to_bytes()?);
        let signing_input = format!("{}.{}", header, payload);
        let mac = mac::sign(mac_key, signing_input.as_bytes())?;

        Ok(SignedToken {
            configuration: self.clone(),
            signing_input,
            mac,
        })
    }
}

/// A decoded (or freshly signed) configuration token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedToken {
    configuration: VaultConfiguration,
    signing_input: String,
    mac: Vec<u8>,
}

impl SignedToken {
    /// Decode a token without checking its MAC.
    ///
    /// # Errors
    /// - `InvalidConfiguration` if the token is not three base64 fields, the
    ///   algorithm is not HmacSHA512, the payload is not a configuration, or
    ///   the format version is unsupported
    pub fn parse(token: &str) -> Result<Self> {
        let token = token.trim();
        let fields: Vec<&str> = token.split('.').collect();
        let [header, payload, tag] = fields.as_slice() else {
            return Err(Error::InvalidConfiguration(format!(
                "Token must have 3 fields, found {}",
                fields.len()
            )));
        };

        let algorithm = decode_field("header", header)?;
        if algorithm != MAC_ALGORITHM.as_bytes() {
            return Err(Error::InvalidConfiguration(
                "Unsupported token MAC algorithm".to_string(),
            ));
        }

        let configuration = VaultConfiguration::from_bytes(&decode_field("payload", payload)?)?;
        if !configuration.version.is_compatible() {
            return Err(Error::InvalidConfiguration(format!(
                "Unsupported vault version {}.{}",
                configuration.version.major, configuration.version.minor
            )));
        }

        Ok(Self {
            configuration,
            signing_input: format!("{}.{}", header, payload),
            mac: decode_field("MAC", tag)?,
        })
    }

    /// The configuration carried by this token.
    pub fn configuration(&self) -> &VaultConfiguration {
        &self.configuration
    }

    /// The MAC tag as stored.
    pub fn mac(&self) -> &[u8] {
        &self.mac
    }

    /// Check the MAC tag under `mac_key`.
    ///
    /// # Errors
    /// - `InvalidConfiguration` if the tag does not match
    pub fn verify(&self, mac_key: &MacKey) -> Result<()> {
        if mac::verify(mac_key, self.signing_input.as_bytes(), &self.mac)? {
            Ok(())
        } else {
            Err(Error::InvalidConfiguration(
                "Configuration MAC does not match".to_string(),
            ))
        }
    }

    /// The token text.
    pub fn encode(&self) -> String {
        format!("{}.{}", self.signing_input, URL_SAFE_NO_PAD.encode(&self.mac))
    }
}

fn decode_field(field: &str, value: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|e| Error::InvalidConfiguration(format!("Token {} is not base64: {}", field, e)))
}

/// Path of the token file for `vault_id` inside `vault_dir`.
pub fn token_path(vault_dir: &Path, vault_id: &VaultId) -> PathBuf {
    vault_dir.join(format!("{}.{}", vault_id, CONFIG_EXTENSION))
}

/// Read and decode a token file.
///
/// # Errors
/// - `Io` if the file cannot be read
/// - `InvalidConfiguration` if its content does not decode
pub fn read_token(path: &Path) -> Result<SignedToken> {
    let bytes = fs::read(path)?;
    let text = String::from_utf8(bytes)
        .map_err(|_| Error::InvalidConfiguration("Token is not UTF-8".to_string()))?;
    SignedToken::parse(&text)
}

/// Replace the token file atomically.
///
/// The token is written to a sibling temporary file, synced, then renamed
/// over `path`, so a reader only ever sees the old or the new token.
pub fn write_token(path: &Path, token: &SignedToken) -> Result<()> {
    let tmp = path.with_extension(format!("{}.tmp", CONFIG_EXTENSION));

    let result = (|| -> Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(token.encode().as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result?;

    debug!(path = %path.display(), "Wrote configuration token");
    Ok(())
}

/// Ids of all vault tokens found in `vault_dir`.
pub fn find_vault_ids(vault_dir: &Path) -> Result<Vec<VaultId>> {
    let mut ids = Vec::new();
    for entry in fs::read_dir(vault_dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(CONFIG_EXTENSION) {
            continue;
        }
        if let Some(id) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| VaultId::new(s).ok())
        {
            ids.push(id);
        }
    }
    ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    Ok(ids)
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
