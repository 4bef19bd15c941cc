//! Vault lifecycle: create, import, unlock, lock, change password, delete.
//!
//! A vault lives in `<storage>/<name>/` as a signed configuration token
//! `<vault id>.config` next to the data directory `d/`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::{read_token, token_path, write_token, VaultConfiguration, DATA_DIRNAME};
use crate::item::root_items;
use crate::operations::VaultOperations;
use crate::session::{LockState, VaultSession};
use crate::tree::{delete_subtree, TreeEntry};
use strongbox_common::types::check_component;
use strongbox_common::{Error, Result, VaultId, VaultPath};
use strongbox_crypto::{KeyDerivator, KeyManager};

/// An encrypted vault.
#[derive(Debug)]
pub struct Vault {
    name: String,
    storage_path: PathBuf,
    vault_dir: PathBuf,
    data_dir: PathBuf,
    configuration: VaultConfiguration,
    key_manager: KeyManager,
    session: Option<VaultSession>,
}

impl Vault {
    /// Create a new vault named `name` in `storage_path`.
    ///
    /// # Postconditions
    /// - `<storage_path>/<name>/` holds the signed token and an empty data
    ///   directory
    /// - the returned vault is locked
    ///
    /// # Errors
    /// - `IllegalArgument` if `name` is not a single path component
    /// - `InvalidPassword` if `password` violates the policy; nothing is
    ///   written
    /// - `Io(AlreadyExists)` if the vault directory exists
    pub fn create(
        name: &str,
        storage_path: impl AsRef<Path>,
        password: &str,
        derivator: KeyDerivator,
    ) -> Result<Self> {
        check_component("Vault name", name)?;
        derivator.params().validate()?;
        let storage_path = storage_path.as_ref().to_path_buf();

        let mut key_manager = KeyManager::generate(derivator);
        key_manager.wrap(password)?;

        let vault_id = VaultId::generate();
        let configuration = VaultConfiguration::new(vault_id.clone(), &key_manager)?;
        let mac_key = key_manager
            .mac_key()
            .ok_or_else(|| Error::Internal("Fresh key manager without MAC key".to_string()))?;
        let token = configuration.sign(mac_key)?;

        fs::create_dir_all(&storage_path)?;
        let vault_dir = storage_path.join(name);
        fs::create_dir(&vault_dir)?;

        let initialized = fs::create_dir(vault_dir.join(DATA_DIRNAME))
            .map_err(Error::from)
            .and_then(|()| write_token(&token_path(&vault_dir, &vault_id), &token));
        if let Err(e) = initialized {
            let _ = fs::remove_dir_all(&vault_dir);
            return Err(e);
        }

        key_manager.discard_keys();
        info!(vault_id = %vault_id, name = %name, "Vault created");

        Ok(Self {
            name: name.to_string(),
            data_dir: vault_dir.join(DATA_DIRNAME),
            vault_dir,
            storage_path,
            configuration,
            key_manager,
            session: None,
        })
    }

    /// Load an existing vault from its token. The vault starts locked.
    ///
    /// The KDF parameters stored in the token override those of `derivator`;
    /// its password policy is kept for later password changes.
    ///
    /// # Errors
    /// - `Io` if the token cannot be read
    /// - `InvalidConfiguration` if the token does not decode, belongs to
    ///   another vault, or holds unusable key material
    pub fn import(
        vault_id: &VaultId,
        name: &str,
        storage_path: impl AsRef<Path>,
        derivator: KeyDerivator,
    ) -> Result<Self> {
        check_component("Vault name", name)?;
        let storage_path = storage_path.as_ref().to_path_buf();
        let vault_dir = storage_path.join(name);

        let token = read_token(&token_path(&vault_dir, vault_id))?;
        let configuration = token.configuration().clone();
        if &configuration.vault_id != vault_id {
            return Err(Error::InvalidConfiguration(format!(
                "Token belongs to vault {}",
                configuration.vault_id
            )));
        }
        configuration
            .kdf_params
            .validate()
            .map_err(|e| Error::InvalidConfiguration(e.to_string()))?;

        let key_manager = KeyManager::from_wrapped(
            derivator.with_params(configuration.kdf_params),
            configuration.salt.clone(),
            configuration.wrapped_keys(),
        )
        .map_err(|e| Error::InvalidConfiguration(e.to_string()))?;

        debug!(vault_id = %vault_id, "Vault imported");
        Ok(Self {
            name: name.to_string(),
            data_dir: vault_dir.join(DATA_DIRNAME),
            vault_dir,
            storage_path,
            configuration,
            key_manager,
            session: None,
        })
    }

    /// Unlock with `password`; extracted plaintext goes to `destination`.
    ///
    /// The stored token is re-read and must still equal the imported
    /// configuration and carry a valid MAC.
    ///
    /// # Errors
    /// - `WrongPassword` if the keys do not unwrap
    /// - `InvalidConfiguration` if the token changed on disk or its MAC fails
    pub fn unlock(&mut self, password: &str, destination: impl AsRef<Path>) -> Result<()> {
        let mut candidate = self.key_manager.clone();
        candidate.unwrap(password)?;
        self.verify_stored_token(&candidate)?;

        let content_key = candidate
            .content_key()
            .cloned()
            .ok_or_else(|| Error::Internal("Unwrapped keys without content key".to_string()))?;
        let session = VaultSession::new(
            self.configuration.vault_id.clone(),
            content_key,
            destination.as_ref(),
        );

        info!(vault_id = %self.id(), session = %session.handle(), "Vault unlocked");
        self.key_manager = candidate;
        self.session = Some(session);
        Ok(())
    }

    /// Drop all plaintext keys. Idempotent.
    pub fn lock(&mut self) {
        self.key_manager.discard_keys();
        if let Some(session) = self.session.take() {
            info!(vault_id = %self.id(), session = %session.handle(), "Vault locked");
        }
    }

    /// Re-wrap the keys under `new_password`.
    ///
    /// Content and MAC keys are unchanged, so no item is re-encrypted. Works
    /// whether or not the vault is unlocked, and leaves the lock state as it
    /// was.
    ///
    /// # Errors
    /// - `WrongPassword` if `old_password` does not unwrap the keys
    /// - `InvalidConfiguration` if the stored token no longer verifies
    /// - `InvalidPassword` if `new_password` violates the policy
    ///
    /// The token on disk is untouched on any error.
    pub fn change_password(&mut self, old_password: &str, new_password: &str) -> Result<()> {
        let mut candidate = self.key_manager.clone();
        candidate.unwrap(old_password)?;
        self.verify_stored_token(&candidate)?;

        let wrapped = candidate.wrap(new_password)?;
        let configuration = self.configuration.rewrapped(&wrapped);
        let mac_key = candidate
            .mac_key()
            .ok_or_else(|| Error::Internal("Unwrapped keys without MAC key".to_string()))?;
        let token = configuration.sign(mac_key)?;
        write_token(&self.token_path(), &token)?;

        if self.session.is_none() {
            candidate.discard_keys();
        }
        self.configuration = configuration;
        self.key_manager = candidate;
        info!(vault_id = %self.id(), "Vault password changed");
        Ok(())
    }

    fn verify_stored_token(&self, keys: &KeyManager) -> Result<()> {
        let stored = read_token(&self.token_path())?;
        if stored.configuration() != &self.configuration {
            warn!(vault_id = %self.id(), "Stored configuration differs from the imported one");
            return Err(Error::InvalidConfiguration(
                "Stored configuration has changed".to_string(),
            ));
        }
        let mac_key = keys
            .mac_key()
            .ok_or_else(|| Error::Internal("Keys are not unwrapped".to_string()))?;
        stored.verify(mac_key)
    }

    fn operations(&self) -> Result<VaultOperations<'_>> {
        let session = self.session.as_ref().ok_or(Error::VaultLocked)?;
        Ok(VaultOperations::new(session, &self.data_dir))
    }

    /// Encrypt a file into the vault, returning its encoded name.
    pub fn add_file(&self, source: impl AsRef<Path>) -> Result<String> {
        let item = self.operations()?.add_file(source.as_ref())?;
        Ok(item.enc_name().to_string())
    }

    /// Encrypt a directory tree into the vault, returning its encoded name.
    pub fn add_directory(&self, source: impl AsRef<Path>) -> Result<String> {
        let item = self.operations()?.add_directory(source.as_ref())?;
        Ok(item.enc_name().to_string())
    }

    /// Decrypt the item at `path` (e.g. `docs/a.txt`) into the destination.
    pub fn extract(&self, path: &str) -> Result<PathBuf> {
        self.operations()?.extract(&VaultPath::parse(path)?)
    }

    /// Extract the item at `path`, then delete it from the vault.
    pub fn remove(&self, path: &str) -> Result<PathBuf> {
        let path = VaultPath::parse(path)?;
        if path.is_root() {
            return Err(Error::IllegalArgument(
                "Use clear to remove every item".to_string(),
            ));
        }
        self.operations()?.remove(&path)
    }

    /// Extract and delete every item.
    pub fn clear(&self) -> Result<Vec<PathBuf>> {
        self.operations()?.clear()
    }

    /// All decoded items, sorted by path.
    pub fn list(&self) -> Result<Vec<TreeEntry>> {
        Ok(self.operations()?.list()?.into_entries())
    }

    /// Destroy the vault: every item and the token, without decrypting.
    ///
    /// The vault is locked afterwards and cannot be used again.
    pub fn delete(&mut self) -> Result<()> {
        if self.session.is_none() {
            return Err(Error::VaultLocked);
        }

        if self.data_dir.is_dir() {
            for item in root_items(&self.data_dir)? {
                delete_subtree(item)?;
            }
            // Stray non-item entries (dotfiles, temp files) go with the data directory.
            fs::remove_dir_all(&self.data_dir)?;
        }
        fs::remove_file(self.token_path())?;
        if let Err(e) = fs::remove_dir(&self.vault_dir) {
            debug!(error = %e, "Vault directory kept");
        }

        info!(vault_id = %self.id(), "Vault deleted");
        self.lock();
        Ok(())
    }

    pub fn id(&self) -> &VaultId {
        &self.configuration.vault_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    pub fn configuration(&self) -> &VaultConfiguration {
        &self.configuration
    }

    /// `<storage>/<name>`.
    pub fn vault_dir(&self) -> &Path {
        &self.vault_dir
    }

    /// `<storage>/<name>/d`.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn token_path(&self) -> PathBuf {
        token_path(&self.vault_dir, self.id())
    }

    pub fn state(&self) -> LockState {
        if self.session.is_some() {
            LockState::Unlocked
        } else {
            LockState::Locked
        }
    }

    pub fn is_locked(&self) -> bool {
        self.state() == LockState::Locked
    }

    /// Where extracted plaintext goes, while unlocked.
    pub fn destination(&self) -> Option<&Path> {
        self.session.as_ref().map(VaultSession::destination)
    }
}
