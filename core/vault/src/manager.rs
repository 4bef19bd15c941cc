//! Registry of open vaults.
//!
//! Each vault sits behind its own mutex, so operations on one vault are
//! serialized while different vaults proceed independently.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::config::find_vault_ids;
use crate::vault::Vault;
use strongbox_common::{Error, Result, VaultId};
use strongbox_crypto::KeyDerivator;

/// A vault shared between callers.
pub type SharedVault = Arc<Mutex<Vault>>;

/// Vault manager for creating and opening vaults.
pub struct VaultManager {
    derivator: KeyDerivator,
    vaults: Mutex<HashMap<VaultId, SharedVault>>,
}

impl VaultManager {
    /// Create a manager whose vaults use `derivator` for new passwords.
    pub fn new(derivator: KeyDerivator) -> Self {
        Self {
            derivator,
            vaults: Mutex::new(HashMap::new()),
        }
    }

    pub fn derivator(&self) -> &KeyDerivator {
        &self.derivator
    }

    /// Create a new vault and register it.
    pub fn create(
        &self,
        name: &str,
        storage_path: impl AsRef<Path>,
        password: &str,
    ) -> Result<SharedVault> {
        let vault = Vault::create(name, storage_path, password, self.derivator.clone())?;
        self.register(vault)
    }

    /// Import an existing vault and register it.
    ///
    /// # Errors
    /// - `IllegalArgument` if the vault is already open in this manager
    pub fn import(
        &self,
        vault_id: &VaultId,
        name: &str,
        storage_path: impl AsRef<Path>,
    ) -> Result<SharedVault> {
        if self.vaults()?.contains_key(vault_id) {
            return Err(Error::IllegalArgument(format!(
                "Vault {} is already open",
                vault_id
            )));
        }
        let vault = Vault::import(vault_id, name, storage_path, self.derivator.clone())?;
        self.register(vault)
    }

    fn register(&self, vault: Vault) -> Result<SharedVault> {
        let id = vault.id().clone();
        let shared = Arc::new(Mutex::new(vault));
        let mut vaults = self.vaults()?;
        if vaults.contains_key(&id) {
            return Err(Error::IllegalArgument(format!("Vault {} is already open", id)));
        }
        vaults.insert(id.clone(), Arc::clone(&shared));
        debug!(vault_id = %id, "Vault registered");
        Ok(shared)
    }

    /// An open vault.
    pub fn get(&self, vault_id: &VaultId) -> Result<Option<SharedVault>> {
        Ok(self.vaults()?.get(vault_id).cloned())
    }

    /// Run `f` with exclusive access to an open vault.
    ///
    /// # Errors
    /// - `IllegalArgument` if the vault is not open
    pub fn with_vault<T>(
        &self,
        vault_id: &VaultId,
        f: impl FnOnce(&mut Vault) -> Result<T>,
    ) -> Result<T> {
        let shared = self
            .get(vault_id)?
            .ok_or_else(|| Error::IllegalArgument(format!("Vault {} is not open", vault_id)))?;
        let mut vault = shared
            .lock()
            .map_err(|_| Error::Internal("Vault mutex poisoned".to_string()))?;
        f(&mut *vault)
    }

    /// Lock a vault and drop it from the registry.
    pub fn close(&self, vault_id: &VaultId) -> Result<bool> {
        let Some(shared) = self.vaults()?.remove(vault_id) else {
            return Ok(false);
        };
        if let Ok(mut vault) = shared.lock() {
            vault.lock();
        }
        debug!(vault_id = %vault_id, "Vault closed");
        Ok(true)
    }

    /// Ids of the open vaults.
    pub fn open_ids(&self) -> Result<Vec<VaultId>> {
        let mut ids: Vec<VaultId> = self.vaults()?.keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ids)
    }

    /// Vault ids found on disk in `<storage_path>/<name>`.
    pub fn discover(storage_path: impl AsRef<Path>, name: &str) -> Result<Vec<VaultId>> {
        let vault_dir: PathBuf = storage_path.as_ref().join(name);
        find_vault_ids(&vault_dir)
    }

    fn vaults(&self) -> Result<MutexGuard<'_, HashMap<VaultId, SharedVault>>> {
        self.vaults
            .lock()
            .map_err(|_| Error::Internal("Vault registry mutex poisoned".to_string()))
    }
}

impl Default for VaultManager {
    fn default() -> Self {
        Self::new(KeyDerivator::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use strongbox_crypto::{KdfParams, PasswordPolicy};
    use tempfile::TempDir;

    const PASSWORD: &str = "SecretP@ssword1234";

    fn manager() -> VaultManager {
        VaultManager::new(KeyDerivator::new(
            KdfParams::with_iterations(1_000),
            PasswordPolicy::new(),
        ))
    }

    #[test]
    fn test_create_and_get() {
        let temp = TempDir::new().unwrap();
        let manager = manager();
        let shared = manager.create("main", temp.path(), PASSWORD).unwrap();
        let id = shared.lock().unwrap().id().clone();

        assert!(manager.get(&id).unwrap().is_some());
        assert_eq!(manager.open_ids().unwrap(), vec![id.clone()]);
        assert_eq!(VaultManager::discover(temp.path(), "main").unwrap(), vec![id]);
    }

    #[test]
    fn test_import_twice_rejected() {
        let temp = TempDir::new().unwrap();
        let manager = manager();
        let shared = manager.create("main", temp.path(), PASSWORD).unwrap();
        let id = shared.lock().unwrap().id().clone();

        assert!(matches!(
            manager.import(&id, "main", temp.path()),
            Err(Error::IllegalArgument(_))
        ));

        assert!(manager.close(&id).unwrap());
        assert!(!manager.close(&id).unwrap());
        manager.import(&id, "main", temp.path()).unwrap();
    }

    #[test]
    fn test_with_vault_serializes_access() {
        let temp = TempDir::new().unwrap();
        let manager = Arc::new(manager());
        let shared = manager.create("main", temp.path(), PASSWORD).unwrap();
        let id = shared.lock().unwrap().id().clone();
        let out = temp.path().join("out");
        manager
            .with_vault(&id, |v| v.unlock(PASSWORD, &out))
            .unwrap();

        let src = temp.path().join("src");
        std::fs::create_dir(&src).unwrap();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let manager = Arc::clone(&manager);
                let id = id.clone();
                let file = src.join(format!("file-{}", i));
                std::fs::write(&file, format!("content {}", i)).unwrap();
                thread::spawn(move || manager.with_vault(&id, |v| v.add_file(&file)))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let entries = manager.with_vault(&id, |v| v.list()).unwrap();
        assert_eq!(entries.len(), 4);
    }

    #[test]
    fn test_with_vault_unknown_id() {
        let manager = manager();
        let result = manager.with_vault(&VaultId::generate(), |v| v.list());
        assert!(matches!(result, Err(Error::IllegalArgument(_))));
    }
}
