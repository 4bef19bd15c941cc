//! Key hierarchy: password → master key → two KEKs → content and MAC keys.
//!
//! The content key and MAC key are generated once per vault and never change.
//! Only their wrapping under the password-derived KEKs is replaced when the
//! password changes.

use tracing::debug;

use crate::kdf::KeyDerivator;
use crate::keys::{ContentKey, MacKey, Salt, WRAPPED_KEY_LENGTH};
use crate::keywrap::{unwrap_key, wrap_key};
use strongbox_common::{Error, Result};

/// Content and MAC keys in their at-rest, wrapped form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedKeys {
    /// Content key wrapped under the encryption KEK.
    pub content_key: Vec<u8>,
    /// MAC key wrapped under the authentication KEK.
    pub mac_key: Vec<u8>,
}

impl WrappedKeys {
    fn check(&self) -> Result<()> {
        for (kind, bytes) in [("content key", &self.content_key), ("MAC key", &self.mac_key)] {
            if bytes.len() != WRAPPED_KEY_LENGTH {
                return Err(Error::InvalidKey(format!(
                    "Wrapped {} must be {} bytes, got {}",
                    kind,
                    WRAPPED_KEY_LENGTH,
                    bytes.len()
                )));
            }
        }
        Ok(())
    }
}

/// Owner of a vault's key material.
///
/// A manager built for a new vault holds fresh plaintext keys and no wrapped
/// form until [`KeyManager::wrap`]. A manager built for an imported vault holds
/// only the wrapped form until [`KeyManager::unwrap`] succeeds.
#[derive(Debug, Clone)]
pub struct KeyManager {
    derivator: KeyDerivator,
    salt: Salt,
    content_key: Option<ContentKey>,
    mac_key: Option<MacKey>,
    wrapped: Option<WrappedKeys>,
}

impl KeyManager {
    /// Fresh key material for a new vault: new salt, random content and MAC keys.
    pub fn generate(derivator: KeyDerivator) -> Self {
        let salt = derivator.next_salt();
        Self {
            derivator,
            salt,
            content_key: Some(ContentKey::generate()),
            mac_key: Some(MacKey::generate()),
            wrapped: None,
        }
    }

    /// Key material of an existing vault, still wrapped.
    ///
    /// # Errors
    /// - `InvalidKey` if either wrapped key has the wrong length
    pub fn from_wrapped(derivator: KeyDerivator, salt: Salt, wrapped: WrappedKeys) -> Result<Self> {
        wrapped.check()?;
        Ok(Self {
            derivator,
            salt,
            content_key: None,
            mac_key: None,
            wrapped: Some(wrapped),
        })
    }

    /// Wrap the content and MAC keys under `password` and keep the result.
    ///
    /// # Errors
    /// - `InvalidKey` if the plaintext keys are not present
    /// - `InvalidPassword` if the password fails the policy
    pub fn wrap(&mut self, password: &str) -> Result<WrappedKeys> {
        let (content_key, mac_key) = match (&self.content_key, &self.mac_key) {
            (Some(c), Some(m)) => (c, m),
            _ => {
                return Err(Error::InvalidKey(
                    "Content and MAC keys must be unwrapped before wrapping".to_string(),
                ))
            }
        };
        self.derivator.validate_password(password)?;

        let master = self.derivator.derive_master_key(password, &self.salt)?;
        let wrapped = WrappedKeys {
            content_key: wrap_key(&master.enc_kek(), content_key.as_bytes())?.to_vec(),
            mac_key: wrap_key(&master.auth_kek(), mac_key.as_bytes())?.to_vec(),
        };

        debug!("Wrapped vault keys");
        self.wrapped = Some(wrapped.clone());
        Ok(wrapped)
    }

    /// Unwrap the content and MAC keys with `password`.
    ///
    /// # Errors
    /// - `InvalidKey` if there is nothing to unwrap
    /// - `WrongPassword` if the password is empty or either key fails its
    ///   wrap integrity check
    pub fn unwrap(&mut self, password: &str) -> Result<()> {
        let wrapped = self
            .wrapped
            .as_ref()
            .ok_or_else(|| Error::InvalidKey("No wrapped keys to unwrap".to_string()))?;
        if password.is_empty() {
            return Err(Error::WrongPassword);
        }

        let master = self.derivator.derive_master_key(password, &self.salt)?;
        let content_key = ContentKey::from_bytes(unwrap_key(&master.enc_kek(), &wrapped.content_key)?);
        let mac_key = MacKey::from_bytes(unwrap_key(&master.auth_kek(), &wrapped.mac_key)?);

        debug!("Unwrapped vault keys");
        self.content_key = Some(content_key);
        self.mac_key = Some(mac_key);
        Ok(())
    }

    /// Drop the plaintext keys, keeping only the wrapped form.
    pub fn discard_keys(&mut self) {
        self.content_key = None;
        self.mac_key = None;
    }

    /// Whether plaintext keys are held.
    pub fn is_unwrapped(&self) -> bool {
        self.content_key.is_some() && self.mac_key.is_some()
    }

    /// Content key, if unwrapped.
    pub fn content_key(&self) -> Option<&ContentKey> {
        self.content_key.as_ref()
    }

    /// MAC key, if unwrapped.
    pub fn mac_key(&self) -> Option<&MacKey> {
        self.mac_key.as_ref()
    }

    /// Wrapped keys, if any.
    pub fn wrapped(&self) -> Option<&WrappedKeys> {
        self.wrapped.as_ref()
    }

    /// The vault salt.
    pub fn salt(&self) -> &Salt {
        &self.salt
    }

    /// The derivator used for wrapping.
    pub fn derivator(&self) -> &KeyDerivator {
        &self.derivator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::KdfParams;
    use crate::password::PasswordPolicy;
    use proptest::prelude::*;

    const PASSWORD: &str = "SecretP@ssword1234";

    fn derivator() -> KeyDerivator {
        KeyDerivator::new(KdfParams::with_iterations(1_000), PasswordPolicy::new())
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let mut manager = KeyManager::generate(derivator());
        let content = *manager.content_key().unwrap().as_bytes();
        let mac = *manager.mac_key().unwrap().as_bytes();
        let wrapped = manager.wrap(PASSWORD).unwrap();

        let mut imported =
            KeyManager::from_wrapped(derivator(), manager.salt().clone(), wrapped).unwrap();
        assert!(!imported.is_unwrapped());
        imported.unwrap(PASSWORD).unwrap();

        assert_eq!(imported.content_key().unwrap().as_bytes(), &content);
        assert_eq!(imported.mac_key().unwrap().as_bytes(), &mac);
    }

    #[test]
    fn test_unwrap_wrong_password() {
        let mut manager = KeyManager::generate(derivator());
        let wrapped = manager.wrap(PASSWORD).unwrap();

        let mut imported =
            KeyManager::from_wrapped(derivator(), manager.salt().clone(), wrapped).unwrap();
        assert!(matches!(
            imported.unwrap("SecretP@ssword1234!"),
            Err(Error::WrongPassword)
        ));
        assert!(matches!(imported.unwrap(""), Err(Error::WrongPassword)));
        assert!(!imported.is_unwrapped());
    }

    #[test]
    fn test_wrap_without_keys_is_invalid_key() {
        let mut manager = KeyManager::generate(derivator());
        let wrapped = manager.wrap(PASSWORD).unwrap();
        manager.discard_keys();
        assert!(matches!(manager.wrap(PASSWORD), Err(Error::InvalidKey(_))));
        assert_eq!(manager.wrapped(), Some(&wrapped));
    }

    #[test]
    fn test_wrap_rejects_policy_violation() {
        let mut manager = KeyManager::generate(derivator());
        assert!(matches!(manager.wrap("weak"), Err(Error::InvalidPassword(_))));
        assert!(manager.wrapped().is_none());
    }

    #[test]
    fn test_rewrap_keeps_keys_stable() {
        let mut manager = KeyManager::generate(derivator());
        let content = *manager.content_key().unwrap().as_bytes();
        let first = manager.wrap(PASSWORD).unwrap();
        let second = manager.wrap("AnotherP@ssw0rd99").unwrap();
        assert_ne!(first, second);

        let mut imported =
            KeyManager::from_wrapped(derivator(), manager.salt().clone(), second).unwrap();
        imported.unwrap("AnotherP@ssw0rd99").unwrap();
        assert_eq!(imported.content_key().unwrap().as_bytes(), &content);
    }

    #[test]
    fn test_from_wrapped_checks_lengths() {
        let wrapped = WrappedKeys {
            content_key: vec![0u8; 32],
            mac_key: vec![0u8; WRAPPED_KEY_LENGTH],
        };
        assert!(matches!(
            KeyManager::from_wrapped(derivator(), Salt::generate(), wrapped),
            Err(Error::InvalidKey(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn prop_unwrap_recovers_any_keys(content in any::<[u8; 32]>(), mac in any::<[u8; 32]>()) {
            let mut manager = KeyManager {
                derivator: derivator(),
                salt: Salt::generate(),
                content_key: Some(ContentKey::from_bytes(content)),
                mac_key: Some(MacKey::from_bytes(mac)),
                wrapped: None,
            };
            manager.wrap(PASSWORD).unwrap();
            manager.discard_keys();
            manager.unwrap(PASSWORD).unwrap();
            prop_assert_eq!(manager.content_key().unwrap().as_bytes(), &content);
            prop_assert_eq!(manager.mac_key().unwrap().as_bytes(), &mac);
        }
    }
}
