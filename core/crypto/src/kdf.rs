//! Key derivation using PBKDF2-HMAC-SHA512.
//!
//! The derived 512-bit master key is never stored; it is recomputed on every
//! wrap and unwrap and split into two key-encryption keys.

use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha512;

use crate::keys::{MasterKey, Salt, MASTER_KEY_LENGTH};
use crate::password::PasswordPolicy;
use strongbox_common::{Error, Result};

/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 210_000;

/// Lowest iteration count accepted for derivation, creation or import.
#[cfg(not(any(test, feature = "fast-kdf")))]
pub const MIN_ITERATIONS: u32 = DEFAULT_ITERATIONS;

/// Lowest iteration count accepted for derivation, creation or import.
#[cfg(any(test, feature = "fast-kdf"))]
pub const MIN_ITERATIONS: u32 = 1_000;

/// Parameters for PBKDF2 key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Number of PBKDF2 iterations.
    pub iterations: u32,
}

impl KdfParams {
    /// Standard parameters (210 000 iterations).
    pub fn standard() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }

    /// Parameters with a custom iteration count.
    pub fn with_iterations(iterations: u32) -> Self {
        Self { iterations }
    }

    /// Check the parameters are usable.
    ///
    /// # Errors
    /// - `IllegalArgument` if the iteration count is below `MIN_ITERATIONS`
    pub fn validate(&self) -> Result<()> {
        if self.iterations < MIN_ITERATIONS {
            return Err(Error::IllegalArgument(format!(
                "KDF iteration count {} is below the minimum of {}",
                self.iterations, MIN_ITERATIONS
            )));
        }
        Ok(())
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::standard()
    }
}

/// Derive a master key from a password and salt.
///
/// # Postconditions
/// - The derived key is deterministic given the same inputs
///
/// # Errors
/// - Returns error if password is empty
/// - Returns error if the iteration count is below `MIN_ITERATIONS`
pub fn derive_key(password: &[u8], salt: &Salt, params: &KdfParams) -> Result<MasterKey> {
    if password.is_empty() {
        return Err(Error::IllegalArgument("Password cannot be empty".to_string()));
    }
    params.validate()?;

    let mut key_bytes = [0u8; MASTER_KEY_LENGTH];
    pbkdf2_hmac::<Sha512>(password, salt.as_bytes(), params.iterations, &mut key_bytes);

    Ok(MasterKey::from_bytes(key_bytes))
}

/// Password policy plus derivation parameters.
#[derive(Debug, Clone, Default)]
pub struct KeyDerivator {
    params: KdfParams,
    policy: PasswordPolicy,
}

impl KeyDerivator {
    /// Create a derivator.
    pub fn new(params: KdfParams, policy: PasswordPolicy) -> Self {
        Self { params, policy }
    }

    /// Same policy, different derivation parameters.
    pub fn with_params(&self, params: KdfParams) -> Self {
        Self {
            params,
            policy: self.policy.clone(),
        }
    }

    /// Derivation parameters.
    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    /// Password policy.
    pub fn policy(&self) -> &PasswordPolicy {
        &self.policy
    }

    /// Validate a password against the policy.
    pub fn validate_password(&self, password: &str) -> Result<()> {
        self.policy.validate(password)
    }

    /// Derive the master key for `password` under `salt`.
    pub fn derive_master_key(&self, password: &str, salt: &Salt) -> Result<MasterKey> {
        derive_key(password.as_bytes(), salt, &self.params)
    }

    /// Generate a fresh salt. Called once per vault, at creation.
    pub fn next_salt(&self) -> Salt {
        Salt::generate()
    }
}
