//! Common error types for Strongbox.

use std::fmt;

use thiserror::Error;

/// A single password policy rule that a candidate password violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PasswordRule {
    /// Fewer characters than the policy minimum.
    TooShort { min: usize },
    /// More characters than the policy maximum.
    TooLong { max: usize },
    /// No lower-case letter.
    MissingLowercase,
    /// No upper-case letter.
    MissingUppercase,
    /// No decimal digit.
    MissingDigit,
    /// No character from the policy's special set.
    MissingSpecial,
    /// Listed in the weak-password list.
    Weak,
    /// Found in a breach corpus.
    Breached,
}

impl fmt::Display for PasswordRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PasswordRule::TooShort { min } => write!(f, "shorter than {} characters", min),
            PasswordRule::TooLong { max } => write!(f, "longer than {} characters", max),
            PasswordRule::MissingLowercase => write!(f, "no lower-case letter"),
            PasswordRule::MissingUppercase => write!(f, "no upper-case letter"),
            PasswordRule::MissingDigit => write!(f, "no digit"),
            PasswordRule::MissingSpecial => write!(f, "no special character"),
            PasswordRule::Weak => write!(f, "listed as a weak password"),
            PasswordRule::Breached => write!(f, "found in a breach corpus"),
        }
    }
}

fn join_rules(rules: &[PasswordRule]) -> String {
    rules
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Top-level error type for Strongbox operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Password violates one or more policy rules.
    #[error("Invalid password: {}", join_rules(.0))]
    InvalidPassword(Vec<PasswordRule>),

    /// Salt is missing or has the wrong width.
    #[error("Invalid salt: {0}")]
    InvalidSalt(String),

    /// Key material is missing or malformed.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Wrapped keys failed their integrity check under the derived KEKs.
    #[error("Wrong password")]
    WrongPassword,

    /// Persisted configuration token is malformed or failed its MAC check.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// AEAD tag mismatch while decrypting an item.
    #[error("Authentication failure: {0}")]
    AuthenticationFailure(String),

    /// Item header has the wrong size or an unusable layout.
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// Item name does not fit the fixed header name field.
    #[error("Name too long: {len} bytes (maximum {max})")]
    NameTooLong { len: usize, max: usize },

    /// Operation requires an unlocked vault.
    #[error("Vault is locked")]
    VaultLocked,

    /// Invalid argument supplied by the caller.
    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected failure inside a cryptographic provider.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
