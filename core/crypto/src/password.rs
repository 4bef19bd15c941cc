//! Password policy.
//!
//! Every rule is checked independently so that a rejected password reports all
//! of its violations at once. The weak-password list and the breach check are
//! external collaborators injected into the policy; a breach lookup that cannot
//! run is skipped.

use std::collections::HashSet;
use std::fmt;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use strongbox_common::{Error, PasswordRule, Result};

/// Minimum password length in characters.
pub const MIN_PASSWORD_LENGTH: usize = 12;

/// Maximum password length in characters.
pub const MAX_PASSWORD_LENGTH: usize = 64;

/// Characters accepted for the special-character rule.
pub const SPECIAL_CHARACTERS: &str = "!@#$%^&*()-_=+[]{};:'\",.<>/?\\|`~";

/// Set-membership predicate over known weak passwords.
pub trait WeakPasswordList: Send + Sync {
    /// Whether `password` is on the list.
    fn is_weak(&self, password: &str) -> bool;
}

/// Lookup of a password in a breach corpus, usually over the network.
pub trait BreachCheck: Send + Sync {
    /// Whether `password` appears in a known breach.
    ///
    /// # Errors
    /// - Any lookup failure; the policy treats it as "not breached"
    fn is_breached(&self, password: &str) -> Result<bool>;
}

/// Weak-password list loaded from a newline-separated text resource.
///
/// Matching is case-insensitive; blank lines and lines starting with `#` are
/// ignored.
#[derive(Debug, Clone, Default)]
pub struct FileBlocklist {
    entries: HashSet<String>,
}

impl FileBlocklist {
    /// Build a list from any buffered reader.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut entries = HashSet::new();
        for line in reader.lines() {
            let line = line?;
            let entry = line.trim();
            if entry.is_empty() || entry.starts_with('#') {
                continue;
            }
            entries.insert(entry.to_lowercase());
        }
        Ok(Self { entries })
    }

    /// Load a list from a file on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let list = Self::from_reader(std::io::BufReader::new(file))?;
        debug!(path = %path.as_ref().display(), entries = list.len(), "Loaded weak-password list");
        Ok(list)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl WeakPasswordList for FileBlocklist {
    fn is_weak(&self, password: &str) -> bool {
        self.entries.contains(&password.to_lowercase())
    }
}

/// Rules a vault password must satisfy.
#[derive(Clone)]
pub struct PasswordPolicy {
    min_length: usize,
    max_length: usize,
    special_characters: String,
    weak_list: Option<Arc<dyn WeakPasswordList>>,
    breach_check: Option<Arc<dyn BreachCheck>>,
}

impl PasswordPolicy {
    /// Policy with the standard length bounds and special set, and no collaborators.
    pub fn new() -> Self {
        Self {
            min_length: MIN_PASSWORD_LENGTH,
            max_length: MAX_PASSWORD_LENGTH,
            special_characters: SPECIAL_CHARACTERS.to_string(),
            weak_list: None,
            breach_check: None,
        }
    }

    /// Attach a weak-password list.
    pub fn with_weak_list(mut self, list: Arc<dyn WeakPasswordList>) -> Self {
        self.weak_list = Some(list);
        self
    }

    /// Attach a breach-check lookup.
    pub fn with_breach_check(mut self, check: Arc<dyn BreachCheck>) -> Self {
        self.breach_check = Some(check);
        self
    }

    /// Collect every rule `password` violates.
    pub fn violations(&self, password: &str) -> Vec<PasswordRule> {
        let mut violations = Vec::new();
        let length = password.chars().count();

        if length < self.min_length {
            violations.push(PasswordRule::TooShort {
                min: self.min_length,
            });
        }
        if length > self.max_length {
            violations.push(PasswordRule::TooLong {
                max: self.max_length,
            });
        }
        if !password.chars().any(|c| c.is_lowercase()) {
            violations.push(PasswordRule::MissingLowercase);
        }
        if !password.chars().any(|c| c.is_uppercase()) {
            violations.push(PasswordRule::MissingUppercase);
        }
        if !password.chars().any(|c| c.is_ascii_digit()) {
            violations.push(PasswordRule::MissingDigit);
        }
        if !password
            .chars()
            .any(|c| self.special_characters.contains(c))
        {
            violations.push(PasswordRule::MissingSpecial);
        }
        if let Some(list) = &self.weak_list {
            if list.is_weak(password) {
                violations.push(PasswordRule::Weak);
            }
        }
        if let Some(check) = &self.breach_check {
            match check.is_breached(password) {
                Ok(true) => violations.push(PasswordRule::Breached),
                Ok(false) => {}
                Err(e) => warn!(error = %e, "Breach check unavailable, skipping"),
            }
        }

        violations
    }

    /// Validate `password` against the policy.
    ///
    /// # Errors
    /// - `InvalidPassword` listing every violated rule
    pub fn validate(&self, password: &str) -> Result<()> {
        let violations = self.violations(password);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidPassword(violations))
        }
    }
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PasswordPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordPolicy")
            .field("min_length", &self.min_length)
            .field("max_length", &self.max_length)
            .field("weak_list", &self.weak_list.is_some())
            .field("breach_check", &self.breach_check.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Breached;
    impl BreachCheck for Breached {
        fn is_breached(&self, _password: &str) -> Result<bool> {
            Ok(true)
        }
    }

    struct Offline;
    impl BreachCheck for Offline {
        fn is_breached(&self, _password: &str) -> Result<bool> {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "no network",
            )))
        }
    }

    #[test]
    fn test_valid_password() {
        let policy = PasswordPolicy::new();
        assert!(policy.validate("SecretP@ssword1234").is_ok());
    }

    #[test]
    fn test_all_violations_reported() {
        let policy = PasswordPolicy::new();
        match policy.validate("abc") {
            Err(Error::InvalidPassword(rules)) => {
                assert!(rules.contains(&PasswordRule::TooShort { min: 12 }));
                assert!(rules.contains(&PasswordRule::MissingUppercase));
                assert!(rules.contains(&PasswordRule::MissingDigit));
                assert!(rules.contains(&PasswordRule::MissingSpecial));
                assert!(!rules.contains(&PasswordRule::MissingLowercase));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_too_long() {
        let policy = PasswordPolicy::new();
        let password = format!("Aa1!{}", "x".repeat(61));
        assert_eq!(
            policy.violations(&password),
            vec![PasswordRule::TooLong { max: 64 }]
        );
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        let policy = PasswordPolicy::new();
        // 12 characters, more than 12 bytes.
        assert!(policy.validate("Ünïcödé@123").is_err());
        assert!(policy.validate("Ünïcödé@1234").is_ok());
    }

    #[test]
    fn test_weak_list_membership() {
        let list = FileBlocklist::from_reader("# comment\nSecretP@ssword1234\n\n".as_bytes()).unwrap();
        assert_eq!(list.len(), 1);

        let policy = PasswordPolicy::new().with_weak_list(Arc::new(list));
        assert_eq!(
            policy.violations("secretp@SSWORD1234"),
            vec![PasswordRule::Weak]
        );
    }

    #[test]
    fn test_breach_check_reported() {
        let policy = PasswordPolicy::new().with_breach_check(Arc::new(Breached));
        assert_eq!(
            policy.violations("SecretP@ssword1234"),
            vec![PasswordRule::Breached]
        );
    }

    #[test]
    fn test_breach_check_failure_is_skipped() {
        let policy = PasswordPolicy::new().with_breach_check(Arc::new(Offline));
        assert!(policy.validate("SecretP@ssword1234").is_ok());
    }
}
