//! Strongbox CLI - Command line interface for vault operations.
//!
//! This tool provides a command-line interface for creating, managing,
//! and operating on encrypted vaults.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use zeroize::Zeroizing;

use strongbox_common::{VaultId, VaultPath};
use strongbox_crypto::{FileBlocklist, KdfParams, KeyDerivator, PasswordPolicy};
use strongbox_vault::{Vault, VaultManager};

#[derive(Parser)]
#[command(name = "strongbox")]
#[command(about = "Strongbox - Encrypted file vault")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Newline-separated list of passwords to refuse.
    #[arg(long, global = true)]
    weak_list: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Where a vault lives.
#[derive(Args)]
struct VaultLocation {
    /// Directory holding the vault.
    #[arg(short, long)]
    storage: PathBuf,

    /// Vault name (its directory inside the storage path).
    #[arg(short, long)]
    name: String,

    /// Vault id; needed only if the vault directory holds several tokens.
    #[arg(long)]
    id: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new vault.
    Create {
        #[command(flatten)]
        vault: VaultLocation,

        /// PBKDF2 iteration count.
        #[arg(
            long,
            default_value_t = strongbox_crypto::kdf::DEFAULT_ITERATIONS,
            value_parser = clap::value_parser!(u32).range(i64::from(strongbox_crypto::kdf::MIN_ITERATIONS)..)
        )]
        iterations: u32,
    },

    /// Encrypt files or directories into the vault.
    Add {
        #[command(flatten)]
        vault: VaultLocation,

        /// Files or directories to add.
        #[arg(required = true)]
        sources: Vec<PathBuf>,
    },

    /// Decrypt an item, keeping it in the vault.
    Extract {
        #[command(flatten)]
        vault: VaultLocation,

        /// Path in the vault, e.g. `docs/report.pdf`.
        path: String,

        /// Directory to write the plaintext into.
        #[arg(short, long, default_value = ".")]
        dest: PathBuf,
    },

    /// Decrypt an item, then delete it from the vault.
    Remove {
        #[command(flatten)]
        vault: VaultLocation,

        /// Path in the vault.
        path: String,

        /// Directory to write the plaintext into.
        #[arg(short, long, default_value = ".")]
        dest: PathBuf,
    },

    /// Decrypt and delete every item.
    Clear {
        #[command(flatten)]
        vault: VaultLocation,

        /// Directory to write the plaintext into.
        #[arg(short, long, default_value = ".")]
        dest: PathBuf,
    },

    /// List vault contents.
    List {
        #[command(flatten)]
        vault: VaultLocation,

        /// Directory within vault (default: root).
        #[arg(short, long, default_value = "/")]
        dir: String,
    },

    /// Show vault information.
    Info {
        #[command(flatten)]
        vault: VaultLocation,
    },

    /// Change vault password.
    ChangePassword {
        #[command(flatten)]
        vault: VaultLocation,
    },

    /// Destroy the vault and everything in it without decrypting.
    Delete {
        #[command(flatten)]
        vault: VaultLocation,

        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let policy = load_policy(cli.weak_list.as_deref())?;

    match cli.command {
        Commands::Create { vault, iterations } => cmd_create(&vault, iterations, policy),
        Commands::Add { vault, sources } => cmd_add(&vault, &sources, policy),
        Commands::Extract { vault, path, dest } => cmd_extract(&vault, &path, &dest, policy),
        Commands::Remove { vault, path, dest } => cmd_remove(&vault, &path, &dest, policy),
        Commands::Clear { vault, dest } => cmd_clear(&vault, &dest, policy),
        Commands::List { vault, dir } => cmd_list(&vault, &dir, policy),
        Commands::Info { vault } => cmd_info(&vault, policy),
        Commands::ChangePassword { vault } => cmd_change_password(&vault, policy),
        Commands::Delete { vault, yes } => cmd_delete(&vault, yes, policy),
    }
}

fn load_policy(weak_list: Option<&Path>) -> Result<PasswordPolicy> {
    let policy = PasswordPolicy::new();
    let Some(path) = weak_list else {
        return Ok(policy);
    };
    let list = FileBlocklist::load(path)
        .with_context(|| format!("Failed to load weak password list {}", path.display()))?;
    info!(entries = list.len(), "Loaded weak password list");
    Ok(policy.with_weak_list(Arc::new(list)))
}

/// Prompt for password securely.
fn prompt_password(prompt: &str) -> Result<Zeroizing<String>> {
    let password = rpassword::prompt_password(prompt).context("Failed to read password")?;
    Ok(Zeroizing::new(password))
}

/// Prompt twice for a new password.
fn prompt_new_password(prompt: &str) -> Result<Zeroizing<String>> {
    let password = prompt_password(prompt)?;
    let confirm = prompt_password("Confirm password: ")?;
    if *password != *confirm {
        anyhow::bail!("Passwords do not match");
    }
    Ok(password)
}

/// Resolve the vault id, from `--id` or the single token on disk.
fn resolve_id(location: &VaultLocation) -> Result<VaultId> {
    if let Some(id) = &location.id {
        return VaultId::new(id.as_str()).context("Invalid vault id");
    }
    let mut ids = VaultManager::discover(&location.storage, &location.name)
        .with_context(|| format!("Failed to read vault {}", location.name))?;
    match ids.len() {
        0 => anyhow::bail!("No vault found in {}", location.storage.join(&location.name).display()),
        1 => Ok(ids.remove(0)),
        _ => anyhow::bail!("Several vaults found; pick one with --id"),
    }
}

fn import_vault(location: &VaultLocation, policy: PasswordPolicy) -> Result<Vault> {
    let id = resolve_id(location)?;
    let derivator = KeyDerivator::new(KdfParams::default(), policy);
    Vault::import(&id, &location.name, &location.storage, derivator)
        .context("Failed to import vault")
}

fn unlock_vault(location: &VaultLocation, dest: &Path, policy: PasswordPolicy) -> Result<Vault> {
    let mut vault = import_vault(location, policy)?;
    let password = prompt_password("Enter password: ")?;
    vault
        .unlock(&password, dest)
        .context("Failed to unlock vault")?;
    Ok(vault)
}

/// Create a new vault.
fn cmd_create(location: &VaultLocation, iterations: u32, policy: PasswordPolicy) -> Result<()> {
    info!("Creating new vault: {}", location.name);

    let password = prompt_new_password("Enter password: ")?;
    let derivator = KeyDerivator::new(KdfParams::with_iterations(iterations), policy);
    let vault = Vault::create(&location.name, &location.storage, &password, derivator)
        .context("Failed to create vault")?;

    println!("Vault created successfully!");
    println!("  ID: {}", vault.id());
    println!("  Location: {}", vault.vault_dir().display());

    Ok(())
}

/// Add files and directories to the vault.
fn cmd_add(location: &VaultLocation, sources: &[PathBuf], policy: PasswordPolicy) -> Result<()> {
    let mut vault = unlock_vault(location, Path::new("."), policy)?;

    for source in sources {
        info!("Adding {}", source.display());
        let result = if source.is_dir() {
            vault.add_directory(source)
        } else {
            vault.add_file(source)
        };
        result.with_context(|| format!("Failed to add {}", source.display()))?;
        println!("Added: {}", source.display());
    }

    vault.lock();
    Ok(())
}

/// Extract an item from the vault.
fn cmd_extract(location: &VaultLocation, path: &str, dest: &Path, policy: PasswordPolicy) -> Result<()> {
    info!("Extracting {} to {}", path, dest.display());
    let mut vault = unlock_vault(location, dest, policy)?;

    let written = vault
        .extract(path)
        .with_context(|| format!("Failed to extract {}", path))?;
    println!("Extracted: {}", written.display());

    vault.lock();
    Ok(())
}

/// Extract then delete an item.
fn cmd_remove(location: &VaultLocation, path: &str, dest: &Path, policy: PasswordPolicy) -> Result<()> {
    info!("Removing: {}", path);
    let mut vault = unlock_vault(location, dest, policy)?;

    let written = vault
        .remove(path)
        .with_context(|| format!("Failed to remove {}", path))?;
    println!("Removed: {} (extracted to {})", path, written.display());

    vault.lock();
    Ok(())
}

/// Extract then delete every item.
fn cmd_clear(location: &VaultLocation, dest: &Path, policy: PasswordPolicy) -> Result<()> {
    let mut vault = unlock_vault(location, dest, policy)?;

    let written = vault.clear().context("Failed to clear vault")?;
    for path in &written {
        println!("Extracted: {}", path.display());
    }
    println!("Vault cleared ({} items).", written.len());

    vault.lock();
    Ok(())
}

/// List directory contents.
fn cmd_list(location: &VaultLocation, dir: &str, policy: PasswordPolicy) -> Result<()> {
    let dir = VaultPath::parse(dir).context("Invalid directory path")?;
    let mut vault = unlock_vault(location, Path::new("."), policy)?;

    let entries = vault.list().context("Failed to list vault")?;
    vault.lock();

    let depth = dir.components().len();
    let shown: Vec<_> = entries
        .iter()
        .filter(|e| e.path.starts_with(&dir) && e.path != dir)
        .collect();

    if shown.is_empty() {
        println!("Directory is empty.");
        return Ok(());
    }

    println!("Contents of {}:", dir);
    for entry in shown {
        let indent = "  ".repeat(entry.path.components().len() - depth);
        let name = entry.path.name().unwrap_or_default();
        if entry.is_directory() {
            println!("{}[DIR]  {}/", indent, name);
        } else {
            let size = entry.size.map(|s| format!("{} bytes", s)).unwrap_or_default();
            println!("{}[FILE] {} ({})", indent, name, size);
        }
    }

    Ok(())
}

/// Show vault information. Needs no password.
fn cmd_info(location: &VaultLocation, policy: PasswordPolicy) -> Result<()> {
    let vault = import_vault(location, policy)?;
    let config = vault.configuration();

    println!("Vault Information:");
    println!("  ID: {}", config.vault_id);
    println!("  Name: {}", vault.name());
    println!("  Location: {}", vault.vault_dir().display());
    println!("  Version: {}.{}", config.version.major, config.version.minor);
    println!("  Created: {}", config.created_at);
    println!("  KDF: PBKDF2-HMAC-SHA512, {} iterations", config.kdf_params.iterations);

    Ok(())
}

/// Change vault password.
fn cmd_change_password(location: &VaultLocation, policy: PasswordPolicy) -> Result<()> {
    info!("Changing vault password");
    let mut vault = import_vault(location, policy)?;

    let old_password = prompt_password("Enter current password: ")?;
    let new_password = prompt_new_password("Enter new password: ")?;

    vault
        .change_password(&old_password, &new_password)
        .context("Failed to change password")?;

    println!("Password changed successfully!");
    Ok(())
}

/// Delete the vault.
fn cmd_delete(location: &VaultLocation, yes: bool, policy: PasswordPolicy) -> Result<()> {
    if !yes {
        anyhow::bail!("Deleting destroys every item without decrypting; pass --yes to confirm");
    }
    let mut vault = unlock_vault(location, Path::new("."), policy)?;

    vault.delete().context("Failed to delete vault")?;
    println!("Vault deleted: {}", location.name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_add_with_global_flags() {
        let cli = Cli::try_parse_from([
            "strongbox", "add", "-s", "/tmp/store", "-n", "main", "a.txt", "photos", "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Add { vault, sources } => {
                assert_eq!(vault.name, "main");
                assert_eq!(sources, vec![PathBuf::from("a.txt"), PathBuf::from("photos")]);
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn test_create_default_iterations() {
        let cli = Cli::try_parse_from(["strongbox", "create", "-s", "/tmp", "-n", "main"]).unwrap();
        match cli.command {
            Commands::Create { iterations, .. } => assert_eq!(iterations, 210_000),
            _ => panic!("expected create"),
        }
    }

    #[test]
    fn test_create_rejects_iterations_below_floor() {
        let low = (strongbox_crypto::kdf::MIN_ITERATIONS - 1).to_string();
        let result = Cli::try_parse_from([
            "strongbox", "create", "-s", "/tmp", "-n", "main", "--iterations", &low,
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_policy_with_weak_list() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("weak.txt");
        std::fs::write(&path, "Password12345!\n").unwrap();

        let policy = load_policy(Some(&path)).unwrap();
        assert!(policy.validate("Password12345!").is_err());
        assert!(policy.validate("Unl1kely-Phrase!").is_ok());
    }

    #[test]
    fn test_resolve_id_single_token() {
        let temp = tempfile::TempDir::new().unwrap();
        let derivator = KeyDerivator::new(KdfParams::with_iterations(1_000), PasswordPolicy::new());
        let vault = Vault::create("main", temp.path(), "SecretP@ssword1234", derivator).unwrap();

        let location = VaultLocation {
            storage: temp.path().to_path_buf(),
            name: "main".to_string(),
            id: None,
        };
        assert_eq!(&resolve_id(&location).unwrap(), vault.id());
    }
}
