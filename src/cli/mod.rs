//! CLI module: Clap argument parser, output helpers, and command implementations.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::Parser;

use zeroize::Zeroizing;

use crate::config::Settings;
use crate::crypto::session::{HostIdentity, SessionKeyBinder};
use crate::errors::{Result, ShellVaultError};
use crate::vault::{UnlockedVault, VaultStore};

/// Minimum password length to prevent trivially weak passwords.
const MIN_PASSWORD_LEN: usize = 8;

/// Environment variable holding the session token of the current shell.
pub const SESSION_ENV: &str = "SHELLVAULT_SESSION";

/// Environment variable holding the vault password (scripted use).
pub const PASSWORD_ENV: &str = "SHELLVAULT_PASSWORD";

/// ShellVault CLI: secrets vault with shell-bound sessions.
#[derive(Parser)]
#[command(
    name = "shellvault",
    about = "Command-line secrets vault with shell-bound sessions",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Vault directory (default: `vault_dir` from .shellvault.toml, else .shellvault)
    #[arg(long, global = true)]
    pub vault_dir: Option<String>,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Create a new vault
    Init,

    /// Unlock the vault and print a session export for this shell
    Login,

    /// Revoke the session in SHELLVAULT_SESSION
    Logout,

    /// Add or update a secret
    Put {
        /// Secret name (e.g. DATABASE_URL)
        name: String,
        /// Secret value (omit for interactive prompt or piped stdin)
        value: Option<String>,
    },

    /// Print a secret's value
    Get {
        /// Secret name
        name: String,
    },

    /// List all secrets
    List,

    /// Delete a secret
    Delete {
        /// Secret name
        name: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Print the ergonomic identifier of a string
    Id {
        /// Source string
        source: String,
        /// Identifier length (default: `identifier_length` from config)
        #[arg(short, long)]
        length: Option<usize>,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

// ---------------------------------------------------------------------------
// Shared helpers used by multiple commands
// ---------------------------------------------------------------------------

/// Settings and vault location resolved for one invocation.
pub struct Context {
    pub settings: Settings,
    pub vault_dir: PathBuf,
}

impl Context {
    /// Load `.shellvault.toml` from the working directory and apply CLI overrides.
    pub fn load(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let mut settings = Settings::load(&cwd)?;
        if let Some(dir) = &cli.vault_dir {
            settings.vault_dir = dir.clone();
        }
        let vault_dir = settings.vault_path(&cwd);
        Ok(Self {
            settings,
            vault_dir,
        })
    }

    /// Session binder for this host.
    pub fn binder(&self) -> Result<SessionKeyBinder<HostIdentity>> {
        SessionKeyBinder::new(
            self.settings.host_identity(),
            self.settings.session_bcrypt_cost,
        )
    }
}

/// Read a non-empty environment variable.
fn non_empty_env(name: &str) -> Option<Zeroizing<String>> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .map(Zeroizing::new)
}

/// The session token of the current shell, if any.
pub fn session_token() -> Option<Zeroizing<String>> {
    non_empty_env(SESSION_ENV)
}

/// Get the vault password, trying in order:
/// 1. `SHELLVAULT_PASSWORD` env var (CI/CD)
/// 2. Interactive prompt
///
/// Returns `Zeroizing<String>` so the password is wiped from memory on drop.
pub fn prompt_password() -> Result<Zeroizing<String>> {
    if let Some(pw) = non_empty_env(PASSWORD_ENV) {
        return Ok(pw);
    }

    let pw = dialoguer::Password::new()
        .with_prompt("Enter vault password")
        .interact()
        .map_err(|e| ShellVaultError::CommandFailed(format!("password prompt: {e}")))?;
    Ok(Zeroizing::new(pw))
}

/// Prompt for a new password with confirmation (used during `init`).
///
/// Also respects `SHELLVAULT_PASSWORD` for scripted/CI usage.
/// Enforces a minimum password length.
pub fn prompt_new_password() -> Result<Zeroizing<String>> {
    if let Some(pw) = non_empty_env(PASSWORD_ENV) {
        if pw.chars().count() < MIN_PASSWORD_LEN {
            return Err(ShellVaultError::CommandFailed(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        return Ok(pw);
    }

    loop {
        let password = dialoguer::Password::new()
            .with_prompt("Choose vault password")
            .with_confirmation(
                "Confirm vault password",
                "Passwords do not match, try again",
            )
            .interact()
            .map_err(|e| ShellVaultError::CommandFailed(format!("password prompt: {e}")))?;

        if password.chars().count() < MIN_PASSWORD_LEN {
            output::warning(&format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters. Try again."
            ));
            continue;
        }

        return Ok(Zeroizing::new(password));
    }
}

/// Open and unlock the vault.
///
/// Uses the shell's session token when `SHELLVAULT_SESSION` is set.  A token
/// that does not open is reported as-is rather than falling back to a
/// password prompt.
pub fn unlock_vault(ctx: &Context) -> Result<UnlockedVault> {
    let store = VaultStore::open(&ctx.vault_dir)?;

    match session_token() {
        Some(token) => store.unlock_with_token(&token, &ctx.binder()?),
        None => {
            let password = prompt_password()?;
            store.unlock(&password)
        }
    }
}
