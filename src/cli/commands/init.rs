//! `shellvault init`: create a new vault.

use chrono::Utc;

use crate::cli::output;
use crate::cli::{prompt_new_password, Cli, Context};
use crate::errors::{Result, ShellVaultError};
use crate::vault::store::KEYS_FILE;
use crate::vault::VaultStore;

/// Execute the `init` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let ctx = Context::load(cli)?;

    // 1. Refuse to overwrite an existing vault.
    if ctx.vault_dir.join(KEYS_FILE).exists() {
        output::tip("Use `shellvault put` to add secrets to the existing vault.");
        return Err(ShellVaultError::VaultAlreadyExists(ctx.vault_dir));
    }

    // 2. Prompt for a new password (with confirmation).
    let password = prompt_new_password()?;

    // 3. Derive keys and write the key store.
    output::info("Deriving keys and generating the RSA keypair...");
    let vault = VaultStore::init(&ctx.vault_dir, &password, &ctx.settings, Utc::now())?;

    output::success(&format!(
        "Vault created at {} ({} suite)",
        vault.path().display(),
        vault.suite()
    ));
    output::tip("Start a session: eval \"$(shellvault login)\"");

    Ok(())
}
