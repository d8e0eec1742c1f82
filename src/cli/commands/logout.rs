//! `shellvault logout`: revoke the current shell session.
//!
//! Prints `unset SHELLVAULT_SESSION` on stdout for use with `eval`.

use crate::cli::output;
use crate::cli::{session_token, Cli, Context, SESSION_ENV};
use crate::errors::{Result, ShellVaultError};
use crate::vault::VaultStore;

/// Execute the `logout` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let token = session_token().ok_or(ShellVaultError::NotLoggedIn)?;
    let ctx = Context::load(cli)?;

    let mut store = VaultStore::open(&ctx.vault_dir)?;
    let removed = store.logout(&token)?;
    println!("unset {SESSION_ENV}");

    if removed {
        output::notice("Session revoked.");
    } else {
        output::warning("No matching session was active.");
    }

    Ok(())
}
