//! `shellvault login`: unlock with the password and start a shell session.
//!
//! Stdout carries only the `export` line, so the command can be wrapped
//! in `eval "$(shellvault login)"`.

use crate::cli::output;
use crate::cli::{prompt_password, Cli, Context, SESSION_ENV};
use crate::errors::Result;
use crate::vault::VaultStore;

/// Execute the `login` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let ctx = Context::load(cli)?;
    let binder = ctx.binder()?;

    let store = VaultStore::open(&ctx.vault_dir)?;
    let password = prompt_password()?;
    let mut vault = store.unlock(&password)?;

    let token = vault.login(&binder)?;
    println!("export {SESSION_ENV}={token}");

    output::notice("Session started for this shell.");
    output::hint("The token only opens on this machine until the next reboot.");

    Ok(())
}
