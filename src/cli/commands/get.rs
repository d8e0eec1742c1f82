//! `shellvault get`: retrieve and print a single secret's value.

use crate::cli::{unlock_vault, Cli, Context};
use crate::errors::Result;

/// Execute the `get` command.
pub fn execute(cli: &Cli, name: &str) -> Result<()> {
    let ctx = Context::load(cli)?;
    let vault = unlock_vault(&ctx)?;

    // Decrypt and print the secret value to stdout.
    let record = vault.get(name)?;
    println!("{}", record.value);

    Ok(())
}
