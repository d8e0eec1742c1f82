//! `shellvault list`: display all secrets in a table.

use crate::cli::output;
use crate::cli::{unlock_vault, Cli, Context};
use crate::errors::Result;

/// Execute the `list` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let ctx = Context::load(cli)?;
    let vault = unlock_vault(&ctx)?;

    let secrets = vault.list()?;

    output::info(&format!(
        "{}: {} secret(s)",
        ctx.vault_dir.display(),
        secrets.len()
    ));

    output::print_secrets_table(&secrets);

    Ok(())
}
