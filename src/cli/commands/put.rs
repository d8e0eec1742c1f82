//! `shellvault put`: add or update a secret in the vault.

use std::io::{self, IsTerminal, Read};

use chrono::Utc;
use zeroize::Zeroizing;

use crate::cli::output;
use crate::cli::{unlock_vault, Cli, Context};
use crate::errors::{Result, ShellVaultError};
use crate::vault::validate_secret_name;

/// Execute the `put` command.
pub fn execute(cli: &Cli, name: &str, value: Option<&str>) -> Result<()> {
    validate_secret_name(name)?;
    let ctx = Context::load(cli)?;

    // Determine the secret value from one of three sources.
    let secret_value = if let Some(v) = value {
        // Source 1: Inline value on the command line.
        output::warning("Value provided on command line; it may appear in shell history.");
        Zeroizing::new(v.to_string())
    } else if !io::stdin().is_terminal() {
        // Source 2: Piped input (stdin is not a terminal).
        let mut buf = Zeroizing::new(String::new());
        io::stdin().read_to_string(&mut buf)?;
        Zeroizing::new(buf.trim_end().to_string())
    } else {
        // Source 3: Interactive secure prompt (default).
        let v = dialoguer::Password::new()
            .with_prompt(format!("Enter value for {name}"))
            .interact()
            .map_err(|e| ShellVaultError::CommandFailed(format!("input prompt: {e}")))?;
        Zeroizing::new(v)
    };

    let mut vault = unlock_vault(&ctx)?;
    let existed = vault.contains(name)?;
    vault.put(name, &secret_value, Utc::now())?;

    if existed {
        output::success(&format!("Secret '{name}' updated"));
    } else {
        output::success(&format!("Secret '{name}' added"));
    }

    Ok(())
}
