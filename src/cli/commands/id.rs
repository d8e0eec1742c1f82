//! `shellvault id`: print the ergonomic identifier of a string.

use crate::cli::{Cli, Context};
use crate::crypto::identity::ergonomic_identifier;
use crate::errors::Result;

/// Execute the `id` command.
pub fn execute(cli: &Cli, source: &str, length: Option<usize>) -> Result<()> {
    let ctx = Context::load(cli)?;
    let length = length.unwrap_or(ctx.settings.identifier_length);

    println!("{}", ergonomic_identifier(source, length)?);

    Ok(())
}
