//! `shellvault completions <shell>`: print a completion script to stdout.

use std::io::{self, Write};

use clap::CommandFactory;
use clap_complete::Shell;

use crate::cli::Cli;
use crate::errors::Result;

pub fn execute(shell: Shell) -> Result<()> {
    let script = render(shell);
    io::stdout().lock().write_all(&script)?;
    Ok(())
}

/// Completion script for `shell`, named after the binary clap knows.
fn render(shell: Shell) -> Vec<u8> {
    let mut cmd = Cli::command();
    let bin = cmd.get_name().to_string();
    let mut script = Vec::new();
    clap_complete::generate(shell, &mut cmd, bin, &mut script);
    script
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_cover_every_subcommand() {
        for shell in [Shell::Bash, Shell::Zsh, Shell::Fish] {
            let script = String::from_utf8(render(shell)).unwrap();
            for sub in ["init", "login", "logout", "put", "get", "list", "delete", "id"] {
                assert!(script.contains(sub), "{shell}: missing {sub}");
            }
        }
    }
}
