//! One module per subcommand.

pub mod completions;
pub mod delete;
pub mod get;
pub mod id;
pub mod init;
pub mod list;
pub mod login;
pub mod logout;
pub mod put;
