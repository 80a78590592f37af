//! Adapter around the external codex CLI.
//!
//! Locates the binary, drives its login flow, and enumerates/terminates its
//! processes. The CLI is only ever invoked as `codex login [--web]`; its
//! output is never parsed.

pub mod auth_file;
pub mod locate;
pub mod login;
pub mod process;

pub use auth_file::{extract_access_token, parse_auth_json};
pub use locate::{CliLocator, LocatedCli};
pub use login::run_login;
pub use process::{count_cli_processes, terminate_cli_processes};
