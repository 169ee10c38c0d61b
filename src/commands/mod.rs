//! Subcommand handlers.
//!
//! Each file in this module corresponds to one user-facing command:
//!
//! | File          | Invocation            | Description                        |
//! |---------------|-----------------------|------------------------------------|
//! | `init.rs`     | `pg-backup init`      | Scaffold a `pg-backup.toml`        |
//! | `run.rs`      | `pg-backup` (default) | Full backup pipeline               |

pub mod init;
pub mod run;
