//! Command-line interface definition.
//!
//! All argument parsing lives here so the rest of the codebase can stay
//! agnostic to `clap`.  The `Cli` struct is parsed once in `main` and then
//! passed (by reference) into the command handlers.
//!
//! Every pipeline flag is optional: a flag that is given overrides the value
//! from the settings file (see [`crate::config::Config::apply_cli`]).

use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;

/// Top-level CLI arguments, shared across every subcommand.
#[derive(Parser, Debug)]
#[command(
    name    = "pg-backup",
    about   = "Dump, encrypt and upload PostgreSQL databases to S3",
    version,
    // Show a compact two-column help layout.
    help_template = "\
{before-help}{name} {version}
{about}

{usage-heading} {usage}

{all-args}{after-help}"
)]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Path to the settings file.
    ///
    /// Defaults to `pg-backup.toml` in the current working directory.  Cron
    /// jobs usually want an absolute path here.
    #[arg(long, default_value = "pg-backup.toml")]
    pub config: PathBuf,

    /// Subcommand to run.  Omit to run the full backup pipeline.
    #[command(subcommand)]
    pub command: Option<Subcommand>,

    /// Print the resolved settings and exit without running anything.
    #[arg(long)]
    pub print_config: bool,

    /// Log level (`error`, `warn`, `info`, `debug`, `trace`).
    #[arg(long)]
    pub verbose: Option<LevelFilter>,

    /// Exit non-zero when any stage reported a failure.
    ///
    /// Without this flag a run that got past the lock always exits 0, and
    /// failures are only visible in the summary and the log.
    #[arg(long)]
    pub fail_on_error: bool,

    /// Skip the bucket listing after the uploads.
    #[arg(long)]
    pub no_list: bool,

    // ── general ──────────────────────────────────────────────────────────────
    /// Name of the machine, used to label log lines and the summary.
    #[arg(short = 'n', long)]
    pub hostname: Option<String>,

    /// File listing the databases to dump, one per line.
    #[arg(short = 'c', long = "config-file")]
    pub databases_file: Option<PathBuf>,

    /// File naming the cluster alias used for the globals dump.
    #[arg(long = "all-config-file")]
    pub globals_file: Option<PathBuf>,

    /// Lock file ensuring only one backup job runs at a time.
    #[arg(short = 'l', long)]
    pub lock_file: Option<PathBuf>,

    /// Directory receiving dumps, logs and encrypted artifacts.
    #[arg(short = 'd', long = "dump-file-path")]
    pub output_dir: Option<PathBuf>,

    // ── postgres ─────────────────────────────────────────────────────────────
    /// Path to the `pg_dump` binary.
    #[arg(long)]
    pub pg_dump_path: Option<PathBuf>,

    /// Path to the `pg_dumpall` binary.
    #[arg(long)]
    pub pg_dumpall_path: Option<PathBuf>,

    /// Port the PostgreSQL instance listens on.
    #[arg(short = 'p', long)]
    pub postgres_port: Option<u16>,

    /// Role used to connect to PostgreSQL.
    #[arg(short = 'U', long)]
    pub postgres_user: Option<String>,

    // ── gpg ──────────────────────────────────────────────────────────────────
    /// Path to the `gpg` binary.
    #[arg(long)]
    pub gpg_path: Option<PathBuf>,

    /// Key name or e-mail of the encryption recipient.
    #[arg(short = 'r', long)]
    pub recipient: Option<String>,

    /// Path to the gpg key store (`.gnupg` directory).
    #[arg(long)]
    pub gnupg_dir_path: Option<PathBuf>,

    // ── s3 ───────────────────────────────────────────────────────────────────
    /// Path to the `s3cmd` binary, or the directory containing it.
    #[arg(long)]
    pub s3_path: Option<PathBuf>,

    /// Comma separated list of databases to encrypt and upload.
    #[arg(long, value_delimiter = ',')]
    pub s3_upload_files: Option<Vec<String>>,

    /// Bucket URL, e.g. `s3://backups/postgres/`.
    #[arg(long)]
    pub s3_bucket_link: Option<String>,
}

/// Explicit subcommands.  Running `pg-backup` with no subcommand triggers the
/// default backup pipeline.
#[derive(clap::Subcommand, Debug, PartialEq)]
pub enum Subcommand {
    /// Scaffold a settings file at `--config`.
    ///
    /// The generated file is pre-populated with the defaults and placeholder
    /// values for the fields that have none.  Exits with an error if the file
    /// already exists to avoid accidental overwrites.
    Init,
}
