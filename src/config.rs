//! Configuration types and loading logic.
//!
//! `Config` is a direct 1-to-1 mapping of `pg-backup.toml`.  Every field has a
//! default so the file is optional; the defaults mirror the classic layout of
//! a PostgreSQL host where the backup job runs as the `postgres` user.
//!
//! Settings are layered, later layers winning per field:
//!
//! 1. `~/.config/pg-backup/config.toml` (global defaults)
//! 2. the `--config` file (per-host settings)
//! 3. command-line flags ([`Config::apply_cli`])
//!
//! The merged `Config` is then checked and flattened into [`Settings`], which
//! is what the pipeline consumes.  Fields without a sensible default
//! (output directory, recipient, key store, bucket) are rejected there.
//!
//! # File format
//!
//! ```toml
//! [general]
//! hostname       = "db01"                              # defaults to the machine name
//! databases_file = "/home/postgres/etc/pg_dump.conf"
//! globals_file   = "/home/postgres/etc/pg_dumpall.conf"
//! lock_file      = "/var/tmp/postgres_dump.lock"
//! output_dir     = "/var/backups/postgres"
//!
//! [postgres]
//! pg_dump    = "pg_dump"
//! pg_dumpall = "pg_dumpall"
//! port       = 5432
//! user       = "postgres"
//!
//! [gpg]
//! binary       = "gpg"
//! homedir      = "/home/postgres/.gnupg"
//! recipient    = "backups@example.com"
//! always_trust = false
//!
//! [s3]
//! s3cmd             = "s3cmd"
//! bucket            = "s3://example-backups/postgres/"
//! upload            = ["app", "billing"]   # empty = every database in the list
//! list_after_upload = true
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use toml::{Table, Value};

use crate::{cli::Cli, process};

// ─── Top-level ────────────────────────────────────────────────────────────────

/// Root configuration object, deserialised from `pg-backup.toml`.
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct Config {
    /// Input files, lock and output locations.
    #[serde(default)]
    pub general: GeneralConfig,

    /// How to reach PostgreSQL and which dump tools to use.
    #[serde(default)]
    pub postgres: PostgresConfig,

    /// Encryption settings.
    #[serde(default)]
    pub gpg: GpgConfig,

    /// Object storage settings.
    #[serde(default)]
    pub s3: S3Config,
}

// ─── [general] ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Label for this machine.  Falls back to the system host name.
    pub hostname: Option<String>,

    /// One database per line; the last whitespace-separated token is the name.
    pub databases_file: PathBuf,

    /// First non-blank line is the alias tagging the globals dump.
    pub globals_file: PathBuf,

    /// Sentinel file serialising runs on this host.
    pub lock_file: PathBuf,

    /// Where dumps, logs and encrypted artifacts are written.
    pub output_dir: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            hostname: None,
            databases_file: PathBuf::from("/home/postgres/etc/pg_dump.conf"),
            globals_file: PathBuf::from("/home/postgres/etc/pg_dumpall.conf"),
            lock_file: PathBuf::from("/var/tmp/postgres_dump.lock"),
            output_dir: None,
        }
    }
}

// ─── [postgres] ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub pg_dump: PathBuf,
    pub pg_dumpall: PathBuf,
    pub port: u16,
    pub user: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            pg_dump: PathBuf::from("pg_dump"),
            pg_dumpall: PathBuf::from("pg_dumpall"),
            port: 5432,
            user: "postgres".into(),
        }
    }
}

// ─── [gpg] ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct GpgConfig {
    pub binary: PathBuf,

    /// The `.gnupg` directory holding the recipient's public key.
    pub homedir: Option<PathBuf>,

    /// Key name or e-mail every artifact is encrypted for.
    pub recipient: Option<String>,

    /// Pass `--trust-model always` so keys without an ownertrust still work.
    pub always_trust: bool,
}

impl Default for GpgConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("gpg"),
            homedir: None,
            recipient: None,
            always_trust: false,
        }
    }
}

// ─── [s3] ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct S3Config {
    /// `s3cmd` binary, or a directory containing one.
    pub s3cmd: PathBuf,

    pub bucket: Option<String>,

    /// Databases to encrypt and upload.  Empty means all of them.
    pub upload: Vec<String>,

    /// Run `s3cmd ls` on the bucket after uploading.
    pub list_after_upload: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            s3cmd: PathBuf::from("s3cmd"),
            bucket: None,
            upload: Vec::new(),
            list_after_upload: true,
        }
    }
}

// ─── Resolved settings ────────────────────────────────────────────────────────

/// A required setting is missing after all layers were merged.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no output directory configured (`general.output_dir` or --dump-file-path)")]
    MissingOutputDir,
    #[error("no encryption recipient configured (`gpg.recipient` or --recipient)")]
    MissingRecipient,
    #[error("no gpg key store configured (`gpg.homedir` or --gnupg-dir-path)")]
    MissingKeyStore,
    #[error("no bucket configured (`s3.bucket` or --s3-bucket-link)")]
    MissingBucket,
}

/// Fully resolved settings for one pipeline run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub hostname: String,
    pub databases_file: PathBuf,
    pub globals_file: PathBuf,
    pub lock_file: PathBuf,
    pub output_dir: PathBuf,
    pub pg_dump: PathBuf,
    pub pg_dumpall: PathBuf,
    pub port: u16,
    pub user: String,
    pub gpg: PathBuf,
    pub gnupg_home: PathBuf,
    pub recipient: String,
    pub always_trust: bool,
    pub s3cmd: PathBuf,
    /// Always ends with `/`.
    pub bucket: String,
    pub upload: Vec<String>,
    pub list_after_upload: bool,
}

impl Config {
    /// Override settings with every flag the user passed on the command line.
    pub fn apply_cli(&mut self, cli: &Cli) {
        let Self {
            general,
            postgres,
            gpg,
            s3,
        } = self;

        if let Some(v) = &cli.hostname {
            general.hostname = Some(v.clone());
        }
        if let Some(v) = &cli.databases_file {
            general.databases_file.clone_from(v);
        }
        if let Some(v) = &cli.globals_file {
            general.globals_file.clone_from(v);
        }
        if let Some(v) = &cli.lock_file {
            general.lock_file.clone_from(v);
        }
        if let Some(v) = &cli.output_dir {
            general.output_dir = Some(v.clone());
        }

        if let Some(v) = &cli.pg_dump_path {
            postgres.pg_dump.clone_from(v);
        }
        if let Some(v) = &cli.pg_dumpall_path {
            postgres.pg_dumpall.clone_from(v);
        }
        if let Some(v) = cli.postgres_port {
            postgres.port = v;
        }
        if let Some(v) = &cli.postgres_user {
            postgres.user.clone_from(v);
        }

        if let Some(v) = &cli.gpg_path {
            gpg.binary.clone_from(v);
        }
        if let Some(v) = &cli.recipient {
            gpg.recipient = Some(v.clone());
        }
        if let Some(v) = &cli.gnupg_dir_path {
            gpg.homedir = Some(v.clone());
        }

        if let Some(v) = &cli.s3_path {
            s3.s3cmd.clone_from(v);
        }
        if let Some(v) = &cli.s3_upload_files {
            s3.upload.clone_from(v);
        }
        if let Some(v) = &cli.s3_bucket_link {
            s3.bucket = Some(v.clone());
        }
        if cli.no_list {
            s3.list_after_upload = false;
        }
    }

    /// Check required fields and flatten into [`Settings`].
    pub fn resolve(self) -> Result<Settings, ConfigError> {
        let Self {
            general,
            postgres,
            gpg,
            s3,
        } = self;

        let output_dir = general.output_dir.ok_or(ConfigError::MissingOutputDir)?;
        let recipient = gpg.recipient.ok_or(ConfigError::MissingRecipient)?;
        let gnupg_home = gpg.homedir.ok_or(ConfigError::MissingKeyStore)?;
        let bucket = s3.bucket.ok_or(ConfigError::MissingBucket)?;

        Ok(Settings {
            hostname: general.hostname.unwrap_or_else(system_hostname),
            databases_file: general.databases_file,
            globals_file: general.globals_file,
            lock_file: general.lock_file,
            output_dir,
            pg_dump: postgres.pg_dump,
            pg_dumpall: postgres.pg_dumpall,
            port: postgres.port,
            user: postgres.user,
            gpg: gpg.binary,
            gnupg_home,
            recipient,
            always_trust: gpg.always_trust,
            s3cmd: s3cmd_binary(s3.s3cmd),
            bucket: with_trailing_slash(bucket),
            upload: s3
                .upload
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            list_after_upload: s3.list_after_upload,
        })
    }
}

/// `s3cmd` may be configured as the directory it lives in.
fn s3cmd_binary(path: PathBuf) -> PathBuf {
    if path.is_dir() {
        path.join("s3cmd")
    } else {
        path
    }
}

fn with_trailing_slash(mut url: String) -> String {
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

/// The kernel's node name (`uname -n`).  Falls back to `/etc/hostname`, then
/// `$HOSTNAME`, then `localhost`.
fn system_hostname() -> String {
    let uname = process::run_captured(&["uname".into(), "-n".into()])
        .map_err(|e| log::debug!(target: "config", "uname -n: {e}"))
        .ok()
        .map(|out| out.stdout);

    uname
        .into_iter()
        .chain(std::fs::read_to_string("/etc/hostname").ok())
        .chain(std::env::var("HOSTNAME").ok())
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| "localhost".into())
}

// ─── Loader ───────────────────────────────────────────────────────────────────

/// Read `path` as a TOML table.  Returns `Ok(None)` when the file is absent.
pub fn read_table(path: &Path) -> Result<Option<Table>> {
    if !path.exists() {
        return Ok(None);
    }

    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let table = text
        .parse::<Table>()
        .with_context(|| format!("parsing {}", path.display()))?;

    Ok(Some(table))
}

/// Deep-merge `overlay` into `base`.  Nested tables merge key by key; any
/// other value in `overlay` replaces the one in `base`.
pub fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            },
            (_, value) => {
                base.insert(key, value);
            },
        }
    }
}

/// Load the global file (if any) and the local file, local values winning.
///
/// A missing local file is not an error: a warning is logged and the
/// defaults (plus the global layer) are used.
pub fn load_layered(global: Option<&Path>, local: &Path) -> Result<Config> {
    let mut merged = match global {
        // An unreadable global file must not block the job.
        Some(path) => match read_table(path) {
            Ok(table) => table.unwrap_or_default(),
            Err(e) => {
                log::warn!(target: "config", "Ignoring global settings: {e:#}");
                Table::new()
            },
        },
        None => Table::new(),
    };

    match read_table(local)? {
        Some(table) => merge_tables(&mut merged, table),
        None => log::warn!(
            target: "config",
            "Settings file '{}' not found, using defaults. Run 'pg-backup init' to generate one.",
            local.display()
        ),
    }

    Value::Table(merged)
        .try_into()
        .with_context(|| format!("invalid settings in {}", local.display()))
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn make_cli(extra: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("pg-backup").chain(extra.iter().copied()))
    }

    fn complete() -> Config {
        let mut cfg = Config::default();
        cfg.general.output_dir = Some("/srv/dumps".into());
        cfg.gpg.recipient = Some("ops@example.com".into());
        cfg.gpg.homedir = Some("/home/postgres/.gnupg".into());
        cfg.s3.bucket = Some("s3://bucket/pg".into());
        cfg
    }

    // ── Defaults ─────────────────────────────────────────────────────────────

    #[test]
    fn defaults_match_classic_postgres_layout() {
        let cfg = Config::default();
        assert_eq!(
            cfg.general.lock_file,
            PathBuf::from("/var/tmp/postgres_dump.lock")
        );
        assert_eq!(cfg.postgres.port, 5432);
        assert_eq!(cfg.postgres.user, "postgres");
        assert!(cfg.s3.list_after_upload);
        assert!(cfg.s3.upload.is_empty());
    }

    #[test]
    fn empty_toml_deserialises_to_defaults() {
        let cfg: Config = toml::from_str("").expect("empty toml should parse");
        assert_eq!(cfg.postgres.pg_dump, PathBuf::from("pg_dump"));
        assert!(cfg.general.output_dir.is_none());
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let cfg: Config = toml::from_str("[postgres]\nport = 6543\n").unwrap();
        assert_eq!(cfg.postgres.port, 6543);
        assert_eq!(cfg.postgres.user, "postgres");
    }

    // ── resolve ──────────────────────────────────────────────────────────────

    #[test]
    fn resolve_requires_output_dir() {
        let mut cfg = complete();
        cfg.general.output_dir = None;
        assert_eq!(cfg.resolve().unwrap_err(), ConfigError::MissingOutputDir);
    }

    #[test]
    fn resolve_requires_recipient_key_store_and_bucket() {
        let mut cfg = complete();
        cfg.gpg.recipient = None;
        assert_eq!(cfg.resolve().unwrap_err(), ConfigError::MissingRecipient);

        let mut cfg = complete();
        cfg.gpg.homedir = None;
        assert_eq!(cfg.resolve().unwrap_err(), ConfigError::MissingKeyStore);

        let mut cfg = complete();
        cfg.s3.bucket = None;
        assert_eq!(cfg.resolve().unwrap_err(), ConfigError::MissingBucket);
    }

    #[test]
    fn resolve_appends_slash_to_bucket() {
        let settings = complete().resolve().unwrap();
        assert_eq!(settings.bucket, "s3://bucket/pg/");

        let mut cfg = complete();
        cfg.s3.bucket = Some("s3://bucket/pg/".into());
        assert_eq!(cfg.resolve().unwrap().bucket, "s3://bucket/pg/");
    }

    #[test]
    fn resolve_trims_upload_entries() {
        let mut cfg = complete();
        cfg.s3.upload = vec![" app".into(), "".into(), "billing ".into()];
        assert_eq!(cfg.resolve().unwrap().upload, vec!["app", "billing"]);
    }

    #[test]
    fn resolve_uses_s3cmd_inside_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = complete();
        cfg.s3.s3cmd = dir.path().to_path_buf();
        assert_eq!(cfg.resolve().unwrap().s3cmd, dir.path().join("s3cmd"));
    }

    #[test]
    fn resolve_defaults_hostname_to_node_name() {
        let node = std::process::Command::new("uname").arg("-n").output().unwrap();
        let node = String::from_utf8_lossy(&node.stdout).trim().to_string();

        let hostname = complete().resolve().unwrap().hostname;

        assert!(!hostname.is_empty());
        assert_eq!(hostname, node);
    }

    #[test]
    fn resolve_keeps_explicit_hostname() {
        let mut cfg = complete();
        cfg.general.hostname = Some("db01".into());
        assert_eq!(cfg.resolve().unwrap().hostname, "db01");
    }

    // ── apply_cli ────────────────────────────────────────────────────────────

    #[test]
    fn cli_flags_override_file_values() {
        let mut cfg = complete();
        cfg.apply_cli(&make_cli(&[
            "--dump-file-path",
            "/tmp/out",
            "--postgres-port",
            "5433",
            "--s3-upload-files",
            "a,b",
            "--no-list",
        ]));
        assert_eq!(cfg.general.output_dir, Some(PathBuf::from("/tmp/out")));
        assert_eq!(cfg.postgres.port, 5433);
        assert_eq!(cfg.s3.upload, vec!["a", "b"]);
        assert!(!cfg.s3.list_after_upload);
        // untouched
        assert_eq!(cfg.gpg.recipient.as_deref(), Some("ops@example.com"));
    }

    #[test]
    fn cli_without_flags_changes_nothing() {
        let mut cfg = complete();
        cfg.apply_cli(&make_cli(&[]));
        assert_eq!(cfg.general.output_dir, Some(PathBuf::from("/srv/dumps")));
        assert!(cfg.s3.list_after_upload);
    }

    // ── merge / load ─────────────────────────────────────────────────────────

    #[test]
    fn merge_tables_is_deep() {
        let mut base: Table = "[postgres]\nport = 1\nuser = \"a\"\n".parse().unwrap();
        let overlay: Table = "[postgres]\nport = 2\n".parse().unwrap();
        merge_tables(&mut base, overlay);

        let cfg: Config = Value::Table(base).try_into().unwrap();
        assert_eq!(cfg.postgres.port, 2);
        assert_eq!(cfg.postgres.user, "a");
    }

    #[test]
    fn load_layered_local_wins_over_global() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join("global.toml");
        let local = dir.path().join("local.toml");
        std::fs::write(
            &global,
            "[gpg]\nrecipient = \"global@example.com\"\nhomedir = \"/g\"\n",
        )
        .unwrap();
        std::fs::write(&local, "[gpg]\nrecipient = \"local@example.com\"\n").unwrap();

        let cfg = load_layered(Some(&global), &local).unwrap();
        assert_eq!(cfg.gpg.recipient.as_deref(), Some("local@example.com"));
        assert_eq!(cfg.gpg.homedir, Some(PathBuf::from("/g")));
    }

    #[test]
    fn load_layered_missing_files_give_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_layered(None, &dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.postgres.port, 5432);
    }

    #[test]
    fn load_layered_errors_on_invalid_local_toml() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        write!(f, "not valid toml ][[[").unwrap();
        assert!(load_layered(None, f.path()).is_err());
    }

    #[test]
    fn load_layered_errors_on_wrong_types() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        write!(f, "[postgres]\nport = \"not a number\"\n").unwrap();
        assert!(load_layered(None, f.path()).is_err());
    }
}
