//! `pg-backup`: dump, encrypt and ship PostgreSQL backups, driven by
//! `pg-backup.toml`.
//!
//! # Overview
//!
//! One run dumps every database of a list file with `pg_dump`, dumps the
//! cluster globals with `pg_dumpall -g`, encrypts the dumps for one gpg
//! recipient, uploads the encrypted files with `s3cmd`, files the plaintext
//! dumps and logs into per-database folders and removes the encrypted copies.
//! A PID lock file keeps two runs from overlapping.
//!
//! # Usage
//!
//! ```text
//! pg-backup                         # run the pipeline using ./pg-backup.toml
//! pg-backup --config /etc/pg.toml   # use another settings file
//! pg-backup init                    # scaffold a pg-backup.toml
//! pg-backup --print-config          # show merged settings without running
//! pg-backup -d /srv/dumps -r ops@example.com --s3-upload-files app,billing
//! ```
//!
//! # Module layout
//!
//! | Module                   | Responsibility                              |
//! |--------------------------|---------------------------------------------|
//! | [`cli`]                  | Argument types parsed by clap               |
//! | [`config`]               | Layered settings + validation               |
//! | [`lock`]                 | PID lock file                               |
//! | [`targets`]              | Database list and globals alias files       |
//! | [`artifact`]             | Run timestamp and file naming               |
//! | [`process`]              | Argv-only command execution                 |
//! | [`runner`]               | Argument vectors for external tools         |
//! | [`stages`]               | Dump, encrypt, upload, archive, cleanup     |
//! | [`ui`]                   | Spinner, stage outcomes, summary            |
//! | [`commands::init`]       | `pg-backup init` subcommand                 |
//! | [`commands::run`]        | Default backup pipeline                     |

mod artifact;
mod cli;
mod commands;
mod config;
mod lock;
mod process;
mod runner;
mod stages;
mod targets;
mod ui;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Subcommand};
use log::LevelFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        // ── pg-backup init ────────────────────────────────────────────────────
        Some(Subcommand::Init) => {
            commands::init::run(&cli.config)?;
        },

        // ── pg-backup (default pipeline) ──────────────────────────────────────
        None => {
            let mut cfg = config::load_layered(global_config_path().as_deref(), &cli.config)?;
            cfg.apply_cli(&cli);

            if cli.print_config {
                print!("{}", toml::to_string_pretty(&cfg).context("rendering settings")?);
                return Ok(());
            }

            let settings = cfg.resolve()?;
            commands::run::run(&cli, &settings)?;
        },
    }

    Ok(())
}

/// `info` by default; `RUST_LOG` refines it and `--verbose` overrides both.
fn init_logging(verbose: Option<LevelFilter>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = verbose {
        builder.filter_level(level);
    }
    // Only fails if a logger is already set.
    let _ = builder.try_init();
}

/// `~/.config/pg-backup/config.toml`, machine-wide defaults for every run.
fn global_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|d| d.join("pg-backup").join("config.toml"))
}
