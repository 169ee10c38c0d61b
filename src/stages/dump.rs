//! Dump stages.
//!
//! - [`dump`]: one `pg_dump` per line of the database list.  stdout becomes
//!   `<db>_<ts>.sql`, stderr is appended to `<db>_<ts>.log`.
//! - [`dump_globals`]: one `pg_dumpall -g` into `<alias>_<ts>_roles.sql`,
//!   which is then encrypted and uploaded straight away through the same
//!   [`Encryptor`] and [`upload::put`] the Encrypt and Upload stages use.

use std::{io, path::Path};

use crate::{
    artifact::RunContext,
    config::Settings,
    process, runner,
    stages::{encrypt::Encryptor, upload},
    targets,
    ui::StageOutcome,
};

/// Dump every database in the list.  A failed dump is recorded for that
/// database only.
pub fn dump(settings: &Settings, ctx: &RunContext) -> StageOutcome {
    let mut outcome = StageOutcome::new("Dump");

    let databases = match targets::read_databases(&settings.databases_file) {
        Ok(databases) => databases,
        Err(e) => {
            log::error!(target: "stage::dump", "{e}");
            outcome.fail(e);
            return outcome;
        },
    };

    for db in &databases {
        if let Err(e) = targets::check_name(&db.name) {
            log::error!(target: "stage::dump", "Skipping {}: {e}", db.name);
            outcome.item_failed(db.name.as_str(), e);
            continue;
        }
        let sql = ctx.dump_file(&db.name);
        let log_file = ctx.log_file(&db.name);
        log::info!(target: "stage::dump", "Dumping {} to {}", db.name, sql.display());

        match process::run_redirected(&runner::pg_dump(settings, &db.tokens), &sql, Some(&log_file)) {
            Ok(()) => {
                log::info!(target: "stage::dump", "Backup of {} completed", db.name);
                outcome.item_ok(db.name.as_str());
            },
            Err(e) => {
                log::error!(
                    target: "stage::dump",
                    "Backup of {} failed: {e} (see {})",
                    db.name,
                    log_file.display()
                );
                discard(&sql);
                outcome.item_failed(db.name.as_str(), e);
            },
        }
    }

    outcome
}

/// Dump the cluster globals, then encrypt and upload the roles file.
///
/// Later steps are skipped once one fails, since they would only operate on
/// a missing file.
pub fn dump_globals(settings: &Settings, ctx: &RunContext) -> StageOutcome {
    let mut outcome = StageOutcome::new("Dumpall");

    let alias = match targets::read_alias(&settings.globals_file) {
        Ok(alias) => alias,
        Err(e) => {
            log::error!(target: "stage::dumpall", "{e}");
            outcome.fail(e);
            return outcome;
        },
    };

    let roles = ctx.roles_file(&alias);
    log::info!(target: "stage::dumpall", "Taking globals dump of {alias} to {}", roles.display());
    if let Err(e) = process::run_redirected(&runner::pg_dumpall_globals(settings), &roles, None) {
        log::error!(target: "stage::dumpall", "Globals dump failed: {e}");
        discard(&roles);
        outcome.item_failed("dump", e);
        return outcome;
    }
    outcome.item_ok("dump");

    let encrypted = match Encryptor::open(settings).and_then(|gpg| gpg.encrypt(&roles)) {
        Ok(path) => path,
        Err(e) => {
            log::error!(target: "stage::dumpall", "Could not encrypt globals: {e}");
            outcome.item_failed("encrypt", e);
            return outcome;
        },
    };
    outcome.item_ok("encrypt");

    match upload::put(settings, &encrypted) {
        Ok(()) => outcome.item_ok("upload"),
        Err(e) => {
            log::error!(target: "stage::dumpall", "Could not upload globals: {e}");
            outcome.item_failed("upload", e);
        },
    }

    outcome
}

/// Remove the output of a failed dump so later stages never ship it.
fn discard(partial: &Path) {
    match std::fs::remove_file(partial) {
        Ok(()) => log::debug!(target: "stage::dump", "Removed partial dump {}", partial.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {},
        Err(e) => log::warn!(target: "stage::dump", "Could not remove {}: {e}", partial.display()),
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
