//! Archival stages: move this run's plaintext files into per-name folders.
//!
//! ```text
//! <output_dir>/app_<ts>.sql        →  <output_dir>/app/app_<ts>.sql
//! <output_dir>/app_<ts>.log        →  <output_dir>/app/app_<ts>.log
//! <output_dir>/main_<ts>_roles.sql →  <output_dir>/main/main_<ts>_roles.sql
//! ```
//!
//! Files that do not exist (e.g. because the dump failed before creating
//! them) are skipped without complaint.  A file already archived under the
//! same name is never replaced: the item fails and both copies stay.

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::{artifact::RunContext, config::Settings, targets, ui::StageOutcome};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("cannot create {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} already exists, leaving {} in place", to.display(), from.display())]
    Exists { from: PathBuf, to: PathBuf },

    #[error("cannot move {} to {}: {source}", from.display(), to.display())]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Move `files` (bare names inside the output directory) into
/// `<output_dir>/<name>/`.  Returns how many files were moved.
pub fn relocate(ctx: &RunContext, name: &str, files: &[String]) -> Result<usize, ArchiveError> {
    let dir = ctx.archive_dir(name);
    std::fs::create_dir_all(&dir).map_err(|source| ArchiveError::CreateDir {
        path: dir.clone(),
        source,
    })?;

    let mut moved = 0;
    for file in files {
        let from = ctx.output_dir().join(file);
        if !from.is_file() {
            continue;
        }
        let to = dir.join(file);
        if to.symlink_metadata().is_ok() {
            return Err(ArchiveError::Exists { from, to });
        }
        log::debug!(target: "stage::archive", "Moving {} to {}", from.display(), to.display());
        std::fs::rename(&from, &to).map_err(|source| ArchiveError::Move { from, to, source })?;
        moved += 1;
    }

    Ok(moved)
}

/// Move every database's dump and log into its own folder.
pub fn archive(settings: &Settings, ctx: &RunContext) -> StageOutcome {
    let mut outcome = StageOutcome::new("Move");

    let databases = match targets::read_databases(&settings.databases_file) {
        Ok(databases) => databases,
        Err(e) => {
            log::error!(target: "stage::archive", "{e}");
            outcome.fail(e);
            return outcome;
        },
    };

    for db in &databases {
        if let Err(e) = targets::check_name(&db.name) {
            log::error!(target: "stage::archive", "Skipping {}: {e}", db.name);
            outcome.item_failed(db.name.as_str(), e);
            continue;
        }
        let files = [ctx.dump_name(&db.name), ctx.log_name(&db.name)];
        match relocate(ctx, &db.name, &files) {
            Ok(moved) => {
                log::info!(target: "stage::archive", "Archived {moved} file(s) of {}", db.name);
                outcome.item_ok(db.name.as_str());
            },
            Err(e) => {
                log::error!(target: "stage::archive", "Could not archive {}: {e}", db.name);
                outcome.item_failed(db.name.as_str(), e);
            },
        }
    }

    outcome
}

/// Move the globals dump into the folder named after the alias.
pub fn archive_globals(settings: &Settings, ctx: &RunContext) -> StageOutcome {
    let mut outcome = StageOutcome::new("Move-Dumpall");

    let alias = match targets::read_alias(&settings.globals_file) {
        Ok(alias) => alias,
        Err(e) => {
            log::error!(target: "stage::archive", "{e}");
            outcome.fail(e);
            return outcome;
        },
    };

    match relocate(ctx, &alias, &[ctx.roles_name(&alias)]) {
        Ok(_) => outcome.item_ok(alias),
        Err(e) => {
            log::error!(target: "stage::archive", "Could not archive globals of {alias}: {e}");
            outcome.item_failed(alias, e);
        },
    }

    outcome
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::stages::testing::Sandbox;

    #[test]
    fn dumps_and_logs_move_into_database_folders() {
        let sb = Sandbox::new("app\nbilling\n");
        for db in ["app", "billing"] {
            fs::write(sb.ctx.dump_file(db), "sql").unwrap();
            fs::write(sb.ctx.log_file(db), "log").unwrap();
        }

        let outcome = archive(&sb.settings, &sb.ctx);

        assert!(!outcome.failed(), "{outcome:?}");
        for db in ["app", "billing"] {
            let dir = sb.out().join(db);
            assert!(dir.join(sb.ctx.dump_name(db)).is_file());
            assert!(dir.join(sb.ctx.log_name(db)).is_file());
            assert!(!sb.ctx.dump_file(db).exists());
            assert!(!sb.ctx.log_file(db).exists());
        }
    }

    #[test]
    fn missing_files_are_skipped_silently() {
        let sb = Sandbox::new("app\n");
        fs::write(sb.ctx.log_file("app"), "log").unwrap();

        assert_eq!(relocate(&sb.ctx, "app", &[sb.ctx.dump_name("app")]).unwrap(), 0);
        let outcome = archive(&sb.settings, &sb.ctx);

        assert!(!outcome.failed());
        assert!(sb.out().join("app").is_dir());
        assert!(sb.out().join("app").join(sb.ctx.log_name("app")).is_file());
    }

    #[test]
    fn files_of_other_runs_stay_put() {
        let sb = Sandbox::new("app\n");
        let older = sb.out().join("app_2020-01-01_00:00:00.sql");
        fs::write(&older, "old").unwrap();

        archive(&sb.settings, &sb.ctx);
        assert!(older.is_file());
    }

    #[test]
    fn earlier_archive_with_same_name_is_not_overwritten() {
        let sb = Sandbox::new("app\nbilling\n");
        let earlier = sb.out().join("app").join(sb.ctx.dump_name("app"));
        fs::create_dir_all(earlier.parent().unwrap()).unwrap();
        fs::write(&earlier, "earlier run").unwrap();
        fs::write(sb.ctx.dump_file("app"), "this run").unwrap();
        fs::write(sb.ctx.dump_file("billing"), "sql").unwrap();

        let outcome = archive(&sb.settings, &sb.ctx);

        let failed: Vec<_> = outcome.failed_items().map(|i| i.name.as_str()).collect();
        assert_eq!(failed, ["app"]);
        assert_eq!(fs::read_to_string(&earlier).unwrap(), "earlier run");
        assert_eq!(fs::read_to_string(sb.ctx.dump_file("app")).unwrap(), "this run");
        assert!(sb.out().join("billing").join(sb.ctx.dump_name("billing")).is_file());
    }

    #[test]
    fn blocked_folder_fails_only_that_database() {
        let sb = Sandbox::new("app\nbilling\n");
        // a plain file where the folder should go
        fs::write(sb.out().join("app"), "").unwrap();
        fs::write(sb.ctx.dump_file("billing"), "sql").unwrap();

        let outcome = archive(&sb.settings, &sb.ctx);

        let failed: Vec<_> = outcome.failed_items().map(|i| i.name.as_str()).collect();
        assert_eq!(failed, ["app"]);
        assert!(sb.out().join("billing").join(sb.ctx.dump_name("billing")).is_file());
    }

    #[test]
    fn roles_dump_moves_into_alias_folder() {
        let sb = Sandbox::new("");
        fs::write(sb.ctx.roles_file("main"), "roles").unwrap();

        let outcome = archive_globals(&sb.settings, &sb.ctx);

        assert!(!outcome.failed());
        assert!(sb.out().join("main").join(sb.ctx.roles_name("main")).is_file());
    }

    #[test]
    fn unreadable_list_fails_stage() {
        let mut sb = Sandbox::new("");
        sb.settings.databases_file = sb.dir().join("missing.conf");
        assert!(archive(&sb.settings, &sb.ctx).error.is_some());
    }
}
