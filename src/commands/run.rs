//! Default backup pipeline: runs when no subcommand is given.
//!
//! # Pipeline stages (in order)
//!
//! | # | Stage        | On failure                                         |
//! |---|--------------|----------------------------------------------------|
//! | 0 | Lock         | **abort**, exit non-zero, nothing else runs        |
//! | 1 | Dump         | record per database, continue                      |
//! | 2 | Dumpall      | record, skip the rest of the globals chain         |
//! | 3 | Encrypt      | record stage (gpg setup) or per file, continue     |
//! | 4 | Upload       | record per file, continue                          |
//! | 5 | Move         | record per database, continue                      |
//! | 6 | Move-Dumpall | record, continue                                   |
//! | 7 | Cleanup      | record, never fatal                                |
//!
//! Every stage after the lock always runs, even when earlier stages failed,
//! so the lock is always released and the summary always lists all stages.
//!
//! ## Upload list default
//!
//! Encrypt and Upload work on `s3.upload`.  When that is empty, every database
//! of the database list is used.

use anyhow::{Result, bail};
use console::style;

use crate::{
    artifact::RunContext,
    cli::Cli,
    config::Settings,
    lock::{Lock, LockError},
    stages::{archive, cleanup, dump, encrypt, upload},
    targets::{self, ListError},
    ui::{StageOutcome, print_summary, run_stage},
};

// ─── Entry point ──────────────────────────────────────────────────────────────

/// Execute the full backup pipeline and print the summary.
///
/// Returns an error when the lock could not be taken, or when
/// `--fail-on-error` is set and any stage failed.
pub fn run(cli: &Cli, settings: &Settings) -> Result<()> {
    println!();

    let ctx = RunContext::start(&settings.output_dir);
    log::info!(
        target: "pipeline",
        "Starting backup of {} (run {})",
        settings.hostname,
        ctx.timestamp()
    );

    let outcomes = execute(settings, &ctx)?;
    print_summary(&settings.hostname, &outcomes);

    let failed = outcomes.iter().filter(|o| o.failed()).count();
    if cli.fail_on_error && failed > 0 {
        bail!("{failed} stage(s) failed");
    }
    Ok(())
}

/// Run every stage for `ctx`, returning their outcomes in order.
///
/// The only error is lock contention, raised before any other side effect.
pub fn execute(settings: &Settings, ctx: &RunContext) -> Result<Vec<StageOutcome>, LockError> {
    let lock = match Lock::acquire(&settings.lock_file) {
        Ok(lock) => lock,
        Err(e) => {
            println!("  {}  {}", style("✗").red().bold(), style("Lock").bold());
            log::error!(target: "pipeline", "{e}");
            return Err(e);
        },
    };
    println!("  {}  {}", style("✓").green().bold(), style("Lock").bold());

    if let Err(e) = std::fs::create_dir_all(ctx.output_dir()) {
        log::error!(
            target: "pipeline",
            "Cannot create output directory {}: {e}",
            ctx.output_dir().display()
        );
    }

    let stems = upload_stems(settings);
    let mut outcomes = Vec::with_capacity(7);

    // 1 & 2. Dump + Dumpall
    outcomes.push(run_stage("Dump", || dump::dump(settings, ctx)));
    outcomes.push(run_stage("Dumpall", || dump::dump_globals(settings, ctx)));

    // 3. Encrypt
    outcomes.push(run_stage("Encrypt", || match &stems {
        Ok(stems) => encrypt::encrypt(settings, ctx, stems),
        Err(e) => failed_stage("Encrypt", e),
    }));

    // 4. Upload
    outcomes.push(run_stage("Upload", || match &stems {
        Ok(stems) => upload::upload(settings, ctx, stems),
        Err(e) => failed_stage("Upload", e),
    }));

    // 5 & 6. Move + Move-Dumpall
    outcomes.push(run_stage("Move", || archive::archive(settings, ctx)));
    outcomes.push(run_stage("Move-Dumpall", || {
        archive::archive_globals(settings, ctx)
    }));

    // 7. Cleanup
    outcomes.push(run_stage("Cleanup", || {
        cleanup::cleanup(&lock, ctx.output_dir())
    }));

    Ok(outcomes)
}

/// Names to encrypt and upload: `s3.upload`, or every listed database.
pub fn upload_stems(settings: &Settings) -> Result<Vec<String>, ListError> {
    if !settings.upload.is_empty() {
        return Ok(settings.upload.clone());
    }
    let databases = targets::read_databases(&settings.databases_file)?;
    Ok(databases.into_iter().map(|db| db.name).collect())
}

fn failed_stage(label: &str, error: &ListError) -> StageOutcome {
    let mut outcome = StageOutcome::new(label);
    outcome.fail(error);
    outcome
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use super::*;
    use crate::{
        artifact,
        stages::testing::{GPG_COPY, Sandbox},
    };

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .flatten()
            .filter(|e| e.path().is_file())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn outcome<'a>(outcomes: &'a [StageOutcome], label: &str) -> &'a StageOutcome {
        outcomes.iter().find(|o| o.label == label).unwrap()
    }

    #[test]
    fn stages_run_in_order() {
        let sb = Sandbox::new("app\n");
        let outcomes = execute(&sb.settings, &sb.ctx).unwrap();
        let labels: Vec<_> = outcomes.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, [
            "Dump",
            "Dumpall",
            "Encrypt",
            "Upload",
            "Move",
            "Move-Dumpall",
            "Cleanup"
        ]);
    }

    #[test]
    fn successful_run_leaves_only_archived_plaintext() {
        let sb = Sandbox::new("app\nbilling\n");

        let outcomes = execute(&sb.settings, &sb.ctx).unwrap();

        assert!(outcomes.iter().all(|o| !o.failed()), "{outcomes:#?}");
        assert!(files_in(sb.out()).is_empty(), "{:?}", files_in(sb.out()));
        for db in ["app", "billing"] {
            assert_eq!(files_in(&sb.out().join(db)), [
                sb.ctx.log_name(db),
                sb.ctx.dump_name(db)
            ]);
        }
        assert_eq!(files_in(&sb.out().join("main")), [sb.ctx.roles_name("main")]);
        assert!(!sb.settings.lock_file.exists());
    }

    #[test]
    fn lock_exists_while_dumping() {
        let mut sb = Sandbox::new("app\n");
        let lock = sb.settings.lock_file.display().to_string();
        sb.settings.pg_dump = sb.tool(
            "pg_dump",
            &format!("[ -f '{lock}' ] && echo \"pid $(cat '{lock}')\" >&2"),
        );

        execute(&sb.settings, &sb.ctx).unwrap();

        let log = fs::read_to_string(sb.out().join("app").join(sb.ctx.log_name("app"))).unwrap();
        assert_eq!(log.trim(), format!("pid {}", std::process::id()));
        assert!(!sb.settings.lock_file.exists());
    }

    #[test]
    fn held_lock_stops_everything() {
        let sb = Sandbox::new("app\n");
        fs::write(&sb.settings.lock_file, std::process::id().to_string()).unwrap();

        let err = execute(&sb.settings, &sb.ctx).unwrap_err();

        assert!(matches!(err, LockError::HeldBy { .. }));
        assert!(sb.calls().is_empty());
        assert!(files_in(sb.out()).is_empty());
        assert!(sb.settings.lock_file.exists());
    }

    #[test]
    fn stale_lock_is_taken_over() {
        let sb = Sandbox::new("app\n");
        fs::write(&sb.settings.lock_file, "4194400").unwrap();

        let outcomes = execute(&sb.settings, &sb.ctx).unwrap();

        assert!(!outcome(&outcomes, "Dump").failed());
        assert!(!sb.settings.lock_file.exists());
    }

    #[test]
    fn encrypt_and_upload_isolate_failures_per_file() {
        let mut sb = Sandbox::new("a\nb\nc\n");
        sb.settings.gpg = sb.tool(
            "gpg",
            &format!("case \"$*\" in */b_*) exit 2;; esac\n{GPG_COPY}"),
        );
        sb.settings.s3cmd = sb.tool(
            "s3cmd",
            "[ \"$1\" = ls ] && exit 0\ncase \"$*\" in */a_*) exit 1;; esac\n[ -f \"$2\" ]",
        );

        let outcomes = execute(&sb.settings, &sb.ctx).unwrap();

        let failed = |label| -> Vec<String> {
            outcome(&outcomes, label)
                .failed_items()
                .map(|i| i.name.clone())
                .collect()
        };
        assert_eq!(failed("Encrypt"), ["b"]);
        // b has no encrypted file, a is rejected by the bucket
        assert_eq!(failed("Upload"), ["a", "b"]);
        let puts: Vec<_> = sb
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("s3cmd put"))
            .collect();
        assert!(puts.iter().any(|c| c.contains("/c_")), "{puts:?}");
        // encrypted leftovers are removed regardless
        assert!(!artifact::encrypted(&sb.ctx.dump_file("c")).exists());
    }

    #[test]
    fn failed_dump_is_never_encrypted_or_uploaded() {
        let mut sb = Sandbox::new("a\nb\n");
        sb.settings.pg_dump = sb.tool("pg_dump", "[ \"$7\" = b ] && exit 1\necho dump");

        let outcomes = execute(&sb.settings, &sb.ctx).unwrap();

        let failed = |label| -> Vec<String> {
            outcome(&outcomes, label)
                .failed_items()
                .map(|i| i.name.clone())
                .collect()
        };
        assert_eq!(failed("Dump"), ["b"]);
        assert_eq!(failed("Encrypt"), ["b"]);
        assert_eq!(failed("Upload"), ["b"]);
        assert!(
            !sb.calls()
                .iter()
                .any(|c| c.starts_with("s3cmd put") && c.contains("/b_")),
            "{:?}",
            sb.calls()
        );
        assert!(!sb.out().join("b").join(sb.ctx.dump_name("b")).exists());
        assert!(sb.out().join("b").join(sb.ctx.log_name("b")).is_file());
    }

    #[test]
    fn names_leaving_output_dir_fail_in_every_stage() {
        let mut sb = Sandbox::new("../up\napp\n");
        sb.settings.upload = vec!["../up".into(), "app".into()];

        let outcomes = execute(&sb.settings, &sb.ctx).unwrap();

        for label in ["Dump", "Encrypt", "Upload", "Move"] {
            let failed: Vec<_> = outcome(&outcomes, label)
                .failed_items()
                .map(|i| i.name.as_str())
                .collect();
            assert_eq!(failed, ["../up"], "{label}");
        }
        assert!(!sb.calls().iter().any(|c| c.contains("../up")), "{:?}", sb.calls());
        assert!(
            !files_in(sb.dir()).iter().any(|n| n.starts_with("up_")),
            "{:?}",
            files_in(sb.dir())
        );
        assert_eq!(files_in(&sb.out().join("app")).len(), 2);
    }

    #[test]
    fn upload_list_limits_encrypt_and_upload() {
        let mut sb = Sandbox::new("a\nb\n");
        sb.settings.upload = vec!["b".into()];

        let outcomes = execute(&sb.settings, &sb.ctx).unwrap();

        let names: Vec<_> = outcome(&outcomes, "Encrypt")
            .items
            .iter()
            .map(|i| i.name.as_str())
            .collect();
        assert_eq!(names, ["b"]);
    }

    #[test]
    fn missing_database_list_still_runs_every_stage() {
        let mut sb = Sandbox::new("");
        sb.settings.databases_file = sb.dir().join("missing.conf");

        let outcomes = execute(&sb.settings, &sb.ctx).unwrap();

        assert_eq!(outcomes.len(), 7);
        for label in ["Dump", "Encrypt", "Upload", "Move"] {
            assert!(outcome(&outcomes, label).error.is_some(), "{label}");
        }
        assert!(!outcome(&outcomes, "Dumpall").failed());
        assert!(!outcome(&outcomes, "Cleanup").failed());
        assert!(!sb.settings.lock_file.exists());
    }

    #[test]
    fn rerun_uses_disjoint_names() {
        let sb = Sandbox::new("app\n");
        execute(&sb.settings, &sb.ctx).unwrap();

        let second = RunContext::with_timestamp(sb.out(), "2024-03-01_02:16:00");
        let outcomes = execute(&sb.settings, &second).unwrap();

        assert!(outcomes.iter().all(|o| !o.failed()), "{outcomes:#?}");
        let archived = files_in(&sb.out().join("app"));
        assert_eq!(archived.len(), 4);
        assert!(archived.contains(&sb.ctx.dump_name("app")));
        assert!(archived.contains(&second.dump_name("app")));
    }
}
