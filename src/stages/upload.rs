//! Upload stage: `s3cmd put` for every encrypted dump, then `s3cmd ls`.
//!
//! Each upload is independent: a failed `put` is recorded for that file and
//! the loop carries on with the next one.  A stem without an encrypted file
//! (its dump or encryption failed) is recorded as failed without calling
//! `s3cmd`.  The bucket listing afterwards is purely informational; its
//! output goes to the log and a failure there is only a warning.

use std::path::Path;

use crate::{
    artifact::{self, RunContext},
    config::Settings,
    process::{self, ProcessError},
    runner, targets,
    ui::StageOutcome,
};

/// Upload one file to the configured bucket.
pub fn put(settings: &Settings, file: &Path) -> Result<(), ProcessError> {
    process::run_captured(&runner::s3_put(settings, file))?;
    log::info!(
        target: "stage::upload",
        "Uploaded {} to {}",
        file.display(),
        settings.bucket
    );
    Ok(())
}

/// Log the bucket contents.
pub fn list_bucket(settings: &Settings) {
    match process::run_captured(&runner::s3_ls(settings)) {
        Ok(out) => {
            for line in out.stdout.lines() {
                log::info!(target: "stage::upload", "Bucket: {line}");
            }
        },
        Err(e) => log::warn!(target: "stage::upload", "Could not list {}: {e}", settings.bucket),
    }
}

/// Upload `<stem>_<ts>.sql.gpg` for every stem.
pub fn upload(settings: &Settings, ctx: &RunContext, stems: &[String]) -> StageOutcome {
    let mut outcome = StageOutcome::new("Upload");

    for stem in stems {
        if let Err(e) = targets::check_name(stem) {
            log::error!(target: "stage::upload", "Skipping {stem}: {e}");
            outcome.item_failed(stem.as_str(), e);
            continue;
        }
        let file = artifact::encrypted(&ctx.dump_file(stem));
        if !file.is_file() {
            log::error!(target: "stage::upload", "Nothing to upload for {stem}: {} not found", file.display());
            outcome.item_failed(stem.as_str(), format!("{} not found", file.display()));
            continue;
        }
        match put(settings, &file) {
            Ok(()) => outcome.item_ok(stem.as_str()),
            Err(e) => {
                log::error!(target: "stage::upload", "Could not upload {stem}: {e}");
                outcome.item_failed(stem.as_str(), e);
            },
        }
    }

    if settings.list_after_upload {
        list_bucket(settings);
    }

    outcome
}

// ─── Tests ────────────────────────────────────────────────────────────────────
