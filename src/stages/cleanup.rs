//! Cleanup stage: release the lock and delete encrypted artifacts.
//!
//! Every `*.sql.gpg` directly inside the output directory is removed, whether
//! or not its upload succeeded.  Subdirectories are not searched.

use std::path::Path;

use crate::{artifact::ENCRYPTED_SQL_SUFFIX, lock::Lock, ui::StageOutcome};

pub fn cleanup(lock: &Lock, output_dir: &Path) -> StageOutcome {
    let mut outcome = StageOutcome::new("Cleanup");

    match lock.release() {
        Ok(()) => outcome.item_ok("lock"),
        Err(e) => {
            log::error!(target: "stage::cleanup", "Could not remove lock {}: {e}", lock.path().display());
            outcome.item_failed("lock", e);
        },
    }

    let entries = match std::fs::read_dir(output_dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::error!(target: "stage::cleanup", "Cannot list {}: {e}", output_dir.display());
            outcome.fail(format!("cannot list {}: {e}", output_dir.display()));
            return outcome;
        },
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(ENCRYPTED_SQL_SUFFIX) || !path.is_file() {
            continue;
        }

        match std::fs::remove_file(&path) {
            Ok(()) => {
                log::debug!(target: "stage::cleanup", "Removed {}", path.display());
                outcome.item_ok(name);
            },
            Err(e) => {
                log::error!(target: "stage::cleanup", "Could not remove {}: {e}", path.display());
                outcome.item_failed(name, e);
            },
        }
    }

    log::info!(target: "stage::cleanup", "All cleaned up.");
    outcome
}
