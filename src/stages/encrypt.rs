//! Encryption stage: `<stem>_<ts>.sql` → `<stem>_<ts>.sql.gpg` with gpg.
//!
//! The encryption context ([`Encryptor`]) is opened once per run.  If the key
//! store or the gpg binary is unusable the whole stage fails with one error;
//! otherwise each file is encrypted independently and a failure on one file
//! does not stop the others.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::{
    artifact::{self, RunContext},
    config::Settings,
    process::{self, ProcessError},
    runner, targets,
    ui::StageOutcome,
};

#[derive(Debug, Error)]
pub enum EncryptError {
    #[error("gpg key store {} is not a directory", path.display())]
    KeyStore { path: PathBuf },

    #[error("gpg is not usable: {0}")]
    Binary(#[source] ProcessError),

    #[error("plaintext {} not found", path.display())]
    MissingInput { path: PathBuf },

    #[error(transparent)]
    Gpg(#[from] ProcessError),
}

/// A checked gpg setup, ready to encrypt for the configured recipient.
pub struct Encryptor<'a> {
    settings: &'a Settings,
}

impl<'a> Encryptor<'a> {
    /// Check that the key store exists and `gpg --version` runs.
    pub fn open(settings: &'a Settings) -> Result<Self, EncryptError> {
        if !settings.gnupg_home.is_dir() {
            return Err(EncryptError::KeyStore {
                path: settings.gnupg_home.clone(),
            });
        }
        process::run_captured(&runner::gpg_version(settings)).map_err(EncryptError::Binary)?;

        Ok(Self { settings })
    }

    /// Encrypt `input` to `<input>.gpg` and return the encrypted path.
    pub fn encrypt(&self, input: &Path) -> Result<PathBuf, EncryptError> {
        if !input.is_file() {
            return Err(EncryptError::MissingInput {
                path: input.to_path_buf(),
            });
        }

        let output = artifact::encrypted(input);
        process::run_captured(&runner::gpg_encrypt(self.settings, input, &output))?;
        log::info!(
            target: "stage::encrypt",
            "Encrypted {} for {}",
            output.display(),
            self.settings.recipient
        );
        Ok(output)
    }
}

/// Encrypt the data dump of every stem.
pub fn encrypt(settings: &Settings, ctx: &RunContext, stems: &[String]) -> StageOutcome {
    let mut outcome = StageOutcome::new("Encrypt");

    let encryptor = match Encryptor::open(settings) {
        Ok(encryptor) => encryptor,
        Err(e) => {
            log::error!(target: "stage::encrypt", "Could not set up gpg: {e}");
            outcome.fail(e);
            return outcome;
        },
    };

    for stem in stems {
        if let Err(e) = targets::check_name(stem) {
            log::error!(target: "stage::encrypt", "Skipping {stem}: {e}");
            outcome.item_failed(stem.as_str(), e);
            continue;
        }
        match encryptor.encrypt(&ctx.dump_file(stem)) {
            Ok(_) => outcome.item_ok(stem.as_str()),
            Err(e) => {
                log::error!(target: "stage::encrypt", "Could not encrypt {stem}: {e}");
                outcome.item_failed(stem.as_str(), e);
            },
        }
    }

    outcome
}

// ─── Tests ────────────────────────────────────────────────────────────────────
