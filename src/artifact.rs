//! Run context and artifact naming.
//!
//! Every file a run produces carries the run timestamp, captured once when
//! the run starts.  Two runs therefore never write to the same names, even
//! when the second starts right after the first.
//!
//! | Artifact        | Name                           |
//! |-----------------|--------------------------------|
//! | data dump       | `<db>_<ts>.sql`                |
//! | dump log        | `<db>_<ts>.log`                |
//! | globals dump    | `<alias>_<ts>_roles.sql`       |
//! | encrypted       | any of the above + `.gpg`      |

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};

/// Format of the run timestamp, e.g. `2024-03-01_02:15:00`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H:%M:%S";

/// Suffix every encrypted artifact ends with.
pub const ENCRYPTED_SQL_SUFFIX: &str = ".sql.gpg";

/// Immutable per-run state shared by all stages.
#[derive(Debug, Clone)]
pub struct RunContext {
    output_dir: PathBuf,
    timestamp: String,
}

impl RunContext {
    /// Capture the current local time as the run timestamp.
    pub fn start(output_dir: &Path) -> Self {
        Self::at(output_dir, Local::now())
    }

    pub fn at(output_dir: &Path, time: DateTime<Local>) -> Self {
        Self::with_timestamp(output_dir, time.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn with_timestamp(output_dir: &Path, timestamp: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            timestamp: timestamp.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// `<db>_<ts>.sql`
    pub fn dump_name(&self, db: &str) -> String {
        format!("{db}_{}.sql", self.timestamp)
    }

    /// `<db>_<ts>.log`
    pub fn log_name(&self, db: &str) -> String {
        format!("{db}_{}.log", self.timestamp)
    }

    /// `<alias>_<ts>_roles.sql`
    pub fn roles_name(&self, alias: &str) -> String {
        format!("{alias}_{}_roles.sql", self.timestamp)
    }

    pub fn dump_file(&self, db: &str) -> PathBuf {
        self.output_dir.join(self.dump_name(db))
    }

    pub fn log_file(&self, db: &str) -> PathBuf {
        self.output_dir.join(self.log_name(db))
    }

    pub fn roles_file(&self, alias: &str) -> PathBuf {
        self.output_dir.join(self.roles_name(alias))
    }

    /// Per-database archive directory, `<output_dir>/<name>/`.
    pub fn archive_dir(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }
}

/// `<path>.gpg`
pub fn encrypted(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".gpg");
    PathBuf::from(name)
}
