//! Single-run lock.
//!
//! The lock is a file holding the PID of the run that owns it.  The owner also
//! keeps an advisory lock (`flock`) on that file for as long as it runs, and
//! only the holder of the advisory lock may rewrite or remove the file.  That
//! is what makes two starters exclusive, including when both find the same
//! stale lock.
//!
//! A starter that gets the advisory lock on an existing file looks at the
//! recorded PID:
//!
//! | Content          | Meaning                                   | Result          |
//! |------------------|-------------------------------------------|-----------------|
//! | PID, alive       | owner does not use `flock` (older tools)  | held            |
//! | PID, dead        | stale                                     | PID overwritten |
//! | empty / garbage  | zero-byte lock written by older tooling   | held, unknown   |
//!
//! A new lock file is prepared under a private name, locked and filled in
//! first, then hard-linked into place.  Other starters therefore never see a
//! lock file without a PID and an advisory lock on it.
//!
//! There is no waiting: contention is a hard stop.

use std::{
    fs::{self, File, OpenOptions, TryLockError},
    io::{self, Read, Seek, SeekFrom, Write},
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use thiserror::Error;

/// How often a starter retries when the file it locked was removed under it.
const ATTEMPTS: usize = 8;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock file already exists: {} (held by pid {pid})", path.display())]
    HeldBy { path: PathBuf, pid: u32 },

    #[error("lock file already exists: {} (owner unknown, remove it manually)", path.display())]
    HeldByUnknown { path: PathBuf },

    #[error("cannot access lock file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A held lock.  Dropping it gives up the advisory lock but leaves the file;
/// the cleanup stage calls [`Lock::release`] explicitly.
#[derive(Debug)]
pub struct Lock {
    path: PathBuf,
    /// Open for as long as the run lasts; closing it drops the advisory lock.
    _flock: File,
}

impl Lock {
    /// Take the lock at `path` for the current process.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        Self::acquire_as(path, std::process::id())
    }

    fn acquire_as(path: &Path, pid: u32) -> Result<Self, LockError> {
        for _ in 0..ATTEMPTS {
            if let Some(lock) = Self::try_acquire(path, pid)? {
                return Ok(lock);
            }
        }
        Err(LockError::HeldByUnknown {
            path: path.to_path_buf(),
        })
    }

    /// One attempt.  `Ok(None)` means the file changed under us; try again.
    fn try_acquire(path: &Path, pid: u32) -> Result<Option<Self>, LockError> {
        let io_err = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(file) = create_locked(path, pid).map_err(io_err)? {
            log::info!(target: "lock", "Lock file created: {}", path.display());
            return Ok(Some(Self {
                path: path.to_path_buf(),
                _flock: file,
            }));
        }

        let mut file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(e)),
        };

        match file.try_lock() {
            Ok(()) => {},
            Err(TryLockError::WouldBlock) => {
                let owner = read_owner(&mut file).map_err(io_err)?;
                return Err(held(path, owner));
            },
            Err(TryLockError::Error(e)) => return Err(io_err(e)),
        }

        // The previous owner may have removed the file between our open and
        // our lock.
        if !is_current(&file, path).map_err(io_err)? {
            return Ok(None);
        }

        match read_owner(&mut file).map_err(io_err)? {
            Some(owner) if is_alive(owner) => return Err(held(path, Some(owner))),
            Some(owner) => {
                log::warn!(
                    target: "lock",
                    "Taking over stale lock {} left by pid {owner}",
                    path.display()
                );
            },
            None => return Err(held(path, None)),
        }

        write_pid(&mut file, pid).map_err(io_err)?;
        Ok(Some(Self {
            path: path.to_path_buf(),
            _flock: file,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the lock file if it is still there.  Idempotent.
    ///
    /// The advisory lock is kept until the handle is dropped, so a starter
    /// that opened the file just before removal notices it is gone.
    pub fn release(&self) -> io::Result<()> {
        release(&self.path)
    }
}

/// Remove the lock file at `path` if present.
pub fn release(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            log::debug!(target: "lock", "Lock file removed: {}", path.display());
            Ok(())
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Create a locked file holding `pid` and link it to `path`.
///
/// Returns `Ok(None)` when `path` already exists.
fn create_locked(path: &Path, pid: u32) -> io::Result<Option<File>> {
    static SEQ: AtomicUsize = AtomicUsize::new(0);

    let name = path
        .file_name()
        .map_or_else(|| "lock".into(), |n| n.to_string_lossy().into_owned());
    let private = path.with_file_name(format!(
        ".{name}.{pid}.{}",
        SEQ.fetch_add(1, Ordering::Relaxed)
    ));

    let mut file = File::create(&private)?;
    let linked = file
        .try_lock()
        .map_err(io::Error::from)
        .and_then(|()| write_pid(&mut file, pid))
        .and_then(|()| fs::hard_link(&private, path));
    let _ = fs::remove_file(&private);

    match linked {
        Ok(()) => Ok(Some(file)),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(e),
    }
}

fn write_pid(file: &mut File, pid: u32) -> io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    write!(file, "{pid}")?;
    file.sync_all()
}

/// PID recorded in the lock file, if the content is one.
fn read_owner(file: &mut File) -> io::Result<Option<u32>> {
    let mut content = String::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_string(&mut content)?;
    Ok(content.trim().parse().ok())
}

/// Whether `path` still names the file behind `file`.
fn is_current(file: &File, path: &Path) -> io::Result<bool> {
    let held = file.metadata()?;
    match fs::metadata(path) {
        Ok(on_disk) => Ok(held.dev() == on_disk.dev() && held.ino() == on_disk.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn held(path: &Path, owner: Option<u32>) -> LockError {
    match owner {
        Some(pid) => LockError::HeldBy {
            path: path.to_path_buf(),
            pid,
        },
        None => LockError::HeldByUnknown {
            path: path.to_path_buf(),
        },
    }
}

/// Whether a process with `pid` currently exists.
#[cfg(target_os = "linux")]
fn is_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

/// Whether a process with `pid` currently exists.
#[cfg(not(target_os = "linux"))]
fn is_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        // If we cannot probe, assume the owner is alive.
        .map_or(true, |status| status.success())
}

// ─── Tests ────────────────────────────────────────────────────────────────────
