//! Child process execution.
//!
//! Every external tool is started from an argument vector built in
//! [`crate::runner`]; nothing goes through a shell, so database names and
//! paths reach the tool verbatim whatever characters they contain.
//!
//! Two flavours exist:
//!
//! - [`run_captured`] buffers stdout and stderr (gpg, s3cmd).
//! - [`run_redirected`] streams stdout and stderr into files (pg_dump,
//!   pg_dumpall), since dumps can be far larger than memory.

use std::{
    fs::{File, OpenOptions},
    io,
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Output, Stdio},
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("cannot run an empty command")]
    Empty,

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` exited with {status}{}", stderr_suffix(stderr))]
    Exit {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("cannot open {}: {source}", path.display())]
    Redirect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn stderr_suffix(stderr: &str) -> String {
    match stderr.trim().lines().last() {
        Some(line) if !line.is_empty() => format!(": {line}"),
        _ => String::new(),
    }
}

/// What a captured command printed.
#[derive(Debug, Default)]
pub struct Captured {
    pub stdout: String,
    pub stderr: String,
}

fn command_line(args: &[String]) -> String {
    args.join(" ")
}

fn command(args: &[String]) -> Result<Command, ProcessError> {
    let (prog, rest) = args.split_first().ok_or(ProcessError::Empty)?;
    let mut cmd = Command::new(prog);
    cmd.args(rest).stdin(Stdio::null());
    Ok(cmd)
}

/// Run a command, capturing both stdout and stderr.
///
/// A non-zero exit is an error carrying the captured stderr.
pub fn run_captured(args: &[String]) -> Result<Captured, ProcessError> {
    let mut cmd = command(args)?;
    log::debug!(target: "process", "Running: {}", command_line(args));

    let output: Output = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|source| ProcessError::Spawn {
            command: command_line(args),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(ProcessError::Exit {
            command: command_line(args),
            status: output.status,
            stderr,
        });
    }
    if !stderr.trim().is_empty() {
        log::debug!(target: "process", "{}", stderr.trim_end());
    }

    Ok(Captured { stdout, stderr })
}

/// Run a command with stdout truncated into `stdout` and stderr appended to
/// `stderr` (when given; otherwise stderr is discarded).
pub fn run_redirected(
    args: &[String],
    stdout: &Path,
    stderr: Option<&Path>,
) -> Result<(), ProcessError> {
    let mut cmd = command(args)?;

    let out = File::create(stdout).map_err(|source| ProcessError::Redirect {
        path: stdout.to_path_buf(),
        source,
    })?;
    let err = match stderr {
        Some(path) => Stdio::from(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| ProcessError::Redirect {
                    path: path.to_path_buf(),
                    source,
                })?,
        ),
        None => Stdio::null(),
    };

    log::debug!(
        target: "process",
        "Running: {} > {}",
        command_line(args),
        stdout.display()
    );
    let status = cmd
        .stdout(Stdio::from(out))
        .stderr(err)
        .status()
        .map_err(|source| ProcessError::Spawn {
            command: command_line(args),
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(ProcessError::Exit {
            command: command_line(args),
            status,
            stderr: String::new(),
        })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
