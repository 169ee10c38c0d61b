//! Command argument construction helpers.
//!
//! This module is responsible for *building* the argument lists passed to the
//! external tools.  It does **not** execute anything; execution lives in
//! [`crate::process`].  Every function here is pure and unit-testable without
//! `pg_dump`, `gpg` or `s3cmd` installed.
//!
//! Arguments are kept as separate vector elements all the way to `execve`, so
//! a database name like `x; rm -rf /` stays one harmless argument.

use std::path::Path;

use crate::config::Settings;

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Connection flags shared by `pg_dump` and `pg_dumpall`.
fn pg_connection(settings: &Settings) -> [String; 4] {
    [
        "-p".into(),
        settings.port.to_string(),
        "-U".into(),
        settings.user.clone(),
    ]
}

// ─── postgres ─────────────────────────────────────────────────────────────────

/// `pg_dump -p <port> -U <user> -v -Fc <tokens…>`
///
/// `tokens` is the whole line from the database list, so extra `pg_dump`
/// options written before the database name are passed through.
pub fn pg_dump(settings: &Settings, tokens: &[String]) -> Vec<String> {
    let mut cmd = vec![path_arg(&settings.pg_dump)];
    cmd.extend(pg_connection(settings));
    cmd.extend(["-v".into(), "-Fc".into()]);
    cmd.extend(tokens.iter().cloned());
    cmd
}

/// `pg_dumpall -p <port> -U <user> -g` (roles and tablespaces only).
pub fn pg_dumpall_globals(settings: &Settings) -> Vec<String> {
    let mut cmd = vec![path_arg(&settings.pg_dumpall)];
    cmd.extend(pg_connection(settings));
    cmd.push("-g".into());
    cmd
}

// ─── gpg ──────────────────────────────────────────────────────────────────────

/// `gpg --homedir <dir> --version`, used to probe the encryption setup.
pub fn gpg_version(settings: &Settings) -> Vec<String> {
    vec![
        path_arg(&settings.gpg),
        "--homedir".into(),
        path_arg(&settings.gnupg_home),
        "--version".into(),
    ]
}

/// `gpg --homedir <dir> --batch --no-tty --yes [--trust-model always]
/// --recipient <r> --output <out> --encrypt <in>`
pub fn gpg_encrypt(settings: &Settings, input: &Path, output: &Path) -> Vec<String> {
    let mut cmd = vec![
        path_arg(&settings.gpg),
        "--homedir".into(),
        path_arg(&settings.gnupg_home),
        "--batch".into(),
        "--no-tty".into(),
        "--yes".into(),
    ];
    if settings.always_trust {
        cmd.extend(["--trust-model".into(), "always".into()]);
    }
    cmd.extend([
        "--recipient".into(),
        settings.recipient.clone(),
        "--output".into(),
        path_arg(output),
        "--encrypt".into(),
        path_arg(input),
    ]);
    cmd
}

// ─── s3cmd ────────────────────────────────────────────────────────────────────

/// `s3cmd put <file> <bucket>/`
pub fn s3_put(settings: &Settings, file: &Path) -> Vec<String> {
    vec![
        path_arg(&settings.s3cmd),
        "put".into(),
        path_arg(file),
        settings.bucket.clone(),
    ]
}

/// `s3cmd ls <bucket>/`
pub fn s3_ls(settings: &Settings) -> Vec<String> {
    vec![
        path_arg(&settings.s3cmd),
        "ls".into(),
        settings.bucket.clone(),
    ]
}

// ─── Tests ────────────────────────────────────────────────────────────────────
