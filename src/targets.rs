//! The two plain-text input files: the database list and the globals alias.
//!
//! ```text
//! # pg_dump.conf: last token of each line is the database name
//! app
//! -n public billing
//!
//! # pg_dumpall.conf: first non-blank line is the alias
//! main-cluster
//! ```
//!
//! Lines are not interpreted beyond whitespace splitting: there is no comment
//! syntax, every non-blank line is a database.
//!
//! Names become file and folder names under the output directory, so a name
//! that is `.`, `..` or contains a `/` is refused by [`check_name`].

use std::{
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ListError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} contains no alias", path.display())]
    NoAlias { path: PathBuf },

    #[error("`{name}` cannot be used as a file name")]
    UnsafeName { name: String },
}

/// Refuse names that would place artifacts outside the output directory.
pub fn check_name(name: &str) -> Result<(), ListError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        return Err(ListError::UnsafeName { name: name.into() });
    }
    Ok(())
}

/// One line of the database list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpTarget {
    /// Database name, used for every artifact name.
    pub name: String,
    /// All tokens of the line, passed to `pg_dump` as-is.
    pub tokens: Vec<String>,
}

impl DumpTarget {
    /// Parse one line; `None` for blank lines.
    pub fn parse(line: &str) -> Option<Self> {
        let tokens: Vec<String> = line.split_whitespace().map(String::from).collect();
        let name = tokens.last()?.clone();
        Some(Self { name, tokens })
    }
}

pub fn parse_databases(text: &str) -> Vec<DumpTarget> {
    text.lines().filter_map(DumpTarget::parse).collect()
}

fn read(path: &Path) -> Result<String, ListError> {
    std::fs::read_to_string(path).map_err(|source| ListError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Read and parse the database list at `path`.
pub fn read_databases(path: &Path) -> Result<Vec<DumpTarget>, ListError> {
    Ok(parse_databases(&read(path)?))
}

/// Read the globals alias: the first non-blank line, trimmed.
pub fn read_alias(path: &Path) -> Result<String, ListError> {
    let alias = read(path)?
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(String::from)
        .ok_or_else(|| ListError::NoAlias {
            path: path.to_path_buf(),
        })?;
    check_name(&alias)?;
    Ok(alias)
}
