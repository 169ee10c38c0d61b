//! `pg-backup init`: write a starter settings file.

use std::{
    fs::File,
    io::{self, Write},
    path::Path,
};

use anyhow::{Context, Result, bail};
use console::style;

/// Starter settings.  Values marked `CHANGE ME` have no usable default.
pub const TEMPLATE: &str = r#"# pg-backup settings
#
# Every value can be overridden on the command line, see `pg-backup --help`.

[general]
# hostname     = "db01"        # defaults to the machine name
databases_file = "/home/postgres/etc/pg_dump.conf"     # one database per line
globals_file   = "/home/postgres/etc/pg_dumpall.conf"  # cluster alias
lock_file      = "/var/tmp/postgres_dump.lock"
output_dir     = "/var/backups/postgres"              # CHANGE ME

[postgres]
pg_dump    = "pg_dump"
pg_dumpall = "pg_dumpall"
port       = 5432
user       = "postgres"

[gpg]
binary       = "gpg"
homedir      = "/home/postgres/.gnupg"
recipient    = "backups@example.com"                  # CHANGE ME
always_trust = false

[s3]
s3cmd             = "s3cmd"
bucket            = "s3://example-backups/postgres/"  # CHANGE ME
upload            = []      # empty = every database in databases_file
list_after_upload = true
"#;

/// Write [`TEMPLATE`] to `path`, refusing to overwrite an existing file.
pub fn run(path: &Path) -> Result<()> {
    let mut file = match File::create_new(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            bail!(
                "{} already exists, refusing to overwrite it",
                path.display()
            );
        },
        Err(e) => return Err(e).with_context(|| format!("creating {}", path.display())),
    };
    file.write_all(TEMPLATE.as_bytes())
        .with_context(|| format!("writing {}", path.display()))?;

    println!(
        "  {}  Wrote {}",
        style("✓").green().bold(),
        style(path.display()).bold()
    );
    println!("     Edit the values marked CHANGE ME before the first run.");
    Ok(())
}
