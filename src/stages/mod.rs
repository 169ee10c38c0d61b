//! Pipeline stages.
//!
//! Each stage takes the resolved [`Settings`](crate::config::Settings) and the
//! [`RunContext`](crate::artifact::RunContext) and returns a
//! [`StageOutcome`](crate::ui::StageOutcome).  Stages never return errors:
//! whatever goes wrong is recorded in the outcome and the pipeline moves on.
//!
//! | File          | Stage(s)                  | Failure scope               |
//! |---------------|---------------------------|-----------------------------|
//! | `dump.rs`     | Dump, Dumpall             | per database                |
//! | `encrypt.rs`  | Encrypt                   | stage (context), per file   |
//! | `upload.rs`   | Upload                    | per file                    |
//! | `archive.rs`  | Move, Move-Dumpall        | per database                |
//! | `cleanup.rs`  | Cleanup                   | per file, never fatal       |

pub mod archive;
pub mod cleanup;
pub mod dump;
pub mod encrypt;
pub mod upload;
