//! Terminal UI: spinners, stage banners, and the final summary.
//!
//! # Design goals
//!
//! - **Clean by default.** While a stage is running the user sees only a spinner and a short label.
//! - **Informative on failure.** A failed stage lists every failed item with its error, so the
//!   operator can tell which database was not backed up without digging through the log.
//! - **Testable without a terminal.** [`StageOutcome`] and [`ItemOutcome`] are plain data types
//!   built by the stages and only rendered here.

use std::{fmt::Display, time::Duration};

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

// ─── Icons ───────────────────────────────────────────────────────────────────

/// Braille spinner frames, as in indicatif's default.
static SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Green ✓ for a stage that succeeded.
fn icon_ok() -> console::StyledObject<&'static str> {
    style("✓").green().bold()
}
/// Red ✗ for a stage that failed.
fn icon_err() -> console::StyledObject<&'static str> {
    style("✗").red().bold()
}
/// Cyan ✓ next to the final success summary.
fn icon_done() -> console::StyledObject<&'static str> {
    style("✓").cyan().bold()
}

// ─── Stage result ─────────────────────────────────────────────────────────────

/// Result of one unit of work inside a stage (one database, one file).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub name: String,
    pub error: Option<String>,
}

impl ItemOutcome {
    pub const fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// The outcome of a single pipeline stage.
///
/// A stage fails as a whole (`error` is set, e.g. the database list could not
/// be read) or item by item.  Either way the next stage still runs.
#[derive(Debug)]
pub struct StageOutcome {
    /// Human-readable stage label, e.g. `"Dump"`.
    pub label: String,
    pub items: Vec<ItemOutcome>,
    /// Stage-level failure that prevented some or all items from running.
    pub error: Option<String>,
}

impl StageOutcome {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            items: Vec::new(),
            error: None,
        }
    }

    pub fn item_ok(&mut self, name: impl Into<String>) {
        self.items.push(ItemOutcome {
            name: name.into(),
            error: None,
        });
    }

    pub fn item_failed(&mut self, name: impl Into<String>, error: impl Display) {
        self.items.push(ItemOutcome {
            name: name.into(),
            error: Some(error.to_string()),
        });
    }

    /// Mark the whole stage as failed.
    pub fn fail(&mut self, error: impl Display) {
        self.error = Some(error.to_string());
    }

    /// Returns `true` if the stage or any of its items failed.
    pub fn failed(&self) -> bool {
        self.error.is_some() || self.items.iter().any(ItemOutcome::failed)
    }

    pub fn failed_items(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.items.iter().filter(|i| i.failed())
    }

    /// Print the one-line summary (✓/✗ + label) to stdout, followed by the
    /// stage error and failed items on stderr.
    pub fn print(&self) {
        let done = self.items.iter().filter(|i| !i.failed()).count();
        let counts = if self.items.is_empty() {
            String::new()
        } else {
            format!(" {}", style(format!("({done}/{})", self.items.len())).dim())
        };

        if !self.failed() {
            println!("  {}  {}{counts}", icon_ok(), style(&self.label).bold());
            return;
        }

        println!("  {}  {}{counts}", icon_err(), style(&self.label).bold());
        if let Some(ref msg) = self.error {
            eprintln!("  {} {}", style("Error:").red().bold(), msg);
        }
        for item in self.failed_items() {
            eprintln!(
                "    {} {}: {}",
                style("►").dim(),
                item.name,
                item.error.as_deref().unwrap_or_default()
            );
        }
    }
}

// ─── Spinner ──────────────────────────────────────────────────────────────────

/// Create and start an indeterminate spinner for `label`.
///
/// The spinner ticks at ~80 ms and is cleared by
/// [`ProgressBar::finish_and_clear`].  indicatif hides it when stderr is not a
/// terminal (cron, tests).
fn make_spinner(label: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::with_template("  {spinner:.cyan}  {msg}") {
        pb.set_style(spinner_style.tick_chars(SPINNER_CHARS));
    }
    pb.set_message(format!("{}", style(label).dim()));
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Run a stage behind a spinner, then print its outcome line.
pub fn run_stage(label: &str, stage: impl FnOnce() -> StageOutcome) -> StageOutcome {
    let spinner = make_spinner(label);
    let outcome = stage();
    spinner.finish_and_clear();
    outcome.print();
    outcome
}

// ─── Summary banner ───────────────────────────────────────────────────────────

/// Print the final summary after all stages have run.
pub fn print_summary(hostname: &str, outcomes: &[StageOutcome]) {
    let failed: Vec<&StageOutcome> = outcomes.iter().filter(|o| o.failed()).collect();
    println!();
    if failed.is_empty() {
        println!(
            "  {} {}",
            icon_done(),
            style(format!("Backup of {hostname} completed successfully.")).cyan().bold()
        );
    } else {
        eprintln!(
            "  {}  {}",
            icon_err(),
            style(format!("Backup of {hostname} finished with failures.")).red().bold()
        );
        for o in &failed {
            eprintln!("    {} {}", icon_err(), style(&o.label).red());
        }
    }
    println!();
}

// ─── Tests ────────────────────────────────────────────────────────────────────
