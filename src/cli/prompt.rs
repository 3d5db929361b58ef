use colored::Colorize;
use inquire::{Confirm, Select};

use crate::cli::output::format_date;
use crate::models::restore::{ConflictDecision, ConflictRecord};
use crate::restore::ConflictResolver;

const SHOWN_CONFLICTS: usize = 5;

const OVERWRITE: &str = "Overwrite (conflicting files are backed up first)";
const SKIP: &str = "Skip conflicting files";
const ABORT: &str = "Abort";

/// Asks on the terminal. Falls back to `Defer` when no terminal is attached.
pub struct TerminalResolver;

impl ConflictResolver for TerminalResolver {
    fn decide(&mut self, conflicts: &[ConflictRecord]) -> ConflictDecision {
        println!();
        println!(
            "{} {} local file(s) changed after this snapshot:",
            "!".yellow().bold(),
            conflicts.len()
        );
        for conflict in conflicts.iter().take(SHOWN_CONFLICTS) {
            println!(
                "  • {} (local {}, snapshot {})",
                conflict.path,
                format_date(conflict.local_modified),
                format_date(conflict.snapshot_date)
            );
        }
        if conflicts.len() > SHOWN_CONFLICTS {
            println!("  ... and {} more", conflicts.len() - SHOWN_CONFLICTS);
        }

        match Select::new("What now?", vec![OVERWRITE, SKIP, ABORT]).prompt() {
            Ok(choice) => decision_for(choice),
            Err(e) => {
                tracing::debug!(error = %e, "No interactive answer");
                ConflictDecision::Defer
            }
        }
    }
}

fn decision_for(choice: &str) -> ConflictDecision {
    match choice {
        OVERWRITE => ConflictDecision::Overwrite,
        SKIP => ConflictDecision::SkipConflicts,
        _ => ConflictDecision::Abort,
    }
}

/// Yes/no confirmation; anything but an explicit yes is a no.
pub fn confirm(question: &str) -> bool {
    Confirm::new(question)
        .with_default(false)
        .prompt()
        .unwrap_or(false)
}
