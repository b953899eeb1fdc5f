//! Terminal output for the `docflow` binary.
//!
//! All user-facing text goes through [`OutputFormatter`] so the styling stays
//! consistent: colored outcome lines, a progress bar while a batch runs, and
//! a category summary table at the end.

use crate::sorter::{BatchSummary, Route, SortOutcome};
use crate::undo::UndoReport;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

const PROGRESS_TEMPLATE: &str = "{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}";

/// Manages all CLI output with consistent styling.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// ```no_run
    /// use docflow::output::OutputFormatter;
    /// OutputFormatter::success("Sorting complete");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red to stderr.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {message}").yellow());
    }

    /// Creates the batch progress bar.
    ///
    /// Falls back to the stock bar style if the template is rejected.
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template(PROGRESS_TEMPLATE)
            .map(|s| s.progress_chars("█▓░"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb
    }

    /// One line describing where a file ended up.
    pub fn outcome_line(outcome: &SortOutcome, destination_root: &Path) -> String {
        match outcome {
            SortOutcome::Moved {
                source,
                destination,
                route,
                ..
            } => format!(
                "{} {} → {}{}",
                "✓".green(),
                file_name(source),
                relative(destination, destination_root),
                route_note(*route)
            ),
            SortOutcome::Planned {
                source,
                destination,
                route,
                ..
            } => format!(
                "{} {} would move to {}{}",
                "→".cyan(),
                file_name(source),
                relative(destination, destination_root),
                route_note(*route)
            ),
            SortOutcome::Skipped { source, reason } => format!(
                "{} {} skipped: {}",
                "-".dimmed(),
                file_name(source),
                reason.dimmed()
            ),
            SortOutcome::Failed { source, error } => {
                format!("{} {}: {}", "✗".red(), file_name(source), error.red())
            }
        }
    }

    /// Prints the per-category table and the outcome totals.
    pub fn summary_table(summary: &BatchSummary, dry_run: bool) {
        Self::header(if dry_run { "DRY RUN SUMMARY" } else { "SUMMARY" });

        let width = summary
            .by_category
            .keys()
            .map(|name| name.len())
            .max()
            .unwrap_or(0)
            .max(8);

        println!(
            "{:<width$} | {}",
            "Category".bold(),
            "Files".bold(),
            width = width
        );
        println!("{}", "-".repeat(width + 10));
        for (category, count) in &summary.by_category {
            println!(
                "{:<width$} | {} {}",
                category,
                count.to_string().green(),
                plural(*count),
                width = width
            );
        }
        println!("{}", "-".repeat(width + 10));

        let placed = summary.moved + summary.planned;
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            placed.to_string().green().bold(),
            plural(placed),
            width = width
        );
        if summary.skipped > 0 {
            println!("{:<width$} | {}", "Skipped", summary.skipped, width = width);
        }
        if summary.failed > 0 {
            println!(
                "{:<width$} | {}",
                "Failed",
                summary.failed.to_string().red(),
                width = width
            );
        }
        if summary.unreadable > 0 {
            println!(
                "{:<width$} | {} (could not be listed)",
                "Unreadable",
                summary.unreadable.to_string().yellow(),
                width = width
            );
        }
    }

    pub fn undo_report(report: &UndoReport) {
        Self::success(&format!("Restored {} {}", report.restored_files, plural(report.restored_files)));

        if !report.skipped_files.is_empty() {
            Self::warning(&format!("Skipped: {}", report.skipped_files.len()));
            for (path, reason) in &report.skipped_files {
                println!("    - {}: {}", path.display(), reason);
            }
        }

        if !report.failed_restores.is_empty() {
            Self::error(&format!("Failed: {}", report.failed_restores.len()));
            for (path, reason) in &report.failed_restores {
                eprintln!("    - {}: {}", path.display(), reason);
            }
            Self::warning("History was kept; fix the issues above and run --undo again.");
        }
    }
}

fn route_note(route: Route) -> String {
    match route {
        Route::Rule(_) => String::new(),
        Route::Content => " (by content)".dimmed().to_string(),
        Route::ContentFallback => " (classifier unavailable)".yellow().to_string(),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}
