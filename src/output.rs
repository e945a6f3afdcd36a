//! Terminal presentation for the CLI.
//!
//! Status lines, the bulk-sort progress bar, and per-category tables all go
//! through [`OutputFormatter`] so the commands share one look.

use crate::scanner::ScanSummary;
use crate::sorter::SortOutcome;
use crate::stats::{CategoryTotals, StatsSummary};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;

/// The kind of status line being printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Done,
    Failed,
    Attention,
    Note,
}

impl Tone {
    fn mark(self) -> ColoredString {
        match self {
            Tone::Done => "✓".green(),
            Tone::Failed => "✗".red(),
            Tone::Attention => "⚠".yellow(),
            Tone::Note => "•".cyan(),
        }
    }
}

pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints `message` prefixed with the tone's mark. Failures go to stderr.
    pub fn status(tone: Tone, message: &str) {
        match tone {
            Tone::Failed => eprintln!("{} {}", tone.mark(), message),
            _ => println!("{} {}", tone.mark(), message),
        }
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    /// Progress bar for a bulk sort of `total` files. The current file name is
    /// shown as the message.
    pub fn sort_progress(total: u64) -> ProgressBar {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░");
        let bar = ProgressBar::new(total);
        bar.set_style(style);
        bar
    }

    /// One line describing what happened to a file.
    pub fn outcome_line(outcome: &SortOutcome) -> String {
        let name = outcome
            .original_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| outcome.original_path.display().to_string());

        if outcome.success {
            let destination = outcome
                .destination_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            format!("{} {} → {}", Tone::Done.mark(), name, destination)
        } else if outcome.skipped {
            format!("{} {} (gone)", "-".dimmed(), name)
        } else {
            format!(
                "{} {}: {}",
                Tone::Failed.mark(),
                name,
                outcome.error_detail.as_deref().unwrap_or("unknown error")
            )
        }
    }

    /// Prints files and bytes per category followed by a total row.
    pub fn category_table(title: &str, rows: &BTreeMap<String, CategoryTotals>) {
        println!("\n{}", title.bold());

        let label_width = rows.keys().map(String::len).chain([8]).max().unwrap_or(8);
        let rule = "─".repeat(label_width + 24);

        println!("{:<label_width$}  {:>6}  {:>12}", "Category", "Files", "Size");
        println!("{}", rule.dimmed());

        let mut total = CategoryTotals::default();
        for (label, totals) in rows {
            total.files += totals.files;
            total.bytes += totals.bytes;
            println!(
                "{:<label_width$}  {:>6}  {:>12}",
                label,
                totals.files.to_string().green(),
                format_bytes(totals.bytes)
            );
        }

        println!("{}", rule.dimmed());
        println!(
            "{:<label_width$}  {:>6}  {:>12}",
            "Total".bold(),
            total.files.to_string().green().bold(),
            format_bytes(total.bytes)
        );
    }

    /// Prints the result of a bulk sort.
    pub fn scan_summary(summary: &ScanSummary) {
        let line = format!(
            "{} sorted, {} failed, {} skipped",
            summary.success, summary.errors, summary.skipped
        );
        let tone = if summary.errors == 0 { Tone::Done } else { Tone::Attention };
        Self::status(tone, &line);
    }

    /// Prints lifetime statistics and the latest moves.
    pub fn stats_summary(stats: &StatsSummary) {
        Self::category_table("SORTED SO FAR", &stats.by_category);

        if !stats.recent.is_empty() {
            println!("\n{}", "RECENT".bold());
            for outcome in &stats.recent {
                println!(
                    "{}  {}",
                    outcome.sorted_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
                    Self::outcome_line(outcome)
                );
            }
        }
    }
}

/// Formats a byte count with a binary unit, e.g. `1.5 KiB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn test_outcome_line_mentions_file_name() {
        colored::control::set_override(false);
        let outcome = SortOutcome {
            original_path: PathBuf::from("/dl/report.pdf"),
            destination_path: None,
            category: "Documents".to_string(),
            success: false,
            skipped: false,
            error_detail: Some("permission denied".to_string()),
            size_bytes: 0,
            sorted_at: Utc::now(),
        };
        assert_eq!(
            OutputFormatter::outcome_line(&outcome),
            "✗ report.pdf: permission denied"
        );
    }
}
