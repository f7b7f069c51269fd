//! Run summaries.

use crate::sync::classify::SkipReason;
use std::fmt;

/// Final state of one file in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Catalog data fetched and the bundle written.
    Processed,
    /// The stored record is as new as the catalog's.
    UpToDate,
    Skipped(SkipReason),
    /// The catalog does not know this file.
    Missing { status: u16 },
    /// Page re-rendered from the stored record.
    HtmlOnly,
    Errored(String),
}

/// Counts per outcome plus the names needing follow-up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub processed: usize,
    pub up_to_date: usize,
    pub skipped: usize,
    pub missing: usize,
    pub html_only: usize,
    pub errored: usize,
    pub missing_files: Vec<String>,
    /// File name and error message.
    pub errored_files: Vec<(String, String)>,
    /// The run stopped early on a cancellation request.
    pub cancelled: bool,
}

impl SyncReport {
    pub fn record(&mut self, file_name: &str, outcome: &Outcome) {
        match outcome {
            Outcome::Processed => self.processed += 1,
            Outcome::UpToDate => self.up_to_date += 1,
            Outcome::Skipped(_) => self.skipped += 1,
            Outcome::Missing { .. } => {
                self.missing += 1;
                self.missing_files.push(file_name.to_string());
            }
            Outcome::HtmlOnly => self.html_only += 1,
            Outcome::Errored(message) => {
                self.errored += 1;
                self.errored_files
                    .push((file_name.to_string(), message.clone()));
            }
        }
    }

    /// Number of files that reached a final outcome.
    pub fn total(&self) -> usize {
        self.processed + self.up_to_date + self.skipped + self.missing + self.html_only + self.errored
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Files handled: {}", self.total())?;
        writeln!(f, "  processed:  {}", self.processed)?;
        writeln!(f, "  up to date: {}", self.up_to_date)?;
        writeln!(f, "  skipped:    {}", self.skipped)?;
        writeln!(f, "  html only:  {}", self.html_only)?;
        writeln!(f, "  missing:    {}", self.missing)?;
        writeln!(f, "  errored:    {}", self.errored)?;
        if !self.missing_files.is_empty() {
            writeln!(f, "Not found in the catalog:")?;
            for name in &self.missing_files {
                writeln!(f, "  - {}", name)?;
            }
        }
        if !self.errored_files.is_empty() {
            writeln!(f, "Failed:")?;
            for (name, message) in &self.errored_files {
                writeln!(f, "  - {}: {}", name, message)?;
            }
        }
        if self.cancelled {
            writeln!(f, "Run cancelled before all files were handled")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts_and_names() {
        let mut report = SyncReport::default();
        report.record("a.safetensors", &Outcome::Processed);
        report.record("b.safetensors", &Outcome::Missing { status: 404 });
        report.record("c.safetensors", &Outcome::Errored("disk full".into()));
        report.record("d.safetensors", &Outcome::Skipped(SkipReason::AlreadyProcessed));

        assert_eq!(report.total(), 4);
        assert_eq!(report.missing_files, vec!["b.safetensors"]);
        let text = report.to_string();
        assert!(text.contains("  - c.safetensors: disk full"));
        assert!(text.contains("  - b.safetensors"));
    }
}
