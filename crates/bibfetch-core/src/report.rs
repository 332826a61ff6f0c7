//! Turning per-reference results into a run summary and on-disk artifacts.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::files::unique_path;
use crate::merge::merge_pdfs;
use crate::{Config, DownloadAttemptResult, ReferenceRecord, RunSummary};

pub const MERGED_FILE_NAME: &str = "combined_references.pdf";
pub const MISSING_REPORT_NAME: &str = "missing_pdfs.txt";

/// Tally a complete, index-ordered result list.
///
/// Pure: the same inputs always give the same summary. Duplicates are counted
/// on their own and never contribute to the unique tallies.
pub fn summarize(
    results: Vec<DownloadAttemptResult>,
    retried: usize,
    manually_completed: usize,
) -> RunSummary {
    let mut summary = RunSummary {
        retried,
        manually_completed,
        ..RunSummary::default()
    };
    for r in &results {
        match (r.duplicate_of.is_some(), r.success) {
            (true, _) => summary.duplicates += 1,
            (false, true) => summary.unique_succeeded += 1,
            (false, false) => summary.unique_failed += 1,
        }
    }
    summary.results = results;
    summary
}

/// Successful files in reference order, each path once.
pub fn successful_files(summary: &RunSummary) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    summary
        .results
        .iter()
        .filter(|r| r.success)
        .filter_map(|r| r.file_path.clone())
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

/// Plain-text list of unique failures with their final message.
pub fn render_missing_report(summary: &RunSummary, records: &[ReferenceRecord]) -> String {
    let mut out = format!(
        "Missing PDFs ({} of {} references)\n",
        summary.unique_failed,
        summary.results.len()
    );
    out.push_str(&"=".repeat(40));
    out.push('\n');

    let failures = summary
        .results
        .iter()
        .filter(|r| !r.success && r.duplicate_of.is_none());
    for (n, result) in failures.enumerate() {
        let text = records
            .iter()
            .find(|rec| rec.index == result.reference_index)
            .map(|rec| rec.stripped_text.as_str())
            .unwrap_or("");
        out.push_str(&format!("\n{}. [{}] {}\n", n + 1, result.reference_index, text));
        out.push_str(&format!("   Reason: {}\n", result.message));
    }
    out
}

pub fn write_missing_report(path: &Path, content: &str) -> Result<(), String> {
    let mut file =
        std::fs::File::create(path).map_err(|e| format!("Failed to create file: {}", e))?;
    file.write_all(content.as_bytes())
        .map_err(|e| format!("Failed to write: {}", e))?;
    Ok(())
}

/// Produce the combined PDF and the missing report in `config.destination_dir`.
///
/// Neither step can fail the run: a merge problem becomes `merge_note`, a
/// report that could not be written is logged and left out of the summary.
pub fn finalize(summary: &mut RunSummary, records: &[ReferenceRecord], config: &Config) {
    let dest = &config.destination_dir;

    if config.merge_pdfs {
        let files = successful_files(summary);
        if files.is_empty() {
            summary.merge_note = Some("No PDFs were downloaded, nothing to combine".into());
        } else {
            let target = unique_path(dest, MERGED_FILE_NAME);
            match merge_pdfs(&files, &target) {
                Ok(_) => summary.merged_path = Some(target),
                Err(e) => {
                    tracing::warn!(error = %e, "combined PDF skipped");
                    summary.merge_note = Some(e);
                }
            }
        }
    }

    if config.write_missing_report && summary.unique_failed > 0 {
        let path = dest.join(MISSING_REPORT_NAME);
        let content = render_missing_report(summary, records);
        match write_missing_report(&path, &content) {
            Ok(()) => {
                tracing::info!(path = %path.display(), failures = summary.unique_failed, "missing report written");
                summary.missing_report_path = Some(path);
            }
            Err(e) => tracing::warn!(error = %e, "could not write missing report"),
        }
    }
}
