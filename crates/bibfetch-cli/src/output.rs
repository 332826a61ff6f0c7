use std::io::Write;
use std::path::Path;
use std::time::Duration;

use bibfetch_core::{
    DedupPlan, DownloadAttemptResult, ProgressEvent, ReferenceRecord, ResolutionTarget, RunSummary,
    StrategyHint,
};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

fn shorten(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
}

/// Live progress: a status spinner plus one line per finished reference.
pub struct ProgressView {
    spinner: ProgressBar,
    color: ColorMode,
}

impl ProgressView {
    pub fn new(color: ColorMode) -> Self {
        let spinner = ProgressBar::with_draw_target(None, ProgressDrawTarget::stdout());
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(style);
        }
        spinner.enable_steady_tick(Duration::from_millis(120));
        Self { spinner, color }
    }

    /// Print a line above the spinner, even when the spinner itself is hidden.
    pub fn line(&self, text: impl std::fmt::Display) {
        self.spinner.suspend(|| println!("{}", text));
    }

    pub fn finish(&self) {
        self.spinner.finish_and_clear();
    }

    pub fn handle(&self, event: &ProgressEvent) {
        let color = self.color;
        match event {
            ProgressEvent::Parsed { total, unique } => {
                self.line(format!("Found {} references ({} unique)", total, unique));
            }
            ProgressEvent::PhaseStarted { phase, count } => {
                let header = format!("== {} ({}) ==", phase, count);
                if color.enabled() {
                    self.line(header.bold());
                } else {
                    self.line(header);
                }
            }
            ProgressEvent::Processing {
                index,
                total,
                summary,
                ..
            } => {
                self.spinner
                    .set_message(format!("[{}/{}] {}", index, total, shorten(summary, 60)));
            }
            ProgressEvent::Status { index, message } => {
                self.spinner.set_message(format!("[{}] {}", index, message));
            }
            ProgressEvent::ChallengeDetected { index, message } => {
                let text = format!(
                    "[{}] Verification challenge: {}. Waiting for it to clear (press Enter to re-check).",
                    index, message
                );
                if color.enabled() {
                    self.line(text.yellow());
                } else {
                    self.line(text);
                }
            }
            ProgressEvent::Result {
                index,
                total,
                result,
            } => self.line(result_line(*index, *total, result, color)),
            ProgressEvent::Duplicate { index, of } => {
                let text = format!("[{}] duplicate of [{}], will share its result", index, of);
                if color.enabled() {
                    self.line(text.dimmed());
                } else {
                    self.line(text);
                }
            }
        }
    }
}

fn result_line(index: usize, total: usize, result: &DownloadAttemptResult, color: ColorMode) -> String {
    if result.success {
        let name = result.used_filename.as_deref().unwrap_or("");
        if color.enabled() {
            format!("[{}/{}] -> {} {}", index, total, "SAVED".green(), name)
        } else {
            format!("[{}/{}] -> SAVED {}", index, total, name)
        }
    } else if color.enabled() {
        format!("[{}/{}] -> {} {}", index, total, "FAILED".red(), result.message)
    } else {
        format!("[{}/{}] -> FAILED {}", index, total, result.message)
    }
}

/// Print what a run would do without touching the network.
pub fn print_dry_run(
    w: &mut dyn Write,
    records: &[ReferenceRecord],
    plan: &DedupPlan,
    targets: &[ResolutionTarget],
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(
            w,
            "{} {} references ({} unique)\n",
            "DRY RUN:".bold().cyan(),
            records.len(),
            plan.unique_count()
        )?;
    } else {
        writeln!(
            w,
            "DRY RUN: {} references ({} unique)\n",
            records.len(),
            plan.unique_count()
        )?;
    }

    for (i, record) in records.iter().enumerate() {
        let text = shorten(&record.stripped_text, 200);
        if color.enabled() {
            writeln!(w, "{} {}", format!("[{}]", record.index).bold(), text)?;
        } else {
            writeln!(w, "[{}] {}", record.index, text)?;
        }
        if let Some(sig) = plan.signatures.get(i) {
            writeln!(w, "     Signature: {}", sig)?;
        }
        if let Some(of) = plan.original_of(record.index) {
            writeln!(w, "     Duplicate of [{}]", of)?;
            continue;
        }
        if let Some(target) = targets.get(i) {
            match target.strategy_hint {
                StrategyHint::DirectUrl => writeln!(w, "     Open:      {}", target.query_or_url)?,
                StrategyHint::SearchQuery => writeln!(w, "     Search:    {}", target.query_or_url)?,
            }
            if let Some(ref title) = target.derived_title {
                writeln!(w, "     Title:     {}", title)?;
            }
        }
        writeln!(w)?;
    }
    Ok(())
}

/// Final tallies, artifacts and the list of what is still missing.
pub fn print_summary(
    w: &mut dyn Write,
    summary: &RunSummary,
    destination: &Path,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w)?;
    if color.enabled() {
        writeln!(w, "{}", "Summary".bold())?;
    } else {
        writeln!(w, "Summary")?;
    }
    writeln!(w, "  Downloaded:  {}", summary.unique_succeeded)?;
    writeln!(w, "  Missing:     {}", summary.unique_failed)?;
    writeln!(w, "  Duplicates:  {}", summary.duplicates)?;
    if summary.retried > 0 {
        writeln!(w, "  Retried:     {}", summary.retried)?;
    }
    if summary.manually_completed > 0 {
        writeln!(w, "  Manual:      {}", summary.manually_completed)?;
    }
    writeln!(w, "  Folder:      {}", destination.display())?;

    if let Some(ref path) = summary.merged_path {
        writeln!(w, "  Combined:    {}", path.display())?;
    } else if let Some(ref note) = summary.merge_note {
        if color.enabled() {
            writeln!(w, "  Combined:    {}", note.dimmed())?;
        } else {
            writeln!(w, "  Combined:    {}", note)?;
        }
    }
    if let Some(ref path) = summary.missing_report_path {
        writeln!(w, "  Report:      {}", path.display())?;
    }

    let failures: Vec<&DownloadAttemptResult> = summary
        .results
        .iter()
        .filter(|r| !r.success && r.duplicate_of.is_none())
        .collect();
    if !failures.is_empty() {
        writeln!(w)?;
        for r in failures {
            if color.enabled() {
                writeln!(w, "  {} {}", format!("[{}]", r.reference_index).red(), r.message)?;
            } else {
                writeln!(w, "  [{}] {}", r.reference_index, r.message)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn summary_lists_only_unique_failures() {
        let mut dup = DownloadAttemptResult::failed(3, "Skipped by user");
        dup.duplicate_of = Some(2);
        let summary = bibfetch_core::report::summarize(
            vec![
                DownloadAttemptResult::succeeded(1, "Downloaded a.pdf", PathBuf::from("/x/a.pdf")),
                DownloadAttemptResult::failed(2, "Skipped by user"),
                dup,
            ],
            0,
            0,
        );
        let mut out = Vec::new();
        print_summary(&mut out, &summary, Path::new("/x"), ColorMode(false)).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Downloaded:  1"));
        assert!(text.contains("Duplicates:  1"));
        assert!(text.contains("  [2] Skipped by user"));
        assert!(!text.contains("[3]"));
    }

    #[test]
    fn dry_run_marks_duplicates() {
        let text = "[1] Smith J. Title One. https://doi.org/10.1/abc\n[2] Again. doi:10.1/abc";
        let records = bibfetch_core::parse_references(text);
        let plan = DedupPlan::build(&records);
        let targets: Vec<_> = records.iter().map(bibfetch_core::build_target).collect();

        let mut out = Vec::new();
        print_dry_run(&mut out, &records, &plan, &targets, ColorMode(false)).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Signature: doi:10.1/abc"));
        assert!(text.contains("Open:      https://doi.org/10.1/abc"));
        assert!(text.contains("Duplicate of [1]"));
    }
}
