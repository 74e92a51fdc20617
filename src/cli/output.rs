//! CLI output formatting

use crate::{core::RunStatus, execution::ExecutionEvent};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a progress bar counting finished chunks of a stage
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks {msg}")
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a run status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::Running => style("RUNNING").yellow().to_string(),
        RunStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        RunStatus::Failed => style("FAILED").red().to_string(),
    }
}

/// Format a duration as seconds with two decimals
pub fn format_duration(duration: Duration) -> String {
    format!("{:.2} s", duration.as_secs_f64())
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            run_id,
            chunk_count,
            stage_count,
        } => format!(
            "{} Starting run {} ({} chunks, {} stages)",
            ROCKET,
            style(&run_id.to_string()[..8]).dim(),
            style(chunk_count).cyan(),
            style(stage_count).cyan()
        ),
        ExecutionEvent::DirectoriesPrepared { directories } => format!(
            "{} Prepared {} chunk directories",
            INFO,
            style(directories.len()).cyan()
        ),
        ExecutionEvent::SplitCompleted {
            total_lines,
            chunk_sizes,
        } => format!(
            "{} Split {} lines into chunks of {:?}",
            CHECK,
            style(total_lines).cyan(),
            chunk_sizes
        ),
        ExecutionEvent::SplitSkipped { existing } => format!(
            "{} Found {} existing chunk file(s), reusing previous split",
            WARN,
            style(existing.len()).yellow()
        ),
        ExecutionEvent::StageStarted {
            ordinal,
            name,
            chunk_count,
        } => format!(
            "{} Executing stage {} {} on {} chunks ...",
            SPINNER,
            ordinal,
            style(name).cyan(),
            chunk_count
        ),
        ExecutionEvent::ChunkCompleted {
            chunk,
            lines_read,
            lines_written,
            elapsed,
            ..
        } => format!(
            "  {} chunk {}: {} -> {} lines ({})",
            CHECK,
            chunk,
            lines_read,
            lines_written,
            style(format_duration(*elapsed)).dim()
        ),
        ExecutionEvent::ChunkFailed { chunk, error, .. } => format!(
            "  {} chunk {}: {}",
            CROSS,
            style(chunk).red(),
            style(error).dim()
        ),
        ExecutionEvent::StageCompleted {
            ordinal,
            name,
            elapsed,
        } => format!(
            "{} Completed stage {} {} in {}",
            CHECK,
            ordinal,
            style(name).green(),
            format_duration(*elapsed)
        ),
        ExecutionEvent::StageFailed {
            ordinal,
            name,
            failed_chunks,
        } => format!(
            "{} Could not complete stage {} {}: chunk(s) {:?} failed",
            CROSS,
            ordinal,
            style(name).red(),
            failed_chunks
        ),
        ExecutionEvent::PipelineCompleted {
            run_id,
            status,
            elapsed,
        } => format!(
            "{} Run ({}) {} in {}",
            INFO,
            style(&run_id.to_string()[..8]).dim(),
            format_status(*status),
            format_duration(*elapsed)
        ),
    }
}
