//! Run state models

use crate::core::{config::PipelineConfig, Chunk, ChunkLayout, ChunkPlan, Stage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Overall status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

/// Where a run currently is in its lifecycle
///
/// Runs only move forward: `Idle -> PreparingDirectories -> Splitting ->
/// Stage(0) -> .. -> Stage(n-1) -> Succeeded`, or into `Failed` from any
/// non-terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelinePhase {
    Idle,
    PreparingDirectories,
    Splitting,
    Stage(usize),
    Succeeded,
    Failed,
}

impl PipelinePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelinePhase::Succeeded | PipelinePhase::Failed)
    }

    /// Whether `next` is a legal transition from this phase
    pub fn can_advance_to(&self, next: PipelinePhase) -> bool {
        use PipelinePhase::*;
        match (*self, next) {
            (current, Failed) => !current.is_terminal(),
            (Idle, PreparingDirectories) => true,
            (PreparingDirectories, Splitting) => true,
            (Splitting, Stage(0)) => true,
            (Splitting, Succeeded) => true,
            (Stage(k), Stage(j)) => j == k + 1,
            (Stage(_), Succeeded) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelinePhase::Idle => write!(f, "idle"),
            PipelinePhase::PreparingDirectories => write!(f, "preparing directories"),
            PipelinePhase::Splitting => write!(f, "splitting"),
            PipelinePhase::Stage(k) => write!(f, "stage {}", k),
            PipelinePhase::Succeeded => write!(f, "succeeded"),
            PipelinePhase::Failed => write!(f, "failed"),
        }
    }
}

/// Wall-clock time spent in one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageTiming {
    pub ordinal: usize,
    pub name: String,
    #[serde(serialize_with = "serialize_millis", rename = "elapsed_ms")]
    pub elapsed: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// State of a single pipeline invocation
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub config: PipelineConfig,
    pub stages: Vec<Stage>,
    /// Plan the raw chunks were written from; unset when an earlier split was reused
    pub plan: Option<ChunkPlan>,
    /// True when existing raw chunk files were reused instead of splitting
    pub split_reused: bool,
    pub chunks: Vec<Chunk>,
    pub phase: PipelinePhase,
    pub status: RunStatus,
    pub stage_timings: Vec<StageTiming>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Phase that was active when the run failed
    pub failed_phase: Option<PipelinePhase>,
    pub failure: Option<String>,
}

impl PipelineRun {
    pub fn new(config: PipelineConfig, stages: Vec<Stage>) -> Self {
        let chunks = ChunkLayout::new(&config.working_directory).chunks(config.chunk_count);
        Self {
            run_id: Uuid::new_v4(),
            config,
            stages,
            plan: None,
            split_reused: false,
            chunks,
            phase: PipelinePhase::Idle,
            status: RunStatus::Running,
            stage_timings: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
            failed_phase: None,
            failure: None,
        }
    }

    pub fn layout(&self) -> ChunkLayout {
        ChunkLayout::new(&self.config.working_directory)
    }

    /// Move to `next`, returning false if the transition is not allowed
    #[must_use]
    pub fn advance(&mut self, next: PipelinePhase) -> bool {
        if !self.phase.can_advance_to(next) {
            return false;
        }
        self.phase = next;
        true
    }

    pub fn succeed(&mut self) {
        if self.advance(PipelinePhase::Succeeded) {
            self.status = RunStatus::Succeeded;
            self.completed_at = Some(Utc::now());
        }
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        let failed_in = self.phase;
        if self.advance(PipelinePhase::Failed) {
            self.status = RunStatus::Failed;
            self.failed_phase = Some(failed_in);
            self.failure = Some(reason.into());
            self.completed_at = Some(Utc::now());
        }
    }

    /// Sum of the recorded stage durations
    pub fn stages_elapsed(&self) -> Duration {
        self.stage_timings.iter().map(|t| t.elapsed).sum()
    }

    /// Wall-clock duration of the whole run so far
    pub fn total_elapsed(&self) -> Duration {
        let end = self.completed_at.unwrap_or_else(Utc::now);
        end.signed_duration_since(self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            status: self.status,
            phase: self.phase,
            failed_phase: self.failed_phase,
            failure: self.failure.clone(),
            chunk_count: self.config.chunk_count,
            total_lines: self.plan.as_ref().map(|p| p.total_lines),
            chunk_sizes: self.plan.as_ref().map(|p| p.sizes()),
            split_reused: self.split_reused,
            stage_timings: self.stage_timings.clone(),
            artifacts: self
                .chunks
                .iter()
                .map(|c| c.current_artifact().to_path_buf())
                .collect(),
            started_at: self.started_at,
            completed_at: self.completed_at,
            total_elapsed_ms: self.total_elapsed().as_millis() as u64,
        }
    }
}

/// Serializable snapshot of a run, printed with `--json`
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub phase: PipelinePhase,
    pub failed_phase: Option<PipelinePhase>,
    pub failure: Option<String>,
    pub chunk_count: usize,
    pub total_lines: Option<usize>,
    pub chunk_sizes: Option<Vec<usize>>,
    pub split_reused: bool,
    pub stage_timings: Vec<StageTiming>,
    /// Latest artifact of each chunk, in index order
    pub artifacts: Vec<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_elapsed_ms: u64,
}
