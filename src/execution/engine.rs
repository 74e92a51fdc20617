//! Pipeline controller - drives directory setup, splitting and stages

use crate::{
    core::{ChunkLayout, ChunkPlan, PipelinePhase, PipelineRun, RunStatus, StageTiming},
    error::{ChunkFailure, PipelineError},
    execution::{
        splitter::{count_lines, ChunkWriter, SplitOutcome},
        ChunkOutcome, StageExecutor,
    },
};
use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

/// Events that can occur during a pipeline run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        run_id: Uuid,
        chunk_count: usize,
        stage_count: usize,
    },
    DirectoriesPrepared {
        directories: Vec<PathBuf>,
    },
    SplitCompleted {
        total_lines: usize,
        chunk_sizes: Vec<usize>,
    },
    SplitSkipped {
        existing: Vec<PathBuf>,
    },
    StageStarted {
        ordinal: usize,
        name: String,
        chunk_count: usize,
    },
    ChunkCompleted {
        ordinal: usize,
        chunk: usize,
        lines_read: usize,
        lines_written: usize,
        elapsed: Duration,
    },
    ChunkFailed {
        ordinal: usize,
        chunk: usize,
        error: String,
    },
    StageCompleted {
        ordinal: usize,
        name: String,
        elapsed: Duration,
    },
    StageFailed {
        ordinal: usize,
        name: String,
        failed_chunks: Vec<usize>,
    },
    PipelineCompleted {
        run_id: Uuid,
        status: RunStatus,
        elapsed: Duration,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Drives a run through its phases
///
/// Stages run strictly in order; a stage only starts once every worker of
/// the previous stage has finished and all of them succeeded.
#[derive(Default)]
pub struct PipelineController {
    executor: StageExecutor,
    event_handlers: Vec<EventHandler>,
}

impl PipelineController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Execute the whole run, leaving its final state in `run`
    pub async fn execute(&self, run: &mut PipelineRun) -> Result<(), PipelineError> {
        info!(
            "Starting run {} with {} chunk(s) and {} stage(s)",
            run.run_id,
            run.config.chunk_count,
            run.stages.len()
        );
        self.emit_event(ExecutionEvent::PipelineStarted {
            run_id: run.run_id,
            chunk_count: run.config.chunk_count,
            stage_count: run.stages.len(),
        });

        let result = self.drive(run).await;

        match &result {
            Ok(()) => {
                run.succeed();
                info!(
                    "Completed all stages in {:.2} s",
                    run.stages_elapsed().as_secs_f64()
                );
            }
            Err(e) => {
                error!("Run failed during {}: {}", run.phase, e);
                run.fail(e.to_string());
            }
        }

        self.emit_event(ExecutionEvent::PipelineCompleted {
            run_id: run.run_id,
            status: run.status,
            elapsed: run.total_elapsed(),
        });

        result
    }

    async fn drive(&self, run: &mut PipelineRun) -> Result<(), PipelineError> {
        validate_stages(run)?;
        let layout = run.layout();

        enter(run, PipelinePhase::PreparingDirectories)?;
        let directories = prepare_directories(&layout, run.config.chunk_count).await?;
        self.emit_event(ExecutionEvent::DirectoriesPrepared { directories });

        enter(run, PipelinePhase::Splitting)?;
        let (plan, outcome) = split_input(run, layout).await?;
        match outcome {
            SplitOutcome::Written { .. } => {
                self.emit_event(ExecutionEvent::SplitCompleted {
                    total_lines: plan.total_lines,
                    chunk_sizes: plan.sizes(),
                });
                run.plan = Some(plan);
            }
            // Existing chunks came from an earlier input; the fresh plan does not describe them
            SplitOutcome::Skipped { existing, .. } => {
                self.emit_event(ExecutionEvent::SplitSkipped { existing });
                run.split_reused = true;
            }
        }

        let stages = run.stages.clone();
        for stage in &stages {
            enter(run, PipelinePhase::Stage(stage.ordinal))?;
            self.emit_event(ExecutionEvent::StageStarted {
                ordinal: stage.ordinal,
                name: stage.name.clone(),
                chunk_count: run.chunks.len(),
            });

            let report = self
                .executor
                .run_stage(stage, &run.chunks, |outcome| {
                    self.emit_event(chunk_event(stage.ordinal, outcome))
                })
                .await;

            run.stage_timings.push(StageTiming {
                ordinal: stage.ordinal,
                name: stage.name.clone(),
                elapsed: report.elapsed,
            });

            if !report.succeeded() {
                self.emit_event(ExecutionEvent::StageFailed {
                    ordinal: stage.ordinal,
                    name: stage.name.clone(),
                    failed_chunks: report.failed_chunks(),
                });
                let failures = report
                    .outcomes
                    .into_iter()
                    .filter_map(|outcome| match outcome {
                        ChunkOutcome::Failed { chunk, error } => Some(ChunkFailure { chunk, error }),
                        ChunkOutcome::Completed { .. } => None,
                    })
                    .collect();
                return Err(PipelineError::StageFailed {
                    ordinal: stage.ordinal,
                    stage: stage.name.clone(),
                    failures,
                });
            }

            for chunk in &mut run.chunks {
                chunk.advance(stage);
            }

            info!(
                "Completed stage {} ({}) in {:.2} s",
                stage.ordinal,
                stage.name,
                report.elapsed.as_secs_f64()
            );
            self.emit_event(ExecutionEvent::StageCompleted {
                ordinal: stage.ordinal,
                name: stage.name.clone(),
                elapsed: report.elapsed,
            });
        }

        Ok(())
    }
}

fn chunk_event(ordinal: usize, outcome: &ChunkOutcome) -> ExecutionEvent {
    match outcome {
        ChunkOutcome::Completed {
            chunk,
            lines_read,
            lines_written,
            elapsed,
            ..
        } => ExecutionEvent::ChunkCompleted {
            ordinal,
            chunk: *chunk,
            lines_read: *lines_read,
            lines_written: *lines_written,
            elapsed: *elapsed,
        },
        ChunkOutcome::Failed { chunk, error } => ExecutionEvent::ChunkFailed {
            ordinal,
            chunk: *chunk,
            error: error.to_string(),
        },
    }
}

fn enter(run: &mut PipelineRun, next: PipelinePhase) -> Result<(), PipelineError> {
    if run.advance(next) {
        Ok(())
    } else {
        Err(PipelineError::InvalidConfig(format!(
            "run {} cannot move from {} to {}",
            run.run_id, run.phase, next
        )))
    }
}

/// Stage ordinals must run 0..n in order and names must not collide on disk
fn validate_stages(run: &PipelineRun) -> Result<(), PipelineError> {
    let mut names = HashSet::new();
    for (position, stage) in run.stages.iter().enumerate() {
        if stage.ordinal != position {
            return Err(PipelineError::InvalidConfig(format!(
                "stage '{}' has ordinal {} but is at position {}",
                stage.name, stage.ordinal, position
            )));
        }
        if !names.insert(stage.name.as_str()) {
            return Err(PipelineError::InvalidConfig(format!(
                "duplicate stage name '{}'",
                stage.name
            )));
        }
    }
    Ok(())
}

/// Create (or verify) one directory per chunk
pub async fn prepare_directories(
    layout: &ChunkLayout,
    chunk_count: usize,
) -> Result<Vec<PathBuf>, PipelineError> {
    info!("Creating working directory structure ...");
    let mut directories = Vec::with_capacity(chunk_count);

    for index in 0..chunk_count {
        let path = layout.chunk_dir(index);
        let existed = tokio::fs::metadata(&path).await.is_ok();

        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|source| PipelineError::Directory {
                path: path.clone(),
                source,
            })?;

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|source| PipelineError::Directory {
                path: path.clone(),
                source,
            })?;
        if !metadata.is_dir() {
            return Err(PipelineError::Directory {
                path,
                source: io::Error::new(io::ErrorKind::AlreadyExists, "path exists and is not a directory"),
            });
        }

        if !existed {
            info!("Created {}", path.display());
        }
        directories.push(path);
    }

    Ok(directories)
}

/// Count, plan and split on a blocking thread
async fn split_input(
    run: &PipelineRun,
    layout: ChunkLayout,
) -> Result<(ChunkPlan, SplitOutcome), PipelineError> {
    let input = run.config.input_path.clone();
    let chunk_count = run.config.chunk_count;

    tokio::task::spawn_blocking(move || -> Result<(ChunkPlan, SplitOutcome), PipelineError> {
        let total_lines = count_lines(&input)?;
        let plan = ChunkPlan::plan(total_lines, chunk_count)?;
        let outcome = ChunkWriter::new(layout).split(&input, &plan)?;
        Ok((plan, outcome))
    })
    .await
    .map_err(|e| {
        PipelineError::io(
            run.config.input_path.clone(),
            io::Error::new(io::ErrorKind::Other, e.to_string()),
        )
    })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{config::PipelineConfig, Stage};
    use crate::error::TransformError;
    use std::fs;
    use std::sync::Mutex;

    fn ten_line_input(dir: &std::path::Path) -> PathBuf {
        let input = dir.join("input.txt");
        let content: String = (1..=10).map(|i| format!("{}\n", i)).collect();
        fs::write(&input, content).unwrap();
        input
    }

    #[tokio::test]
    async fn test_execute_passthrough_run() {
        let dir = tempfile::tempdir().unwrap();
        let input = ten_line_input(dir.path());
        let config = PipelineConfig::new(2, dir.path().join("work"), &input).unwrap();
        let stages = vec![Stage::passthrough(0, "task_1"), Stage::passthrough(1, "task_2")];
        let mut run = PipelineRun::new(config, stages);

        PipelineController::new().execute(&mut run).await.unwrap();

        assert_eq!(run.status, RunStatus::Succeeded);
        assert_eq!(run.phase, PipelinePhase::Succeeded);
        assert_eq!(run.stage_timings.len(), 2);
        assert_eq!(run.plan.as_ref().unwrap().sizes(), vec![5, 5]);

        let mut joined = String::new();
        for chunk in &run.chunks {
            assert!(chunk
                .current_artifact()
                .ends_with(format!("raw_task_1_completed_task_2_completed{}.txt", chunk.index)));
            joined.push_str(&fs::read_to_string(chunk.current_artifact()).unwrap());
        }
        assert_eq!(joined, fs::read_to_string(&input).unwrap());
    }

    #[tokio::test]
    async fn test_failed_stage_halts_run() {
        let dir = tempfile::tempdir().unwrap();
        let input = ten_line_input(dir.path());
        let config = PipelineConfig::new(2, dir.path().join("work"), &input).unwrap();
        let failing = Stage::new(
            0,
            "check",
            Arc::new(|line: &str| -> Result<Vec<String>, TransformError> {
                if line == "7" {
                    Err(TransformError::new("bad line"))
                } else {
                    Ok(vec![line.to_string()])
                }
            }),
        );
        let next = Stage::passthrough(1, "never");
        let mut run = PipelineRun::new(config, vec![failing.clone(), next.clone()]);

        let events = Arc::new(Mutex::new(Vec::new()));
        let mut controller = PipelineController::new();
        let sink = events.clone();
        controller.add_event_handler(move |event| sink.lock().unwrap().push(event));

        let err = controller.execute(&mut run).await.unwrap_err();

        match &err {
            PipelineError::StageFailed { ordinal, failures, .. } => {
                assert_eq!(*ordinal, 0);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].chunk, 1);
            }
            other => panic!("expected stage failure, got {:?}", other),
        }
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.failed_phase, Some(PipelinePhase::Stage(0)));

        // Chunk 0 finished its work; the next stage never ran
        assert!(run.chunks[0].output_for(&failing).exists());
        let mut after_first = run.chunks[0].clone();
        after_first.advance(&failing);
        assert!(!after_first.output_for(&next).exists());

        let events = events.lock().unwrap();
        assert!(!events.iter().any(|e| matches!(e, ExecutionEvent::StageStarted { ordinal: 1, .. })));
        assert!(events.iter().any(|e| matches!(e, ExecutionEvent::ChunkCompleted { chunk: 0, .. })));
        assert!(events.iter().any(|e| matches!(e, ExecutionEvent::ChunkFailed { chunk: 1, .. })));
    }

    #[tokio::test]
    async fn test_insufficient_data_fails_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.txt");
        fs::write(&input, "only\ntwo\n").unwrap();
        let config = PipelineConfig::new(3, dir.path().join("work"), &input).unwrap();
        let mut run = PipelineRun::new(config, vec![Stage::passthrough(0, "task_1")]);

        let err = PipelineController::new().execute(&mut run).await.unwrap_err();

        assert!(matches!(err, PipelineError::InsufficientData { total_lines: 2, chunk_count: 3 }));
        assert_eq!(run.failed_phase, Some(PipelinePhase::Splitting));
        assert!(!run.layout().raw_artifact(0).exists());
    }

    #[tokio::test]
    async fn test_directory_error_when_path_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = ten_line_input(dir.path());
        let blocker = dir.path().join("work");
        fs::write(&blocker, "not a directory").unwrap();
        let config = PipelineConfig::new(2, &blocker, &input).unwrap();
        let mut run = PipelineRun::new(config, vec![Stage::passthrough(0, "task_1")]);

        let err = PipelineController::new().execute(&mut run).await.unwrap_err();

        assert!(matches!(err, PipelineError::Directory { .. }));
        assert_eq!(err.exit_code(), -2);
        assert_eq!(run.failed_phase, Some(PipelinePhase::PreparingDirectories));
    }

    #[tokio::test]
    async fn test_finished_run_cannot_be_executed_again() {
        let dir = tempfile::tempdir().unwrap();
        let input = ten_line_input(dir.path());
        let config = PipelineConfig::new(2, dir.path().join("work"), &input).unwrap();
        let mut run = PipelineRun::new(config, vec![Stage::passthrough(0, "task_1")]);
        let controller = PipelineController::new();
        controller.execute(&mut run).await.unwrap();

        let err = controller.execute(&mut run).await.unwrap_err();

        assert!(matches!(err, PipelineError::InvalidConfig(_)));
        assert_eq!(run.status, RunStatus::Succeeded);
        assert_eq!(run.phase, PipelinePhase::Succeeded);
        assert_eq!(run.stage_timings.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_stage_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = ten_line_input(dir.path());
        let config = PipelineConfig::new(2, dir.path().join("work"), &input).unwrap();
        let stages = vec![Stage::passthrough(0, "same"), Stage::passthrough(1, "same")];
        let mut run = PipelineRun::new(config, stages);

        let err = PipelineController::new().execute(&mut run).await.unwrap_err();

        assert!(matches!(err, PipelineError::InvalidConfig(_)));
        assert!(!dir.path().join("work").exists());
    }
}
