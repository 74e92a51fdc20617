//! Test utility functions for chunkpipe
#![allow(dead_code)]

use chunkpipe::{
    ExecutionEvent, PipelineConfig, PipelineController, PipelineError, PipelineRun, Stage,
    TransformError,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Scratch directory holding an input file and a working directory
pub struct Workspace {
    pub dir: TempDir,
    pub input: PathBuf,
    pub work: PathBuf,
}

impl Workspace {
    pub fn with_content(content: &str) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let input = dir.path().join("input.txt");
        fs::write(&input, content).expect("write input");
        let work = dir.path().join("work");
        Self { dir, input, work }
    }

    pub fn with_lines(n: usize) -> Self {
        Self::with_content(&numbered_lines(1, n))
    }

    pub fn config(&self, chunk_count: usize) -> PipelineConfig {
        PipelineConfig::new(chunk_count, &self.work, &self.input).expect("valid config")
    }

    pub fn input_content(&self) -> String {
        fs::read_to_string(&self.input).expect("read input")
    }
}

/// Lines "line <first>" ..= "line <last>", each newline-terminated
pub fn numbered_lines(first: usize, last: usize) -> String {
    (first..=last).map(|i| format!("line {}\n", i)).collect()
}

/// Concatenate files in order
pub fn concat(paths: impl IntoIterator<Item = impl AsRef<Path>>) -> String {
    paths
        .into_iter()
        .map(|p| fs::read_to_string(p.as_ref()).expect("read artifact"))
        .collect()
}

/// Stage that fails on any line equal to `poison`
pub fn failing_stage(ordinal: usize, name: &str, poison: &'static str) -> Stage {
    Stage::new(
        ordinal,
        name,
        Arc::new(move |line: &str| -> Result<Vec<String>, TransformError> {
            if line == poison {
                Err(TransformError::new(format!("poisoned line '{}'", line)))
            } else {
                Ok(vec![line.to_string()])
            }
        }),
    )
}

/// Result of running a pipeline with event capture
pub struct RunOutcome {
    pub run: PipelineRun,
    pub result: Result<(), PipelineError>,
    pub events: Vec<ExecutionEvent>,
}

/// Run `stages` over the workspace and record every emitted event
pub async fn run_pipeline(workspace: &Workspace, chunk_count: usize, stages: Vec<Stage>) -> RunOutcome {
    run_pipeline_with(workspace, chunk_count, stages, |_| {}).await
}

/// Like `run_pipeline`, also calling `inspect` synchronously for each event
pub async fn run_pipeline_with<F>(
    workspace: &Workspace,
    chunk_count: usize,
    stages: Vec<Stage>,
    inspect: F,
) -> RunOutcome
where
    F: Fn(&ExecutionEvent) + Send + Sync + 'static,
{
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();

    let mut controller = PipelineController::new();
    controller.add_event_handler(move |event| {
        inspect(&event);
        sink.lock().unwrap().push(event);
    });

    let mut run = PipelineRun::new(workspace.config(chunk_count), stages);
    let result = controller.execute(&mut run).await;
    let events = events.lock().unwrap().clone();

    RunOutcome { run, result, events }
}

/// Index of the first event matching `pred`
pub fn position(events: &[ExecutionEvent], pred: impl Fn(&ExecutionEvent) -> bool) -> Option<usize> {
    events.iter().position(pred)
}
