//! Stage executor - fans a stage out to one worker thread per chunk

use crate::{
    core::{Chunk, LineTransform, Stage},
    error::StageWorkerError,
};
use std::any::Any;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const PROGRESS_INTERVAL: usize = 10_000;

/// Result of one chunk's worker
#[derive(Debug)]
pub enum ChunkOutcome {
    Completed {
        chunk: usize,
        output: PathBuf,
        lines_read: usize,
        lines_written: usize,
        elapsed: Duration,
    },
    Failed {
        chunk: usize,
        error: StageWorkerError,
    },
}

impl ChunkOutcome {
    pub fn chunk(&self) -> usize {
        match self {
            ChunkOutcome::Completed { chunk, .. } | ChunkOutcome::Failed { chunk, .. } => *chunk,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ChunkOutcome::Completed { .. })
    }
}

/// Collected outcomes of every worker in a stage
#[derive(Debug)]
pub struct StageReport {
    pub ordinal: usize,
    pub name: String,
    /// One outcome per chunk, in chunk index order
    pub outcomes: Vec<ChunkOutcome>,
    pub elapsed: Duration,
}

impl StageReport {
    pub fn succeeded(&self) -> bool {
        self.outcomes.iter().all(ChunkOutcome::is_success)
    }

    /// Indices of chunks whose worker failed
    pub fn failed_chunks(&self) -> Vec<usize> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_success())
            .map(ChunkOutcome::chunk)
            .collect()
    }
}

/// Runs a single stage across all chunks
#[derive(Debug, Clone, Default)]
pub struct StageExecutor;

impl StageExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run `stage` over every chunk and wait for all workers to finish.
    ///
    /// Every chunk gets its own OS thread, so all workers of a stage are
    /// running at once however many chunks there are. Each worker only
    /// touches its own chunk's files. A failing worker does not stop its
    /// siblings; the returned report holds every chunk's outcome.
    /// `on_outcome` is called once per chunk, in the order workers finish.
    pub async fn run_stage<F>(&self, stage: &Stage, chunks: &[Chunk], mut on_outcome: F) -> StageReport
    where
        F: FnMut(&ChunkOutcome),
    {
        info!(
            "Executing stage {} ({}) on {} chunk(s)",
            stage.ordinal,
            stage.name,
            chunks.len()
        );
        let started = Instant::now();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut outcomes = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let index = chunk.index;
            let input = chunk.current_artifact().to_path_buf();
            let output = chunk.output_for(stage);
            let transform = stage.transform();
            let tx = tx.clone();

            let spawned = thread::Builder::new()
                .name(format!("{}-chunk-{}", stage.name, index))
                .spawn(move || {
                    let worker_started = Instant::now();
                    let result = panic::catch_unwind(AssertUnwindSafe(|| {
                        process_chunk(index, &input, &output, transform.as_ref())
                    }));
                    let outcome = match result {
                        Ok(Ok((lines_read, lines_written))) => ChunkOutcome::Completed {
                            chunk: index,
                            output,
                            lines_read,
                            lines_written,
                            elapsed: worker_started.elapsed(),
                        },
                        Ok(Err(error)) => ChunkOutcome::Failed { chunk: index, error },
                        Err(payload) => ChunkOutcome::Failed {
                            chunk: index,
                            error: StageWorkerError::Panicked(panic_message(payload.as_ref())),
                        },
                    };
                    // The receiver outlives every sender
                    let _ = tx.send(outcome);
                });

            if let Err(e) = spawned {
                let outcome = ChunkOutcome::Failed {
                    chunk: index,
                    error: StageWorkerError::Spawn(e),
                };
                report_outcome(stage, &outcome, &mut on_outcome);
                outcomes.push(outcome);
            }
        }
        drop(tx);

        // Barrier: the channel closes only once every worker has dropped its sender
        while let Some(outcome) = rx.recv().await {
            report_outcome(stage, &outcome, &mut on_outcome);
            outcomes.push(outcome);
        }
        outcomes.sort_by_key(ChunkOutcome::chunk);

        StageReport {
            ordinal: stage.ordinal,
            name: stage.name.clone(),
            outcomes,
            elapsed: started.elapsed(),
        }
    }
}

fn report_outcome<F>(stage: &Stage, outcome: &ChunkOutcome, on_outcome: &mut F)
where
    F: FnMut(&ChunkOutcome),
{
    if let ChunkOutcome::Failed { chunk, error } = outcome {
        error!("Stage {} worker for chunk {} failed: {}", stage.name, chunk, error);
    }
    on_outcome(outcome);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Stream `input` through `transform` into `output`, returning
/// (lines read, lines written).
fn process_chunk(
    chunk: usize,
    input: &Path,
    output: &Path,
    transform: &dyn LineTransform,
) -> Result<(usize, usize), StageWorkerError> {
    debug!("Worker {}: initialized ({} -> {})", chunk, input.display(), output.display());

    let in_file = File::open(input).map_err(|e| worker_io(input, e))?;
    let mut reader = BufReader::new(in_file);
    let out_file = File::create(output).map_err(|e| worker_io(output, e))?;
    let mut writer = BufWriter::new(out_file);

    let mut line = Vec::new();
    let mut lines_read = 0;
    let mut lines_written = 0;
    let mut lossy = 0;

    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .map_err(|e| worker_io(input, e))?;
        if read == 0 {
            break;
        }
        lines_read += 1;

        let (content, terminator) = split_terminator(&line);
        if std::str::from_utf8(content).is_err() {
            lossy += 1;
        }
        let emitted = transform
            .apply_bytes(content)
            .map_err(|source| StageWorkerError::Transform {
                line: lines_read,
                source,
            })?;

        let last = emitted.len().saturating_sub(1);
        for (i, out_line) in emitted.iter().enumerate() {
            writer.write_all(out_line).map_err(|e| worker_io(output, e))?;
            let sep: &[u8] = match (i < last, terminator) {
                (true, b"") => &b"\n"[..],
                (_, t) => t,
            };
            writer.write_all(sep).map_err(|e| worker_io(output, e))?;
        }
        lines_written += emitted.len();

        if lines_read % PROGRESS_INTERVAL == 0 {
            debug!("Worker {}: {} lines", chunk, lines_read);
        }
    }

    writer.flush().map_err(|e| worker_io(output, e))?;
    if lossy > 0 {
        warn!(
            "Worker {}: {} line(s) in {} are not valid UTF-8",
            chunk,
            lossy,
            input.display()
        );
    }
    debug!("Worker {}: done, {} in / {} out", chunk, lines_read, lines_written);
    Ok((lines_read, lines_written))
}

fn split_terminator(line: &[u8]) -> (&[u8], &[u8]) {
    if let Some(content) = line.strip_suffix(b"\r\n") {
        (content, &b"\r\n"[..])
    } else if let Some(content) = line.strip_suffix(b"\n") {
        (content, &b"\n"[..])
    } else {
        (line, &b""[..])
    }
}

fn worker_io(path: &Path, source: io::Error) -> StageWorkerError {
    StageWorkerError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ChunkLayout;
    use crate::error::TransformError;
    use std::fs;
    use std::sync::{mpsc as std_mpsc, Arc, Mutex};

    fn chunks_with(contents: &[&str]) -> (tempfile::TempDir, Vec<Chunk>) {
        let dir = tempfile::tempdir().unwrap();
        let layout = ChunkLayout::new(dir.path());
        let chunks = layout.chunks(contents.len());
        for (chunk, content) in chunks.iter().zip(contents) {
            fs::create_dir_all(&chunk.directory).unwrap();
            fs::write(chunk.current_artifact(), content).unwrap();
        }
        (dir, chunks)
    }

    #[test]
    fn test_split_terminator() {
        assert_eq!(split_terminator(b"a\r\n"), (&b"a"[..], &b"\r\n"[..]));
        assert_eq!(split_terminator(b"a\n"), (&b"a"[..], &b"\n"[..]));
        assert_eq!(split_terminator(b"a"), (&b"a"[..], &b""[..]));
    }

    #[tokio::test]
    async fn test_passthrough_stage_copies_every_chunk() {
        let (_dir, chunks) = chunks_with(&["a\nb\n", "c\nd"]);
        let stage = Stage::passthrough(0, "task_1");

        let mut seen = Vec::new();
        let report = StageExecutor::new()
            .run_stage(&stage, &chunks, |o| seen.push(o.chunk()))
            .await;

        assert!(report.succeeded());
        assert_eq!(seen, vec![0, 1]);
        assert_eq!(fs::read_to_string(chunks[0].output_for(&stage)).unwrap(), "a\nb\n");
        assert_eq!(fs::read_to_string(chunks[1].output_for(&stage)).unwrap(), "c\nd");
    }

    #[tokio::test]
    async fn test_transform_can_drop_and_expand_lines() {
        let (_dir, chunks) = chunks_with(&["keep,me\nskip\nlast,one"]);
        let stage = Stage::new(
            0,
            "explode",
            Arc::new(|line: &str| -> Result<Vec<String>, TransformError> {
                if line == "skip" {
                    Ok(Vec::new())
                } else {
                    Ok(line.split(',').map(str::to_string).collect())
                }
            }),
        );

        let report = StageExecutor::new().run_stage(&stage, &chunks, |_| {}).await;

        match &report.outcomes[0] {
            ChunkOutcome::Completed { lines_read, lines_written, .. } => {
                assert_eq!(*lines_read, 3);
                assert_eq!(*lines_written, 4);
            }
            other => panic!("expected completion, got {:?}", other),
        }
        assert_eq!(
            fs::read_to_string(chunks[0].output_for(&stage)).unwrap(),
            "keep\nme\nlast\none"
        );
    }

    #[tokio::test]
    async fn test_failing_chunk_does_not_cancel_siblings() {
        let (_dir, chunks) = chunks_with(&["ok\nok\n", "ok\nboom\nok\n", "ok\n"]);
        let stage = Stage::new(
            0,
            "check",
            Arc::new(|line: &str| -> Result<Vec<String>, TransformError> {
                if line == "boom" {
                    Err(TransformError::new("exploded"))
                } else {
                    Ok(vec![line.to_string()])
                }
            }),
        );

        let report = StageExecutor::new().run_stage(&stage, &chunks, |_| {}).await;

        assert!(!report.succeeded());
        assert_eq!(report.failed_chunks(), vec![1]);
        assert_eq!(report.outcomes.len(), 3);
        assert!(matches!(
            &report.outcomes[1],
            ChunkOutcome::Failed { error: StageWorkerError::Transform { line: 2, .. }, .. }
        ));
        assert_eq!(fs::read_to_string(chunks[0].output_for(&stage)).unwrap(), "ok\nok\n");
        assert_eq!(fs::read_to_string(chunks[2].output_for(&stage)).unwrap(), "ok\n");
    }

    #[tokio::test]
    async fn test_missing_input_is_worker_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = ChunkLayout::new(dir.path()).chunks(1);
        let stage = Stage::passthrough(0, "task_1");

        let report = StageExecutor::new().run_stage(&stage, &chunks, |_| {}).await;

        assert!(matches!(
            &report.outcomes[0],
            ChunkOutcome::Failed { error: StageWorkerError::Io { .. }, .. }
        ));
    }

    #[tokio::test]
    async fn test_non_utf8_lines_pass_through_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = ChunkLayout::new(dir.path()).chunks(1);
        fs::create_dir_all(&chunks[0].directory).unwrap();
        fs::write(chunks[0].current_artifact(), b"fine\r\ncaf\xe9\n\xff\xfe").unwrap();
        let stage = Stage::passthrough(0, "task_1");

        let report = StageExecutor::new().run_stage(&stage, &chunks, |_| {}).await;

        assert!(report.succeeded());
        assert_eq!(
            fs::read(chunks[0].output_for(&stage)).unwrap(),
            b"fine\r\ncaf\xe9\n\xff\xfe".to_vec()
        );
    }

    #[tokio::test]
    async fn test_outcomes_reported_as_workers_finish() {
        let (_dir, chunks) = chunks_with(&["wait\n", "go\n"]);
        let (release, gate) = std_mpsc::channel::<()>();
        let gate = Mutex::new(gate);

        // Chunk 0 only finishes after chunk 1's outcome has been reported
        let stage = Stage::new(
            0,
            "gated",
            Arc::new(move |line: &str| -> Result<Vec<String>, TransformError> {
                if line == "wait" {
                    let _ = gate.lock().unwrap().recv_timeout(Duration::from_secs(5));
                }
                Ok(vec![line.to_string()])
            }),
        );

        let mut seen = Vec::new();
        let report = StageExecutor::new()
            .run_stage(&stage, &chunks, |o| {
                seen.push(o.chunk());
                let _ = release.send(());
            })
            .await;

        assert!(report.succeeded());
        assert_eq!(seen, vec![1, 0]);
        let order: Vec<usize> = report.outcomes.iter().map(ChunkOutcome::chunk).collect();
        assert_eq!(order, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_panicking_transform_is_reported() {
        let (_dir, chunks) = chunks_with(&["x\n"]);
        let stage = Stage::new(
            0,
            "panics",
            Arc::new(|_: &str| -> Result<Vec<String>, TransformError> { panic!("worker bug") }),
        );

        let report = StageExecutor::new().run_stage(&stage, &chunks, |_| {}).await;

        assert!(matches!(
            &report.outcomes[0],
            ChunkOutcome::Failed { error: StageWorkerError::Panicked(_), .. }
        ));
    }
}
