//! Error types for chunking and stage execution

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to locate or create chunk directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot split {total_lines} lines into {chunk_count} non-empty chunks")]
    InsufficientData { total_lines: usize, chunk_count: usize },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Stage {ordinal} ({stage}) failed for chunk(s) {}", format_failed_chunks(failures))]
    StageFailed {
        ordinal: usize,
        stage: String,
        failures: Vec<ChunkFailure>,
    },
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code reported by the binary for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::InvalidConfig(_) | PipelineError::InsufficientData { .. } => -1,
            PipelineError::Directory { .. } => -2,
            PipelineError::Io { .. } | PipelineError::StageFailed { .. } => -3,
        }
    }
}

/// A single chunk's failure within a stage
#[derive(Debug)]
pub struct ChunkFailure {
    pub chunk: usize,
    pub error: StageWorkerError,
}

fn format_failed_chunks(failures: &[ChunkFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.chunk, f.error))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised by a per-chunk stage worker
#[derive(Debug, Error)]
pub enum StageWorkerError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to start worker thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("Transform failed at line {line}: {source}")]
    Transform {
        line: usize,
        #[source]
        source: TransformError,
    },

    #[error("Worker panicked: {0}")]
    Panicked(String),
}

/// Error reported by a line transform
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransformError {
    pub message: String,
}

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
