//! chunkpipe - split a line-oriented file into chunks and run ordered,
//! barrier-synchronized processing stages over all chunks in parallel

pub mod cli;
pub mod core;
pub mod error;
pub mod execution;

// Re-export commonly used types
pub use crate::core::config::{PipelineConfig, StagesConfig};
pub use crate::core::{Chunk, ChunkLayout, ChunkPlan, LineTransform, PipelinePhase, PipelineRun, RunStatus, Stage};
pub use error::{PipelineError, StageWorkerError, TransformError};
pub use execution::{ChunkWriter, ExecutionEvent, PipelineController, StageExecutor, StageReport};
