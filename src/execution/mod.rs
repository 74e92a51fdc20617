//! Chunk splitting and stage execution

pub mod engine;
pub mod executor;
pub mod splitter;

pub use engine::{ExecutionEvent, PipelineController};
pub use executor::{ChunkOutcome, StageExecutor, StageReport};
pub use splitter::{count_lines, ChunkWriter, SplitOutcome};
