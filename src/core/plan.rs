//! Chunk boundary planning

use crate::error::PipelineError;
use serde::Serialize;
use std::ops::Range;

/// Line boundaries for a fixed-width partition of the input
///
/// `boundaries[i]` is the exclusive end line index of chunk `i`, so the last
/// boundary always equals `total_lines`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkPlan {
    pub total_lines: usize,
    pub chunk_count: usize,
    pub boundaries: Vec<usize>,
}

impl ChunkPlan {
    /// Compute the plan for `total_lines` split into `chunk_count` chunks.
    ///
    /// The first `chunk_count - 1` chunks get `total_lines / chunk_count`
    /// lines each and the last chunk absorbs the remainder.
    pub fn plan(total_lines: usize, chunk_count: usize) -> Result<Self, PipelineError> {
        if chunk_count == 0 {
            return Err(PipelineError::InvalidConfig(
                "chunk count must be at least 1".to_string(),
            ));
        }
        if chunk_count > total_lines {
            return Err(PipelineError::InsufficientData {
                total_lines,
                chunk_count,
            });
        }

        let base_size = total_lines / chunk_count;
        let mut boundaries: Vec<usize> = (1..chunk_count).map(|i| i * base_size).collect();
        boundaries.push(total_lines);

        Ok(Self {
            total_lines,
            chunk_count,
            boundaries,
        })
    }

    /// Line index range covered by chunk `index`
    pub fn range(&self, index: usize) -> Range<usize> {
        let start = if index == 0 { 0 } else { self.boundaries[index - 1] };
        start..self.boundaries[index]
    }

    /// Number of lines in each chunk, in index order
    pub fn sizes(&self) -> Vec<usize> {
        (0..self.chunk_count).map(|i| self.range(i).len()).collect()
    }
}
