//! Input line counting and chunk materialization

use crate::{
    core::{ChunkLayout, ChunkPlan},
    error::PipelineError,
};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const PROGRESS_INTERVAL: usize = 10_000;

/// Count lines in `path`, including a final line without a terminator
pub fn count_lines(path: &Path) -> Result<usize, PipelineError> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut count = 0;

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| PipelineError::io(path, e))?;
        if read == 0 {
            break;
        }
        count += 1;
    }

    Ok(count)
}

/// Result of a split request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitOutcome {
    /// Chunk files were written
    Written { paths: Vec<PathBuf> },
    /// Chunk artifacts already existed; nothing was written
    Skipped {
        paths: Vec<PathBuf>,
        existing: Vec<PathBuf>,
    },
}

impl SplitOutcome {
    pub fn paths(&self) -> &[PathBuf] {
        match self {
            SplitOutcome::Written { paths } | SplitOutcome::Skipped { paths, .. } => paths,
        }
    }

    pub fn was_skipped(&self) -> bool {
        matches!(self, SplitOutcome::Skipped { .. })
    }
}

/// Streams an input file into per-chunk raw artifacts
#[derive(Debug, Clone)]
pub struct ChunkWriter {
    layout: ChunkLayout,
}

impl ChunkWriter {
    pub fn new(layout: ChunkLayout) -> Self {
        Self { layout }
    }

    /// Split `input` according to `plan`.
    ///
    /// Chunk directories must already exist. If any raw artifact is already
    /// present the split is skipped entirely and no file is touched.
    pub fn split(&self, input: &Path, plan: &ChunkPlan) -> Result<SplitOutcome, PipelineError> {
        let paths: Vec<PathBuf> = (0..plan.chunk_count)
            .map(|i| self.layout.raw_artifact(i))
            .collect();

        let existing: Vec<PathBuf> = paths.iter().filter(|p| p.exists()).cloned().collect();
        if !existing.is_empty() {
            warn!(
                "Found {} existing chunk file(s) under {}, skipping split",
                existing.len(),
                self.layout.working_directory().display()
            );
            return Ok(SplitOutcome::Skipped { paths, existing });
        }

        info!(
            "Chunking {} into {} chunk(s)",
            input.display(),
            plan.chunk_count
        );

        let file = File::open(input).map_err(|e| PipelineError::io(input, e))?;
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        let mut chunk = 0;
        let mut out = create_chunk_file(&paths[chunk])?;
        let mut line = 0;

        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| PipelineError::io(input, e))?;
            if read == 0 {
                break;
            }

            if line >= plan.total_lines {
                return Err(PipelineError::io(
                    input,
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("input grew past the planned {} lines", plan.total_lines),
                    ),
                ));
            }

            if line == plan.boundaries[chunk] {
                finish_chunk_file(out, &paths[chunk])?;
                chunk += 1;
                out = create_chunk_file(&paths[chunk])?;
            }

            out.write_all(&buf)
                .map_err(|e| PipelineError::io(&paths[chunk], e))?;
            line += 1;

            if line % PROGRESS_INTERVAL == 0 {
                debug!("Processing line {} ...", line);
            }
        }
        finish_chunk_file(out, &paths[chunk])?;

        if line != plan.total_lines {
            return Err(PipelineError::io(
                input,
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("expected {} lines, read {}", plan.total_lines, line),
                ),
            ));
        }

        info!("Wrote {} lines across {} chunk(s)", line, plan.chunk_count);
        Ok(SplitOutcome::Written { paths })
    }
}

fn create_chunk_file(path: &Path) -> Result<BufWriter<File>, PipelineError> {
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| PipelineError::io(path, e))?;
    debug!("Opened {}", path.display());
    Ok(BufWriter::new(file))
}

fn finish_chunk_file(mut out: BufWriter<File>, path: &Path) -> Result<(), PipelineError> {
    out.flush().map_err(|e| PipelineError::io(path, e))
}
