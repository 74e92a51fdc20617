//! Chunk directories and artifact naming
//!
//! On-disk layout for a working directory `W`:
//!
//! ```text
//! W/chunk_dir<i>/raw<i>.txt                                  raw split
//! W/chunk_dir<i>/raw_task_1_completed<i>.txt                 after stage 1
//! W/chunk_dir<i>/raw_task_1_completed_task_2_completed<i>.txt
//! ```
//!
//! Each stage appends its suffix to the provenance trail of the previous
//! artifact, so the filename records every stage the data went through.

use crate::core::Stage;
use std::path::{Path, PathBuf};

const CHUNK_DIR_PREFIX: &str = "chunk_dir";
const RAW_PREFIX: &str = "raw";
const ARTIFACT_EXTENSION: &str = "txt";

/// Path layout of chunk directories under a working directory
#[derive(Debug, Clone)]
pub struct ChunkLayout {
    working_directory: PathBuf,
}

impl ChunkLayout {
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        Self {
            working_directory: working_directory.into(),
        }
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    /// Directory owned by chunk `index`
    pub fn chunk_dir(&self, index: usize) -> PathBuf {
        self.working_directory
            .join(format!("{}{}", CHUNK_DIR_PREFIX, index))
    }

    /// Raw split artifact for chunk `index`
    pub fn raw_artifact(&self, index: usize) -> PathBuf {
        self.chunk_dir(index).join(artifact_file_name(RAW_PREFIX, index))
    }

    /// Chunks bound to their raw split artifacts
    pub fn chunks(&self, chunk_count: usize) -> Vec<Chunk> {
        (0..chunk_count)
            .map(|index| Chunk::new(index, self.chunk_dir(index)))
            .collect()
    }
}

fn artifact_file_name(provenance: &str, index: usize) -> String {
    format!("{}{}.{}", provenance, index, ARTIFACT_EXTENSION)
}

/// One partition of the input and the artifact it currently points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub directory: PathBuf,
    provenance: String,
    current_artifact: PathBuf,
}

impl Chunk {
    pub fn new(index: usize, directory: PathBuf) -> Self {
        let current_artifact = directory.join(artifact_file_name(RAW_PREFIX, index));
        Self {
            index,
            directory,
            provenance: RAW_PREFIX.to_string(),
            current_artifact,
        }
    }

    /// Input for the next stage
    pub fn current_artifact(&self) -> &Path {
        &self.current_artifact
    }

    /// Output path `stage` writes for this chunk
    pub fn output_for(&self, stage: &Stage) -> PathBuf {
        self.directory
            .join(artifact_file_name(&self.next_provenance(stage), self.index))
    }

    /// Rebind the current artifact to `stage`'s output
    pub fn advance(&mut self, stage: &Stage) {
        self.current_artifact = self.output_for(stage);
        self.provenance = self.next_provenance(stage);
    }

    fn next_provenance(&self, stage: &Stage) -> String {
        format!("{}{}", self.provenance, stage.suffix())
    }
}
