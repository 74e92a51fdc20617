//! Run configuration and stage definitions from YAML

use crate::core::{Stage, TransformKind};
use crate::error::PipelineError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Immutable settings for a single run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineConfig {
    /// Number of chunks, and therefore workers per stage
    pub chunk_count: usize,

    /// Parent directory of the per-chunk directories
    pub working_directory: PathBuf,

    /// Line-oriented file to split
    pub input_path: PathBuf,
}

impl PipelineConfig {
    pub fn new(
        chunk_count: usize,
        working_directory: impl Into<PathBuf>,
        input_path: impl Into<PathBuf>,
    ) -> Result<Self, PipelineError> {
        let config = Self {
            chunk_count,
            working_directory: working_directory.into(),
            input_path: input_path.into(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), PipelineError> {
        if self.chunk_count == 0 {
            return Err(PipelineError::InvalidConfig(
                "chunk count must be at least 1".to_string(),
            ));
        }
        if self.input_path.as_os_str().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "input file path is empty".to_string(),
            ));
        }
        if self.working_directory.as_os_str().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "working directory path is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Stage list loaded from a YAML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagesConfig {
    pub stages: Vec<StageConfig>,
}

/// A single stage as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Stage identifier, used in artifact file names
    pub name: String,

    /// Optional description, informational only
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub transform: TransformKind,
}

impl StagesConfig {
    /// Load stage definitions from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse stage definitions from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: StagesConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// The three passthrough tasks run when no stage file is given
    pub fn default_stages() -> Self {
        let stages = (1..=3)
            .map(|i| StageConfig {
                name: format!("task_{}", i),
                description: None,
                transform: TransformKind::Passthrough,
            })
            .collect();
        Self { stages }
    }

    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            anyhow::bail!("At least one stage is required");
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            if stage.name.is_empty() {
                anyhow::bail!("Stage name must not be empty");
            }
            if !stage
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                anyhow::bail!(
                    "Stage name '{}' may only contain ASCII letters, digits, '_' and '-'",
                    stage.name
                );
            }
            if !seen.insert(&stage.name) {
                anyhow::bail!("Duplicate stage name: {}", stage.name);
            }
        }

        Ok(())
    }

    /// Build the ordered stage list, compiling transforms
    pub fn to_stages(&self) -> Result<Vec<Stage>, PipelineError> {
        self.stages
            .iter()
            .enumerate()
            .map(|(ordinal, config)| {
                Ok(Stage::new(ordinal, config.name.clone(), config.transform.build()?))
            })
            .collect()
    }
}
