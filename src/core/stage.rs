//! Stage domain model and line transforms

use crate::error::{PipelineError, TransformError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Per-line processing capability of a stage
///
/// Called once per input line (terminator stripped). Returning an empty
/// vector drops the line; returning several lines expands it.
pub trait LineTransform: Send + Sync {
    fn apply(&self, line: &str) -> Result<Vec<String>, TransformError>;

    /// Byte-level entry point used by stage workers.
    ///
    /// Lines that are not valid UTF-8 are decoded lossily before `apply`.
    /// Transforms that never rewrite text override this to keep the input bytes.
    fn apply_bytes(&self, line: &[u8]) -> Result<Vec<Vec<u8>>, TransformError> {
        let text = String::from_utf8_lossy(line);
        Ok(self
            .apply(&text)?
            .into_iter()
            .map(String::into_bytes)
            .collect())
    }
}

impl<F> LineTransform for F
where
    F: Fn(&str) -> Result<Vec<String>, TransformError> + Send + Sync,
{
    fn apply(&self, line: &str) -> Result<Vec<String>, TransformError> {
        self(line)
    }
}

/// One ordinal step of the pipeline
#[derive(Clone)]
pub struct Stage {
    /// Position in the pipeline, starting at 0
    pub ordinal: usize,

    /// Identifier used in artifact names
    pub name: String,

    transform: Arc<dyn LineTransform>,
}

impl Stage {
    pub fn new(ordinal: usize, name: impl Into<String>, transform: Arc<dyn LineTransform>) -> Self {
        Self {
            ordinal,
            name: name.into(),
            transform,
        }
    }

    /// Stage that copies every line unchanged
    pub fn passthrough(ordinal: usize, name: impl Into<String>) -> Self {
        Self::new(ordinal, name, Arc::new(Passthrough))
    }

    /// Suffix this stage appends to the artifact provenance trail
    pub fn suffix(&self) -> String {
        format!("_{}_completed", self.name)
    }

    pub fn transform(&self) -> Arc<dyn LineTransform> {
        Arc::clone(&self.transform)
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("ordinal", &self.ordinal)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Built-in transforms selectable from a stage file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformKind {
    /// Copy lines unchanged
    #[default]
    Passthrough,
    Uppercase,
    Lowercase,
    /// Strip leading and trailing whitespace
    Trim,
    /// Drop lines that are empty or whitespace only
    DropEmpty,
    /// Keep lines matching `pattern` (or not matching, with `invert`)
    Grep {
        pattern: String,
        #[serde(default)]
        invert: bool,
    },
    /// Regex replace all matches in each line
    Replace { pattern: String, replacement: String },
}

impl TransformKind {
    /// Build the runnable transform, compiling any regex
    pub fn build(&self) -> Result<Arc<dyn LineTransform>, PipelineError> {
        let transform: Arc<dyn LineTransform> = match self {
            TransformKind::Passthrough => Arc::new(Passthrough),
            TransformKind::Uppercase => Arc::new(uppercase),
            TransformKind::Lowercase => Arc::new(lowercase),
            TransformKind::Trim => Arc::new(trim),
            TransformKind::DropEmpty => Arc::new(drop_empty),
            TransformKind::Grep { pattern, invert } => Arc::new(GrepTransform {
                regex: compile(pattern)?,
                invert: *invert,
            }),
            TransformKind::Replace { pattern, replacement } => Arc::new(ReplaceTransform {
                regex: compile(pattern)?,
                replacement: replacement.clone(),
            }),
        };
        Ok(transform)
    }
}

/// Copies lines unchanged, byte for byte
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl LineTransform for Passthrough {
    fn apply(&self, line: &str) -> Result<Vec<String>, TransformError> {
        Ok(vec![line.to_string()])
    }

    fn apply_bytes(&self, line: &[u8]) -> Result<Vec<Vec<u8>>, TransformError> {
        Ok(vec![line.to_vec()])
    }
}

fn uppercase(line: &str) -> Result<Vec<String>, TransformError> {
    Ok(vec![line.to_uppercase()])
}

fn lowercase(line: &str) -> Result<Vec<String>, TransformError> {
    Ok(vec![line.to_lowercase()])
}

fn trim(line: &str) -> Result<Vec<String>, TransformError> {
    Ok(vec![line.trim().to_string()])
}

fn drop_empty(line: &str) -> Result<Vec<String>, TransformError> {
    if line.trim().is_empty() {
        Ok(Vec::new())
    } else {
        Ok(vec![line.to_string()])
    }
}

fn compile(pattern: &str) -> Result<Regex, PipelineError> {
    Regex::new(pattern)
        .map_err(|e| PipelineError::InvalidConfig(format!("invalid pattern '{}': {}", pattern, e)))
}

struct GrepTransform {
    regex: Regex,
    invert: bool,
}

impl GrepTransform {
    fn keeps(&self, line: &str) -> bool {
        self.regex.is_match(line) != self.invert
    }
}

impl LineTransform for GrepTransform {
    fn apply(&self, line: &str) -> Result<Vec<String>, TransformError> {
        if self.keeps(line) {
            Ok(vec![line.to_string()])
        } else {
            Ok(Vec::new())
        }
    }

    // Matches on the decoded text but keeps the original bytes
    fn apply_bytes(&self, line: &[u8]) -> Result<Vec<Vec<u8>>, TransformError> {
        if self.keeps(&String::from_utf8_lossy(line)) {
            Ok(vec![line.to_vec()])
        } else {
            Ok(Vec::new())
        }
    }
}

struct ReplaceTransform {
    regex: Regex,
    replacement: String,
}

impl LineTransform for ReplaceTransform {
    fn apply(&self, line: &str) -> Result<Vec<String>, TransformError> {
        Ok(vec![self
            .regex
            .replace_all(line, self.replacement.as_str())
            .into_owned()])
    }
}
