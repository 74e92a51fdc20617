//! Command-line interface

pub mod output;

use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

/// Split a file into chunks and run staged parallel processing over them
#[derive(Debug, Parser, Clone)]
#[command(name = "chunkpipe")]
#[command(author = "chunkpipe contributors")]
#[command(version = "0.1.0")]
#[command(about = "Split a line-oriented file into chunks and process them in parallel stages", long_about = None)]
pub struct Cli {
    /// Input file to split into chunks and process
    #[arg(short = 'f', long = "file")]
    pub input: PathBuf,

    /// Number of chunks, and of parallel workers per stage
    #[arg(short = 'p', long = "processes", default_value_t = 2)]
    pub chunk_count: usize,

    /// Parent directory for the per-chunk working directories
    /// (defaults to the system temp directory)
    #[arg(short = 'd', long = "dir")]
    pub working_directory: Option<PathBuf>,

    /// YAML file defining the stages to run
    #[arg(short, long)]
    pub stages: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Parse CLI arguments from the environment without exiting on error
    pub fn try_from_args() -> Result<Self, clap::Error> {
        <Self as Parser>::try_parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }

    /// Working directory, falling back to the system temp directory
    pub fn working_directory(&self) -> PathBuf {
        self.working_directory
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}
