//! Core domain models for chunked pipelines
//!
//! This module defines the chunk plan, chunk layout, stages and the
//! run state that the execution layer drives.

pub mod chunk;
pub mod config;
pub mod plan;
pub mod stage;
pub mod state;

pub use chunk::*;
pub use plan::*;
pub use stage::*;
pub use state::*;
