//! Pipeline building and execution.
//!
//! This module provides:
//! - [`PipelineBuilder`] and [`compose`] with contract validation
//! - [`Pipeline`], the sequential runner
//! - [`SubPipelineStage`] for nesting one pipeline inside another
//! - [`merge`] for running two pipelines concurrently and combining them

mod builder;
mod merge;
mod runner;
mod subpipeline;

pub use builder::{compose, PipelineBuilder};
pub use merge::{merge, Branch, MergeStage};
pub use runner::Pipeline;
pub use subpipeline::SubPipelineStage;
