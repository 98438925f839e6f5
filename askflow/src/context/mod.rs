//! Context management for pipeline execution.
//!
//! This module provides:
//! - [`Context`], the write-once field map threaded through a pipeline
//! - [`InputSchema`] for declaring and validating caller input
//! - [`RunOptions`] and [`StageContext`] for per-run settings seen by stages

mod fields;
mod identity;
mod run;
mod schema;
mod stage;

pub use fields::Context;
pub use identity::RunIdentity;
pub use run::RunOptions;
pub use schema::{FieldKind, FieldSpec, InputSchema};
pub use stage::StageContext;
