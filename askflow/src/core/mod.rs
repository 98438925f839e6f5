//! Core stage types.
//!
//! - [`StageStatus`] and [`StageKind`] enums
//! - [`StageOutput`], the value a stage hands back to the runner

mod output;
mod status;

pub use output::StageOutput;
pub use status::{StageKind, StageStatus};
