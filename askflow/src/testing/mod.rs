//! Test doubles for askflow pipelines.
//!
//! This module provides:
//! - Mock stages with fixed contracts ([`MockStage`], [`FailingStage`], [`SlowStage`])
//! - Scripted collaborators for every provider trait, so the SQL and
//!   research pipelines can run without a model, database or network

mod providers;
mod stages;

pub use providers::{ScriptedGenerator, StaticExecutor, StaticFetcher, StaticSchemaProvider, StaticSearch};
pub use stages::{FailingStage, MockStage, SlowStage};
