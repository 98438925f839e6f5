//! Mock stages for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::time::Duration;

use crate::context::{Context, StageContext};
use crate::core::StageOutput;
use crate::errors::AskflowError;
use crate::stages::{Stage, StageContract};

/// A stage that records calls and returns a configurable output.
///
/// By default it succeeds with its own name as the value.
#[derive(Debug)]
pub struct MockStage {
    contract: StageContract,
    output: Mutex<StageOutput>,
    seen: Mutex<Vec<Context>>,
}

impl MockStage {
    /// Creates a mock reading `inputs` and writing `output`.
    #[must_use]
    pub fn new(name: impl Into<String>, inputs: &[&str], output: &str) -> Self {
        let name = name.into();
        let value = Value::String(name.clone());
        Self {
            contract: StageContract::new(name, output).with_inputs(inputs.iter().copied()),
            output: Mutex::new(StageOutput::ok(value)),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Succeeds with `value`.
    #[must_use]
    pub fn returning(self, value: Value) -> Self {
        self.set_output(StageOutput::ok(value));
        self
    }

    /// Sets the output to return.
    pub fn set_output(&self, output: StageOutput) {
        *self.output.lock() = output;
    }

    /// Returns the number of times the stage was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.seen.lock().len()
    }

    /// Returns the context data from each call.
    #[must_use]
    pub fn seen(&self) -> Vec<Context> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Stage for MockStage {
    fn contract(&self) -> &StageContract {
        &self.contract
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        self.seen.lock().push(ctx.data().clone());
        self.output.lock().clone()
    }
}

/// A stage that always fails with the given error.
#[derive(Debug)]
pub struct FailingStage {
    contract: StageContract,
    error: AskflowError,
}

impl FailingStage {
    /// Creates a stage that writes `output` in theory and fails in practice.
    #[must_use]
    pub fn new(name: impl Into<String>, output: &str, error: AskflowError) -> Self {
        Self {
            contract: StageContract::new(name, output),
            error,
        }
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn contract(&self) -> &StageContract {
        &self.contract
    }

    async fn execute(&self, _ctx: &StageContext) -> StageOutput {
        StageOutput::fail(self.error.clone())
    }
}

/// A stage that sleeps, then succeeds with `true`.
#[derive(Debug)]
pub struct SlowStage {
    contract: StageContract,
    delay: Duration,
}

impl SlowStage {
    /// Creates a new slow stage.
    #[must_use]
    pub fn new(name: impl Into<String>, output: &str, delay: Duration) -> Self {
        Self {
            contract: StageContract::new(name, output),
            delay,
        }
    }
}

#[async_trait]
impl Stage for SlowStage {
    fn contract(&self) -> &StageContract {
        &self.contract
    }

    async fn execute(&self, _ctx: &StageContext) -> StageOutput {
        tokio::time::sleep(self.delay).await;
        StageOutput::ok(true)
    }
}
