//! Stage trait and implementations.
//!
//! Stages are the units of work a pipeline runs in order. Each one declares
//! the fields it reads and the single field it writes in a [`StageContract`];
//! the pipeline builder checks those contracts before anything runs.

use crate::context::StageContext;
use crate::core::{StageKind, StageOutput};
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;

/// Implements `Debug` for stages that hold trait objects, showing only the contract.
macro_rules! contract_debug {
    ($($stage:ty),+ $(,)?) => {
        $(
            impl std::fmt::Debug for $stage {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    f.debug_struct(stringify!($stage))
                        .field("contract", &self.contract)
                        .finish_non_exhaustive()
                }
            }
        )+
    };
}

pub(crate) use contract_debug;

/// The declared interface of a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageContract {
    /// Stage name, unique within a pipeline.
    pub name: String,
    /// Fields the stage reads.
    pub inputs: Vec<String>,
    /// The one field the stage writes.
    pub output: String,
    /// What kind of work the stage does.
    pub kind: StageKind,
}

impl StageContract {
    /// Creates a contract with no inputs.
    #[must_use]
    pub fn new(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            output: output.into(),
            kind: StageKind::default(),
        }
    }

    /// Sets the input fields.
    #[must_use]
    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the stage kind.
    #[must_use]
    pub fn with_kind(mut self, kind: StageKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the stage's declared interface.
    fn contract(&self) -> &StageContract;

    /// Returns the name of the stage.
    fn name(&self) -> &str {
        &self.contract().name
    }

    /// Returns the field the stage writes.
    fn output(&self) -> &str {
        &self.contract().output
    }

    /// Executes the stage.
    ///
    /// The runner stores a successful value under [`Stage::output`].
    async fn execute(&self, ctx: &StageContext) -> StageOutput;
}

/// A simple function-based stage.
pub struct FnStage<F>
where
    F: Fn(&StageContext) -> StageOutput + Send + Sync,
{
    contract: StageContract,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&StageContext) -> StageOutput + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(contract: StageContract, func: F) -> Self {
        Self { contract, func }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&StageContext) -> StageOutput + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("contract", &self.contract)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&StageContext) -> StageOutput + Send + Sync,
{
    fn contract(&self) -> &StageContract {
        &self.contract
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        (self.func)(ctx)
    }
}

/// An async function-based stage.
pub struct AsyncFnStage<F, Fut>
where
    F: Fn(StageContext) -> Fut + Send + Sync,
    Fut: Future<Output = StageOutput> + Send,
{
    contract: StageContract,
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncFnStage<F, Fut>
where
    F: Fn(StageContext) -> Fut + Send + Sync,
    Fut: Future<Output = StageOutput> + Send,
{
    /// Creates a new async function-based stage.
    pub fn new(contract: StageContract, func: F) -> Self {
        Self {
            contract,
            func,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Debug for AsyncFnStage<F, Fut>
where
    F: Fn(StageContext) -> Fut + Send + Sync,
    Fut: Future<Output = StageOutput> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncFnStage")
            .field("contract", &self.contract)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> Stage for AsyncFnStage<F, Fut>
where
    F: Fn(StageContext) -> Fut + Send + Sync,
    Fut: Future<Output = StageOutput> + Send,
{
    fn contract(&self) -> &StageContract {
        &self.contract
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        (self.func)(ctx.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_stage() {
        let stage = FnStage::new(
            StageContract::new("shout", "loud").with_inputs(["question"]),
            |ctx: &StageContext| match ctx.input_str("question") {
                Ok(q) => StageOutput::ok(q.to_uppercase()),
                Err(e) => StageOutput::fail(e),
            },
        );

        assert_eq!(stage.name(), "shout");
        assert_eq!(stage.output(), "loud");
        assert_eq!(stage.contract().inputs, vec!["question"]);

        let ctx = StageContext::detached("shout", Context::from_question("hi"));
        let output = stage.execute(&ctx).await;
        assert_eq!(output.value, Some(json!("HI")));
    }

    #[tokio::test]
    async fn test_async_fn_stage() {
        let stage = AsyncFnStage::new(
            StageContract::new("wait", "waited").with_kind(StageKind::Retrieve),
            |_ctx| async {
                tokio::task::yield_now().await;
                StageOutput::ok(true)
            },
        );

        assert_eq!(stage.contract().kind, StageKind::Retrieve);
        let output = stage.execute(&StageContext::detached("wait", Context::new())).await;
        assert!(output.is_success());
    }
}
