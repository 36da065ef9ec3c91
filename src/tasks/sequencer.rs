//! Strictly sequential task chains.

use std::future::Future;

use tracing::debug;

use super::{TaskError, TaskRegistry};

/// Runs a list of named tasks one after another.
///
/// Each step (with its own dependencies) completes before the next one
/// starts. A failing step short-circuits the chain.
pub struct Sequencer<'a, C> {
    registry: &'a TaskRegistry<C>,
    steps: Vec<String>,
}

impl<'a, C> Sequencer<'a, C>
where
    C: Clone + Send + Sync + 'static,
{
    pub fn new(registry: &'a TaskRegistry<C>, steps: Vec<String>) -> Self {
        Self { registry, steps }
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub async fn run(&self, ctx: C) -> Result<(), TaskError> {
        for (position, step) in self.steps.iter().enumerate() {
            debug!(step = %step, position, total = self.steps.len(), "sequence step");
            self.registry.run(step, ctx.clone()).await?;
        }
        Ok(())
    }

    /// Run the chain, then `continuation` if every step succeeded.
    pub async fn run_then<F, Fut>(&self, ctx: C, continuation: F) -> Result<(), TaskError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        self.run(ctx).await?;
        continuation().await;
        Ok(())
    }
}
