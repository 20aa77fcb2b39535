// Middleware pipeline for request processing

use crate::Result;
use crate::dispatch::{Reply, RequestContext};
use crate::logging::trace;
use std::fmt;
use std::sync::Arc;

/// One step of a [`Pipeline`].
pub type Stage<C, R> = Arc<dyn Fn(&mut C, Next<'_, C, R>) -> R + Send + Sync>;

/// The rest of the pipeline, handed to each stage.
///
/// A stage continues with [`Next::run`] or returns its own result without
/// calling it, which skips every later stage and the terminal handler.
pub struct Next<'a, C, R> {
    rest: &'a [Stage<C, R>],
    terminal: &'a dyn Fn(&mut C) -> R,
}

impl<C, R> Next<'_, C, R> {
    pub fn run(self, ctx: &mut C) -> R {
        match self.rest.split_first() {
            Some((stage, rest)) => {
                trace!(remaining = rest.len(), "Executing middleware");
                stage(
                    ctx,
                    Next {
                        rest,
                        terminal: self.terminal,
                    },
                )
            }
            None => {
                trace!("Middleware chain complete, calling handler");
                (self.terminal)(ctx)
            }
        }
    }

    /// Stages still to run before the terminal handler.
    pub fn remaining(&self) -> usize {
        self.rest.len()
    }
}

/// Ordered chain of stages around a terminal handler.
pub struct Pipeline<C, R> {
    stages: Vec<Stage<C, R>>,
}

impl<C, R> Pipeline<C, R> {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a stage; stages run in insertion order.
    pub fn push<F>(&mut self, stage: F)
    where
        F: Fn(&mut C, Next<'_, C, R>) -> R + Send + Sync + 'static,
    {
        self.stages.push(Arc::new(stage));
    }

    pub fn with<F>(mut self, stage: F) -> Self
    where
        F: Fn(&mut C, Next<'_, C, R>) -> R + Send + Sync + 'static,
    {
        self.push(stage);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage, then `terminal`.
    pub fn run<T>(&self, ctx: &mut C, terminal: T) -> R
    where
        T: Fn(&mut C) -> R,
    {
        trace!(middleware_count = self.stages.len(), "Executing middleware chain");
        Next {
            rest: &self.stages,
            terminal: &terminal,
        }
        .run(ctx)
    }
}

impl<C, R> Default for Pipeline<C, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, R> Clone for Pipeline<C, R> {
    fn clone(&self) -> Self {
        Self {
            stages: self.stages.clone(),
        }
    }
}

impl<C, R> From<Vec<Stage<C, R>>> for Pipeline<C, R> {
    fn from(stages: Vec<Stage<C, R>>) -> Self {
        Self { stages }
    }
}

impl<C, R> fmt::Debug for Pipeline<C, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stages.len())
            .finish()
    }
}

/// `Next` as seen by request middleware.
pub type RequestNext<'a> = Next<'a, RequestContext, Result<Reply>>;

/// Request middleware resolved from the container by identifier.
///
/// `args` carries the values after the `:` in an identifier such as
/// `throttle:60,1`.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: &mut RequestContext, next: RequestNext<'_>, args: &[String]) -> Result<Reply>;
}

impl<F> Middleware for F
where
    F: Fn(&mut RequestContext, RequestNext<'_>, &[String]) -> Result<Reply> + Send + Sync,
{
    fn handle(&self, ctx: &mut RequestContext, next: RequestNext<'_>, args: &[String]) -> Result<Reply> {
        self(ctx, next, args)
    }
}
