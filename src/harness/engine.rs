//! The seam where a script body becomes something callable.

use std::collections::HashMap;
use std::fmt;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Context, ScriptLogger};

/// Why a script did not complete successfully.
///
/// This is data recorded in the script's result, never an error that leaves
/// the harness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptFailure {
    pub message: String,
    /// Diagnostic trace: stderr tail, panic location, backtrace text.
    pub trace: String,
}

impl ScriptFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: String::new(),
        }
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = trace.into();
        self
    }
}

impl fmt::Display for ScriptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

pub type ScriptOutcome = Result<Option<Value>, ScriptFailure>;

/// Runs one script body.
///
/// `ctx` is the batch's shared context; writes made here are visible to every
/// later script. `log` is this invocation's private logger.
#[async_trait::async_trait]
pub trait ScriptEngine: Send + Sync {
    async fn invoke(
        &self,
        id: usize,
        body: &str,
        ctx: &mut Context,
        log: &ScriptLogger,
    ) -> ScriptOutcome;
}

#[async_trait::async_trait]
impl<E: ScriptEngine + ?Sized> ScriptEngine for Box<E> {
    async fn invoke(
        &self,
        id: usize,
        body: &str,
        ctx: &mut Context,
        log: &ScriptLogger,
    ) -> ScriptOutcome {
        (**self).invoke(id, body, ctx, log).await
    }
}

type SyncScript = Box<dyn Fn(&mut Context, &ScriptLogger) -> ScriptOutcome + Send + Sync>;
type AsyncScript = Box<
    dyn for<'a> Fn(&'a mut Context, &'a ScriptLogger) -> BoxFuture<'a, ScriptOutcome>
        + Send
        + Sync,
>;

enum Callable {
    Sync(SyncScript),
    Async(AsyncScript),
}

/// Registry engine mapping script bodies to Rust closures.
///
/// Useful for embedding the harness and for tests; a body with nothing
/// registered fails like a script that references an unknown function.
#[derive(Default)]
pub struct FnEngine {
    scripts: HashMap<String, Callable>,
}

impl FnEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a script that completes immediately.
    pub fn register<F>(mut self, body: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Context, &ScriptLogger) -> ScriptOutcome + Send + Sync + 'static,
    {
        self.scripts.insert(body.into(), Callable::Sync(Box::new(f)));
        self
    }

    /// Register a script whose result is only available once a future settles.
    pub fn register_async<F>(mut self, body: impl Into<String>, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context, &'a ScriptLogger) -> BoxFuture<'a, ScriptOutcome>
            + Send
            + Sync
            + 'static,
    {
        self.scripts.insert(body.into(), Callable::Async(Box::new(f)));
        self
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

#[async_trait::async_trait]
impl ScriptEngine for FnEngine {
    async fn invoke(
        &self,
        id: usize,
        body: &str,
        ctx: &mut Context,
        log: &ScriptLogger,
    ) -> ScriptOutcome {
        match self.scripts.get(body) {
            Some(Callable::Sync(f)) => f(ctx, log),
            Some(Callable::Async(f)) => f(ctx, log).await,
            None => Err(ScriptFailure::new(format!(
                "no callable registered for script {}",
                id
            ))),
        }
    }
}
