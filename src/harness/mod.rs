//! Sequential execution harness.
//!
//! Scripts run one at a time, in the order given, against one shared
//! [`Context`]. A script's failure (error, panic or timeout) is recorded in its
//! own [`ExecutionResult`] and the batch moves on; only harness-level problems
//! surface as [`HarnessError`].

pub mod context;
pub mod engine;
pub mod js;
pub mod logger;
pub mod shell;
pub mod store;

pub use self::context::Context;
pub use self::engine::{FnEngine, ScriptEngine, ScriptFailure, ScriptOutcome};
pub use self::js::JsEngine;
pub use self::logger::{Level, LogEntry, ScriptLogger};
pub use self::shell::ShellEngine;
pub use self::store::ResultStore;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{EngineKind, ExecutionConfig};

/// The engine `[execution] engine` asks for.
pub fn engine_from_config(config: &ExecutionConfig) -> Box<dyn ScriptEngine> {
    match config.engine {
        EngineKind::Js => Box::new(JsEngine::from_config(config)),
        EngineKind::Shell => Box::new(ShellEngine::from_config(config)),
    }
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("result for script {0} was already recorded")]
    DuplicateResult(usize),
}

/// Outcome of one script. Frozen once committed to the [`ResultStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// 1-based position in the batch.
    pub id: usize,
    pub success: bool,
    pub output: Option<Value>,
    /// Present exactly when `success` is false.
    pub error: Option<ScriptFailure>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub logs: Vec<LogEntry>,
}

/// Everything a finished batch leaves behind.
#[derive(Debug)]
pub struct Batch {
    pub context: Context,
    pub results: Vec<ExecutionResult>,
}

pub struct Harness<E> {
    engine: E,
    context: Context,
    store: ResultStore,
    timeout: Option<Duration>,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl<E: ScriptEngine> Harness<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            context: Context::new(),
            store: ResultStore::new(),
            timeout: None,
        }
    }

    /// Per-script deadline. `None` lets a script run forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Seed the shared context before the first script.
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Run one script to completion and commit its result.
    pub async fn run_one(&mut self, id: usize, body: &str) -> Result<&ExecutionResult, HarnessError> {
        info!(script_id = id, "Starting script");
        let started_at = Utc::now();
        let start = Instant::now();
        let logger = ScriptLogger::new(id);

        let invocation = AssertUnwindSafe(self.engine.invoke(id, body, &mut self.context, &logger))
            .catch_unwind();
        let settled = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, invocation)
                .await
                .unwrap_or_else(|_| {
                    Ok(Err(ScriptFailure::new(format!(
                        "script timed out after {:?}",
                        limit
                    ))))
                }),
            None => invocation.await,
        };
        let outcome = settled.unwrap_or_else(|payload| {
            Err(ScriptFailure::new(format!(
                "script panicked: {}",
                panic_message(payload)
            )))
        });

        let success = outcome.is_ok();
        let (output, error) = match outcome {
            Ok(output) => (output, None),
            Err(failure) => {
                logger.error(format!("script {} failed: {}", id, failure.message));
                (None, Some(failure))
            }
        };

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        if success {
            info!(script_id = id, duration_ms, "Script finished");
        } else {
            warn!(script_id = id, duration_ms, "Script failed");
        }

        self.store.commit(ExecutionResult {
            id,
            success,
            output,
            error,
            started_at,
            duration_ms,
            logs: logger.into_entries(),
        })
    }

    /// Run `scripts` in order, ids `1..=n`, and hand back the results.
    pub async fn run_batch<S: AsRef<str>>(mut self, scripts: &[S]) -> Result<Batch, HarnessError> {
        let total = scripts.len();
        info!(total, "Running batch");

        for (index, script) in scripts.iter().enumerate() {
            let id = index + 1;
            debug!(script_id = id, total, "Dispatching script");
            self.run_one(id, script.as_ref()).await?;
        }

        Ok(Batch {
            context: self.context,
            results: self.store.into_results(),
        })
    }
}
