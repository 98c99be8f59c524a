//! In-process JavaScript engine.
//!
//! A body is compiled as the body of a plain function and called with the
//! shared context as `this`, so `this.key = value` carries state to later
//! scripts and `return` sets the output. A returned promise (or thenable) is
//! driven to completion before the script counts as finished.
//!
//! `console.log/info/warn/error` are captured for the invocation. `setTimeout`
//! queues its callback as a job with no real delay. Every script gets a fresh
//! interpreter: context values cross between scripts as JSON.

use boa_engine::property::Attribute;
use boa_engine::{Context as Interpreter, JsString, Source};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::engine::{ScriptEngine, ScriptFailure, ScriptOutcome};
use super::logger::join_args;
use super::{Context, Level, LogEntry, ScriptLogger};
use crate::config::ExecutionConfig;

const BODY_GLOBAL: &str = "__scriptbatchBody";
const CONTEXT_GLOBAL: &str = "__scriptbatchContext";

/// Installs the console, runs the body and leaves `__scriptbatchFinish`
/// behind to report how it went as JSON.
const PRELUDE: &str = r#"
(function (global) {
  var logs = [];
  var state = { settled: false, ok: false, value: undefined };

  function portable(value) {
    if (value === undefined) return "undefined";
    var kind = typeof value;
    if (kind === "function" || kind === "symbol" || kind === "bigint") return String(value);
    if (value instanceof Error) return String(value);
    try {
      JSON.stringify(value);
      return value;
    } catch (e) {
      return String(value);
    }
  }

  function capture(level) {
    return function () {
      var args = [];
      for (var i = 0; i < arguments.length; i++) args.push(portable(arguments[i]));
      logs.push({ level: level, timestamp: new Date().toISOString(), args: args });
    };
  }

  global.console = {
    log: capture("info"),
    info: capture("info"),
    debug: capture("info"),
    warn: capture("warn"),
    error: capture("error")
  };

  global.setTimeout = function (callback) {
    var args = Array.prototype.slice.call(arguments, 2);
    Promise.resolve().then(function () { callback.apply(undefined, args); });
    return 0;
  };

  var context = JSON.parse(global.__scriptbatchContext);

  function settle(ok, value) {
    if (state.settled) return;
    state.settled = true;
    state.ok = ok;
    state.value = value;
  }

  function describe(error) {
    if (error !== null && typeof error === "object") {
      var message = error.message !== undefined ? String(error.message) : String(error);
      var trace = typeof error.stack === "string" && error.stack ? error.stack : String(error);
      return { message: message, trace: trace };
    }
    return { message: String(error), trace: "" };
  }

  try {
    var script = new Function(global.__scriptbatchBody);
    var returned = script.call(context);
    var thenable = returned !== null
      && (typeof returned === "object" || typeof returned === "function")
      && typeof returned.then === "function";
    if (thenable) {
      returned.then(function (v) { settle(true, v); }, function (e) { settle(false, e); });
    } else {
      settle(true, returned);
    }
  } catch (e) {
    settle(false, e);
  }

  global.__scriptbatchFinish = function () {
    var shared = {};
    Object.keys(context).forEach(function (key) {
      if (context[key] !== undefined) shared[key] = portable(context[key]);
    });
    var report = { settled: state.settled, ok: state.ok, logs: logs, context: shared };
    if (state.settled && state.ok && state.value !== undefined && state.value !== null) {
      report.output = portable(state.value);
    }
    if (state.settled && !state.ok) report.error = describe(state.value);
    return JSON.stringify(report);
  };
})(globalThis);
"#;

#[derive(Debug, Deserialize)]
struct Settlement {
    settled: bool,
    ok: bool,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Thrown>,
    #[serde(default)]
    logs: Vec<CapturedLog>,
    context: Context,
}

#[derive(Debug, Deserialize)]
struct Thrown {
    message: String,
    #[serde(default)]
    trace: String,
}

#[derive(Debug, Deserialize)]
struct CapturedLog {
    level: Level,
    timestamp: DateTime<Utc>,
    args: Vec<Value>,
}

fn interpreter_failure(err: impl std::fmt::Display) -> ScriptFailure {
    ScriptFailure::new(err.to_string())
}

/// Run one body to completion on the current thread.
fn evaluate(body: &str, context: &str, loop_limit: u64) -> Result<Settlement, ScriptFailure> {
    let mut js = Interpreter::default();
    js.runtime_limits_mut().set_loop_iteration_limit(loop_limit);

    js.register_global_property(
        JsString::from(BODY_GLOBAL),
        JsString::from(body),
        Attribute::all(),
    )
    .map_err(interpreter_failure)?;
    js.register_global_property(
        JsString::from(CONTEXT_GLOBAL),
        JsString::from(context),
        Attribute::all(),
    )
    .map_err(interpreter_failure)?;

    js.eval(Source::from_bytes(PRELUDE))
        .map_err(interpreter_failure)?;
    js.run_jobs();

    let finished = js
        .eval(Source::from_bytes("__scriptbatchFinish()"))
        .map_err(interpreter_failure)?;
    let raw = finished
        .as_string()
        .map(|s| s.to_std_string_escaped())
        .ok_or_else(|| ScriptFailure::new("script report was not text"))?;

    serde_json::from_str(&raw)
        .map_err(|e| ScriptFailure::new(format!("unreadable script report: {}", e)))
}

#[derive(Debug, Clone)]
pub struct JsEngine {
    loop_limit: u64,
}

impl Default for JsEngine {
    fn default() -> Self {
        Self::from_config(&ExecutionConfig::default())
    }
}

impl JsEngine {
    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self {
            loop_limit: config.loop_limit(),
        }
    }
}

#[async_trait::async_trait]
impl ScriptEngine for JsEngine {
    async fn invoke(
        &self,
        _id: usize,
        body: &str,
        ctx: &mut Context,
        log: &ScriptLogger,
    ) -> ScriptOutcome {
        let body = body.to_string();
        let snapshot = ctx.to_json();
        let loop_limit = self.loop_limit;

        // The interpreter is single-threaded and CPU-bound; keep it off the
        // runtime's worker threads.
        let settlement =
            tokio::task::spawn_blocking(move || evaluate(&body, &snapshot, loop_limit))
                .await
                .map_err(|e| ScriptFailure::new(format!("javascript worker failed: {}", e)))??;

        for captured in settlement.logs {
            log.record(LogEntry {
                level: captured.level,
                timestamp: captured.timestamp,
                message: join_args(&captured.args),
            });
        }
        *ctx = settlement.context;

        if !settlement.settled {
            return Err(ScriptFailure::new(
                "script returned a promise that never settled",
            ));
        }
        match (settlement.ok, settlement.error) {
            (true, _) => Ok(settlement.output),
            (false, Some(thrown)) => {
                Err(ScriptFailure::new(thrown.message).with_trace(thrown.trace))
            }
            (false, None) => Err(ScriptFailure::new("script failed without an error value")),
        }
    }
}
