//! Shell engine: runs each script body through an interpreter process.
//!
//! The script talks back to the harness through directive lines on stdout:
//!
//! ```text
//! ::set key=value     write the shared context (value is JSON or plain text)
//! ::unset key         remove a context key
//! ::output value      set the script's output value (last one wins)
//! ::info msg          log at info
//! ::warn msg          log at warn
//! ::error msg         log at error
//! ```
//!
//! Other stdout lines are logged at info, stderr lines at error. The current
//! context is available as JSON in `SCRIPTBATCH_CONTEXT`.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::engine::{ScriptEngine, ScriptFailure, ScriptOutcome};
use super::{Context, Level, ScriptLogger};
use crate::config::ExecutionConfig;

pub const CONTEXT_ENV: &str = "SCRIPTBATCH_CONTEXT";
pub const SCRIPT_ID_ENV: &str = "SCRIPTBATCH_SCRIPT_ID";

/// stderr lines kept for the failure trace.
const TRACE_LINES: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub enum Directive<'a> {
    Set(&'a str, Value),
    Unset(&'a str),
    Output(Value),
    Log(Level, &'a str),
    Plain(&'a str),
}

fn json_or_text(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Classify one stdout line. Malformed directives are plain output.
pub fn parse_directive(line: &str) -> Directive<'_> {
    let Some(rest) = line.strip_prefix("::") else {
        return Directive::Plain(line);
    };
    let (name, arg) = rest.split_once(' ').unwrap_or((rest, ""));

    match name {
        "set" => match arg.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Directive::Set(key.trim(), json_or_text(value.trim()))
            }
            _ => Directive::Plain(line),
        },
        "unset" if !arg.trim().is_empty() => Directive::Unset(arg.trim()),
        "output" => Directive::Output(json_or_text(arg.trim())),
        other => match Level::parse(other) {
            Some(level) => Directive::Log(level, arg),
            None => Directive::Plain(line),
        },
    }
}

fn describe_exit(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("script exited with status {}", code),
        None => "script terminated by signal".to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct ShellEngine {
    shell: String,
    shell_args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl Default for ShellEngine {
    fn default() -> Self {
        Self::from_config(&ExecutionConfig::default())
    }
}

impl ShellEngine {
    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self {
            shell: config.shell.clone(),
            shell_args: config.shell_args.clone(),
            working_dir: config.working_dir.clone(),
        }
    }

    fn command(&self, id: usize, body: &str, ctx: &Context) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.args(&self.shell_args)
            .arg(body)
            .env(CONTEXT_ENV, ctx.to_json())
            .env(SCRIPT_ID_ENV, id.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait::async_trait]
impl ScriptEngine for ShellEngine {
    async fn invoke(
        &self,
        id: usize,
        body: &str,
        ctx: &mut Context,
        log: &ScriptLogger,
    ) -> ScriptOutcome {
        let mut child = self.command(id, body, ctx).spawn().map_err(|e| {
            ScriptFailure::new(format!("failed to start {}: {}", self.shell, e))
        })?;
        // Declared after `child` so the group goes down before the child handle.
        let mut group = ProcessGroup(child.id());

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(ScriptFailure::new("script output pipes unavailable"));
        };
        let mut stdout = Some(BufReader::new(stdout));
        let mut stderr = Some(BufReader::new(stderr));
        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();

        let mut output = None;
        let mut trace: VecDeque<String> = VecDeque::new();

        while stdout.is_some() || stderr.is_some() {
            tokio::select! {
                read = read_line(stdout.as_mut(), &mut stdout_buf) => match read {
                    Ok(0) if stdout_buf.is_empty() => stdout = None,
                    Ok(_) => {
                        let line = take_line(&mut stdout_buf);
                        match parse_directive(&line) {
                            Directive::Set(key, value) => {
                                ctx.set(key, value);
                            }
                            Directive::Unset(key) => {
                                ctx.remove(key);
                            }
                            Directive::Output(value) => output = Some(value),
                            Directive::Log(level, message) => log.log(level, message),
                            Directive::Plain(text) => log.info(text),
                        }
                    }
                    Err(e) => {
                        // Dropping the reader closes the pipe, so the script
                        // gets EPIPE instead of blocking on a full buffer.
                        log.warn(format!("stopped reading stdout: {}", e));
                        stdout = None;
                    }
                },
                read = read_line(stderr.as_mut(), &mut stderr_buf) => match read {
                    Ok(0) if stderr_buf.is_empty() => stderr = None,
                    Ok(_) => {
                        let line = take_line(&mut stderr_buf);
                        log.error(line.as_str());
                        if trace.len() == TRACE_LINES {
                            trace.pop_front();
                        }
                        trace.push_back(line);
                    }
                    Err(e) => {
                        log.warn(format!("stopped reading stderr: {}", e));
                        stderr = None;
                    }
                },
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| ScriptFailure::new(format!("failed to wait for script: {}", e)))?;
        group.release();

        if status.success() {
            Ok(output)
        } else {
            let trace = Vec::from(trace).join("\n");
            Err(ScriptFailure::new(describe_exit(status)).with_trace(trace))
        }
    }
}

/// Read up to the next newline, or wait forever once the stream is closed.
async fn read_line<R>(reader: Option<&mut R>, buf: &mut Vec<u8>) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    match reader {
        Some(reader) => reader.read_until(b'\n', buf).await,
        None => std::future::pending().await,
    }
}

/// Drain `buf` as one line of text. Invalid UTF-8 becomes U+FFFD.
fn take_line(buf: &mut Vec<u8>) -> String {
    let mut end = buf.len();
    if buf[..end].ends_with(b"\n") {
        end -= 1;
    }
    if buf[..end].ends_with(b"\r") {
        end -= 1;
    }
    let line = String::from_utf8_lossy(&buf[..end]).into_owned();
    buf.clear();
    line
}

/// The script's process group. Killed on drop unless the script was reaped
/// normally, so a timed-out script takes its background jobs down with it.
struct ProcessGroup(Option<u32>);

impl ProcessGroup {
    fn release(&mut self) {
        self.0 = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        let Some(pgid) = self.0.take() else {
            return;
        };
        if cfg!(unix) {
            let _ = std::process::Command::new("kill")
                .args(["-s", "KILL", "--", &format!("-{}", pgid)])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
        }
    }
}
