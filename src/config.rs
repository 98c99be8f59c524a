//! TOML configuration for scriptbatch.
//!
//! Sections mirror the pipeline stages. Every field has a default, so an empty
//! file (or no file at all) is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Environment variable naming an alternate config file.
pub const CONFIG_ENV: &str = "SCRIPTBATCH_CONFIG";

/// Config file picked up from the working directory when nothing else is set.
pub const LOCAL_CONFIG_FILE: &str = "scriptbatch.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptBatchConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl ScriptBatchConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Try to load configuration from, in order:
    /// 1. The path in the `SCRIPTBATCH_CONFIG` environment variable.
    /// 2. `./scriptbatch.toml`.
    /// 3. Compiled-in defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "SCRIPTBATCH_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local_path = Path::new(LOCAL_CONFIG_FILE);
        if local_path.exists() {
            match Self::load(local_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %local_path.display(),
                        error = %e,
                        "local config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Where the task list comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Task service endpoint returning pending scheduled scripts.
    pub url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Read tasks from a local JSON file instead of `url`.
    pub tasks_file: Option<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "https://task.952737.xyz/queryTasks?type=scheduled_js&status=pending".to_string(),
            timeout_secs: 10,
            user_agent: "ScriptCombiner/1.0".to_string(),
            tasks_file: None,
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Which engine runs script bodies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// In-process JavaScript: each body is a function body called with the
    /// shared context as `this`.
    #[default]
    Js,
    /// `shell shell_args <body>` as a child process, talking back through
    /// stdout directives.
    Shell,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub engine: EngineKind,
    /// Interpreter the script bodies are handed to by the shell engine.
    pub shell: String,
    /// Arguments placed before the script body (`sh -c <body>`).
    pub shell_args: Vec<String>,
    /// Working directory for scripts; inherits ours when unset.
    pub working_dir: Option<PathBuf>,
    /// Per-script deadline in seconds. `0` disables it.
    pub script_timeout_secs: u64,
    /// Iterations any single JavaScript loop may run before the script is
    /// aborted. `0` removes the cap.
    pub loop_iteration_limit: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::Js,
            shell: "sh".to_string(),
            shell_args: vec!["-c".to_string()],
            working_dir: None,
            script_timeout_secs: 300,
            loop_iteration_limit: 10_000_000,
        }
    }
}

impl ExecutionConfig {
    pub fn script_timeout(&self) -> Option<Duration> {
        match self.script_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn loop_limit(&self) -> u64 {
        match self.loop_iteration_limit {
            0 => u64::MAX,
            limit => limit,
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// HTML report destination.
    pub path: PathBuf,
    /// Optional machine-readable copy of the report.
    pub json_path: Option<PathBuf>,
    pub title: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("script-results.html"),
            json_path: None,
            title: "Script execution report".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Notify
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub enabled: bool,
    /// Mail relay endpoint accepting `{ "subject", "html" }`.
    pub url: String,
    pub timeout_secs: u64,
    /// How long the process waits for a pending dispatch before exiting.
    pub grace_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "https://task.952737.xyz/send-mail".to_string(),
            timeout_secs: 10,
            grace_secs: 10,
        }
    }
}

impl NotifyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}
