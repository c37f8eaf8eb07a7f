//! Type definitions for aws-exec

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Configuration Types
// ============================================================================

/// Top-level configuration (from aws-exec.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub profile: ProfileConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// How long Stop waits for in-flight requests before forcing shutdown
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_listen_addr() -> String {
    "0.0.0.0:80".to_string()
}

fn default_shutdown_grace() -> u64 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Credential profile injected into every command's environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default = "default_profile_name")]
    pub name: String,
    #[serde(default = "default_region")]
    pub region: String,
}

fn default_profile_name() -> String {
    "default".to_string()
}

fn default_region() -> String {
    "ap-northeast-1".to_string()
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            name: default_profile_name(),
            region: default_region(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Shell used for raw command strings
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Per-command timeout in seconds (unset = wait forever)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_shell() -> String {
    "bash".to_string()
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            timeout_secs: None,
        }
    }
}

// ============================================================================
// Wire Types
// ============================================================================

/// Body of `POST /execute-aws-command`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
}

/// Response body: exactly one of `output` or `error` is set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    pub fn output(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            output: None,
            error: Some(msg.into()),
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Failure of a single command execution.
///
/// Every variant that ran a process carries the combined output captured so
/// far, and the `Display` text embeds it.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("failed to run command: {source}, output: {output}")]
    Process {
        #[source]
        source: std::io::Error,
        output: String,
    },

    #[error("command failed: {status}, output: {output}")]
    NonZeroExit { status: String, output: String },

    #[error("command timed out after {limit:?}, output: {output}")]
    Timeout { limit: Duration, output: String },
}

impl ExecError {
    /// Combined output captured before the failure
    pub fn output(&self) -> &str {
        match self {
            ExecError::Process { output, .. }
            | ExecError::NonZeroExit { output, .. }
            | ExecError::Timeout { output, .. } => output,
        }
    }
}

/// Outcome of one execution: combined output on success
pub type CommandResult = Result<String, ExecError>;

// ============================================================================
// Server Types
// ============================================================================

/// Lifecycle of an [`crate::AwsCommandServer`]
///
/// `Starting` and `Stopping` only exist while `start`/`stop` are running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server cannot start while {0:?}")]
    AlreadyStarted(LifecycleState),

    #[error("graceful shutdown exceeded {0:?}, forced")]
    ShutdownTimeout(Duration),

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}
