//! Async executor for AWS CLI command strings
//!
//! Every command runs in its own child process with the configured credential
//! profile layered on top of the ambient environment. Standard output and
//! standard error are captured into a single buffer in arrival order.
//!
//! # Example
//!
//! ```rust,ignore
//! use aws_exec::executor::{AwsCommandExecutor, ExecutionProfile};
//!
//! let executor = AwsCommandExecutor::new(ExecutionProfile::new("default", "ap-northeast-1"));
//! let output = executor.execute_unsafe_raw_shell("aws s3 ls").await?;
//! ```

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::types::{CommandResult, Config, ExecError, ProfileConfig};

/// Environment variable carrying the credential profile name
pub const PROFILE_ENV: &str = "AWS_PROFILE";

/// Environment variable carrying the default region
pub const REGION_ENV: &str = "AWS_DEFAULT_REGION";

/// Credential profile and region injected into every child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionProfile {
    profile_name: String,
    region: String,
}

impl ExecutionProfile {
    pub fn new(profile_name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            profile_name: profile_name.into(),
            region: region.into(),
        }
    }

    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Add the profile overrides to `cmd`. Empty values are skipped and the
    /// inherited environment is left untouched.
    fn apply(&self, cmd: &mut Command) {
        if !self.profile_name.is_empty() {
            cmd.env(PROFILE_ENV, &self.profile_name);
        }
        if !self.region.is_empty() {
            cmd.env(REGION_ENV, &self.region);
        }
    }
}

impl From<&ProfileConfig> for ExecutionProfile {
    fn from(config: &ProfileConfig) -> Self {
        Self::new(&config.name, &config.region)
    }
}

/// Something that can turn a command string into a [`CommandResult`].
///
/// The HTTP layer only depends on this trait.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &str) -> CommandResult;
}

/// Runs commands under a fixed [`ExecutionProfile`]
#[derive(Debug, Clone)]
pub struct AwsCommandExecutor {
    profile: ExecutionProfile,
    shell: String,
    timeout: Option<Duration>,
}

impl AwsCommandExecutor {
    /// Executor using `bash` with no timeout
    pub fn new(profile: ExecutionProfile) -> Self {
        Self {
            profile,
            shell: "bash".to_string(),
            timeout: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(ExecutionProfile::from(&config.profile))
            .with_shell(config.execution.shell.clone())
            .with_timeout(config.execution.timeout_secs.map(Duration::from_secs))
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Kill commands that run longer than `timeout`. `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn profile(&self) -> &ExecutionProfile {
        &self.profile
    }

    /// Run `command` through `<shell> -c`.
    ///
    /// The string is handed to the shell verbatim, so anything the shell
    /// understands (pipes, substitution, `;`) is honoured. Callers decide
    /// what reaches this point.
    #[instrument(skip(self), fields(profile = %self.profile.profile_name))]
    pub async fn execute_unsafe_raw_shell(&self, command: &str) -> CommandResult {
        debug!("executing via {}", self.shell);

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(command);
        self.run(cmd).await
    }

    /// Run `program` directly with `args`, no shell involved
    #[instrument(skip(self), fields(profile = %self.profile.profile_name))]
    pub async fn execute_argv(&self, program: &str, args: &[&str]) -> CommandResult {
        debug!("executing: {} {}", program, args.join(" "));

        let mut cmd = Command::new(program);
        cmd.args(args);
        self.run(cmd).await
    }

    async fn run(&self, mut cmd: Command) -> CommandResult {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        self.profile.apply(&mut cmd);

        let mut child = cmd.spawn().map_err(|source| {
            warn!(error = %source, "failed to spawn command");
            ExecError::Process {
                source,
                output: String::new(),
            }
        })?;

        let combined = Arc::new(Mutex::new(Vec::<u8>::new()));
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, Arc::clone(&combined)));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, Arc::clone(&combined)));
        }

        let waited = match self.timeout {
            None => child.wait().await,
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(waited) => waited,
                Err(_elapsed) => {
                    // kill() also reaps the child
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "failed to kill timed out command");
                    }
                    // Grandchildren may still hold the pipes open
                    for reader in &readers {
                        reader.abort();
                    }
                    let output = take_output(&combined).await;
                    warn!(?limit, "command timed out");
                    return Err(ExecError::Timeout { limit, output });
                }
            },
        };

        for reader in readers {
            let _ = reader.await;
        }
        let output = take_output(&combined).await;

        let status = match waited {
            Ok(status) => status,
            Err(source) => {
                warn!(error = %source, "failed to wait for command");
                return Err(ExecError::Process { source, output });
            }
        };

        if !status.success() {
            let status = describe_status(status);
            warn!(%status, "command failed");
            return Err(ExecError::NonZeroExit { status, output });
        }

        debug!(bytes = output.len(), "command succeeded");
        Ok(output)
    }
}

#[async_trait]
impl CommandExecutor for AwsCommandExecutor {
    async fn execute(&self, command: &str) -> CommandResult {
        self.execute_unsafe_raw_shell(command).await
    }
}

/// Copy everything from `stream` into the shared buffer until EOF
fn spawn_reader<R>(mut stream: R, sink: Arc<Mutex<Vec<u8>>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = vec![0u8; 4096];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => sink.lock().await.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    debug!(error = %e, "output stream closed");
                    break;
                }
            }
        }
    })
}

async fn take_output(combined: &Mutex<Vec<u8>>) -> String {
    let bytes = combined.lock().await;
    String::from_utf8_lossy(&bytes).into_owned()
}

fn describe_status(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit status {}", code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("terminated by signal {}", signal);
        }
    }
    "terminated abnormally".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn executor() -> AwsCommandExecutor {
        AwsCommandExecutor::new(ExecutionProfile::new("test-profile", "eu-central-1"))
    }

    #[tokio::test]
    async fn test_echo_returns_exact_output() {
        let output = executor().execute("echo hello").await.unwrap();
        assert_eq!(output, "hello\n");
    }

    #[tokio::test]
    async fn test_stderr_is_merged_into_output() {
        let output = executor()
            .execute("echo out; echo err 1>&2")
            .await
            .unwrap();
        assert!(output.contains("out\n"));
        assert!(output.contains("err\n"));
        assert_eq!(output.len(), "out\nerr\n".len());
    }

    #[tokio::test]
    async fn test_exit_one_reports_status() {
        let err = executor().execute("exit 1").await.unwrap_err();
        assert!(matches!(err, ExecError::NonZeroExit { .. }));
        assert!(err.to_string().contains("exit status 1"));
        assert_eq!(err.output(), "");
    }

    #[tokio::test]
    async fn test_failure_keeps_captured_output() {
        let err = executor()
            .execute("echo partial; echo 'An error occurred' 1>&2; exit 254")
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exit status 254"));
        assert!(msg.contains("partial"));
        assert!(msg.contains("An error occurred"));
    }

    #[tokio::test]
    async fn test_profile_env_is_added_to_ambient_env() {
        let output = executor()
            .execute(r#"printf '%s|%s|%s' "$AWS_PROFILE" "$AWS_DEFAULT_REGION" "$PATH""#)
            .await
            .unwrap();

        let ambient_path = std::env::var("PATH").unwrap_or_default();
        assert_eq!(
            output,
            format!("test-profile|eu-central-1|{}", ambient_path)
        );
    }

    #[tokio::test]
    async fn test_empty_profile_values_are_not_injected() {
        if std::env::var_os(PROFILE_ENV).is_some() || std::env::var_os(REGION_ENV).is_some() {
            return;
        }

        let executor = AwsCommandExecutor::new(ExecutionProfile::new("", ""));
        let output = executor
            .execute(r#"printf '%s|%s' "${AWS_PROFILE-unset}" "${AWS_DEFAULT_REGION-unset}""#)
            .await
            .unwrap();
        assert_eq!(output, "unset|unset");
    }

    #[tokio::test]
    async fn test_argv_execution_bypasses_shell() {
        let output = executor()
            .execute_argv("printf", &["%s", "a b; echo injected"])
            .await
            .unwrap();
        assert_eq!(output, "a b; echo injected");
    }

    #[tokio::test]
    async fn test_missing_program_is_process_error() {
        let err = executor()
            .execute_argv("aws-exec-definitely-missing-binary", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Process { .. }));
    }

    #[tokio::test]
    async fn test_missing_shell_is_process_error() {
        let err = executor()
            .with_shell("/nonexistent/shell")
            .execute("echo hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Process { .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let executor = executor().with_timeout(Some(Duration::from_millis(300)));

        let started = Instant::now();
        let err = executor
            .execute("echo before; sleep 10")
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(err, ExecError::Timeout { .. }));
        assert!(err.output().contains("before"));
    }

    #[tokio::test]
    async fn test_dropped_execution_leaves_command_running() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("done");
        let command = format!("sleep 0.5; touch '{}'", marker.display());

        let executor = executor();
        let abandoned =
            tokio::time::timeout(Duration::from_millis(100), executor.execute(&command)).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn test_timeout_does_not_affect_fast_commands() {
        let executor = executor().with_timeout(Some(Duration::from_secs(5)));
        let output = executor.execute("echo quick").await.unwrap();
        assert_eq!(output, "quick\n");
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.profile.name = "prod".to_string();
        config.execution.timeout_secs = Some(12);

        let executor = AwsCommandExecutor::from_config(&config);
        assert_eq!(executor.profile().profile_name(), "prod");
        assert_eq!(executor.profile().region(), "ap-northeast-1");
        assert_eq!(executor.timeout, Some(Duration::from_secs(12)));
        assert_eq!(executor.shell, "bash");
    }
}
