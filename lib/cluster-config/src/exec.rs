//! Exec credential plugins
//!
//! A user entry may name an external command that prints an `ExecCredential`
//! document carrying a short-lived bearer token. The command runs as a child
//! process with the parent environment plus the plugin's own variables, and is
//! killed if it does not exit within the configured timeout.

use async_trait::async_trait;
use cluster_core::{ClusterError, Result};
use serde::Deserialize;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Default time allowed for a credential plugin to exit
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(30);

/// Command line and environment for one plugin invocation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecRequest {
    pub command: String,
    pub args: Vec<String>,
    /// Variables added on top of the inherited environment
    pub env: Vec<(String, String)>,
}

/// Captured result of a finished process
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was terminated by a signal
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status_code == Some(0)
    }
}

/// Runs a command to completion and captures its output
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, request: &ExecRequest, timeout: Duration) -> io::Result<CommandOutput>;
}

/// [`CommandRunner`] backed by `tokio::process`
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, request: &ExecRequest, timeout: Duration) -> io::Result<CommandOutput> {
        let mut cmd = Command::new(&request.command);
        cmd.args(&request.args)
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn()?;
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!("{} did not exit within {:?}", request.command, timeout);
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("timed out after {:?}", timeout),
                ));
            }
        };

        Ok(CommandOutput {
            status_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ExecCredential {
    #[serde(default)]
    status: Option<ExecCredentialStatus>,
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExecCredentialStatus {
    #[serde(default)]
    token: Option<String>,
}

/// Extract the bearer token from plugin output.
///
/// Accepts an `ExecCredential` (`status.token`) or a bare `{"token": ...}` object.
pub fn parse_exec_credential(stdout: &str) -> std::result::Result<String, String> {
    let credential: ExecCredential =
        serde_json::from_str(stdout).map_err(|e| format!("invalid JSON output: {}", e))?;

    credential
        .status
        .and_then(|status| status.token)
        .or(credential.token)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| "output has no token field".to_string())
}

/// Run a credential plugin and return the token it prints
pub async fn fetch_exec_token(
    runner: &dyn CommandRunner,
    request: &ExecRequest,
    timeout: Duration,
) -> Result<String> {
    info!("Running exec credential plugin: {}", request.command);
    debug!("Exec plugin args: {:?}", request.args);

    let exec_error = |detail: String| ClusterError::ExecAuth {
        command: request.command.clone(),
        detail,
    };

    let output = runner.run(request, timeout).await.map_err(|e| {
        warn!("Exec plugin {} failed to run: {}", request.command, e);
        exec_error(format!("failed to execute: {}", e))
    })?;

    if !output.success() {
        warn!(
            "Exec plugin {} exited with {:?}: {}",
            request.command,
            output.status_code,
            output.stderr.trim()
        );
        let code = output
            .status_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        return Err(exec_error(format!(
            "exit status {}: {}",
            code,
            output.stderr.trim()
        )));
    }

    let token = parse_exec_credential(&output.stdout).map_err(|detail| {
        warn!("Exec plugin {} returned unusable output: {}", request.command, detail);
        exec_error(detail)
    })?;

    debug!("Exec plugin {} returned a token", request.command);
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Returns a canned output and records the request it was given
    struct FakeRunner {
        result: Mutex<Option<io::Result<CommandOutput>>>,
        seen: Mutex<Vec<ExecRequest>>,
    }

    impl FakeRunner {
        fn new(result: io::Result<CommandOutput>) -> Self {
            Self {
                result: Mutex::new(Some(result)),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(&self, request: &ExecRequest, _timeout: Duration) -> io::Result<CommandOutput> {
            self.seen.lock().unwrap().push(request.clone());
            self.result.lock().unwrap().take().unwrap()
        }
    }

    fn request() -> ExecRequest {
        ExecRequest {
            command: "get-token".to_string(),
            args: vec!["--cluster".to_string(), "c1".to_string()],
            env: vec![("REGION".to_string(), "eu".to_string())],
        }
    }

    #[test]
    fn test_parse_exec_credential_status_token() {
        let out = r#"{"apiVersion":"client.authentication.k8s.io/v1","kind":"ExecCredential","status":{"token":"abc"}}"#;
        assert_eq!(parse_exec_credential(out).unwrap(), "abc");
    }

    #[test]
    fn test_parse_exec_credential_top_level_token() {
        assert_eq!(parse_exec_credential(r#"{"token":"xyz"}"#).unwrap(), "xyz");
    }

    #[test]
    fn test_parse_exec_credential_errors() {
        assert!(parse_exec_credential("not json").unwrap_err().contains("invalid JSON"));
        assert!(parse_exec_credential(r#"{"status":{}}"#).unwrap_err().contains("no token"));
        assert!(parse_exec_credential(r#"{"token":""}"#).is_err());
    }

    #[tokio::test]
    async fn test_fetch_exec_token_success() {
        let runner = FakeRunner::new(Ok(CommandOutput {
            status_code: Some(0),
            stdout: r#"{"status":{"token":"from-plugin"}}"#.to_string(),
            stderr: String::new(),
        }));

        let token = fetch_exec_token(&runner, &request(), DEFAULT_EXEC_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(token, "from-plugin");
        assert_eq!(runner.seen.lock().unwrap()[0], request());
    }

    #[tokio::test]
    async fn test_fetch_exec_token_non_zero_exit() {
        let runner = FakeRunner::new(Ok(CommandOutput {
            status_code: Some(1),
            stdout: String::new(),
            stderr: "credentials expired\n".to_string(),
        }));

        let err = fetch_exec_token(&runner, &request(), DEFAULT_EXEC_TIMEOUT)
            .await
            .unwrap_err();
        match err {
            ClusterError::ExecAuth { command, detail } => {
                assert_eq!(command, "get-token");
                assert!(detail.contains("credentials expired"));
            }
            other => panic!("Expected ExecAuth, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_exec_token_bad_output() {
        let runner = FakeRunner::new(Ok(CommandOutput {
            status_code: Some(0),
            stdout: "token: abc".to_string(),
            stderr: String::new(),
        }));

        let err = fetch_exec_token(&runner, &request(), DEFAULT_EXEC_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::ExecAuth { .. }));
    }

    #[tokio::test]
    async fn test_fetch_exec_token_spawn_failure() {
        let runner = FakeRunner::new(Err(io::Error::new(io::ErrorKind::NotFound, "no such file")));

        let err = fetch_exec_token(&runner, &request(), DEFAULT_EXEC_TIMEOUT)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to execute"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tokio_runner_captures_output_and_env() {
        let request = ExecRequest {
            command: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                r#"printf '{"token":"%s"}' "$PLUGIN_TOKEN"; echo oops >&2"#.to_string(),
            ],
            env: vec![("PLUGIN_TOKEN".to_string(), "t0k3n".to_string())],
        };

        let output = TokioCommandRunner
            .run(&request, Duration::from_secs(10))
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, r#"{"token":"t0k3n"}"#);
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tokio_runner_times_out() {
        let request = ExecRequest {
            command: "sleep".to_string(),
            args: vec!["5".to_string()],
            env: Vec::new(),
        };

        let err = TokioCommandRunner
            .run(&request, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
