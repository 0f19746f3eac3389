//! Running external helpers (`lpstat`, `lp`, the OCR binary) off the UI thread.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::destination::DestinationError;

/// One invocation of an external program.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<Arc<[u8]>>,
    pub timeout: Duration,
}

impl CommandRequest {
    pub fn new<I, S>(program: &str, args: I, timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            stdin: None,
            timeout,
        }
    }

    pub fn with_stdin(mut self, data: Arc<[u8]>) -> Self {
        self.stdin = Some(data);
        self
    }

    fn describe(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl CommandOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Abstraction over process spawning so plugins can be tested without the
/// real tools installed.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion. Launch failures, timeouts and cancellation are
    /// errors; a non-zero exit is reported through [`CommandOutput::success`].
    async fn run(
        &self,
        request: CommandRequest,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, DestinationError>;
}

/// Runs commands with `tokio::process`. The child is killed when the run is
/// cancelled or times out.
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(
        &self,
        request: CommandRequest,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, DestinationError> {
        let description = request.describe();
        log::debug!("Running `{}`", description);

        let mut child = Command::new(&request.program)
            .args(&request.args)
            .stdin(if request.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take();
        let payload = request.stdin.clone();
        let feed = async move {
            if let (Some(mut stdin), Some(payload)) = (stdin, payload) {
                // The helper may exit before reading everything; its exit status decides.
                if let Err(e) = stdin.write_all(&payload).await {
                    log::debug!("Writing to child stdin failed: {}", e);
                }
                drop(stdin);
            }
        };
        let finish = async {
            let (_, output) = tokio::join!(feed, child.wait_with_output());
            output
        };

        let output = tokio::select! {
            output = tokio::time::timeout(request.timeout, finish) => match output {
                Ok(output) => output?,
                Err(_) => {
                    log::warn!("`{}` timed out after {:?}", description, request.timeout);
                    return Err(DestinationError::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("{} timed out after {}s", request.program, request.timeout.as_secs_f32()),
                    )));
                }
            },
            _ = cancel.cancelled() => {
                log::debug!("`{}` cancelled", description);
                return Err(DestinationError::Cancelled);
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            log::debug!(
                "`{}` exited with {:?}: {}",
                description,
                output.status.code(),
                stderr.chars().take(500).collect::<String>()
            );
        }
        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: output.stdout,
            stderr,
        })
    }
}

/// Fail-safe availability probe: launch failure, non-zero exit, timeout or
/// cancellation all mean unavailable, reported as the reason.
pub async fn probe(
    runner: &dyn CommandRunner,
    request: CommandRequest,
    cancel: &CancellationToken,
) -> Result<(), String> {
    let program = request.program.clone();
    match runner.run(request, cancel).await {
        Ok(output) if output.success => Ok(()),
        Ok(output) => Err(format!(
            "{} exited with status {}{}",
            program,
            output
                .code
                .map_or_else(|| "unknown".to_string(), |code| code.to_string()),
            if output.stderr.is_empty() {
                String::new()
            } else {
                format!(": {}", output.stderr)
            }
        )),
        Err(err) => Err(format!("{} unavailable: {}", program, err)),
    }
}


#[cfg(test)]
mod tests {
    use super::mock::{MockRunner, Reply};
    use super::*;

    fn version_request(program: &str) -> CommandRequest {
        CommandRequest::new(program, ["--version"], Duration::from_millis(500))
    }

    #[tokio::test]
    async fn probe_succeeds_on_zero_exit() {
        let runner = MockRunner::default().reply("tesseract --version", Reply::ok("tesseract 5.3"));
        let result = probe(&runner, version_request("tesseract"), &CancellationToken::new()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn probe_reports_non_zero_exit() {
        let runner =
            MockRunner::default().reply("tesseract --version", Reply::exit(2, "bad install"));
        let reason = probe(&runner, version_request("tesseract"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(reason.contains("status 2"), "got {reason}");
        assert!(reason.contains("bad install"));
    }

    #[tokio::test]
    async fn probe_reports_launch_failure() {
        let reason = probe(
            &MockRunner::default(),
            version_request("tesseract"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(reason.contains("unavailable"), "got {reason}");
    }

    #[tokio::test]
    async fn probe_reports_timeout() {
        let runner = MockRunner::default().reply(
            "tesseract --version",
            Reply::Error(|| {
                DestinationError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "timed out",
                ))
            }),
        );
        let reason = probe(&runner, version_request("tesseract"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(reason.contains("timed out"));
    }

    #[tokio::test]
    async fn missing_program_is_a_launch_error() {
        let result = SystemCommandRunner
            .run(
                version_request("wayscriber-definitely-not-installed"),
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(DestinationError::Io(_))));
    }
}
