use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::executor::ExecutionResult;

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Runs an approved command through the platform's default interpreter,
/// capturing stdout and stderr as one stream in capture order and enforcing
/// a wall-clock timeout.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    timeout: Duration,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ShellExecutor {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Execute `command` and collect its result. Never returns a partial
    /// result on timeout: the child is killed and only the timeout error is
    /// reported.
    pub async fn run(&self, command: &str) -> ExecutionResult {
        let timeout_secs = self.timeout.as_secs();

        let mut child = match shell_command(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return ExecutionResult::error(e.to_string()),
        };

        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");

        let (line_tx, mut line_rx) = tokio::sync::mpsc::channel::<String>(64);

        let stdout_tx = line_tx.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut buf = String::new();
            while reader.read_line(&mut buf).await.unwrap_or(0) > 0 {
                let _ = stdout_tx.send(buf.clone()).await;
                buf.clear();
            }
        });

        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut buf = String::new();
            while reader.read_line(&mut buf).await.unwrap_or(0) > 0 {
                let _ = line_tx.send(buf.clone()).await;
                buf.clear();
            }
        });

        let mut combined = String::new();
        let deadline = tokio::time::Instant::now() + self.timeout;

        loop {
            tokio::select! {
                line = line_rx.recv() => {
                    match line {
                        Some(chunk) => combined.push_str(&chunk),
                        None => break,
                    }
                }
                () = tokio::time::sleep_until(deadline) => {
                    let _ = child.kill().await;
                    tracing::warn!(timeout_secs, "command timed out: {command}");
                    return ExecutionResult::error(format!(
                        "Command timed out after {timeout_secs} seconds"
                    ));
                }
            }
        }

        // Output pipes are closed; the child may still be running.
        let status = tokio::select! {
            status = child.wait() => match status {
                Ok(status) => status,
                Err(e) => return ExecutionResult::error(e.to_string()),
            },
            () = tokio::time::sleep_until(deadline) => {
                let _ = child.kill().await;
                tracing::warn!(timeout_secs, "command timed out: {command}");
                return ExecutionResult::error(format!(
                    "Command timed out after {timeout_secs} seconds"
                ));
            }
        };

        ExecutionResult::Completed {
            output: combined,
            returncode: status.code().unwrap_or(-1),
        }
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}
