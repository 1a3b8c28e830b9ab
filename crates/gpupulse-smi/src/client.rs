use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SmiError {
    #[error("failed to execute {0}: {1}")]
    ExecutionFailed(String, #[source] std::io::Error),

    #[error("{0} not found - is the NVIDIA driver installed?")]
    NotFound(String),

    #[error("{0} timed out after {1}ms")]
    TimedOut(String, u64),

    #[error("{0} failed ({1})")]
    CommandFailed(String, String),

    #[error("unexpected query output: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, SmiError>;

/// Thin wrapper around the `nvidia-smi` binary.
///
/// Every query runs as a child process under a bounded timeout; a query
/// that outlives the timeout is reaped rather than left running.
pub struct SmiClient {
    binary: String,
    timeout: Duration,
}

impl SmiClient {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub async fn query(&self, args: &[&str]) -> Result<String> {
        debug!("running {} {}", self.binary, args.join(" "));

        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, output).await {
            Err(_) => {
                return Err(SmiError::TimedOut(
                    self.binary.clone(),
                    self.timeout.as_millis() as u64,
                ))
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SmiError::NotFound(self.binary.clone()))
            }
            Ok(Err(e)) => return Err(SmiError::ExecutionFailed(self.binary.clone(), e)),
            Ok(Ok(out)) => out,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SmiError::CommandFailed(
                self.binary.clone(),
                format!("{}: {}", output.status, stderr.trim()),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}
