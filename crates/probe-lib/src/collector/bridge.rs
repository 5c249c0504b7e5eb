//! `adb` process invocation
//!
//! Every call spawns the bridge executable, waits for it with a bounded
//! timeout and decodes stdout with malformed bytes dropped. The child is
//! killed if the wait runs out.

use super::{async_trait, Bridge};
use std::io;
use std::process::Output;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::trace;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge executable `{tool}` not found")]
    ToolNotFound { tool: String },

    #[error("`{command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("`{command}` exited with {}: {stderr}", exit_label(.code))]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("`{command}` could not be run: {source}")]
    Io {
        command: String,
        #[source]
        source: io::Error,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "signal".to_string(),
    }
}

impl BridgeError {
    /// Fatal errors end the run; everything else only affects one query
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::ToolNotFound { .. })
    }
}

/// Bridge backed by the `adb` executable
#[derive(Debug, Clone)]
pub struct AdbBridge {
    tool: String,
    timeout: Duration,
}

impl AdbBridge {
    pub fn new(tool: impl Into<String>, timeout: Duration) -> Self {
        Self {
            tool: tool.into(),
            timeout,
        }
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    async fn run(&self, args: &[&str]) -> Result<String, BridgeError> {
        let command = args.join(" ");
        trace!(tool = %self.tool, command = %command, "Invoking bridge");

        let mut child = Command::new(&self.tool);
        child.args(args).kill_on_drop(true);

        let output = match timeout(self.timeout, child.output()).await {
            Ok(result) => result.map_err(|e| self.io_error(&command, e))?,
            Err(_) => {
                return Err(BridgeError::Timeout {
                    command,
                    secs: self.timeout.as_secs(),
                })
            }
        };

        Self::stdout_of(command, output)
    }

    fn io_error(&self, command: &str, source: io::Error) -> BridgeError {
        if source.kind() == io::ErrorKind::NotFound {
            BridgeError::ToolNotFound {
                tool: self.tool.clone(),
            }
        } else {
            BridgeError::Io {
                command: command.to_string(),
                source,
            }
        }
    }

    fn stdout_of(command: String, output: Output) -> Result<String, BridgeError> {
        if !output.status.success() {
            return Err(BridgeError::Failed {
                command,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(decode_ignoring_invalid(&output.stdout).trim().to_string())
    }
}

/// Decode UTF-8, dropping malformed byte sequences instead of replacing them
fn decode_ignoring_invalid(bytes: &[u8]) -> String {
    bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()
}

#[async_trait]
impl Bridge for AdbBridge {
    async fn list_devices(&self) -> Result<String, BridgeError> {
        self.run(&["devices"]).await
    }

    async fn shell(&self, serial: &str, command: &str) -> Result<String, BridgeError> {
        self.run(&["-s", serial, "shell", command]).await
    }
}
