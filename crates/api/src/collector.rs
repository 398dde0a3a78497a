//! Power sampling through an external measurement tool.
//!
//! [`LikwidCollector`] runs `likwid-powermeter` (or whatever `POWER_TOOL`
//! names) once per sampling tick, captures its stdout and hands it to
//! [`powerwatch_core::power_report::parse`]. The [`PowerSource`] trait is
//! the seam the sampling loop depends on, so tests can drive the loop
//! without the real tool installed.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use powerwatch_core::power_report::{self, PowerReading};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Cap on captured stdout or stderr per invocation (1 MiB).
const MAX_OUTPUT_BYTES: u64 = 1024 * 1024;

/// Longest stderr excerpt kept in a [`CollectError::Failed`].
const MAX_STDERR_CHARS: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("Failed to spawn power tool: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Power tool did not finish within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Power tool exited with code {code}: {stderr}")]
    Failed { code: i32, stderr: String },

    #[error("Power tool output contained no package or DRAM power readings")]
    NoReadings,
}

/// Something that can produce one power reading per call.
#[async_trait]
pub trait PowerSource: Send + Sync {
    async fn sample(&self) -> Result<PowerReading, CollectError>;
}

/// Runs an external power measurement program and parses its report.
#[derive(Debug, Clone)]
pub struct LikwidCollector {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl LikwidCollector {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Run the tool to completion and return its stdout.
    async fn run(&self) -> Result<String, CollectError> {
        let mut cmd = Command::new(&self.program);
        // The child is killed if the timeout below drops it.
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;

        let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
        let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(CollectError::Spawn(e)),
            Err(_elapsed) => {
                return Err(CollectError::Timeout {
                    timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(CollectError::Failed {
                code: status.code().unwrap_or(-1),
                stderr: stderr.trim().chars().take(MAX_STDERR_CHARS).collect(),
            });
        }

        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

#[async_trait]
impl PowerSource for LikwidCollector {
    async fn sample(&self) -> Result<PowerReading, CollectError> {
        let output = self.run().await?;
        let reading = power_report::parse(&output);

        if reading.skipped_lines > 0 {
            tracing::warn!(
                program = %self.program,
                skipped = reading.skipped_lines,
                "Power lines without a numeric value were skipped"
            );
        }
        if reading.is_empty() {
            return Err(CollectError::NoReadings);
        }
        Ok(reading)
    }
}

async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(h) = handle {
        let _ = h.take(MAX_OUTPUT_BYTES).read_to_end(&mut buf).await;
    }
    buf
}
