//! Subprocess runner with wall-clock timeout
//!
//! Children are spawned with `kill_on_drop`, so a timed-out tool is killed
//! when its wait future is dropped.

use std::ffi::OsStr;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Longest stderr excerpt carried in an error message
const MAX_DETAIL_BYTES: usize = 4096;

/// Timeout for availability checks such as `java -version`
const QUERY_TIMEOUT: Duration = Duration::from_secs(15);

/// External tool errors
#[derive(Debug, Error)]
pub enum ToolError {
    /// Executable not found in PATH
    #[error("{program} not found in PATH")]
    NotFound { program: String },

    /// Spawn or wait failed for a reason other than a missing executable
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Tool exceeded its wall-clock limit and was killed
    #[error("{program} timed out after {secs} seconds")]
    TimedOut { program: String, secs: u64 },

    /// Tool exited unsuccessfully
    #[error("{program} failed ({status}): {detail}")]
    Failed {
        program: String,
        status: String,
        /// Tail of stderr (stdout when stderr is empty)
        detail: String,
    },
}

/// Captured output of a successful run
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Run `program` with `args`, failing on non-zero exit or timeout
pub async fn run_tool<I, S>(
    program: &str,
    args: I,
    timeout: Duration,
) -> Result<ToolOutput, ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(program, command = ?command.as_std(), "Running external tool");

    let started = Instant::now();
    let child = command.spawn().map_err(|e| spawn_error(program, e))?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| spawn_error(program, e))?,
        Err(_) => {
            warn!(program, timeout_secs = timeout.as_secs(), "External tool timed out, killed");
            return Err(ToolError::TimedOut {
                program: program.to_string(),
                secs: timeout.as_secs(),
            });
        }
    };

    let elapsed = started.elapsed();
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        let status = match output.status.code() {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        };
        let source = if stderr.trim().is_empty() { &stdout } else { &stderr };
        warn!(
            program,
            %status,
            elapsed_ms = elapsed.as_millis() as u64,
            "External tool failed"
        );
        return Err(ToolError::Failed {
            program: program.to_string(),
            status,
            detail: tail(source.trim(), MAX_DETAIL_BYTES),
        });
    }

    debug!(program, elapsed_ms = elapsed.as_millis() as u64, "External tool finished");

    Ok(ToolOutput {
        stdout,
        stderr,
        elapsed,
    })
}

/// Check that a tool runs and return the first line it prints
///
/// Java writes its version banner to stderr, so stderr is consulted first.
pub async fn query_tool(program: &str, args: &[&str]) -> Result<String, ToolError> {
    let output = run_tool(program, args, QUERY_TIMEOUT).await?;
    let first_line = output
        .stderr
        .lines()
        .chain(output.stdout.lines())
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string();
    Ok(first_line)
}

fn spawn_error(program: &str, source: std::io::Error) -> ToolError {
    if source.kind() == std::io::ErrorKind::NotFound {
        ToolError::NotFound {
            program: program.to_string(),
        }
    } else {
        ToolError::Spawn {
            program: program.to_string(),
            source,
        }
    }
}

/// Keep the last `max_bytes` of `text`, cut on a char boundary
fn tail(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}
