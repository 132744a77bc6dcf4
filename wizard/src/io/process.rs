//! Bounded child processes for the AWS CLI: a wall-clock budget and a cap on
//! how much of each output stream is kept.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

use crate::io::config::AwsCliConfig;

const READ_CHUNK: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub timeout: Duration,
    /// Per stream; bytes past this are counted and dropped.
    pub output_limit_bytes: usize,
}

impl From<&AwsCliConfig> for Limits {
    fn from(config: &AwsCliConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }
}

#[derive(Debug)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_dropped: usize,
    /// The child was killed at the deadline.
    pub timed_out: bool,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.status.success() && !self.timed_out
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

#[derive(Debug, Default)]
struct BoundedBuffer {
    kept: Vec<u8>,
    dropped: usize,
}

impl BoundedBuffer {
    fn drain(mut reader: impl Read, limit: usize) -> Result<Self> {
        let mut buffer = Self::default();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let n = reader.read(&mut chunk).context("read child output")?;
            if n == 0 {
                return Ok(buffer);
            }
            let room = limit.saturating_sub(buffer.kept.len()).min(n);
            buffer.kept.extend_from_slice(&chunk[..room]);
            buffer.dropped += n - room;
        }
    }
}

/// Run `cmd` to completion or until `limits.timeout`, whichever comes first.
///
/// Both pipes are drained on scoped threads while waiting so the child never
/// blocks on a full pipe.
#[instrument(skip_all, fields(program = %cmd.get_program().to_string_lossy(), timeout_secs = limits.timeout.as_secs()))]
pub fn run_bounded(mut cmd: Command, limits: Limits) -> Result<CapturedOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd.spawn().context("spawn child process")?;
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        bail!("child output was not piped");
    };
    let limit = limits.output_limit_bytes;

    thread::scope(|scope| -> Result<CapturedOutput> {
        let stdout_reader = scope.spawn(move || BoundedBuffer::drain(stdout, limit));
        let stderr_reader = scope.spawn(move || BoundedBuffer::drain(stderr, limit));

        let (status, timed_out) = wait_or_kill(&mut child, limits.timeout)?;

        let stdout = stdout_reader
            .join()
            .map_err(|_| anyhow!("stdout reader panicked"))??;
        let stderr = stderr_reader
            .join()
            .map_err(|_| anyhow!("stderr reader panicked"))??;
        if stdout.dropped > 0 || stderr.dropped > 0 {
            warn!(
                stdout_dropped = stdout.dropped,
                stderr_dropped = stderr.dropped,
                "child output exceeded the limit"
            );
        }
        debug!(exit_code = ?status.code(), timed_out, "child finished");

        Ok(CapturedOutput {
            status,
            stdout: stdout.kept,
            stderr: stderr.kept,
            stdout_dropped: stdout.dropped,
            timed_out,
        })
    })
}

fn wait_or_kill(child: &mut Child, timeout: Duration) -> Result<(ExitStatus, bool)> {
    if let Some(status) = child.wait_timeout(timeout).context("wait for child")? {
        return Ok((status, false));
    }
    warn!(timeout_secs = timeout.as_secs(), "child exceeded its deadline, killing");
    child.kill().context("kill child")?;
    let status = child.wait().context("reap killed child")?;
    Ok((status, true))
}
