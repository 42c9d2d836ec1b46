//! Runs a single pipeline step under a deadline.

use std::ffi::OsString;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;

use crate::error::ExecError;
use crate::language::Step;
use crate::sandbox::{self, SandboxPolicy};

const READ_CHUNK: usize = 8192;

/// Captured result of one step.
#[derive(Debug)]
pub(crate) struct StepOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub status: ExitStatus,
    pub truncated: bool,
}

impl StepOutput {
    /// Stdout followed by stderr, lossily decoded.
    pub fn combined(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        if !self.stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&String::from_utf8_lossy(&self.stderr));
        }
        if self.truncated {
            text.push_str("\n[output truncated]");
        }
        text
    }
}

/// Spawn `step` confined by `policy` and wait for it, killing its process
/// group if `deadline` passes first.
pub(crate) async fn run_step(
    step: &Step,
    workdir: &Path,
    env: &[(OsString, OsString)],
    policy: &SandboxPolicy,
    deadline: Instant,
) -> Result<StepOutput, ExecError> {
    let mut cmd = policy.command(step);
    policy.confine(&mut cmd, step, workdir, env);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|source| ExecError::Launch {
        program: step.display_name(),
        source,
    })?;
    let pid = child.id();
    let mut group = GroupGuard(pid);
    log::debug!("Spawned {} (pid {pid:?})", step.display_name());

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let limit = policy.max_output_bytes;

    let outcome = tokio::time::timeout_at(deadline, async {
        let (out, err, status) = tokio::join!(
            read_capped(stdout, limit),
            read_capped(stderr, limit),
            child.wait(),
        );
        let (stdout, out_truncated) = out?;
        let (stderr, err_truncated) = err?;
        Ok::<_, std::io::Error>(StepOutput {
            stdout,
            stderr,
            status: status?,
            truncated: out_truncated || err_truncated,
        })
    })
    .await;

    match outcome {
        Ok(result) => {
            group.disarm();
            Ok(result?)
        }
        Err(_) => {
            group.disarm();
            sandbox::kill_group(pid);
            let _ = child.wait().await;
            log::warn!(
                "{} exceeded {:?} and was killed",
                step.display_name(),
                policy.wall_clock
            );
            Err(ExecError::TimedOut {
                after: policy.wall_clock,
            })
        }
    }
}

/// Kills the step's process group if the step future is dropped before the
/// child has been reaped.
struct GroupGuard(Option<u32>);

impl GroupGuard {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if let Some(pid) = self.0.take() {
            sandbox::kill_group(Some(pid));
        }
    }
}

/// Read `reader` to EOF, keeping at most `limit` bytes.
///
/// The excess is drained rather than left in the pipe so a chatty child
/// never blocks on a full pipe buffer.
async fn read_capped<R>(reader: Option<R>, limit: usize) -> std::io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok((Vec::new(), false));
    };
    let mut buf = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    let mut truncated = false;
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(buf.len());
        buf.extend_from_slice(&chunk[..n.min(room)]);
        truncated |= n > room;
    }
    Ok((buf, truncated))
}
