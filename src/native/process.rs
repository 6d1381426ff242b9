use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};

use crate::core::domain::{InvocationSpec, ProcessOutcome};
use crate::core::traits::sandbox::SandboxError;

/// Cap per captured channel.
pub const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// How long to wait for the pipes to drain once the process group is dead.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Spawns the invocation in its own process group and waits for it, killing
/// the whole group once it exits or the timeout fires.
pub async fn run_invocation(spec: &InvocationSpec) -> Result<ProcessOutcome, SandboxError> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|e| SandboxError::Spawn {
        program: spec.program.display().to_string(),
        msg: e.to_string(),
    })?;
    let pid = child.id();
    tracing::debug!("Spawned runtime pid={:?}", pid);

    let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
    let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

    let (exit_status, timed_out) = match timeout(spec.timeout, child.wait()).await {
        Ok(Ok(status)) => {
            // Leftover background processes would keep the pipes open.
            kill_group(pid);
            (status.code(), false)
        }
        Ok(Err(e)) => {
            kill_group(pid);
            return Err(SandboxError::Io { msg: e.to_string() });
        }
        Err(_elapsed) => {
            tracing::warn!(
                "Runtime pid={:?} exceeded {:?}, killing its process group",
                pid,
                spec.timeout
            );
            kill_group(pid);
            if let Err(e) = child.kill().await {
                tracing::warn!("Failed to reap timed out runtime: {}", e);
            }
            (None, true)
        }
    };

    let stdout = drain(stdout_task).await;
    let stderr = drain(stderr_task).await;
    tracing::debug!(
        "Runtime finished in {:?}: status={:?} timed_out={} stdout={}B stderr={}B",
        start.elapsed(),
        exit_status,
        timed_out,
        stdout.len(),
        stderr.len()
    );

    Ok(ProcessOutcome {
        exit_status,
        stdout,
        stderr,
        timed_out,
    })
}

async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}

async fn drain(task: JoinHandle<Vec<u8>>) -> Vec<u8> {
    let abort = task.abort_handle();
    match timeout(DRAIN_GRACE, task).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            tracing::warn!("Output reader failed: {}", e);
            Vec::new()
        }
        Err(_) => {
            tracing::warn!("Output pipe still open after the runtime exited, dropping it");
            abort.abort();
            Vec::new()
        }
    }
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    let Some(pid) = pid else {
        return;
    };
    // Safety: killpg has no memory-safety preconditions.
    let ret = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::warn!("Failed to kill process group {}: {}", pid, err);
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}
