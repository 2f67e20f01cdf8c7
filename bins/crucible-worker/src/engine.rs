//! Child process supervision.
//!
//! Drives one child (compiler or sandbox launcher) to completion:
//! concurrent capped capture of both output streams, a wall-clock
//! watchdog, and an output-size watchdog. Either watchdog firing kills
//! the child's whole process group, so grandchildren spawned by
//! runtimes or forking compilers are reaped too.

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Notify;
use tracing::debug;

use crucible_common::types::MAX_OUTPUT_BYTES;

pub const COMPILE_TIMEOUT_MS: u64 = 30_000;

/// Safety margin added to the language wall-clock limit; the sandbox
/// launcher is expected to enforce the limit itself first.
pub const WALL_CLOCK_GRACE_MS: u64 = 5_000;

pub const EXECUTION_TIMEOUT_MESSAGE: &str = "Execution timeout exceeded";
pub const OUTPUT_LIMIT_MESSAGE: &str = "Output exceeded maximum size (64KB)";

/// Raw outcome of one supervised child run.
#[derive(Debug)]
pub struct CaptureOutcome {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Exit code; -1 when the child did not exit normally.
    pub exit_code: i32,
    /// Wall-clock watchdog fired.
    pub timed_out: bool,
    /// Output-cap watchdog fired.
    pub output_overflow: bool,
    /// Signal that terminated the child, when not one of our watchdogs.
    pub killed_by_signal: Option<i32>,
}

/// Build a command from an explicit argument vector. Never a shell
/// string.
pub fn command_from_argv(argv: &[String]) -> io::Result<Command> {
    let program = argv
        .first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty argument vector"))?;
    let mut command = Command::new(program);
    command.args(&argv[1..]);
    Ok(command)
}

/// Run a child to completion with capped capture and a wall-clock
/// limit. The child is placed in its own process group; watchdog kills
/// go to the group.
pub async fn run_captured(mut command: Command, timeout: Duration) -> io::Result<CaptureOutcome> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);

    let mut child = command.spawn()?;
    // With process_group(0) the child's pgid equals its pid.
    let pgid = child.id().map(|pid| Pid::from_raw(pid as i32));

    let stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "child stdout not piped"))?;
    let stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "child stderr not piped"))?;

    let overflow = Arc::new(Notify::new());
    let stdout_task = tokio::spawn(read_capped(stdout_pipe, overflow.clone()));
    let stderr_task = tokio::spawn(read_capped(stderr_pipe, overflow.clone()));

    let mut timed_out = false;
    let mut output_overflow = false;

    // The wait future must be dropped before the kill below can borrow
    // the child again, so watchdog branches only record why they fired.
    let exited = tokio::select! {
        status = child.wait() => Some(status?),
        _ = tokio::time::sleep(timeout) => {
            timed_out = true;
            None
        }
        _ = overflow.notified() => {
            output_overflow = true;
            None
        }
    };

    let status = match exited {
        Some(status) => status,
        None => {
            kill_group(pgid, &mut child).await;
            child.wait().await?
        }
    };

    let (stdout, stdout_overflowed) = stdout_task.await.unwrap_or_default();
    let (stderr, stderr_overflowed) = stderr_task.await.unwrap_or_default();
    output_overflow = output_overflow || stdout_overflowed || stderr_overflowed;

    let (exit_code, killed_by_signal) = match status.code() {
        Some(code) => (code, None),
        None => (-1, status.signal()),
    };

    Ok(CaptureOutcome {
        stdout,
        stderr,
        exit_code,
        timed_out,
        output_overflow,
        killed_by_signal,
    })
}

/// Read a stream into a buffer bounded at `MAX_OUTPUT_BYTES`. Exactly
/// cap-sized output is delivered intact; one byte past the cap stops
/// the read and wakes the overflow watchdog.
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, overflow: Arc<Notify>) -> (Vec<u8>, bool) {
    let mut buf: Vec<u8> = Vec::with_capacity(8 * 1024);
    let mut chunk = [0u8; 8 * 1024];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => return (buf, false),
            Ok(n) => {
                let room = MAX_OUTPUT_BYTES - buf.len();
                if n <= room {
                    buf.extend_from_slice(&chunk[..n]);
                } else {
                    buf.extend_from_slice(&chunk[..room]);
                    overflow.notify_one();
                    return (buf, true);
                }
            }
            Err(_) => return (buf, false),
        }
    }
}

async fn kill_group(pgid: Option<Pid>, child: &mut Child) {
    match pgid {
        Some(pgid) => {
            if let Err(e) = killpg(pgid, Signal::SIGKILL) {
                debug!(error = %e, "killpg failed, killing direct child");
                let _ = child.start_kill();
            }
        }
        None => {
            let _ = child.start_kill();
        }
    }
}

/// Strip launcher log lines from captured stderr so infrastructure
/// noise never reaches users. A log line starts with `[` and carries
/// the launcher's token (e.g. `[I][2024-...] nsjail ...`).
pub fn filter_launcher_noise(stderr: &str, token: &str) -> String {
    let had_trailing_newline = stderr.ends_with('\n');
    let mut filtered: String = stderr
        .lines()
        .filter(|line| !(line.starts_with('[') && line.contains(token)))
        .collect::<Vec<_>>()
        .join("\n");
    if had_trailing_newline && !filtered.is_empty() {
        filtered.push('\n');
    }
    filtered
}

pub fn lossy_utf8(bytes: Vec<u8>) -> String {
    String::from_utf8_lossy(&bytes).into_owned()
}
