#![forbid(unsafe_code)]

//! Runs one job command as a shell child and captures its result.
//!
//! The child gets its own process group so a timeout can kill every descendant, not only
//! the shell. Output is drained on helper threads while the caller polls for exit, which
//! keeps a chatty command from blocking on a full pipe.

use qc_core::Outcome;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Reported when the command cannot be launched at all (mirrors the shell's "not found").
pub const LAUNCH_FAILURE_CODE: i32 = 127;
/// Reported when the command was killed for exceeding the job timeout.
pub const TIMEOUT_CODE: i32 = -1;

const WAIT_SLICE: Duration = Duration::from_millis(20);
/// How long to wait for output after a timeout kill before abandoning the pipes.
const KILL_GRACE: Duration = Duration::from_secs(1);

pub fn execute(command: &str, timeout: Option<Duration>) -> Outcome {
    execute_with_ticks(command, timeout, Duration::MAX, &mut || {})
}

/// Like [`execute`], calling `on_tick` roughly every `tick_every` while the child runs.
pub fn execute_with_ticks(
    command: &str,
    timeout: Option<Duration>,
    tick_every: Duration,
    on_tick: &mut dyn FnMut(),
) -> Outcome {
    let started = Instant::now();
    let spawned = shell_command(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn();
    let mut child = match spawned {
        Ok(child) => child,
        Err(err) => {
            warn!(error = %err, "failed to launch command");
            return Outcome {
                return_code: LAUNCH_FAILURE_CODE,
                stdout: String::new(),
                stderr: format!("failed to launch command: {err}"),
                duration_ms: elapsed_ms(started),
                timed_out: false,
            };
        }
    };

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    // The attempt ends when the shell has exited and both pipes are closed. A background
    // descendant can hold the pipes open after the shell exits, so the deadline stays armed
    // until then.
    let mut timed_out = false;
    let mut reaped = false;
    let mut status = None;
    let mut last_tick = started;
    loop {
        if !reaped {
            match child.try_wait() {
                Ok(Some(exit)) => {
                    reaped = true;
                    status = Some(exit);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(error = %err, "polling child failed; blocking on wait");
                    reaped = true;
                    status = child.wait().ok();
                }
            }
        }
        if reaped && stdout.is_finished() && stderr.is_finished() {
            break;
        }
        if last_tick.elapsed() >= tick_every {
            last_tick = Instant::now();
            on_tick();
        }
        if let Some(limit) = timeout
            && started.elapsed() >= limit
        {
            timed_out = true;
            kill_tree(&mut child);
            if !reaped {
                status = child.wait().ok();
            }
            break;
        }
        thread::sleep(WAIT_SLICE);
    }

    let grace = if timed_out { KILL_GRACE } else { Duration::MAX };
    let stdout = collect(stdout, grace);
    let mut stderr = collect(stderr, grace);
    let duration_ms = elapsed_ms(started);

    let return_code = if timed_out {
        if !stderr.is_empty() && !stderr.ends_with('\n') {
            stderr.push('\n');
        }
        let limit = timeout.unwrap_or_default();
        stderr.push_str(&format!("TIMEOUT after {}s", limit.as_secs_f64()));
        TIMEOUT_CODE
    } else {
        match status {
            Some(status) => exit_code(status),
            None => {
                stderr.push_str("failed to collect command exit status");
                TIMEOUT_CODE
            }
        }
    };

    debug!(return_code, duration_ms, timed_out, "command finished");
    Outcome {
        return_code,
        stdout,
        stderr,
        duration_ms,
        timed_out,
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    use std::os::unix::process::CommandExt;

    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command).process_group(0);
    cmd
}

#[cfg(not(unix))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Joins a drain thread, giving up after `grace` if the pipe is still held open by a process
/// outside the killed group.
fn collect(handle: JoinHandle<String>, grace: Duration) -> String {
    let started = Instant::now();
    while !handle.is_finished() {
        if started.elapsed() >= grace {
            debug!("output pipe still open after kill; dropping remaining output");
            return String::new();
        }
        thread::sleep(WAIT_SLICE);
    }
    handle.join().unwrap_or_default()
}

#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let group = i32::try_from(child.id()).map(Pid::from_raw);
    let killed = match group {
        Ok(group) => killpg(group, Signal::SIGKILL).is_ok(),
        Err(_) => false,
    };
    if !killed {
        debug!("process group kill failed; killing the shell only");
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    TIMEOUT_CODE
}

fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}
