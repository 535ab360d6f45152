//! Child processes with a deadline.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How long a pipe may stay open once the child itself is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// What a finished (or killed) child left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProcessOutput {
    pub exit_code: Option<i32>,
    pub success: bool,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ProcessOutput {
    /// Last non-empty line of stderr, falling back to stdout.
    pub fn last_line(&self) -> &str {
        [&self.stderr, &self.stdout]
            .into_iter()
            .find_map(|s| s.lines().rev().map(str::trim).find(|l| !l.is_empty()))
            .unwrap_or("")
    }
}

/// Spawn `command`, poll until it exits, kill it once `timeout` elapses.
///
/// On unix the child leads its own process group and a timeout kills the
/// whole group, so processes it forked die with it. Both pipes are drained
/// on their own threads; a pipe still held open by an orphan is abandoned
/// after a short grace period instead of being waited on.
pub(crate) fn run_with_timeout(
    command: &mut Command,
    timeout: Duration,
) -> std::io::Result<ProcessOutput> {
    let start = Instant::now();
    own_process_group(command);
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let (status, timed_out) = wait(&mut child, start, timeout)?;

    let grace = Instant::now() + DRAIN_GRACE;
    let deadline = if timed_out { grace } else { (start + timeout).max(grace) };

    Ok(ProcessOutput {
        exit_code: status.and_then(|s| s.code()),
        success: !timed_out && status.is_some_and(|s| s.success()),
        timed_out,
        stdout: collect(stdout, deadline),
        stderr: collect(stderr, deadline),
        duration: start.elapsed(),
    })
}

#[cfg(unix)]
fn own_process_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_command: &mut Command) {}

fn wait(
    child: &mut Child,
    start: Instant,
    timeout: Duration,
) -> std::io::Result<(Option<ExitStatus>, bool)> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((Some(status), false));
        }
        if start.elapsed() >= timeout {
            kill_tree(child);
            let _ = child.wait();
            return Ok((None, true));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Kill the child and, on unix, every process left in its group.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        let _ = Command::new("kill")
            .args(["-KILL", "--", &group])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
    let _ = child.kill();
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<String>> {
    pipe.map(|mut pipe| {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
        });
        rx
    })
}

fn collect(pipe: Option<Receiver<String>>, deadline: Instant) -> String {
    pipe.and_then(|rx| {
        rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
            .ok()
    })
    .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_output_and_status() {
        let out = run_with_timeout(&mut sh("echo out; echo err >&2; exit 3"), Duration::from_secs(10))
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success);
        assert!(!out.timed_out);
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.last_line(), "err");
    }

    #[test]
    fn kills_on_timeout() {
        let out = run_with_timeout(&mut sh("sleep 5"), Duration::from_millis(200)).unwrap();
        assert!(out.timed_out);
        assert!(!out.success);
        assert!(out.duration < Duration::from_secs(5));
    }

    #[test]
    fn timeout_kills_forked_children_too() {
        let started = Instant::now();
        let out = run_with_timeout(
            &mut sh("sleep 8; echo done"),
            Duration::from_millis(300),
        )
        .unwrap();
        assert!(out.timed_out);
        assert!(!out.stdout.contains("done"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn background_child_holding_the_pipe_does_not_block_exit() {
        let started = Instant::now();
        let out = run_with_timeout(&mut sh("sleep 8 & echo started"), Duration::from_secs(2))
            .unwrap();
        assert!(!out.timed_out);
        assert!(out.success);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn large_output_does_not_block() {
        let out = run_with_timeout(
            &mut sh("i=0; while [ $i -lt 20000 ]; do echo line-$i; i=$((i+1)); done"),
            Duration::from_secs(30),
        )
        .unwrap();
        assert!(out.success);
        assert_eq!(out.stdout.lines().count(), 20000);
    }

    #[test]
    fn missing_program_is_an_io_error() {
        let err = run_with_timeout(
            &mut Command::new("kiln-test-no-such-program"),
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
