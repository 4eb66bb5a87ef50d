//! Subprocess invocation with a hard timeout.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{JanitorError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(25);
/// How long to wait for output after a kill; grandchildren may hold the pipes.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Captured result of one finished (or killed) child process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessOutput {
    /// `None` when the child was killed or terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock seconds.
    pub duration: f64,
    pub timed_out: bool,
}

fn drain<R: Read + Send + 'static>(stream: Option<R>) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut stream) = stream {
            let _ = stream.read_to_end(&mut buf);
        }
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

fn collect(rx: &Receiver<String>, timed_out: bool) -> String {
    if timed_out {
        rx.recv_timeout(DRAIN_GRACE).unwrap_or_default()
    } else {
        rx.recv().unwrap_or_default()
    }
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> Result<(Option<i32>, bool)> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status.code(), false));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok((None, true));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Run `argv` in `cwd`, killing it once `timeout` elapses.
///
/// Output streams are drained on background threads so a chatty child
/// cannot block on a full pipe.
///
/// # Errors
///
/// Returns `RunnerLaunch` if the program cannot be started. A non-zero exit
/// or a timeout is reported in the output, not as an error.
pub fn run_command(argv: &[String], cwd: &Path, timeout: Duration) -> Result<ProcessOutput> {
    let (program, args) = argv.split_first().ok_or_else(|| JanitorError::RunnerLaunch {
        command: String::new(),
        reason: "empty command".to_string(),
    })?;
    let command_line = argv.join(" ");
    tracing::debug!(
        command = %command_line,
        cwd = %cwd.display(),
        timeout_secs = timeout.as_secs(),
        "Spawning test runner"
    );

    let started = Instant::now();
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .env("CI", "1")
        .env("NO_COLOR", "1")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| JanitorError::RunnerLaunch {
            command: command_line.clone(),
            reason: err.to_string(),
        })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let (exit_code, timed_out) = wait_with_deadline(&mut child, timeout)?;
    let duration = started.elapsed().as_secs_f64();

    let output = ProcessOutput {
        exit_code,
        stdout: collect(&stdout, timed_out),
        stderr: collect(&stderr, timed_out),
        duration,
        timed_out,
    };
    if timed_out {
        tracing::warn!(
            command = %command_line,
            timeout_secs = timeout.as_secs(),
            "Test runner timed out and was killed"
        );
    } else {
        tracing::debug!(
            command = %command_line,
            exit_code = ?output.exit_code,
            duration = output.duration,
            "Test runner finished"
        );
    }
    Ok(output)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn captures_streams_and_exit_code() {
        let temp = TempDir::new().unwrap();
        let out = run_command(
            &sh("echo out; echo err >&2; exit 3"),
            temp.path(),
            Duration::from_secs(10),
        )
        .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
        assert!(!out.timed_out);
    }

    #[test]
    fn timeout_kills_child() {
        let temp = TempDir::new().unwrap();
        let out =
            run_command(&sh("exec sleep 5"), temp.path(), Duration::from_millis(200)).unwrap();
        assert!(out.timed_out);
        assert_eq!(out.exit_code, None);
        assert!(out.duration < 5.0);
    }

    #[test]
    fn missing_program_is_launch_error() {
        let temp = TempDir::new().unwrap();
        let err = run_command(
            &["definitely-not-a-real-runner-xyz".to_string()],
            temp.path(),
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, JanitorError::RunnerLaunch { .. }));
    }
}
