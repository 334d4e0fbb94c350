use std::io::Read;
use std::process::{Child, Command, Output, Stdio};
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{Error, Result};

/// A builder for subprocess invocations with unified error handling and a
/// hard deadline. Every external call in this crate (tmux queries, the
/// type-keys primitive, remote shells, process walks) goes through here so
/// that no operation can block past its deadline.
pub struct Cmd {
    program: String,
    args: Vec<String>,
    deadline: Option<Duration>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            deadline: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Kill the child and return [`Error::Timeout`] if it has not exited
    /// within `deadline`.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Execute and return the output. Non-zero exit status is an error
    /// carrying the trimmed stderr.
    pub fn run(self) -> Result<Output> {
        let label = self.label();
        trace!(command = %label, "cmd:run start");

        let output = self.execute()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(
                command = %label,
                status = ?output.status.code(),
                stderr = %stderr.trim(),
                "cmd:run failure"
            );
            return Err(Error::Other(anyhow::anyhow!(
                "Command failed: {}\n{}",
                label,
                stderr.trim()
            )));
        }
        trace!(command = %label, "cmd:run success");
        Ok(output)
    }

    /// Execute and return stdout as a trimmed string.
    pub fn run_and_capture_stdout(self) -> Result<String> {
        let output = self.run()?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Execute, returning Ok(true) on success and Ok(false) on non-zero
    /// exit. Spawn failures and deadline expiry are still errors.
    pub fn run_as_check(self) -> Result<bool> {
        let label = self.label();
        trace!(command = %label, "cmd:check start");
        let output = self.execute()?;
        let success = output.status.success();
        trace!(command = %label, success, "cmd:check result");
        Ok(success)
    }

    fn label(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }

    fn execute(self) -> Result<Output> {
        let label = self.label();
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        match self.deadline {
            None => Ok(command.output()?),
            Some(deadline) => {
                let child = command.spawn()?;
                wait_with_deadline(child, deadline, &label)
            }
        }
    }
}

/// Wait for a spawned child with a deadline. Output pipes are drained on
/// separate threads so a child that fills its pipe cannot wedge the wait.
fn wait_with_deadline(mut child: Child, deadline: Duration, label: &str) -> Result<Output> {
    use wait_timeout::ChildExt;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let out_reader = std::thread::spawn(move || drain(stdout));
    let err_reader = std::thread::spawn(move || drain(stderr));

    match child.wait_timeout(deadline)? {
        Some(status) => Ok(Output {
            status,
            stdout: out_reader.join().unwrap_or_default(),
            stderr: err_reader.join().unwrap_or_default(),
        }),
        None => {
            let _ = child.kill();
            let _ = child.wait();
            debug!(command = %label, seconds = deadline.as_secs(), "cmd:deadline exceeded");
            Err(Error::Timeout {
                operation: label.to_string(),
                seconds: deadline.as_secs(),
            })
        }
    }
}

fn drain(pipe: Option<impl Read>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_captures_stdout() {
        let out = Cmd::new("echo").arg("hello").run_and_capture_stdout();
        assert_eq!(out.unwrap(), "hello");
    }

    #[test]
    fn run_fails_on_nonzero_exit() {
        let result = Cmd::new("false").run();
        assert!(result.is_err());
    }

    #[test]
    fn check_reports_exit_status() {
        assert!(Cmd::new("true").run_as_check().unwrap());
        assert!(!Cmd::new("false").run_as_check().unwrap());
    }

    #[test]
    fn deadline_kills_slow_command() {
        let result = Cmd::new("sleep")
            .arg("5")
            .deadline(Duration::from_millis(50))
            .run();
        match result {
            Err(Error::Timeout { operation, .. }) => assert!(operation.contains("sleep")),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn deadline_passes_fast_command() {
        let out = Cmd::new("echo")
            .arg("quick")
            .deadline(Duration::from_secs(2))
            .run_and_capture_stdout();
        assert_eq!(out.unwrap(), "quick");
    }
}
