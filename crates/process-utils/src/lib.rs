//! Child-process helpers shared across the workspace.
//!
//! Resolver backends shell out to extraction tools; these helpers keep the
//! spawning conventions (hidden console on Windows, kill on drop, bounded
//! waits) in one place.

use std::ffi::OsStr;
#[cfg(feature = "tokio")]
use std::process::{Output, Stdio};
#[cfg(feature = "tokio")]
use std::time::Duration;

use thiserror::Error;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Errors raised while running a child process.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn process: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("process timed out after {0:?}")]
    TimedOut(std::time::Duration),
}

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

impl NoWindowExt for std::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `std::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
pub fn std_command(program: impl AsRef<OsStr>) -> std::process::Command {
    let mut cmd = std::process::Command::new(program);
    cmd.no_window();
    cmd
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` for a short-lived helper.
///
/// The child is killed when the owning future is dropped, so abandoning a
/// request never leaves a stray extractor process behind.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd.kill_on_drop(true);
    cmd
}

/// Run `cmd` to completion, capturing stdout and stderr, for at most `timeout`.
///
/// A non-zero exit status is not an error here; callers inspect
/// [`Output::status`] themselves.
#[cfg(feature = "tokio")]
pub async fn output_with_timeout(
    cmd: &mut tokio::process::Command,
    timeout: Duration,
) -> Result<Output, ProcessError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn()?;
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => Ok(output?),
        // Dropping the wait future drops the child, which kills it.
        Err(_) => Err(ProcessError::TimedOut(timeout)),
    }
}

#[cfg(all(test, unix, feature = "tokio"))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout() {
        let mut cmd = tokio_command("sh");
        cmd.arg("-c").arg("echo hello");
        let out = output_with_timeout(&mut cmd, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(out.status.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hello");
    }

    #[tokio::test]
    async fn reports_non_zero_exit_without_error() {
        let mut cmd = tokio_command("sh");
        cmd.arg("-c").arg("echo boom >&2; exit 3");
        let out = output_with_timeout(&mut cmd, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.status.code(), Some(3));
        assert_eq!(String::from_utf8_lossy(&out.stderr).trim(), "boom");
    }

    #[tokio::test]
    async fn times_out_long_running_child() {
        let mut cmd = tokio_command("sleep");
        cmd.arg("5");
        let err = output_with_timeout(&mut cmd, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::TimedOut(_)));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let mut cmd = tokio_command("definitely-not-a-real-binary-xyz");
        let err = output_with_timeout(&mut cmd, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn(_)));
    }
}
