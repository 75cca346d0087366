use std::fmt;
use std::time::Duration;

/// Failure of a runtime CLI invocation.
#[derive(Debug)]
pub enum RuntimeError {
    /// The command did not finish in time.
    Timeout { command: String, timeout: Duration },

    /// The command ran but returned non-zero exit.
    CommandFailed {
        command: String,
        output: String,
        exit_code: Option<i32>,
    },

    /// The runtime binary couldn't be executed (not in PATH, permission denied).
    ExecFailed {
        command: String,
        source: std::io::Error,
    },
}

impl RuntimeError {
    pub fn timeout(cmd: impl Into<String>, dur: Duration) -> Self {
        RuntimeError::Timeout {
            command: cmd.into(),
            timeout: dur,
        }
    }

    /// Create a command-failed error from an `std::process::Output`.
    pub fn failed(cmd: impl Into<String>, output: &std::process::Output) -> Self {
        RuntimeError::CommandFailed {
            command: cmd.into(),
            output: combined_output(output),
            exit_code: output.status.code(),
        }
    }

    pub fn exec_failed(cmd: impl Into<String>, err: std::io::Error) -> Self {
        RuntimeError::ExecFailed {
            command: cmd.into(),
            source: err,
        }
    }
}

/// Stdout followed by stderr, trimmed.
pub(crate) fn combined_output(output: &std::process::Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text.trim().to_string()
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::Timeout { command, timeout } => write!(
                f,
                "Timed out running '{}' (exceeded {} seconds)",
                command,
                timeout.as_secs()
            ),
            RuntimeError::CommandFailed {
                command,
                output,
                exit_code: Some(code),
            } => write!(f, "'{}' failed (exit code {}): {}", command, code, output),
            RuntimeError::CommandFailed {
                command, output, ..
            } => write!(f, "'{}' failed: {}", command, output),
            RuntimeError::ExecFailed { command, source } => {
                write!(f, "Failed to execute '{}': {}", command, source)
            }
        }
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RuntimeError::ExecFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}
