use miette::Diagnostic;
use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    #[diagnostic(code(vrt::config::invalid))]
    Config(String),

    #[error("Service catalog error: {0}")]
    #[diagnostic(
        code(vrt::catalog::invalid),
        help("Check the runtime description file (runtime.json) for the reported entry")
    )]
    Catalog(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Service with id '{service}' not defined")]
    #[diagnostic(
        code(vrt::service::not_found),
        help("List the known services with `vrt list`")
    )]
    ServiceNotFound {
        service: String,
        available: Vec<String>,
    },

    #[error("Failed to launch service '{service}': {source}")]
    #[diagnostic(
        code(vrt::service::launch_failed),
        help("Check that the runtime executable exists and is executable")
    )]
    Launch {
        service: String,
        #[source]
        source: io::Error,
    },

    #[error("Starting service '{service}' failed: {reason}")]
    #[diagnostic(
        code(vrt::service::startup_failed),
        help("The captured log of '{service}' is attached to this error")
    )]
    StartupFailed {
        service: String,
        reason: StartupFailure,
        log: String,
    },

    #[error("{0}")]
    #[diagnostic(code(vrt::service::stop_failed))]
    Stop(StopError),

    #[error("Failed to stop {} service(s): {}", .0.len(), format_stop_errors(.0))]
    #[diagnostic(
        code(vrt::service::stop_all_failed),
        help("Remaining services were still stopped; stop the failed ones manually")
    )]
    StopFailed(Vec<StopError>),

    #[error("Operation aborted by shutdown signal")]
    Aborted,

    #[error("Application '{executable}' failed {}", format_app_exit(.exit_code))]
    #[diagnostic(code(vrt::app::failed))]
    AppFailed {
        executable: String,
        exit_code: Option<i32>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why a service never became ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupFailure {
    /// Readiness patterns did not all match before the startup timeout.
    TimedOut(Duration),
    /// The process exited before all readiness patterns matched.
    UnexpectedExit { exit_code: Option<i32> },
    /// The process reported readiness and then exited with a non-zero code
    /// while the supervisor was still settling the start.
    NonZeroExit { exit_code: i32 },
}

impl fmt::Display for StartupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupFailure::TimedOut(after) => write!(
                f,
                "timeout reached after {} seconds, service killed",
                after.as_secs_f64()
            ),
            StartupFailure::UnexpectedExit {
                exit_code: Some(code),
            } => write!(f, "service unexpectedly terminated with exit code {}", code),
            StartupFailure::UnexpectedExit { exit_code: None } => {
                write!(f, "service unexpectedly terminated by a signal")
            }
            StartupFailure::NonZeroExit { exit_code } => write!(
                f,
                "service exited with code {} right after becoming ready",
                exit_code
            ),
        }
    }
}

/// A single failure while stopping a service. Collected, never fatal for a stop-all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopError {
    pub service: String,
    pub message: String,
}

impl StopError {
    pub fn new(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for StopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stopping '{}' failed: {}", self.service, self.message)
    }
}

fn format_stop_errors(errors: &[StopError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn format_app_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("with exit code {}", code),
        None => "after being terminated by a signal".to_string(),
    }
}

impl Error {
    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::ServiceNotFound { available, .. } if !available.is_empty() => Some(format!(
                "Available services:\n{}",
                available
                    .iter()
                    .map(|id| format!(" * '{}'", id))
                    .collect::<Vec<_>>()
                    .join("\n")
            )),
            Error::ServiceNotFound { .. } => {
                Some("The service catalog is empty. Check your runtime.json".to_string())
            }
            Error::Launch { .. } => Some(
                "Check that the container runtime (e.g. docker) is installed and on PATH"
                    .to_string(),
            ),
            Error::StartupFailed { service, .. } => Some(format!(
                "Log files can be found in your workspace's logs directory (service '{}')",
                service
            )),
            Error::StopFailed(_) | Error::Stop(_) => {
                Some("Check the container runtime with `docker ps`".to_string())
            }
            _ => None,
        }
    }

    /// The service this error is attributed to, if any.
    pub fn service(&self) -> Option<&str> {
        match self {
            Error::ServiceNotFound { service, .. }
            | Error::Launch { service, .. }
            | Error::StartupFailed { service, .. } => Some(service),
            Error::Stop(e) => Some(&e.service),
            _ => None,
        }
    }
}

#[cfg(unix)]
/// Validate a PID before signalling it. Rejects 0 (process group of the caller),
/// 1 (init) and values that do not fit a `pid_t`.
pub fn validate_pid(pid: u32, service_id: &str) -> Result<nix::unistd::Pid> {
    if pid == 0 || pid == 1 || pid > i32::MAX as u32 {
        return Err(Error::Stop(StopError::new(
            service_id,
            format!("refusing to signal invalid PID {}", pid),
        )));
    }
    Ok(nix::unistd::Pid::from_raw(pid as i32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_failure_display() {
        let timed_out = StartupFailure::TimedOut(Duration::from_secs(60));
        assert!(timed_out.to_string().contains("60 seconds"));

        let exited = StartupFailure::UnexpectedExit { exit_code: Some(1) };
        assert!(exited.to_string().contains("exit code 1"));

        let signalled = StartupFailure::UnexpectedExit { exit_code: None };
        assert!(signalled.to_string().contains("signal"));
    }

    #[test]
    fn test_service_not_found_suggestion_lists_services() {
        let err = Error::ServiceNotFound {
            service: "foo_bar_baz".to_string(),
            available: vec!["mqtt-broker".to_string(), "vehicledatabroker".to_string()],
        };
        assert_eq!(err.to_string(), "Service with id 'foo_bar_baz' not defined");
        let hint = err.suggestion().unwrap();
        assert!(hint.contains(" * 'mqtt-broker'"));
        assert!(hint.contains(" * 'vehicledatabroker'"));
    }

    #[test]
    fn test_stop_failed_joins_all_errors() {
        let err = Error::StopFailed(vec![
            StopError::new("a", "boom"),
            StopError::new("b", "bang"),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("2 service(s)"));
        assert!(msg.contains("'a'"));
        assert!(msg.contains("'b'"));
    }

    #[test]
    fn test_error_service_attribution() {
        let err = Error::StartupFailed {
            service: "broker".to_string(),
            reason: StartupFailure::UnexpectedExit { exit_code: Some(1) },
            log: String::new(),
        };
        assert_eq!(err.service(), Some("broker"));
        assert_eq!(Error::Aborted.service(), None);
    }

    #[test]
    fn test_app_failed_display() {
        let exited = Error::AppFailed {
            executable: "./app".to_string(),
            exit_code: Some(3),
        };
        assert_eq!(exited.to_string(), "Application './app' failed with exit code 3");

        let signalled = Error::AppFailed {
            executable: "./app".to_string(),
            exit_code: None,
        };
        assert!(signalled.to_string().contains("signal"));
    }

    #[cfg(unix)]
    #[test]
    fn test_validate_pid_rejects_reserved() {
        assert!(validate_pid(0, "svc").is_err());
        assert!(validate_pid(1, "svc").is_err());
        assert!(validate_pid(u32::MAX, "svc").is_err());
        assert!(validate_pid(4242, "svc").is_ok());
    }
}
