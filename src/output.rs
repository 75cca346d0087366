use std::io::Write;

/// Abstraction over user-facing output.
///
/// Command modules use this trait instead of `println!`/`eprintln!` so that
/// acknowledgements can be silenced with `--quiet` while failures stay visible.
pub trait UserOutput: Send + Sync {
    /// Informational status message (e.g., "Starting 'mqtt-broker'")
    fn status(&self, message: &str);

    /// Success message (e.g., "> mqtt-broker running")
    fn success(&self, message: &str);

    /// Warning message (e.g., "Process terminated: 'feeder' result: exited(1)")
    fn warning(&self, message: &str);

    /// Error message
    fn error(&self, message: &str);

    /// Full captured log of a service, framed by start/end markers.
    fn log_dump(&self, service: &str, log: &str);

    /// A blank line separator.
    fn blank(&self);
}

fn write_log_dump(mut w: impl Write, service: &str, log: &str) {
    let _ = writeln!(w, ">>>> Start log of {} >>>>", service);
    let _ = write!(w, "{}", log);
    if !log.is_empty() && !log.ends_with('\n') {
        let _ = writeln!(w);
    }
    let _ = writeln!(w, "<<<< End log of {} <<<<", service);
    let _ = w.flush();
}

/// Standard CLI output: acknowledgements on stdout, problems on stderr.
pub struct CliOutput;

impl UserOutput for CliOutput {
    fn status(&self, message: &str) {
        println!("{}", message);
    }

    fn success(&self, message: &str) {
        println!("{}", message);
    }

    fn warning(&self, message: &str) {
        eprintln!("{}", message);
    }

    fn error(&self, message: &str) {
        eprintln!("\x1b[31m{}\x1b[0m", message);
    }

    fn log_dump(&self, service: &str, log: &str) {
        write_log_dump(std::io::stdout().lock(), service, log);
    }

    fn blank(&self) {
        println!();
    }
}

/// Suppresses acknowledgements; errors and log dumps still reach stderr.
pub struct QuietOutput;

impl UserOutput for QuietOutput {
    fn status(&self, _message: &str) {}
    fn success(&self, _message: &str) {}
    fn warning(&self, _message: &str) {}

    fn error(&self, message: &str) {
        eprintln!("{}", message);
    }

    fn log_dump(&self, service: &str, log: &str) {
        write_log_dump(std::io::stderr().lock(), service, log);
    }

    fn blank(&self) {}
}
