//! Process-level building blocks of the supervisor.
//!
//! - **Log sink** ([`LogSink`], [`LogHandle`], [`LogTail`]): one append-only log
//!   file per service, plus independent read cursors for live tailing
//! - **Process launcher** ([`ProcessLauncher`], [`ProcessHandle`]): spawns a
//!   command in its own process group with stdout and stderr in the log
//! - **Readiness matcher** ([`ReadinessMatcher`]): waits until every start
//!   pattern matched a log line, the process exited, or the timeout fired

mod launcher;
mod log_sink;
mod readiness;

pub use launcher::*;
pub use log_sink::*;
pub use readiness::*;
