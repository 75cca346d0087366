use super::{LogHandle, LogTail, ProcessHandle, ProcessState};
use crate::error::Result;
use regex::Regex;
use std::time::Duration;
use tokio::time::Instant;

/// Default sleep between reads while no new log line is available.
pub const DEFAULT_TAIL_INTERVAL: Duration = Duration::from_millis(100);

/// Terminal result of waiting for one launch to become ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessOutcome {
    Ready,
    /// Not ready before the timeout; the process has been killed.
    TimedOut,
    /// The process exited before every pattern matched.
    ProcessExited(Option<i32>),
}

/// Set of start patterns that must all match the log stream, in any order.
///
/// Matched patterns are removed from the pending set; the matcher is consumed
/// by the wait, so a satisfied launch is never evaluated again.
#[derive(Debug, Clone)]
pub struct ReadinessMatcher {
    pending: Vec<Regex>,
    poll_interval: Duration,
}

impl ReadinessMatcher {
    pub fn new(patterns: Vec<Regex>) -> Self {
        Self {
            pending: patterns,
            poll_interval: DEFAULT_TAIL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Number of patterns that have not matched yet.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_satisfied(&self) -> bool {
        self.pending.is_empty()
    }

    /// Test one log line against every pending pattern. Returns whether the
    /// matcher is now satisfied.
    pub fn observe(&mut self, line: &str) -> bool {
        self.pending.retain(|pattern| !pattern.is_match(line));
        self.is_satisfied()
    }

    /// Wait for readiness of `process`, following `log` from its current end.
    /// Output written before this call is ignored.
    pub async fn wait_for_ready(
        self,
        log: &LogHandle,
        process: &mut ProcessHandle,
        timeout: Duration,
    ) -> Result<ReadinessOutcome> {
        if self.is_satisfied() {
            return Ok(ReadinessOutcome::Ready);
        }
        let mut tail = log.tail()?;
        self.wait_on_tail(&mut tail, process, timeout).await
    }

    /// Wait for readiness using an already positioned tail cursor.
    ///
    /// Returns `Ready` as soon as every pattern matched, `ProcessExited` as soon
    /// as the process is gone with patterns still pending, and `TimedOut` after
    /// killing the process once `timeout` elapsed.
    pub async fn wait_on_tail(
        mut self,
        tail: &mut LogTail,
        process: &mut ProcessHandle,
        timeout: Duration,
    ) -> Result<ReadinessOutcome> {
        if self.is_satisfied() {
            return Ok(ReadinessOutcome::Ready);
        }

        let deadline = Instant::now() + timeout;
        loop {
            // Sample the exit state before draining, so output written right
            // before the exit is still matched.
            let state = process.poll()?;

            while let Some(line) = tail.next_line().await? {
                if self.observe(&line) {
                    tracing::debug!("'{}' is ready", process.service_id());
                    return Ok(ReadinessOutcome::Ready);
                }
            }
            // Output without a trailing newline (prompts, a last line before
            // exit) counts as well.
            if let Some(fragment) = tail.peek_partial() {
                if self.observe(&fragment) {
                    tracing::debug!("'{}' is ready", process.service_id());
                    return Ok(ReadinessOutcome::Ready);
                }
            }

            match state {
                ProcessState::Exited(code) => {
                    return Ok(ReadinessOutcome::ProcessExited(code));
                }
                ProcessState::Killed => return Ok(ReadinessOutcome::ProcessExited(None)),
                ProcessState::NotStarted | ProcessState::Running => {}
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(
                    "'{}' not ready after {:?} ({} start pattern(s) unmatched), killing it",
                    process.service_id(),
                    timeout,
                    self.pending()
                );
                process.kill().await?;
                return Ok(ReadinessOutcome::TimedOut);
            }

            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}
