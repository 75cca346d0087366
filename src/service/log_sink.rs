//! Per-service log files.
//!
//! Every spawned process writes its interleaved stdout and stderr into a
//! single append-only file at `<logs_dir>/<category>/<service>.log`. The
//! readiness matcher follows the same file through a separate [`LogTail`]
//! cursor, so writing and tailing never share a file position.

use crate::error::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Factory for log handles under one logs directory and category.
#[derive(Debug, Clone)]
pub struct LogSink {
    dir: PathBuf,
    category: String,
}

impl LogSink {
    pub fn new(logs_dir: impl Into<PathBuf>, category: impl Into<String>) -> Self {
        Self {
            dir: logs_dir.into(),
            category: category.into(),
        }
    }

    /// Path of the log file of `service_id`.
    pub fn path(&self, service_id: &str) -> PathBuf {
        self.dir
            .join(&self.category)
            .join(format!("{}.log", service_id))
    }

    /// Open (creating if absent) the log of `service_id` for appending.
    /// Existing content is never truncated.
    pub fn open(&self, service_id: &str) -> Result<LogHandle> {
        let path = self.path(service_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Config(format!(
                    "Failed to create log directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(LogHandle {
            service_id: service_id.to_string(),
            path,
            file,
        })
    }
}

/// Append-only log of one service.
#[derive(Debug)]
pub struct LogHandle {
    service_id: String,
    path: PathBuf,
    file: File,
}

impl LogHandle {
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line (a trailing newline is added).
    pub fn write_line(&self, line: &str) -> Result<()> {
        let mut file = &self.file;
        writeln!(file, "{}", line)?;
        file.flush()?;
        Ok(())
    }

    /// Stdout and stderr handles writing into this log, for a child process.
    pub fn stdio(&self) -> Result<(Stdio, Stdio)> {
        let stdout = self.file.try_clone()?;
        let stderr = self.file.try_clone()?;
        Ok((Stdio::from(stdout), Stdio::from(stderr)))
    }

    /// Open an independent read cursor positioned at the current end of the log.
    pub fn tail(&self) -> Result<LogTail> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::End(0))?;
        Ok(LogTail {
            reader: BufReader::new(tokio::fs::File::from_std(file)),
            pending: Vec::new(),
        })
    }

    /// Whole log content, decoded lossily as UTF-8.
    pub fn read_all(&self) -> Result<String> {
        let bytes = fs::read(&self.path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Read cursor following a growing log file.
pub struct LogTail {
    reader: BufReader<tokio::fs::File>,
    /// Bytes of a line whose newline has not been written yet.
    pending: Vec<u8>,
}

impl LogTail {
    /// Next complete line appended since the last call, without its line ending.
    ///
    /// Returns `Ok(None)` when no complete line is available yet; a partially
    /// written line is kept and completed by later calls.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        let read = self.reader.read_until(b'\n', &mut self.pending).await?;
        if read == 0 || self.pending.last() != Some(&b'\n') {
            return Ok(None);
        }

        let mut line = std::mem::take(&mut self.pending);
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }

    /// The not yet terminated fragment after the last complete line, if any.
    /// It stays buffered and is still returned by `next_line` once completed.
    pub fn peek_partial(&self) -> Option<String> {
        let mut fragment = self.pending.as_slice();
        if fragment.last() == Some(&b'\r') {
            fragment = &fragment[..fragment.len() - 1];
        }
        if fragment.is_empty() {
            return None;
        }
        Some(String::from_utf8_lossy(fragment).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_path_convention() {
        let sink = LogSink::new("/ws/logs", "runtime_local");
        assert_eq!(
            sink.path("mqtt-broker"),
            PathBuf::from("/ws/logs/runtime_local/mqtt-broker.log")
        );
    }

    #[test]
    fn test_open_appends_without_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LogSink::new(dir.path(), "runtime_local");

        sink.open("svc").unwrap().write_line("first run").unwrap();
        sink.open("svc").unwrap().write_line("second run").unwrap();

        let content = sink.open("svc").unwrap().read_all().unwrap();
        assert_eq!(content, "first run\nsecond run\n");
    }

    #[tokio::test]
    async fn test_tail_starts_at_end() {
        let dir = tempfile::tempdir().unwrap();
        let log = LogSink::new(dir.path(), "c").open("svc").unwrap();
        log.write_line("old output").unwrap();

        let mut tail = log.tail().unwrap();
        assert_eq!(tail.next_line().await.unwrap(), None);

        log.write_line("new output").unwrap();
        assert_eq!(
            tail.next_line().await.unwrap(),
            Some("new output".to_string())
        );
        assert_eq!(tail.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_tail_waits_for_complete_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = LogSink::new(dir.path(), "c").open("svc").unwrap();
        let mut tail = log.tail().unwrap();

        let mut writer = OpenOptions::new().append(true).open(log.path()).unwrap();
        write!(writer, "listening on ").unwrap();
        writer.flush().unwrap();
        assert_eq!(tail.next_line().await.unwrap(), None);

        write!(writer, "port 1883\r\nnext").unwrap();
        writer.flush().unwrap();
        assert_eq!(
            tail.next_line().await.unwrap(),
            Some("listening on port 1883".to_string())
        );
        assert_eq!(tail.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_peek_partial_keeps_fragment_buffered() {
        let dir = tempfile::tempdir().unwrap();
        let log = LogSink::new(dir.path(), "c").open("svc").unwrap();
        let mut tail = log.tail().unwrap();
        assert_eq!(tail.peek_partial(), None);

        let mut writer = OpenOptions::new().append(true).open(log.path()).unwrap();
        write!(writer, "listening on ").unwrap();
        writer.flush().unwrap();
        assert_eq!(tail.next_line().await.unwrap(), None);
        assert_eq!(tail.peek_partial(), Some("listening on ".to_string()));

        write!(writer, "port 1883\n").unwrap();
        writer.flush().unwrap();
        assert_eq!(
            tail.next_line().await.unwrap(),
            Some("listening on port 1883".to_string())
        );
        assert_eq!(tail.peek_partial(), None);
    }
}
