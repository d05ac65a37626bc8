//! Tracing setup and the in-memory cycle log.
//!
//! The reporting agent derives its performance metrics by matching fixed
//! substrings against the lines emitted during a cycle (`"classifier's
//! verdict"`, `"(POSITIVE)"`, `"successfully written to database"`, ...).
//! Instead of re-reading a log file, the subscriber tees every formatted
//! line into a [`CycleLog`] buffer that the engine hands to reporting at the
//! end of the cycle.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Shared buffer of formatted log lines for one engine process.
///
/// Cloning is cheap; all clones append to the same buffer. The engine clears
/// it at the start of each cycle so reports only see their own mission.
#[derive(Clone, Default)]
pub struct CycleLog {
    inner: Arc<Mutex<String>>,
}

impl CycleLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything logged since the last [`clear`](Self::clear).
    #[must_use]
    pub fn snapshot(&self) -> String {
        match self.inner.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn clear(&self) {
        match self.inner.lock() {
            Ok(mut guard) => guard.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }

    /// Number of non-overlapping occurrences of `needle` in the buffer.
    #[must_use]
    pub fn count(&self, needle: &str) -> usize {
        self.snapshot().matches(needle).count()
    }

    fn append(&self, bytes: &[u8]) {
        let text = String::from_utf8_lossy(bytes);
        match self.inner.lock() {
            Ok(mut guard) => guard.push_str(&text),
            Err(poisoned) => poisoned.into_inner().push_str(&text),
        }
    }
}

/// Writer that mirrors log output to stderr and the cycle buffer.
pub struct TeeWriter {
    log: CycleLog,
    stderr: io::Stderr,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.log.append(buf);
        self.stderr.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stderr.flush()
    }
}

impl<'a> MakeWriter<'a> for CycleLog {
    type Writer = TeeWriter;

    fn make_writer(&'a self) -> Self::Writer {
        TeeWriter {
            log: self.clone(),
            stderr: io::stderr(),
        }
    }
}

/// Install the global subscriber. Call once, from the binary.
///
/// Honors `RUST_LOG`; defaults to `info` otherwise.
pub fn init(log: &CycleLog) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(log.clone())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_counts_substrings() {
        let log = CycleLog::new();
        log.append(b"the classifier's verdict: a (POSITIVE)\n");
        log.append(b"the classifier's verdict: b (NEGATIVE)\n");

        assert_eq!(log.count("classifier's verdict"), 2);
        assert_eq!(log.count("(POSITIVE)"), 1);

        log.clear();
        assert_eq!(log.count("classifier's verdict"), 0);
    }
}
