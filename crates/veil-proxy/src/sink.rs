//! Audit sinks.
//!
//! [`JsonLineSink`] writes one JSON object per line to a diagnostics stream,
//! flushed after every entry. The write happens under a mutex so entries
//! from concurrent requests never interleave. [`InMemorySink`] stores
//! entries for inspection in tests.

use std::io::{self, Write};
use std::sync::Mutex;

use veil_types::audit::AuditEntry;
use veil_types::errors::VeilError;
use veil_types::traits::AuditSink;

/// Line-oriented audit sink over any writer.
///
/// With `enabled: false`, emission is a no-op; the audit layer still runs
/// its timing and summary collection upstream.
pub struct JsonLineSink<W: Write + Send> {
    writer: Mutex<W>,
    enabled: bool,
}

impl<W: Write + Send> JsonLineSink<W> {
    /// Wrap a writer.
    pub fn new(writer: W, enabled: bool) -> Self {
        Self {
            writer: Mutex::new(writer),
            enabled,
        }
    }
}

impl JsonLineSink<io::Stderr> {
    /// Sink writing to the process diagnostics stream.
    pub fn stderr(enabled: bool) -> Self {
        Self::new(io::stderr(), enabled)
    }
}

impl<W: Write + Send> AuditSink for JsonLineSink<W> {
    fn emit(&self, entry: &AuditEntry) -> Result<(), VeilError> {
        if !self.enabled {
            return Ok(());
        }

        let line = serde_json::to_string(entry)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| VeilError::Audit("audit sink writer poisoned".to_string()))?;
        writeln!(writer, "{line}")
            .and_then(|()| writer.flush())
            .map_err(|e| VeilError::Audit(format!("failed to write audit line: {e}")))
    }
}

/// In-memory audit sink for tests.
#[derive(Default)]
pub struct InMemorySink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all stored entries.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().map(|entries| entries.clone()).unwrap_or_default()
    }

    /// Number of stored entries.
    pub fn count(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }
}

impl AuditSink for InMemorySink {
    fn emit(&self, entry: &AuditEntry) -> Result<(), VeilError> {
        self.entries
            .lock()
            .map_err(|_| VeilError::Audit("audit sink storage poisoned".to_string()))?
            .push(entry.clone());
        Ok(())
    }
}
