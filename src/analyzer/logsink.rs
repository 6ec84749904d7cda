use crate::model::job::LogEntry;
use std::sync::Mutex;

/// Per-handler capture sink feeding `serviceLogs` (spec §9 "Console
/// capture"). Explicitly injected into Analyzer code — the spec calls out
/// that implementations "should inject this sink explicitly into Analyzer
/// code rather than monkey-patching global I/O", so this is a plain struct
/// passed by reference rather than a `tracing::Subscriber` layer swapped in
/// around the call.
#[derive(Default)]
pub struct LogSink {
    entries: Mutex<Vec<LogEntry>>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&self, message: impl Into<String>) {
        self.entries.lock().unwrap().push(LogEntry::info(message));
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.entries.lock().unwrap().push(LogEntry::warn(message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.entries.lock().unwrap().push(LogEntry::error(message));
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries.into_inner().unwrap()
    }
}
