//! Per-request log collaborator.
//!
//! Every message is recorded on the [`ThemeLog`] (so a driver can show what
//! happened to one request) and forwarded to the `log` facade under the
//! `dovetail` target.

use serde::Serialize;

pub const LOG_TARGET: &str = "dovetail";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<Level> for log::Level {
    fn from(level: Level) -> Self {
        match level {
            Level::Debug => log::Level::Debug,
            Level::Info => log::Level::Info,
            Level::Warn => log::Level::Warn,
            Level::Error => log::Level::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub level: Level,
    /// The rule or match that produced the message, rendered as markup.
    pub source: String,
    pub message: String,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ThemeLog {
    entries: Vec<LogEntry>,
    theme_url: Option<String>,
}

impl ThemeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, level: Level, source: impl ToString, message: impl Into<String>) {
        let entry = LogEntry {
            level,
            source: source.to_string(),
            message: message.into(),
        };
        log::log!(target: LOG_TARGET, level.into(), "{}: {}", entry.source, entry.message);
        self.entries.push(entry);
    }

    pub fn debug(&mut self, source: impl ToString, message: impl Into<String>) {
        self.record(Level::Debug, source, message);
    }

    pub fn info(&mut self, source: impl ToString, message: impl Into<String>) {
        self.record(Level::Info, source, message);
    }

    pub fn warn(&mut self, source: impl ToString, message: impl Into<String>) {
        self.record(Level::Warn, source, message);
    }

    pub fn error(&mut self, source: impl ToString, message: impl Into<String>) {
        self.record(Level::Error, source, message);
    }

    pub fn set_theme_url(&mut self, url: impl Into<String>) {
        self.theme_url = Some(url.into());
    }

    pub fn theme_url(&self) -> Option<&str> {
        self.theme_url.as_deref()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Entries at `level` or above.
    pub fn at_least(&self, level: Level) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(move |e| e.level >= level)
    }
}
