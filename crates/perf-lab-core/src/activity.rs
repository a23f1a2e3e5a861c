use serde::Serialize;
use std::collections::VecDeque;
use tracing::{error, info};

/// Entries kept in the user-facing log.
pub const ACTIVITY_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub label: String,
    pub level: LogLevel,
    pub message: String,
}

/// Bounded, user-facing activity log. Also where reported errors end up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityLog {
    capacity: usize,
    entries: VecDeque<LogEntry>,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityLog {
    pub fn new() -> Self {
        Self {
            capacity: ACTIVITY_CAPACITY,
            entries: VecDeque::new(),
        }
    }

    pub fn push(&mut self, label: &str, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Error => error!("{message}"),
            LogLevel::Info | LogLevel::Success => info!("{message}"),
        }
        self.entries.push_back(LogEntry {
            label: label.to_string(),
            level,
            message,
        });
        if self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn entries(&self) -> &VecDeque<LogEntry> {
        &self.entries
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.back()
    }

    pub fn errors(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(|e| e.level == LogLevel::Error)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
