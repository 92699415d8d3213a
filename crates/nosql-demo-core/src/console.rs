use serde::Serialize;
use std::sync::{Mutex, PoisonError};

/// One line of demo output. Highlighted lines mark step boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsoleLine {
    pub message: String,
    pub highlight: bool,
}

impl ConsoleLine {
    pub fn plain(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            highlight: false,
        }
    }

    pub fn highlighted(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            highlight: true,
        }
    }
}

/// The console output plus the loading flag, as the UI sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsoleLog {
    pub lines: Vec<ConsoleLine>,
    pub loading: bool,
}

impl ConsoleLog {
    pub fn messages(&self) -> Vec<&str> {
        self.lines.iter().map(|l| l.message.as_str()).collect()
    }
}

/// Where the demo reports progress. Each call is a committed change the UI
/// may render immediately.
pub trait Console: Send + Sync {
    fn set_loading(&self, loading: bool);
    fn clear(&self);
    fn write(&self, line: ConsoleLine);
}

/// In-memory console with no observers. Used by tests and headless callers.
#[derive(Debug, Default)]
pub struct MemoryConsole {
    log: Mutex<ConsoleLog>,
}

impl MemoryConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ConsoleLog {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Console for MemoryConsole {
    fn set_loading(&self, loading: bool) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .loading = loading;
    }

    fn clear(&self) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .lines
            .clear();
    }

    fn write(&self, line: ConsoleLine) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .lines
            .push(line);
    }
}
