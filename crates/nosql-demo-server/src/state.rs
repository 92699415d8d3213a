use std::sync::{Arc, PoisonError, RwLock};

use nosql_demo_core::{Console, ConsoleLine, ConsoleLog, ConnectionSettings, ServiceFactory};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};

/// Events pushed to `/api/events` subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SseMessage {
    Cleared,
    Line { message: String, highlight: bool },
    Loading { loading: bool },
    RunStarted { id: String },
    RunFinished {
        id: String,
        status: String,
        error: Option<String>,
    },
}

/// Console shared between the running demo (single writer) and request
/// handlers (readers). Every change is also broadcast to SSE subscribers.
pub struct BroadcastConsole {
    log: RwLock<ConsoleLog>,
    event_tx: broadcast::Sender<SseMessage>,
}

impl BroadcastConsole {
    pub fn new(event_tx: broadcast::Sender<SseMessage>) -> Self {
        Self {
            log: RwLock::new(ConsoleLog::default()),
            event_tx,
        }
    }

    pub fn snapshot(&self) -> ConsoleLog {
        self.log
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, msg: SseMessage) {
        // No subscribers is fine.
        let _ = self.event_tx.send(msg);
    }
}

impl Console for BroadcastConsole {
    fn set_loading(&self, loading: bool) {
        self.log
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .loading = loading;
        self.publish(SseMessage::Loading { loading });
    }

    fn clear(&self) {
        self.log
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .lines
            .clear();
        self.publish(SseMessage::Cleared);
    }

    fn write(&self, line: ConsoleLine) {
        let msg = SseMessage::Line {
            message: line.message.clone(),
            highlight: line.highlight,
        };
        self.log
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .lines
            .push(line);
        self.publish(msg);
    }
}

/// Bookkeeping for the single in-flight run.
#[derive(Debug, Default, Clone)]
pub struct RunStatus {
    /// Id of the run currently in flight.
    pub active: Option<String>,
    /// Id of the most recent run, finished or not.
    pub last_id: Option<String>,
    /// Error message of the most recent run, if it failed.
    pub last_error: Option<String>,
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<ConnectionSettings>,
    pub services: Arc<dyn ServiceFactory>,
    pub console: Arc<BroadcastConsole>,
    pub event_tx: broadcast::Sender<SseMessage>,
    pub run: Arc<Mutex<RunStatus>>,
}

impl AppState {
    pub fn new(settings: Arc<ConnectionSettings>, services: Arc<dyn ServiceFactory>) -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            settings,
            services,
            console: Arc::new(BroadcastConsole::new(tx.clone())),
            event_tx: tx,
            run: Arc::new(Mutex::new(RunStatus::default())),
        }
    }
}
