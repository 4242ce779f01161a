//! In-memory task store with read-once terminal states.
//!
//! The store owns every task record: the orchestrator's worker is the only
//! writer of terminal states and the poll interface is the only reader.
//! Reading a terminal state evicts it, so a well-behaved client observes a
//! terminal status exactly once and entries never accumulate.

use crate::models::TurnResponse;
use crate::Error;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Failure payload surfaced to the polling client.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TaskError {
    pub kind: TaskErrorKind,
    /// HTTP status category the routing layer should emit.
    pub status: u16,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    InvalidInput,
    UpstreamTimeout,
    Upstream,
    Internal,
}

impl TaskError {
    /// Map an orchestration failure to the short, human-readable payload a
    /// client sees. Internal details stay in the logs.
    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::UnknownSeme(id) => Self {
                kind: TaskErrorKind::InvalidInput,
                status: 400,
                message: format!("Seme con ID '{}' non trovato.", id),
            },
            Error::ModelTimeout => Self {
                kind: TaskErrorKind::UpstreamTimeout,
                status: 504,
                message: "Il servizio ha impiegato troppo tempo a rispondere. Riprova tra qualche istante.".to_string(),
            },
            Error::ModelApi { status, message } => Self {
                kind: TaskErrorKind::Upstream,
                status: 502,
                message: format!(
                    "Errore di comunicazione con il modello (status {}): {}",
                    status,
                    truncate(message, 200)
                ),
            },
            Error::MalformedModelResponse(_) => Self {
                kind: TaskErrorKind::Upstream,
                status: 502,
                message: "Il modello ha risposto in un formato incomprensibile.".to_string(),
            },
            _ => Self {
                kind: TaskErrorKind::Internal,
                status: 500,
                message: "Un errore imprevisto è avvenuto durante l'elaborazione.".to_string(),
            },
        }
    }
}

fn truncate(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[derive(Debug, Clone)]
pub enum TaskState {
    Processing,
    Completed(TurnResponse),
    Failed(TaskError),
}

impl TaskState {
    fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Processing)
    }
}

#[derive(Default)]
pub struct TaskStore {
    tasks: Mutex<HashMap<Uuid, TaskState>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh task id in the `Processing` state.
    pub fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().insert(id, TaskState::Processing);
        debug!("Task {} created", id);
        id
    }

    pub fn complete(&self, id: Uuid, response: TurnResponse) {
        self.finish(id, TaskState::Completed(response));
    }

    pub fn fail(&self, id: Uuid, error: TaskError) {
        self.finish(id, TaskState::Failed(error));
    }

    /// At-most-one terminal write: anything after the first is dropped.
    fn finish(&self, id: Uuid, terminal: TaskState) {
        let mut tasks = self.lock();
        match tasks.get_mut(&id) {
            Some(state) if !state.is_terminal() => *state = terminal,
            Some(_) => warn!("Task {} is already terminal; ignoring write", id),
            None => warn!("Task {} not found; ignoring terminal write", id),
        }
    }

    /// Read the task state. A terminal state is evicted in the same lock
    /// acquisition, so exactly one poll observes it; `None` means unknown
    /// (never created, or already consumed).
    pub fn read(&self, id: Uuid) -> Option<TaskState> {
        let mut tasks = self.lock();
        match tasks.get(&id) {
            Some(TaskState::Processing) => Some(TaskState::Processing),
            Some(_) => tasks.remove(&id),
            None => None,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, TaskState>> {
        self.tasks.lock().expect("task map lock poisoned")
    }
}
