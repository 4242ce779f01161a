//! Dispatch/poll boundary for the routing layer.
//!
//! `submit` records a processing task and schedules the orchestrator on a
//! background execution unit, returning at once; `poll` surfaces the task
//! store state. The spawned body always writes a terminal state, whichever
//! way the turn ends, so no task is left processing forever.

use crate::models::TurnRequest;
use crate::orchestrator::TurnOrchestrator;
use crate::tasks::{TaskError, TaskErrorKind, TaskState, TaskStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Immediate reply to a submitted turn.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitAck {
    pub task_id: Uuid,
    pub message: String,
}

/// Point-in-time view of a task, shaped for the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskSnapshot {
    Processing,
    Completed { data: crate::models::TurnResponse },
    Failed { error: TaskError },
}

impl From<TaskState> for TaskSnapshot {
    fn from(state: TaskState) -> Self {
        match state {
            TaskState::Processing => TaskSnapshot::Processing,
            TaskState::Completed(response) => TaskSnapshot::Completed { data: response },
            TaskState::Failed(err) => TaskSnapshot::Failed { error: err },
        }
    }
}

pub struct Dispatcher {
    orchestrator: Arc<TurnOrchestrator>,
    store: Arc<TaskStore>,
}

impl Dispatcher {
    pub fn new(orchestrator: Arc<TurnOrchestrator>, store: Arc<TaskStore>) -> Self {
        Self {
            orchestrator,
            store,
        }
    }

    /// Accept a turn and return its task id without waiting for the model.
    pub fn submit(&self, request: TurnRequest) -> SubmitAck {
        let task_id = self.store.create();
        info!(
            "Task {} accepted (seme {}, turn {}, session {})",
            task_id, request.seme_id, request.interaction_number, request.session_id
        );

        let orchestrator = Arc::clone(&self.orchestrator);
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            match orchestrator.run_turn(&request).await {
                Ok(response) => store.complete(task_id, response),
                Err(err) => {
                    let task_error = TaskError::from_error(&err);
                    match task_error.kind {
                        TaskErrorKind::Internal => error!("Task {} failed: {}", task_id, err),
                        _ => warn!("Task {} failed: {}", task_id, err),
                    }
                    store.fail(task_id, task_error);
                }
            }
        });

        SubmitAck {
            task_id,
            message: "Elaborazione avviata.".to_string(),
        }
    }

    /// Current task status; `None` means unknown id (never created, or the
    /// terminal state was already consumed by an earlier poll).
    pub fn poll(&self, task_id: Uuid) -> Option<TaskSnapshot> {
        self.store.read(task_id).map(TaskSnapshot::from)
    }
}
