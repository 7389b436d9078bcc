//! Contract errors raised by plan mutation
//!
//! These indicate a caller bug (unknown id, illegal transition) and are always
//! surfaced. Environmental failures inside the planning pipeline never reach
//! this type; they degrade to fallbacks instead.

use thiserror::Error;

use super::types::TaskStatus;

#[derive(Debug, Error, PartialEq)]
pub enum PlanError {
    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("invalid status transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("task {0} is not an operational task; its status is derived from its children")]
    NotALeaf(String),

    #[error("invalid progress value {value} for task {task_id}")]
    InvalidProgress { task_id: String, value: f64 },

    #[error("task {task_id} is already {status}; its progress is final")]
    TaskFinished { task_id: String, status: TaskStatus },

    #[error("task {0} cannot be replanned: only active failed operational tasks can")]
    NotReplannable(String),
}

pub type PlanResult<T> = std::result::Result<T, PlanError>;
