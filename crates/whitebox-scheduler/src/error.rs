use thiserror::Error;

/// Errors raised while building or driving the scheduler.
///
/// Failures of the scheduled callables themselves never surface here; they
/// are logged at the invocation boundary.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The crontab could not be parsed.
    #[error("Invalid cron expression {expression:?}: {reason}")]
    InvalidCron { expression: String, reason: String },

    /// A task with this name is already registered.
    #[error("Task already registered: {name}")]
    DuplicateTask { name: String },

    /// No task with this name is registered.
    #[error("Task not found: {name}")]
    UnknownTask { name: String },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
