use chrono::{DateTime, Utc};

/// Whether a task has a run in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Idle,
    Running,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Idle => "idle",
            TaskStatus::Running => "running",
        };
        write!(f, "{s}")
    }
}

/// How a single run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// The callable returned an error or panicked.
    Failed,
    /// The run exceeded the engine's task timeout.
    TimedOut,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Failed => "failed",
            RunOutcome::TimedOut => "timed_out",
        };
        write!(f, "{s}")
    }
}

/// In-memory bookkeeping for one registered task.
#[derive(Debug, Clone)]
pub struct TaskState {
    pub status: TaskStatus,
    /// Start of the most recent run, if any.
    pub last_started: Option<DateTime<Utc>>,
    pub last_outcome: Option<RunOutcome>,
    /// Finished runs, whatever their outcome.
    pub run_count: u32,
}

impl Default for TaskState {
    fn default() -> Self {
        Self {
            status: TaskStatus::Idle,
            last_started: None,
            last_outcome: None,
            run_count: 0,
        }
    }
}
