//! `whitebox-scheduler`: in-process cron emulation for the monitoring pipelines.
//!
//! # Overview
//!
//! Bootstrap code fills a [`registry::TaskRegistry`] with named async
//! callables and their crontabs, then hands it to a
//! [`engine::SchedulerEngine`]. The engine ticks once a second and fires
//! every task whose next run has arrived.
//!
//! # Guarantees
//!
//! | Concern        | Behaviour                                             |
//! |----------------|-------------------------------------------------------|
//! | Overlap        | A task never runs twice at once; extra triggers drop  |
//! | Missed windows | Skipped; the next run is the next future boundary     |
//! | Failures       | Errors, panics and timeouts are logged, never raised  |
//! | Persistence    | None; schedules are rebuilt at every process start    |

pub mod engine;
pub mod error;
pub mod registry;
pub mod schedule;
pub mod types;

pub use engine::{EngineOptions, FiredTask, SchedulerEngine};
pub use error::{Result, SchedulerError};
pub use registry::{TaskFn, TaskRegistry};
pub use schedule::CronSchedule;
pub use types::{RunOutcome, TaskState, TaskStatus};
