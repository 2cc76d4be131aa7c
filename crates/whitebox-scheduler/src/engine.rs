use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::error::{Result, SchedulerError};
use crate::registry::{RegisteredTask, TaskRegistry};
use crate::types::{RunOutcome, TaskState, TaskStatus};

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// How often the loop checks for due tasks.
    pub tick_interval: Duration,
    /// Upper bound for a single run. A longer run is reported as timed out,
    /// but the task is not fired again until the body has returned.
    pub task_timeout: Duration,
    /// How long shutdown waits for in-flight runs.
    pub shutdown_grace: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            task_timeout: Duration::from_secs(60 * 60),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

/// A run started by [`SchedulerEngine::tick_at`].
#[derive(Debug)]
pub struct FiredTask {
    pub name: String,
    pub handle: JoinHandle<RunOutcome>,
}

struct TaskSlot {
    task: RegisteredTask,
    next_run: Mutex<Option<DateTime<Utc>>>,
    /// Held for the whole of a run; `try_lock` failing means one is in flight.
    guard: Arc<tokio::sync::Mutex<()>>,
    state: Arc<Mutex<TaskState>>,
}

/// Drives the registered tasks on their cron schedules.
pub struct SchedulerEngine {
    slots: Vec<TaskSlot>,
    options: EngineOptions,
}

impl SchedulerEngine {
    /// Take ownership of a populated registry. First fire times are the next
    /// cron boundaries after `start`.
    pub fn new(registry: TaskRegistry, options: EngineOptions, start: DateTime<Utc>) -> Self {
        let slots = registry
            .into_tasks()
            .into_iter()
            .map(|task| {
                let next = task.schedule.next_after(start);
                if next.is_none() {
                    warn!(task = %task.name, crontab = %task.schedule, "schedule never fires");
                }
                TaskSlot {
                    task,
                    next_run: Mutex::new(next),
                    guard: Arc::new(tokio::sync::Mutex::new(())),
                    state: Arc::new(Mutex::new(TaskState::default())),
                }
            })
            .collect();
        Self { slots, options }
    }

    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|s| s.task.name.as_str())
    }

    pub fn next_run(&self, name: &str) -> Option<DateTime<Utc>> {
        let slot = self.slot(name)?;
        *lock(&slot.next_run)
    }

    pub fn status(&self, name: &str) -> Option<TaskState> {
        let slot = self.slot(name)?;
        let state = lock(&slot.state).clone();
        Some(state)
    }

    /// Fire every task whose next run is at or before `now`.
    ///
    /// The next run is recomputed from `now`, so windows missed while the
    /// process was busy or asleep are skipped rather than replayed.
    pub fn tick_at(&self, now: DateTime<Utc>) -> Vec<FiredTask> {
        let mut fired = Vec::new();
        for slot in &self.slots {
            {
                let mut next_run = lock(&slot.next_run);
                match *next_run {
                    Some(due) if due <= now => {
                        *next_run = slot.task.schedule.next_after(now);
                    }
                    _ => continue,
                }
            }
            if let Some(handle) = self.dispatch(slot) {
                fired.push(FiredTask {
                    name: slot.task.name.clone(),
                    handle,
                });
            }
        }
        fired
    }

    /// Fire a task now, outside its schedule. Its next scheduled run is not
    /// affected.
    ///
    /// Returns `Ok(None)` when the previous run is still in flight.
    pub fn trigger(&self, name: &str) -> Result<Option<JoinHandle<RunOutcome>>> {
        let slot = self.slot(name).ok_or_else(|| SchedulerError::UnknownTask {
            name: name.to_string(),
        })?;
        Ok(self.dispatch(slot))
    }

    /// Main event loop. Ticks until `shutdown` broadcasts `true` (or its
    /// sender is dropped), then waits up to `shutdown_grace` for in-flight runs.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(tasks = self.slots.len(), "scheduler engine started");
        for slot in &self.slots {
            if let Some(next) = *lock(&slot.next_run) {
                info!(task = %slot.task.name, next_run = %next, "task scheduled");
            }
        }

        let mut interval = tokio::time::interval(self.options.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick_at(Utc::now());
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
        self.drain().await;
    }

    // --- private helpers ---------------------------------------------------

    fn slot(&self, name: &str) -> Option<&TaskSlot> {
        self.slots.iter().find(|s| s.task.name == name)
    }

    /// Spawn one run of `slot` unless a run is already in flight.
    fn dispatch(&self, slot: &TaskSlot) -> Option<JoinHandle<RunOutcome>> {
        let name = slot.task.name.clone();
        let permit = match Arc::clone(&slot.guard).try_lock_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(task = %name, "previous run still in flight; trigger dropped");
                return None;
            }
        };

        {
            let mut state = lock(&slot.state);
            state.status = TaskStatus::Running;
            state.last_started = Some(Utc::now());
        }

        let callable = Arc::clone(&slot.task.callable);
        let state = Arc::clone(&slot.state);
        let timeout = self.options.task_timeout;
        info!(task = %name, "task fired");

        Some(tokio::spawn(async move {
            let started = Instant::now();
            // The body runs as its own task: a timeout stops waiting on it but
            // never drops it, since blocking work inside cannot be cancelled.
            let mut body = tokio::spawn(async move { callable().await });
            let outcome = match tokio::time::timeout(timeout, &mut body).await {
                Ok(joined) => finished(&name, joined, started),
                Err(_) => {
                    error!(
                        task = %name,
                        timeout_secs = timeout.as_secs(),
                        "task timed out; further runs blocked until it returns"
                    );
                    lock(&state).last_outcome = Some(RunOutcome::TimedOut);
                    let late = finished(&name, body.await, started);
                    warn!(task = %name, late = %late, "timed-out task returned");
                    RunOutcome::TimedOut
                }
            };

            {
                let mut state = lock(&state);
                state.status = TaskStatus::Idle;
                state.last_outcome = Some(outcome);
                state.run_count += 1;
            }
            // Released only after the body has returned and the state reads
            // Idle again.
            drop(permit);
            outcome
        }))
    }

    async fn drain(&self) {
        let wait_all = async {
            for slot in &self.slots {
                let _idle = slot.guard.lock().await;
            }
        };
        if tokio::time::timeout(self.options.shutdown_grace, wait_all)
            .await
            .is_err()
        {
            warn!(
                grace_secs = self.options.shutdown_grace.as_secs(),
                "in-flight tasks still running at shutdown"
            );
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Map a finished body onto its outcome, logging failures.
fn finished(
    name: &str,
    joined: std::result::Result<anyhow::Result<()>, JoinError>,
    started: Instant,
) -> RunOutcome {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match joined {
        Ok(Ok(())) => {
            info!(task = %name, elapsed_ms, "task completed");
            RunOutcome::Completed
        }
        Ok(Err(e)) => {
            error!(task = %name, error = %format!("{e:#}"), "task failed");
            RunOutcome::Failed
        }
        Err(e) if e.is_panic() => {
            let panic = e.into_panic();
            error!(task = %name, panic = %panic_message(panic.as_ref()), "task panicked");
            RunOutcome::Failed
        }
        Err(e) => {
            error!(task = %name, error = %e, "task aborted");
            RunOutcome::Failed
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
