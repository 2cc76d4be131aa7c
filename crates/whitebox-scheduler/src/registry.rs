use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use tracing::info;

use crate::error::{Result, SchedulerError};
use crate::schedule::CronSchedule;

/// Type-erased async callable fired by the scheduler.
pub type TaskFn = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// A task as registered: unique name, parsed schedule, callable.
#[derive(Clone)]
pub struct RegisteredTask {
    pub name: String,
    pub schedule: CronSchedule,
    pub callable: TaskFn,
}

impl std::fmt::Debug for RegisteredTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTask")
            .field("name", &self.name)
            .field("schedule", &self.schedule.expression())
            .finish_non_exhaustive()
    }
}

/// Name → (callable, schedule) table, built once at process start.
///
/// Constructed and populated by bootstrap code, then consumed by
/// [`crate::engine::SchedulerEngine::new`]. There is no unregistration.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Vec<RegisteredTask>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callable` under `name`, fired on `crontab`.
    ///
    /// The crontab is parsed here, once. A second registration under the same
    /// name is rejected with [`SchedulerError::DuplicateTask`].
    pub fn register<F, Fut>(
        &mut self,
        name: impl Into<String>,
        callable: F,
        crontab: &str,
    ) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        if self.get(&name).is_some() {
            return Err(SchedulerError::DuplicateTask { name });
        }
        let schedule = CronSchedule::parse(crontab)?;
        let callable: TaskFn = Arc::new(move || callable().boxed());

        info!(task = %name, crontab = %schedule, "task registered");
        self.tasks.push(RegisteredTask {
            name,
            schedule,
            callable,
        });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTask> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub(crate) fn into_tasks(self) -> Vec<RegisteredTask> {
        self.tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn noop() -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut registry = TaskRegistry::new();
        registry.register("metrics_cron", noop, "0 12 * * *").unwrap();

        let err = registry
            .register("metrics_cron", noop, "*/5 * * * *")
            .unwrap_err();
        assert!(
            matches!(err, SchedulerError::DuplicateTask { ref name } if name == "metrics_cron")
        );
        assert_eq!(registry.len(), 1);
        // the original schedule is kept
        assert_eq!(
            registry.get("metrics_cron").unwrap().schedule.expression(),
            "0 12 * * *"
        );
    }

    #[test]
    fn bad_crontab_is_rejected_at_registration() {
        let mut registry = TaskRegistry::new();
        let err = registry.register("alerts_cron", noop, "every day").unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidCron { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn names_keep_registration_order() {
        let mut registry = TaskRegistry::new();
        registry.register("metrics_cron", noop, "0 12 * * *").unwrap();
        registry.register("alerts_cron", noop, "0 12 * * *").unwrap();
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, ["metrics_cron", "alerts_cron"]);
    }
}
