use std::sync::Arc;

use whitebox_core::WhiteboxConfig;
use whitebox_scheduler::{SchedulerError, TaskRegistry};
use whitebox_store::Store;

use crate::pipelines;

pub const METRICS_TASK: &str = "metrics_cron";
pub const ALERTS_TASK: &str = "alerts_cron";

/// Register the built-in pipelines on their configured schedules.
pub fn build_registry(
    store: Arc<Store>,
    config: &WhiteboxConfig,
) -> Result<TaskRegistry, SchedulerError> {
    let batch_size = config.pipelines.batch_size;
    let mut registry = TaskRegistry::new();

    let metrics_store = Arc::clone(&store);
    registry.register(
        METRICS_TASK,
        move || pipelines::run_calculate_metrics_pipeline(Arc::clone(&metrics_store), batch_size),
        &config.scheduler.metrics_cron,
    )?;

    registry.register(
        ALERTS_TASK,
        move || pipelines::run_create_alerts_pipeline(Arc::clone(&store), batch_size),
        config.scheduler.alerts_cron(),
    )?;

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_pipelines_are_registered() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut config = WhiteboxConfig::default();
        config.scheduler.alerts_cron = Some("30 * * * *".to_string());

        let registry = build_registry(store, &config).unwrap();
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, [METRICS_TASK, ALERTS_TASK]);
        assert_eq!(
            registry.get(METRICS_TASK).unwrap().schedule.expression(),
            "0 12 * * *"
        );
        assert_eq!(
            registry.get(ALERTS_TASK).unwrap().schedule.expression(),
            "30 * * * *"
        );
    }

    #[test]
    fn bad_configured_crontab_fails_startup() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut config = WhiteboxConfig::default();
        config.scheduler.metrics_cron = "noon".to_string();

        let err = build_registry(store, &config).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidCron { .. }));
    }
}
