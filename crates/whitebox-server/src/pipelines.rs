//! Built-in metrics and alerts pipelines fired by the scheduler.
//!
//! Both walk every registered model through the repositories. The store is
//! synchronous, so the async entry points hop onto the blocking pool.

use std::sync::Arc;

use tracing::{debug, info, warn};
use whitebox_store::{
    Filter, InferenceRowUpdate, Model, Page, Store, StoreError, INFERENCE_ROWS, MODELS,
};

/// What the metrics pipeline consumed for one model.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSummary {
    pub model_id: String,
    /// Inference rows consumed by this run.
    pub rows: usize,
    /// Mean ground truth over the consumed rows that carry one.
    pub mean_actual: Option<f64>,
}

/// Raised when consumed inferences of a model have no ground truth.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub model_id: String,
    pub missing_actuals: usize,
}

pub async fn run_calculate_metrics_pipeline(
    store: Arc<Store>,
    batch_size: usize,
) -> anyhow::Result<()> {
    let summaries =
        tokio::task::spawn_blocking(move || calculate_metrics(&store, batch_size)).await??;
    let rows: usize = summaries.iter().map(|s| s.rows).sum();
    info!(models = summaries.len(), rows, "metrics pipeline finished");
    Ok(())
}

pub async fn run_create_alerts_pipeline(
    store: Arc<Store>,
    batch_size: usize,
) -> anyhow::Result<()> {
    let alerts = tokio::task::spawn_blocking(move || create_alerts(&store, batch_size)).await??;
    info!(alerts = alerts.len(), "alerts pipeline finished");
    Ok(())
}

/// Consume every unused inference row, one transaction per model.
pub fn calculate_metrics(
    store: &Store,
    batch_size: usize,
) -> Result<Vec<MetricsSummary>, StoreError> {
    let batch_size = batch_size.max(1);
    let mut summaries = Vec::new();
    for model in all_models(store, batch_size)? {
        let summary = store.unit_of_work(|tx| {
            let unused = Filter::new()
                .eq("model_id", model.id.as_str())
                .eq("is_used", false);
            let consumed = InferenceRowUpdate {
                is_used: Some(true),
                actual: None,
            };
            let (mut rows, mut with_actual, mut sum) = (0usize, 0usize, 0.0f64);
            loop {
                // Always the first page: marked rows drop out of the filter.
                let batch =
                    INFERENCE_ROWS.get_all_by_filter_in(tx, &unused, Page::new(0, batch_size))?;
                if batch.is_empty() {
                    break;
                }
                for row in &batch {
                    if let Some(actual) = row.actual {
                        sum += actual;
                        with_actual += 1;
                    }
                    INFERENCE_ROWS.update_in(tx, row, &consumed)?;
                }
                rows += batch.len();
            }
            Ok(MetricsSummary {
                model_id: model.id.clone(),
                rows,
                mean_actual: (with_actual > 0).then(|| sum / with_actual as f64),
            })
        })?;

        if summary.rows > 0 {
            info!(
                model_id = %summary.model_id,
                rows = summary.rows,
                mean_actual = ?summary.mean_actual,
                "model metrics computed"
            );
        } else {
            debug!(model_id = %model.id, "no new inferences");
        }
        summaries.push(summary);
    }
    Ok(summaries)
}

/// Flag models whose consumed inferences still lack ground truth.
pub fn create_alerts(store: &Store, batch_size: usize) -> Result<Vec<Alert>, StoreError> {
    let batch_size = batch_size.max(1);
    let mut alerts = Vec::new();
    for model in all_models(store, batch_size)? {
        let missing = Filter::new()
            .eq("model_id", model.id.as_str())
            .eq("is_used", true)
            .eq("actual", serde_json::Value::Null);
        // One transaction, so a concurrent metrics run cannot shift the pages.
        let count = store.unit_of_work(|tx| {
            let mut count = 0;
            loop {
                let page = Page::new(count, batch_size);
                let rows = INFERENCE_ROWS.get_all_by_filter_in(tx, &missing, page)?;
                count += rows.len();
                if rows.len() < batch_size {
                    return Ok(count);
                }
            }
        })?;
        if count > 0 {
            warn!(
                model_id = %model.id,
                model = %model.name,
                missing_actuals = count,
                "alert: consumed inferences have no ground truth"
            );
            alerts.push(Alert {
                model_id: model.id,
                missing_actuals: count,
            });
        }
    }
    Ok(alerts)
}

fn all_models(store: &Store, batch_size: usize) -> Result<Vec<Model>, StoreError> {
    let mut models = Vec::new();
    loop {
        let page = MODELS.get_all(store, Page::new(models.len(), batch_size))?;
        let done = page.len() < batch_size;
        models.extend(page);
        if done {
            return Ok(models);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use whitebox_store::{ingest, InferenceRowCreate, ModelCreate, ModelType};

    fn seed(store: &Store, name: &str, actuals: &[Option<f64>]) -> Model {
        let model = MODELS
            .create(
                store,
                &ModelCreate {
                    name: name.to_string(),
                    description: String::new(),
                    model_type: ModelType::Regression,
                    target_column: "price".to_string(),
                    labels: None,
                },
            )
            .unwrap();
        let rows = actuals
            .iter()
            .map(|actual| InferenceRowCreate {
                model_id: model.id.clone(),
                timestamp: Utc::now(),
                nonprocessed: json!({"sqft": 80}),
                processed: json!({"sqft": 0.8, "price": 1.2}),
                is_used: false,
                actual: *actual,
            })
            .collect();
        ingest::create_inference_rows(store, rows).unwrap();
        model
    }

    #[test]
    fn metrics_consume_every_unused_row_across_pages() {
        let store = Store::open_in_memory().unwrap();
        let houses = seed(&store, "houses", &[Some(1.0), Some(3.0), None, Some(2.0), None]);
        let idle = seed(&store, "idle", &[]);

        let summaries = calculate_metrics(&store, 2).unwrap();

        assert_eq!(
            summaries,
            vec![
                MetricsSummary {
                    model_id: houses.id.clone(),
                    rows: 5,
                    mean_actual: Some(2.0),
                },
                MetricsSummary {
                    model_id: idle.id,
                    rows: 0,
                    mean_actual: None,
                },
            ]
        );
        let left = INFERENCE_ROWS
            .get_first_by_filter(&store, &Filter::new().eq("is_used", false))
            .unwrap();
        assert!(left.is_none());

        // a second run finds nothing new
        let again = calculate_metrics(&store, 2).unwrap();
        assert_eq!(again[0].rows, 0);
    }

    #[test]
    fn alerts_count_consumed_rows_without_actuals() {
        let store = Store::open_in_memory().unwrap();
        let houses = seed(&store, "houses", &[Some(1.0), None, None]);
        seed(&store, "complete", &[Some(1.0)]);

        // nothing consumed yet, nothing to alert on
        assert!(create_alerts(&store, 10).unwrap().is_empty());

        calculate_metrics(&store, 10).unwrap();
        let alerts = create_alerts(&store, 1).unwrap();
        assert_eq!(
            alerts,
            vec![Alert {
                model_id: houses.id,
                missing_actuals: 2,
            }]
        );
    }

    #[test]
    fn alert_count_is_consistent_while_metrics_run() {
        for _ in 0..20 {
            let store = Store::open_in_memory().unwrap();
            let actuals = vec![None; 40];
            let houses = seed(&store, "houses", &actuals);

            let alerts = std::thread::scope(|scope| {
                let metrics = scope.spawn(|| calculate_metrics(&store, 3).unwrap());
                let alerts = scope.spawn(|| create_alerts(&store, 3).unwrap());
                metrics.join().unwrap();
                alerts.join().unwrap()
            });

            // before the metrics transaction nothing is consumed, after it
            // everything is: never a partial or double count
            match alerts.as_slice() {
                [] => {}
                [alert] => {
                    assert_eq!(alert.model_id, houses.id);
                    assert_eq!(alert.missing_actuals, 40);
                }
                other => panic!("unexpected alerts {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn async_entry_points_run_on_blocking_pool() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        seed(&store, "houses", &[Some(1.0)]);

        run_calculate_metrics_pipeline(Arc::clone(&store), 100)
            .await
            .unwrap();
        run_create_alerts_pipeline(Arc::clone(&store), 100)
            .await
            .unwrap();

        let used = INFERENCE_ROWS
            .get_first_by_filter(&store, &Filter::new().eq("is_used", true))
            .unwrap();
        assert!(used.is_some());
    }
}
