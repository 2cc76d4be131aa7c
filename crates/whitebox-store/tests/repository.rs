// Repository behaviour against an in-memory SQLite store.

use chrono::Utc;
use serde_json::{json, Map, Value};

use whitebox_store::ingest;
use whitebox_store::{
    DatasetRowCreate, Filter, InferenceRowCreate, InferenceRowUpdate, Model, ModelCreate,
    ModelType, ModelUpdate, Page, Store, DATASET_ROWS, INFERENCE_ROWS, MODELS,
};

fn store() -> Store {
    Store::open_in_memory().expect("open in-memory store")
}

fn model(store: &Store, name: &str) -> Model {
    MODELS
        .create(
            store,
            &ModelCreate {
                name: name.to_string(),
                description: String::new(),
                model_type: ModelType::Binary,
                target_column: "y".to_string(),
                labels: Some(json!({"0": "no", "1": "yes"})),
            },
        )
        .expect("create model")
}

fn inference(model_id: &str) -> InferenceRowCreate {
    InferenceRowCreate {
        model_id: model_id.to_string(),
        timestamp: Utc::now(),
        nonprocessed: json!({"age": 41, "city": "Athens"}),
        processed: json!({"age": 0.41, "city_athens": 1, "y": 1}),
        is_used: false,
        actual: Some(1.0),
    }
}

fn dataset_row(model_id: &str) -> DatasetRowCreate {
    DatasetRowCreate {
        model_id: model_id.to_string(),
        nonprocessed: json!({"age": 30}),
        processed: json!({"age": 0.3, "y": 0}),
    }
}

#[test]
fn create_stamps_equal_timestamps_after_call_start() {
    let store = store();
    let before = Utc::now();
    let m = model(&store, "churn");

    assert_eq!(m.created_at, m.updated_at);
    assert!(m.created_at >= before);
    assert!(!m.id.is_empty());
    assert_eq!(m.labels, Some(json!({"0": "no", "1": "yes"})));
}

#[test]
fn create_rereads_store_defaults() {
    let store = store();
    let m = model(&store, "churn");
    let row = INFERENCE_ROWS.create(&store, &inference(&m.id)).unwrap();

    let fetched = INFERENCE_ROWS.get(&store, &row.id).unwrap().unwrap();
    assert_eq!(fetched, row);
    assert!(!row.is_used);
    assert_eq!(row.actual, Some(1.0));
}

#[test]
fn get_missing_id_is_none() {
    let store = store();
    assert!(MODELS.get(&store, "nope").unwrap().is_none());
}

#[test]
fn create_many_shares_one_timestamp() {
    let store = store();
    let m = model(&store, "churn");
    let batch: Vec<_> = (0..5).map(|_| inference(&m.id)).collect();

    let rows = INFERENCE_ROWS.create_many(&store, &batch).unwrap();

    assert_eq!(rows.len(), 5);
    let first = &rows[0];
    for row in &rows {
        assert_eq!(row.created_at, first.created_at);
        assert_eq!(row.updated_at, first.updated_at);
        assert_eq!(row.created_at, row.updated_at);
    }
}

#[test]
fn create_many_is_all_or_nothing() {
    let store = store();
    let m = model(&store, "churn");
    let mut batch: Vec<_> = (0..3).map(|_| inference(&m.id)).collect();
    // violates the foreign key
    batch.push(inference("ghost-model"));

    let err = INFERENCE_ROWS.create_many(&store, &batch).unwrap_err();
    assert_eq!(err.code(), "STORE_FAILURE");

    let all = INFERENCE_ROWS.get_all(&store, Page::default()).unwrap();
    assert!(all.is_empty());
}

#[test]
fn create_many_empty_batch_is_noop() {
    let store = store();
    let rows = DATASET_ROWS.create_many(&store, &[]).unwrap();
    assert!(rows.is_empty());
}

#[test]
fn update_keeps_created_at_and_advances_updated_at() {
    let store = store();
    let m = model(&store, "churn");

    let updated = MODELS
        .update(
            &store,
            &m,
            &ModelUpdate {
                description: Some("weekly churn".into()),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(updated.created_at, m.created_at);
    assert!(updated.updated_at >= m.updated_at);
    assert_eq!(updated.description, "weekly churn");
    // fields left unset are untouched
    assert_eq!(updated.name, "churn");
}

#[test]
fn update_fields_ignores_unknown_and_protected_keys() {
    let store = store();
    let m = model(&store, "churn");
    let row = INFERENCE_ROWS.create(&store, &inference(&m.id)).unwrap();

    let mut changes = Map::new();
    changes.insert("is_used".into(), Value::Bool(true));
    changes.insert("no_such_column".into(), json!(42));
    changes.insert("created_at".into(), json!("2000-01-01T00:00:00Z"));
    changes.insert("id".into(), json!("hijacked"));

    let updated = INFERENCE_ROWS.update_fields(&store, &row, changes).unwrap();

    assert!(updated.is_used);
    assert_eq!(updated.id, row.id);
    assert_eq!(updated.created_at, row.created_at);
    assert!(updated.updated_at >= row.updated_at);
}

#[test]
fn update_of_removed_row_is_not_found() {
    let store = store();
    let m = model(&store, "churn");
    let row = INFERENCE_ROWS.create(&store, &inference(&m.id)).unwrap();
    INFERENCE_ROWS.remove(&store, &row.id).unwrap();

    let err = INFERENCE_ROWS
        .update(
            &store,
            &row,
            &InferenceRowUpdate {
                is_used: Some(true),
                actual: None,
            },
        )
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[test]
fn remove_missing_id_is_noop() {
    let store = store();
    let m = model(&store, "churn");

    MODELS.remove(&store, "does-not-exist").unwrap();

    let all = MODELS.get_all(&store, Page::default()).unwrap();
    assert_eq!(all, vec![m]);
}

#[test]
fn get_all_pages_in_insertion_order() {
    let store = store();
    let names = ["a", "b", "c", "d"];
    for name in names {
        model(&store, name);
    }

    let page: Vec<String> = MODELS
        .get_all(&store, Page::new(1, 2))
        .unwrap()
        .into_iter()
        .map(|m| m.name)
        .collect();
    assert_eq!(page, vec!["b", "c"]);
    assert_eq!(MODELS.get_all(&store, Page::default()).unwrap().len(), 4);
}

#[test]
fn filter_matches_equality_and_null() {
    let store = store();
    let m = model(&store, "churn");
    let mut pending = inference(&m.id);
    pending.actual = None;
    INFERENCE_ROWS.create(&store, &inference(&m.id)).unwrap();
    let without_actual = INFERENCE_ROWS.create(&store, &pending).unwrap();

    let hit = INFERENCE_ROWS
        .get_first_by_filter(
            &store,
            &Filter::new()
                .eq("model_id", m.id.as_str())
                .eq("actual", Value::Null),
        )
        .unwrap();
    assert_eq!(hit, Some(without_actual));

    let none = INFERENCE_ROWS
        .get_first_by_filter(&store, &Filter::new().eq("is_used", true))
        .unwrap();
    assert!(none.is_none());
}

#[test]
fn filter_on_unknown_column_is_validation_error() {
    let store = store();
    let err = MODELS
        .get_first_by_filter(&store, &Filter::new().eq("colour", "red"))
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_FAILED");
}

#[test]
fn ingest_rejects_unknown_model_with_not_found() {
    let store = store();
    let err = ingest::create_inference_row(&store, inference("missing")).unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
    assert!(INFERENCE_ROWS
        .get_all(&store, Page::default())
        .unwrap()
        .is_empty());
}

#[test]
fn dataset_batch_with_one_wrong_model_stores_nothing() {
    let store = store();
    let m = model(&store, "churn");
    let batch = vec![dataset_row(&m.id), dataset_row(&m.id), dataset_row("wrong")];

    let err = ingest::create_dataset_rows(&store, batch).unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
    assert!(DATASET_ROWS.get_all(&store, Page::default()).unwrap().is_empty());

    let ok = ingest::create_dataset_rows(&store, vec![dataset_row(&m.id); 2]).unwrap();
    assert_eq!(ok.len(), 2);
    let listed = ingest::dataset_rows_for_model(&store, &m.id, Page::default()).unwrap();
    assert_eq!(listed, ok);
}

#[test]
fn listing_rows_of_unknown_model_is_not_found() {
    let store = store();
    let err = ingest::dataset_rows_for_model(&store, "wrong_model_id", Page::default())
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[test]
fn deleting_model_cascades_to_rows() {
    let store = store();
    let m = model(&store, "churn");
    let other = model(&store, "fraud");
    ingest::create_inference_rows(&store, vec![inference(&m.id), inference(&other.id)]).unwrap();
    ingest::create_dataset_rows(&store, vec![dataset_row(&m.id)]).unwrap();

    MODELS.remove(&store, &m.id).unwrap();

    let left = INFERENCE_ROWS.get_all(&store, Page::default()).unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].model_id, other.id);
    assert!(DATASET_ROWS.get_all(&store, Page::default()).unwrap().is_empty());
}
