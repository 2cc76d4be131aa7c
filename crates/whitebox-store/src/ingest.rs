//! Entry points used by the API layer to accept client data.
//!
//! Every call validates its payloads, checks that the owning models exist and
//! writes through the repositories inside one unit of work, so a batch either
//! lands whole or not at all.

use std::collections::BTreeSet;

use rusqlite::Connection;
use serde_json::Value;
use tracing::{info, instrument};

use crate::error::{Result, StoreError};
use crate::repository::{Filter, Page, DATASET_ROWS, INFERENCE_ROWS, MODELS};
use crate::store::Store;
use crate::types::{DatasetRow, DatasetRowCreate, InferenceRow, InferenceRowCreate, Model};

/// Payload checks that run before anything touches the store.
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

impl Validate for InferenceRowCreate {
    fn validate(&self) -> Result<()> {
        require_model_id(&self.model_id)?;
        require_object("nonprocessed", &self.nonprocessed)?;
        require_object("processed", &self.processed)?;
        if let Some(actual) = self.actual {
            if !actual.is_finite() {
                return Err(StoreError::Validation(format!(
                    "actual must be finite, got {actual}"
                )));
            }
        }
        Ok(())
    }
}

impl Validate for DatasetRowCreate {
    fn validate(&self) -> Result<()> {
        require_model_id(&self.model_id)?;
        require_object("nonprocessed", &self.nonprocessed)?;
        require_object("processed", &self.processed)
    }
}

#[instrument(skip(store, payload), fields(model_id = %payload.model_id))]
pub fn create_inference_row(store: &Store, payload: InferenceRowCreate) -> Result<InferenceRow> {
    payload.validate()?;
    store.unit_of_work(|tx| {
        ensure_models_exist(tx, [payload.model_id.as_str()])?;
        INFERENCE_ROWS.create_in(tx, &payload)
    })
}

/// Store a batch of inference rows. One unknown model rejects the batch.
#[instrument(skip_all, fields(count = payloads.len()))]
pub fn create_inference_rows(
    store: &Store,
    payloads: Vec<InferenceRowCreate>,
) -> Result<Vec<InferenceRow>> {
    payloads.iter().try_for_each(Validate::validate)?;
    let rows = store.unit_of_work(|tx| {
        ensure_models_exist(tx, payloads.iter().map(|p| p.model_id.as_str()))?;
        INFERENCE_ROWS.create_many_in(tx, &payloads)
    })?;
    info!(count = rows.len(), "inference rows stored");
    Ok(rows)
}

/// Store a batch of dataset rows. One unknown model rejects the batch.
#[instrument(skip_all, fields(count = payloads.len()))]
pub fn create_dataset_rows(
    store: &Store,
    payloads: Vec<DatasetRowCreate>,
) -> Result<Vec<DatasetRow>> {
    payloads.iter().try_for_each(Validate::validate)?;
    let rows = store.unit_of_work(|tx| {
        ensure_models_exist(tx, payloads.iter().map(|p| p.model_id.as_str()))?;
        DATASET_ROWS.create_many_in(tx, &payloads)
    })?;
    info!(count = rows.len(), "dataset rows stored");
    Ok(rows)
}

/// Dataset rows of one model. NotFound when the model is unknown.
pub fn dataset_rows_for_model(
    store: &Store,
    model_id: &str,
    page: Page,
) -> Result<Vec<DatasetRow>> {
    store.unit_of_work(|tx| {
        ensure_models_exist(tx, [model_id])?;
        DATASET_ROWS.get_all_by_filter_in(tx, &Filter::new().eq("model_id", model_id), page)
    })
}

/// Inference rows of one model. NotFound when the model is unknown.
pub fn inference_rows_for_model(
    store: &Store,
    model_id: &str,
    page: Page,
) -> Result<Vec<InferenceRow>> {
    store.unit_of_work(|tx| {
        ensure_models_exist(tx, [model_id])?;
        INFERENCE_ROWS.get_all_by_filter_in(tx, &Filter::new().eq("model_id", model_id), page)
    })
}

fn ensure_models_exist<'a>(
    conn: &Connection,
    model_ids: impl IntoIterator<Item = &'a str>,
) -> Result<()> {
    let unique: BTreeSet<&str> = model_ids.into_iter().collect();
    for id in unique {
        let found: Option<Model> = MODELS.get_in(conn, id)?;
        if found.is_none() {
            return Err(StoreError::not_found("model", id));
        }
    }
    Ok(())
}

fn require_model_id(model_id: &str) -> Result<()> {
    if model_id.trim().is_empty() {
        return Err(StoreError::Validation("model_id must not be empty".into()));
    }
    Ok(())
}

fn require_object(field: &str, value: &Value) -> Result<()> {
    if !value.is_object() {
        return Err(StoreError::Validation(format!(
            "{field} must be a JSON object"
        )));
    }
    Ok(())
}
