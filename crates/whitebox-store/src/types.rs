use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::{Column, ColumnKind, Entity};

/// What kind of prediction a model produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    Binary,
    MultiClass,
    Regression,
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Binary => write!(f, "binary"),
            Self::MultiClass => write!(f, "multi_class"),
            Self::Regression => write!(f, "regression"),
        }
    }
}

/// A registered model. Owns its inference and dataset rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub model_type: ModelType,
    /// Name of the column holding ground truth in dataset rows.
    pub target_column: String,
    /// Label index → label name, for classifiers.
    pub labels: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Model {
    const TABLE: &'static str = "models";
    const COLUMNS: &'static [Column] = &[
        Column::new("id", ColumnKind::Text),
        Column::new("name", ColumnKind::Text),
        Column::new("description", ColumnKind::Text),
        Column::new("model_type", ColumnKind::Text),
        Column::new("target_column", ColumnKind::Text),
        Column::new("labels", ColumnKind::Json),
        Column::new("created_at", ColumnKind::Timestamp),
        Column::new("updated_at", ColumnKind::Timestamp),
    ];

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCreate {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub model_type: ModelType,
    pub target_column: String,
    #[serde(default)]
    pub labels: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Value>,
}

/// One prediction served by a monitored model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRow {
    pub id: String,
    pub model_id: String,
    /// When the prediction was made (client clock).
    pub timestamp: DateTime<Utc>,
    /// Raw request payload as received.
    pub nonprocessed: Value,
    /// Feature vector plus prediction after preprocessing.
    pub processed: Value,
    /// Set once the metrics pipeline has consumed this row.
    pub is_used: bool,
    /// Ground truth, when it arrives.
    pub actual: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for InferenceRow {
    const TABLE: &'static str = "inference_rows";
    const COLUMNS: &'static [Column] = &[
        Column::new("id", ColumnKind::Text),
        Column::new("model_id", ColumnKind::Text),
        Column::new("timestamp", ColumnKind::Timestamp),
        Column::new("nonprocessed", ColumnKind::Json),
        Column::new("processed", ColumnKind::Json),
        Column::new("is_used", ColumnKind::Bool),
        Column::new("actual", ColumnKind::Real),
        Column::new("created_at", ColumnKind::Timestamp),
        Column::new("updated_at", ColumnKind::Timestamp),
    ];

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceRowCreate {
    pub model_id: String,
    pub timestamp: DateTime<Utc>,
    pub nonprocessed: Value,
    pub processed: Value,
    #[serde(default)]
    pub is_used: bool,
    #[serde(default)]
    pub actual: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InferenceRowUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_used: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<f64>,
}

/// One row of a model's training/reference dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRow {
    pub id: String,
    pub model_id: String,
    /// Feature name → raw value.
    pub nonprocessed: Value,
    pub processed: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for DatasetRow {
    const TABLE: &'static str = "dataset_rows";
    const COLUMNS: &'static [Column] = &[
        Column::new("id", ColumnKind::Text),
        Column::new("model_id", ColumnKind::Text),
        Column::new("nonprocessed", ColumnKind::Json),
        Column::new("processed", ColumnKind::Json),
        Column::new("created_at", ColumnKind::Timestamp),
        Column::new("updated_at", ColumnKind::Timestamp),
    ];

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetRowCreate {
    pub model_id: String,
    pub nonprocessed: Value,
    pub processed: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetRowUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonprocessed: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed: Option<Value>,
}
