//! `whitebox-store`: SQLite persistence for monitored models and their data.
//!
//! # Overview
//!
//! Every table is described by an [`entity::Entity`] implementation (table
//! name plus typed column list). The generic [`repository::Repository`] turns
//! that descriptor into get/filter/create/update/remove operations, each run
//! as one unit of work on a [`store::Store`].
//!
//! | Table            | Entity                  |
//! |------------------|-------------------------|
//! | `models`         | [`types::Model`]        |
//! | `inference_rows` | [`types::InferenceRow`] |
//! | `dataset_rows`   | [`types::DatasetRow`]   |

pub mod db;
pub mod entity;
pub mod error;
pub mod ingest;
pub mod repository;
pub mod store;
pub mod types;

pub use entity::{Column, ColumnKind, Entity};
pub use error::{Result, StoreError};
pub use repository::{
    DatasetRowRepo, Filter, InferenceRowRepo, ModelRepo, Page, Repository, DATASET_ROWS,
    INFERENCE_ROWS, MODELS,
};
pub use store::Store;
pub use types::{
    DatasetRow, DatasetRowCreate, DatasetRowUpdate, InferenceRow, InferenceRowCreate,
    InferenceRowUpdate, Model, ModelCreate, ModelType, ModelUpdate,
};
