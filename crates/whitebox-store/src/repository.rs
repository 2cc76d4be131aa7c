use std::marker::PhantomData;

use chrono::Utc;
use rusqlite::{params_from_iter, types::Value as SqlValue, Connection};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::entity::{
    format_timestamp, from_sql, into_field_map, to_sql, Entity, CREATED_AT, ID, UPDATED_AT,
};
use crate::error::{Result, StoreError};
use crate::store::Store;
use crate::types::*;

pub type ModelRepo = Repository<Model, ModelCreate, ModelUpdate>;
pub type InferenceRowRepo = Repository<InferenceRow, InferenceRowCreate, InferenceRowUpdate>;
pub type DatasetRowRepo = Repository<DatasetRow, DatasetRowCreate, DatasetRowUpdate>;

pub const MODELS: ModelRepo = Repository::new();
pub const INFERENCE_ROWS: InferenceRowRepo = Repository::new();
pub const DATASET_ROWS: DatasetRowRepo = Repository::new();

/// Offset pagination. Defaults to the first 100 rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: 100,
        }
    }
}

impl Page {
    pub fn new(skip: usize, limit: usize) -> Self {
        Self { skip, limit }
    }
}

/// Equality criteria, AND-ed together. A JSON null matches `IS NULL`.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    criteria: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criteria.push((field.into(), value.into()));
        self
    }
}

/// CRUD over any [`Entity`], parameterised by its create payload `C` and
/// update payload `U`.
///
/// Holds no state. Each plain method runs as one unit of work on the given
/// [`Store`]; the `_in` variants run on a caller-held connection or
/// transaction so several calls can share one commit.
///
/// Writes stamp `created_at`/`updated_at` server-side and re-read the row
/// before returning it.
pub struct Repository<E, C, U> {
    _marker: PhantomData<fn() -> (E, C, U)>,
}

impl<E, C, U> Repository<E, C, U> {
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<E, C, U> Default for Repository<E, C, U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E, C, U> Clone for Repository<E, C, U> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E, C, U> Copy for Repository<E, C, U> {}

impl<E, C, U> Repository<E, C, U>
where
    E: Entity,
    C: Serialize,
    U: Serialize,
{
    // --- reads -------------------------------------------------------------

    /// Fetch by primary key. `None` when absent.
    pub fn get(&self, db: &Store, id: &str) -> Result<Option<E>> {
        db.unit_of_work(|tx| self.get_in(tx, id))
    }

    pub fn get_in(&self, conn: &Connection, id: &str) -> Result<Option<E>> {
        let sql = format!("{} WHERE id = ?", select_sql::<E>());
        let mut rows = query::<E>(conn, &sql, vec![SqlValue::Text(id.to_string())])?;
        Ok(rows.pop())
    }

    /// One page of the table in insertion order.
    pub fn get_all(&self, db: &Store, page: Page) -> Result<Vec<E>> {
        db.unit_of_work(|tx| self.get_all_in(tx, page))
    }

    pub fn get_all_in(&self, conn: &Connection, page: Page) -> Result<Vec<E>> {
        self.get_all_by_filter_in(conn, &Filter::new(), page)
    }

    /// First row matching every criterion, in insertion order.
    pub fn get_first_by_filter(&self, db: &Store, filter: &Filter) -> Result<Option<E>> {
        db.unit_of_work(|tx| self.get_first_by_filter_in(tx, filter))
    }

    pub fn get_first_by_filter_in(&self, conn: &Connection, filter: &Filter) -> Result<Option<E>> {
        let mut rows = self.get_all_by_filter_in(conn, filter, Page::new(0, 1))?;
        Ok(rows.pop())
    }

    /// Every row matching the filter, one page at a time.
    pub fn get_all_by_filter(&self, db: &Store, filter: &Filter, page: Page) -> Result<Vec<E>> {
        db.unit_of_work(|tx| self.get_all_by_filter_in(tx, filter, page))
    }

    pub fn get_all_by_filter_in(
        &self,
        conn: &Connection,
        filter: &Filter,
        page: Page,
    ) -> Result<Vec<E>> {
        let (clause, mut params) = where_clause::<E>(filter)?;
        let sql = format!(
            "{}{clause} ORDER BY rowid LIMIT ? OFFSET ?",
            select_sql::<E>()
        );
        params.push(SqlValue::Integer(clamp_i64(page.limit)));
        params.push(SqlValue::Integer(clamp_i64(page.skip)));
        query::<E>(conn, &sql, params)
    }

    // --- writes ------------------------------------------------------------

    /// Insert one row with `created_at == updated_at == now`.
    pub fn create(&self, db: &Store, payload: &C) -> Result<E> {
        db.unit_of_work(|tx| self.create_in(tx, payload))
    }

    pub fn create_in(&self, conn: &Connection, payload: &C) -> Result<E> {
        let now = format_timestamp(Utc::now());
        let id = insert::<E, C>(conn, payload, &now)?;
        debug!(table = E::TABLE, %id, "row created");
        refresh(conn, &id)
    }

    /// Insert a batch that shares one timestamp. All rows commit or none do.
    pub fn create_many(&self, db: &Store, payloads: &[C]) -> Result<Vec<E>> {
        db.unit_of_work(|tx| self.create_many_in(tx, payloads))
    }

    /// Atomic only when `conn` is a transaction.
    pub fn create_many_in(&self, conn: &Connection, payloads: &[C]) -> Result<Vec<E>> {
        if payloads.is_empty() {
            return Ok(Vec::new());
        }
        let now = format_timestamp(Utc::now());
        let ids = payloads
            .iter()
            .map(|payload| insert::<E, C>(conn, payload, &now))
            .collect::<Result<Vec<_>>>()?;
        debug!(table = E::TABLE, count = ids.len(), "batch created");
        ids.iter().map(|id| refresh(conn, id)).collect()
    }

    /// Apply the fields set in `payload` and stamp a new `updated_at`.
    pub fn update(&self, db: &Store, entity: &E, payload: &U) -> Result<E> {
        db.unit_of_work(|tx| self.update_in(tx, entity, payload))
    }

    pub fn update_in(&self, conn: &Connection, entity: &E, payload: &U) -> Result<E> {
        self.update_fields_in(conn, entity, into_field_map(payload)?)
    }

    /// Partial update from a loose field map. Keys that are not columns of
    /// the table are ignored, as are `id` and `created_at`.
    pub fn update_fields(&self, db: &Store, entity: &E, changes: Map<String, Value>) -> Result<E> {
        db.unit_of_work(|tx| self.update_fields_in(tx, entity, changes))
    }

    pub fn update_fields_in(
        &self,
        conn: &Connection,
        entity: &E,
        changes: Map<String, Value>,
    ) -> Result<E> {
        let mut sets = Vec::with_capacity(changes.len() + 1);
        let mut params = Vec::with_capacity(changes.len() + 2);
        for (field, value) in &changes {
            match E::column(field) {
                Some(col) if ![ID, CREATED_AT, UPDATED_AT].contains(&col.name) => {
                    sets.push(format!("{} = ?", col.name));
                    params.push(to_sql(col, value)?);
                }
                _ => debug!(table = E::TABLE, %field, "ignoring non-updatable field"),
            }
        }
        // Clock skew must never move updated_at backwards; the fixed-width
        // text form makes MAX() a time comparison.
        sets.push(format!("{UPDATED_AT} = MAX(?, {UPDATED_AT})"));
        params.push(SqlValue::Text(format_timestamp(Utc::now())));
        params.push(SqlValue::Text(entity.id().to_string()));

        let sql = format!("UPDATE {} SET {} WHERE id = ?", E::TABLE, sets.join(", "));
        let n = conn.prepare_cached(&sql)?.execute(params_from_iter(params))?;
        if n == 0 {
            return Err(StoreError::not_found(E::TABLE, entity.id()));
        }
        debug!(table = E::TABLE, id = %entity.id(), "row updated");
        refresh(conn, entity.id())
    }

    /// Delete by primary key. Deleting a missing id is not an error.
    pub fn remove(&self, db: &Store, id: &str) -> Result<()> {
        db.unit_of_work(|tx| self.remove_in(tx, id))
    }

    pub fn remove_in(&self, conn: &Connection, id: &str) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?", E::TABLE);
        let n = conn.prepare_cached(&sql)?.execute([id])?;
        debug!(table = E::TABLE, %id, deleted = n, "row removed");
        Ok(())
    }
}

// --- private helpers -------------------------------------------------------

fn select_sql<E: Entity>() -> String {
    let cols: Vec<&str> = E::COLUMNS.iter().map(|c| c.name).collect();
    format!("SELECT {} FROM {}", cols.join(", "), E::TABLE)
}

fn where_clause<E: Entity>(filter: &Filter) -> Result<(String, Vec<SqlValue>)> {
    if filter.criteria.is_empty() {
        return Ok((String::new(), Vec::new()));
    }
    let mut parts = Vec::with_capacity(filter.criteria.len());
    let mut params = Vec::with_capacity(filter.criteria.len());
    for (field, value) in &filter.criteria {
        let col = E::column(field).ok_or_else(|| unknown_field::<E>(field))?;
        if value.is_null() {
            parts.push(format!("{} IS NULL", col.name));
        } else {
            parts.push(format!("{} = ?", col.name));
            params.push(to_sql(col, value)?);
        }
    }
    Ok((format!(" WHERE {}", parts.join(" AND ")), params))
}

fn query<E: Entity>(conn: &Connection, sql: &str, params: Vec<SqlValue>) -> Result<Vec<E>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let mut rows = stmt.query(params_from_iter(params))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(read_entity::<E>(row)?);
    }
    Ok(out)
}

fn read_entity<E: Entity>(row: &rusqlite::Row<'_>) -> Result<E> {
    let mut map = Map::new();
    for (i, col) in E::COLUMNS.iter().enumerate() {
        map.insert(col.name.to_string(), from_sql(col, row.get_ref(i)?)?);
    }
    E::from_map(map)
}

/// Insert one payload and return the row id. Timestamps in the payload are
/// dropped; the store assigns them.
fn insert<E: Entity, C: Serialize>(conn: &Connection, payload: &C, now: &str) -> Result<String> {
    let mut fields = into_field_map(payload)?;
    fields.remove(CREATED_AT);
    fields.remove(UPDATED_AT);
    let id = match fields.remove(ID) {
        None | Some(Value::Null) => Uuid::new_v4().to_string(),
        Some(Value::String(id)) if !id.is_empty() => id,
        Some(other) => {
            return Err(StoreError::Validation(format!(
                "{}: id must be a non-empty string, got {other}",
                E::TABLE
            )))
        }
    };

    let mut names = vec![ID, CREATED_AT, UPDATED_AT];
    let mut params = vec![
        SqlValue::Text(id.clone()),
        SqlValue::Text(now.to_string()),
        SqlValue::Text(now.to_string()),
    ];
    for (field, value) in &fields {
        let col = E::column(field).ok_or_else(|| unknown_field::<E>(field))?;
        names.push(col.name);
        params.push(to_sql(col, value)?);
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        E::TABLE,
        names.join(", "),
        vec!["?"; names.len()].join(", ")
    );
    conn.prepare_cached(&sql)?.execute(params_from_iter(params))?;
    Ok(id)
}

/// Re-read a row just written so the caller sees what the store holds.
fn refresh<E: Entity>(conn: &Connection, id: &str) -> Result<E> {
    let sql = format!("{} WHERE id = ?", select_sql::<E>());
    query::<E>(conn, &sql, vec![SqlValue::Text(id.to_string())])?
        .pop()
        .ok_or_else(|| StoreError::not_found(E::TABLE, id))
}

fn unknown_field<E: Entity>(field: &str) -> StoreError {
    StoreError::Validation(format!("{} has no column `{field}`", E::TABLE))
}

fn clamp_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
