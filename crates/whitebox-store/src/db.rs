use rusqlite::Connection;

/// Initialise the monitoring schema. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    create_models_table(conn)?;
    create_inference_rows_table(conn)?;
    create_dataset_rows_table(conn)?;
    Ok(())
}

fn create_models_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS models (
            id            TEXT NOT NULL PRIMARY KEY,
            name          TEXT NOT NULL,
            description   TEXT NOT NULL DEFAULT '',
            model_type    TEXT NOT NULL,
            target_column TEXT NOT NULL,
            labels        TEXT,               -- JSON object or NULL
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );",
    )
}

/// Inference rows die with their model (ON DELETE CASCADE).
/// The (model_id, is_used) index serves the metrics pipeline's polling query.
fn create_inference_rows_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS inference_rows (
            id            TEXT NOT NULL PRIMARY KEY,
            model_id      TEXT NOT NULL REFERENCES models(id) ON DELETE CASCADE,
            timestamp     TEXT NOT NULL,
            nonprocessed  TEXT NOT NULL,      -- JSON document
            processed     TEXT NOT NULL,      -- JSON document
            is_used       INTEGER NOT NULL DEFAULT 0,
            actual        REAL,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_inference_rows_model
            ON inference_rows(model_id, is_used);",
    )
}

fn create_dataset_rows_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS dataset_rows (
            id            TEXT NOT NULL PRIMARY KEY,
            model_id      TEXT NOT NULL REFERENCES models(id) ON DELETE CASCADE,
            nonprocessed  TEXT NOT NULL,
            processed     TEXT NOT NULL,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_dataset_rows_model
            ON dataset_rows(model_id);",
    )
}
