use anyhow::{Context, Result};
use rusqlite::Connection;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS runs (
    run_id TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    status TEXT NOT NULL,
    source_version TEXT
);

CREATE TABLE IF NOT EXISTS objects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL REFERENCES runs(run_id),
    type TEXT NOT NULL,
    name TEXT NOT NULL,
    module TEXT NOT NULL,
    source_path TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL REFERENCES runs(run_id),
    object_id INTEGER NOT NULL REFERENCES objects(id),
    event_name TEXT NOT NULL,
    script_ref TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS functions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL REFERENCES runs(run_id),
    object_id INTEGER NOT NULL REFERENCES objects(id),
    function_name TEXT NOT NULL,
    signature TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS relations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL REFERENCES runs(run_id),
    src_id INTEGER NOT NULL REFERENCES objects(id),
    dst_id INTEGER NOT NULL REFERENCES objects(id),
    relation_type TEXT NOT NULL,
    confidence REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS sql_statements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL REFERENCES runs(run_id),
    owner_id INTEGER NOT NULL REFERENCES objects(id),
    sql_text_norm TEXT NOT NULL,
    sql_kind TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sql_tables (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL REFERENCES runs(run_id),
    sql_id INTEGER NOT NULL REFERENCES sql_statements(id),
    table_name TEXT NOT NULL,
    rw_type TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS data_windows (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL REFERENCES runs(run_id),
    object_id INTEGER NOT NULL REFERENCES objects(id),
    dw_name TEXT NOT NULL,
    base_table TEXT,
    sql_select TEXT,
    UNIQUE(run_id, object_id, dw_name)
);

CREATE INDEX IF NOT EXISTS idx_objects_run ON objects(run_id);
CREATE INDEX IF NOT EXISTS idx_objects_name ON objects(run_id, name);
CREATE INDEX IF NOT EXISTS idx_events_object ON events(object_id);
CREATE INDEX IF NOT EXISTS idx_functions_object ON functions(object_id);
CREATE INDEX IF NOT EXISTS idx_relations_run ON relations(run_id);
CREATE INDEX IF NOT EXISTS idx_relations_src ON relations(src_id);
CREATE INDEX IF NOT EXISTS idx_relations_dst ON relations(dst_id);
CREATE INDEX IF NOT EXISTS idx_sql_statements_owner ON sql_statements(owner_id);
CREATE INDEX IF NOT EXISTS idx_sql_tables_sql ON sql_tables(sql_id);
CREATE INDEX IF NOT EXISTS idx_sql_tables_name ON sql_tables(run_id, table_name);
CREATE INDEX IF NOT EXISTS idx_data_windows_object ON data_windows(object_id);
"#;

/// Applies the IR schema. Every statement is idempotent so reopening an
/// existing database is a no-op.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA).context("apply schema")?;
    Ok(())
}
