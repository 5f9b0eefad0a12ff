use crate::model::{AnalysisResult, PersistResult, RunContext};
use anyhow::{Context, Result, bail};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

mod migrations;

/// Handle over the IR database. One connection, schema applied on open.
#[derive(Debug)]
pub struct Db {
    conn: Connection,
}

// Report row shapes, field order is the column order emitted to CSV.

#[derive(Debug, Serialize)]
pub struct InventoryRow {
    #[serde(rename = "type")]
    pub object_type: String,
    pub name: String,
    pub module: String,
    pub source_path: String,
}

#[derive(Debug, Serialize)]
pub struct EventFunctionRow {
    pub object_name: String,
    pub event_name: String,
    pub script_ref: String,
    pub called_objects: String,
}

#[derive(Debug, Serialize)]
pub struct TableImpactRow {
    pub table_name: String,
    pub rw_type: String,
    pub owner_object: String,
    pub sql_kind: String,
}

#[derive(Debug, Serialize)]
pub struct CallGraphRow {
    pub src_name: String,
    pub dst_name: String,
    pub relation_type: String,
    pub confidence: f64,
}

impl Db {
    pub fn open(db_path: &Path) -> Result<Self> {
        let db_string = db_path.display().to_string();
        if db_string.starts_with("postgresql://") || db_string.starts_with("postgres://") {
            bail!("PostgreSQL persistence is not implemented. Use a SQLite file path.");
        }
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create db dir {}", parent.display()))?;
            }
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("open database {}", db_path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::migrate(&conn)?;
        Ok(Self { conn })
    }

    /// Open for read-only stages, fails fast when no run ever persisted.
    pub fn open_existing(db_path: &Path) -> Result<Self> {
        if !db_path.exists() {
            bail!("DB file not found: {}", db_path.display());
        }
        Self::open(db_path)
    }

    /// Writes one run's IR in a single transaction. Records whose owner
    /// object never resolved are dropped silently, matching the fail-soft
    /// posture of the earlier stages.
    pub fn persist(
        &mut self,
        run_context: &RunContext,
        analysis: &AnalysisResult,
    ) -> Result<PersistResult> {
        let tx = self.conn.transaction().context("begin persist")?;

        tx.execute(
            "INSERT INTO runs (run_id, started_at, finished_at, status, source_version)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            (
                &run_context.run_id,
                &run_context.started_at,
                &run_context.finished_at,
                &run_context.status,
                &run_context.source_version,
            ),
        )
        .context("insert run")?;

        // First insert wins when names collide case-insensitively.
        let mut object_name_to_id: HashMap<String, i64> = HashMap::new();
        let mut objects_count = 0usize;
        for object_item in &analysis.objects {
            tx.execute(
                "INSERT INTO objects (run_id, type, name, module, source_path)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    &run_context.run_id,
                    object_item.object_type.as_str(),
                    &object_item.name,
                    &object_item.module,
                    &object_item.source_path,
                ),
            )
            .context("insert object")?;
            let object_id = tx.last_insert_rowid();
            object_name_to_id
                .entry(object_item.name.to_lowercase())
                .or_insert(object_id);
            objects_count += 1;
        }

        let mut events_count = 0usize;
        for event_item in &analysis.events {
            let Some(object_id) = object_name_to_id.get(&event_item.object_name.to_lowercase())
            else {
                continue;
            };
            tx.execute(
                "INSERT INTO events (run_id, object_id, event_name, script_ref)
                 VALUES (?1, ?2, ?3, ?4)",
                (
                    &run_context.run_id,
                    object_id,
                    &event_item.event_name,
                    &event_item.script_ref,
                ),
            )
            .context("insert event")?;
            events_count += 1;
        }

        let mut functions_count = 0usize;
        for function_item in &analysis.functions {
            let Some(object_id) =
                object_name_to_id.get(&function_item.object_name.to_lowercase())
            else {
                continue;
            };
            tx.execute(
                "INSERT INTO functions (run_id, object_id, function_name, signature)
                 VALUES (?1, ?2, ?3, ?4)",
                (
                    &run_context.run_id,
                    object_id,
                    &function_item.function_name,
                    &function_item.signature,
                ),
            )
            .context("insert function")?;
            functions_count += 1;
        }

        let mut relations_count = 0usize;
        for relation_item in &analysis.relations {
            let src_id = object_name_to_id.get(&relation_item.src_name.to_lowercase());
            let dst_id = object_name_to_id.get(&relation_item.dst_name.to_lowercase());
            let (Some(src_id), Some(dst_id)) = (src_id, dst_id) else {
                continue;
            };
            tx.execute(
                "INSERT INTO relations (run_id, src_id, dst_id, relation_type, confidence)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    &run_context.run_id,
                    src_id,
                    dst_id,
                    relation_item.relation_type.as_str(),
                    relation_item.confidence,
                ),
            )
            .context("insert relation")?;
            relations_count += 1;
        }

        let mut sql_statements_count = 0usize;
        let mut sql_tables_count = 0usize;
        for statement_item in &analysis.sql_statements {
            let Some(owner_id) = object_name_to_id.get(&statement_item.owner_name.to_lowercase())
            else {
                continue;
            };
            tx.execute(
                "INSERT INTO sql_statements (run_id, owner_id, sql_text_norm, sql_kind)
                 VALUES (?1, ?2, ?3, ?4)",
                (
                    &run_context.run_id,
                    owner_id,
                    &statement_item.sql_text_norm,
                    statement_item.sql_kind.as_str(),
                ),
            )
            .context("insert sql statement")?;
            let sql_id = tx.last_insert_rowid();
            sql_statements_count += 1;

            for usage in &statement_item.table_usages {
                tx.execute(
                    "INSERT INTO sql_tables (run_id, sql_id, table_name, rw_type)
                     VALUES (?1, ?2, ?3, ?4)",
                    (
                        &run_context.run_id,
                        sql_id,
                        &usage.table_name,
                        usage.rw_type.as_str(),
                    ),
                )
                .context("insert sql table")?;
                sql_tables_count += 1;
            }
        }

        let mut data_windows_count = 0usize;
        for dw_item in &analysis.data_windows {
            let Some(object_id) = object_name_to_id.get(&dw_item.object_name.to_lowercase())
            else {
                continue;
            };
            tx.execute(
                "INSERT OR IGNORE INTO data_windows
                     (run_id, object_id, dw_name, base_table, sql_select)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    &run_context.run_id,
                    object_id,
                    &dw_item.dw_name,
                    &dw_item.base_table,
                    &dw_item.sql_select,
                ),
            )
            .context("insert data window")?;
            data_windows_count += 1;
        }

        tx.commit().context("commit persist")?;

        Ok(PersistResult {
            objects_count,
            events_count,
            functions_count,
            relations_count,
            sql_statements_count,
            sql_tables_count,
            data_windows_count,
        })
    }

    pub fn run_exists(&self, run_id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM runs WHERE run_id = ?1",
            [run_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // Comparable key sets for run-to-run diffing.

    pub fn object_keys(&self, run_id: &str) -> Result<BTreeSet<String>> {
        self.key_set(
            "SELECT type || ':' || name FROM objects WHERE run_id = ?1",
            run_id,
        )
    }

    pub fn relation_keys(&self, run_id: &str) -> Result<BTreeSet<String>> {
        self.key_set(
            "SELECT src.name || '->' || dst.name || ':' || r.relation_type
             FROM relations r
             JOIN objects src ON src.id = r.src_id AND src.run_id = r.run_id
             JOIN objects dst ON dst.id = r.dst_id AND dst.run_id = r.run_id
             WHERE r.run_id = ?1",
            run_id,
        )
    }

    pub fn sql_statement_keys(&self, run_id: &str) -> Result<BTreeSet<String>> {
        self.key_set(
            "SELECT o.name || ':' || ss.sql_kind || ':' || ss.sql_text_norm
             FROM sql_statements ss
             JOIN objects o ON o.id = ss.owner_id AND o.run_id = ss.run_id
             WHERE ss.run_id = ?1",
            run_id,
        )
    }

    pub fn data_window_keys(&self, run_id: &str) -> Result<BTreeSet<String>> {
        self.key_set(
            "SELECT o.name || ':' || dw.dw_name || ':' || COALESCE(dw.base_table, '')
             FROM data_windows dw
             JOIN objects o ON o.id = dw.object_id AND o.run_id = dw.run_id
             WHERE dw.run_id = ?1",
            run_id,
        )
    }

    fn key_set(&self, sql: &str, run_id: &str) -> Result<BTreeSet<String>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([run_id], |row| row.get::<_, String>(0))?;
        let mut keys = BTreeSet::new();
        for row in rows {
            keys.insert(row?);
        }
        Ok(keys)
    }

    // Report queries.

    pub fn screen_inventory(&self) -> Result<Vec<InventoryRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT type, name, module, source_path
             FROM objects
             ORDER BY type, name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(InventoryRow {
                object_type: row.get(0)?,
                name: row.get(1)?,
                module: row.get(2)?,
                source_path: row.get(3)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("query screen inventory")
    }

    pub fn event_function_map(&self) -> Result<Vec<EventFunctionRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                 o.name AS object_name,
                 e.event_name,
                 e.script_ref,
                 COALESCE(GROUP_CONCAT(DISTINCT dst.name), '') AS called_objects
             FROM events e
             JOIN objects o ON o.id = e.object_id
             LEFT JOIN relations r
                 ON r.src_id = o.id
                AND r.relation_type = 'calls'
             LEFT JOIN objects dst ON dst.id = r.dst_id
             GROUP BY o.name, e.event_name, e.script_ref
             ORDER BY o.name, e.event_name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(EventFunctionRow {
                object_name: row.get(0)?,
                event_name: row.get(1)?,
                script_ref: row.get(2)?,
                called_objects: row.get(3)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("query event function map")
    }

    pub fn table_impact(&self) -> Result<Vec<TableImpactRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                 st.table_name,
                 st.rw_type,
                 owner.name AS owner_object,
                 ss.sql_kind
             FROM sql_tables st
             JOIN sql_statements ss ON ss.id = st.sql_id
             JOIN objects owner ON owner.id = ss.owner_id
             ORDER BY st.table_name, owner.name, st.rw_type",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(TableImpactRow {
                table_name: row.get(0)?,
                rw_type: row.get(1)?,
                owner_object: row.get(2)?,
                sql_kind: row.get(3)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("query table impact")
    }

    pub fn screen_call_graph(&self) -> Result<Vec<CallGraphRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                 src.name AS src_name,
                 dst.name AS dst_name,
                 r.relation_type,
                 r.confidence
             FROM relations r
             JOIN objects src ON src.id = r.src_id
             JOIN objects dst ON dst.id = r.dst_id
             WHERE r.relation_type IN ('opens', 'calls')
             ORDER BY src.name, dst.name, r.relation_type",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CallGraphRow {
                src_name: row.get(0)?,
                dst_name: row.get(1)?,
                relation_type: row.get(2)?,
                confidence: row.get(3)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("query screen call graph")
    }

    /// Objects with no relations in either direction and no parsed
    /// events or functions. Tables are structural, never candidates.
    pub fn unused_object_candidates(&self) -> Result<Vec<InventoryRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                 o.type,
                 o.name,
                 o.module,
                 o.source_path
             FROM objects o
             LEFT JOIN relations rel_src ON rel_src.src_id = o.id
             LEFT JOIN relations rel_dst ON rel_dst.dst_id = o.id
             LEFT JOIN events e ON e.object_id = o.id
             LEFT JOIN functions f ON f.object_id = o.id
             WHERE rel_src.id IS NULL
               AND rel_dst.id IS NULL
               AND e.id IS NULL
               AND f.id IS NULL
               AND o.type <> 'Table'
             GROUP BY o.id, o.type, o.name, o.module, o.source_path
             ORDER BY o.type, o.name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(InventoryRow {
                object_type: row.get(0)?,
                name: row.get(1)?,
                module: row.get(2)?,
                source_path: row.get(3)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("query unused object candidates")
    }
}
