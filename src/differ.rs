use crate::db::Db;
use crate::model::{DiffItem, DiffResult};
use anyhow::{Result, bail};
use std::collections::BTreeSet;
use std::path::Path;

/// Compares two persisted runs and reports added/removed objects,
/// relations, SQL statements and data windows.
pub fn diff_runs(db_path: &Path, run_id_old: &str, run_id_new: &str) -> Result<DiffResult> {
    let db = Db::open_existing(db_path)?;

    for run_id in [run_id_old, run_id_new] {
        if !db.run_exists(run_id)? {
            bail!("Run not found: {run_id}");
        }
    }

    let mut items: Vec<DiffItem> = Vec::new();
    push_category(
        &mut items,
        "object",
        &db.object_keys(run_id_old)?,
        &db.object_keys(run_id_new)?,
    );
    push_category(
        &mut items,
        "relation",
        &db.relation_keys(run_id_old)?,
        &db.relation_keys(run_id_new)?,
    );
    push_category(
        &mut items,
        "sql_statement",
        &db.sql_statement_keys(run_id_old)?,
        &db.sql_statement_keys(run_id_new)?,
    );
    push_category(
        &mut items,
        "data_window",
        &db.data_window_keys(run_id_old)?,
        &db.data_window_keys(run_id_new)?,
    );

    Ok(DiffResult {
        run_id_old: run_id_old.to_string(),
        run_id_new: run_id_new.to_string(),
        items,
    })
}

fn push_category(
    items: &mut Vec<DiffItem>,
    category: &str,
    old_keys: &BTreeSet<String>,
    new_keys: &BTreeSet<String>,
) {
    for key in new_keys.difference(old_keys) {
        items.push(DiffItem {
            category: category.to_string(),
            name: key.clone(),
            change_type: "added".to_string(),
        });
    }
    for key in old_keys.difference(new_keys) {
        items.push(DiffItem {
            category: category.to_string(),
            name: key.clone(),
            change_type: "removed".to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnalysisResult, ObjectRecord, ObjectType, RunContext};

    fn run_context(run_id: &str) -> RunContext {
        RunContext {
            run_id: run_id.to_string(),
            started_at: "2026-01-01T00:00:00+00:00".to_string(),
            finished_at: "2026-01-01T00:00:05+00:00".to_string(),
            status: "success".to_string(),
            source_version: None,
        }
    }

    fn window(name: &str) -> ObjectRecord {
        ObjectRecord {
            object_type: ObjectType::Window,
            name: name.to_string(),
            module: "app".to_string(),
            source_path: format!("/src/{name}.srw"),
        }
    }

    #[test]
    fn added_and_removed_objects_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("ir.db");
        let mut db = Db::open(&db_path).unwrap();

        let old_analysis = AnalysisResult {
            objects: vec![window("w_main"), window("w_gone")],
            ..Default::default()
        };
        let new_analysis = AnalysisResult {
            objects: vec![window("w_main"), window("w_new")],
            ..Default::default()
        };
        db.persist(&run_context("run_old"), &old_analysis).unwrap();
        db.persist(&run_context("run_new"), &new_analysis).unwrap();
        drop(db);

        let result = diff_runs(&db_path, "run_old", "run_new").unwrap();
        assert_eq!(
            result.items,
            vec![
                DiffItem {
                    category: "object".to_string(),
                    name: "Window:w_new".to_string(),
                    change_type: "added".to_string(),
                },
                DiffItem {
                    category: "object".to_string(),
                    name: "Window:w_gone".to_string(),
                    change_type: "removed".to_string(),
                },
            ]
        );
    }

    #[test]
    fn identical_runs_diff_empty() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("ir.db");
        let mut db = Db::open(&db_path).unwrap();
        let analysis = AnalysisResult {
            objects: vec![window("w_main")],
            ..Default::default()
        };
        db.persist(&run_context("run_a"), &analysis).unwrap();
        db.persist(&run_context("run_b"), &analysis).unwrap();
        drop(db);

        let result = diff_runs(&db_path, "run_a", "run_b").unwrap();
        assert!(result.items.is_empty());
    }

    #[test]
    fn unknown_run_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("ir.db");
        let mut db = Db::open(&db_path).unwrap();
        db.persist(
            &run_context("run_a"),
            &AnalysisResult {
                objects: vec![window("w_main")],
                ..Default::default()
            },
        )
        .unwrap();
        drop(db);

        let err = diff_runs(&db_path, "run_a", "run_missing").unwrap_err();
        assert!(err.to_string().contains("Run not found: run_missing"));
    }

    #[test]
    fn missing_db_file_is_an_input_error() {
        let err = diff_runs(Path::new("/nonexistent/ir.db"), "a", "b").unwrap_err();
        assert!(err.to_string().contains("DB file not found"));
    }
}
