use crate::db::{CallGraphRow, Db, EventFunctionRow, InventoryRow, TableImpactRow};
use crate::util;
use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Csv,
    Json,
}

impl ReportFormat {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "csv" => Ok(ReportFormat::Csv),
            "json" => Ok(ReportFormat::Json),
            other => bail!("unsupported report format: {other}"),
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Csv => "csv",
            ReportFormat::Json => "json",
        }
    }
}

/// Column layout for CSV output; JSON goes through serde directly.
trait ReportRow: Serialize {
    fn headers() -> &'static [&'static str];
    fn cells(&self) -> Vec<String>;
}

impl ReportRow for InventoryRow {
    fn headers() -> &'static [&'static str] {
        &["type", "name", "module", "source_path"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.object_type.clone(),
            self.name.clone(),
            self.module.clone(),
            self.source_path.clone(),
        ]
    }
}

impl ReportRow for EventFunctionRow {
    fn headers() -> &'static [&'static str] {
        &["object_name", "event_name", "script_ref", "called_objects"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.object_name.clone(),
            self.event_name.clone(),
            self.script_ref.clone(),
            self.called_objects.clone(),
        ]
    }
}

impl ReportRow for TableImpactRow {
    fn headers() -> &'static [&'static str] {
        &["table_name", "rw_type", "owner_object", "sql_kind"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.table_name.clone(),
            self.rw_type.clone(),
            self.owner_object.clone(),
            self.sql_kind.clone(),
        ]
    }
}

impl ReportRow for CallGraphRow {
    fn headers() -> &'static [&'static str] {
        &["src_name", "dst_name", "relation_type", "confidence"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.src_name.clone(),
            self.dst_name.clone(),
            self.relation_type.clone(),
            self.confidence.to_string(),
        ]
    }
}

/// Writes the five standard reports from the IR database and returns
/// the generated file paths.
pub fn generate_reports(
    db_path: &Path,
    output_dir: &Path,
    format: ReportFormat,
) -> Result<Vec<PathBuf>> {
    let db = Db::open_existing(db_path)?;
    util::ensure_dir(output_dir)?;

    let mut generated_files = Vec::new();
    generated_files.push(write_report(
        output_dir,
        "screen_inventory",
        format,
        &db.screen_inventory()?,
    )?);
    generated_files.push(write_report(
        output_dir,
        "event_function_map",
        format,
        &db.event_function_map()?,
    )?);
    generated_files.push(write_report(
        output_dir,
        "table_impact",
        format,
        &db.table_impact()?,
    )?);
    generated_files.push(write_report(
        output_dir,
        "screen_call_graph",
        format,
        &db.screen_call_graph()?,
    )?);
    generated_files.push(write_report(
        output_dir,
        "unused_object_candidates",
        format,
        &db.unused_object_candidates()?,
    )?);

    Ok(generated_files)
}

fn write_report<T: ReportRow>(
    output_dir: &Path,
    report_name: &str,
    format: ReportFormat,
    rows: &[T],
) -> Result<PathBuf> {
    let report_path = output_dir.join(format!("{report_name}.{}", format.extension()));
    let payload = match format {
        ReportFormat::Json => serde_json::to_string_pretty(rows)?,
        ReportFormat::Csv => render_csv(rows),
    };
    std::fs::write(&report_path, payload)
        .with_context(|| format!("write report {}", report_path.display()))?;
    Ok(report_path)
}

fn render_csv<T: ReportRow>(rows: &[T]) -> String {
    let mut out = String::new();
    write_csv_row(&mut out, T::headers().iter().copied());
    for row in rows {
        let cells = row.cells();
        write_csv_row(&mut out, cells.iter().map(String::as_str));
    }
    out
}

fn write_csv_row<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>) {
    let mut first = true;
    for cell in cells {
        if !first {
            out.push(',');
        }
        first = false;
        if cell.contains([',', '"', '\n', '\r']) {
            let _ = write!(out, "\"{}\"", cell.replace('"', "\"\""));
        } else {
            out.push_str(cell);
        }
    }
    out.push_str("\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_parse_case_insensitively() {
        assert_eq!(ReportFormat::from_name("CSV").unwrap(), ReportFormat::Csv);
        assert_eq!(ReportFormat::from_name("json").unwrap(), ReportFormat::Json);
        assert!(ReportFormat::from_name("html").is_err());
    }

    #[test]
    fn csv_quotes_only_cells_that_need_it() {
        let rows = vec![InventoryRow {
            object_type: "Window".to_string(),
            name: "w_a,b".to_string(),
            module: "app".to_string(),
            source_path: "/src/\"odd\" name".to_string(),
        }];
        let rendered = render_csv(&rows);
        let mut lines = rendered.lines();
        assert_eq!(lines.next().unwrap(), "type,name,module,source_path");
        assert_eq!(
            lines.next().unwrap(),
            "Window,\"w_a,b\",app,\"/src/\"\"odd\"\" name\""
        );
    }

    #[test]
    fn empty_report_is_just_a_header() {
        let rendered = render_csv::<InventoryRow>(&[]);
        assert_eq!(rendered, "type,name,module,source_path\r\n");
    }
}
