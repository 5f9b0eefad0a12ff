use crate::extractor::load_manifest;
use crate::model::{
    ObjectType, ParseIssue, ParseResult, ParsedDataWindow, ParsedEvent, ParsedFunction,
    ParsedObject,
};
use crate::util;
use anyhow::Result;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

/// Per-object ceiling on recorded syntax markers, keeps degenerate
/// exports from flooding the issue list.
pub const MAX_ERRORS_PER_FILE: usize = 100;

static EVENT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)^\s*event\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap(),
        Regex::new(r"(?i)^\s*on\s+([A-Za-z_][A-Za-z0-9_]*)\b").unwrap(),
    ]
});

static FUNCTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(
            r"(?i)^\s*(?:public|private|protected)?\s*(?:function|subroutine)\s+(?:[A-Za-z_][A-Za-z0-9_\[\]]*\s+)?([A-Za-z_][A-Za-z0-9_]*)\s*\(",
        )
        .unwrap(),
        Regex::new(r"(?i)^\s*(?:function|subroutine)\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap(),
    ]
});

static DW_RETRIEVE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)retrieve\s*=\s*"(.*?)""#).unwrap());

static DW_UPDATE_TABLE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)update\s*=\s*"([A-Za-z_][A-Za-z0-9_$.#]*)""#).unwrap());

static DW_TABLE_BLOCK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)table\s*\(").unwrap());

static SQL_FROM_TABLE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:FROM|JOIN)\s+([A-Za-z_][A-Za-z0-9_$.#]*)").unwrap());

static SQL_START_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(SELECT|INSERT|UPDATE|DELETE|MERGE)\b").unwrap());

/// Parses every extracted object named by the manifest. Broken scripts
/// become issues, never a failed run.
pub fn parse_manifest(manifest_path: &Path) -> Result<ParseResult> {
    let manifest = load_manifest(manifest_path)?;

    let mut parsed_objects: Vec<ParsedObject> = Vec::new();
    let mut issues: Vec<ParseIssue> = Vec::new();

    for item in &manifest.objects {
        let object_path = Path::new(&item.extracted_path);
        let script_text = match util::read_to_string(object_path) {
            Ok(text) => text,
            Err(err) => {
                issues.push(ParseIssue {
                    object_name: item.name.clone(),
                    source_path: item.source_path.clone(),
                    message: format!("failed to read extracted file: {err}"),
                    line_no: None,
                });
                continue;
            }
        };

        let mut events: Vec<ParsedEvent> = Vec::new();
        let mut functions: Vec<ParsedFunction> = Vec::new();
        let mut seen_events: HashSet<String> = HashSet::new();
        let mut seen_functions: HashSet<String> = HashSet::new();
        let mut object_error_count = 0usize;

        for (index, line) in script_text.lines().enumerate() {
            let line_no = index + 1;
            if line.to_lowercase().contains("syntax_error") {
                issues.push(ParseIssue {
                    object_name: item.name.clone(),
                    source_path: item.source_path.clone(),
                    message: "synthetic syntax marker detected".to_string(),
                    line_no: Some(line_no),
                });
                object_error_count += 1;
                if object_error_count >= MAX_ERRORS_PER_FILE {
                    break;
                }
            }

            if let Some(event_name) = match_first(&EVENT_PATTERNS, line) {
                if seen_events.insert(event_name.to_lowercase()) {
                    events.push(ParsedEvent {
                        event_name,
                        script_ref: format!("{}:{line_no}", item.extracted_path),
                    });
                }
            }

            if let Some(function_name) = match_first(&FUNCTION_PATTERNS, line) {
                if seen_functions.insert(function_name.to_lowercase()) {
                    functions.push(ParsedFunction {
                        function_name,
                        signature: util::truncate_str_bytes(line.trim(), 200),
                    });
                }
            }
        }

        let data_windows = parse_data_windows(item.object_type, &item.name, &script_text);

        parsed_objects.push(ParsedObject {
            object_type: item.object_type,
            name: item.name.clone(),
            module: item.module.clone(),
            source_path: item.source_path.clone(),
            extracted_path: item.extracted_path.clone(),
            script_text,
            events,
            functions,
            data_windows,
        });
    }

    Ok(ParseResult {
        objects: parsed_objects,
        issues,
    })
}

fn match_first(patterns: &[Regex], line: &str) -> Option<String> {
    for pattern in patterns {
        if let Some(captures) = pattern.captures(line) {
            return captures.get(1).map(|group| group.as_str().to_string());
        }
    }
    None
}

/// Pulls the retrieval SQL and writable base table out of a DataWindow
/// export. Painter exports carry `retrieve="..."`; loose `.sql` snippets
/// classified as DataWindows are taken whole when they start with a verb.
fn parse_data_windows(
    object_type: ObjectType,
    object_name: &str,
    script_text: &str,
) -> Vec<ParsedDataWindow> {
    if object_type != ObjectType::DataWindow {
        return Vec::new();
    }

    let mut sql_select: Option<String> = None;
    let mut base_table: Option<String> = None;

    if let Some(captures) = DW_RETRIEVE_PATTERN.captures(script_text) {
        sql_select = captures
            .get(1)
            .map(|group| util::collapse_whitespace(group.as_str()));
    }
    if let Some(captures) = DW_UPDATE_TABLE_PATTERN.captures(script_text) {
        base_table = captures
            .get(1)
            .map(|group| group.as_str().trim().to_string());
    }

    if sql_select.is_none() && !DW_TABLE_BLOCK_PATTERN.is_match(script_text) {
        let candidate = script_text.trim();
        if !candidate.is_empty() && SQL_START_PATTERN.is_match(candidate) {
            sql_select = Some(util::collapse_whitespace(candidate));
        }
    }

    if base_table.is_none() {
        if let Some(sql) = sql_select.as_deref() {
            base_table = SQL_FROM_TABLE_PATTERN
                .captures(sql)
                .and_then(|captures| captures.get(1))
                .map(|group| group.as_str().trim().to_string());
        }
    }

    if sql_select.is_none() && base_table.is_none() {
        return Vec::new();
    }

    vec![ParsedDataWindow {
        dw_name: object_name.to_string(),
        base_table,
        sql_select,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_and_function_headers_match_case_insensitively() {
        assert_eq!(
            match_first(&EVENT_PATTERNS, "Event Clicked"),
            Some("Clicked".to_string())
        );
        assert_eq!(
            match_first(&EVENT_PATTERNS, "on ue_refresh call"),
            Some("ue_refresh".to_string())
        );
        assert_eq!(
            match_first(
                &FUNCTION_PATTERNS,
                "public function integer wf_total (long al_row)"
            ),
            Some("wf_total".to_string())
        );
        assert_eq!(
            match_first(&FUNCTION_PATTERNS, "subroutine wf_reset()"),
            Some("wf_reset".to_string())
        );
        assert_eq!(match_first(&FUNCTION_PATTERNS, "ls_total = wf_total(1)"), None);
    }

    #[test]
    fn datawindow_retrieve_sql_is_flattened() {
        let script = "release 12;\nretrieve=\"SELECT id,\n  name\nFROM tb_order\"\ntable(column=(type=long))";
        let windows = parse_data_windows(ObjectType::DataWindow, "dw_orders", script);
        assert_eq!(windows.len(), 1);
        assert_eq!(
            windows[0].sql_select.as_deref(),
            Some("SELECT id, name FROM tb_order")
        );
        assert_eq!(windows[0].base_table.as_deref(), Some("tb_order"));
    }

    #[test]
    fn datawindow_update_attribute_wins_over_from_clause() {
        let script = "retrieve=\"SELECT * FROM v_orders\"\nupdate=\"tb_order\"";
        let windows = parse_data_windows(ObjectType::DataWindow, "dw_orders", script);
        assert_eq!(windows[0].base_table.as_deref(), Some("tb_order"));
    }

    #[test]
    fn loose_sql_snippet_is_taken_whole() {
        let script = "SELECT id FROM tb_item WHERE qty > 0";
        let windows = parse_data_windows(ObjectType::DataWindow, "dw_items", script);
        assert_eq!(windows[0].sql_select.as_deref(), Some(script));
        assert_eq!(windows[0].base_table.as_deref(), Some("tb_item"));
    }

    #[test]
    fn non_datawindow_objects_yield_nothing() {
        let windows = parse_data_windows(ObjectType::Window, "w_main", "SELECT 1 FROM t");
        assert!(windows.is_empty());
    }
}
