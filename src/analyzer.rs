use crate::model::{
    AnalysisResult, DataWindowRecord, EventRecord, FunctionRecord, ObjectRecord, ObjectType,
    ParseResult, RelationRecord, RelationType, RwType, SqlKind, SqlStatementRecord, TableUsage,
};
use crate::rules::TableMappingConfig;
use crate::util;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

/// Relation confidence weights. Lexical matching is heuristic; tighter
/// patterns earn higher scores.
pub mod confidence {
    pub const CALLS: f64 = 0.85;
    pub const OPENS: f64 = 0.95;
    pub const USES_DW: f64 = 0.90;
    pub const TRIGGERS_EVENT: f64 = 0.70;
    pub const TABLE_RW: f64 = 0.90;
}

static CALL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap());

static OPEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bopen(?:withparm)?\s*\(\s*([A-Za-z_][A-Za-z0-9_]*)").unwrap()
});

static TRIGGER_EVENT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\btrigger\s+event\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap());

static SQL_COMMENT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());

static SQL_COMMENT_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)--.*?$").unwrap());

static SQL_KIND_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(SELECT|INSERT|UPDATE|DELETE|MERGE)\b").unwrap());

static SELECT_TABLE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:FROM|JOIN)\s+([A-Z_][A-Z0-9_$.#]*)").unwrap());

static INSERT_TABLE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bINSERT\s+INTO\s+([A-Z_][A-Z0-9_$.#]*)").unwrap());

static UPDATE_TABLE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bUPDATE\s+([A-Z_][A-Z0-9_$.#]*)").unwrap());

static DELETE_TABLE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bDELETE\s+FROM\s+([A-Z_][A-Z0-9_$.#]*)").unwrap());

static MERGE_INTO_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bMERGE\s+INTO\s+([A-Z_][A-Z0-9_$.#]*)").unwrap());

static MERGE_USING_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bUSING\s+([A-Z_][A-Z0-9_$.#]*)").unwrap());

// Built-ins and control keywords a call-site scan must not treat as
// user function calls.
static CALL_KEYWORDS: &[&str] = &[
    "if",
    "for",
    "while",
    "choose",
    "case",
    "return",
    "open",
    "openwithparm",
    "trigger",
    "event",
    "messagebox",
    "super",
    "parent",
];

struct DetectedSql {
    kind: SqlKind,
    text_norm: String,
}

/// Derives the relation and SQL impact IR from parsed objects.
pub fn analyze(parse_result: &ParseResult, table_mapping: Option<&TableMappingConfig>) -> AnalysisResult {
    let excluded_tables: HashSet<String> = table_mapping
        .map(|mapping| {
            mapping
                .exception_rules
                .iter()
                .map(|rule| rule.table_name.to_uppercase())
                .collect()
        })
        .unwrap_or_default();

    let object_records: Vec<ObjectRecord> = parse_result
        .objects
        .iter()
        .map(|item| ObjectRecord {
            object_type: item.object_type,
            name: item.name.clone(),
            module: item.module.clone(),
            source_path: item.source_path.clone(),
        })
        .collect();

    let events: Vec<EventRecord> = parse_result
        .objects
        .iter()
        .flat_map(|item| {
            item.events.iter().map(|event| EventRecord {
                object_name: item.name.clone(),
                event_name: event.event_name.clone(),
                script_ref: event.script_ref.clone(),
            })
        })
        .collect();

    let functions: Vec<FunctionRecord> = parse_result
        .objects
        .iter()
        .flat_map(|item| {
            item.functions.iter().map(|function| FunctionRecord {
                object_name: item.name.clone(),
                function_name: function.function_name.clone(),
                signature: function.signature.clone(),
            })
        })
        .collect();

    // First definition wins when a function name repeats across objects.
    let mut function_owner: HashMap<String, String> = HashMap::new();
    for function in &functions {
        function_owner
            .entry(function.function_name.to_lowercase())
            .or_insert_with(|| function.object_name.clone());
    }

    let data_windows: Vec<DataWindowRecord> = parse_result
        .objects
        .iter()
        .flat_map(|item| {
            item.data_windows.iter().map(|dw| DataWindowRecord {
                object_name: item.name.clone(),
                dw_name: dw.dw_name.clone(),
                base_table: dw.base_table.clone(),
                sql_select: dw.sql_select.clone(),
            })
        })
        .collect();

    let object_name_lookup: HashMap<String, String> = parse_result
        .objects
        .iter()
        .map(|item| (item.name.to_lowercase(), item.name.clone()))
        .collect();

    let data_window_lookup: BTreeMap<String, String> = parse_result
        .objects
        .iter()
        .filter(|item| item.object_type == ObjectType::DataWindow)
        .map(|item| (item.name.to_lowercase(), item.name.clone()))
        .collect();

    let dw_reference_patterns: Vec<(Regex, String)> = data_window_lookup
        .iter()
        .filter_map(|(dw_lower, dw_name)| {
            let pattern = format!(r"(?i)\b{}\b", regex::escape(dw_lower));
            Regex::new(&pattern).ok().map(|re| (re, dw_name.clone()))
        })
        .collect();

    let mut relations: Vec<RelationRecord> = Vec::new();
    let mut relation_keys: HashSet<(String, String, RelationType)> = HashSet::new();
    let mut sql_statements: Vec<SqlStatementRecord> = Vec::new();
    let mut table_objects: BTreeMap<String, ObjectRecord> = BTreeMap::new();

    let mut add_relation =
        |src_name: &str, dst_name: &str, relation_type: RelationType, confidence: f64| {
            let key = (src_name.to_lowercase(), dst_name.to_lowercase(), relation_type);
            if !relation_keys.insert(key) {
                return;
            }
            relations.push(RelationRecord {
                src_name: src_name.to_string(),
                dst_name: dst_name.to_string(),
                relation_type,
                confidence,
            });
        };

    for parsed_object in &parse_result.objects {
        let script_text = parsed_object.script_text.as_str();

        for captures in CALL_PATTERN.captures_iter(script_text) {
            let function_name = &captures[1];
            let function_name_lower = function_name.to_lowercase();
            if CALL_KEYWORDS.contains(&function_name_lower.as_str()) {
                continue;
            }
            if let Some(owner_name) = function_owner.get(&function_name_lower) {
                add_relation(
                    &parsed_object.name,
                    owner_name,
                    RelationType::Calls,
                    confidence::CALLS,
                );
            }
        }

        for captures in OPEN_PATTERN.captures_iter(script_text) {
            if let Some(target_name) = object_name_lookup.get(&captures[1].to_lowercase()) {
                add_relation(
                    &parsed_object.name,
                    target_name,
                    RelationType::Opens,
                    confidence::OPENS,
                );
            }
        }

        for (pattern, dw_name) in &dw_reference_patterns {
            if pattern.is_match(script_text) {
                add_relation(
                    &parsed_object.name,
                    dw_name,
                    RelationType::UsesDw,
                    confidence::USES_DW,
                );
            }
        }

        let object_event_names: HashSet<String> = parsed_object
            .events
            .iter()
            .map(|event| event.event_name.to_lowercase())
            .collect();
        for captures in TRIGGER_EVENT_PATTERN.captures_iter(script_text) {
            if object_event_names.contains(&captures[1].to_lowercase()) {
                add_relation(
                    &parsed_object.name,
                    &parsed_object.name,
                    RelationType::TriggersEvent,
                    confidence::TRIGGERS_EVENT,
                );
            }
        }

        for detected in extract_sql_statements(script_text) {
            let usages: Vec<TableUsage> =
                extract_table_usages(detected.kind, &detected.text_norm)
                    .into_iter()
                    .filter(|usage| !excluded_tables.contains(&usage.table_name.to_uppercase()))
                    .collect();

            for usage in &usages {
                let table_name = usage.table_name.to_uppercase();
                table_objects
                    .entry(table_name.clone())
                    .or_insert_with(|| ObjectRecord {
                        object_type: ObjectType::Table,
                        name: table_name.clone(),
                        module: "db".to_string(),
                        source_path: table_name.clone(),
                    });

                let rw_relation = match usage.rw_type {
                    RwType::Read => RelationType::ReadsTable,
                    RwType::Write => RelationType::WritesTable,
                };
                add_relation(
                    &parsed_object.name,
                    &table_name,
                    rw_relation,
                    confidence::TABLE_RW,
                );
            }

            sql_statements.push(SqlStatementRecord {
                owner_name: parsed_object.name.clone(),
                sql_text_norm: detected.text_norm,
                sql_kind: detected.kind,
                table_usages: usages,
            });
        }
    }

    // Tables sort behind application objects under stable names.
    let mut all_objects = object_records;
    all_objects.extend(table_objects.into_values());

    let warnings: Vec<String> = parse_result
        .issues
        .iter()
        .map(|issue| format!("parse issue: {} ({})", issue.object_name, issue.message))
        .collect();

    AnalysisResult {
        objects: all_objects,
        events,
        functions,
        relations,
        sql_statements,
        data_windows,
        warnings,
    }
}

/// Finds embedded SQL: comments stripped, split on `;`, each chunk
/// anchored at its first verb and normalized to uppercase.
fn extract_sql_statements(script_text: &str) -> Vec<DetectedSql> {
    let without_block_comments = SQL_COMMENT_BLOCK.replace_all(script_text, " ");
    let without_comments = SQL_COMMENT_LINE.replace_all(&without_block_comments, " ");

    let mut statements: Vec<DetectedSql> = Vec::new();
    let mut seen: HashSet<(SqlKind, String)> = HashSet::new();

    for chunk in without_comments.split(';') {
        let candidate = chunk.trim();
        if candidate.is_empty() {
            continue;
        }
        let Some(kind_match) = SQL_KIND_PATTERN.captures(candidate) else {
            continue;
        };
        let Some(verb) = kind_match.get(1) else {
            continue;
        };

        let sql_kind = normalize_sql_kind(verb.as_str());
        let sql_norm = util::collapse_whitespace(&candidate[verb.start()..]).to_uppercase();
        if sql_norm.is_empty() {
            continue;
        }
        if !seen.insert((sql_kind, sql_norm.clone())) {
            continue;
        }
        statements.push(DetectedSql {
            kind: sql_kind,
            text_norm: sql_norm,
        });
    }

    statements
}

fn normalize_sql_kind(raw_kind: &str) -> SqlKind {
    match raw_kind.to_uppercase().as_str() {
        "SELECT" => SqlKind::Select,
        "INSERT" => SqlKind::Insert,
        "UPDATE" => SqlKind::Update,
        "DELETE" => SqlKind::Delete,
        "MERGE" => SqlKind::Merge,
        _ => SqlKind::Other,
    }
}

fn extract_table_usages(sql_kind: SqlKind, sql_text_norm: &str) -> Vec<TableUsage> {
    let mut usages: Vec<TableUsage> = Vec::new();
    let mut add_usage = |table_name: &str, rw_type: RwType| {
        let normalized_name = table_name.trim().trim_matches([',', ')']);
        if normalized_name.is_empty() {
            return;
        }
        let usage = TableUsage {
            table_name: normalized_name.to_string(),
            rw_type,
        };
        if !usages.contains(&usage) {
            usages.push(usage);
        }
    };

    match sql_kind {
        SqlKind::Select => {
            for captures in SELECT_TABLE_PATTERN.captures_iter(sql_text_norm) {
                add_usage(&captures[1], RwType::Read);
            }
        }
        SqlKind::Insert => {
            if let Some(captures) = INSERT_TABLE_PATTERN.captures(sql_text_norm) {
                add_usage(&captures[1], RwType::Write);
            }
        }
        SqlKind::Update => {
            if let Some(captures) = UPDATE_TABLE_PATTERN.captures(sql_text_norm) {
                add_usage(&captures[1], RwType::Write);
            }
        }
        SqlKind::Delete => {
            if let Some(captures) = DELETE_TABLE_PATTERN.captures(sql_text_norm) {
                add_usage(&captures[1], RwType::Write);
            }
        }
        SqlKind::Merge => {
            if let Some(captures) = MERGE_INTO_PATTERN.captures(sql_text_norm) {
                add_usage(&captures[1], RwType::Write);
            }
            if let Some(captures) = MERGE_USING_PATTERN.captures(sql_text_norm) {
                add_usage(&captures[1], RwType::Read);
            }
        }
        SqlKind::Other => {}
    }

    usages
}
