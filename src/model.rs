use serde::{Deserialize, Serialize};
use std::fmt;

/// Object categories recovered from legacy PowerBuilder sources.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Window,
    UserObject,
    Menu,
    DataWindow,
    Function,
    Project,
    Library,
    Script,
    Sql,
    LibraryBinary,
    Table,
    Unknown,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Window => "Window",
            ObjectType::UserObject => "UserObject",
            ObjectType::Menu => "Menu",
            ObjectType::DataWindow => "DataWindow",
            ObjectType::Function => "Function",
            ObjectType::Project => "Project",
            ObjectType::Library => "Library",
            ObjectType::Script => "Script",
            ObjectType::Sql => "Sql",
            ObjectType::LibraryBinary => "LibraryBinary",
            ObjectType::Table => "Table",
            ObjectType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    Calls,
    Opens,
    UsesDw,
    ReadsTable,
    WritesTable,
    TriggersEvent,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::Calls => "calls",
            RelationType::Opens => "opens",
            RelationType::UsesDw => "uses_dw",
            RelationType::ReadsTable => "reads_table",
            RelationType::WritesTable => "writes_table",
            RelationType::TriggersEvent => "triggers_event",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "calls" => Some(RelationType::Calls),
            "opens" => Some(RelationType::Opens),
            "uses_dw" => Some(RelationType::UsesDw),
            "reads_table" => Some(RelationType::ReadsTable),
            "writes_table" => Some(RelationType::WritesTable),
            "triggers_event" => Some(RelationType::TriggersEvent),
            _ => None,
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum SqlKind {
    Select,
    Insert,
    Update,
    Delete,
    Merge,
    Other,
}

impl SqlKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlKind::Select => "SELECT",
            SqlKind::Insert => "INSERT",
            SqlKind::Update => "UPDATE",
            SqlKind::Delete => "DELETE",
            SqlKind::Merge => "MERGE",
            SqlKind::Other => "OTHER",
        }
    }
}

impl fmt::Display for SqlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum RwType {
    Read,
    Write,
}

impl RwType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RwType::Read => "READ",
            RwType::Write => "WRITE",
        }
    }
}

// Manifest records: the sole contract between extraction and parsing.

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ManifestObject {
    pub object_type: ObjectType,
    pub name: String,
    pub module: String,
    pub source_path: String,
    pub extracted_path: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FailedObject {
    pub source_path: String,
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Manifest {
    pub source_root: String,
    pub generated_at: String,
    pub extractor: String,
    pub objects: Vec<ManifestObject>,
    #[serde(default)]
    pub failed_objects: Vec<FailedObject>,
}

// Parse results.

#[derive(Debug, Serialize, Clone)]
pub struct ParsedEvent {
    pub event_name: String,
    pub script_ref: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct ParsedFunction {
    pub function_name: String,
    pub signature: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct ParsedDataWindow {
    pub dw_name: String,
    pub base_table: Option<String>,
    pub sql_select: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct ParseIssue {
    pub object_name: String,
    pub source_path: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_no: Option<usize>,
}

#[derive(Debug, Serialize, Clone)]
pub struct ParsedObject {
    pub object_type: ObjectType,
    pub name: String,
    pub module: String,
    pub source_path: String,
    pub extracted_path: String,
    pub script_text: String,
    pub events: Vec<ParsedEvent>,
    pub functions: Vec<ParsedFunction>,
    pub data_windows: Vec<ParsedDataWindow>,
}

#[derive(Debug, Serialize, Clone, Default)]
pub struct ParseResult {
    pub objects: Vec<ParsedObject>,
    pub issues: Vec<ParseIssue>,
}

// IR records produced by the analyzer.

#[derive(Debug, Serialize, Clone)]
pub struct ObjectRecord {
    pub object_type: ObjectType,
    pub name: String,
    pub module: String,
    pub source_path: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct EventRecord {
    pub object_name: String,
    pub event_name: String,
    pub script_ref: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct FunctionRecord {
    pub object_name: String,
    pub function_name: String,
    pub signature: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct RelationRecord {
    pub src_name: String,
    pub dst_name: String,
    pub relation_type: RelationType,
    pub confidence: f64,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq, Hash)]
pub struct TableUsage {
    pub table_name: String,
    pub rw_type: RwType,
}

#[derive(Debug, Serialize, Clone)]
pub struct DataWindowRecord {
    pub object_name: String,
    pub dw_name: String,
    pub base_table: Option<String>,
    pub sql_select: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct SqlStatementRecord {
    pub owner_name: String,
    pub sql_text_norm: String,
    pub sql_kind: SqlKind,
    pub table_usages: Vec<TableUsage>,
}

#[derive(Debug, Serialize, Clone, Default)]
pub struct AnalysisResult {
    pub objects: Vec<ObjectRecord>,
    pub events: Vec<EventRecord>,
    pub functions: Vec<FunctionRecord>,
    pub relations: Vec<RelationRecord>,
    pub sql_statements: Vec<SqlStatementRecord>,
    pub data_windows: Vec<DataWindowRecord>,
    pub warnings: Vec<String>,
}

// Run bookkeeping shared by the pipeline and the storage sink.

#[derive(Debug, Serialize, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub status: String,
    pub source_version: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct PersistResult {
    pub objects_count: usize,
    pub events_count: usize,
    pub functions_count: usize,
    pub relations_count: usize,
    pub sql_statements_count: usize,
    pub sql_tables_count: usize,
    pub data_windows_count: usize,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeOutcome {
    pub run_context: RunContext,
    pub persist_result: PersistResult,
    pub parse_issues: Vec<ParseIssue>,
    pub extraction_failures: Vec<FailedObject>,
}

impl AnalyzeOutcome {
    pub fn has_partial_failure(&self) -> bool {
        !self.parse_issues.is_empty() || !self.extraction_failures.is_empty()
    }
}

#[derive(Debug, Serialize)]
pub struct PipelineOutcome {
    pub run_id: String,
    pub manifest_path: String,
    pub report_files: Vec<String>,
    pub warnings: Vec<String>,
    pub partial_failure: bool,
}

// Run-to-run diff records.

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct DiffItem {
    pub category: String,
    pub name: String,
    pub change_type: String,
}

#[derive(Debug, Serialize)]
pub struct DiffResult {
    pub run_id_old: String,
    pub run_id_new: String,
    pub items: Vec<DiffItem>,
}
