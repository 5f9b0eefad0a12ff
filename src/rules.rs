use serde::{Deserialize, Serialize};
use std::path::Path;

/// One table mapping entry from `table_mapping.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableRule {
    #[serde(default)]
    pub table_name: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default = "default_action")]
    pub action: String,
}

fn default_action() -> String {
    "include".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SqlNormConfig {
    #[serde(default = "default_true")]
    pub normalize_whitespace: bool,
    #[serde(default = "default_case")]
    pub normalize_case: String,
    #[serde(default = "default_true")]
    pub strip_comments: bool,
}

fn default_true() -> bool {
    true
}

fn default_case() -> String {
    "upper".to_string()
}

impl Default for SqlNormConfig {
    fn default() -> Self {
        Self {
            normalize_whitespace: true,
            normalize_case: "upper".to_string(),
            strip_comments: true,
        }
    }
}

/// Analyzer-facing view of the mapping config. `exception_rules` name
/// tables that must never show up in impact output.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableMappingConfig {
    #[serde(default)]
    pub sql: SqlNormConfig,
    #[serde(default)]
    pub custom_rules: Vec<TableRule>,
    #[serde(default)]
    pub exception_rules: Vec<TableRule>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    analyzer: AnalyzerSection,
}

#[derive(Debug, Default, Deserialize)]
struct AnalyzerSection {
    #[serde(default)]
    sql: SqlNormConfig,
    #[serde(default)]
    table_mapping: TableMappingSection,
}

#[derive(Debug, Default, Deserialize)]
struct TableMappingSection {
    #[serde(default)]
    custom_rules: Vec<TableRule>,
    #[serde(default)]
    exception_rules: Vec<TableRule>,
}

/// Loads `table_mapping.yaml`. A missing or malformed file degrades to
/// defaults with a warning instead of failing the run.
pub fn load_table_mapping(config_path: &Path) -> TableMappingConfig {
    let payload = match std::fs::read_to_string(config_path) {
        Ok(payload) => payload,
        Err(err) => {
            eprintln!(
                "pbgraph: table mapping unavailable, using defaults ({}: {err})",
                config_path.display()
            );
            return TableMappingConfig::default();
        }
    };

    match serde_yaml_ng::from_str::<ConfigFile>(&payload) {
        Ok(config) => TableMappingConfig {
            sql: config.analyzer.sql,
            custom_rules: config.analyzer.table_mapping.custom_rules,
            exception_rules: config.analyzer.table_mapping.exception_rules,
        },
        Err(err) => {
            eprintln!(
                "pbgraph: failed to parse table mapping, using defaults ({}: {err})",
                config_path.display()
            );
            TableMappingConfig::default()
        }
    }
}
