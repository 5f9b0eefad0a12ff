use crate::analyzer::analyze;
use crate::db::Db;
use crate::extractor::{self, ExtractionRequest, ExtractionResult, ExtractorKind, load_manifest};
use crate::model::{AnalyzeOutcome, PipelineOutcome, RunContext};
use crate::parser::parse_manifest;
use crate::report::{ReportFormat, generate_reports};
use crate::rules::{TableMappingConfig, load_table_mapping};
use crate::util;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Extraction stage: unpack/extract sources and write the manifest.
pub fn run_extract(kind: ExtractorKind, request: &ExtractionRequest) -> Result<ExtractionResult> {
    eprintln!("pbgraph: extract started: {}", request.input_path.display());
    let result = extractor::extract(kind, request)?;
    eprintln!(
        "pbgraph: extract completed: {} objects, {} failures, manifest {}",
        result.extracted_count,
        result.failed_count,
        result.manifest_path.display()
    );
    Ok(result)
}

/// Parse/analyze/persist stages over an existing manifest.
pub fn run_analyze(
    manifest_path: &Path,
    db_path: &Path,
    run_id: Option<String>,
    source_version: Option<String>,
    config_dir: Option<&Path>,
) -> Result<AnalyzeOutcome> {
    let started_at = chrono::Utc::now().to_rfc3339();

    eprintln!("pbgraph: analyze started: {}", manifest_path.display());
    let manifest = load_manifest(manifest_path)?;
    let parse_result = parse_manifest(manifest_path)?;

    let table_mapping: Option<TableMappingConfig> = config_dir.and_then(|dir| {
        let mapping_path = dir.join("analyzer").join("table_mapping.yaml");
        mapping_path
            .exists()
            .then(|| load_table_mapping(&mapping_path))
    });

    let analysis_result = analyze(&parse_result, table_mapping.as_ref());

    let has_issues = !parse_result.issues.is_empty() || !manifest.failed_objects.is_empty();
    let finished_at = chrono::Utc::now().to_rfc3339();
    let context = RunContext {
        run_id: run_id.unwrap_or_else(new_run_id),
        started_at,
        finished_at,
        status: if has_issues {
            "partial_failed".to_string()
        } else {
            "success".to_string()
        },
        source_version,
    };

    let mut db = Db::open(db_path)?;
    let persist_result = db.persist(&context, &analysis_result)?;
    eprintln!(
        "pbgraph: analyze completed: run {} ({} objects, {} relations)",
        context.run_id, persist_result.objects_count, persist_result.relations_count
    );

    Ok(AnalyzeOutcome {
        run_context: context,
        persist_result,
        parse_issues: parse_result.issues,
        extraction_failures: manifest.failed_objects,
    })
}

/// Reporting stage.
pub fn run_report(db_path: &Path, output_dir: &Path, format: ReportFormat) -> Result<Vec<PathBuf>> {
    eprintln!("pbgraph: report started: {}", output_dir.display());
    let files = generate_reports(db_path, output_dir, format)?;
    eprintln!("pbgraph: report completed: {} files", files.len());
    Ok(files)
}

/// Full pipeline: extract, analyze, report.
pub fn run_all(
    kind: ExtractorKind,
    request: &ExtractionRequest,
    db_path: &Path,
    report_format: ReportFormat,
    config_dir: Option<&Path>,
) -> Result<PipelineOutcome> {
    util::ensure_dir(&request.output_path)?;

    let extract_dir = request.output_path.join("extract");
    let report_dir = request.output_path.join("reports");

    let mut extract_request = request.clone();
    extract_request.output_path = extract_dir;
    let extract_result = run_extract(kind, &extract_request)?;

    let analyze_outcome = run_analyze(
        &extract_result.manifest_path,
        db_path,
        None,
        request.source_version.clone(),
        config_dir,
    )?;

    let report_files = run_report(db_path, &report_dir, report_format)?;

    let mut warnings: Vec<String> = Vec::new();
    warnings.extend(
        analyze_outcome
            .parse_issues
            .iter()
            .map(|issue| format!("parse issue: {} ({})", issue.object_name, issue.message)),
    );
    warnings.extend(
        analyze_outcome
            .extraction_failures
            .iter()
            .map(|item| format!("extract fail: {} ({})", item.source_path, item.reason)),
    );

    let partial_failure = analyze_outcome.has_partial_failure() || extract_result.failed_count > 0;
    let outcome = PipelineOutcome {
        run_id: analyze_outcome.run_context.run_id,
        manifest_path: extract_result.manifest_path.display().to_string(),
        report_files: report_files
            .iter()
            .map(|path| path.display().to_string())
            .collect(),
        warnings,
        partial_failure,
    };
    eprintln!("pbgraph: pipeline completed: run {}", outcome.run_id);
    Ok(outcome)
}

fn new_run_id() -> String {
    let timestamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("run_{timestamp}_{}", &suffix[..8])
}
