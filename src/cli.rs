use crate::extractor::{ExtractionRequest, ExtractorKind};
use crate::model::DiffResult;
use crate::pipeline;
use crate::report::ReportFormat;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

const AFTER_HELP: &str = "\
Examples:
  pbgraph extract --input ./legacy_src --out ./work/extract
  pbgraph analyze --manifest ./work/extract/manifest.json --db ./work/ir.db
  pbgraph report --db ./work/ir.db --out ./work/reports --format csv
  pbgraph diff --db ./work/ir.db --run-old run_A --run-new run_B
  pbgraph run-all --input ./legacy.zip --out ./work --db ./work/ir.db --format json";

/// Dependency and impact analyzer for legacy PowerBuilder sources.
#[derive(Debug, Parser)]
#[command(name = "pbgraph", version, about, after_help = AFTER_HELP)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Extract analyzable sources into a manifest-described tree
    Extract {
        /// Source directory, archive, or library binary
        #[arg(long)]
        input: PathBuf,
        /// Output directory for extracted objects and manifest.json
        #[arg(long)]
        out: PathBuf,
        /// Extraction strategy: auto, filesystem, or tool-first
        #[arg(long, default_value = "auto")]
        extractor: String,
        /// External tool command template with {input} and {output} placeholders
        #[arg(long)]
        tool_cmd: Option<String>,
        /// Kill the external tool after this many seconds
        #[arg(long)]
        tool_timeout_secs: Option<u64>,
        /// Disable the printable-strings fallback for library binaries
        #[arg(long)]
        no_binary_fallback: bool,
        /// Maximum nesting depth for archives inside archives
        #[arg(long, default_value_t = 3)]
        archive_depth: usize,
    },
    /// Parse a manifest, infer relations, and persist one run
    Analyze {
        /// Path to manifest.json from a prior extract
        #[arg(long)]
        manifest: PathBuf,
        /// SQLite database file for the IR
        #[arg(long)]
        db: PathBuf,
        /// Explicit run id (generated when omitted)
        #[arg(long)]
        run_id: Option<String>,
        /// Source version label stored with the run
        #[arg(long)]
        source_version: Option<String>,
        /// Config directory holding analyzer/table_mapping.yaml
        #[arg(long)]
        config_dir: Option<PathBuf>,
    },
    /// Generate the standard reports from a persisted IR
    Report {
        #[arg(long)]
        db: PathBuf,
        /// Output directory for report files
        #[arg(long)]
        out: PathBuf,
        /// Report format: csv or json
        #[arg(long)]
        format: String,
    },
    /// Compare two persisted runs
    Diff {
        #[arg(long)]
        db: PathBuf,
        /// Baseline run id
        #[arg(long)]
        run_old: String,
        /// Newer run id
        #[arg(long)]
        run_new: String,
    },
    /// Extract, analyze, and report in one pass
    RunAll {
        #[arg(long)]
        input: PathBuf,
        /// Work directory; extract/ and reports/ are created inside
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        db: PathBuf,
        #[arg(long, default_value = "auto")]
        extractor: String,
        #[arg(long, default_value = "csv")]
        format: String,
        #[arg(long)]
        tool_cmd: Option<String>,
        #[arg(long)]
        tool_timeout_secs: Option<u64>,
        #[arg(long)]
        source_version: Option<String>,
        #[arg(long)]
        config_dir: Option<PathBuf>,
    },
}

/// Runs the parsed command and returns the process exit code. Partial
/// failures exit 2 so scripted callers can tell them from hard errors.
pub fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Extract {
            input,
            out,
            extractor,
            tool_cmd,
            tool_timeout_secs,
            no_binary_fallback,
            archive_depth,
        } => {
            let kind = ExtractorKind::from_name(&extractor)?;
            let mut request = ExtractionRequest::new(input, out);
            request.prefer_tool = kind == ExtractorKind::ToolFirst;
            request.tool_cmd = tool_cmd;
            request.tool_timeout_secs = tool_timeout_secs;
            request.binary_fallback = !no_binary_fallback;
            request.archive_depth_limit = archive_depth;

            let result = pipeline::run_extract(kind, &request)?;
            println!("[OK] manifest={}", result.manifest_path.display());
            if result.failed_count > 0 {
                println!("[WARN] extraction failures={}", result.failed_count);
                return Ok(2);
            }
            Ok(0)
        }
        Command::Analyze {
            manifest,
            db,
            run_id,
            source_version,
            config_dir,
        } => {
            let outcome = pipeline::run_analyze(
                &manifest,
                &db,
                run_id,
                source_version,
                config_dir.as_deref(),
            )?;

            println!("[OK] run_id={}", outcome.run_context.run_id);
            println!(
                "[OK] persisted objects={}, events={}, functions={}, relations={}, sql={}, data_windows={}",
                outcome.persist_result.objects_count,
                outcome.persist_result.events_count,
                outcome.persist_result.functions_count,
                outcome.persist_result.relations_count,
                outcome.persist_result.sql_statements_count,
                outcome.persist_result.data_windows_count,
            );

            if outcome.has_partial_failure() {
                println!(
                    "[WARN] partial failures detected: parse_issues={}, extract_failures={}",
                    outcome.parse_issues.len(),
                    outcome.extraction_failures.len(),
                );
                return Ok(2);
            }
            Ok(0)
        }
        Command::Report { db, out, format } => {
            let report_format = ReportFormat::from_name(&format)?;
            let generated = pipeline::run_report(&db, &out, report_format)?;
            println!("[OK] generated_reports={}", generated.len());
            for path in &generated {
                println!("[OK] report={}", path.display());
            }
            Ok(0)
        }
        Command::Diff {
            db,
            run_old,
            run_new,
        } => {
            let result = crate::differ::diff_runs(&db, &run_old, &run_new)?;
            print_diff(&result);
            Ok(0)
        }
        Command::RunAll {
            input,
            out,
            db,
            extractor,
            format,
            tool_cmd,
            tool_timeout_secs,
            source_version,
            config_dir,
        } => {
            let kind = ExtractorKind::from_name(&extractor)?;
            let report_format = ReportFormat::from_name(&format)?;
            let mut request = ExtractionRequest::new(input, out);
            request.prefer_tool = kind == ExtractorKind::ToolFirst;
            request.tool_cmd = tool_cmd;
            request.tool_timeout_secs = tool_timeout_secs;
            request.source_version = source_version;

            let outcome =
                pipeline::run_all(kind, &request, &db, report_format, config_dir.as_deref())?;

            println!("[OK] run_id={}", outcome.run_id);
            println!("[OK] manifest={}", outcome.manifest_path);
            println!("[OK] reports={}", outcome.report_files.len());

            if outcome.partial_failure {
                println!("[WARN] partial failures: {}", outcome.warnings.len());
                for item in outcome.warnings.iter().take(20) {
                    println!("[WARN] {item}");
                }
                return Ok(2);
            }
            Ok(0)
        }
    }
}

fn print_diff(result: &DiffResult) {
    if result.items.is_empty() {
        println!("[OK] runs are identical");
        return;
    }

    let added = result
        .items
        .iter()
        .filter(|item| item.change_type == "added")
        .count();
    let removed = result.items.len() - added;
    println!("[DIFF] added={added}, removed={removed}");

    for item in &result.items {
        let marker = if item.change_type == "added" { "+" } else { "-" };
        println!("  [{marker}] {}: {}", item.category, item.name);
    }
}
