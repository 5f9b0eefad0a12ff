use crate::model::{FailedObject, Manifest, ManifestObject, ObjectType};
use crate::util;
use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use walkdir::WalkDir;

pub mod archive;
pub mod classify;
pub mod decode;
pub mod manifest;
pub mod strings;

pub use manifest::{load_manifest, write_manifest};

/// Closed set of extraction strategies, selected by name on the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorKind {
    /// Plain directory of exported text files, no archive/binary handling.
    Filesystem,
    /// Auto-detects archives, binaries and text candidates.
    Auto,
    /// Auto with the external tool preferred for binary inputs.
    ToolFirst,
}

impl ExtractorKind {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "filesystem" | "fs" | "local" => Ok(ExtractorKind::Filesystem),
            "auto" | "smart" => Ok(ExtractorKind::Auto),
            "tool" | "tool-first" => Ok(ExtractorKind::ToolFirst),
            other => bail!("unsupported extractor adapter: {other}"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractorKind::Filesystem => "filesystem",
            ExtractorKind::Auto => "auto",
            ExtractorKind::ToolFirst => "tool-first",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub source_version: Option<String>,
    /// External tool command template with `{input}`/`{output}` placeholders.
    pub tool_cmd: Option<String>,
    pub prefer_tool: bool,
    pub binary_fallback: bool,
    pub archive_depth_limit: usize,
    /// Kills the external tool after this many seconds; `None` waits forever.
    pub tool_timeout_secs: Option<u64>,
}

impl ExtractionRequest {
    pub fn new(input_path: PathBuf, output_path: PathBuf) -> Self {
        Self {
            input_path,
            output_path,
            source_version: None,
            tool_cmd: None,
            prefer_tool: false,
            binary_fallback: true,
            archive_depth_limit: 3,
            tool_timeout_secs: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExtractionResult {
    pub manifest_path: PathBuf,
    pub extracted_count: usize,
    pub failed_count: usize,
}

/// One recovered artifact awaiting manifest assembly.
#[derive(Debug, Clone)]
struct Candidate {
    source_display: String,
    text: String,
    object_type: ObjectType,
    object_name: String,
    module: String,
}

#[derive(Debug, Clone)]
struct BinarySource {
    source_display: String,
    file_path: PathBuf,
    module: String,
    object_name: String,
    object_type: ObjectType,
}

pub fn extract(kind: ExtractorKind, request: &ExtractionRequest) -> Result<ExtractionResult> {
    match kind {
        ExtractorKind::Filesystem => extract_filesystem(request),
        ExtractorKind::Auto => extract_auto(request, false),
        ExtractorKind::ToolFirst => extract_auto(request, true),
    }
}

/// Directory-only extraction: every recognized or probably-text file
/// becomes one artifact, archives and binaries are left untouched.
fn extract_filesystem(request: &ExtractionRequest) -> Result<ExtractionResult> {
    let input_path = &request.input_path;
    if !input_path.is_dir() {
        bail!(
            "input path must be an existing directory: {}",
            input_path.display()
        );
    }

    let objects_dir = request.output_path.join("objects");
    util::ensure_dir(&objects_dir)?;

    let mut candidates: BTreeMap<String, Candidate> = BTreeMap::new();
    let mut failures: Vec<FailedObject> = Vec::new();

    let walker = WalkDir::new(input_path)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file());
    for entry in walker {
        let path = entry.path();
        if !classify::is_recognized_text_suffix(path) && !classify::is_probably_text_file(path) {
            continue;
        }
        let rel_key = util::relative_key(path, input_path);
        let source_display = display_path(path);
        match decode::read_source_text(path) {
            Ok(text) => {
                candidates.insert(
                    rel_key.clone(),
                    Candidate {
                        source_display,
                        text,
                        object_type: classify::infer_object_type(path),
                        object_name: object_name_of(path),
                        module: util::module_from_rel_key(&rel_key),
                    },
                );
            }
            Err(err) => failures.push(FailedObject {
                source_path: source_display,
                reason: err.to_string(),
            }),
        }
    }

    finish_extraction(
        ExtractorKind::Filesystem,
        request,
        &objects_dir,
        candidates,
        failures,
    )
}

fn extract_auto(request: &ExtractionRequest, prefer_tool: bool) -> Result<ExtractionResult> {
    let input_path = &request.input_path;
    if !input_path.exists() {
        bail!("input path does not exist: {}", input_path.display());
    }

    util::ensure_dir(&request.output_path)?;
    let objects_dir = request.output_path.join("objects");
    util::ensure_dir(&objects_dir)?;

    let mut candidates: BTreeMap<String, Candidate> = BTreeMap::new();
    let mut binary_sources: BTreeMap<String, BinarySource> = BTreeMap::new();
    let mut failures: Vec<FailedObject> = Vec::new();

    let source_root = if input_path.is_dir() {
        input_path.clone()
    } else {
        input_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| input_path.clone())
    };

    {
        // Archive unpack trees live under the output dir and are removed
        // on every exit path when this guard drops.
        let temp_dir = tempfile::Builder::new()
            .prefix("pbgraph-")
            .tempdir_in(&request.output_path)
            .context("create extraction temp dir")?;

        collect_candidates(
            input_path,
            &source_root,
            "",
            "",
            0,
            request,
            temp_dir.path(),
            &mut candidates,
            &mut binary_sources,
            &mut failures,
        );

        if !binary_sources.is_empty() {
            process_binary_sources(
                request,
                prefer_tool,
                temp_dir.path(),
                &mut candidates,
                &binary_sources,
                &mut failures,
            );
        }
    }

    finish_extraction(
        if prefer_tool {
            ExtractorKind::ToolFirst
        } else {
            ExtractorKind::Auto
        },
        request,
        &objects_dir,
        candidates,
        failures,
    )
}

fn finish_extraction(
    kind: ExtractorKind,
    request: &ExtractionRequest,
    objects_dir: &Path,
    candidates: BTreeMap<String, Candidate>,
    failures: Vec<FailedObject>,
) -> Result<ExtractionResult> {
    if candidates.is_empty() {
        bail!(
            "no analyzable source was found under {}: supported inputs are exported text files, \
             archives, and library binaries (with a tool command or binary fallback)",
            request.input_path.display()
        );
    }

    let mut objects: Vec<ManifestObject> = Vec::new();
    for (source_key, candidate) in &candidates {
        let target_name =
            stable_extracted_file_name(source_key, candidate.object_type, &candidate.object_name);
        let extracted_path = objects_dir.join(&target_name);
        std::fs::write(&extracted_path, &candidate.text)
            .with_context(|| format!("write artifact {}", extracted_path.display()))?;

        objects.push(ManifestObject {
            object_type: candidate.object_type,
            name: candidate.object_name.clone(),
            module: candidate.module.clone(),
            source_path: candidate.source_display.clone(),
            extracted_path: display_path(&extracted_path),
        });
    }

    let manifest = Manifest {
        source_root: display_path(&request.input_path),
        generated_at: chrono::Utc::now().to_rfc3339(),
        extractor: kind.as_str().to_string(),
        objects,
        failed_objects: failures,
    };

    let manifest_path = request.output_path.join("manifest.json");
    write_manifest(&manifest_path, &manifest)?;

    Ok(ExtractionResult {
        manifest_path,
        extracted_count: manifest.objects.len(),
        failed_count: manifest.failed_objects.len(),
    })
}

#[allow(clippy::too_many_arguments)]
fn collect_candidates(
    path: &Path,
    source_root: &Path,
    key_prefix: &str,
    display_prefix: &str,
    depth: usize,
    request: &ExtractionRequest,
    temp_dir: &Path,
    candidates: &mut BTreeMap<String, Candidate>,
    binary_sources: &mut BTreeMap<String, BinarySource>,
    failures: &mut Vec<FailedObject>,
) {
    if path.is_dir() {
        for child in sorted_children(path) {
            collect_candidates(
                &child,
                source_root,
                key_prefix,
                display_prefix,
                depth,
                request,
                temp_dir,
                candidates,
                binary_sources,
                failures,
            );
        }
        return;
    }
    if !path.is_file() {
        return;
    }

    let rel_key = util::relative_key(path, source_root);
    let source_key = format!("{key_prefix}{rel_key}");
    let source_display = if display_prefix.is_empty() {
        display_path(path)
    } else {
        format!("{display_prefix}{rel_key}")
    };

    if classify::is_archive_path(path) {
        if depth >= request.archive_depth_limit {
            failures.push(FailedObject {
                source_path: source_display,
                reason: format!(
                    "archive depth limit exceeded ({})",
                    request.archive_depth_limit
                ),
            });
            return;
        }

        let unpack_dir = temp_dir.join(format!("archive_{}", short_digest(&source_key, 10)));
        if let Err(err) = util::ensure_dir(&unpack_dir) {
            failures.push(FailedObject {
                source_path: source_display,
                reason: err.to_string(),
            });
            return;
        }
        if let Err(err) = archive::unpack_archive(path, &unpack_dir) {
            failures.push(FailedObject {
                source_path: source_display,
                reason: err.to_string(),
            });
            return;
        }

        // Nested provenance: identically-named files at different
        // nesting levels must never collide.
        let nested_key_prefix = format!("{source_key}!");
        let nested_display_prefix = format!("{source_display}!");
        collect_candidates(
            &unpack_dir,
            &unpack_dir,
            &nested_key_prefix,
            &nested_display_prefix,
            depth + 1,
            request,
            temp_dir,
            candidates,
            binary_sources,
            failures,
        );
        return;
    }

    if classify::is_binary_path(path) {
        binary_sources.insert(
            source_key,
            BinarySource {
                source_display,
                file_path: path.to_path_buf(),
                module: util::module_from_rel_key(&rel_key),
                object_name: object_name_of(path),
                object_type: classify::infer_object_type(path),
            },
        );
        return;
    }

    if !classify::is_recognized_text_suffix(path) && !classify::is_probably_text_file(path) {
        return;
    }

    match decode::read_source_text(path) {
        Ok(text) => {
            candidates.insert(
                source_key,
                Candidate {
                    source_display,
                    text,
                    object_type: classify::infer_object_type(path),
                    object_name: object_name_of(path),
                    module: util::module_from_rel_key(&rel_key),
                },
            );
        }
        Err(err) => failures.push(FailedObject {
            source_path: source_display,
            reason: err.to_string(),
        }),
    }
}

fn process_binary_sources(
    request: &ExtractionRequest,
    prefer_tool: bool,
    temp_dir: &Path,
    candidates: &mut BTreeMap<String, Candidate>,
    binary_sources: &BTreeMap<String, BinarySource>,
    failures: &mut Vec<FailedObject>,
) {
    let mut tool_generated_output = false;

    if (prefer_tool || request.prefer_tool) && request.tool_cmd.is_some() {
        let tool_cmd = request.tool_cmd.as_deref().unwrap_or_default();
        let tool_output_dir = temp_dir.join("tool_output");
        let before_count = candidates.len();
        let tool_result = util::ensure_dir(&tool_output_dir).and_then(|_| {
            run_tool_command(
                tool_cmd,
                &request.input_path,
                &tool_output_dir,
                request.tool_timeout_secs,
            )
        });
        match tool_result {
            Ok(()) => {
                let display_prefix = format!("{}!tool!", display_path(&request.input_path));
                let mut no_binaries = BTreeMap::new();
                collect_candidates(
                    &tool_output_dir,
                    &tool_output_dir,
                    "tool!",
                    &display_prefix,
                    0,
                    request,
                    temp_dir,
                    candidates,
                    &mut no_binaries,
                    failures,
                );
                tool_generated_output = candidates.len() > before_count;
            }
            Err(err) => {
                failures.push(FailedObject {
                    source_path: display_path(&request.input_path),
                    reason: format!("tool extraction failed: {err}"),
                });
            }
        }
    }

    if tool_generated_output {
        return;
    }

    if !request.binary_fallback {
        for (source_key, item) in binary_sources {
            if candidates.contains_key(source_key) {
                continue;
            }
            failures.push(FailedObject {
                source_path: item.source_display.clone(),
                reason: "binary fallback disabled and tool output unavailable".to_string(),
            });
        }
        return;
    }

    for (source_key, item) in binary_sources {
        if candidates.contains_key(source_key) {
            continue;
        }
        match strings::extract_strings_from_binary(&item.file_path) {
            Ok(text) => {
                candidates.insert(
                    source_key.clone(),
                    Candidate {
                        source_display: item.source_display.clone(),
                        text,
                        object_type: item.object_type,
                        object_name: item.object_name.clone(),
                        module: item.module.clone(),
                    },
                );
            }
            Err(err) => failures.push(FailedObject {
                source_path: item.source_display.clone(),
                reason: format!("binary fallback failed: {err}"),
            }),
        }
    }
}

/// Substitutes `{input}`/`{output}` and runs the command through the
/// shell, polling for the optional timeout. Non-zero exit and timeout
/// are both recoverable tool failures.
fn run_tool_command(
    template: &str,
    input_path: &Path,
    output_path: &Path,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let command_line = template
        .replace("{input}", &display_path(input_path))
        .replace("{output}", &display_path(output_path));

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(&command_line)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("spawn tool command: {command_line}"))?;

    // Drain stderr off-thread so a chatty tool cannot block on a full pipe.
    let stderr_pipe = child.stderr.take();
    let stderr_reader = std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = stderr_pipe {
            use std::io::Read;
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    });

    let status = match timeout_secs {
        None => child.wait().context("wait for tool command")?,
        Some(secs) => {
            let deadline = Instant::now() + Duration::from_secs(secs);
            loop {
                if let Some(status) = child.try_wait().context("poll tool command")? {
                    break status;
                }
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = stderr_reader.join();
                    bail!("tool command timed out after {secs}s");
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    };

    let stderr = stderr_reader.join().unwrap_or_default();
    if !status.success() {
        let detail = stderr.trim();
        if detail.is_empty() {
            bail!("tool command exited with {status}");
        }
        bail!("{detail}");
    }
    Ok(())
}

fn sorted_children(path: &Path) -> Vec<PathBuf> {
    let mut children: Vec<PathBuf> = match std::fs::read_dir(path) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .collect(),
        Err(err) => {
            eprintln!("pbgraph: read dir error {}: {err}", path.display());
            Vec::new()
        }
    };
    children.sort();
    children
}

fn object_name_of(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn display_path(path: &Path) -> String {
    match path.canonicalize() {
        Ok(abs) => abs.display().to_string(),
        Err(_) => path.display().to_string(),
    }
}

fn short_digest(value: &str, len: usize) -> String {
    let digest = blake3::hash(value.as_bytes()).to_hex().to_string();
    digest[..len.min(digest.len())].to_string()
}

fn sanitize_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_was_sep = false;
    for ch in value.to_lowercase().chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' {
            out.push(ch);
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    out
}

/// Deterministic, collision-free artifact file name: a provenance-key
/// digest keeps identically-named objects from different archive
/// nesting levels apart.
fn stable_extracted_file_name(
    source_key: &str,
    object_type: ObjectType,
    object_name: &str,
) -> String {
    let digest = short_digest(source_key, 12);
    let safe_type = sanitize_component(object_type.as_str());
    let safe_name = sanitize_component(object_name);
    format!("{safe_type}__{safe_name}__{digest}.txt")
}
