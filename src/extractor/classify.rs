use crate::model::ObjectType;
use std::fs::File;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, Copy)]
struct SuffixSpec {
    suffix: &'static str,
    object_type: ObjectType,
}

static SUFFIX_OBJECT_TYPES: &[SuffixSpec] = &[
    SuffixSpec { suffix: ".srw", object_type: ObjectType::Window },
    SuffixSpec { suffix: ".sru", object_type: ObjectType::UserObject },
    SuffixSpec { suffix: ".srm", object_type: ObjectType::Menu },
    SuffixSpec { suffix: ".srd", object_type: ObjectType::DataWindow },
    SuffixSpec { suffix: ".srf", object_type: ObjectType::Function },
    SuffixSpec { suffix: ".srj", object_type: ObjectType::Project },
    SuffixSpec { suffix: ".pbt", object_type: ObjectType::Library },
    SuffixSpec { suffix: ".txt", object_type: ObjectType::Script },
    SuffixSpec { suffix: ".sql", object_type: ObjectType::Sql },
    SuffixSpec { suffix: ".psr", object_type: ObjectType::Script },
    SuffixSpec { suffix: ".psx", object_type: ObjectType::Script },
    SuffixSpec { suffix: ".inc", object_type: ObjectType::Script },
];

static EXTRA_TEXT_SUFFIXES: &[&str] = &[".ini", ".cfg", ".xml", ".json", ".log", ".lst"];

static BINARY_SUFFIXES: &[&str] = &[".pbl", ".pbr", ".pbd", ".exe", ".dll", ".bin"];

static ARCHIVE_SUFFIXES: &[&str] = &[
    ".zip", ".tar", ".tgz", ".tar.gz", ".tbz", ".tbz2", ".tar.bz2", ".txz", ".tar.xz",
];

fn suffix_lower(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

fn stem_lower(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

pub fn is_archive_path(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    ARCHIVE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

pub fn is_binary_path(path: &Path) -> bool {
    let suffix = suffix_lower(path);
    BINARY_SUFFIXES.iter().any(|candidate| *candidate == suffix)
}

pub fn is_recognized_text_suffix(path: &Path) -> bool {
    let suffix = suffix_lower(path);
    SUFFIX_OBJECT_TYPES
        .iter()
        .any(|spec| spec.suffix == suffix)
        || EXTRA_TEXT_SUFFIXES.iter().any(|candidate| *candidate == suffix)
}

/// Object type from the suffix table, then export naming conventions.
pub fn infer_object_type(path: &Path) -> ObjectType {
    let suffix = suffix_lower(path);
    for spec in SUFFIX_OBJECT_TYPES {
        if spec.suffix == suffix {
            return spec.object_type;
        }
    }

    let stem = stem_lower(path);
    if stem.starts_with("w_") {
        return ObjectType::Window;
    }
    if stem.starts_with("u_") {
        return ObjectType::UserObject;
    }
    if stem.starts_with("m_") {
        return ObjectType::Menu;
    }
    if stem.starts_with("dw_") {
        return ObjectType::DataWindow;
    }
    if stem.starts_with("f_") {
        return ObjectType::Function;
    }
    if BINARY_SUFFIXES.iter().any(|candidate| *candidate == suffix) {
        return ObjectType::LibraryBinary;
    }
    ObjectType::Unknown
}

const TEXT_SAMPLE_BYTES: usize = 4096;
const MAX_NON_PRINTABLE_RATIO: f64 = 0.35;

/// Printable-byte heuristic over the first 4KB: any NUL disqualifies,
/// as does a >35% share of bytes outside printable/whitespace ranges.
pub fn is_probably_text_file(path: &Path) -> bool {
    let mut sample = [0u8; TEXT_SAMPLE_BYTES];
    let read = match File::open(path).and_then(|mut file| file.read(&mut sample)) {
        Ok(count) => count,
        Err(_) => return false,
    };
    if read == 0 {
        return true;
    }
    is_probably_text(&sample[..read])
}

pub fn is_probably_text(sample: &[u8]) -> bool {
    if sample.is_empty() {
        return true;
    }
    if sample.contains(&0) {
        return false;
    }
    let non_printable = sample
        .iter()
        .filter(|byte| !matches!(**byte, b'\t' | b'\n' | b'\r' | 0x0c | 0x08 | 0x20..=0x7e))
        .count();
    (non_printable as f64 / sample.len() as f64) < MAX_NON_PRINTABLE_RATIO
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn suffix_table_wins_over_prefix() {
        assert_eq!(
            infer_object_type(&PathBuf::from("w_main.srd")),
            ObjectType::DataWindow
        );
    }

    #[test]
    fn prefix_heuristics_cover_unsuffixed_exports() {
        assert_eq!(infer_object_type(&PathBuf::from("w_login.exp")), ObjectType::Window);
        assert_eq!(infer_object_type(&PathBuf::from("u_grid.exp")), ObjectType::UserObject);
        assert_eq!(infer_object_type(&PathBuf::from("m_main.exp")), ObjectType::Menu);
        assert_eq!(infer_object_type(&PathBuf::from("dw_orders.exp")), ObjectType::DataWindow);
        assert_eq!(infer_object_type(&PathBuf::from("f_calc.exp")), ObjectType::Function);
        assert_eq!(infer_object_type(&PathBuf::from("readme.doc")), ObjectType::Unknown);
    }

    #[test]
    fn binary_suffix_maps_to_library_binary() {
        assert_eq!(infer_object_type(&PathBuf::from("app.pbl")), ObjectType::LibraryBinary);
        assert!(is_binary_path(&PathBuf::from("app.pbl")));
        assert!(!is_binary_path(&PathBuf::from("app.srw")));
    }

    #[test]
    fn nested_archive_suffixes_are_detected() {
        assert!(is_archive_path(&PathBuf::from("bundle.zip")));
        assert!(is_archive_path(&PathBuf::from("bundle.tar.gz")));
        assert!(is_archive_path(&PathBuf::from("BUNDLE.TGZ")));
        assert!(!is_archive_path(&PathBuf::from("bundle.srw")));
    }

    #[test]
    fn nul_byte_disqualifies_text() {
        assert!(!is_probably_text(b"hello\x00world"));
        assert!(is_probably_text(b"event clicked\nopen(w_detail)\n"));
        assert!(is_probably_text(b""));
    }

    #[test]
    fn mostly_high_bytes_disqualify_text() {
        let sample: Vec<u8> = (0..100).map(|i| if i < 60 { 0xfe } else { b'a' }).collect();
        assert!(!is_probably_text(&sample));
    }
}
