use anyhow::{Context, Result, bail};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Expands one archive into `output_dir`. Unsupported container formats
/// are an error the caller records as a per-file failure, not a crash.
pub fn unpack_archive(archive_path: &Path, output_dir: &Path) -> Result<()> {
    let name = archive_path
        .file_name()
        .map(|value| value.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if name.ends_with(".zip") {
        unpack_zip(archive_path, output_dir)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        let file = File::open(archive_path)
            .with_context(|| format!("open archive {}", archive_path.display()))?;
        unpack_tar(GzDecoder::new(file), output_dir)
    } else if name.ends_with(".tar") {
        let file = File::open(archive_path)
            .with_context(|| format!("open archive {}", archive_path.display()))?;
        unpack_tar(file, output_dir)
    } else {
        bail!("unsupported archive format: {}", archive_path.display());
    }
}

fn unpack_zip(archive_path: &Path, output_dir: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .with_context(|| format!("open archive {}", archive_path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("read zip {}", archive_path.display()))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .with_context(|| format!("zip entry {index} in {}", archive_path.display()))?;
        let Some(out_path) = sanitize_entry_path(output_dir, entry.name()) else {
            continue;
        };
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out_file = File::create(&out_path)
            .with_context(|| format!("create {}", out_path.display()))?;
        io::copy(&mut entry, &mut out_file)?;
    }
    Ok(())
}

fn unpack_tar<R: io::Read>(reader: R, output_dir: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries().context("read tar entries")? {
        let mut entry = entry.context("read tar entry")?;
        let raw_path = entry.path().context("tar entry path")?.into_owned();
        let Some(out_path) = sanitize_entry_path(output_dir, &raw_path.to_string_lossy()) else {
            continue;
        };
        if entry.header().entry_type().is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if !entry.header().entry_type().is_file() {
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out_file = File::create(&out_path)
            .with_context(|| format!("create {}", out_path.display()))?;
        io::copy(&mut entry, &mut out_file)?;
    }
    Ok(())
}

/// Rebuilds entry paths component by component so `..` and absolute
/// names cannot escape the unpack directory.
fn sanitize_entry_path(output_dir: &Path, entry_name: &str) -> Option<PathBuf> {
    let mut out_path = output_dir.to_path_buf();
    let mut pushed = false;
    for comp in entry_name.split(['/', '\\']) {
        if comp.is_empty() || comp == "." || comp == ".." {
            continue;
        }
        out_path.push(comp);
        pushed = true;
    }
    if pushed { Some(out_path) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, body) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn zip_round_trip_preserves_entries() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("bundle.zip");
        write_zip(
            &archive_path,
            &[("w_main.srw", "event clicked\n"), ("sub/w_detail.srw", "event open\n")],
        );

        let out_dir = dir.path().join("out");
        std::fs::create_dir_all(&out_dir).unwrap();
        unpack_archive(&archive_path, &out_dir).unwrap();

        let main = std::fs::read_to_string(out_dir.join("w_main.srw")).unwrap();
        assert_eq!(main, "event clicked\n");
        let detail = std::fs::read_to_string(out_dir.join("sub/w_detail.srw")).unwrap();
        assert_eq!(detail, "event open\n");
    }

    #[test]
    fn traversal_entries_cannot_escape_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("evil.zip");
        write_zip(&archive_path, &[("../escape.txt", "nope")]);

        let out_dir = dir.path().join("out");
        std::fs::create_dir_all(&out_dir).unwrap();
        unpack_archive(&archive_path, &out_dir).unwrap();

        assert!(out_dir.join("escape.txt").exists());
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[test]
    fn unsupported_compression_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("bundle.tar.xz");
        std::fs::write(&archive_path, b"\xfd7zXZ\x00").unwrap();
        let out_dir = dir.path().join("out");
        std::fs::create_dir_all(&out_dir).unwrap();
        let err = unpack_archive(&archive_path, &out_dir).unwrap_err();
        assert!(err.to_string().contains("unsupported archive format"));
    }

    #[test]
    fn tar_gz_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("bundle.tar.gz");
        let file = File::create(&archive_path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let body = b"event clicked\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "w_main.srw", &body[..]).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let out_dir = dir.path().join("out");
        std::fs::create_dir_all(&out_dir).unwrap();
        unpack_archive(&archive_path, &out_dir).unwrap();
        let text = std::fs::read_to_string(out_dir.join("w_main.srw")).unwrap();
        assert_eq!(text, "event clicked\n");
    }
}
