use crate::model::Manifest;
use anyhow::{Context, Result, bail};
use std::path::Path;

pub fn load_manifest(path: &Path) -> Result<Manifest> {
    if !path.exists() {
        bail!("manifest file not found: {}", path.display());
    }
    let payload = crate::util::read_to_string(path)?;
    let manifest: Manifest = serde_json::from_str(&payload)
        .with_context(|| format!("parse manifest {}", path.display()))?;
    Ok(manifest)
}

pub fn write_manifest(path: &Path, manifest: &Manifest) -> Result<()> {
    if let Some(parent) = path.parent() {
        crate::util::ensure_dir(parent)?;
    }
    let payload = serde_json::to_string_pretty(manifest)?;
    std::fs::write(path, payload).with_context(|| format!("write manifest {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FailedObject, ManifestObject, ObjectType};

    #[test]
    fn manifest_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let manifest = Manifest {
            source_root: "/src".to_string(),
            generated_at: "2026-01-01T00:00:00+00:00".to_string(),
            extractor: "auto".to_string(),
            objects: vec![ManifestObject {
                object_type: ObjectType::Window,
                name: "w_main".to_string(),
                module: "orders".to_string(),
                source_path: "bundle.zip!w_main.srw".to_string(),
                extracted_path: "/out/objects/window__w_main__abc.txt".to_string(),
            }],
            failed_objects: vec![FailedObject {
                source_path: "bad.tar.xz".to_string(),
                reason: "unsupported archive format".to_string(),
            }],
        };

        write_manifest(&path, &manifest).unwrap();
        let loaded = load_manifest(&path).unwrap();
        assert_eq!(loaded.extractor, "auto");
        assert_eq!(loaded.objects.len(), 1);
        assert_eq!(loaded.objects[0].object_type, ObjectType::Window);
        assert_eq!(loaded.failed_objects.len(), 1);
    }

    #[test]
    fn missing_manifest_is_a_user_error() {
        let err = load_manifest(Path::new("/nonexistent/manifest.json")).unwrap_err();
        assert!(err.to_string().contains("manifest file not found"));
    }
}
