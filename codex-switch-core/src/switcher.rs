//! Filesystem mechanics of the switch engine.
//!
//! The live auth file is only ever replaced through the write-temp, fsync,
//! rename sequence: a failed rename leaves the target untouched. Snapshots
//! are byte-for-byte copies taken immediately before a replacement and are
//! never garbage-collected, so older rollbacks stay replayable.

use crate::Result;
use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Atomically replace `path` with `content`.
///
/// The temporary file lives in the target's directory so the final rename
/// never crosses a filesystem boundary.
pub fn atomic_replace(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        crate::CodexSwitchError::SwitchFailed(format!(
            "target path {} has no parent directory",
            path.display()
        ))
    })?;
    fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "auth.json".to_string());
    let tmp_path = dir.join(format!(".{file_name}.tmp-{}", random_hex()));

    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
    }

    if let Err(error) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(error.into());
    }
    Ok(())
}

/// Copy the live file into the snapshot directory.
///
/// Returns `None` when the live file does not exist. Snapshot names are
/// `<ISO8601 basic>-<6 hex>.json`, safe on every filesystem.
pub fn create_snapshot(auth_path: &Path, snapshots_dir: &Path) -> Result<Option<PathBuf>> {
    if !auth_path.exists() {
        return Ok(None);
    }
    fs::create_dir_all(snapshots_dir)?;

    let snapshot_path = snapshots_dir.join(format!(
        "{}-{}.json",
        Utc::now().format("%Y%m%dT%H%M%S%.3fZ"),
        random_hex()
    ));
    fs::copy(auth_path, &snapshot_path)?;
    tracing::debug!(snapshot = %snapshot_path.display(), "captured live-file snapshot");
    Ok(Some(snapshot_path))
}

fn random_hex() -> String {
    hex::encode(rand::random::<[u8; 3]>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_replace_creates_and_overwrites() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested").join("auth.json");

        atomic_replace(&target, b"first").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"first");

        atomic_replace(&target, b"second").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"second");
    }

    #[test]
    fn atomic_replace_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("auth.json");
        atomic_replace(&target, b"content").unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["auth.json".to_string()]);
    }

    #[test]
    fn snapshot_of_missing_live_file_is_none() {
        let dir = TempDir::new().unwrap();
        let snapshot = create_snapshot(
            &dir.path().join("auth.json"),
            &dir.path().join("snapshots"),
        )
        .unwrap();
        assert!(snapshot.is_none());
    }

    #[test]
    fn snapshot_copies_bytes_exactly() {
        let dir = TempDir::new().unwrap();
        let auth_path = dir.path().join("auth.json");
        fs::write(&auth_path, br#"{"tokens":{"access_token":"x"}}"#).unwrap();

        let snapshots_dir = dir.path().join("snapshots");
        let snapshot = create_snapshot(&auth_path, &snapshots_dir)
            .unwrap()
            .unwrap();

        assert!(snapshot.starts_with(&snapshots_dir));
        assert!(snapshot.extension().is_some_and(|ext| ext == "json"));
        assert_eq!(fs::read(&snapshot).unwrap(), fs::read(&auth_path).unwrap());
    }

    #[test]
    fn snapshot_names_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let auth_path = dir.path().join("auth.json");
        fs::write(&auth_path, b"{}").unwrap();
        let snapshots_dir = dir.path().join("snapshots");

        let first = create_snapshot(&auth_path, &snapshots_dir).unwrap().unwrap();
        let second = create_snapshot(&auth_path, &snapshots_dir).unwrap().unwrap();
        assert_ne!(first, second);
    }
}
