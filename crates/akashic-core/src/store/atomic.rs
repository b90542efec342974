//! Crash-safe JSON file replacement.

use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::StoreResult;

/// `<path>.bak`
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".bak");
    PathBuf::from(name)
}

/// Serialize to a temp file in the same directory, fsync, then rename over
/// `path`. With `keep_backup` the previous version is copied to `<path>.bak`
/// first. A crash at any point leaves either the old or the new file intact.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T, keep_backup: bool) -> StoreResult<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new().prefix(".tmp_").tempfile_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.write_all(b"\n")?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;

    if keep_backup && path.exists() {
        fs::copy(path, backup_path(path))?;
    }
    tmp.persist(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_write_and_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        write_json_atomic(&path, &json!({"v": 1}), true).unwrap();
        assert!(!backup_path(&path).exists());

        write_json_atomic(&path, &json!({"v": 2}), true).unwrap();
        let current: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        let backup: serde_json::Value =
            serde_json::from_slice(&fs::read(backup_path(&path)).unwrap()).unwrap();
        assert_eq!(current["v"], 2);
        assert_eq!(backup["v"], 1);
    }

    #[test]
    fn test_no_temp_files_left() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        write_json_atomic(&path, &json!({}), false).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![OsString::from("store.json")]);
    }
}
