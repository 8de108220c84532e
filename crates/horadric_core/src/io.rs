//! Whole-file load/save. Save files are a few KB; everything is read and
//! written in one piece.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SaveError;
use crate::save::SaveBuffer;

pub fn load(path: &Path) -> Result<SaveBuffer, SaveError> {
    let bytes = fs::read(path)
        .map_err(|e| SaveError::io(format!("failed to read {}: {e}", path.display())))?;
    SaveBuffer::from_bytes(bytes)
}

pub fn save(buffer: &SaveBuffer, path: &Path) -> Result<(), SaveError> {
    fs::write(path, buffer.bytes())
        .map_err(|e| SaveError::io(format!("failed to write {}: {e}", path.display())))
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Persist several buffers together or not at all: every buffer is staged
/// to a temporary sibling first, and only after all writes succeed are the
/// temporaries renamed over their targets. A failure during staging
/// removes the temporaries and leaves every target untouched.
pub fn save_pair(pairs: &[(&SaveBuffer, &Path)]) -> Result<(), SaveError> {
    let mut staged: Vec<(PathBuf, &Path)> = Vec::with_capacity(pairs.len());

    for (buffer, path) in pairs {
        let tmp = staging_path(path);
        if let Err(e) = fs::write(&tmp, buffer.bytes()) {
            for (written, _) in &staged {
                let _ = fs::remove_file(written);
            }
            return Err(SaveError::io(format!(
                "failed to stage {}: {e}",
                tmp.display()
            )));
        }
        staged.push((tmp, path));
    }

    for (tmp, path) in &staged {
        if let Err(e) = fs::rename(tmp, path) {
            // A rename failure after the first commit is the fatal
            // inconsistency the staging exists to avoid; report it loudly
            // rather than trying to roll back half-committed files.
            return Err(SaveError::io(format!(
                "failed to commit {} over {}: {e}",
                tmp.display(),
                path.display()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;
    use crate::testutil::synthetic_save;

    fn temp_dir(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "horadric_{}_{}_{}",
            prefix,
            std::process::id(),
            nanos
        ));
        fs::create_dir_all(&dir).expect("failed to create temp dir");
        dir
    }

    #[test]
    fn load_save_roundtrip() {
        let dir = temp_dir("roundtrip");
        let path = dir.join("hero.d2s");
        let mut original = synthetic_save(&[]);
        original.finalize();

        save(&original, &path).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.bytes(), original.bytes());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn save_pair_commits_both() {
        let dir = temp_dir("pair_ok");
        let path_a = dir.join("a.d2s");
        let path_b = dir.join("b.d2s");
        let save_a = synthetic_save(&[]);
        let save_b = synthetic_save(&[]);

        save_pair(&[(&save_a, &path_a), (&save_b, &path_b)]).unwrap();
        assert_eq!(load(&path_a).unwrap().bytes(), save_a.bytes());
        assert_eq!(load(&path_b).unwrap().bytes(), save_b.bytes());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn save_pair_failure_touches_neither_target() {
        let dir = temp_dir("pair_fail");
        let path_a = dir.join("a.d2s");
        let save_a = synthetic_save(&[]);
        let save_b = synthetic_save(&[]);
        // Staging the second file fails: its parent directory is missing.
        let path_b = dir.join("missing").join("b.d2s");

        let result = save_pair(&[(&save_a, &path_a), (&save_b, &path_b)]);
        assert!(result.is_err());
        assert!(!path_a.exists());
        assert!(!path_b.exists());
        assert!(!staging_path(&path_a).exists());

        let _ = fs::remove_dir_all(&dir);
    }
}
