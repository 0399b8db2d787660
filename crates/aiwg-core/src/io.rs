use crate::error::Result;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// Prevents partial writes from corrupting the registry.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Copy `from` to `to`, creating the destination's parent directories.
pub fn copy_file(from: &Path, to: &Path) -> Result<u64> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(std::fs::copy(from, to)?)
}

/// Copy `from` to `to` and read both back, failing unless the bytes match.
///
/// Callers that delete the source afterwards rely on this: a source is only
/// removed once its copy is known to be on disk.
pub fn copy_verified(from: &Path, to: &Path) -> Result<()> {
    copy_file(from, to)?;
    let expected = std::fs::read(from)?;
    let actual = std::fs::read(to)?;
    if expected != actual {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("copy of {} did not verify", from.display()),
        )
        .into());
    }
    Ok(())
}

/// Relative paths of every regular file below `dir`, sorted.
///
/// Top-level entries named in `exclude` are skipped entirely. A missing `dir`
/// yields an empty list.
pub fn list_files(dir: &Path, exclude: &[&str]) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    let walker = WalkDir::new(dir).min_depth(1).into_iter().filter_entry(|e| {
        if e.depth() != 1 {
            return true;
        }
        let name = e.file_name().to_string_lossy();
        !exclude.iter().any(|x| *x == name)
    });
    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(dir) {
            files.push(rel.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Count files and directories below `dir` (excluding `dir` itself).
pub fn count_entries(dir: &Path) -> (usize, usize) {
    let mut files = 0;
    let mut dirs = 0;
    for entry in WalkDir::new(dir).min_depth(1).into_iter().flatten() {
        if entry.file_type().is_dir() {
            dirs += 1;
        } else {
            files += 1;
        }
    }
    (files, dirs)
}

/// Total size in bytes of the given files below `dir`.
pub fn total_size(dir: &Path, files: &[PathBuf]) -> u64 {
    files
        .iter()
        .filter_map(|f| std::fs::metadata(dir.join(f)).ok())
        .map(|m| m.len())
        .sum()
}

/// True if `dir` exists and contains at least one entry.
pub fn dir_has_entries(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut it| it.next().is_some())
        .unwrap_or(false)
}

/// Remove empty directories from `start` upward, stopping at `stop` (exclusive).
pub fn prune_empty_dirs(start: &Path, stop: &Path) {
    let mut current = start.to_path_buf();
    while current != stop && current.starts_with(stop) {
        if dir_has_entries(&current) || std::fs::remove_dir(&current).is_err() {
            break;
        }
        match current.parent() {
            Some(p) => current = p.to_path_buf(),
            None => break,
        }
    }
}

/// Render a relative path with forward slashes regardless of platform.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c/registry.json");
        atomic_write(&path, b"{}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn list_files_is_sorted_and_respects_exclude() {
        let dir = TempDir::new().unwrap();
        atomic_write(&dir.path().join("b.md"), b"b").unwrap();
        atomic_write(&dir.path().join("a/nested.md"), b"n").unwrap();
        atomic_write(&dir.path().join("backups/old/x.md"), b"x").unwrap();
        let files = list_files(dir.path(), &["backups"]).unwrap();
        assert_eq!(
            files,
            vec![PathBuf::from("a/nested.md"), PathBuf::from("b.md")]
        );
    }

    #[test]
    fn list_files_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(list_files(&dir.path().join("nope"), &[]).unwrap().is_empty());
    }

    #[test]
    fn copy_verified_copies_bytes() {
        let dir = TempDir::new().unwrap();
        let from = dir.path().join("src.md");
        std::fs::write(&from, b"payload").unwrap();
        let to = dir.path().join("deep/dst.md");
        copy_verified(&from, &to).unwrap();
        assert_eq!(std::fs::read(&to).unwrap(), b"payload");
    }

    #[test]
    fn prune_stops_at_boundary_and_non_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("keep/a/b")).unwrap();
        std::fs::write(dir.path().join("keep/file"), b"x").unwrap();
        prune_empty_dirs(&dir.path().join("keep/a/b"), dir.path());
        assert!(!dir.path().join("keep/a").exists());
        assert!(dir.path().join("keep").exists());
    }
}
