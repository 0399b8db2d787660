use super::WorkspaceMigrator;
use crate::error::{AiwgError, Result};
use crate::io;
use crate::paths::BACKUP_DESCRIPTOR;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

const TREE_DIR: &str = "tree";

/// Descriptor written next to every snapshot as `backup.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    pub id: String,
    pub source_path: PathBuf,
    pub created_at: DateTime<Utc>,
    #[serde(skip_deserializing)]
    pub location: PathBuf,
}

impl WorkspaceMigrator {
    /// Snapshot `source` into `backups/{id}/tree`. The backups directory itself
    /// is never part of a snapshot, even when it lives inside `source`.
    pub fn create_backup(&self, source: &Path, id: &str) -> Result<PathBuf> {
        if !source.is_dir() {
            return Err(AiwgError::SourceNotFound(source.to_path_buf()));
        }
        let location = self.backups_dir().join(id);
        let tree = location.join(TREE_DIR);
        io::ensure_dir(&tree)?;
        copy_tree(source, &tree, &self.backups_dir())?;

        let info = BackupInfo {
            id: id.to_string(),
            source_path: source.to_path_buf(),
            created_at: Utc::now(),
            location: location.clone(),
        };
        let data = serde_json::to_vec_pretty(&info)?;
        io::atomic_write(&location.join(BACKUP_DESCRIPTOR), &data)?;
        tracing::info!(id, path = %location.display(), "backup created");
        Ok(location)
    }

    /// Every backup with a readable descriptor, oldest first.
    pub fn list_backups(&self) -> Vec<BackupInfo> {
        let Ok(read) = std::fs::read_dir(self.backups_dir()) else {
            return Vec::new();
        };
        let mut backups: Vec<BackupInfo> = read
            .flatten()
            .filter_map(|e| self.load_backup(&e.file_name().to_string_lossy()).ok())
            .collect();
        backups.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        backups
    }

    fn load_backup(&self, id: &str) -> Result<BackupInfo> {
        let location = self.backups_dir().join(id);
        let descriptor = location.join(BACKUP_DESCRIPTOR);
        if !descriptor.is_file() || !location.join(TREE_DIR).is_dir() {
            return Err(AiwgError::BackupNotFound(id.to_string()));
        }
        let data = std::fs::read_to_string(&descriptor)?;
        let mut info: BackupInfo = serde_json::from_str(&data)?;
        if info.id != id {
            return Err(AiwgError::BackupNotFound(id.to_string()));
        }
        info.location = location;
        Ok(info)
    }

    /// Restore the snapshot taken for `migration_id` over its source tree.
    ///
    /// The snapshot is staged next to the source first; the live tree is only
    /// swapped out once staging has succeeded, and a failed swap moves every
    /// parked entry back.
    pub fn rollback(&self, migration_id: &str) -> Result<BackupInfo> {
        let info = self.load_backup(migration_id)?;
        let source = info.source_path.clone();
        let parent = source
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        io::ensure_dir(&source)?;

        let staging = TempDir::new_in(&parent)?;
        copy_tree(&info.location.join(TREE_DIR), staging.path(), &self.backups_dir())?;

        let parking = TempDir::new_in(&parent)?;
        let keep = self.backups_dir();
        let mut moves = Moves::default();

        let swapped = park(&source, &keep, parking.path(), &mut moves)
            .and_then(|()| install(staging.path(), &source, &mut moves));
        if let Err(e) = swapped {
            moves.undo();
            return Err(e);
        }
        tracing::info!(id = migration_id, path = %source.display(), "rollback complete");
        Ok(info)
    }
}

/// Copy directories and files from `from` into `to`, skipping `skip`.
fn copy_tree(from: &Path, to: &Path, skip: &Path) -> Result<()> {
    let walker = WalkDir::new(from)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| e.path() != skip);
    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        let Ok(rel) = entry.path().strip_prefix(from) else {
            continue;
        };
        let dest = to.join(rel);
        if entry.file_type().is_dir() {
            io::ensure_dir(&dest)?;
        } else if entry.file_type().is_file() {
            io::copy_file(entry.path(), &dest)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Swap
// ---------------------------------------------------------------------------

/// Renames performed so far, undone in reverse.
#[derive(Default)]
struct Moves(Vec<(PathBuf, PathBuf)>);

impl Moves {
    fn rename(&mut self, from: &Path, to: &Path) -> Result<()> {
        std::fs::rename(from, to)?;
        self.0.push((from.to_path_buf(), to.to_path_buf()));
        Ok(())
    }

    fn undo(self) {
        for (from, to) in self.0.into_iter().rev() {
            if let Err(e) = std::fs::rename(&to, &from) {
                tracing::warn!(path = %to.display(), error = %e, "could not undo rollback move");
            }
        }
    }
}

/// Move every entry of `dir` into `dest`, except `keep` and its ancestors,
/// which are descended into instead.
fn park(dir: &Path, keep: &Path, dest: &Path, moves: &mut Moves) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path == keep {
            continue;
        }
        let target = dest.join(path.file_name().unwrap_or_default());
        if keep.starts_with(&path) && path.is_dir() {
            io::ensure_dir(&target)?;
            park(&path, keep, &target, moves)?;
        } else {
            moves.rename(&path, &target)?;
        }
    }
    Ok(())
}

/// Move staged entries into `dir`, merging into directories that were kept.
fn install(staged: &Path, dir: &Path, moves: &mut Moves) -> Result<()> {
    for entry in std::fs::read_dir(staged)? {
        let path = entry?.path();
        let target = dir.join(path.file_name().unwrap_or_default());
        if target.is_dir() && path.is_dir() {
            install(&path, &target, moves)?;
        } else {
            moves.rename(&path, &target)?;
        }
    }
    Ok(())
}
