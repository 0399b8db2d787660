use super::detect::is_legacy_category;
use super::{new_migration_id, MigrationError, WorkspaceMigrator};
use crate::io;
use crate::isolation::{self, FrameworkIsolator, RESERVED_ENTRIES};
use crate::paths::SHARED_NAMESPACE;
use crate::types::{Conflict, ConflictKind, ConflictStrategy, Severity};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOptions {
    pub conflict_strategy: ConflictStrategy,
    pub backup: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    pub duplicates_found: usize,
    pub merged_count: usize,
    pub removed_count: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    pub success: bool,
    pub dry_run: bool,
    pub conflicts: Vec<Conflict>,
    pub report: MergeReport,
    pub errors: Vec<MigrationError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_id: Option<String>,
}

impl MergeResult {
    fn fail(&mut self, path: &str, error: impl Into<String>, severity: Severity) {
        self.errors.push(MigrationError {
            path: path.to_string(),
            error: error.into(),
            severity,
        });
    }
}

/// A shared-type artifact present under more than one framework root.
struct Duplicate {
    rel: String,
    roots: Vec<String>,
}

impl WorkspaceMigrator {
    /// Top-level workspace directories that hold a framework's artifacts.
    fn framework_roots(&self) -> Vec<String> {
        let Ok(read) = std::fs::read_dir(&self.workspace) else {
            return Vec::new();
        };
        let mut roots: Vec<String> = read
            .flatten()
            .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| {
                !n.starts_with('.') && !RESERVED_ENTRIES.contains(&n.as_str()) && !is_legacy_category(n)
            })
            .collect();
        roots.sort();
        roots
    }

    fn find_duplicates(&self, roots: &[String]) -> Vec<Duplicate> {
        let mut seen: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for root in roots {
            let files = io::list_files(&self.workspace.join(root), &[]).unwrap_or_default();
            for file in files {
                let rel = io::to_slash(&file);
                if isolation::is_shared_resource(&rel) && !isolation::is_private_resource(&rel) {
                    seen.entry(rel).or_default().push(root.clone());
                }
            }
        }
        seen.into_iter()
            .filter(|(_, roots)| roots.len() > 1)
            .map(|(rel, roots)| Duplicate { rel, roots })
            .collect()
    }

    /// Consolidate shared-type artifacts duplicated across framework roots
    /// into `shared/`. Per-framework copies are removed only after the shared
    /// copy is verified on disk.
    pub fn merge_duplicate_shared(&self, opts: MergeOptions) -> MergeResult {
        let mut result = MergeResult {
            dry_run: opts.dry_run,
            ..MergeResult::default()
        };
        let roots = self.framework_roots();
        let duplicates = self.find_duplicates(&roots);
        result.report.duplicates_found = duplicates.len();

        let isolator = FrameworkIsolator::new(&self.workspace, roots.iter().map(String::as_str));

        if opts.dry_run {
            for dup in &duplicates {
                let copies = self.copies(dup);
                if let Ok(shared) = isolator.get_framework_path(SHARED_NAMESPACE, Some(dup.rel.as_str())) {
                    if contents_differ(&copies, &shared) {
                        result.conflicts.push(conflict(&dup.rel, opts.conflict_strategy));
                    }
                }
            }
            result.success = true;
            return result;
        }

        if opts.backup && !duplicates.is_empty() {
            let id = new_migration_id();
            match self.create_backup(&self.workspace, &id) {
                Ok(_) => result.backup_id = Some(id),
                Err(e) => {
                    result.fail("", format!("Backup failed: {e}"), Severity::Critical);
                    return result;
                }
            }
        }

        for dup in &duplicates {
            let copies = self.copies(dup);
            let shared = match isolator.get_framework_path(SHARED_NAMESPACE, Some(dup.rel.as_str())) {
                Ok(p) => p,
                Err(e) => {
                    result.fail(&dup.rel, e.to_string(), Severity::Error);
                    continue;
                }
            };

            let chosen = if contents_differ(&copies, &shared) {
                result.conflicts.push(conflict(&dup.rel, opts.conflict_strategy));
                match opts.conflict_strategy {
                    ConflictStrategy::KeepNewest => newest(&copies, &shared),
                    ConflictStrategy::Overwrite => copies.last().cloned(),
                    ConflictStrategy::Skip | ConflictStrategy::Manual => {
                        tracing::debug!(path = %dup.rel, "conflict left unresolved");
                        continue;
                    }
                }
            } else {
                copies.first().cloned()
            };

            let Some(source) = merge_source(chosen, &shared) else {
                result.fail(&dup.rel, "No readable copy to merge; copies left in place", Severity::Warning);
                continue;
            };
            if source != shared {
                if let Err(e) = io::copy_verified(&source, &shared) {
                    result.fail(&dup.rel, e.to_string(), Severity::Error);
                    continue;
                }
            }
            result.report.merged_count += 1;

            for (root, copy) in dup.roots.iter().zip(&copies) {
                match std::fs::remove_file(copy) {
                    Ok(()) => {
                        result.report.removed_count += 1;
                        if let Some(parent) = copy.parent() {
                            io::prune_empty_dirs(parent, &self.workspace.join(root));
                        }
                    }
                    Err(e) => result.fail(&dup.rel, e.to_string(), Severity::Warning),
                }
            }
        }

        result.success = !result.errors.iter().any(|e| e.severity >= Severity::Error);
        tracing::info!(
            duplicates = result.report.duplicates_found,
            merged = result.report.merged_count,
            removed = result.report.removed_count,
            "shared duplicates merged"
        );
        result
    }

    fn copies(&self, dup: &Duplicate) -> Vec<PathBuf> {
        dup.roots
            .iter()
            .map(|root| self.workspace.join(root).join(&dup.rel))
            .collect()
    }
}

fn conflict(rel: &str, resolution: ConflictStrategy) -> Conflict {
    Conflict {
        path: rel.to_string(),
        kind: ConflictKind::File,
        resolution,
    }
}

/// True when the copies, plus any existing shared copy, are not all identical.
fn contents_differ(copies: &[PathBuf], shared: &Path) -> bool {
    let mut contents = copies.iter().filter_map(|p| std::fs::read(p).ok());
    let Some(first) = contents.next() else {
        return false;
    };
    if contents.any(|c| c != first) {
        return true;
    }
    match std::fs::read(shared) {
        Ok(existing) => existing != first,
        Err(_) => false,
    }
}

/// The most recently modified copy, or `None` when the existing shared copy
/// is newer than all of them.
fn newest(copies: &[PathBuf], shared: &Path) -> Option<PathBuf> {
    let mtime = |p: &Path| std::fs::metadata(p).and_then(|m| m.modified()).ok();
    let mut best: Option<(SystemTime, &PathBuf)> = None;
    for copy in copies {
        if let Some(t) = mtime(copy) {
            if best.map_or(true, |(bt, _)| t >= bt) {
                best = Some((t, copy));
            }
        }
    }
    match (best, mtime(shared)) {
        (Some((bt, _)), Some(st)) if st > bt => None,
        (Some((_, p)), _) => Some(p.clone()),
        (None, _) => None,
    }
}

/// The file the shared copy ends up with: the chosen copy, else an existing
/// shared file. `None` means copies must not be removed.
fn merge_source(chosen: Option<PathBuf>, shared: &Path) -> Option<PathBuf> {
    chosen.or_else(|| shared.is_file().then(|| shared.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, body: &str) {
        let p = root.join(rel);
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        std::fs::write(p, body).unwrap();
    }

    fn age(root: &Path, rel: &str, secs: u64) {
        let file = std::fs::File::options().write(true).open(root.join(rel)).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(secs)).unwrap();
    }

    fn read(root: &Path, rel: &str) -> String {
        std::fs::read_to_string(root.join(rel)).unwrap()
    }

    #[test]
    fn identical_duplicates_merge_into_shared() {
        let dir = TempDir::new().unwrap();
        let m = WorkspaceMigrator::new(dir.path());
        let ws = m.workspace();
        write(ws, "claude/requirements/uc-001.md", "uc");
        write(ws, "codex/requirements/uc-001.md", "uc");
        write(ws, "claude/agents/bot.md", "bot");

        let r = m.merge_duplicate_shared(MergeOptions::default());
        assert!(r.success);
        assert_eq!(r.report.duplicates_found, 1);
        assert_eq!(r.report.merged_count, 1);
        assert_eq!(r.report.removed_count, 2);
        assert!(r.conflicts.is_empty());
        assert_eq!(read(ws, "shared/requirements/uc-001.md"), "uc");
        assert!(!ws.join("claude/requirements/uc-001.md").exists());
        assert!(!ws.join("codex/requirements/uc-001.md").exists());
        assert!(ws.join("claude/agents/bot.md").is_file());
    }

    #[test]
    fn private_duplicates_stay_put() {
        let dir = TempDir::new().unwrap();
        let m = WorkspaceMigrator::new(dir.path());
        write(m.workspace(), "claude/agents/bot.md", "a");
        write(m.workspace(), "codex/agents/bot.md", "a");
        let r = m.merge_duplicate_shared(MergeOptions::default());
        assert_eq!(r.report.duplicates_found, 0);
        assert!(!m.workspace().join("shared").exists());
    }

    #[test]
    fn keep_newest_takes_latest_mtime() {
        let dir = TempDir::new().unwrap();
        let m = WorkspaceMigrator::new(dir.path());
        let ws = m.workspace();
        write(ws, "claude/requirements/uc-001.md", "older");
        write(ws, "codex/requirements/uc-001.md", "newer");
        age(ws, "claude/requirements/uc-001.md", 3600);

        let r = m.merge_duplicate_shared(MergeOptions::default());
        assert!(r.success);
        assert_eq!(r.conflicts.len(), 1);
        assert_eq!(r.conflicts[0].resolution, ConflictStrategy::KeepNewest);
        assert_eq!(read(ws, "shared/requirements/uc-001.md"), "newer");
    }

    #[test]
    fn keep_newest_prefers_newer_existing_shared() {
        let dir = TempDir::new().unwrap();
        let m = WorkspaceMigrator::new(dir.path());
        let ws = m.workspace();
        write(ws, "claude/requirements/uc-001.md", "a");
        write(ws, "codex/requirements/uc-001.md", "b");
        write(ws, "shared/requirements/uc-001.md", "current");
        age(ws, "claude/requirements/uc-001.md", 3600);
        age(ws, "codex/requirements/uc-001.md", 1800);

        let r = m.merge_duplicate_shared(MergeOptions::default());
        assert_eq!(r.report.merged_count, 1);
        assert_eq!(r.report.removed_count, 2);
        assert_eq!(read(ws, "shared/requirements/uc-001.md"), "current");
    }

    #[test]
    fn unreadable_copies_are_never_removed_without_a_shared_file() {
        let dir = TempDir::new().unwrap();
        let shared = dir.path().join("shared/requirements/uc-001.md");
        let copies = vec![
            dir.path().join("claude/requirements/uc-001.md"),
            dir.path().join("codex/requirements/uc-001.md"),
        ];
        let chosen = newest(&copies, &shared);
        assert!(chosen.is_none());
        assert!(merge_source(chosen, &shared).is_none());

        write(dir.path(), "shared/requirements/uc-001.md", "current");
        assert_eq!(merge_source(None, &shared), Some(shared.clone()));
        assert_eq!(merge_source(Some(copies[0].clone()), &shared), Some(copies[0].clone()));
    }

    #[test]
    fn overwrite_takes_last_source() {
        let dir = TempDir::new().unwrap();
        let m = WorkspaceMigrator::new(dir.path());
        let ws = m.workspace();
        write(ws, "claude/testing/plan.md", "claude");
        write(ws, "codex/testing/plan.md", "codex");
        age(ws, "codex/testing/plan.md", 3600);

        let r = m.merge_duplicate_shared(MergeOptions {
            conflict_strategy: ConflictStrategy::Overwrite,
            ..MergeOptions::default()
        });
        assert!(r.success);
        assert_eq!(read(ws, "shared/testing/plan.md"), "codex");
    }

    #[test]
    fn manual_records_conflict_without_merging() {
        let dir = TempDir::new().unwrap();
        let m = WorkspaceMigrator::new(dir.path());
        let ws = m.workspace();
        write(ws, "claude/testing/plan.md", "a");
        write(ws, "codex/testing/plan.md", "b");

        let r = m.merge_duplicate_shared(MergeOptions {
            conflict_strategy: ConflictStrategy::Manual,
            ..MergeOptions::default()
        });
        assert_eq!(r.report.duplicates_found, 1);
        assert_eq!(r.report.merged_count, 0);
        assert_eq!(r.conflicts.len(), 1);
        assert!(ws.join("claude/testing/plan.md").is_file());
        assert!(ws.join("codex/testing/plan.md").is_file());
        assert!(!ws.join("shared").exists());
    }

    #[test]
    fn dry_run_reports_only() {
        let dir = TempDir::new().unwrap();
        let m = WorkspaceMigrator::new(dir.path());
        let ws = m.workspace();
        write(ws, "claude/testing/plan.md", "a");
        write(ws, "codex/testing/plan.md", "b");

        let r = m.merge_duplicate_shared(MergeOptions {
            dry_run: true,
            backup: true,
            ..MergeOptions::default()
        });
        assert!(r.dry_run);
        assert_eq!(r.report.duplicates_found, 1);
        assert_eq!(r.conflicts.len(), 1);
        assert_eq!(r.report.removed_count, 0);
        assert!(r.backup_id.is_none());
        assert!(ws.join("claude/testing/plan.md").is_file());
        assert!(!ws.join("shared").exists());
    }

    #[test]
    fn backup_allows_rollback_of_merge() {
        let dir = TempDir::new().unwrap();
        let m = WorkspaceMigrator::new(dir.path());
        let ws = m.workspace();
        write(ws, "claude/requirements/uc-001.md", "uc");
        write(ws, "codex/requirements/uc-001.md", "uc");

        let r = m.merge_duplicate_shared(MergeOptions {
            backup: true,
            ..MergeOptions::default()
        });
        let id = r.backup_id.unwrap();
        m.rollback(&id).unwrap();
        assert!(ws.join("claude/requirements/uc-001.md").is_file());
        assert!(!ws.join("shared").exists());
    }
}
