//! Workspace restructuring: legacy flat `.aiwg/` to framework-scoped layout,
//! and consolidation of duplicated shared artifacts.
//!
//! Both operations mutate the same tree and share one protocol: classify
//! every target through [`FrameworkIsolator`](crate::isolation::FrameworkIsolator),
//! optionally snapshot the source into `backups/{id}/`, copy and verify, and
//! only then remove anything from the source.

mod backup;
mod detect;
mod engine;
mod merge;
mod report;

pub use backup::BackupInfo;
pub use detect::{FrameworkDetector, LegacyWorkspace, PlatformDirDetector};
pub use merge::{MergeOptions, MergeReport, MergeResult};
pub use report::generate_report;

use crate::paths;
use crate::types::{Conflict, Severity};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Entries under a migration source that are managed state, never artifacts.
pub const EXCLUDED_ENTRIES: &[&str] = &[paths::FRAMEWORKS_DIR, paths::REGISTRY_FILE, paths::BACKUPS_DIR];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub source: PathBuf,
    pub target: PathBuf,
    pub framework: String,
    pub backup: bool,
    pub dry_run: bool,
    pub overwrite: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyMigrationOptions {
    pub backup: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationError {
    pub path: String,
    pub error: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationResult {
    pub id: String,
    pub success: bool,
    pub dry_run: bool,
    pub files_moved_count: usize,
    pub files_copied_count: usize,
    pub files_skipped_count: usize,
    pub errors: Vec<MigrationError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,
    /// Milliseconds.
    pub duration: u64,
}

impl MigrationResult {
    fn record(&mut self, path: impl Into<String>, error: impl Into<String>, severity: Severity) {
        self.errors.push(MigrationError {
            path: path.into(),
            error: error.into(),
            severity,
        });
    }

    fn has_failures(&self) -> bool {
        self.errors.iter().any(|e| e.severity >= Severity::Error)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationValidation {
    pub safe: bool,
    pub conflicts: Vec<Conflict>,
    pub warnings: Vec<String>,
    /// Milliseconds.
    pub estimated_duration: u64,
}

// ---------------------------------------------------------------------------
// WorkspaceMigrator
// ---------------------------------------------------------------------------

/// Operates on one project's `.aiwg/` workspace.
#[derive(Debug, Clone)]
pub struct WorkspaceMigrator {
    project: PathBuf,
    workspace: PathBuf,
}

impl WorkspaceMigrator {
    pub fn new(project: impl Into<PathBuf>) -> Self {
        let project = project.into();
        let workspace = paths::workspace_dir(&project);
        Self { project, workspace }
    }

    pub fn project(&self) -> &Path {
        &self.project
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.workspace.join(paths::BACKUPS_DIR)
    }
}

fn new_migration_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "migration-{}-{}",
        chrono::Utc::now().format("%Y%m%d%H%M%S"),
        &uuid[..8]
    )
}
