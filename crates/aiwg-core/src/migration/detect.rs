use super::WorkspaceMigrator;
use crate::io;
use crate::isolation::{PRIVATE_CATEGORIES, SHARED_CATEGORIES};
use crate::paths::{self, SHARED_NAMESPACE};
use serde::Serialize;
use std::path::Path;

pub const DEFAULT_FRAMEWORK: &str = "sdlc-complete";
pub const DEFAULT_PLATFORM: &str = "claude";

/// Maps a project directory to the agent platforms it targets.
pub trait FrameworkDetector {
    fn detect(&self, project: &Path) -> Vec<String>;
}

/// Detects platforms from their configuration directories in the project root.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformDirDetector;

const PLATFORM_MARKERS: &[(&str, &str)] = &[
    (".claude", "claude"),
    (".codex", "codex"),
    (".cursor", "cursor"),
    (".windsurf", "windsurf"),
    (".github/copilot-instructions.md", "copilot"),
];

impl FrameworkDetector for PlatformDirDetector {
    fn detect(&self, project: &Path) -> Vec<String> {
        PLATFORM_MARKERS
            .iter()
            .filter(|(marker, _)| project.join(marker).exists())
            .map(|(_, id)| id.to_string())
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyWorkspace {
    pub is_legacy: bool,
    /// Category directories found directly under `.aiwg/`.
    pub categories: Vec<String>,
    pub artifact_count: usize,
    pub total_size: u64,
    pub has_git: bool,
}

pub(super) fn is_legacy_category(name: &str) -> bool {
    SHARED_CATEGORIES.contains(&name) || PRIVATE_CATEGORIES.contains(&name)
}

impl WorkspaceMigrator {
    /// A workspace is legacy when `.aiwg/` holds category directories directly
    /// and has no `shared/` namespace yet.
    pub fn detect_legacy_workspace(&self) -> LegacyWorkspace {
        let mut info = LegacyWorkspace {
            has_git: self.project.join(".git").is_dir(),
            ..LegacyWorkspace::default()
        };
        info.categories = self.legacy_categories();
        if info.categories.is_empty() || self.workspace.join(SHARED_NAMESPACE).is_dir() {
            return info;
        }
        info.is_legacy = true;
        for cat in &info.categories {
            let dir = self.workspace.join(cat);
            let files = io::list_files(&dir, &[]).unwrap_or_default();
            info.artifact_count += files.len();
            info.total_size += io::total_size(&dir, &files);
        }
        info
    }

    pub(super) fn legacy_categories(&self) -> Vec<String> {
        let Ok(read) = std::fs::read_dir(&self.workspace) else {
            return Vec::new();
        };
        let mut cats: Vec<String> = read
            .flatten()
            .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| is_legacy_category(n))
            .collect();
        cats.sort();
        cats
    }

    /// Infer which frameworks produced the workspace's artifacts from content
    /// signatures. Falls back to `sdlc-complete`.
    pub fn detect_frameworks(&self) -> Vec<String> {
        let files = io::list_files(&self.workspace, &[paths::BACKUPS_DIR]).unwrap_or_default();
        let names: Vec<String> = files
            .iter()
            .map(|f| io::to_slash(f).to_lowercase())
            .collect();
        let has_architecture = any_file(&names, |n| {
            let f = file_name(n);
            n.starts_with("architecture/")
                || n.contains("/architecture/")
                || f.contains("architecture")
                || f.starts_with("sad")
        });
        let has_use_cases = any_file(&names, |n| {
            let f = file_name(n);
            f.starts_with("uc-") || f.contains("use-case") || f.contains("usecase")
        });
        let has_marketing = any_file(&names, |n| {
            n.contains("campaign") || n.starts_with("content/") || n.starts_with("marketing/")
        });
        let has_agile = any_file(&names, |n| n.contains("backlog") || n.contains("sprint"));

        let mut frameworks = Vec::new();
        if has_architecture && has_use_cases {
            frameworks.push(DEFAULT_FRAMEWORK.to_string());
        }
        if has_marketing {
            frameworks.push("marketing-flow".to_string());
        }
        if has_agile {
            frameworks.push("agile-complete".to_string());
        }
        if frameworks.is_empty() {
            frameworks.push(DEFAULT_FRAMEWORK.to_string());
        }
        frameworks
    }
}

fn any_file(names: &[String], pred: impl Fn(&str) -> bool) -> bool {
    names.iter().any(|n| pred(n))
}

fn file_name(rel: &str) -> &str {
    rel.rsplit('/').next().unwrap_or(rel)
}
