//! Reconciles the registry against what is actually on disk.

use crate::config::Config;
use crate::manifest;
use crate::registry::Registry;
use crate::types::{PluginType, Severity};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    Missing,
    Orphaned,
    InvalidRef,
    StaleHealth,
}

impl IssueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueKind::Missing => "missing",
            IssueKind::Orphaned => "orphaned",
            IssueKind::InvalidRef => "invalid-ref",
            IssueKind::StaleHealth => "stale-health",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub severity: Severity,
    /// Registry id, or the directory name for orphans.
    pub plugin_id: String,
    /// Path relative to the plugin root.
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStats {
    pub total_plugins: usize,
    pub healthy_plugins: usize,
    pub orphaned_plugins: usize,
    pub invalid_refs: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub stats: ValidationStats,
}

impl ValidationReport {
    pub fn of_kind(&self, kind: IssueKind) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.kind == kind)
    }
}

/// Which categories a validation pass runs.
#[derive(Debug, Clone, Copy)]
pub struct ValidateOptions {
    /// Missing and orphaned checks.
    pub check_filesystem: bool,
    pub check_framework_refs: bool,
    pub check_health: bool,
    pub stale_after: Duration,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            check_filesystem: true,
            check_framework_refs: true,
            check_health: true,
            stale_after: Duration::hours(24),
        }
    }
}

impl ValidateOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            stale_after: cfg.stale_after(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegistryValidator {
    root: PathBuf,
    options: ValidateOptions,
}

impl RegistryValidator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            options: ValidateOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ValidateOptions) -> Self {
        self.options = options;
        self
    }

    /// Run every enabled check. Never fails; unreadable directories simply
    /// contribute no orphans.
    pub fn validate(&self) -> ValidationReport {
        let registry = Registry::load(&self.root);
        let opts = self.options;
        let mut issues = Vec::new();

        for entry in &registry.plugins {
            if opts.check_filesystem {
                let dir = self.root.join(&entry.path);
                if !dir.is_dir() {
                    issues.push(ValidationIssue {
                        kind: IssueKind::Missing,
                        severity: Severity::Error,
                        plugin_id: entry.id.clone(),
                        path: entry.path.clone(),
                        message: format!("Registered path {} does not exist", entry.path),
                    });
                } else if manifest::find_manifest(&dir).is_none() {
                    issues.push(ValidationIssue {
                        kind: IssueKind::Missing,
                        severity: Severity::Warning,
                        plugin_id: entry.id.clone(),
                        path: entry.path.clone(),
                        message: format!("No manifest found in {}", entry.path),
                    });
                }
            }

            if opts.check_framework_refs && entry.plugin_type != PluginType::Framework {
                let resolves = entry
                    .parent_framework
                    .as_deref()
                    .map(|p| registry.has_framework(p));
                let message = match (entry.plugin_type, &entry.parent_framework, resolves) {
                    (_, Some(p), Some(false)) => {
                        Some(format!("Parent framework '{p}' is not installed"))
                    }
                    (PluginType::AddOn, None, _) => {
                        Some("Add-on does not declare a parent framework".to_string())
                    }
                    _ => None,
                };
                if let Some(message) = message {
                    issues.push(ValidationIssue {
                        kind: IssueKind::InvalidRef,
                        severity: Severity::Error,
                        plugin_id: entry.id.clone(),
                        path: entry.path.clone(),
                        message,
                    });
                }
            }

            if opts.check_health {
                if let Some(health) = &entry.health {
                    let age = Utc::now() - health.last_check;
                    if age > opts.stale_after {
                        issues.push(ValidationIssue {
                            kind: IssueKind::StaleHealth,
                            severity: Severity::Warning,
                            plugin_id: entry.id.clone(),
                            path: entry.path.clone(),
                            message: format!(
                                "Health last checked {} hours ago",
                                age.num_hours()
                            ),
                        });
                    }
                }
            }
        }

        if opts.check_filesystem {
            issues.extend(self.find_orphans(&registry));
        }

        let flagged: HashSet<&str> = issues
            .iter()
            .filter(|i| i.kind != IssueKind::Orphaned)
            .map(|i| i.plugin_id.as_str())
            .collect();
        let stats = ValidationStats {
            total_plugins: registry.plugins.len(),
            healthy_plugins: registry
                .plugins
                .iter()
                .filter(|p| !flagged.contains(p.id.as_str()))
                .count(),
            orphaned_plugins: issues
                .iter()
                .filter(|i| i.kind == IssueKind::Orphaned)
                .count(),
            invalid_refs: issues
                .iter()
                .filter(|i| i.kind == IssueKind::InvalidRef)
                .count(),
        };

        let valid = !issues.iter().any(|i| i.severity >= Severity::Error);
        ValidationReport {
            valid,
            issues,
            stats,
        }
    }

    fn find_orphans(&self, registry: &Registry) -> Vec<ValidationIssue> {
        let mut orphans = Vec::new();
        for &plugin_type in PluginType::all() {
            let type_root = crate::paths::type_root(&self.root, plugin_type);
            let Ok(read) = std::fs::read_dir(&type_root) else {
                continue;
            };
            let mut names: Vec<String> = read
                .flatten()
                .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|n| !n.starts_with('.'))
                .collect();
            names.sort();
            for name in names {
                let registered = registry
                    .get(&name)
                    .is_some_and(|e| e.plugin_type == plugin_type);
                if !registered {
                    let path = format!("{}/{name}", crate::paths::type_dir_name(plugin_type));
                    orphans.push(ValidationIssue {
                        kind: IssueKind::Orphaned,
                        severity: Severity::Error,
                        message: format!("Directory {path} has no registry entry"),
                        plugin_id: name,
                        path,
                    });
                }
            }
        }
        orphans
    }

    pub fn is_consistent(&self) -> bool {
        self.validate().valid
    }

    /// Directory paths (relative to the root) with no registry entry.
    pub fn get_orphaned_plugins(&self) -> Vec<String> {
        self.validate()
            .of_kind(IssueKind::Orphaned)
            .map(|i| i.path.clone())
            .collect()
    }

    /// Ids of registered plugins whose directory is gone.
    pub fn get_missing_plugins(&self) -> Vec<String> {
        self.validate()
            .of_kind(IssueKind::Missing)
            .filter(|i| i.severity == Severity::Error)
            .map(|i| i.plugin_id.clone())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installer::tests::framework_source;
    use crate::installer::{InstallOptions, PluginInstaller};
    use crate::registry::{tests::entry, PluginHealth};
    use crate::types::HealthStatus;
    use tempfile::TempDir;

    fn root_with_framework() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        let src = dir.path().join("src");
        framework_source(&src, "sdlc-complete", "1.0.0");
        assert!(PluginInstaller::new(&root)
            .install(&src, InstallOptions::default())
            .success);
        (dir, root)
    }

    #[test]
    fn fresh_install_is_consistent() {
        let (_dir, root) = root_with_framework();
        let v = RegistryValidator::new(&root);
        let report = v.validate();
        assert!(report.valid, "{:?}", report.issues);
        assert_eq!(report.stats.total_plugins, 1);
        assert_eq!(report.stats.healthy_plugins, 1);
        assert!(v.is_consistent());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let (_dir, root) = root_with_framework();
        std::fs::remove_dir_all(root.join("frameworks/sdlc-complete/repo")).unwrap();
        let v = RegistryValidator::new(&root);
        assert!(!v.is_consistent());
        assert_eq!(v.get_missing_plugins(), vec!["sdlc-complete".to_string()]);
    }

    #[test]
    fn missing_manifest_is_a_warning() {
        let (_dir, root) = root_with_framework();
        std::fs::remove_file(root.join("frameworks/sdlc-complete/repo/manifest.json")).unwrap();
        let report = RegistryValidator::new(&root).validate();
        assert!(report.valid);
        let missing: Vec<_> = report.of_kind(IssueKind::Missing).collect();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].severity, Severity::Warning);
        assert_eq!(report.stats.healthy_plugins, 0);
    }

    #[test]
    fn orphaned_directory_detected() {
        let (_dir, root) = root_with_framework();
        std::fs::create_dir_all(root.join("add-ons/stray")).unwrap();
        std::fs::create_dir_all(root.join("extensions/.cache")).unwrap();
        let v = RegistryValidator::new(&root);
        assert_eq!(v.get_orphaned_plugins(), vec!["add-ons/stray".to_string()]);
        let report = v.validate();
        assert_eq!(report.stats.orphaned_plugins, 1);
        assert!(!report.valid);
    }

    #[test]
    fn invalid_ref_iff_parent_unresolved() {
        let dir = TempDir::new().unwrap();
        let mut r = Registry::default();
        r.put(entry("fw", PluginType::Framework, None));
        r.put(entry("good", PluginType::AddOn, Some("fw")));
        r.put(entry("bad", PluginType::AddOn, Some("gone")));
        r.put(entry("to-addon", PluginType::Extension, Some("good")));
        r.put(entry("free", PluginType::Extension, None));
        r.save(dir.path()).unwrap();

        let report = RegistryValidator::new(dir.path())
            .with_options(ValidateOptions {
                check_filesystem: false,
                ..ValidateOptions::default()
            })
            .validate();
        let mut bad: Vec<&str> = report
            .of_kind(IssueKind::InvalidRef)
            .map(|i| i.plugin_id.as_str())
            .collect();
        bad.sort();
        assert_eq!(bad, vec!["bad", "to-addon"]);
        assert_eq!(report.stats.invalid_refs, 2);
        assert!(report.of_kind(IssueKind::Missing).next().is_none());
    }

    #[test]
    fn narrowed_checks_skip_categories() {
        let dir = TempDir::new().unwrap();
        let mut r = Registry::default();
        r.put(entry("bad", PluginType::AddOn, Some("gone")));
        r.save(dir.path()).unwrap();
        let report = RegistryValidator::new(dir.path())
            .with_options(ValidateOptions {
                check_framework_refs: false,
                ..ValidateOptions::default()
            })
            .validate();
        assert!(report.of_kind(IssueKind::InvalidRef).next().is_none());
        assert!(report.of_kind(IssueKind::Missing).next().is_some());
    }

    #[test]
    fn stale_health_uses_threshold() {
        let (_dir, root) = root_with_framework();
        Registry::update(&root, "sdlc-complete", |e| {
            e.health = Some(PluginHealth {
                status: HealthStatus::Healthy,
                last_check: Utc::now() - Duration::hours(30),
                issues: Vec::new(),
            });
        })
        .unwrap();

        let default = RegistryValidator::new(&root).validate();
        assert_eq!(default.of_kind(IssueKind::StaleHealth).count(), 1);
        assert!(default.valid);

        let lenient = RegistryValidator::new(&root)
            .with_options(ValidateOptions {
                stale_after: Duration::hours(48),
                ..ValidateOptions::default()
            })
            .validate();
        assert_eq!(lenient.of_kind(IssueKind::StaleHealth).count(), 0);
    }
}
