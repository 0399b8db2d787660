//! Read-only health and summary reporting over the registry and disk.

use crate::config::Config;
use crate::error::Result;
use crate::manifest;
use crate::paths;
use crate::registry::{PluginEntry, PluginHealth, Registry};
use crate::types::{HealthStatus, PluginType};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallMode {
    /// No top-level `frameworks/` directory.
    Legacy,
    Scoped,
}

impl InstallMode {
    pub fn as_str(self) -> &'static str {
        match self {
            InstallMode::Legacy => "legacy",
            InstallMode::Scoped => "scoped",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginReport {
    pub id: String,
    #[serde(rename = "type")]
    pub plugin_type: PluginType,
    pub name: String,
    pub version: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_framework: Option<String>,
    pub health: HealthStatus,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_health: BTreeMap<String, usize>,
    pub mode: InstallMode,
}

#[derive(Debug, Clone)]
pub struct PluginStatus {
    root: PathBuf,
    stale_after: Duration,
}

impl PluginStatus {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            stale_after: Duration::hours(24),
        }
    }

    pub fn from_config(root: impl Into<PathBuf>, cfg: &Config) -> Self {
        Self {
            root: root.into(),
            stale_after: cfg.stale_after(),
        }
    }

    /// Probe the filesystem for one entry and derive its health.
    pub fn derive(&self, registry: &Registry, entry: &PluginEntry) -> PluginReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let dir = self.root.join(&entry.path);

        if !dir.is_dir() {
            errors.push(format!("Directory {} is missing", entry.path));
        } else if manifest::find_manifest(&dir).is_none() {
            warnings.push("Manifest is missing".to_string());
        }

        match entry.plugin_type {
            PluginType::Framework => {
                if !paths::framework_projects_dir(&self.root, &entry.id).is_dir() {
                    warnings.push("projects/ directory is missing".to_string());
                }
            }
            PluginType::AddOn => match entry.parent_framework.as_deref() {
                Some(parent) if registry.has_framework(parent) => {}
                Some(parent) => errors.push(format!("Parent framework '{parent}' is not installed")),
                None => errors.push("No parent framework declared".to_string()),
            },
            PluginType::Extension => {}
        }

        if let Some(h) = &entry.health {
            if Utc::now() - h.last_check > self.stale_after {
                warnings.push("Health check is stale".to_string());
            }
        }

        let health = if !errors.is_empty() {
            HealthStatus::Error
        } else if !warnings.is_empty() {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };
        errors.extend(warnings);

        PluginReport {
            id: entry.id.clone(),
            plugin_type: entry.plugin_type,
            name: entry.name.clone(),
            version: entry.version.clone(),
            path: entry.path.clone(),
            parent_framework: entry.parent_framework.clone(),
            health,
            issues: errors,
        }
    }

    pub fn get(&self, id: &str) -> Option<PluginReport> {
        let registry = Registry::load(&self.root);
        registry.get(id).map(|e| self.derive(&registry, e))
    }

    pub fn list(&self) -> Vec<PluginReport> {
        let registry = Registry::load(&self.root);
        registry
            .plugins
            .iter()
            .map(|e| self.derive(&registry, e))
            .collect()
    }

    pub fn mode(&self) -> InstallMode {
        if self.root.join(paths::FRAMEWORKS_DIR).is_dir() {
            InstallMode::Scoped
        } else {
            InstallMode::Legacy
        }
    }

    pub fn summary(&self) -> StatusSummary {
        let reports = self.list();
        let mut by_type = BTreeMap::new();
        let mut by_health = BTreeMap::new();
        for r in &reports {
            *by_type.entry(r.plugin_type.to_string()).or_insert(0) += 1;
            *by_health.entry(r.health.to_string()).or_insert(0) += 1;
        }
        StatusSummary {
            total: reports.len(),
            by_type,
            by_health,
            mode: self.mode(),
        }
    }
}

/// Derive every entry's health and persist it to the registry.
///
/// This is the only place health is written; reads never mutate.
pub fn record_health(root: &std::path::Path, cfg: &Config) -> Result<Vec<PluginReport>> {
    crate::lock::with_root_lock(root, || -> Result<Vec<PluginReport>> {
        let status = PluginStatus::from_config(root, cfg);
        // Judge staleness on the previous timestamp before overwriting it.
        let reports = status.list();
        let mut registry = Registry::load(root);
        let now = Utc::now();
        for report in &reports {
            registry.modify(&report.id, |e| {
                e.health = Some(PluginHealth {
                    status: report.health,
                    last_check: now,
                    issues: report.issues.clone(),
                });
            })?;
        }
        registry.save(root)?;
        tracing::info!(count = reports.len(), "recorded plugin health");
        Ok(reports)
    })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installer::tests::{addon_source, framework_source};
    use crate::installer::{InstallOptions, PluginInstaller};
    use tempfile::TempDir;

    fn root_with(addon_parent: Option<&str>) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        let installer = PluginInstaller::new(&root);
        let fw = dir.path().join("fw");
        framework_source(&fw, "sdlc-complete", "1.0.0");
        assert!(installer.install(&fw, InstallOptions::default()).success);
        if let Some(parent) = addon_parent {
            let addon = dir.path().join("addon");
            addon_source(&addon, "gdpr", parent);
            let opts = InstallOptions {
                skip_dependency_check: true,
                ..InstallOptions::default()
            };
            assert!(installer.install(&addon, opts).success);
        }
        (dir, root)
    }

    #[test]
    fn healthy_framework() {
        let (_dir, root) = root_with(None);
        let report = PluginStatus::new(&root).get("sdlc-complete").unwrap();
        assert_eq!(report.health, HealthStatus::Healthy);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn missing_projects_dir_warns() {
        let (_dir, root) = root_with(None);
        std::fs::remove_dir(root.join("frameworks/sdlc-complete/projects")).unwrap();
        let report = PluginStatus::new(&root).get("sdlc-complete").unwrap();
        assert_eq!(report.health, HealthStatus::Warning);
    }

    #[test]
    fn missing_directory_is_error() {
        let (_dir, root) = root_with(None);
        std::fs::remove_dir_all(root.join("frameworks/sdlc-complete/repo")).unwrap();
        let report = PluginStatus::new(&root).get("sdlc-complete").unwrap();
        assert_eq!(report.health, HealthStatus::Error);
    }

    #[test]
    fn addon_missing_parent_is_error() {
        let (_dir, root) = root_with(Some("ghost"));
        let report = PluginStatus::new(&root).get("gdpr").unwrap();
        assert_eq!(report.health, HealthStatus::Error);
        assert!(report.issues[0].contains("ghost"));
    }

    #[test]
    fn summary_counts_and_mode() {
        let (_dir, root) = root_with(Some("sdlc-complete"));
        let summary = PluginStatus::new(&root).summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.by_type.get("framework"), Some(&1));
        assert_eq!(summary.by_type.get("add-on"), Some(&1));
        assert_eq!(summary.by_health.get("healthy"), Some(&2));
        assert_eq!(summary.mode, InstallMode::Scoped);

        let empty = TempDir::new().unwrap();
        assert_eq!(PluginStatus::new(empty.path()).mode(), InstallMode::Legacy);
    }

    #[test]
    fn record_health_persists_status() {
        let (_dir, root) = root_with(Some("ghost"));
        let reports = record_health(&root, &Config::default()).unwrap();
        assert_eq!(reports.len(), 2);
        let registry = Registry::load(&root);
        let gdpr = registry.get("gdpr").unwrap().health.as_ref().unwrap();
        assert_eq!(gdpr.status, HealthStatus::Error);
        assert!(!gdpr.issues.is_empty());
        let fw = registry.get("sdlc-complete").unwrap().health.as_ref().unwrap();
        assert_eq!(fw.status, HealthStatus::Healthy);
    }
}
