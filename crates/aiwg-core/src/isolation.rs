//! Namespace resolution and access control for framework-scoped workspaces.
//!
//! A scoped workspace has one directory per framework plus `shared/`. Artifact
//! categories every framework reads (requirements, architecture, ...) belong
//! in `shared/`; agent definitions, commands, memory and framework settings
//! belong to exactly one framework and must never land in `shared/`.

use crate::error::{AiwgError, Result};
use crate::paths::{self, SHARED_NAMESPACE};
use crate::registry::Registry;
use crate::types::{PluginType, Severity};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

/// Artifact categories visible to every framework.
pub const SHARED_CATEGORIES: &[&str] = &[
    "intake",
    "requirements",
    "architecture",
    "planning",
    "risks",
    "testing",
    "deployment",
    "security",
    "quality",
    "management",
    "decisions",
    "handoffs",
    "gates",
    "reports",
];

/// Directory names that are private to a single framework.
pub const PRIVATE_CATEGORIES: &[&str] = &[
    "agents", "commands", "memory", "skills", "hooks", "rules", "prompts", "working",
];

/// File names that are framework configuration, private wherever they appear.
pub const PRIVATE_FILES: &[&str] = &[
    "settings.json",
    "settings.local.json",
    "config.json",
    "CLAUDE.md",
    "AGENTS.md",
    ".cursorrules",
];

/// Top-level workspace entries that are infrastructure, not namespaces.
pub const RESERVED_ENTRIES: &[&str] = &[
    SHARED_NAMESPACE,
    paths::BACKUPS_DIR,
    paths::FRAMEWORKS_DIR,
    "archive",
    paths::REGISTRY_FILE,
];

fn first_component(rel: &str) -> Option<&str> {
    rel.split(['/', '\\'])
        .find(|s| !s.is_empty() && *s != "." && *s != "..")
}

/// Strip leading separators and drop `.`/`..` components.
fn normalize(resource: &str) -> String {
    let cleaned = resource.trim_start_matches(['/', '\\']).replace('\\', "/");
    Path::new(&cleaned)
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// True if `rel` is rooted at a shared artifact category.
pub fn is_shared_resource(rel: &str) -> bool {
    first_component(rel).is_some_and(|c| SHARED_CATEGORIES.contains(&c))
}

/// True if `rel` is framework-private: a private category directory or a
/// framework configuration file at any depth.
pub fn is_private_resource(rel: &str) -> bool {
    let norm = normalize(rel);
    if first_component(&norm).is_some_and(|c| PRIVATE_CATEGORIES.contains(&c)) {
        return true;
    }
    norm.rsplit('/')
        .next()
        .is_some_and(|name| PRIVATE_FILES.contains(&name))
}

// ---------------------------------------------------------------------------
// Isolation report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationIssueKind {
    Contamination,
    UnknownNamespace,
}

#[derive(Debug, Clone, Serialize)]
pub struct IsolationIssue {
    pub kind: IsolationIssueKind,
    pub severity: Severity,
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IsolationReport {
    pub valid: bool,
    pub issues: Vec<IsolationIssue>,
}

// ---------------------------------------------------------------------------
// FrameworkIsolator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FrameworkIsolator {
    base: PathBuf,
    frameworks: BTreeSet<String>,
}

impl FrameworkIsolator {
    /// Isolator over `base` whose per-framework namespaces are `frameworks`.
    pub fn new<I, S>(base: impl Into<PathBuf>, frameworks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            base: base.into(),
            frameworks: frameworks.into_iter().map(Into::into).collect(),
        }
    }

    /// Isolator whose namespaces are the frameworks installed under `root`.
    pub fn from_registry(root: &Path, base: impl Into<PathBuf>) -> Self {
        let registry = Registry::load(root);
        let ids = registry
            .list_by_type(PluginType::Framework)
            .into_iter()
            .map(|e| e.id.clone())
            .collect::<Vec<_>>();
        Self::new(base, ids)
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn frameworks(&self) -> impl Iterator<Item = &str> {
        self.frameworks.iter().map(String::as_str)
    }

    pub fn is_known(&self, namespace: &str) -> bool {
        namespace == SHARED_NAMESPACE || self.frameworks.contains(namespace)
    }

    /// Resolve `resource` under `framework`'s namespace (or `shared`).
    pub fn get_framework_path(&self, framework: &str, resource: Option<&str>) -> Result<PathBuf> {
        if !self.is_known(framework) {
            return Err(AiwgError::UnknownFramework(framework.to_string()));
        }
        let dir = self.base.join(framework);
        Ok(match resource.map(normalize) {
            Some(r) if !r.is_empty() => dir.join(r),
            _ => dir,
        })
    }

    /// True iff `resource` (relative to the base) lies in `shared/` or in
    /// `framework`'s own namespace.
    pub fn can_access(&self, framework: &str, resource: &str) -> bool {
        match first_component(resource) {
            Some(ns) => ns == SHARED_NAMESPACE || ns == framework,
            None => false,
        }
    }

    pub fn can_read(&self, framework: &str, resource: &str) -> bool {
        self.can_access(framework, resource)
    }

    pub fn can_write(&self, framework: &str, resource: &str) -> bool {
        self.can_access(framework, resource)
    }

    /// Compute where an artifact at `rel` belongs for `framework`: shared
    /// categories go to `shared/`, everything else to the framework's own
    /// namespace. Private content is never routed into `shared/`.
    pub fn route(&self, framework: &str, rel: &str) -> Result<PathBuf> {
        if is_shared_resource(rel) && !is_private_resource(rel) {
            self.get_framework_path(SHARED_NAMESPACE, Some(rel))
        } else {
            self.get_framework_path(framework, Some(rel))
        }
    }

    /// Scan the base for private content under `shared/` and for top-level
    /// directories that are neither known namespaces nor infrastructure.
    pub fn validate_isolation(&self) -> Result<IsolationReport> {
        let mut issues = Vec::new();

        let shared = self.base.join(SHARED_NAMESPACE);
        for rel in crate::io::list_files(&shared, &[])? {
            let rel = crate::io::to_slash(&rel);
            if is_private_resource(&rel) {
                issues.push(IsolationIssue {
                    kind: IsolationIssueKind::Contamination,
                    severity: Severity::Error,
                    path: format!("{SHARED_NAMESPACE}/{rel}"),
                    message: "framework-private resource found in shared namespace".to_string(),
                });
            }
        }

        if self.base.is_dir() {
            let mut names = Vec::new();
            for entry in std::fs::read_dir(&self.base)? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    names.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
            names.sort();
            for name in names {
                if self.is_known(&name)
                    || RESERVED_ENTRIES.contains(&name.as_str())
                    || SHARED_CATEGORIES.contains(&name.as_str())
                    || PRIVATE_CATEGORIES.contains(&name.as_str())
                {
                    continue;
                }
                issues.push(IsolationIssue {
                    kind: IsolationIssueKind::UnknownNamespace,
                    severity: Severity::Warning,
                    message: format!("'{name}' is not a known framework namespace"),
                    path: name,
                });
            }
        }

        let valid = !issues
            .iter()
            .any(|i| i.kind == IsolationIssueKind::Contamination);
        Ok(IsolationReport { valid, issues })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
