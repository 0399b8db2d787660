use crate::error::{AiwgError, Result};
use crate::types::PluginType;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Plugin root layout
// ---------------------------------------------------------------------------

pub const REGISTRY_FILE: &str = "registry.json";
pub const CONFIG_FILE: &str = "config.yaml";
pub const LOCK_FILE: &str = ".aiwg.lock";

pub const FRAMEWORKS_DIR: &str = "frameworks";
pub const ADDONS_DIR: &str = "add-ons";
pub const EXTENSIONS_DIR: &str = "extensions";
pub const ARCHIVE_UNINSTALLED_DIR: &str = "archive/uninstalled";
pub const BACKUPS_DIR: &str = "backups";

pub const REPO_DIR: &str = "repo";
pub const PROJECTS_DIR: &str = "projects";

pub const MANIFEST_JSON: &str = "manifest.json";
pub const MANIFEST_MD: &str = "manifest.md";

// ---------------------------------------------------------------------------
// Project workspace layout
// ---------------------------------------------------------------------------

pub const WORKSPACE_DIR: &str = ".aiwg";
pub const SHARED_NAMESPACE: &str = "shared";
pub const BACKUP_DESCRIPTOR: &str = "backup.json";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn registry_path(root: &Path) -> PathBuf {
    root.join(REGISTRY_FILE)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn lock_path(root: &Path) -> PathBuf {
    root.join(LOCK_FILE)
}

/// Directory holding every plugin of a given type.
pub fn type_root(root: &Path, plugin_type: PluginType) -> PathBuf {
    root.join(type_dir_name(plugin_type))
}

pub fn type_dir_name(plugin_type: PluginType) -> &'static str {
    match plugin_type {
        PluginType::Framework => FRAMEWORKS_DIR,
        PluginType::AddOn => ADDONS_DIR,
        PluginType::Extension => EXTENSIONS_DIR,
    }
}

/// The plugin's own directory, removed as a whole on uninstall.
pub fn plugin_dir(root: &Path, plugin_type: PluginType, id: &str) -> PathBuf {
    type_root(root, plugin_type).join(id)
}

/// Relative path of the directory plugin files are copied into.
pub fn content_rel_path(plugin_type: PluginType, id: &str) -> String {
    match plugin_type {
        PluginType::Framework => format!("{FRAMEWORKS_DIR}/{id}/{REPO_DIR}"),
        PluginType::AddOn => format!("{ADDONS_DIR}/{id}"),
        PluginType::Extension => format!("{EXTENSIONS_DIR}/{id}"),
    }
}

pub fn framework_projects_dir(root: &Path, id: &str) -> PathBuf {
    root.join(FRAMEWORKS_DIR).join(id).join(PROJECTS_DIR)
}

pub fn archive_dir(root: &Path, id: &str) -> PathBuf {
    root.join(ARCHIVE_UNINSTALLED_DIR).join(id)
}

pub fn workspace_dir(project: &Path) -> PathBuf {
    project.join(WORKSPACE_DIR)
}

// ---------------------------------------------------------------------------
// Identifier validation
// ---------------------------------------------------------------------------

static ID_RE: OnceLock<Regex> = OnceLock::new();
static SEMVER_RE: OnceLock<Regex> = OnceLock::new();

fn id_re() -> &'static Regex {
    ID_RE.get_or_init(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").unwrap())
}

fn semver_re() -> &'static Regex {
    SEMVER_RE.get_or_init(|| {
        Regex::new(
            r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(-[0-9A-Za-z\-]+(\.[0-9A-Za-z\-]+)*)?(\+[0-9A-Za-z\-]+(\.[0-9A-Za-z\-]+)*)?$",
        )
        .unwrap()
    })
}

pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 64 && id_re().is_match(id)
}

pub fn validate_id(id: &str) -> Result<()> {
    if !is_valid_id(id) {
        return Err(AiwgError::InvalidPluginId(id.to_string()));
    }
    Ok(())
}

/// True for a non-empty relative path made only of normal components, so it
/// cannot name anything outside the directory it is joined onto.
pub fn is_contained_rel_path(rel: &str) -> bool {
    !rel.is_empty()
        && Path::new(rel)
            .components()
            .all(|c| matches!(c, std::path::Component::Normal(_)))
}

pub fn is_valid_semver(version: &str) -> bool {
    semver_re().is_match(version)
}

/// Accepts the range forms manifests use: `*`, `x`, exact versions, and
/// versions prefixed with `^`, `~`, `>=`, `<=`, `>`, `<` or `=`, optionally
/// space-separated for compound ranges.
pub fn is_valid_semver_range(range: &str) -> bool {
    let range = range.trim();
    if range == "*" || range == "x" || range == "latest" {
        return true;
    }
    !range.is_empty()
        && range.split_whitespace().all(|part| {
            let v = part.trim_start_matches(['^', '~', '>', '<', '=']);
            is_valid_semver(v) || is_partial_version(v)
        })
}

fn is_partial_version(v: &str) -> bool {
    let parts: Vec<&str> = v.split('.').collect();
    (1..=3).contains(&parts.len())
        && parts
            .iter()
            .all(|p| *p == "x" || *p == "*" || (!p.is_empty() && p.chars().all(|c| c.is_ascii_digit())))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
