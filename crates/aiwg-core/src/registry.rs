//! The registry document of record: `{root}/registry.json`.
//!
//! Every call reads or writes disk; nothing is cached between calls.

use crate::error::{AiwgError, Result};
use crate::paths;
use crate::types::{HealthStatus, PluginType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

pub const REGISTRY_VERSION: &str = "1.0";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginHealth {
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub plugin_type: PluginType,
    pub name: String,
    pub version: String,
    /// Relative to the plugin root.
    pub path: String,
    pub installed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_framework: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<PluginHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    pub version: String,
    pub last_modified: DateTime<Utc>,
    pub plugins: Vec<PluginEntry>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            version: REGISTRY_VERSION.to_string(),
            last_modified: Utc::now(),
            plugins: Vec::new(),
        }
    }
}

impl Registry {
    // ---------------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------------

    /// Read the registry, returning an empty one when the file is absent or
    /// unreadable. Malformed entries, and entries whose id or path could
    /// reach outside the root, are dropped individually.
    pub fn load(root: &Path) -> Self {
        let path = paths::registry_path(root);
        if !path.exists() {
            return Self::default();
        }
        let data = match std::fs::read_to_string(&path) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "registry unreadable, using empty registry");
                return Self::default();
            }
        };
        let raw: Value = match serde_json::from_str(&data) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "registry is not valid JSON, using empty registry");
                return Self::default();
            }
        };
        Self::from_value(raw)
    }

    fn from_value(raw: Value) -> Self {
        let mut registry = Self::default();
        if let Some(v) = raw.get("version").and_then(Value::as_str) {
            registry.version = v.to_string();
        }
        if let Some(ts) = raw
            .get("lastModified")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        {
            registry.last_modified = ts.with_timezone(&Utc);
        }
        let Some(plugins) = raw.get("plugins").and_then(Value::as_array) else {
            return registry;
        };
        for item in plugins {
            match serde_json::from_value::<PluginEntry>(item.clone()) {
                Ok(entry) if !paths::is_valid_id(&entry.id) => {
                    tracing::warn!(id = %entry.id, "registry entry with invalid id ignored");
                }
                Ok(entry) if !paths::is_contained_rel_path(&entry.path) => {
                    tracing::warn!(id = %entry.id, path = %entry.path, "registry entry with path outside the root ignored");
                }
                Ok(entry) if registry.contains(&entry.id) => {
                    tracing::warn!(id = %entry.id, "duplicate registry entry ignored");
                }
                Ok(entry) => registry.plugins.push(entry),
                Err(e) => tracing::warn!(error = %e, "malformed registry entry ignored"),
            }
        }
        registry
    }

    /// Overwrite `registry.json`, stamping `last_modified`.
    pub fn save(&mut self, root: &Path) -> Result<()> {
        self.last_modified = Utc::now();
        let data = serde_json::to_string_pretty(self)?;
        crate::io::atomic_write(&paths::registry_path(root), data.as_bytes())
    }

    // ---------------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------------

    pub fn get(&self, id: &str) -> Option<&PluginEntry> {
        self.plugins.iter().find(|p| p.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn list_by_type(&self, plugin_type: PluginType) -> Vec<&PluginEntry> {
        self.plugins
            .iter()
            .filter(|p| p.plugin_type == plugin_type)
            .collect()
    }

    /// True if `id` names an installed framework.
    pub fn has_framework(&self, id: &str) -> bool {
        self.get(id)
            .is_some_and(|p| p.plugin_type == PluginType::Framework)
    }

    // ---------------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------------

    /// Insert `entry`, replacing any entry with the same id in place.
    pub fn put(&mut self, entry: PluginEntry) {
        match self.plugins.iter_mut().find(|p| p.id == entry.id) {
            Some(existing) => *existing = entry,
            None => self.plugins.push(entry),
        }
    }

    pub fn take(&mut self, id: &str) -> Option<PluginEntry> {
        let pos = self.plugins.iter().position(|p| p.id == id)?;
        Some(self.plugins.remove(pos))
    }

    pub fn modify(&mut self, id: &str, f: impl FnOnce(&mut PluginEntry)) -> Result<()> {
        let entry = self
            .plugins
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| AiwgError::PluginNotFound(id.to_string()))?;
        f(entry);
        Ok(())
    }

    // ---------------------------------------------------------------------------
    // Read-modify-write helpers
    // ---------------------------------------------------------------------------

    pub fn upsert(root: &Path, entry: PluginEntry) -> Result<()> {
        let mut registry = Self::load(root);
        registry.put(entry);
        registry.save(root)
    }

    pub fn remove(root: &Path, id: &str) -> Result<Option<PluginEntry>> {
        let mut registry = Self::load(root);
        let removed = registry.take(id);
        if removed.is_some() {
            registry.save(root)?;
        }
        Ok(removed)
    }

    /// Update an existing entry. Errors with `PluginNotFound` if `id` is not
    /// registered; the file is left untouched in that case.
    pub fn update(root: &Path, id: &str, f: impl FnOnce(&mut PluginEntry)) -> Result<()> {
        let mut registry = Self::load(root);
        registry.modify(id, f)?;
        registry.save(root)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    pub(crate) fn entry(id: &str, plugin_type: PluginType, parent: Option<&str>) -> PluginEntry {
        PluginEntry {
            id: id.to_string(),
            plugin_type,
            name: id.to_string(),
            version: "1.0.0".to_string(),
            path: paths::content_rel_path(plugin_type, id),
            installed_at: Utc::now(),
            parent_framework: parent.map(str::to_string),
            health: None,
        }
    }

    #[test]
    fn absent_file_loads_default() {
        let dir = TempDir::new().unwrap();
        let r = Registry::load(dir.path());
        assert!(r.plugins.is_empty());
        assert_eq!(r.version, REGISTRY_VERSION);
        assert!(!paths::registry_path(dir.path()).exists());
    }

    #[test]
    fn garbage_file_loads_default() {
        let dir = TempDir::new().unwrap();
        std::fs::write(paths::registry_path(dir.path()), "{{{ nope").unwrap();
        assert!(Registry::load(dir.path()).plugins.is_empty());
    }

    #[test]
    fn malformed_entries_are_dropped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            paths::registry_path(dir.path()),
            r#"{"version": "1.0", "lastModified": "2026-01-01T00:00:00Z", "plugins": [
                {"id": "ok", "type": "framework", "name": "Ok", "version": "1.0.0",
                 "path": "frameworks/ok/repo", "installedAt": "2026-01-01T00:00:00Z"},
                {"id": "bad", "type": "mystery"}
            ]}"#,
        )
        .unwrap();
        let r = Registry::load(dir.path());
        assert_eq!(r.plugins.len(), 1);
        assert_eq!(r.plugins[0].id, "ok");
    }

    #[test]
    fn entries_escaping_the_root_are_dropped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            paths::registry_path(dir.path()),
            r#"{"version": "1.0", "lastModified": "2026-01-01T00:00:00Z", "plugins": [
                {"id": "ok", "type": "framework", "name": "Ok", "version": "1.0.0",
                 "path": "frameworks/ok/repo", "installedAt": "2026-01-01T00:00:00Z"},
                {"id": "../add-ons", "type": "framework", "name": "x", "version": "1.0.0",
                 "path": "frameworks/x/repo", "installedAt": "2026-01-01T00:00:00Z"},
                {"id": "sneaky", "type": "extension", "name": "x", "version": "1.0.0",
                 "path": "../../etc", "installedAt": "2026-01-01T00:00:00Z"}
            ]}"#,
        )
        .unwrap();
        let r = Registry::load(dir.path());
        let ids: Vec<&str> = r.plugins.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["ok"]);
    }

    #[test]
    fn save_writes_camel_case() {
        let dir = TempDir::new().unwrap();
        let mut r = Registry::default();
        r.put(entry("gdpr", PluginType::AddOn, Some("sdlc-complete")));
        r.save(dir.path()).unwrap();
        let raw = std::fs::read_to_string(paths::registry_path(dir.path())).unwrap();
        assert!(raw.contains("\"lastModified\""));
        assert!(raw.contains("\"parentFramework\": \"sdlc-complete\""));
        assert!(raw.contains("\"type\": \"add-on\""));
    }

    #[test]
    fn upsert_replaces_in_place() {
        let dir = TempDir::new().unwrap();
        Registry::upsert(dir.path(), entry("a", PluginType::Framework, None)).unwrap();
        Registry::upsert(dir.path(), entry("b", PluginType::Extension, None)).unwrap();
        let mut a2 = entry("a", PluginType::Framework, None);
        a2.version = "2.0.0".to_string();
        Registry::upsert(dir.path(), a2).unwrap();
        let r = Registry::load(dir.path());
        assert_eq!(r.plugins.len(), 2);
        assert_eq!(r.plugins[0].id, "a");
        assert_eq!(r.plugins[0].version, "2.0.0");
    }

    #[test]
    fn remove_returns_entry() {
        let dir = TempDir::new().unwrap();
        Registry::upsert(dir.path(), entry("a", PluginType::Framework, None)).unwrap();
        assert!(Registry::remove(dir.path(), "a").unwrap().is_some());
        assert!(Registry::remove(dir.path(), "a").unwrap().is_none());
        assert!(Registry::load(dir.path()).plugins.is_empty());
    }

    #[test]
    fn update_missing_entry_errors() {
        let dir = TempDir::new().unwrap();
        let err = Registry::update(dir.path(), "ghost", |_| {}).unwrap_err();
        assert!(matches!(err, AiwgError::PluginNotFound(id) if id == "ghost"));
    }

    #[test]
    fn list_by_type_filters() {
        let mut r = Registry::default();
        r.put(entry("fw", PluginType::Framework, None));
        r.put(entry("ad", PluginType::AddOn, Some("fw")));
        assert_eq!(r.list_by_type(PluginType::AddOn).len(), 1);
        assert!(r.has_framework("fw"));
        assert!(!r.has_framework("ad"));
    }
}
