//! Plugin source descriptors.
//!
//! A plugin source directory carries either `manifest.json` or a
//! `manifest.md` whose YAML frontmatter holds the same fields. Both are parsed
//! into an untyped value first, checked field by field, and only then
//! converted into [`PluginManifest`].

use crate::paths;
use crate::types::PluginType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    pub id: String,
    #[serde(rename = "type")]
    pub plugin_type: PluginType,
    pub name: String,
    pub version: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_framework: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Json,
    Markdown,
}

impl ManifestFormat {
    pub fn filename(self) -> &'static str {
        match self {
            ManifestFormat::Json => paths::MANIFEST_JSON,
            ManifestFormat::Markdown => paths::MANIFEST_MD,
        }
    }
}

/// Result of checking raw manifest text.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ManifestCheck {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PluginManifest>,
}

/// Result of validating a plugin source directory.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PluginValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PluginManifest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_path: Option<PathBuf>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Locate the manifest in `dir`, preferring `manifest.json`.
pub fn find_manifest(dir: &Path) -> Option<(PathBuf, ManifestFormat)> {
    [ManifestFormat::Json, ManifestFormat::Markdown]
        .into_iter()
        .map(|f| (dir.join(f.filename()), f))
        .find(|(p, _)| p.is_file())
}

/// Extract the YAML content between the first pair of `---` delimiters.
fn extract_frontmatter(content: &str) -> Option<&str> {
    let rest = content.strip_prefix("---")?;
    let rest = if let Some(r) = rest.strip_prefix('\n') {
        r
    } else if let Some(r) = rest.strip_prefix("\r\n") {
        r
    } else {
        return None;
    };
    let end = rest.find("\n---")?;
    Some(&rest[..end])
}

fn parse_raw(raw: &str, format: ManifestFormat) -> Result<Value, String> {
    match format {
        ManifestFormat::Json => serde_json::from_str(raw).map_err(|e| e.to_string()),
        ManifestFormat::Markdown => {
            let fm = extract_frontmatter(raw)
                .ok_or_else(|| "manifest.md has no YAML frontmatter".to_string())?;
            let yaml: serde_yaml::Value = serde_yaml::from_str(fm).map_err(|e| e.to_string())?;
            serde_json::to_value(yaml).map_err(|e| e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Checking
// ---------------------------------------------------------------------------

fn require_string<'a>(obj: &'a Map<String, Value>, field: &str, errors: &mut Vec<String>) -> Option<&'a str> {
    match obj.get(field) {
        None | Some(Value::Null) => {
            errors.push(format!("Missing required field: {field}"));
            None
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            errors.push(format!("Field '{field}' must not be empty"));
            None
        }
        Some(Value::String(s)) => Some(s.as_str()),
        Some(_) => {
            errors.push(format!("Field '{field}' must be a string"));
            None
        }
    }
}

/// Check raw manifest text. Never fails: problems are reported in the result.
pub fn check_manifest(raw: &str, format: ManifestFormat) -> ManifestCheck {
    let mut check = ManifestCheck::default();

    let value = match parse_raw(raw, format) {
        Ok(v) => v,
        Err(e) => {
            check.errors.push(format!("Failed to parse manifest: {e}"));
            return check;
        }
    };
    let Some(obj) = value.as_object() else {
        check.errors.push("Manifest must be an object".to_string());
        return check;
    };
    let errors = &mut check.errors;

    if let Some(id) = require_string(obj, "id", errors) {
        if !paths::is_valid_id(id) {
            errors.push(format!(
                "Invalid id '{id}': must be lowercase kebab-case (e.g. sdlc-complete)"
            ));
        }
    }
    require_string(obj, "name", errors);
    require_string(obj, "description", errors);
    if let Some(version) = require_string(obj, "version", errors) {
        if !paths::is_valid_semver(version) {
            errors.push(format!("Invalid version '{version}': must be semver (e.g. 1.0.0)"));
        }
    }

    let plugin_type = require_string(obj, "type", errors).and_then(|t| match t.parse::<PluginType>() {
        Ok(pt) => Some(pt),
        Err(_) => {
            errors.push(format!(
                "Invalid type '{t}': must be one of framework, add-on, extension"
            ));
            None
        }
    });

    match obj.get("parentFramework") {
        None | Some(Value::Null) => {
            if plugin_type == Some(PluginType::AddOn) {
                errors.push("Add-on plugins must declare parentFramework".to_string());
            }
        }
        Some(Value::String(parent)) => {
            if !paths::is_valid_id(parent) {
                errors.push(format!("Invalid parentFramework '{parent}'"));
            }
            if plugin_type == Some(PluginType::Framework) {
                check
                    .warnings
                    .push("parentFramework is ignored for framework plugins".to_string());
            }
        }
        Some(_) => errors.push("Field 'parentFramework' must be a string".to_string()),
    }

    match obj.get("files") {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            if items.iter().any(|i| !i.is_string()) {
                errors.push("Field 'files' must be an array of strings".to_string());
            }
        }
        Some(_) => errors.push("Field 'files' must be an array of strings".to_string()),
    }

    match obj.get("dependencies") {
        None | Some(Value::Null) => {}
        Some(Value::Object(deps)) => {
            for (dep, range) in deps {
                match range.as_str() {
                    Some(r) if paths::is_valid_semver_range(r) => {}
                    Some(r) => errors.push(format!("Dependency '{dep}' has invalid version range '{r}'")),
                    None => errors.push(format!("Dependency '{dep}' must map to a version range string")),
                }
            }
        }
        Some(_) => errors.push("Field 'dependencies' must be a map of id to version range".to_string()),
    }

    if !check.errors.is_empty() {
        return check;
    }

    match serde_json::from_value::<PluginManifest>(value) {
        Ok(m) => {
            check.valid = true;
            check.manifest = Some(m);
        }
        Err(e) => check.errors.push(format!("Failed to read manifest: {e}")),
    }
    check
}

/// Validate a plugin source directory: manifest presence, parseability,
/// field shapes, and declared files.
pub fn validate_plugin(source_dir: &Path) -> PluginValidation {
    let mut result = PluginValidation::default();

    if !source_dir.is_dir() {
        result
            .errors
            .push(format!("Source directory not found: {}", source_dir.display()));
        return result;
    }

    let Some((path, format)) = find_manifest(source_dir) else {
        result.errors.push(format!(
            "No manifest.json or manifest.md found in {}",
            source_dir.display()
        ));
        return result;
    };

    let raw = match std::fs::read_to_string(&path) {
        Ok(r) => r,
        Err(e) => {
            result.errors.push(format!("Failed to read {}: {e}", path.display()));
            return result;
        }
    };

    let check = check_manifest(&raw, format);
    result.errors = check.errors;
    result.warnings = check.warnings;
    result.manifest_path = Some(path);

    if let Some(manifest) = check.manifest {
        for file in manifest.files.iter().flatten() {
            if !source_dir.join(file).exists() {
                result
                    .warnings
                    .push(format!("Declared file not found in source: {file}"));
            }
        }
        result.manifest = Some(manifest);
    }
    result.valid = result.errors.is_empty() && result.manifest.is_some();
    result
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
