use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// PluginType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginType {
    Framework,
    AddOn,
    Extension,
}

impl PluginType {
    pub fn all() -> &'static [PluginType] {
        &[PluginType::Framework, PluginType::AddOn, PluginType::Extension]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PluginType::Framework => "framework",
            PluginType::AddOn => "add-on",
            PluginType::Extension => "extension",
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PluginType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "framework" => Ok(PluginType::Framework),
            "add-on" | "addon" => Ok(PluginType::AddOn),
            "extension" => Ok(PluginType::Extension),
            _ => Err(format!(
                "unknown plugin type '{s}' (expected framework, add-on or extension)"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionType {
    Validate,
    CreateDir,
    CopyFile,
    RemoveDir,
    CheckDeps,
    ArchiveProjects,
    UpdateRegistry,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::Validate => "validate",
            ActionType::CreateDir => "create-dir",
            ActionType::CopyFile => "copy-file",
            ActionType::RemoveDir => "remove-dir",
            ActionType::CheckDeps => "check-deps",
            ActionType::ArchiveProjects => "archive-projects",
            ActionType::UpdateRegistry => "update-registry",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One planned or executed step of an install or uninstall.
///
/// Dry-run previews and post-run reports share this shape; only `executed`
/// differs between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub executed: bool,
    pub detail: String,
}

impl Action {
    pub fn planned(action_type: ActionType, detail: impl Into<String>) -> Self {
        Self {
            action_type,
            executed: false,
            detail: detail.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Conflicts
// ---------------------------------------------------------------------------

/// How a conflicting path is (or would be) resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    Skip,
    Overwrite,
    #[default]
    KeepNewest,
    Manual,
}

impl ConflictStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            ConflictStrategy::Skip => "skip",
            ConflictStrategy::Overwrite => "overwrite",
            ConflictStrategy::KeepNewest => "keep-newest",
            ConflictStrategy::Manual => "manual",
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConflictStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(ConflictStrategy::Skip),
            "overwrite" => Ok(ConflictStrategy::Overwrite),
            "keep-newest" | "keep_newest" => Ok(ConflictStrategy::KeepNewest),
            "manual" => Ok(ConflictStrategy::Manual),
            _ => Err(format!("unknown conflict strategy '{s}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    File,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: ConflictKind,
    pub resolution: ConflictStrategy,
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// HealthStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Error,
    Unknown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Error => "error",
            HealthStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_type_serializes_kebab() {
        assert_eq!(
            serde_json::to_string(&PluginType::AddOn).unwrap(),
            "\"add-on\""
        );
        let t: PluginType = serde_json::from_str("\"framework\"").unwrap();
        assert_eq!(t, PluginType::Framework);
    }

    #[test]
    fn plugin_type_from_str() {
        assert_eq!("add-on".parse::<PluginType>().unwrap(), PluginType::AddOn);
        assert!("plugin".parse::<PluginType>().is_err());
    }

    #[test]
    fn action_serializes_with_type_key() {
        let a = Action::planned(ActionType::CreateDir, "frameworks/x");
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["type"], "create-dir");
        assert_eq!(v["executed"], false);
    }

    #[test]
    fn conflict_strategy_round_trips_through_str() {
        for s in ["skip", "overwrite", "keep-newest", "manual"] {
            let parsed: ConflictStrategy = s.parse().unwrap();
            assert_eq!(parsed.as_str(), s);
        }
    }
}
