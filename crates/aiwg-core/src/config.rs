use crate::error::Result;
use crate::paths;
use crate::types::ConflictStrategy;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Tool settings read from `{root}/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Health checks older than this are reported as stale.
    #[serde(default = "default_stale_health_hours")]
    pub stale_health_hours: u64,
    /// Snapshot the source tree before migrations unless told otherwise.
    #[serde(default = "default_backup_before_migrate")]
    pub backup_before_migrate: bool,
    #[serde(default)]
    pub conflict_strategy: ConflictStrategy,
}

/// Ten years; anything larger disables staleness in practice.
const MAX_STALE_HEALTH_HOURS: u64 = 24 * 365 * 10;

fn default_stale_health_hours() -> u64 {
    24
}

fn default_backup_before_migrate() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stale_health_hours: default_stale_health_hours(),
            backup_before_migrate: default_backup_before_migrate(),
            conflict_strategy: ConflictStrategy::default(),
        }
    }
}

impl Config {
    /// Load `{root}/config.yaml`, falling back to defaults when it is absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&data)?)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&paths::config_path(root), data.as_bytes())
    }

    /// Saturates at `TimeDelta::MAX` for thresholds chrono cannot represent.
    pub fn stale_after(&self) -> chrono::Duration {
        i64::try_from(self.stale_health_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .unwrap_or(chrono::TimeDelta::MAX)
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        if self.stale_health_hours == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "stale_health_hours is 0: every health check will be reported stale"
                    .to_string(),
            });
        }
        if self.stale_health_hours > MAX_STALE_HEALTH_HOURS {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "stale_health_hours is {}: health checks will effectively never be stale",
                    self.stale_health_hours
                ),
            });
        }
        if self.conflict_strategy == ConflictStrategy::Manual {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "conflict_strategy 'manual' leaves differing duplicates unmerged"
                    .to_string(),
            });
        }
        if !self.backup_before_migrate {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "backup_before_migrate is off: migrations cannot be rolled back"
                    .to_string(),
            });
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::load(dir.path()).unwrap();
        assert_eq!(cfg.stale_health_hours, 24);
        assert!(cfg.backup_before_migrate);
        assert_eq!(cfg.conflict_strategy, ConflictStrategy::KeepNewest);
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.yaml"),
            "stale_health_hours: 6\nconflict_strategy: overwrite\n",
        )
        .unwrap();
        let cfg = Config::load(dir.path()).unwrap();
        assert_eq!(cfg.stale_health_hours, 6);
        assert_eq!(cfg.conflict_strategy, ConflictStrategy::Overwrite);
        assert!(cfg.backup_before_migrate);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "stale_health_hours: [").unwrap();
        assert!(Config::load(dir.path()).is_err());
    }

    #[test]
    fn zero_threshold_warns() {
        let cfg = Config {
            stale_health_hours: 0,
            ..Config::default()
        };
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].level, WarnLevel::Warning);
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let cfg = Config {
            stale_health_hours: 48,
            ..Config::default()
        };
        cfg.save(dir.path()).unwrap();
        assert_eq!(Config::load(dir.path()).unwrap().stale_health_hours, 48);
    }

    #[test]
    fn huge_threshold_saturates_and_warns() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.yaml"),
            "stale_health_hours: 9223372036854775807\n",
        )
        .unwrap();
        let cfg = Config::load(dir.path()).unwrap();
        assert_eq!(cfg.stale_after(), chrono::TimeDelta::MAX);
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("never be stale"));

        let max = Config {
            stale_health_hours: u64::MAX,
            ..Config::default()
        };
        assert_eq!(max.stale_after(), chrono::TimeDelta::MAX);
        assert_eq!(Config::default().stale_after(), chrono::Duration::hours(24));
    }
}
