use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiwgError {
    #[error("unknown framework: {0}")]
    UnknownFramework(String),

    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    #[error("invalid plugin id '{0}': must be lowercase kebab-case")]
    InvalidPluginId(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("no backup found for migration '{0}'")]
    BackupNotFound(String),

    #[error("source path does not exist: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("could not acquire registry lock at {}: {reason}", .path.display())]
    Lock { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AiwgError>;
