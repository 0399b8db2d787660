use crate::io;
use crate::lock;
use crate::manifest::{self, PluginManifest};
use crate::paths;
use crate::registry::{PluginEntry, Registry};
use crate::txn::{self, Op, RegistryChange};
use crate::types::{Action, ActionType, PluginType};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Source entries never copied into an installation.
const SKIP_SOURCE_ENTRIES: &[&str] = &[".git", "node_modules", ".DS_Store"];

#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    pub force: bool,
    pub dry_run: bool,
    pub skip_dependency_check: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallResult {
    pub success: bool,
    pub plugin_id: String,
    pub version: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub actions: Vec<Action>,
}

impl InstallResult {
    fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.errors.push(error.into());
        self
    }
}

/// Installs plugins from a source directory into a plugin root.
#[derive(Debug, Clone)]
pub struct PluginInstaller {
    root: PathBuf,
}

impl PluginInstaller {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate a plugin source directory without installing it.
    pub fn validate_plugin(&self, source_dir: &Path) -> manifest::PluginValidation {
        manifest::validate_plugin(source_dir)
    }

    /// Install the plugin at `source_dir`. Never fails outright: every problem
    /// is reported through the returned [`InstallResult`].
    pub fn install(&self, source_dir: &Path, opts: InstallOptions) -> InstallResult {
        if opts.dry_run {
            return self.run(source_dir, opts);
        }
        match lock::with_root_lock(&self.root, || self.run(source_dir, opts)) {
            Ok(result) => result,
            Err(e) => InstallResult::default().failed(e.to_string()),
        }
    }

    fn run(&self, source_dir: &Path, opts: InstallOptions) -> InstallResult {
        let validation = manifest::validate_plugin(source_dir);
        let mut result = InstallResult {
            warnings: validation.warnings.clone(),
            ..InstallResult::default()
        };

        let manifest = match validation.manifest {
            Some(m) if validation.valid => m,
            _ => {
                result.errors = validation.errors;
                result.actions = vec![Action::planned(
                    ActionType::Validate,
                    format!("validate {}", source_dir.display()),
                )];
                return result;
            }
        };
        result.plugin_id = manifest.id.clone();
        result.version = manifest.version.clone();

        let registry = Registry::load(&self.root);
        if let Some(existing) = registry.get(&manifest.id) {
            if !opts.force {
                return result.failed(format!(
                    "Plugin '{}' is already installed (version {}). Use --force to reinstall.",
                    manifest.id, existing.version
                ));
            }
            result.warnings.push(format!(
                "Reinstalling '{}' (replacing version {})",
                manifest.id, existing.version
            ));
        }

        if let Err(e) = self.check_dependencies(&registry, &manifest, opts, &mut result.warnings) {
            return result.failed(e);
        }

        let ops = match self.plan(source_dir, &manifest) {
            Ok(ops) => ops,
            Err(e) => return result.failed(format!("Failed to plan installation: {e}")),
        };

        if opts.dry_run {
            result.actions = txn::preview(&self.root, &ops);
            result.success = true;
            return result;
        }

        let execution = txn::execute(&self.root, &ops);
        result.actions = execution.actions;
        if let Some(e) = execution.error {
            result.errors.push(e);
            result
                .errors
                .push(format!("Installation of '{}' rolled back", manifest.id));
            return result;
        }

        tracing::info!(id = %manifest.id, version = %manifest.version, "plugin installed");
        result.success = true;
        result
    }

    fn check_dependencies(
        &self,
        registry: &Registry,
        manifest: &PluginManifest,
        opts: InstallOptions,
        warnings: &mut Vec<String>,
    ) -> Result<(), String> {
        if opts.skip_dependency_check {
            if manifest.plugin_type == PluginType::AddOn || manifest.dependencies.is_some() {
                warnings.push("Dependency check skipped".to_string());
            }
            return Ok(());
        }
        if manifest.plugin_type == PluginType::AddOn {
            if let Some(parent) = &manifest.parent_framework {
                if !registry.has_framework(parent) {
                    return Err(format!(
                        "Parent framework '{parent}' is not installed. Install it first or use --skip-deps."
                    ));
                }
            }
        }
        for (dep, range) in manifest.dependencies.iter().flatten() {
            if !registry.contains(dep) {
                warnings.push(format!("Dependency '{dep}' ({range}) is not installed"));
            }
        }
        Ok(())
    }

    /// Build the ordered plan: validate, create-dir per missing directory
    /// level, copy-file per source file, update-registry.
    fn plan(&self, source_dir: &Path, manifest: &PluginManifest) -> crate::Result<Vec<Op>> {
        let content_rel = paths::content_rel_path(manifest.plugin_type, &manifest.id);
        let content_dir = self.root.join(&content_rel);
        let files = io::list_files(source_dir, SKIP_SOURCE_ENTRIES)?;

        let mut dirs: BTreeSet<PathBuf> = BTreeSet::new();
        let mut add_chain = |path: &Path| {
            let mut current = Some(path);
            while let Some(p) = current {
                if p == self.root || !p.starts_with(&self.root) {
                    break;
                }
                dirs.insert(p.to_path_buf());
                current = p.parent();
            }
        };
        add_chain(&content_dir);
        if manifest.plugin_type == PluginType::Framework {
            add_chain(&paths::framework_projects_dir(&self.root, &manifest.id));
        }
        for file in &files {
            if let Some(parent) = content_dir.join(file).parent() {
                add_chain(parent);
            }
        }

        let mut ops = vec![Op::Check {
            action_type: ActionType::Validate,
            detail: format!("{} {} ({})", manifest.id, manifest.version, manifest.plugin_type),
        }];
        ops.extend(dirs.into_iter().filter(|d| !d.exists()).map(Op::CreateDir));
        ops.extend(files.iter().map(|f| Op::CopyFile {
            from: source_dir.join(f),
            to: content_dir.join(f),
        }));
        ops.push(Op::UpdateRegistry(RegistryChange::Put(Box::new(PluginEntry {
            id: manifest.id.clone(),
            plugin_type: manifest.plugin_type,
            name: manifest.name.clone(),
            version: manifest.version.clone(),
            path: content_rel,
            installed_at: Utc::now(),
            parent_framework: manifest.parent_framework.clone(),
            health: None,
        }))));
        Ok(ops)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
