use crate::io;
use crate::lock;
use crate::paths;
use crate::registry::{PluginEntry, Registry};
use crate::txn::{self, Op, RegistryChange};
use crate::types::{Action, ActionType, PluginType};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default)]
pub struct UninstallOptions {
    pub force: bool,
    pub dry_run: bool,
    pub keep_projects: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UninstallStats {
    pub files_removed: usize,
    pub dirs_removed: usize,
    pub projects_archived: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UninstallResult {
    pub success: bool,
    pub plugin_id: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub actions: Vec<Action>,
    pub stats: UninstallStats,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UninstallCheck {
    pub can_uninstall: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub warnings: Vec<String>,
}

/// Removes installed plugins, respecting add-ons that depend on a framework.
#[derive(Debug, Clone)]
pub struct PluginUninstaller {
    root: PathBuf,
}

impl PluginUninstaller {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Every registered plugin whose `parentFramework` is `id`.
    pub fn get_dependent_plugins(&self, id: &str) -> Vec<PluginEntry> {
        dependents_of(&Registry::load(&self.root), id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Ids to remove, in order, so that `id` can go: every dependent comes
    /// strictly before the plugin it depends on, and `id` is last.
    pub fn get_uninstall_order(&self, id: &str) -> Vec<String> {
        let registry = Registry::load(&self.root);
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        visit(&registry, id, &mut visited, &mut order);
        order
    }

    pub fn can_uninstall(&self, id: &str, force: bool) -> UninstallCheck {
        if let Err(e) = paths::validate_id(id) {
            return UninstallCheck {
                can_uninstall: false,
                reason: Some(e.to_string()),
                warnings: Vec::new(),
            };
        }
        let registry = Registry::load(&self.root);
        let Some(entry) = registry.get(id) else {
            return UninstallCheck {
                can_uninstall: false,
                reason: Some(format!("Plugin '{id}' is not installed")),
                warnings: Vec::new(),
            };
        };

        let mut check = UninstallCheck {
            can_uninstall: true,
            ..UninstallCheck::default()
        };

        let dependents = dependent_ids(&registry, id);
        if !dependents.is_empty() {
            if force {
                check.warnings.push(format!(
                    "Plugins that depend on '{id}' will be left without their parent: {}",
                    dependents.join(", ")
                ));
            } else {
                check.can_uninstall = false;
                check.reason = Some(format!(
                    "Cannot uninstall '{id}': plugins depend on it: {}. Use --force to override.",
                    dependents.join(", ")
                ));
            }
        }

        if entry.plugin_type == PluginType::Framework {
            let projects = paths::framework_projects_dir(&self.root, id);
            if io::dir_has_entries(&projects) {
                check.warnings.push(format!(
                    "Framework '{id}' has projects in {}; use --keep-projects to archive them",
                    projects.display()
                ));
            }
        }
        check
    }

    pub fn uninstall(&self, id: &str, opts: UninstallOptions) -> UninstallResult {
        if let Err(e) = paths::validate_id(id) {
            return UninstallResult {
                plugin_id: id.to_string(),
                errors: vec![e.to_string()],
                actions: vec![Action::planned(ActionType::Validate, id.to_string())],
                ..UninstallResult::default()
            };
        }
        if opts.dry_run {
            return self.run(id, opts);
        }
        match lock::with_root_lock(&self.root, || self.run(id, opts)) {
            Ok(result) => result,
            Err(e) => UninstallResult {
                plugin_id: id.to_string(),
                errors: vec![e.to_string()],
                ..UninstallResult::default()
            },
        }
    }

    fn run(&self, id: &str, opts: UninstallOptions) -> UninstallResult {
        let mut result = UninstallResult {
            plugin_id: id.to_string(),
            ..UninstallResult::default()
        };

        let registry = Registry::load(&self.root);
        let Some(entry) = registry.get(id).cloned() else {
            result.errors.push(format!("Plugin '{id}' is not installed"));
            result.actions = vec![Action::planned(ActionType::Validate, id.to_string())];
            return result;
        };

        let dependents = dependent_ids(&registry, id);
        let deps_detail = if dependents.is_empty() {
            "no dependent plugins".to_string()
        } else if opts.force {
            format!("dependents ignored (--force): {}", dependents.join(", "))
        } else {
            format!("dependents: {}", dependents.join(", "))
        };

        let plugin_dir = paths::plugin_dir(&self.root, entry.plugin_type, id);
        let projects_dir = paths::framework_projects_dir(&self.root, id);
        let archive = opts.keep_projects
            && entry.plugin_type == PluginType::Framework
            && io::dir_has_entries(&projects_dir);

        let mut ops = vec![
            Op::Check {
                action_type: ActionType::Validate,
                detail: format!("{} {} ({})", entry.id, entry.version, entry.plugin_type),
            },
            Op::Check {
                action_type: ActionType::CheckDeps,
                detail: deps_detail,
            },
        ];
        if archive {
            ops.push(Op::CopyTree {
                from: projects_dir.clone(),
                to: paths::archive_dir(&self.root, id),
            });
        }
        ops.push(Op::RemoveDir(plugin_dir.clone()));
        ops.push(Op::UpdateRegistry(RegistryChange::Remove(id.to_string())));

        if !dependents.is_empty() {
            if !opts.force {
                result.errors.push(format!(
                    "Cannot uninstall '{id}': plugins depend on it: {}. Use --force to override.",
                    dependents.join(", ")
                ));
                result.actions = txn::preview(&self.root, &ops);
                return result;
            }
            result.warnings.push(format!(
                "Dependency check skipped (--force): {} will be left without parent framework '{id}'",
                dependents.join(", ")
            ));
        }
        if !plugin_dir.exists() {
            result.warnings.push(format!(
                "Plugin directory {} is already absent",
                plugin_dir.display()
            ));
        }

        if opts.dry_run {
            result.actions = txn::preview(&self.root, &ops);
            result.success = true;
            return result;
        }

        let existed = plugin_dir.is_dir();
        let (files, dirs) = io::count_entries(&plugin_dir);
        let projects = if archive {
            std::fs::read_dir(&projects_dir).map(|it| it.count()).unwrap_or(0)
        } else {
            0
        };

        let execution = txn::execute(&self.root, &ops);
        result.actions = execution.actions;
        if let Some(e) = execution.error {
            result.errors.push(e);
            result.errors.push(format!("Uninstall of '{id}' rolled back"));
            return result;
        }

        let type_root = paths::type_root(&self.root, entry.plugin_type);
        io::prune_empty_dirs(&type_root, &self.root);

        result.stats = UninstallStats {
            files_removed: files,
            dirs_removed: dirs + usize::from(existed),
            projects_archived: projects,
        };
        tracing::info!(id, files, "plugin uninstalled");
        result.success = true;
        result
    }
}

fn dependents_of<'a>(registry: &'a Registry, id: &str) -> Vec<&'a PluginEntry> {
    registry
        .plugins
        .iter()
        .filter(|p| p.parent_framework.as_deref() == Some(id))
        .collect()
}

fn dependent_ids(registry: &Registry, id: &str) -> Vec<String> {
    dependents_of(registry, id)
        .into_iter()
        .map(|p| p.id.clone())
        .collect()
}

fn visit(registry: &Registry, id: &str, visited: &mut HashSet<String>, order: &mut Vec<String>) {
    if !visited.insert(id.to_string()) {
        return;
    }
    for dep in dependents_of(registry, id) {
        visit(registry, &dep.id, visited, order);
    }
    order.push(id.to_string());
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
