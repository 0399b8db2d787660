use crate::output::{print_actions, print_json, print_messages, print_table};
use aiwg_core::config::Config;
use aiwg_core::installer::{InstallOptions, PluginInstaller};
use aiwg_core::manifest;
use aiwg_core::registry::Registry;
use aiwg_core::status::{self, PluginReport, PluginStatus};
use aiwg_core::types::PluginType;
use aiwg_core::uninstaller::{PluginUninstaller, UninstallOptions};
use anyhow::Context;
use clap::Subcommand;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum PluginSubcommand {
    /// Install a plugin from a source directory containing a manifest
    Install {
        /// Directory with manifest.json or manifest.md
        source: PathBuf,
        /// Reinstall over an existing plugin with the same id
        #[arg(long)]
        force: bool,
        /// Show the plan without touching the filesystem
        #[arg(long)]
        dry_run: bool,
        /// Install an add-on whose parent framework is not installed
        #[arg(long = "skip-deps")]
        skip_deps: bool,
    },

    /// Remove an installed plugin
    Uninstall {
        id: String,
        /// Remove even if other plugins depend on it
        #[arg(long)]
        force: bool,
        /// Show the plan without touching the filesystem
        #[arg(long)]
        dry_run: bool,
        /// Archive a framework's projects/ before removal
        #[arg(long)]
        keep_projects: bool,
    },

    /// List installed plugins
    List {
        /// Only plugins of this type: framework, add-on, extension
        #[arg(long = "type", value_name = "TYPE")]
        plugin_type: Option<PluginType>,
    },

    /// Show derived health for one plugin, or a summary of all
    Status { id: Option<String> },

    /// Recompute every plugin's health and record it in the registry
    Health,

    /// Validate a plugin source directory without installing it
    Validate { source: PathBuf },

    /// Show what depends on a plugin and the order it would be removed in
    Deps {
        id: String,
        /// Evaluate as if --force were passed to uninstall
        #[arg(long)]
        force: bool,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: PluginSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        PluginSubcommand::Install {
            source,
            force,
            dry_run,
            skip_deps,
        } => install(
            root,
            &source,
            InstallOptions {
                force,
                dry_run,
                skip_dependency_check: skip_deps,
            },
            json,
        ),
        PluginSubcommand::Uninstall {
            id,
            force,
            dry_run,
            keep_projects,
        } => uninstall(
            root,
            &id,
            UninstallOptions {
                force,
                dry_run,
                keep_projects,
            },
            json,
        ),
        PluginSubcommand::List { plugin_type } => list(root, plugin_type, json),
        PluginSubcommand::Status { id } => show_status(root, id.as_deref(), json),
        PluginSubcommand::Health => health(root, json),
        PluginSubcommand::Validate { source } => validate(&source, json),
        PluginSubcommand::Deps { id, force } => deps(root, &id, force, json),
    }
}

// ---------------------------------------------------------------------------
// install / uninstall
// ---------------------------------------------------------------------------

fn install(root: &Path, source: &Path, opts: InstallOptions, json: bool) -> anyhow::Result<()> {
    let result = PluginInstaller::new(root).install(source, opts);

    if json {
        print_json(&result)?;
    } else {
        let verb = if opts.dry_run { "Would install" } else { "Installed" };
        if result.success {
            println!("{verb} '{}' {}", result.plugin_id, result.version);
        }
        print_actions(&result.actions);
        print_messages(&result.errors, &result.warnings);
    }

    if !result.success {
        anyhow::bail!("installation of '{}' failed", display_id(&result.plugin_id, source));
    }
    Ok(())
}

fn uninstall(root: &Path, id: &str, opts: UninstallOptions, json: bool) -> anyhow::Result<()> {
    let result = PluginUninstaller::new(root).uninstall(id, opts);

    if json {
        print_json(&result)?;
    } else {
        if result.success {
            let verb = if opts.dry_run { "Would uninstall" } else { "Uninstalled" };
            println!(
                "{verb} '{id}' ({} files, {} dirs, {} projects archived)",
                result.stats.files_removed, result.stats.dirs_removed, result.stats.projects_archived
            );
        }
        print_actions(&result.actions);
        print_messages(&result.errors, &result.warnings);
    }

    if !result.success {
        anyhow::bail!("uninstall of '{id}' failed");
    }
    Ok(())
}

fn display_id(id: &str, source: &Path) -> String {
    if id.is_empty() {
        source.display().to_string()
    } else {
        id.to_string()
    }
}

// ---------------------------------------------------------------------------
// list / status / health
// ---------------------------------------------------------------------------

fn list(root: &Path, plugin_type: Option<PluginType>, json: bool) -> anyhow::Result<()> {
    let registry = Registry::load(root);
    let entries: Vec<_> = match plugin_type {
        Some(t) => registry.list_by_type(t),
        None => registry.plugins.iter().collect(),
    };

    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No plugins installed.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|e| {
            vec![
                e.id.clone(),
                e.plugin_type.to_string(),
                e.version.clone(),
                e.parent_framework.clone().unwrap_or_default(),
                e.installed_at.format("%Y-%m-%d %H:%M").to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "TYPE", "VERSION", "PARENT", "INSTALLED"], &rows);
    Ok(())
}

fn show_status(root: &Path, id: Option<&str>, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let status = PluginStatus::from_config(root, &config);

    if let Some(id) = id {
        let report = status
            .get(id)
            .with_context(|| format!("plugin '{id}' is not installed"))?;
        if json {
            return print_json(&report);
        }
        println!("{} ({}) {}", report.id, report.plugin_type, report.version);
        println!("  path:   {}", report.path);
        if let Some(parent) = &report.parent_framework {
            println!("  parent: {parent}");
        }
        println!("  health: {}", report.health);
        for issue in &report.issues {
            println!("  - {issue}");
        }
        return Ok(());
    }

    let summary = status.summary();
    let reports = status.list();
    if json {
        let value = serde_json::json!({
            "summary": summary,
            "plugins": reports,
        });
        return print_json(&value);
    }

    println!("Mode: {}", summary.mode.as_str());
    println!("Plugins: {}", summary.total);
    for (t, n) in &summary.by_type {
        println!("  {t}: {n}");
    }
    if !reports.is_empty() {
        println!();
        print_reports(&reports);
    }
    Ok(())
}

fn health(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let reports = status::record_health(root, &config).context("failed to record health")?;
    if json {
        return print_json(&reports);
    }
    if reports.is_empty() {
        println!("No plugins installed.");
    } else {
        print_reports(&reports);
    }
    Ok(())
}

fn print_reports(reports: &[PluginReport]) {
    let rows: Vec<Vec<String>> = reports
        .iter()
        .map(|r| {
            vec![
                r.id.clone(),
                r.plugin_type.to_string(),
                r.health.to_string(),
                r.issues.join("; "),
            ]
        })
        .collect();
    print_table(&["ID", "TYPE", "HEALTH", "ISSUES"], &rows);
}

// ---------------------------------------------------------------------------
// validate / deps
// ---------------------------------------------------------------------------

fn validate(source: &Path, json: bool) -> anyhow::Result<()> {
    let result = manifest::validate_plugin(source);
    if json {
        print_json(&result)?;
    } else {
        if let Some(m) = &result.manifest {
            println!("{} ({}) {}", m.id, m.plugin_type, m.version);
        }
        print_messages(&result.errors, &result.warnings);
        if result.valid {
            println!("Plugin source is valid.");
        }
    }
    if !result.valid {
        anyhow::bail!("plugin source {} is invalid", source.display());
    }
    Ok(())
}

fn deps(root: &Path, id: &str, force: bool, json: bool) -> anyhow::Result<()> {
    let uninstaller = PluginUninstaller::new(root);
    let check = uninstaller.can_uninstall(id, force);
    let dependents: Vec<String> = uninstaller
        .get_dependent_plugins(id)
        .into_iter()
        .map(|e| e.id)
        .collect();
    let order = uninstaller.get_uninstall_order(id);

    if json {
        let value = serde_json::json!({
            "id": id,
            "dependents": dependents,
            "uninstallOrder": order,
            "check": check,
        });
        return print_json(&value);
    }

    if dependents.is_empty() {
        println!("Nothing depends on '{id}'.");
    } else {
        println!("Dependents: {}", dependents.join(", "));
    }
    println!("Uninstall order: {}", order.join(" -> "));
    match (check.can_uninstall, check.reason.as_deref()) {
        (true, _) => println!("Can uninstall: yes"),
        (false, Some(reason)) => println!("Can uninstall: no ({reason})"),
        (false, None) => println!("Can uninstall: no"),
    }
    for w in &check.warnings {
        println!("[warning] {w}");
    }
    Ok(())
}
