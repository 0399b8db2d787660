use crate::output::{print_json, print_table, severity_tag};
use aiwg_core::config::Config;
use aiwg_core::isolation::FrameworkIsolator;
use aiwg_core::migration::{
    generate_report, FrameworkDetector, LegacyMigrationOptions, MergeOptions, MigrationOptions,
    PlatformDirDetector, WorkspaceMigrator,
};
use aiwg_core::registry::Registry;
use aiwg_core::types::{ConflictStrategy, PluginType};
use anyhow::Context;
use clap::Subcommand;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum WorkspaceSubcommand {
    /// Report layout, detected frameworks and platforms
    Detect,

    /// Copy artifacts into the framework-scoped layout
    Migrate {
        /// Tree to migrate from (default: the project's .aiwg/)
        #[arg(long)]
        source: Option<PathBuf>,
        /// Scoped tree to write into (default: the project's .aiwg/)
        #[arg(long)]
        target: Option<PathBuf>,
        /// Namespace for framework-specific artifacts
        #[arg(long, default_value = "sdlc-complete")]
        framework: String,
        /// Replace files that already exist at the target
        #[arg(long)]
        overwrite: bool,
        /// Report would-be counts without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Do not snapshot the source first
        #[arg(long)]
        no_backup: bool,
        /// Only check safety and conflicts
        #[arg(long)]
        check: bool,
    },

    /// Move a legacy flat .aiwg/ into shared/ and per-platform namespaces
    MigrateLegacy {
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        no_backup: bool,
    },

    /// Consolidate shared artifacts duplicated across framework namespaces
    Merge {
        /// skip, overwrite, keep-newest or manual (default: from config)
        #[arg(long, value_name = "STRATEGY")]
        strategy: Option<ConflictStrategy>,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        no_backup: bool,
    },

    /// Restore the tree snapshotted by a migration
    Rollback { id: String },

    /// List migration snapshots
    Backups,

    /// Check that no private content leaked into shared/
    Isolation,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, project: &Path, subcmd: WorkspaceSubcommand, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let migrator = WorkspaceMigrator::new(project);
    match subcmd {
        WorkspaceSubcommand::Detect => detect(&migrator, json),
        WorkspaceSubcommand::Migrate {
            source,
            target,
            framework,
            overwrite,
            dry_run,
            no_backup,
            check,
        } => {
            let opts = MigrationOptions {
                source: source.unwrap_or_else(|| migrator.workspace().to_path_buf()),
                target: target.unwrap_or_else(|| migrator.workspace().to_path_buf()),
                framework,
                backup: config.backup_before_migrate && !no_backup,
                dry_run,
                overwrite,
            };
            if check {
                validate_migration(&migrator, &opts, json)
            } else {
                migrate(&migrator, &opts, json)
            }
        }
        WorkspaceSubcommand::MigrateLegacy { dry_run, no_backup } => {
            let opts = LegacyMigrationOptions {
                backup: config.backup_before_migrate && !no_backup,
                dry_run,
            };
            let result = migrator.migrate_legacy_to_scoped(&PlatformDirDetector, opts);
            finish_migration(&result, json)
        }
        WorkspaceSubcommand::Merge {
            strategy,
            dry_run,
            no_backup,
        } => {
            let opts = MergeOptions {
                conflict_strategy: strategy.unwrap_or(config.conflict_strategy),
                backup: config.backup_before_migrate && !no_backup,
                dry_run,
            };
            merge(&migrator, opts, json)
        }
        WorkspaceSubcommand::Rollback { id } => rollback(&migrator, &id, json),
        WorkspaceSubcommand::Backups => backups(&migrator, json),
        WorkspaceSubcommand::Isolation => isolation(root, &migrator, json),
    }
}

// ---------------------------------------------------------------------------
// detect
// ---------------------------------------------------------------------------

fn detect(migrator: &WorkspaceMigrator, json: bool) -> anyhow::Result<()> {
    let legacy = migrator.detect_legacy_workspace();
    let frameworks = migrator.detect_frameworks();
    let platforms = PlatformDirDetector.detect(migrator.project());

    if json {
        let value = serde_json::json!({
            "workspace": migrator.workspace(),
            "legacy": legacy,
            "frameworks": frameworks,
            "platforms": platforms,
        });
        return print_json(&value);
    }

    println!("Workspace:  {}", migrator.workspace().display());
    if legacy.is_legacy {
        println!(
            "Layout:     legacy ({} artifacts, {} bytes)",
            legacy.artifact_count, legacy.total_size
        );
        println!("Categories: {}", legacy.categories.join(", "));
    } else {
        println!("Layout:     scoped");
    }
    println!("Frameworks: {}", frameworks.join(", "));
    if platforms.is_empty() {
        println!("Platforms:  none detected");
    } else {
        println!("Platforms:  {}", platforms.join(", "));
    }
    println!("VCS:        {}", if legacy.has_git { "git" } else { "none" });
    Ok(())
}

// ---------------------------------------------------------------------------
// migrate
// ---------------------------------------------------------------------------

fn validate_migration(
    migrator: &WorkspaceMigrator,
    opts: &MigrationOptions,
    json: bool,
) -> anyhow::Result<()> {
    let validation = migrator.validate_migration(opts);
    if json {
        print_json(&validation)?;
    } else {
        println!("Safe: {}", if validation.safe { "yes" } else { "no" });
        println!("Estimated duration: {}ms", validation.estimated_duration);
        for c in &validation.conflicts {
            println!("  conflict: {} ({})", c.path, c.resolution);
        }
        for w in &validation.warnings {
            println!("[warning] {w}");
        }
    }
    if !validation.safe {
        anyhow::bail!("migration is not safe to run");
    }
    Ok(())
}

fn migrate(migrator: &WorkspaceMigrator, opts: &MigrationOptions, json: bool) -> anyhow::Result<()> {
    let result = migrator.migrate(opts);
    finish_migration(&result, json)
}

fn finish_migration(result: &aiwg_core::migration::MigrationResult, json: bool) -> anyhow::Result<()> {
    if json {
        print_json(result)?;
    } else {
        print!("{}", generate_report(result));
    }
    if !result.success {
        anyhow::bail!("migration {} failed", result.id);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// merge
// ---------------------------------------------------------------------------

fn merge(migrator: &WorkspaceMigrator, opts: MergeOptions, json: bool) -> anyhow::Result<()> {
    let result = migrator.merge_duplicate_shared(opts);
    if json {
        print_json(&result)?;
    } else {
        let r = &result.report;
        let prefix = if result.dry_run { "[dry run] " } else { "" };
        println!(
            "{prefix}{} duplicates found, {} merged, {} copies removed",
            r.duplicates_found, r.merged_count, r.removed_count
        );
        for c in &result.conflicts {
            println!("  conflict: {} ({})", c.path, c.resolution);
        }
        for e in &result.errors {
            println!("{} {}: {}", severity_tag(e.severity), e.path, e.error);
        }
        if let Some(id) = &result.backup_id {
            println!("Backup: {id}");
        }
    }
    if !result.success {
        anyhow::bail!("merge failed");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// rollback / backups
// ---------------------------------------------------------------------------

fn rollback(migrator: &WorkspaceMigrator, id: &str, json: bool) -> anyhow::Result<()> {
    let info = migrator
        .rollback(id)
        .with_context(|| format!("rollback of '{id}' failed"))?;
    if json {
        return print_json(&info);
    }
    println!("Restored {} from {id}", info.source_path.display());
    Ok(())
}

fn backups(migrator: &WorkspaceMigrator, json: bool) -> anyhow::Result<()> {
    let list = migrator.list_backups();
    if json {
        return print_json(&list);
    }
    if list.is_empty() {
        println!("No backups.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = list
        .iter()
        .map(|b| {
            vec![
                b.id.clone(),
                b.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                b.source_path.display().to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "CREATED", "SOURCE"], &rows);
    Ok(())
}

// ---------------------------------------------------------------------------
// isolation
// ---------------------------------------------------------------------------

fn isolation(root: &Path, migrator: &WorkspaceMigrator, json: bool) -> anyhow::Result<()> {
    let registry = Registry::load(root);
    let namespaces: Vec<String> = registry
        .list_by_type(PluginType::Framework)
        .into_iter()
        .map(|e| e.id.clone())
        .chain(PlatformDirDetector.detect(migrator.project()))
        .collect();
    let isolator = FrameworkIsolator::new(migrator.workspace(), namespaces);
    let report = isolator
        .validate_isolation()
        .context("failed to scan workspace")?;

    if json {
        print_json(&report)?;
    } else if report.issues.is_empty() {
        println!("Workspace isolation is intact.");
    } else {
        for i in &report.issues {
            println!("{} {}: {}", severity_tag(i.severity), i.path, i.message);
        }
    }
    if !report.valid {
        anyhow::bail!("isolation violations found");
    }
    Ok(())
}
