use super::detect::{FrameworkDetector, DEFAULT_PLATFORM};
use super::{
    new_migration_id, LegacyMigrationOptions, MigrationOptions, MigrationResult,
    MigrationValidation, WorkspaceMigrator, EXCLUDED_ENTRIES,
};
use crate::io;
use crate::isolation::FrameworkIsolator;
use crate::paths::{self, SHARED_NAMESPACE};
use crate::types::{Conflict, ConflictKind, ConflictStrategy, Severity};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Per-file cost used for duration estimates, in milliseconds.
const ESTIMATED_MS_PER_FILE: u64 = 10;

/// One planned copy: source-relative path and its routed destination.
struct Planned {
    rel: String,
    from: PathBuf,
    to: PathBuf,
}

impl WorkspaceMigrator {
    // -----------------------------------------------------------------------
    // Planning
    // -----------------------------------------------------------------------

    fn plan(&self, opts: &MigrationOptions) -> crate::Result<Vec<Planned>> {
        let isolator = FrameworkIsolator::new(&opts.target, [opts.framework.as_str()]);
        let mut exclude: Vec<&str> = EXCLUDED_ENTRIES.to_vec();
        if opts.source == opts.target {
            // Already-scoped content is not a candidate when migrating in place.
            exclude.push(SHARED_NAMESPACE);
            exclude.push(&opts.framework);
        }
        let mut planned = Vec::new();
        for file in io::list_files(&opts.source, &exclude)? {
            let rel = io::to_slash(&file);
            let to = isolator.route(&opts.framework, &rel)?;
            planned.push(Planned {
                from: opts.source.join(&file),
                rel,
                to,
            });
        }
        Ok(planned)
    }

    /// Candidates whose source-relative path already exists under the target.
    ///
    /// When migrating in place every candidate trivially exists under the
    /// target, so the routed destination is checked instead.
    pub fn check_conflicts(&self, opts: &MigrationOptions) -> Vec<Conflict> {
        let resolution = if opts.overwrite {
            ConflictStrategy::Overwrite
        } else {
            ConflictStrategy::Skip
        };
        let in_place = opts.source == opts.target;
        self.plan(opts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| {
                let existing = if in_place {
                    p.to
                } else {
                    opts.target.join(&p.rel)
                };
                if !existing.exists() {
                    return None;
                }
                Some(Conflict {
                    path: p.rel,
                    kind: if existing.is_dir() {
                        ConflictKind::Directory
                    } else {
                        ConflictKind::File
                    },
                    resolution,
                })
            })
            .collect()
    }

    /// Never fails: an absent source or unusable framework id makes the
    /// migration unsafe.
    pub fn validate_migration(&self, opts: &MigrationOptions) -> MigrationValidation {
        let mut validation = MigrationValidation {
            safe: true,
            conflicts: Vec::new(),
            warnings: Vec::new(),
            estimated_duration: 0,
        };
        if !opts.source.is_dir() {
            validation.safe = false;
            validation
                .warnings
                .push(format!("Source path does not exist: {}", opts.source.display()));
            return validation;
        }
        if !paths::is_valid_id(&opts.framework) {
            validation.safe = false;
            validation
                .warnings
                .push(format!("Invalid framework id: '{}'", opts.framework));
            return validation;
        }
        if !opts.target.exists() {
            validation.warnings.push(format!(
                "Target path does not exist and will be created: {}",
                opts.target.display()
            ));
        }
        match self.plan(opts) {
            Ok(planned) => {
                validation.estimated_duration = planned.len() as u64 * ESTIMATED_MS_PER_FILE;
            }
            Err(e) => {
                validation.safe = false;
                validation.warnings.push(format!("Cannot enumerate source: {e}"));
                return validation;
            }
        }
        validation.conflicts = self.check_conflicts(opts);
        if !validation.conflicts.is_empty() {
            let action = if opts.overwrite { "overwritten" } else { "skipped" };
            validation.warnings.push(format!(
                "{} file(s) already exist at the target and will be {action}",
                validation.conflicts.len()
            ));
        }
        validation
    }

    // -----------------------------------------------------------------------
    // Migrate
    // -----------------------------------------------------------------------

    /// Copy every candidate under `source` into its routed place under
    /// `target`. The source tree is never modified.
    pub fn migrate(&self, opts: &MigrationOptions) -> MigrationResult {
        let started = Instant::now();
        let mut result = MigrationResult {
            id: new_migration_id(),
            dry_run: opts.dry_run,
            ..MigrationResult::default()
        };

        if !opts.source.is_dir() {
            result.record(
                opts.source.display().to_string(),
                "Source path does not exist",
                Severity::Critical,
            );
            result.duration = elapsed_ms(started);
            return result;
        }

        let planned = match self.plan(opts) {
            Ok(p) => p,
            Err(e) => {
                result.record(opts.source.display().to_string(), e.to_string(), Severity::Critical);
                result.duration = elapsed_ms(started);
                return result;
            }
        };

        if opts.dry_run {
            for p in &planned {
                if p.to.exists() && !opts.overwrite {
                    result.files_skipped_count += 1;
                } else {
                    result.files_copied_count += 1;
                }
            }
            result.success = true;
            result.duration = elapsed_ms(started);
            return result;
        }

        if opts.backup {
            match self.create_backup(&opts.source, &result.id) {
                Ok(path) => result.backup_path = Some(path),
                Err(e) => {
                    result.record(opts.source.display().to_string(), format!("Backup failed: {e}"), Severity::Critical);
                    result.duration = elapsed_ms(started);
                    return result;
                }
            }
        }

        for p in &planned {
            if p.to.exists() && !opts.overwrite {
                result.files_skipped_count += 1;
                result.record(&p.rel, "Target exists; skipped", Severity::Warning);
                continue;
            }
            match io::copy_file(&p.from, &p.to) {
                Ok(_) => {
                    tracing::debug!(from = %p.rel, to = %p.to.display(), "copied");
                    result.files_copied_count += 1;
                }
                Err(e) => result.record(&p.rel, e.to_string(), Severity::Error),
            }
        }

        result.success = !result.has_failures();
        result.duration = elapsed_ms(started);
        tracing::info!(
            id = %result.id,
            copied = result.files_copied_count,
            skipped = result.files_skipped_count,
            "migration finished"
        );
        result
    }

    // -----------------------------------------------------------------------
    // Legacy to scoped
    // -----------------------------------------------------------------------

    /// Move legacy category directories under `.aiwg/` into `shared/` or the
    /// primary platform's namespace.
    ///
    /// Every file is copied and verified before any source is removed; a
    /// failed copy removes the copies made so far, any partial target and the
    /// platform directories this run created, leaving the tree as it was.
    pub fn migrate_legacy_to_scoped(
        &self,
        detector: &dyn FrameworkDetector,
        opts: LegacyMigrationOptions,
    ) -> MigrationResult {
        let started = Instant::now();
        let mut result = MigrationResult {
            id: new_migration_id(),
            dry_run: opts.dry_run,
            ..MigrationResult::default()
        };

        let legacy = self.detect_legacy_workspace();
        if !legacy.is_legacy {
            result.record(
                self.workspace.display().to_string(),
                "Workspace is not in the legacy layout; nothing to migrate",
                Severity::Warning,
            );
            result.success = true;
            result.duration = elapsed_ms(started);
            return result;
        }

        let mut platforms = detector.detect(&self.project);
        if platforms.is_empty() {
            platforms.push(DEFAULT_PLATFORM.to_string());
        }
        let primary = platforms[0].clone();
        let isolator = FrameworkIsolator::new(&self.workspace, platforms.iter().map(String::as_str));

        let mut planned = Vec::new();
        let mut empty_categories = Vec::new();
        for cat in &legacy.categories {
            let files = io::list_files(&self.workspace.join(cat), &[]).unwrap_or_default();
            if files.is_empty() {
                empty_categories.push(cat.clone());
            }
            for file in files {
                let rel = format!("{cat}/{}", io::to_slash(&file));
                match isolator.route(&primary, &rel) {
                    Ok(to) => planned.push(Planned {
                        from: self.workspace.join(&rel),
                        rel,
                        to,
                    }),
                    Err(e) => result.record(&rel, e.to_string(), Severity::Error),
                }
            }
        }

        if opts.dry_run {
            result.files_moved_count = planned.len();
            result.success = !result.has_failures();
            result.duration = elapsed_ms(started);
            return result;
        }

        if opts.backup {
            match self.create_backup(&self.workspace, &result.id) {
                Ok(path) => result.backup_path = Some(path),
                Err(e) => {
                    result.record(self.workspace.display().to_string(), format!("Backup failed: {e}"), Severity::Critical);
                    result.duration = elapsed_ms(started);
                    return result;
                }
            }
        }

        let mut created_platforms = Vec::new();
        for platform in &platforms {
            let dir = self.workspace.join(platform);
            let existed = dir.exists();
            match io::ensure_dir(&dir) {
                Ok(()) if !existed => created_platforms.push(dir),
                Ok(()) => {}
                Err(e) => result.record(platform, e.to_string(), Severity::Error),
            }
        }

        let mut copied: Vec<&Planned> = Vec::new();
        let mut failed: Vec<&Planned> = Vec::new();
        for p in &planned {
            if p.to.exists() {
                result.files_skipped_count += 1;
                result.record(&p.rel, "Target exists; source kept in place", Severity::Warning);
                continue;
            }
            match io::copy_verified(&p.from, &p.to) {
                Ok(()) => copied.push(p),
                Err(e) => {
                    result.record(&p.rel, e.to_string(), Severity::Error);
                    failed.push(p);
                }
            }
        }

        if result.has_failures() {
            for p in copied.iter().chain(&failed) {
                if p.to.is_file() && std::fs::remove_file(&p.to).is_err() {
                    continue;
                }
                if let Some(parent) = p.to.parent() {
                    io::prune_empty_dirs(parent, &self.workspace);
                }
            }
            for dir in &created_platforms {
                io::prune_empty_dirs(dir, &self.workspace);
            }
            tracing::warn!(id = %result.id, "legacy migration aborted; copies removed");
            result.duration = elapsed_ms(started);
            return result;
        }

        for p in &copied {
            match std::fs::remove_file(&p.from) {
                Ok(()) => result.files_moved_count += 1,
                Err(e) => result.record(&p.rel, format!("Copied but source not removed: {e}"), Severity::Warning),
            }
            if let Some(parent) = p.from.parent() {
                io::prune_empty_dirs(parent, &self.workspace);
            }
        }

        for cat in &empty_categories {
            let legacy_dir = self.workspace.join(cat);
            if let Ok(dest) = isolator.route(&primary, cat) {
                if let Err(e) = io::ensure_dir(&dest) {
                    result.record(cat, e.to_string(), Severity::Warning);
                    continue;
                }
            }
            if let Err(e) = remove_if_fileless(&legacy_dir) {
                result.record(cat, e.to_string(), Severity::Warning);
            }
        }
        for cat in &legacy.categories {
            if let Err(e) = remove_if_fileless(&self.workspace.join(cat)) {
                result.record(cat, e.to_string(), Severity::Warning);
            }
        }

        result.success = !result.has_failures();
        result.duration = elapsed_ms(started);
        tracing::info!(
            id = %result.id,
            moved = result.files_moved_count,
            platforms = ?platforms,
            "legacy workspace migrated"
        );
        result
    }
}

/// Remove `dir` if no regular file remains anywhere below it.
fn remove_if_fileless(dir: &Path) -> std::io::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    if io::list_files(dir, &[]).map(|f| f.is_empty()).unwrap_or(false) {
        std::fs::remove_dir_all(dir)?;
    }
    Ok(())
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, body: &str) {
        let p = root.join(rel);
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        std::fs::write(p, body).unwrap();
    }

    fn opts(source: &Path, target: &Path) -> MigrationOptions {
        MigrationOptions {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            framework: "sdlc-complete".into(),
            backup: false,
            dry_run: false,
            overwrite: false,
        }
    }

    struct Fixed(Vec<&'static str>);

    impl FrameworkDetector for Fixed {
        fn detect(&self, _: &Path) -> Vec<String> {
            self.0.iter().map(|s| s.to_string()).collect()
        }
    }

    #[test]
    fn validate_missing_source_is_unsafe() {
        let dir = TempDir::new().unwrap();
        let m = WorkspaceMigrator::new(dir.path());
        let mut o = opts(&dir.path().join("nope"), dir.path());
        o.overwrite = true;
        let v = m.validate_migration(&o);
        assert!(!v.safe);
        assert!(v.conflicts.is_empty());
    }

    #[test]
    fn validate_reports_conflicts_and_estimate() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("legacy");
        let dst = dir.path().join("scoped");
        write(&src, "requirements/uc-001.md", "a");
        write(&src, "agents/bot.md", "b");
        write(&dst, "requirements/uc-001.md", "old");

        let m = WorkspaceMigrator::new(dir.path());
        let v = m.validate_migration(&opts(&src, &dst));
        assert!(v.safe);
        assert_eq!(v.estimated_duration, 20);
        assert_eq!(v.conflicts.len(), 1);
        assert_eq!(v.conflicts[0].path, "requirements/uc-001.md");
        assert_eq!(v.conflicts[0].resolution, ConflictStrategy::Skip);
    }

    #[test]
    fn conflicts_are_relative_paths_present_in_both_trees() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("legacy");
        let dst = dir.path().join("scoped");
        write(&src, "requirements/uc-001.md", "a");
        write(&src, "agents/a.md", "b");
        write(&dst, "requirements/uc-001.md", "old");
        write(&dst, "sdlc-complete/agents/a.md", "scoped");

        let m = WorkspaceMigrator::new(dir.path());
        let paths: Vec<String> = m
            .check_conflicts(&opts(&src, &dst))
            .into_iter()
            .map(|c| c.path)
            .collect();
        assert_eq!(paths, vec!["requirements/uc-001.md".to_string()]);

        let disjoint = dir.path().join("other");
        write(&disjoint, "shared/requirements/uc-001.md", "old");
        write(&disjoint, "notes/readme.md", "x");
        assert!(m.check_conflicts(&opts(&src, &disjoint)).is_empty());
    }

    #[test]
    fn migrate_missing_source_is_critical() {
        let dir = TempDir::new().unwrap();
        let m = WorkspaceMigrator::new(dir.path());
        let r = m.migrate(&opts(&dir.path().join("nope"), dir.path()));
        assert!(!r.success);
        assert_eq!(r.errors.len(), 1);
        assert_eq!(r.errors[0].severity, Severity::Critical);
    }

    #[test]
    fn migrate_routes_and_skips_existing() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("legacy");
        let dst = dir.path().join("scoped");
        write(&src, "requirements/uc-001.md", "new");
        write(&src, "agents/bot.md", "bot");
        write(&src, "registry.json", "{}");
        write(&src, "frameworks/x/repo/a.md", "managed");
        write(&dst, "shared/requirements/uc-001.md", "old");

        let m = WorkspaceMigrator::new(dir.path());
        let r = m.migrate(&opts(&src, &dst));
        assert!(r.success);
        assert_eq!(r.files_copied_count, 1);
        assert_eq!(r.files_skipped_count, 1);
        assert_eq!(r.errors[0].severity, Severity::Warning);
        assert!(dst.join("sdlc-complete/agents/bot.md").is_file());
        assert!(!dst.join("sdlc-complete/registry.json").exists());
        assert_eq!(
            std::fs::read_to_string(dst.join("shared/requirements/uc-001.md")).unwrap(),
            "old"
        );
        assert!(src.join("agents/bot.md").is_file());
        assert!(r.id.starts_with("migration-"));
    }

    #[test]
    fn migrate_overwrite_replaces_content() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("legacy");
        let dst = dir.path().join("scoped");
        write(&src, "requirements/uc-001.md", "new");
        write(&dst, "shared/requirements/uc-001.md", "old");

        let mut o = opts(&src, &dst);
        o.overwrite = true;
        let r = WorkspaceMigrator::new(dir.path()).migrate(&o);
        assert!(r.success);
        assert_eq!(r.files_copied_count, 1);
        assert_eq!(
            std::fs::read_to_string(dst.join("shared/requirements/uc-001.md")).unwrap(),
            "new"
        );
    }

    #[test]
    fn migrate_dry_run_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("legacy");
        let dst = dir.path().join("scoped");
        write(&src, "requirements/uc-001.md", "a");

        let m = WorkspaceMigrator::new(dir.path());
        let mut o = opts(&src, &dst);
        o.dry_run = true;
        o.backup = true;
        let r = m.migrate(&o);
        assert!(r.success);
        assert!(r.dry_run);
        assert_eq!(r.files_copied_count, 1);
        assert!(r.backup_path.is_none());
        assert!(!dst.exists());
        assert!(!m.backups_dir().exists());
    }

    #[test]
    fn migrate_with_backup_can_roll_back() {
        let dir = TempDir::new().unwrap();
        let m = WorkspaceMigrator::new(dir.path());
        let ws = m.workspace().to_path_buf();
        write(&ws, "requirements/uc-001.md", "a");

        let mut o = opts(&ws, &ws);
        o.backup = true;
        let r = m.migrate(&o);
        assert!(r.success);
        assert!(r.backup_path.is_some());
        assert!(ws.join("shared/requirements/uc-001.md").is_file());

        m.rollback(&r.id).unwrap();
        assert!(ws.join("requirements/uc-001.md").is_file());
        assert!(!ws.join("shared").exists());
    }

    #[test]
    fn legacy_to_scoped_moves_categories() {
        let dir = TempDir::new().unwrap();
        let m = WorkspaceMigrator::new(dir.path());
        std::fs::create_dir_all(m.workspace().join("intake")).unwrap();
        write(m.workspace(), "requirements/uc-001.md", "uc");
        write(m.workspace(), "agents/bot.md", "bot");
        std::fs::create_dir_all(dir.path().join(".claude")).unwrap();

        let r = m.migrate_legacy_to_scoped(
            &crate::migration::PlatformDirDetector,
            LegacyMigrationOptions::default(),
        );
        assert!(r.success, "{:?}", r.errors);
        assert_eq!(r.files_moved_count, 2);
        assert!(m.workspace().join("claude").is_dir());
        assert!(m.workspace().join("shared/requirements/uc-001.md").is_file());
        assert!(m.workspace().join("claude/agents/bot.md").is_file());
        assert!(m.workspace().join("shared/intake").is_dir());
        assert!(!m.workspace().join("requirements").exists());
        assert!(!m.workspace().join("intake").exists());
        assert!(!m.detect_legacy_workspace().is_legacy);
    }

    #[test]
    fn legacy_to_scoped_creates_every_platform_namespace() {
        let dir = TempDir::new().unwrap();
        let m = WorkspaceMigrator::new(dir.path());
        write(m.workspace(), "planning/plan.md", "p");

        let r = m.migrate_legacy_to_scoped(
            &Fixed(vec!["codex", "cursor"]),
            LegacyMigrationOptions { backup: true, dry_run: false },
        );
        assert!(r.success);
        assert!(m.workspace().join("codex").is_dir());
        assert!(m.workspace().join("cursor").is_dir());
        assert!(r.backup_path.unwrap().join("tree/planning/plan.md").is_file());
    }

    #[test]
    fn legacy_to_scoped_dry_run_counts_only() {
        let dir = TempDir::new().unwrap();
        let m = WorkspaceMigrator::new(dir.path());
        write(m.workspace(), "requirements/uc-001.md", "uc");

        let r = m.migrate_legacy_to_scoped(
            &Fixed(vec![]),
            LegacyMigrationOptions { backup: true, dry_run: true },
        );
        assert!(r.success);
        assert_eq!(r.files_moved_count, 1);
        assert!(m.workspace().join("requirements/uc-001.md").is_file());
        assert!(!m.workspace().join("shared").exists());
        assert!(!m.workspace().join("claude").exists());
        assert!(!m.backups_dir().exists());
    }

    #[test]
    fn legacy_to_scoped_keeps_source_when_target_taken() {
        let dir = TempDir::new().unwrap();
        let m = WorkspaceMigrator::new(dir.path());
        write(m.workspace(), "agents/bot.md", "legacy");
        write(m.workspace(), "claude/agents/bot.md", "scoped");

        let r = m.migrate_legacy_to_scoped(&Fixed(vec!["claude"]), LegacyMigrationOptions::default());
        assert!(r.success);
        assert_eq!(r.files_skipped_count, 1);
        assert!(m.workspace().join("agents/bot.md").is_file());
        assert_eq!(
            std::fs::read_to_string(m.workspace().join("claude/agents/bot.md")).unwrap(),
            "scoped"
        );
    }

    #[test]
    fn legacy_to_scoped_failed_copy_leaves_tree_untouched() {
        let dir = TempDir::new().unwrap();
        let m = WorkspaceMigrator::new(dir.path());
        let ws = m.workspace().to_path_buf();
        write(&ws, "agents/bot.md", "bot");
        write(&ws, "planning/plan.md", "plan");
        // A file where the agents namespace directory belongs makes that copy fail.
        write(&ws, "claude/agents", "squatter");

        let r = m.migrate_legacy_to_scoped(
            &Fixed(vec!["claude", "codex"]),
            LegacyMigrationOptions::default(),
        );
        assert!(!r.success);
        assert!(r.errors.iter().any(|e| e.path == "agents/bot.md" && e.severity == Severity::Error));
        assert_eq!(r.files_moved_count, 0);
        assert_eq!(std::fs::read_to_string(ws.join("agents/bot.md")).unwrap(), "bot");
        assert_eq!(std::fs::read_to_string(ws.join("planning/plan.md")).unwrap(), "plan");
        assert!(!ws.join("shared").exists());
        assert!(!ws.join("codex").exists());
        assert_eq!(std::fs::read_to_string(ws.join("claude/agents")).unwrap(), "squatter");
        assert!(m.detect_legacy_workspace().is_legacy);
    }

    #[test]
    fn not_legacy_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let m = WorkspaceMigrator::new(dir.path());
        write(m.workspace(), "shared/requirements/uc-001.md", "uc");
        let r = m.migrate_legacy_to_scoped(&Fixed(vec![]), LegacyMigrationOptions::default());
        assert!(r.success);
        assert_eq!(r.files_moved_count, 0);
        assert_eq!(r.errors[0].severity, Severity::Warning);
    }
}
