use super::MigrationResult;
use crate::types::Severity;
use std::fmt::Write;

fn marker(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "[CRITICAL]",
        Severity::Error => "[ERROR]",
        Severity::Warning => "[WARN]",
    }
}

/// Plain-text summary of a migration run. Output depends only on `result`.
pub fn generate_report(result: &MigrationResult) -> String {
    let mut out = String::new();
    let status = match (result.success, result.dry_run) {
        (true, true) => "SUCCESS (dry run)",
        (true, false) => "SUCCESS",
        (false, _) => "FAILED",
    };
    // Writing into a String cannot fail.
    let _ = writeln!(out, "Migration {}", result.id);
    let _ = writeln!(out, "Status:   {status}");
    let _ = writeln!(out, "Moved:    {}", result.files_moved_count);
    let _ = writeln!(out, "Copied:   {}", result.files_copied_count);
    let _ = writeln!(out, "Skipped:  {}", result.files_skipped_count);
    if let Some(path) = &result.backup_path {
        let _ = writeln!(out, "Backup:   {}", path.display());
    }
    let _ = writeln!(out, "Duration: {}ms", result.duration);
    if !result.errors.is_empty() {
        let _ = writeln!(out, "Issues ({}):", result.errors.len());
        for e in &result.errors {
            let _ = writeln!(out, "  {} {}: {}", marker(e.severity), e.path, e.error);
        }
    }
    out
}
