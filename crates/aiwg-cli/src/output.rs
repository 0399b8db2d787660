use aiwg_core::types::{Action, Severity};
use serde::Serialize;

/// Pretty-printed JSON on stdout, for `--json` output.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    for line in render_table(headers, rows) {
        println!("{line}");
    }
}

/// Header, dashed rule, then one line per row. Columns are sized in chars so
/// plugin names with non-ASCII text stay aligned; cells beyond the header
/// count are dropped.
fn render_table(headers: &[&str], rows: &[Vec<String>]) -> Vec<String> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = Vec::with_capacity(rows.len() + 2);
    out.push(render_row(headers.iter().copied(), &widths));
    out.push(widths.iter().map(|&w| "-".repeat(w)).collect::<Vec<_>>().join("  "));
    for row in rows {
        out.push(render_row(row.iter().map(String::as_str), &widths));
    }
    out
}

fn render_row<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(cell, &w)| format!("{cell:<w$}"))
        .collect();
    padded.join("  ").trim_end().to_string()
}

/// One line per planned step; `*` marks steps that ran.
pub fn print_actions(actions: &[Action]) {
    for a in actions {
        let mark = if a.executed { "*" } else { " " };
        println!("  {mark} {:<16} {}", a.action_type.as_str(), a.detail);
    }
}

/// Errors and warnings under their own prefixes, errors first.
pub fn print_messages(errors: &[String], warnings: &[String]) {
    for e in errors {
        println!("[error] {e}");
    }
    for w in warnings {
        println!("[warning] {w}");
    }
}

pub fn severity_tag(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "[critical]",
        Severity::Error => "[error]",
        Severity::Warning => "[warning]",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_columns_align_to_widest_cell() {
        let rows = vec![
            vec!["sdlc-complete".to_string(), "framework".to_string(), "1.0.0".to_string()],
            vec!["gdpr".to_string(), "add-on".to_string(), "".to_string()],
        ];
        let lines = render_table(&["ID", "TYPE", "VERSION"], &rows);
        assert_eq!(
            lines,
            vec![
                "ID             TYPE       VERSION",
                "-------------  ---------  -------",
                "sdlc-complete  framework  1.0.0",
                "gdpr           add-on",
            ]
        );
    }

    #[test]
    fn widths_count_chars_and_ignore_extra_cells() {
        let rows = vec![vec!["café".to_string(), "x".to_string(), "extra".to_string()]];
        let lines = render_table(&["ID", "T"], &rows);
        assert_eq!(lines[1], "----  -");
        assert_eq!(lines[2], "café  x");
    }
}
