use anyhow::Context;
use std::path::{Path, PathBuf};

/// Plugin root used when neither `--root` nor `AIWG_ROOT` is given,
/// relative to the user's home directory.
const DEFAULT_ROOT: &str = ".local/share/aiwg";

/// Resolve the plugin root: the explicit `--root` / `AIWG_ROOT` value, else
/// `~/.local/share/aiwg`.
pub fn resolve_root(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }
    let home = home::home_dir().context("cannot determine home directory; pass --root")?;
    Ok(home.join(DEFAULT_ROOT))
}

/// Resolve the project whose `.aiwg/` workspace is operated on.
///
/// Priority:
/// 1. `--project` flag / `AIWG_PROJECT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.aiwg/`
/// 3. Walk upward from `cwd` looking for `.git/`
/// 4. Fall back to `cwd`
pub fn resolve_project(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_upward(&cwd, ".aiwg")
        .or_else(|| find_upward(&cwd, ".git"))
        .unwrap_or(cwd)
}

fn find_upward(start: &Path, marker: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(marker).is_dir())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        assert_eq!(resolve_root(Some(dir.path())).unwrap(), dir.path());
    }

    #[test]
    fn explicit_project_wins() {
        let dir = TempDir::new().unwrap();
        assert_eq!(resolve_project(Some(dir.path())), dir.path());
    }

    #[test]
    fn finds_nearest_workspace() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".aiwg")).unwrap();
        let deep = dir.path().join("src/deep");
        std::fs::create_dir_all(&deep).unwrap();
        assert_eq!(find_upward(&deep, ".aiwg").unwrap(), dir.path());
        assert!(find_upward(&deep, ".nothing-here").is_none());
    }
}
