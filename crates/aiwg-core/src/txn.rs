//! Reversible filesystem steps shared by install and uninstall.
//!
//! A plan is a list of [`Op`]s. Each op renders to an [`Action`] for reports
//! and, when applied, yields an [`Undo`]. If any op fails, the undos collected
//! so far run in reverse order and the remaining ops are never attempted.

use crate::error::Result;
use crate::registry::{PluginEntry, Registry};
use crate::types::{Action, ActionType};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[derive(Debug, Clone)]
pub(crate) enum RegistryChange {
    Put(Box<PluginEntry>),
    Remove(String),
}

#[derive(Debug, Clone)]
pub(crate) enum Op {
    /// Bookkeeping step whose work happened during planning.
    Check { action_type: ActionType, detail: String },
    CreateDir(PathBuf),
    CopyFile { from: PathBuf, to: PathBuf },
    /// Copy every file below `from` into `to`, preserving relative paths.
    CopyTree { from: PathBuf, to: PathBuf },
    RemoveDir(PathBuf),
    UpdateRegistry(RegistryChange),
}

#[derive(Debug)]
enum Undo {
    Nothing,
    RemoveDir(PathBuf),
    RemoveFile(PathBuf),
    RestoreFile(PathBuf, Vec<u8>),
    RemoveFiles(Vec<PathBuf>),
    MoveBack { parked: PathBuf, original: PathBuf },
    RestoreEntry { id: String, previous: Option<PluginEntry> },
}

/// Outcome of running a plan.
#[derive(Debug)]
pub(crate) struct Execution {
    pub actions: Vec<Action>,
    pub error: Option<String>,
}

fn rel(root: &Path, path: &Path) -> String {
    crate::io::to_slash(path.strip_prefix(root).unwrap_or(path))
}

impl Op {
    pub fn action(&self, root: &Path) -> Action {
        match self {
            Op::Check {
                action_type,
                detail,
            } => Action::planned(*action_type, detail.clone()),
            Op::CreateDir(p) => Action::planned(ActionType::CreateDir, rel(root, p)),
            Op::CopyFile { from, to } => Action::planned(
                ActionType::CopyFile,
                format!("{} -> {}", from.display(), rel(root, to)),
            ),
            Op::CopyTree { from, to } => Action::planned(
                ActionType::ArchiveProjects,
                format!("{} -> {}", rel(root, from), rel(root, to)),
            ),
            Op::RemoveDir(p) => Action::planned(ActionType::RemoveDir, rel(root, p)),
            Op::UpdateRegistry(RegistryChange::Put(e)) => Action::planned(
                ActionType::UpdateRegistry,
                format!("register {} {}", e.id, e.version),
            ),
            Op::UpdateRegistry(RegistryChange::Remove(id)) => {
                Action::planned(ActionType::UpdateRegistry, format!("unregister {id}"))
            }
        }
    }

    fn apply(&self, root: &Path, trash: &mut Option<TempDir>) -> Result<Undo> {
        match self {
            Op::Check { .. } => Ok(Undo::Nothing),
            Op::CreateDir(p) => {
                if p.exists() {
                    return Ok(Undo::Nothing);
                }
                std::fs::create_dir_all(p)?;
                Ok(Undo::RemoveDir(p.clone()))
            }
            Op::CopyFile { from, to } => {
                let undo = if to.is_file() {
                    Undo::RestoreFile(to.clone(), std::fs::read(to)?)
                } else {
                    Undo::RemoveFile(to.clone())
                };
                crate::io::copy_file(from, to)?;
                Ok(undo)
            }
            Op::CopyTree { from, to } => {
                let mut written = Vec::new();
                for file in crate::io::list_files(from, &[])? {
                    let dest = to.join(&file);
                    if let Err(e) = crate::io::copy_file(&from.join(&file), &dest) {
                        for w in &written {
                            let _ = std::fs::remove_file(w);
                        }
                        return Err(e);
                    }
                    written.push(dest);
                }
                Ok(Undo::RemoveFiles(written))
            }
            Op::RemoveDir(p) => {
                if !p.exists() {
                    return Ok(Undo::Nothing);
                }
                let trash_dir = match trash {
                    Some(t) => t.path().to_path_buf(),
                    None => {
                        let t = TempDir::new_in(root)?;
                        let p = t.path().to_path_buf();
                        *trash = Some(t);
                        p
                    }
                };
                let parked = trash_dir.join(trash_dir.read_dir()?.count().to_string());
                std::fs::rename(p, &parked)?;
                Ok(Undo::MoveBack {
                    parked,
                    original: p.clone(),
                })
            }
            Op::UpdateRegistry(change) => {
                let mut registry = Registry::load(root);
                let (id, previous) = match change {
                    RegistryChange::Put(entry) => {
                        let previous = registry.get(&entry.id).cloned();
                        registry.put(entry.as_ref().clone());
                        (entry.id.clone(), previous)
                    }
                    RegistryChange::Remove(id) => (id.clone(), registry.take(id)),
                };
                registry.save(root)?;
                Ok(Undo::RestoreEntry { id, previous })
            }
        }
    }
}

impl Undo {
    fn run(self, root: &Path) -> Result<()> {
        match self {
            Undo::Nothing => {}
            Undo::RemoveDir(p) => std::fs::remove_dir_all(p)?,
            Undo::RemoveFile(p) => std::fs::remove_file(p)?,
            Undo::RestoreFile(p, bytes) => crate::io::atomic_write(&p, &bytes)?,
            Undo::RemoveFiles(files) => {
                for f in files {
                    std::fs::remove_file(f)?;
                }
            }
            Undo::MoveBack { parked, original } => std::fs::rename(parked, original)?,
            Undo::RestoreEntry { id, previous } => {
                let mut registry = Registry::load(root);
                match previous {
                    Some(entry) => registry.put(entry),
                    None => {
                        registry.take(&id);
                    }
                }
                registry.save(root)?;
            }
        }
        Ok(())
    }
}

/// Render a plan without touching the filesystem.
pub(crate) fn preview(root: &Path, ops: &[Op]) -> Vec<Action> {
    ops.iter().map(|op| op.action(root)).collect()
}

/// Apply `ops` in order. On the first failure, undo everything applied so far
/// in reverse order and report the failure.
pub(crate) fn execute(root: &Path, ops: &[Op]) -> Execution {
    let mut actions = preview(root, ops);
    let mut undos: Vec<Undo> = Vec::new();
    let mut trash: Option<TempDir> = None;

    for (i, op) in ops.iter().enumerate() {
        match op.apply(root, &mut trash) {
            Ok(undo) => {
                actions[i].executed = true;
                undos.push(undo);
            }
            Err(e) => {
                let message = format!("{} failed ({}): {e}", actions[i].action_type, actions[i].detail);
                tracing::warn!(error = %message, "step failed, rolling back");
                for undo in undos.into_iter().rev() {
                    if let Err(ue) = undo.run(root) {
                        tracing::warn!(error = %ue, "rollback step failed");
                    }
                }
                return Execution {
                    actions,
                    error: Some(message),
                };
            }
        }
    }

    // Dropping the trash deletes every directory parked by RemoveDir.
    drop(trash);
    Execution {
        actions,
        error: None,
    }
}
