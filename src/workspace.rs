//! Workspace discovery and the convention-based project locator.
//!
//! A workspace is any directory containing the `recipes_` subdirectory; it is
//! found by walking upward from the current directory. Projects are immediate
//! subdirectories of the workspace; subdirectories whose basename ends with
//! `_` are grouping folders and are searched recursively, after the direct
//! children of the current level.

use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the directory that marks a workspace root and holds the catalog,
/// refresh script and captured recipes. The trailing underscore makes it look
/// like a grouping folder, so the locator and the placement prompt must treat
/// it specially.
pub const RECIPES_DIR: &str = "recipes_";

/// A materialized checkout inside the workspace. `subdir` is the parent path
/// (the workspace root or a grouping folder); the checkout lives at
/// `subdir/name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub subdir: PathBuf,
    pub name: String,
}

impl Project {
    pub fn new(subdir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            subdir: subdir.into(),
            name: name.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.subdir.join(&self.name)
    }
}

/// Walks upward from `start` until a directory containing [`RECIPES_DIR`] is
/// found.
pub fn find_workspace(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        if dir.join(RECIPES_DIR).is_dir() {
            return Some(dir);
        }
        if !dir.pop() {
            return None;
        }
    }
}

fn is_grouping_folder(name: &str) -> bool {
    name.ends_with('_')
}

fn dir_entries(dir: &Path) -> Vec<(PathBuf, String)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut out: Vec<(PathBuf, String)> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| {
            let name = e.file_name().to_str()?.to_string();
            Some((e.path(), name))
        })
        .filter(|(_, name)| name != RECIPES_DIR)
        .collect();
    out.sort_by(|a, b| a.1.cmp(&b.1));
    out
}

/// Finds a previously cloned project by name. Comparison is case-insensitive
/// over Unicode lowercasing. A match directly under `root` wins over any match
/// inside a grouping folder at the same level; recursion descends only into
/// grouping folders.
pub fn find_project(root: &Path, name: &str) -> Option<Project> {
    let want = name.to_lowercase();
    let mut groups = Vec::new();

    for (path, basename) in dir_entries(root) {
        if is_grouping_folder(&basename) {
            groups.push(path);
        } else if basename.to_lowercase() == want {
            return Some(Project::new(root, basename));
        }
    }

    for group in groups {
        if let Some(found) = find_project(&group, name) {
            return Some(found);
        }
    }
    None
}

/// Every project in the workspace, grouping folders included, in traversal
/// order. Used by the bulk update path.
pub fn projects_under(root: &Path) -> Vec<Project> {
    let mut out = Vec::new();
    for (path, basename) in dir_entries(root) {
        if is_grouping_folder(&basename) {
            out.extend(projects_under(&path));
        } else {
            out.push(Project::new(root, basename));
        }
    }
    out
}

/// Scoped current-directory change. The previous directory is restored on
/// every exit path, including failure, when the guard drops.
pub struct ScopedCwd {
    prev: PathBuf,
}

impl ScopedCwd {
    pub fn enter(dir: &Path) -> Result<Self> {
        let prev = env::current_dir().context("Failed to read the current directory")?;
        env::set_current_dir(dir)
            .with_context(|| format!("Failed to change directory to {}", dir.display()))?;
        Ok(Self { prev })
    }
}

impl Drop for ScopedCwd {
    fn drop(&mut self) {
        let _ = env::set_current_dir(&self.prev);
    }
}
