//! Recipe capture: the exact command line and search-path set of a
//! successful build, persisted per project so a later pinned invocation can
//! replay it without resolution.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::workspace::RECIPES_DIR;

/// Reserved recipe key holding the most recent successful command.
pub const LAST_RECIPE_KEY: &str = "_last";

const RECIPE_EXT: &str = "recipe";

/// A persisted build: project identity, the command that succeeded, and the
/// ordered search-path list it used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub project: String,
    pub command: String,
    pub paths: Vec<String>,
    pub written: String,
}

impl Recipe {
    pub fn new(project: impl Into<String>, command: impl Into<String>, paths: Vec<String>) -> Self {
        Self {
            project: project.into(),
            command: command.into(),
            paths,
            written: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Key/value text form; one `path` line per search-path entry.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("project = {}\n", self.project));
        out.push_str(&format!("command = {}\n", self.command));
        for path in &self.paths {
            out.push_str(&format!("path = {}\n", path));
        }
        out.push_str(&format!("written = {}\n", self.written));
        out
    }

    pub fn parse(text: &str) -> Result<Recipe> {
        let mut project = None;
        let mut command = None;
        let mut paths = Vec::new();
        let mut written = String::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                anyhow::bail!("recipe line is not 'key = value': {:?}", line);
            };
            let value = value.trim().to_string();
            match key.trim() {
                "project" => project = Some(value),
                "command" => command = Some(value),
                "path" => paths.push(value),
                "written" => written = value,
                _ => {}
            }
        }

        Ok(Recipe {
            project: project.context("recipe is missing the 'project' key")?,
            command: command.context("recipe is missing the 'command' key")?,
            paths,
            written,
        })
    }
}

/// Deterministic location of a recipe file, derived from the project
/// identity.
pub fn recipe_path(workspace: &Path, key: &str) -> PathBuf {
    workspace
        .join(RECIPES_DIR)
        .join("recipes")
        .join(format!("{}.{}", key, RECIPE_EXT))
}

pub fn write_recipe(workspace: &Path, key: &str, recipe: &Recipe) -> Result<()> {
    let path = recipe_path(workspace, key);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(&path, recipe.to_text())
        .with_context(|| format!("Failed to write recipe {}", path.display()))
}

/// Loads a recipe if one was captured for `key`.
pub fn load_recipe(workspace: &Path, key: &str) -> Result<Option<Recipe>> {
    let path = recipe_path(workspace, key);
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read recipe {}", path.display()))?;
    Recipe::parse(&content)
        .with_context(|| format!("Corrupt recipe {}", path.display()))
        .map(Some)
}
