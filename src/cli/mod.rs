use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

mod cloner;
mod tinker;

use nawabs::packages::{self, Package};
use nawabs::prompt::Prompt;
use nawabs::recipes;
use nawabs::vcs;
use nawabs::workspace::{find_project, ScopedCwd, RECIPES_DIR};

/// Where to put dependencies that are not yet in the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepPolicy {
    /// Install dependencies wherever the placement rules say.
    Normal,
    /// Refuse to install any dependency.
    NoDeps,
    /// Install dependencies, then stop before building.
    DepsOnly,
    /// Confirm each dependency action interactively.
    Ask,
}

/// Ambient state threaded through a run.
pub struct Config {
    pub workspace: PathBuf,
    pub nim_exe: String,
    pub deps_dir: Option<String>,
    pub dep_policy: DepPolicy,
    pub prefer_https: bool,
    pub norecipes: bool,
    pub interactive: bool,
    pub verbose: bool,
    /// Foreign system dependencies declared by visited projects, surfaced to
    /// the user verbatim at the end of a run.
    pub foreign_deps: Vec<String>,
}

const REFRESH_SCRIPT: &str = "config/roots.nims";

/// Creates the workspace scaffolding in `dir`.
pub fn init(dir: &Path) -> Result<()> {
    let recipes_dir = dir.join(RECIPES_DIR);
    for sub in ["config", "packages", "recipes"] {
        let path = recipes_dir.join(sub);
        fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
    }

    let script = recipes_dir.join(REFRESH_SCRIPT);
    if !script.exists() {
        fs::write(
            &script,
            "# Refresh script: populate ../packages/ with manifest shards.\n",
        )
        .with_context(|| format!("Failed to write {}", script.display()))?;
    }

    println!("✓ Workspace initialized at {}", dir.display());
    Ok(())
}

fn run_refresh_script(workspace: &Path, nim_exe: &str) -> Result<()> {
    let script = workspace.join(RECIPES_DIR).join(REFRESH_SCRIPT);
    if !script.exists() {
        anyhow::bail!(
            "refresh script {} not found; run 'nawabs init' first",
            script.display()
        );
    }
    println!("Refreshing the package catalog...");
    let status = vcs::exec_in(&format!("{} e \"{}\"", nim_exe, script.display()), workspace)?;
    if !status.success() {
        anyhow::bail!("refresh script failed: {}", script.display());
    }
    Ok(())
}

/// Re-runs the catalog refresh script.
pub fn refresh(cfg: &Config) -> Result<()> {
    run_refresh_script(&cfg.workspace, &cfg.nim_exe)
}

fn load_catalog(cfg: &Config) -> Result<Vec<Package>> {
    let workspace = cfg.workspace.clone();
    let nim_exe = cfg.nim_exe.clone();
    packages::load_packages(&cfg.workspace, move || {
        run_refresh_script(&workspace, &nim_exe)
    })
}

fn print_package(package: &Package) {
    println!("{} ({})", package.name, package.url);
    if !package.description.is_empty() {
        println!("  {}", package.description);
    }
    if !package.tags.is_empty() {
        println!("  tags: {}", package.tags.join(", "));
    }
}

/// Echoes catalog entries matching `terms`, or every entry when none are
/// given.
pub fn search(cfg: &Config, terms: Vec<String>) -> Result<()> {
    let catalog = load_catalog(cfg)?;
    if terms.is_empty() {
        return list_catalog(&catalog);
    }
    let candidates = packages::determine_candidates(&catalog, &terms);
    if candidates.is_empty() {
        println!("No package matches: {}", terms.join(" "));
        return Ok(());
    }
    for package in candidates
        .exact
        .iter()
        .chain(&candidates.substring)
        .chain(&candidates.tag)
    {
        print_package(package);
    }
    Ok(())
}

pub fn list(cfg: &Config) -> Result<()> {
    let catalog = load_catalog(cfg)?;
    list_catalog(&catalog)
}

fn list_catalog(catalog: &[Package]) -> Result<()> {
    if catalog.is_empty() {
        println!("The package catalog is empty");
        return Ok(());
    }
    for package in catalog {
        print_package(package);
    }
    Ok(())
}

fn report_foreign_deps(cfg: &Config) {
    if !cfg.foreign_deps.is_empty() {
        println!(
            "Foreign dependencies to install manually: {}",
            cfg.foreign_deps.join(", ")
        );
    }
}

/// Acquires a single package (and its requirements) into the current
/// directory.
pub fn clone_package(cfg: &mut Config, prompt: &mut dyn Prompt, package_ref: &str) -> Result<()> {
    let catalog = load_catalog(cfg)?;
    let already = cloner::clone_rec(cfg, &catalog, prompt, package_ref, 0)?;
    if already {
        println!("✓ {} is already in the workspace", package_ref);
    } else {
        println!("✓ Cloned {}", package_ref);
    }
    report_foreign_deps(cfg);
    Ok(())
}

/// Builds a project: a captured recipe is replayed when one exists,
/// otherwise the build command is assembled and handed to the resolver.
pub fn build(cfg: &mut Config, prompt: &mut dyn Prompt, backend: &str, name: &str) -> Result<()> {
    let catalog = load_catalog(cfg)?;
    let package_name = cloner::resolve_ref(&catalog, name)?.name;
    cloner::clone_rec(cfg, &catalog, prompt, name, 0)?;

    if cfg.dep_policy == DepPolicy::DepsOnly {
        println!("✓ Dependencies installed for {}", package_name);
        report_foreign_deps(cfg);
        return Ok(());
    }

    if !cfg.norecipes && recipes::load_recipe(&cfg.workspace, &package_name)?.is_some() {
        return replay_recipe(cfg, &package_name);
    }
    run_tinker(cfg, &catalog, prompt, backend, &package_name)
}

/// Forces the resolver, ignoring any captured recipe.
pub fn tinker_project(
    cfg: &mut Config,
    prompt: &mut dyn Prompt,
    backend: &str,
    name: &str,
) -> Result<()> {
    let catalog = load_catalog(cfg)?;
    let package_name = cloner::resolve_ref(&catalog, name)?.name;
    cloner::clone_rec(cfg, &catalog, prompt, name, 0)?;
    run_tinker(cfg, &catalog, prompt, backend, &package_name)
}

fn run_tinker(
    cfg: &mut Config,
    catalog: &[Package],
    prompt: &mut dyn Prompt,
    backend: &str,
    package_name: &str,
) -> Result<()> {
    let project = find_project(&cfg.workspace, package_name)
        .with_context(|| format!("project {} not found in the workspace", package_name))?;
    let (args, paths) = tinker::build_cmd(cfg, catalog, &project, Some(backend))?;
    tinker::tinker(cfg, catalog, prompt, &project, &args, &paths)
}

/// Pulls one project and replays its recipe, or pulls every project in the
/// workspace when no name is given.
pub fn update(cfg: &mut Config, prompt: &mut dyn Prompt, name: Option<String>) -> Result<()> {
    match name {
        Some(name) => {
            let project = find_project(&cfg.workspace, &name)
                .with_context(|| format!("project {} not found in the workspace", name))?;
            vcs::update_project(&project.path())?;
            replay_recipe(cfg, &project.name)
        }
        None => vcs::update_everything(
            &cfg.workspace,
            cfg.dep_policy == DepPolicy::Ask && cfg.interactive,
            prompt,
        ),
    }
}

/// Replays a captured recipe without any resolution.
pub fn pinned(cfg: &Config, name: &str) -> Result<()> {
    replay_recipe(cfg, name)
}

fn replay_recipe(cfg: &Config, name: &str) -> Result<()> {
    let recipe = recipes::load_recipe(&cfg.workspace, name)?
        .with_context(|| format!("no recipe found for {}", name))?;
    let project = find_project(&cfg.workspace, name)
        .with_context(|| format!("project {} not found in the workspace", name))?;

    println!("Replaying: {}", recipe.command);
    let status = {
        let _cwd = ScopedCwd::enter(&project.path())?;
        vcs::exec(&recipe.command)?
    };
    if !status.success() {
        anyhow::bail!("replayed command failed: {}", recipe.command);
    }
    println!("✓ Replay successful");
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_config(workspace: &Path) -> Config {
    Config {
        workspace: workspace.to_path_buf(),
        nim_exe: "nim".to_string(),
        deps_dir: None,
        dep_policy: DepPolicy::Normal,
        prefer_https: false,
        norecipes: false,
        interactive: false,
        verbose: false,
        foreign_deps: Vec::new(),
    }
}

#[cfg(test)]
pub(crate) fn cwd_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nawabs::recipes::Recipe;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_scaffolding() {
        let tmp = TempDir::new().unwrap();
        init(tmp.path()).unwrap();

        let recipes_dir = tmp.path().join(RECIPES_DIR);
        assert!(recipes_dir.join("config/roots.nims").exists());
        assert!(recipes_dir.join("packages").is_dir());
        assert!(recipes_dir.join("recipes").is_dir());
    }

    #[test]
    fn test_replay_missing_recipe_is_fatal() {
        let tmp = TempDir::new().unwrap();
        init(tmp.path()).unwrap();
        let cfg = test_config(tmp.path());

        let err = pinned(&cfg, "ghost").unwrap_err();
        assert!(err.to_string().contains("no recipe found"));
    }

    #[test]
    #[cfg(unix)]
    fn test_replay_runs_captured_command_in_project_dir() {
        let _guard = cwd_lock();
        let tmp = TempDir::new().unwrap();
        init(tmp.path()).unwrap();
        fs::create_dir_all(tmp.path().join("foo")).unwrap();

        let recipe = Recipe::new("foo", "touch replayed.marker", vec![]);
        recipes::write_recipe(tmp.path(), "foo", &recipe).unwrap();

        let cfg = test_config(tmp.path());
        pinned(&cfg, "foo").unwrap();
        assert!(tmp.path().join("foo/replayed.marker").exists());
    }
}
