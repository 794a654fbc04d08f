//! Recursive dependency acquisition with policy-driven placement.

use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::PathBuf;

use nawabs::compiler;
use nawabs::packages::{self, Package};
use nawabs::prompt::Prompt;
use nawabs::vcs;
use nawabs::workspace::{find_project, Project, RECIPES_DIR};

use super::{Config, DepPolicy};

const MAX_CLONE_DEPTH: usize = 10;

fn is_url(package_ref: &str) -> bool {
    package_ref.contains("://") || package_ref.starts_with("git@")
}

/// Resolves a package reference: a URL is synthesized into a minimal record,
/// a name is looked up in the catalog. Unknown names are fatal.
pub fn resolve_ref(catalog: &[Package], package_ref: &str) -> Result<Package> {
    if is_url(package_ref) {
        Ok(Package::from_url(package_ref))
    } else {
        packages::lookup(catalog, package_ref)
            .cloned()
            .with_context(|| format!("unresolved package name: {}", package_ref))
    }
}

/// Acquires a package and, recursively, everything its project info declares.
/// Returns whether the package itself was already present in the workspace;
/// a pre-existing project still has its requirements descended, since some of
/// them may be missing.
pub fn clone_rec(
    cfg: &mut Config,
    catalog: &[Package],
    prompt: &mut dyn Prompt,
    package_ref: &str,
    depth: usize,
) -> Result<bool> {
    let package = resolve_ref(catalog, package_ref)?;
    clone_rec_pkg(cfg, catalog, prompt, &package, depth)
}

fn clone_rec_pkg(
    cfg: &mut Config,
    catalog: &[Package],
    prompt: &mut dyn Prompt,
    package: &Package,
    depth: usize,
) -> Result<bool> {
    if depth > MAX_CLONE_DEPTH {
        anyhow::bail!(
            "unbounded recursion while resolving dependencies of {} (depth {})",
            package.name,
            depth
        );
    }

    let (project, already_present) = match find_project(&cfg.workspace, &package.name) {
        Some(project) => (project, true),
        None => match install_pkg(cfg, prompt, package, depth)? {
            Some(project) => (project, false),
            None => {
                println!("Skipping {} (placement aborted)", package.name);
                return Ok(false);
            }
        },
    };

    let info = compiler::read_project_info(&project.path(), &project.name)?;
    cfg.foreign_deps.extend(info.foreign_deps.iter().cloned());
    for requirement in &info.requires {
        clone_rec(cfg, catalog, prompt, requirement, depth + 1)?;
    }
    Ok(already_present)
}

/// Depth>0 acquisition used by the tinkering resolver for a package it has
/// already selected.
pub fn install_dep(
    cfg: &mut Config,
    catalog: &[Package],
    prompt: &mut dyn Prompt,
    package: &Package,
) -> Result<()> {
    clone_rec_pkg(cfg, catalog, prompt, package, 1)?;
    Ok(())
}

fn install_pkg(
    cfg: &mut Config,
    prompt: &mut dyn Prompt,
    package: &Package,
    depth: usize,
) -> Result<Option<Project>> {
    let dest = if depth == 0 {
        env::current_dir().context("Failed to read the current directory")?
    } else {
        match &cfg.dep_policy {
            DepPolicy::NoDeps => anyhow::bail!(
                "{} is required but dependency installation is disabled (--nodeps)",
                package.name
            ),
            _ => {
                if let Some(deps_dir) = &cfg.deps_dir {
                    let dir = cfg.workspace.join(deps_dir);
                    fs::create_dir_all(&dir)
                        .with_context(|| format!("Failed to create {}", dir.display()))?;
                    dir
                } else if !cfg.interactive {
                    cfg.workspace.clone()
                } else {
                    match ask_placement(cfg, prompt, package)? {
                        Some(dir) => dir,
                        None => return Ok(None),
                    }
                }
            }
        }
    };

    vcs::clone_url(&package.url, &dest, &package.name, cfg.prefer_https)?;
    Ok(Some(Project::new(dest, package.name.clone())))
}

fn ask_placement(
    cfg: &Config,
    prompt: &mut dyn Prompt,
    package: &Package,
) -> Result<Option<PathBuf>> {
    loop {
        let answer = prompt.ask(&format!(
            "Where should {} be cloned? [workspace|.|<group_>|abort] ",
            package.name
        ))?;
        match answer.trim() {
            "" | "w" | "ws" | "_" | "workspace" => return Ok(Some(cfg.workspace.clone())),
            "." => {
                return Ok(Some(
                    env::current_dir().context("Failed to read the current directory")?,
                ))
            }
            "abort" => return Ok(None),
            other => {
                if other == RECIPES_DIR {
                    println!("{} is reserved for the catalog and recipes", RECIPES_DIR);
                    continue;
                }
                if !other.ends_with('_') {
                    println!("Grouping folder names must end with '_'");
                    continue;
                }
                let dir = cfg.workspace.join(other);
                fs::create_dir_all(&dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
                return Ok(Some(dir));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::test_config;
    use nawabs::prompt::ScriptedPrompt;
    use std::path::Path;
    use tempfile::TempDir;

    fn package(name: &str) -> Package {
        Package {
            name: name.to_string(),
            url: format!("git://host/{}", name),
            download_method: "git".to_string(),
            license: "MIT".to_string(),
            description: "d".to_string(),
            tags: Vec::new(),
            version: String::new(),
            dvcs_tag: String::new(),
            web: String::new(),
        }
    }

    fn workspace_with(dirs: &[&str]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join(RECIPES_DIR)).unwrap();
        for dir in dirs {
            fs::create_dir_all(tmp.path().join(dir)).unwrap();
        }
        tmp
    }

    fn write_decl(root: &Path, project: &str, content: &str) {
        fs::write(
            root.join(project).join(format!("{}.nimble", project)),
            content,
        )
        .unwrap();
    }

    #[test]
    fn test_depth_beyond_bound_is_fatal() {
        let ws = workspace_with(&[]);
        let mut cfg = test_config(ws.path());
        let catalog = vec![package("foo")];
        let mut prompt = ScriptedPrompt::new(Vec::<String>::new());

        let err = clone_rec(&mut cfg, &catalog, &mut prompt, "foo", 11).unwrap_err();
        assert!(err.to_string().contains("unbounded recursion"));
    }

    #[test]
    fn test_unresolved_name_is_fatal() {
        let ws = workspace_with(&[]);
        let mut cfg = test_config(ws.path());
        let mut prompt = ScriptedPrompt::new(Vec::<String>::new());

        let err = clone_rec(&mut cfg, &[], &mut prompt, "ghost", 0).unwrap_err();
        assert!(err.to_string().contains("unresolved package name"));
    }

    #[test]
    fn test_idempotent_when_everything_is_present() {
        // foo and its whole requirement closure already exist, so no clone is
        // performed (a clone attempt would fail: the URLs are unreachable).
        let ws = workspace_with(&["foo", "libA"]);
        write_decl(ws.path(), "foo", "requires \"libA\"\nforeignDep \"openssl\"\n");

        let mut cfg = test_config(ws.path());
        let catalog = vec![package("foo"), package("libA")];
        let mut prompt = ScriptedPrompt::new(Vec::<String>::new());

        let already = clone_rec(&mut cfg, &catalog, &mut prompt, "foo", 0).unwrap();
        assert!(already);
        assert_eq!(cfg.foreign_deps, vec!["openssl"]);
    }

    #[test]
    fn test_nodeps_policy_rejects_missing_dependency() {
        let ws = workspace_with(&[]);
        let mut cfg = test_config(ws.path());
        cfg.dep_policy = DepPolicy::NoDeps;
        let catalog = vec![package("libA")];
        let mut prompt = ScriptedPrompt::new(Vec::<String>::new());

        let err = clone_rec(&mut cfg, &catalog, &mut prompt, "libA", 1).unwrap_err();
        assert!(err.to_string().contains("--nodeps"));
    }

    #[test]
    fn test_placement_prompt_validates_then_abort_leaves_workspace_untouched() {
        let ws = workspace_with(&[]);
        let mut cfg = test_config(ws.path());
        cfg.interactive = true;
        let catalog = vec![package("libA")];
        // The recipes directory and a non-grouping name are rejected and
        // re-prompted; abort then skips the package entirely.
        let mut prompt = ScriptedPrompt::new([RECIPES_DIR, "plainname", "abort"]);

        let already = clone_rec(&mut cfg, &catalog, &mut prompt, "libA", 1).unwrap();
        assert!(!already);
        assert!(!ws.path().join("libA").exists());
    }

    #[test]
    fn test_resolve_ref_synthesizes_package_from_url() {
        let pkg = resolve_ref(&[], "https://github.com/x/libB.git").unwrap();
        assert_eq!(pkg.name, "libB");
        assert_eq!(pkg.url, "https://github.com/x/libB.git");
    }
}
