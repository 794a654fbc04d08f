//! The build-command assembler and the tinkering resolver: a feedback loop
//! driven by compiler output that grows the search path until compilation
//! succeeds or is diagnosed as unrecoverable.

use anyhow::{Context, Result};
use std::path::PathBuf;

use nawabs::compiler::{self, Action, NO_PKG_PATH_FLAG};
use nawabs::packages::{self, Package};
use nawabs::prompt::Prompt;
use nawabs::recipes::{self, Recipe, LAST_RECIPE_KEY};
use nawabs::workspace::{find_project, Project, ScopedCwd};

use super::cloner;
use super::Config;

const MAX_ASSEMBLY_DEPTH: usize = 10;
const MAX_TINKER_ITERATIONS: usize = 300;

/// Assembles the compiler arguments for `project` and the search paths of
/// its resolved requirements, in pre-order. The paths are kept separate from
/// the argument string; they become `--path:` entries at invocation time.
/// Duplicates are permitted here, the resolver deduplicates on insertion.
pub fn build_cmd(
    cfg: &Config,
    catalog: &[Package],
    project: &Project,
    backend: Option<&str>,
) -> Result<(String, Vec<String>)> {
    let mut args = String::new();
    let mut paths = Vec::new();
    assemble(cfg, catalog, project, backend, 0, &mut args, &mut paths)?;
    Ok((args, paths))
}

fn assemble(
    cfg: &Config,
    catalog: &[Package],
    project: &Project,
    backend: Option<&str>,
    depth: usize,
    args: &mut String,
    paths: &mut Vec<String>,
) -> Result<()> {
    if depth > MAX_ASSEMBLY_DEPTH {
        anyhow::bail!(
            "unbounded recursion while assembling the build command for {} (depth {})",
            project.name,
            depth
        );
    }
    let info = compiler::read_project_info(&project.path(), &project.name)?;

    if depth == 0 {
        let backend = backend
            .map(str::to_string)
            .filter(|b| !b.is_empty())
            .or_else(|| (!info.backend.is_empty()).then(|| info.backend.clone()))
            .unwrap_or_else(|| "c".to_string());
        args.push(' ');
        args.push_str(&backend);
        args.push(' ');
        args.push_str(NO_PKG_PATH_FLAG);

        for requirement in &info.requires {
            assemble_dep(cfg, catalog, requirement, depth + 1, args, paths)?;
        }

        let main = compiler::find_main_file(&project.path(), &project.name)
            .with_context(|| format!("no main source file found for {}", project.name))?;
        args.push_str(&format!(" \"{}\"", main.display()));
    } else {
        paths.push(source_dir(project).display().to_string());
        for requirement in &info.requires {
            assemble_dep(cfg, catalog, requirement, depth + 1, args, paths)?;
        }
    }
    Ok(())
}

fn assemble_dep(
    cfg: &Config,
    catalog: &[Package],
    package_ref: &str,
    depth: usize,
    args: &mut String,
    paths: &mut Vec<String>,
) -> Result<()> {
    let name = match cloner::resolve_ref(catalog, package_ref) {
        Ok(package) => package.name,
        Err(_) => package_ref.to_string(),
    };
    // A requirement that is not cloned yet is left for the resolver to
    // supply from compiler feedback.
    let Some(project) = find_project(&cfg.workspace, &name) else {
        return Ok(());
    };
    assemble(cfg, catalog, &project, None, depth, args, paths)
}

/// The directory a dependency contributes to the search path: where its main
/// source file lives, or the project root when no main file is resolvable.
fn source_dir(project: &Project) -> PathBuf {
    let root = project.path();
    match compiler::find_main_file(&root, &project.name) {
        Some(main) => match main.parent() {
            Some(parent) if parent.as_os_str().is_empty() => root,
            Some(parent) => root.join(parent),
            None => root,
        },
        None => root,
    }
}

/// The central feedback loop. Invokes the compiler from the project's
/// directory; on a missing-file diagnostic, maps the file to a package,
/// acquires it if needed, appends its source directory to the search path
/// and retries. Terminates on success, on a hard compile failure, on lack of
/// progress, or after the iteration bound.
pub fn tinker(
    cfg: &mut Config,
    catalog: &[Package],
    prompt: &mut dyn Prompt,
    project: &Project,
    args: &str,
    seed_paths: &[String],
) -> Result<()> {
    let workspace = cfg.workspace.clone();
    let project_dir = project.path();

    let mut path: Vec<String> = Vec::new();
    for p in seed_paths {
        if !path.contains(p) {
            path.push(p.clone());
        }
    }

    for iteration in 1..=MAX_TINKER_ITERATIONS {
        let last_cmd = compiler::compose_command(&cfg.nim_exe, args, &path);
        if cfg.verbose {
            println!("[{}/{}] {}", iteration, MAX_TINKER_ITERATIONS, last_cmd);
        }

        let action = {
            let _cwd = ScopedCwd::enter(&project_dir)?;
            compiler::call_compiler(&cfg.nim_exe, args, &path)?
        };

        match action {
            Action::Success => {
                println!("✓ Build succeeded: {}", last_cmd);
                if !cfg.foreign_deps.is_empty() {
                    println!(
                        "Foreign dependencies to install manually: {}",
                        cfg.foreign_deps.join(", ")
                    );
                }
                if !cfg.norecipes {
                    let recipe = Recipe::new(project.name.clone(), last_cmd, path.clone());
                    recipes::write_recipe(&workspace, &project.name, &recipe)?;
                    recipes::write_recipe(&workspace, LAST_RECIPE_KEY, &recipe)?;
                }
                return Ok(());
            }
            Action::Failure(message) => {
                anyhow::bail!(
                    "compilation failed: {}\nlast command: {}",
                    message,
                    last_cmd
                );
            }
            Action::FileMissing(file) => {
                let dependency = locate_dependency(cfg, catalog, prompt, &file)?;
                let stem = file
                    .rsplit(['/', '\\'])
                    .next()
                    .unwrap_or(file.as_str())
                    .to_string();
                let matches = compiler::find_src_paths(&dependency.path(), &stem);
                let src = compiler::select_src_path(&matches)
                    .cloned()
                    .unwrap_or_else(|| dependency.path());
                let src = src.display().to_string();
                if path.contains(&src) {
                    anyhow::bail!(
                        "{} is already in --path and yet compilation failed\nlast command: {}",
                        src,
                        last_cmd
                    );
                }
                if cfg.verbose {
                    println!("Adding to --path: {}", src);
                }
                path.push(src);
            }
        }
    }
    anyhow::bail!("Stopped unsuccessfully after {} iterations", MAX_TINKER_ITERATIONS)
}

/// Maps a missing file to a project in the workspace, acquiring its package
/// first when necessary.
fn locate_dependency(
    cfg: &mut Config,
    catalog: &[Package],
    prompt: &mut dyn Prompt,
    file: &str,
) -> Result<Project> {
    let terms: Vec<String> = file
        .split(['/', '\\'])
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    let basename = terms.last().cloned().unwrap_or_else(|| file.to_string());

    // The missing file may belong to a project that is already present.
    if let Some(project) = find_project(&cfg.workspace, &basename) {
        return Ok(project);
    }

    let candidates = packages::determine_candidates(catalog, &terms);
    if candidates.is_empty() {
        anyhow::bail!("no package provides the missing file: {}", file);
    }
    let Some(package) = packages::select(&candidates, cfg.interactive, prompt)? else {
        anyhow::bail!("aborted");
    };
    if find_project(&cfg.workspace, &package.name).is_none() {
        cloner::install_dep(cfg, catalog, prompt, &package)?;
    }
    find_project(&cfg.workspace, &package.name)
        .with_context(|| format!("aborted: {} was not installed", package.name))
}
