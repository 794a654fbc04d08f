use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::env;
use std::path::PathBuf;

mod cli;

use cli::{Config, DepPolicy};
use nawabs::prompt::StdinPrompt;
use nawabs::workspace::{self, RECIPES_DIR};

#[derive(Parser)]
#[command(name = "nawabs")]
#[command(about = "A workspace-oriented package and build orchestrator for Nim projects", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Override workspace discovery with an explicit directory")]
    workspace: Option<PathBuf>,

    #[arg(long = "nimExe", global = true, default_value = "nim", help = "Compiler executable name")]
    nim_exe: String,

    #[arg(long = "cloneUsingHttps", global = true, help = "Rewrite git:// clone URLs to https://")]
    clone_using_https: bool,

    #[arg(long, global = true, help = "Disable recipe capture on successful builds")]
    norecipes: bool,

    #[arg(long, global = true, help = "Clone dependencies into this workspace subdirectory")]
    deps: Option<String>,

    #[arg(long, global = true, help = "Refuse to install any dependency")]
    nodeps: bool,

    #[arg(long = "depsOnly", global = true, help = "Install dependencies, then stop before building")]
    deps_only: bool,

    #[arg(long, global = true, help = "Confirm each dependency action interactively")]
    ask: bool,

    #[arg(long = "nonInteractive", global = true, help = "Never prompt; ambiguity becomes an error")]
    non_interactive: bool,

    #[arg(long, global = true, help = "Enable verbose output")]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create workspace scaffolding in the current directory")]
    Init,

    #[command(about = "Re-run the catalog refresh script")]
    Refresh,

    #[command(about = "Search the package catalog")]
    Search {
        #[arg(help = "Query terms matched against names and tags")]
        terms: Vec<String>,
    },

    #[command(about = "List every package in the catalog")]
    List,

    #[command(about = "Clone a package and its dependencies")]
    Clone {
        #[arg(help = "Package name or clone URL")]
        name: String,
    },

    #[command(about = "Build a project, replaying its recipe when one exists")]
    Build {
        #[arg(help = "Compiler backend (c, cpp, js, ...)")]
        backend: String,
        #[arg(help = "Package name or clone URL")]
        name: String,
    },

    #[command(about = "Build a project with the resolver, ignoring any recipe")]
    Tinker {
        #[arg(help = "Compiler backend (c, cpp, js, ...)")]
        backend: String,
        #[arg(help = "Package name or clone URL")]
        name: String,
    },

    #[command(about = "Pull a project and replay its recipe, or pull everything")]
    Update {
        #[arg(help = "Project name; omit to pull every project")]
        name: Option<String>,
    },

    #[command(about = "Replay a project's captured recipe")]
    Pinned {
        #[arg(help = "Project name")]
        name: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = env::current_dir().context("Failed to read the current directory")?;
    if matches!(cli.command, Commands::Init) {
        let target = cli.workspace.unwrap_or(cwd);
        return cli::init(&target);
    }

    let workspace = match &cli.workspace {
        Some(dir) => {
            if !dir.join(RECIPES_DIR).is_dir() {
                anyhow::bail!(
                    "{} is not a workspace (missing {}); run 'nawabs init' there first",
                    dir.display(),
                    RECIPES_DIR
                );
            }
            dir.clone()
        }
        None => workspace::find_workspace(&cwd).with_context(|| {
            format!(
                "could not detect a workspace (no {} directory above {}); run 'nawabs init'",
                RECIPES_DIR,
                cwd.display()
            )
        })?,
    };

    let dep_policy = if cli.nodeps {
        DepPolicy::NoDeps
    } else if cli.deps_only {
        DepPolicy::DepsOnly
    } else if cli.ask {
        DepPolicy::Ask
    } else {
        DepPolicy::Normal
    };

    let mut config = Config {
        workspace,
        nim_exe: cli.nim_exe,
        deps_dir: cli.deps,
        dep_policy,
        prefer_https: cli.clone_using_https,
        norecipes: cli.norecipes,
        interactive: !cli.non_interactive,
        verbose: cli.verbose,
        foreign_deps: Vec::new(),
    };
    let mut prompt = StdinPrompt;

    match cli.command {
        Commands::Init => unreachable!("handled above"),
        Commands::Refresh => cli::refresh(&config),
        Commands::Search { terms } => cli::search(&config, terms),
        Commands::List => cli::list(&config),
        Commands::Clone { name } => cli::clone_package(&mut config, &mut prompt, &name),
        Commands::Build { backend, name } => {
            cli::build(&mut config, &mut prompt, &backend, &name)
        }
        Commands::Tinker { backend, name } => {
            cli::tinker_project(&mut config, &mut prompt, &backend, &name)
        }
        Commands::Update { name } => cli::update(&mut config, &mut prompt, name),
        Commands::Pinned { name } => cli::pinned(&config, &name),
    }
}
