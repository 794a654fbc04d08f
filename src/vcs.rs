//! Process execution and the clone/pull capability over git and hg.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::{Command, ExitStatus, Output, Stdio};
use std::time::Instant;

use crate::prompt::Prompt;
use crate::workspace::{self, Project};

const PULL_RETRIES: usize = 3;

/// Runs a full command line through the shell, inheriting stdio.
pub fn exec(cmd: &str) -> Result<ExitStatus> {
    Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .status()
        .with_context(|| format!("Failed to execute: {}", cmd))
}

/// Runs a full command line through the shell from `dir`, inheriting stdio.
pub fn exec_in(cmd: &str, dir: &Path) -> Result<ExitStatus> {
    Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .current_dir(dir)
        .status()
        .with_context(|| format!("Failed to execute in {}: {}", dir.display(), cmd))
}

/// Runs a program with captured output.
pub fn run(program: &str, args: &[&str], dir: Option<&Path>) -> Result<Output> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    cmd.output()
        .with_context(|| format!("Failed to execute {} {}", program, args.join(" ")))
}

/// Silent probe: does the command exist and exit successfully?
fn probe(program: &str, args: &[&str]) -> bool {
    Command::new(program)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Normalizes a clone URL: rewrites `git://` to `https://` when preferred,
/// and drops a trailing slash on github.com URLs (a known `ls-remote`
/// failure mode).
pub fn normalize_url(url: &str, prefer_https: bool) -> String {
    let mut url = url.to_string();
    if prefer_https {
        if let Some(rest) = url.strip_prefix("git://") {
            url = format!("https://{}", rest);
        }
    }
    if url.contains("github.com") && url.ends_with('/') {
        url.pop();
    }
    url
}

/// Clones `url` into `dest/<name>`, choosing the VCS by protocol probe:
/// `git ls-remote` first, then `hg identify`.
pub fn clone_url(url: &str, dest: &Path, name: &str, prefer_https: bool) -> Result<()> {
    let url = normalize_url(url, prefer_https);
    println!("Cloning {} into {}", url, dest.join(name).display());

    if probe("git", &["ls-remote", &url]) {
        let status = Command::new("git")
            .args(["clone", &url, name])
            .current_dir(dest)
            .status()
            .with_context(|| format!("Failed to execute git clone {}", url))?;
        if !status.success() {
            anyhow::bail!("git clone failed for {}", url);
        }
    } else if probe("hg", &["identify", &url]) {
        let status = Command::new("hg")
            .args(["clone", &url, name])
            .current_dir(dest)
            .status()
            .with_context(|| format!("Failed to execute hg clone {}", url))?;
        if !status.success() {
            anyhow::bail!("hg clone failed for {}", url);
        }
    } else {
        anyhow::bail!("unable to identify url: {}", url);
    }
    Ok(())
}

/// Pulls updates for one checkout. The git branch pulls only when the
/// working tree is clean; transient pull failures are retried a bounded
/// number of times. The hg branch pulls without the status check, as the
/// original behavior does.
pub fn update_project(path: &Path) -> Result<bool> {
    if path.join(".git").exists() {
        let status = run("git", &["status", "--porcelain"], Some(path))?;
        if !status.status.success() || !status.stdout.is_empty() {
            println!("Skipping {} (working tree not clean)", path.display());
            return Ok(false);
        }
        for attempt in 1..=PULL_RETRIES {
            let pull = Command::new("git")
                .arg("pull")
                .current_dir(path)
                .status()
                .with_context(|| format!("Failed to execute git pull in {}", path.display()))?;
            if pull.success() {
                return Ok(true);
            }
            if attempt < PULL_RETRIES {
                println!("git pull failed, retrying ({}/{})", attempt, PULL_RETRIES);
            }
        }
        anyhow::bail!(
            "git pull failed for {} after {} attempts",
            path.display(),
            PULL_RETRIES
        );
    } else if path.join(".hg").exists() {
        let pull = Command::new("hg")
            .arg("pull")
            .current_dir(path)
            .status()
            .with_context(|| format!("Failed to execute hg pull in {}", path.display()))?;
        if !pull.success() {
            anyhow::bail!("hg pull failed for {}", path.display());
        }
        return Ok(true);
    }
    Ok(false)
}

struct UpdateSummary {
    updated: usize,
    skipped: usize,
    failed: usize,
    start_time: Instant,
}

impl UpdateSummary {
    fn new() -> Self {
        Self {
            updated: 0,
            skipped: 0,
            failed: 0,
            start_time: Instant::now(),
        }
    }

    fn finish(&self) {
        let elapsed = self.start_time.elapsed();
        println!("\n{}", "=".repeat(60));
        println!("Update summary:");
        println!("  Updated: {}", self.updated);
        println!("  Skipped: {}", self.skipped);
        println!("  Failed:  {}", self.failed);
        println!("  Duration: {:.2}s", elapsed.as_secs_f64());
        println!("{}", "=".repeat(60));
    }
}

/// Pulls every project in the workspace, descending into grouping folders.
/// Under the ask policy each project is confirmed first.
pub fn update_everything(
    root: &Path,
    ask: bool,
    prompt: &mut dyn Prompt,
) -> Result<()> {
    let projects: Vec<Project> = workspace::projects_under(root);
    let mut summary = UpdateSummary::new();

    for project in projects {
        if ask {
            let answer = prompt.ask(&format!("Update {}? [y/n] ", project.name))?;
            if !matches!(answer.trim(), "y" | "yes") {
                summary.skipped += 1;
                continue;
            }
        }
        match update_project(&project.path()) {
            Ok(true) => summary.updated += 1,
            Ok(false) => summary.skipped += 1,
            Err(err) => {
                eprintln!("error: {:#}", err);
                summary.failed += 1;
            }
        }
    }

    summary.finish();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_url_rewrites_git_scheme() {
        assert_eq!(
            normalize_url("git://github.com/x/y/", true),
            "https://github.com/x/y"
        );
        assert_eq!(
            normalize_url("git://github.com/x/y", false),
            "git://github.com/x/y"
        );
    }

    #[test]
    fn test_normalize_url_trims_github_trailing_slash_only() {
        assert_eq!(
            normalize_url("https://github.com/x/y/", false),
            "https://github.com/x/y"
        );
        assert_eq!(normalize_url("https://other.org/x/y/", false), "https://other.org/x/y/");
    }

    #[test]
    fn test_update_project_ignores_plain_directories() {
        let tmp = TempDir::new().unwrap();
        assert!(!update_project(tmp.path()).unwrap());
    }
}
