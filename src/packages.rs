//! The package catalog: merged JSON manifest shards, candidate ranking and
//! interactive selection.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::prompt::Prompt;
use crate::workspace::RECIPES_DIR;

/// A catalog record. Identity is `name`, compared case-insensitively;
/// records are immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub url: String,
    #[serde(rename = "method")]
    pub download_method: String,
    pub license: String,
    pub description: String,
    pub tags: Vec<String>,
    #[serde(default)]
    pub version: String,
    #[serde(default, rename = "dvcs-tag")]
    pub dvcs_tag: String,
    #[serde(default)]
    pub web: String,
}

impl Package {
    /// Minimal record synthesized from a raw URL reference. The name is the
    /// URL's filename component with any `.git` suffix stripped.
    pub fn from_url(url: &str) -> Self {
        let name = url
            .trim_end_matches('/')
            .rsplit(['/', ':'])
            .next()
            .unwrap_or(url)
            .trim_end_matches(".git")
            .to_string();
        Self {
            name,
            url: url.to_string(),
            download_method: "git".to_string(),
            license: String::new(),
            description: String::new(),
            tags: Vec::new(),
            version: String::new(),
            dvcs_tag: String::new(),
            web: String::new(),
        }
    }
}

/// Looks up a package by name, case-insensitively.
pub fn lookup<'a>(catalog: &'a [Package], name: &str) -> Option<&'a Package> {
    let want = name.to_lowercase();
    catalog.iter().find(|p| p.name.to_lowercase() == want)
}

fn manifest_shards(workspace: &Path) -> Vec<std::path::PathBuf> {
    let dir = workspace.join(RECIPES_DIR).join("packages");
    let Ok(entries) = fs::read_dir(&dir) else {
        return Vec::new();
    };
    let mut shards: Vec<_> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    shards.sort();
    shards
}

/// Loads every manifest shard under `<workspace>/recipes_/packages/`.
///
/// Shards are read in lexical filename order; a name already present is
/// silently skipped, so earlier files win. When no shard exists at all the
/// `refresh` capability is invoked exactly once and the scan retried; a
/// second empty scan yields an empty catalog.
pub fn load_packages<F>(workspace: &Path, refresh: F) -> Result<Vec<Package>>
where
    F: FnOnce() -> Result<()>,
{
    let mut shards = manifest_shards(workspace);
    if shards.is_empty() {
        refresh()?;
        shards = manifest_shards(workspace);
    }

    let mut catalog = Vec::new();
    let mut seen = HashSet::new();
    for shard in &shards {
        let content = fs::read_to_string(shard)
            .with_context(|| format!("Failed to read package manifest {}", shard.display()))?;
        let records: Vec<Package> = serde_json::from_str(&content)
            .with_context(|| format!("Invalid package manifest {}", shard.display()))?;
        for record in records {
            if seen.insert(record.name.to_lowercase()) {
                catalog.push(record);
            }
        }
    }
    Ok(catalog)
}

/// Three-tier ranking of catalog entries against a set of query terms.
#[derive(Debug, Default)]
pub struct Candidates {
    pub exact: Vec<Package>,
    pub substring: Vec<Package>,
    pub tag: Vec<Package>,
}

impl Candidates {
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.substring.is_empty() && self.tag.is_empty()
    }

    fn buckets(&self) -> [&[Package]; 3] {
        [&self.exact, &self.substring, &self.tag]
    }
}

/// Ranks every package against `terms`. Comparison is case-insensitive over
/// Unicode lowercasing. For each package the first matching term decides the
/// bucket; later terms never upgrade a package to a higher-priority bucket,
/// and a package lands in at most one bucket per call.
pub fn determine_candidates(catalog: &[Package], terms: &[String]) -> Candidates {
    let terms: Vec<String> = terms.iter().map(|t| t.to_lowercase()).collect();
    let mut candidates = Candidates::default();

    for package in catalog {
        let name = package.name.to_lowercase();
        for term in &terms {
            if *term == name {
                candidates.exact.push(package.clone());
            } else if name.contains(term.as_str()) {
                candidates.substring.push(package.clone());
            } else if package
                .tags
                .iter()
                .any(|tag| tag.to_lowercase().contains(term.as_str()))
            {
                candidates.tag.push(package.clone());
            } else {
                continue;
            }
            break;
        }
    }
    candidates
}

/// Walks the buckets in priority order and picks a winner from the first
/// non-empty one. A single entry wins outright; multiple entries print their
/// URLs and prompt for an index, or fail under a non-interactive policy.
/// Returns `None` when there is nothing to select or the user answered
/// `abort`.
pub fn select(
    candidates: &Candidates,
    interactive: bool,
    prompt: &mut dyn Prompt,
) -> Result<Option<Package>> {
    for bucket in candidates.buckets() {
        match bucket {
            [] => continue,
            [single] => return Ok(Some(single.clone())),
            multiple => {
                println!("Found multiple candidate packages:");
                for (i, package) in multiple.iter().enumerate() {
                    println!("  [{}] {} ({})", i + 1, package.name, package.url);
                }
                if !interactive {
                    anyhow::bail!(
                        "ambiguous package specifier: {} candidates and interaction is disabled",
                        multiple.len()
                    );
                }
                loop {
                    let answer = prompt.ask(&format!(
                        "Which one? [1..{} or abort] ",
                        multiple.len()
                    ))?;
                    let answer = answer.trim();
                    if answer == "abort" {
                        return Ok(None);
                    }
                    match answer.parse::<usize>() {
                        Ok(i) if i >= 1 && i <= multiple.len() => {
                            return Ok(Some(multiple[i - 1].clone()))
                        }
                        _ => println!("Please answer a number in 1..{} or 'abort'", multiple.len()),
                    }
                }
            }
        }
    }
    Ok(None)
}
