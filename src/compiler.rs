//! The compiler collaborator: invocation, diagnostic classification, project
//! info extraction and source-path discovery.

use anyhow::{Context, Result};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

/// Extension of the language's source files.
pub const SOURCE_EXT: &str = "nim";

/// Global flag that disables the ecosystem's default package-path discovery.
pub const NO_PKG_PATH_FLAG: &str = "--noNimblePath";

/// Outcome of one compiler invocation. The filename carried by `FileMissing`
/// has its extension stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Success,
    Failure(String),
    FileMissing(String),
}

/// Per-build information queried from a project: compiler sub-command hint
/// (may be empty), required package names or URLs, and foreign system
/// dependencies surfaced to the user verbatim.
#[derive(Debug, Clone, Default)]
pub struct ProjectInfo {
    pub backend: String,
    pub requires: Vec<String>,
    pub foreign_deps: Vec<String>,
}

fn missing_file_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Error: cannot open file: (.+)\s*$").expect("valid regex"))
}

fn error_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^.*Error: .*$").expect("valid regex"))
}

/// Composes the exact command line for one invocation: the compiler
/// executable, the assembled arguments, and one `--path:` entry per resolved
/// search path.
pub fn compose_command(nim_exe: &str, args: &str, path: &[String]) -> String {
    let mut cmd = format!("{}{}", nim_exe, args);
    for p in path {
        cmd.push_str(&format!(" --path:\"{}\"", p));
    }
    cmd
}

/// Invokes the compiler through the shell and classifies its output.
pub fn call_compiler(nim_exe: &str, args: &str, path: &[String]) -> Result<Action> {
    let cmd = compose_command(nim_exe, args, path);
    let output = Command::new("sh")
        .arg("-c")
        .arg(&cmd)
        .output()
        .with_context(|| format!("Failed to execute compiler: {}", cmd))?;

    let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(classify_output(&combined, output.status.success()))
}

/// Maps compiler output to an [`Action`]. A zero exit is a success; among
/// failures, a missing-file diagnostic wins over other errors, which become
/// a hard failure carrying the first error line (or the output tail when the
/// compiler printed none).
pub fn classify_output(output: &str, exit_ok: bool) -> Action {
    if exit_ok {
        return Action::Success;
    }
    for line in output.lines() {
        if let Some(cap) = missing_file_re().captures(line) {
            let file = cap.get(1).map(|m| m.as_str().trim()).unwrap_or("");
            return Action::FileMissing(strip_source_ext(file));
        }
    }
    let message = error_line_re()
        .find(output)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| {
            output
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("compiler exited with a failure status")
                .to_string()
        });
    Action::Failure(message)
}

fn strip_source_ext(file: &str) -> String {
    let basename_start = file.rfind(['/', '\\']).map(|i| i + 1).unwrap_or(0);
    match file[basename_start..].rfind('.') {
        Some(dot) => file[..basename_start + dot].to_string(),
        None => file.to_string(),
    }
}

fn backend_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?m)^\s*backend\s*=\s*"([^"]+)""#).expect("valid regex"))
}

fn requires_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*requires[\s(]+(.+)$").expect("valid regex"))
}

fn foreign_dep_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?m)^\s*foreignDep\s+"([^"]+)""#).expect("valid regex"))
}

/// Reads a project's declaration file (`<name>.nimble`, or a sole `*.nimble`
/// in the project root). A project without one gets the default info: empty
/// backend, no requirements.
pub fn read_project_info(project_dir: &Path, name: &str) -> Result<ProjectInfo> {
    let Some(decl) = find_decl_file(project_dir, name) else {
        return Ok(ProjectInfo::default());
    };
    let content = fs::read_to_string(&decl)
        .with_context(|| format!("Failed to read {}", decl.display()))?;
    Ok(parse_project_info(&content))
}

fn find_decl_file(project_dir: &Path, name: &str) -> Option<PathBuf> {
    let named = project_dir.join(format!("{}.nimble", name));
    if named.exists() {
        return Some(named);
    }
    let entries = fs::read_dir(project_dir).ok()?;
    let mut nimbles: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("nimble"))
        .collect();
    nimbles.sort();
    nimbles.into_iter().next()
}

fn parse_project_info(content: &str) -> ProjectInfo {
    let mut info = ProjectInfo::default();

    if let Some(cap) = backend_re().captures(content) {
        info.backend = cap[1].to_string();
    }
    for cap in requires_re().captures_iter(content) {
        for item in cap[1].split(',') {
            let item = item
                .trim()
                .trim_end_matches(')')
                .trim_matches(|c| c == '"' || c == '\'')
                .trim();
            // Drop version constraints: the package reference is the first
            // token. The compiler itself is never a package requirement.
            let Some(reference) = item.split_whitespace().next() else {
                continue;
            };
            if reference.eq_ignore_ascii_case("nim") {
                continue;
            }
            info.requires.push(reference.to_string());
        }
    }
    for cap in foreign_dep_re().captures_iter(content) {
        info.foreign_deps.push(cap[1].to_string());
    }
    info
}

/// Locates the project's main source file: `<name>.nim` in the project root,
/// then `src/<name>.nim`, then a sole top-level `.nim` file. The returned
/// path is relative to the project root.
pub fn find_main_file(project_dir: &Path, name: &str) -> Option<PathBuf> {
    for stem in [name.to_string(), name.to_lowercase()] {
        let root_main = format!("{}.{}", stem, SOURCE_EXT);
        if project_dir.join(&root_main).exists() {
            return Some(PathBuf::from(root_main));
        }
        let src_main = Path::new("src").join(&root_main);
        if project_dir.join(&src_main).exists() {
            return Some(src_main);
        }
    }

    let entries = fs::read_dir(project_dir).ok()?;
    let mut sources: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some(SOURCE_EXT))
        .collect();
    if sources.len() == 1 {
        let sole = sources.pop()?;
        return Some(PathBuf::from(sole.file_name()?));
    }
    None
}

fn file_names_match(found: &str, wanted: &str) -> bool {
    // Follow the OS's path-comparison rule.
    if cfg!(windows) {
        found.eq_ignore_ascii_case(wanted)
    } else {
        found == wanted
    }
}

/// Recursively collects every directory under `root` containing a file named
/// `<stem>.nim`. Matching follows the OS's path-comparison rule.
pub fn find_src_paths(root: &Path, stem: &str) -> Vec<PathBuf> {
    let wanted = format!("{}.{}", stem, SOURCE_EXT);
    let mut matches = Vec::new();
    collect_src_paths(root, &wanted, &mut matches);
    matches
}

fn collect_src_paths(dir: &Path, wanted: &str, matches: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
    paths.sort();

    let mut contains_match = false;
    for path in &paths {
        if path.is_file() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if file_names_match(name, wanted) {
                    contains_match = true;
                }
            }
        }
    }
    if contains_match {
        matches.push(dir.to_path_buf());
    }
    for path in paths {
        if path.is_dir() {
            collect_src_paths(&path, wanted, matches);
        }
    }
}

/// Picks the shortest-path directory among the matches; ties go to the first
/// encountered. The tiebreak is definitional, not incidental.
pub fn select_src_path(matches: &[PathBuf]) -> Option<&PathBuf> {
    let mut best: Option<(&PathBuf, usize)> = None;
    for m in matches {
        let len = m.components().count();
        match best {
            Some((_, best_len)) if len >= best_len => {}
            _ => best = Some((m, len)),
        }
    }
    best.map(|(m, _)| m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_classify_success() {
        assert_eq!(classify_output("Hint: operation successful\n", true), Action::Success);
    }

    #[test]
    fn test_classify_missing_file_strips_extension() {
        let out = "foo.nim(1, 8) Error: cannot open file: libA/mod.nim\n";
        assert_eq!(
            classify_output(out, false),
            Action::FileMissing("libA/mod".to_string())
        );
    }

    #[test]
    fn test_classify_missing_file_without_extension() {
        let out = "foo.nim(2, 8) Error: cannot open file: strutils2\n";
        assert_eq!(
            classify_output(out, false),
            Action::FileMissing("strutils2".to_string())
        );
    }

    #[test]
    fn test_classify_hard_failure_keeps_error_line() {
        let out = "foo.nim(3, 1) Error: undeclared identifier: 'bar'\n";
        match classify_output(out, false) {
            Action::Failure(msg) => assert!(msg.contains("undeclared identifier")),
            other => panic!("expected Failure, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_project_info_requires_and_backend() {
        let content = r#"
version = "1.2.0"
backend = "js"
requires "nim >= 1.6.0", "libA", "libB >= 0.3"
requires "libC"
foreignDep "openssl"
"#;
        let info = parse_project_info(content);
        assert_eq!(info.backend, "js");
        assert_eq!(info.requires, vec!["libA", "libB", "libC"]);
        assert_eq!(info.foreign_deps, vec!["openssl"]);
    }

    #[test]
    fn test_read_project_info_defaults_without_decl_file() {
        let tmp = TempDir::new().unwrap();
        let info = read_project_info(tmp.path(), "foo").unwrap();
        assert!(info.backend.is_empty());
        assert!(info.requires.is_empty());
    }

    #[test]
    fn test_find_main_file_preference_order() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("src")).unwrap();
        fs::write(tmp.path().join("src/foo.nim"), "").unwrap();
        assert_eq!(
            find_main_file(tmp.path(), "foo").unwrap(),
            PathBuf::from("src/foo.nim")
        );

        fs::write(tmp.path().join("foo.nim"), "").unwrap();
        assert_eq!(
            find_main_file(tmp.path(), "foo").unwrap(),
            PathBuf::from("foo.nim")
        );
    }

    #[test]
    fn test_find_main_file_sole_source_fallback() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("other.nim"), "").unwrap();
        assert_eq!(
            find_main_file(tmp.path(), "foo").unwrap(),
            PathBuf::from("other.nim")
        );

        fs::write(tmp.path().join("second.nim"), "").unwrap();
        assert!(find_main_file(tmp.path(), "foo").is_none());
    }

    #[test]
    fn test_find_src_paths_and_shortest_selection() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("src/deep")).unwrap();
        fs::write(tmp.path().join("src/mod.nim"), "").unwrap();
        fs::write(tmp.path().join("src/deep/mod.nim"), "").unwrap();

        let matches = find_src_paths(tmp.path(), "mod");
        assert_eq!(matches.len(), 2);
        let best = select_src_path(&matches).unwrap();
        assert_eq!(best, &tmp.path().join("src"));
    }

    #[test]
    fn test_find_src_paths_no_match_is_empty() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("src")).unwrap();
        assert!(find_src_paths(tmp.path(), "mod").is_empty());
    }
}
