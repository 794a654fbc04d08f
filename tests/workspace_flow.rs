//! Integration tests over a scratch workspace: catalog loading with its
//! refresh fallback, the project locator, and recipe persistence.

use std::cell::Cell;
use std::fs;
use std::path::Path;

use nawabs::packages::{determine_candidates, load_packages};
use nawabs::recipes::{load_recipe, write_recipe, Recipe};
use nawabs::workspace::{find_project, find_workspace, RECIPES_DIR};
use tempfile::TempDir;

fn scratch_workspace() -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join(RECIPES_DIR).join("packages")).unwrap();
    tmp
}

fn write_shard(workspace: &Path, file: &str, content: &str) {
    fs::write(
        workspace.join(RECIPES_DIR).join("packages").join(file),
        content,
    )
    .unwrap();
}

const FOO_RECORD: &str = r#"[{ "name": "foo", "url": "git://h/foo", "method": "git",
  "license": "MIT", "description": "d", "tags": [] }]"#;

#[test]
fn catalog_loads_shards_with_first_file_winning() {
    let ws = scratch_workspace();
    write_shard(
        ws.path(),
        "a.json",
        r#"[{ "name": "foo", "url": "git://h/first", "method": "git",
             "license": "MIT", "description": "d", "tags": ["one"] }]"#,
    );
    write_shard(
        ws.path(),
        "b.json",
        r#"[{ "name": "FOO", "url": "git://h/second", "method": "git",
             "license": "MIT", "description": "d", "tags": [] },
            { "name": "bar", "url": "git://h/bar", "method": "hg",
             "license": "MIT", "description": "d", "tags": [] }]"#,
    );

    let catalog = load_packages(ws.path(), || panic!("refresh must not run")).unwrap();
    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog[0].name, "foo");
    assert_eq!(catalog[0].url, "git://h/first");
    assert_eq!(catalog[1].name, "bar");
}

#[test]
fn catalog_decode_error_names_field_and_file() {
    let ws = scratch_workspace();
    write_shard(
        ws.path(),
        "broken.json",
        r#"[{ "name": "foo", "method": "git", "license": "MIT",
             "description": "d", "tags": [] }]"#,
    );

    let err = load_packages(ws.path(), || Ok(())).unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("url"));
    assert!(message.contains("broken.json"));
}

#[test]
fn empty_catalog_triggers_refresh_exactly_once() {
    let ws = scratch_workspace();
    let calls = Cell::new(0usize);

    let catalog = load_packages(ws.path(), || {
        calls.set(calls.get() + 1);
        write_shard(ws.path(), "seed.json", FOO_RECORD);
        Ok(())
    })
    .unwrap();

    assert_eq!(calls.get(), 1);
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog[0].name, "foo");
}

#[test]
fn refresh_that_produces_nothing_yields_empty_catalog() {
    let ws = scratch_workspace();
    let calls = Cell::new(0usize);

    let catalog = load_packages(ws.path(), || {
        calls.set(calls.get() + 1);
        Ok(())
    })
    .unwrap();

    assert_eq!(calls.get(), 1);
    assert!(catalog.is_empty());
}

#[test]
fn ranker_places_substring_ambiguity_in_one_bucket() {
    let ws = scratch_workspace();
    write_shard(
        ws.path(),
        "u.json",
        r#"[{ "name": "fooBar", "url": "git://h/fooBar", "method": "git",
             "license": "MIT", "description": "d", "tags": ["util"] },
            { "name": "foobaz", "url": "git://h/foobaz", "method": "git",
             "license": "MIT", "description": "d", "tags": ["util"] }]"#,
    );
    let catalog = load_packages(ws.path(), || Ok(())).unwrap();

    let candidates = determine_candidates(&catalog, &["foo".to_string()]);
    assert!(candidates.exact.is_empty());
    assert_eq!(candidates.substring.len(), 2);
    assert!(candidates.tag.is_empty());
}

#[test]
fn locator_prefers_direct_children_over_grouping_folders() {
    let ws = scratch_workspace();
    fs::create_dir_all(ws.path().join("foo")).unwrap();
    fs::create_dir_all(ws.path().join("group_/foo")).unwrap();

    let direct = find_project(ws.path(), "foo").unwrap();
    assert_eq!(direct.path(), ws.path().join("foo"));

    fs::remove_dir_all(ws.path().join("foo")).unwrap();
    let grouped = find_project(ws.path(), "foo").unwrap();
    assert_eq!(grouped.path(), ws.path().join("group_/foo"));
}

#[test]
fn workspace_is_discovered_from_nested_directories() {
    let ws = scratch_workspace();
    let nested = ws.path().join("group_/proj/src");
    fs::create_dir_all(&nested).unwrap();

    let found = find_workspace(&nested).unwrap();
    assert_eq!(
        found.canonicalize().unwrap(),
        ws.path().canonicalize().unwrap()
    );
    assert!(find_workspace(Path::new("/nonexistent-root")).is_none());
}

#[test]
fn recipes_round_trip_through_the_workspace() {
    let ws = scratch_workspace();
    let recipe = Recipe::new(
        "foo",
        "nim c --noNimblePath \"foo.nim\" --path:\"/ws/libA/src\"",
        vec!["/ws/libA/src".to_string()],
    );
    write_recipe(ws.path(), "foo", &recipe).unwrap();

    let loaded = load_recipe(ws.path(), "foo").unwrap().unwrap();
    assert_eq!(loaded, recipe);
    assert!(load_recipe(ws.path(), "other").unwrap().is_none());
}
