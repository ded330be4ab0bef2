use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use watchrun::fs::mock::MockFileSystem;
use watchrun::watch::compute_watch_set;
use watchrun_test_utils::builders::{ConfigBuilder, TaskBuilder};
use watchrun_test_utils::init_tracing;

fn project() -> MockFileSystem {
    let fs = MockFileSystem::new();
    fs.add_file("/proj/watchrun.yml", "");
    fs.add_file("/proj/README.md", "# readme");
    fs.add_file("/proj/src/main.go", "package main");
    fs.add_file("/proj/src/util/strings.go", "package util");
    fs.add_file("/proj/assets/site.css", "body {}");
    fs.add_file("/proj/assets/vendor/lib.min.css", "");
    fs.add_dir("/proj/empty");
    fs
}

fn set(paths: &[&str]) -> BTreeSet<PathBuf> {
    paths.iter().map(PathBuf::from).collect()
}

#[test]
fn only_directories_holding_matched_files_are_watched() {
    init_tracing();
    let fs = project();
    let cfg = ConfigBuilder::new()
        .task(TaskBuilder::matching("**/*.go").command("go build"))
        .build_in("/proj");

    let dirs = compute_watch_set(&fs, Path::new("/proj"), Path::new("/proj"), cfg.rules());

    assert_eq!(dirs, set(&["/proj", "/proj/src", "/proj/src/util"]));
}

#[test]
fn ignore_patterns_and_op_filters_do_not_shrink_the_set() {
    init_tracing();
    let fs = project();
    let cfg = ConfigBuilder::new()
        .task(
            TaskBuilder::matching("assets/**/*.css")
                .ignore("**/*.min.css")
                .op("create"),
        )
        .build_in("/proj");

    let dirs = compute_watch_set(&fs, Path::new("/proj"), Path::new("/proj"), cfg.rules());

    assert_eq!(dirs, set(&["/proj", "/proj/assets", "/proj/assets/vendor"]));
}

#[test]
fn config_directory_is_always_included() {
    init_tracing();
    let fs = project();
    fs.add_file("/etc/watchrun/watchrun.yml", "");

    let dirs = compute_watch_set(&fs, Path::new("/proj"), Path::new("/etc/watchrun"), &[]);

    assert_eq!(dirs, set(&["/etc/watchrun", "/proj"]));
}

#[test]
fn inert_rules_contribute_nothing() {
    init_tracing();
    let fs = project();
    let cfg = ConfigBuilder::new()
        .task(TaskBuilder::unmatched().command("echo never"))
        .task(TaskBuilder::matching(":virtual").command("echo named"))
        .build_in("/proj");

    let dirs = compute_watch_set(&fs, Path::new("/proj"), Path::new("/proj"), cfg.rules());

    assert_eq!(dirs, set(&["/proj"]));
}

// The walk is a snapshot. A directory created afterwards is not watched
// until the next reload recomputes the set.
#[test]
fn directories_created_after_the_walk_need_a_reload() {
    init_tracing();
    let fs = project();
    let cfg = ConfigBuilder::new()
        .task(TaskBuilder::matching("**/*.go").command("go build"))
        .build_in("/proj");

    let before = compute_watch_set(&fs, Path::new("/proj"), Path::new("/proj"), cfg.rules());
    fs.add_file("/proj/cmd/tool/main.go", "package main");

    assert!(!before.contains(Path::new("/proj/cmd/tool")));

    let after = compute_watch_set(&fs, Path::new("/proj"), Path::new("/proj"), cfg.rules());
    assert!(after.contains(Path::new("/proj/cmd/tool")));
    assert!(!after.contains(Path::new("/proj/cmd")));
}

#[test]
fn directory_symlinks_are_not_followed() {
    init_tracing();
    let fs = project();
    fs.add_symlink("/proj/src/up", "/proj");
    fs.add_symlink("/proj/linked", "/proj/src/util");
    let cfg = ConfigBuilder::new()
        .task(TaskBuilder::matching("**/*.go").command("go build"))
        .build_in("/proj");

    let dirs = compute_watch_set(&fs, Path::new("/proj"), Path::new("/proj"), cfg.rules());

    assert_eq!(dirs, set(&["/proj", "/proj/src", "/proj/src/util"]));
}

#[cfg(unix)]
#[test]
fn symlink_loops_on_disk_do_not_stall_the_walk() {
    use std::os::unix::fs::symlink;
    use std::sync::mpsc;
    use std::time::Duration;

    use watchrun::fs::RealFileSystem;

    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().to_path_buf();
    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::write(root.join("src/main.go"), "package main").unwrap();
    symlink(&root, root.join("src/up1")).unwrap();
    symlink(&root, root.join("src/up2")).unwrap();

    let cfg = ConfigBuilder::new()
        .task(TaskBuilder::matching("**/*.go").command("go build"))
        .build_in(&root);

    let (tx, rx) = mpsc::channel();
    let walk_root = root.clone();
    std::thread::spawn(move || {
        let dirs = compute_watch_set(&RealFileSystem, &walk_root, &walk_root, cfg.rules());
        let _ = tx.send(dirs);
    });

    let dirs = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("watch-set walk did not finish");
    let expected: BTreeSet<PathBuf> = [root.clone(), root.join("src")].into_iter().collect();
    assert_eq!(dirs, expected);
}
