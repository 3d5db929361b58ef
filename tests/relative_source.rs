// Changes the process working directory, so it lives in its own test binary.

use std::path::Path;

use snapkeep::snapshot::scan_source;

#[test]
fn relative_source_paths_are_scanned_like_absolute_ones() {
    let tmp = tempfile::tempdir().unwrap();
    let proj = tmp.path().join("proj");
    std::fs::create_dir_all(proj.join("src")).unwrap();
    std::fs::create_dir_all(proj.join("node_modules/pkg")).unwrap();
    std::fs::write(proj.join("src/main.rs"), "fn main() {}").unwrap();
    std::fs::write(proj.join("node_modules/pkg/index.js"), "x").unwrap();
    std::fs::write(proj.join("notes.txt"), "n").unwrap();

    std::env::set_current_dir(tmp.path()).unwrap();
    let (root, eligible) = scan_source(Path::new("proj"), 1024).unwrap();

    assert!(root.is_absolute());
    let paths: Vec<&str> = eligible.files.iter().map(|f| f.rel_path.as_str()).collect();
    assert_eq!(paths, vec!["notes.txt", "src/main.rs"]);
}
