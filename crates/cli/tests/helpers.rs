use std::fs;
use std::path::Path;

use amdfw_analyser::{canonicalize_or_current, infer_workspace_name, read_image_file};
use tempfile::tempdir;

#[test]
fn canonicalize_or_current_returns_cwd_for_dot() {
    let original = std::env::current_dir().expect("cwd");
    let tmp = tempdir().expect("tempdir");
    std::env::set_current_dir(tmp.path()).expect("chdir tmp");

    let result = canonicalize_or_current(".").expect("canonicalize").canonicalize().expect("canon");
    let expected = tmp.path().canonicalize().expect("canon tmp");
    std::env::set_current_dir(original).expect("restore cwd");
    assert_eq!(result, expected);
}

#[test]
fn canonicalize_or_current_keeps_missing_paths_absolute() {
    let result = canonicalize_or_current("does/not/exist/yet").expect("canonicalize");
    assert!(result.is_absolute());
    assert!(result.ends_with("does/not/exist/yet"));
}

#[test]
fn infer_workspace_name_uses_last_path_component() {
    assert_eq!(infer_workspace_name(Path::new("/tmp/board-fw")), "board-fw");
    assert_eq!(infer_workspace_name(Path::new("/")), "unnamed-workspace");
}

#[test]
fn read_image_file_resolves_relative_to_root() {
    let tmp = tempdir().expect("tempdir");
    fs::write(tmp.path().join("rom.bin"), b"rom").expect("write image");

    let (path, bytes) = read_image_file(tmp.path(), "rom.bin").expect("read relative");
    assert_eq!(path, tmp.path().join("rom.bin"));
    assert_eq!(bytes, b"rom");

    let err = read_image_file(tmp.path(), "missing.bin").unwrap_err();
    assert!(err.to_string().contains("Failed to read firmware image"));
}
