use std::fs;
use std::path::Path;

#[path = "../../core/tests/common/synth.rs"]
mod synth;

use amdfw_core::model::ContentId;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use synth::{psp_binary, ImageBuilder};
use tempfile::tempdir;

fn init(root: &Path) {
    cargo_bin_cmd!("amdfw-analyser")
        .arg("init-workspace")
        .arg("--root")
        .arg(root)
        .arg("--name")
        .arg("TestWorkspace")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized firmware workspace"));
}

fn write_image(root: &Path, file: &str) -> (Vec<u8>, ContentId) {
    let bytes = ImageBuilder::new(0x10_0000)
        .psp_entry(0x01, psp_binary([0x54, 0, 0x0B, 0], &[0x11; 0x40], false))
        .psp_entry(0x00, vec![0xA5; 0x240])
        .build();
    fs::write(root.join(file), &bytes).expect("write image");
    let id = ContentId::of(&bytes);
    (bytes, id)
}

fn add(root: &Path, file: &str) {
    cargo_bin_cmd!("amdfw-analyser")
        .arg("add-image")
        .arg("--root")
        .arg(root)
        .arg("--path")
        .arg(file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Added image"));
}

fn json_stdout(args: &[&str], root: &Path) -> serde_json::Value {
    let output = cargo_bin_cmd!("amdfw-analyser")
        .args(args)
        .arg("--root")
        .arg(root)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("json output")
}

#[test]
fn init_workspace_creates_layout_and_reports_info() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path();
    init(root);

    assert!(root.join(".amdfw/workspace.json").is_file());
    assert!(root.join(".amdfw/documents.db").is_file());
    assert!(root.join(".amdfw/blobs").is_dir());

    let info = json_stdout(&["workspace-info", "--json"], root);
    assert_eq!(info["name"], "TestWorkspace");
    assert_eq!(info["images"], 0);
    assert_eq!(info["detector_rules"], 2);
    assert_eq!(info["parsers"], serde_json::json!(["amdfw"]));

    cargo_bin_cmd!("amdfw-analyser")
        .arg("workspace-info")
        .arg("--root")
        .arg(root)
        .assert()
        .success()
        .stdout(predicate::str::contains("Name: TestWorkspace"));
}

#[test]
fn init_workspace_refuses_to_overwrite() {
    let dir = tempdir().expect("tempdir");
    init(dir.path());
    cargo_bin_cmd!("amdfw-analyser")
        .arg("init-workspace")
        .arg("--root")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("already initialized"));
}

#[test]
fn commands_without_workspace_point_at_init() {
    let dir = tempdir().expect("tempdir");
    cargo_bin_cmd!("amdfw-analyser")
        .arg("list-images")
        .arg("--root")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("run init-workspace first"));
}

#[test]
fn add_analyse_and_list_round_trip() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path();
    init(root);
    let (bytes, id) = write_image(root, "board.bin");
    add(root, "board.bin");

    let images = json_stdout(&["list-images", "--json"], root);
    assert_eq!(images.as_array().map(Vec::len), Some(1));
    assert_eq!(images[0]["ID"], id.as_str());
    assert_eq!(images[0]["Name"], "board.bin");
    assert_eq!(images[0]["Size"], bytes.len() as u64);

    cargo_bin_cmd!("amdfw-analyser")
        .arg("analyse")
        .arg("--root")
        .arg(root)
        .arg("--id")
        .arg(id.as_str())
        .assert()
        .success()
        .stdout(predicate::str::contains("entries persisted: 2"));

    let entries = json_stdout(&["list-entries", "--json"], root);
    assert_eq!(entries.as_array().map(Vec::len), Some(2));

    let doc = json_stdout(&["show-image", "--id", id.as_str()], root);
    assert_eq!(doc["Name"], "board.bin");
    let dir0 = &doc["AMD"]["Firmware"]["Roms"][0]["Directories"][0];
    assert_eq!(dir0["Header"]["ChecksumValid"], true);

    let passes = json_stdout(&["list-passes", "--image", id.as_str(), "--json"], root);
    assert_eq!(passes[0]["status"], "succeeded");
    assert_eq!(passes[0]["entries_persisted"], 2);

    cargo_bin_cmd!("amdfw-analyser")
        .arg("list-entries")
        .arg("--root")
        .arg(root)
        .assert()
        .success()
        .stdout(predicate::str::contains("AMD_PUBLIC_KEY"));
}

#[test]
fn analyse_fails_for_unregistered_image() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path();
    init(root);
    let missing = ContentId::of(b"never added");

    cargo_bin_cmd!("amdfw-analyser")
        .arg("analyse")
        .arg("--root")
        .arg(root)
        .arg("--id")
        .arg(missing.as_str())
        .assert()
        .failure()
        .stdout(predicate::str::contains("FAILED"))
        .stderr(predicate::str::contains("1 of 1 analysis passes failed"));

    let passes = json_stdout(&["list-passes", "--json"], root);
    assert_eq!(passes[0]["status"], "failed");
}

#[test]
fn analyse_rejects_malformed_ids() {
    let dir = tempdir().expect("tempdir");
    init(dir.path());
    cargo_bin_cmd!("amdfw-analyser")
        .arg("analyse")
        .arg("--root")
        .arg(dir.path())
        .arg("--id")
        .arg("not-a-hash")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid image id"));
}

#[test]
fn consume_processes_work_items_from_file() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path();
    init(root);
    let (_, id) = write_image(root, "board.bin");
    add(root, "board.bin");

    let items = root.join("items.jsonl");
    fs::write(&items, format!("{{\"ID\": \"{id}\", \"Source\": \"queue\"}}\n\n")).unwrap();
    cargo_bin_cmd!("amdfw-analyser")
        .arg("consume")
        .arg("--root")
        .arg(root)
        .arg("--file")
        .arg(&items)
        .assert()
        .success()
        .stdout(predicate::str::contains("Consumed 1 work items: 1 succeeded"));

    // Redelivery plus a malformed line: the pass still succeeds, the line is rejected.
    fs::write(&items, format!("{{\"ID\": \"{id}\"}}\nnot json\n")).unwrap();
    cargo_bin_cmd!("amdfw-analyser")
        .arg("consume")
        .arg("--root")
        .arg(root)
        .arg("--file")
        .arg(&items)
        .assert()
        .failure()
        .stdout(predicate::str::contains("Line 2: rejected"))
        .stdout(predicate::str::contains("1 succeeded, 0 failed, 1 rejected"));

    let entries = json_stdout(&["list-entries", "--json"], root);
    assert_eq!(entries.as_array().map(Vec::len), Some(2));
}

#[test]
fn consume_reads_stdin_by_default() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path();
    init(root);
    let (_, id) = write_image(root, "board.bin");
    add(root, "board.bin");

    cargo_bin_cmd!("amdfw-analyser")
        .arg("consume")
        .arg("--root")
        .arg(root)
        .write_stdin(format!("{{\"ID\": \"{id}\"}}\n"))
        .assert()
        .success()
        .stdout(predicate::str::contains("1 succeeded"));
}

#[test]
fn list_rules_shows_builtin_and_workspace_rules() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path();
    init(root);

    cargo_bin_cmd!("amdfw-analyser")
        .arg("list-rules")
        .arg("--root")
        .arg(root)
        .assert()
        .success()
        .stdout(predicate::str::contains("AGESA"))
        .stdout(predicate::str::contains("Certificates"));

    fs::write(root.join(".amdfw/rules.yaml"), "rules:\n  - name: Banner\n    pattern: 'BANNER'\n")
        .unwrap();
    let rules = json_stdout(&["list-rules", "--json"], root);
    assert_eq!(rules.as_array().map(Vec::len), Some(1));
    assert_eq!(rules[0]["name"], "Banner");
}

#[test]
fn info_logging_goes_to_stderr() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path();
    init(root);
    write_image(root, "board.bin");

    cargo_bin_cmd!("amdfw-analyser")
        .arg("--log-level")
        .arg("info")
        .arg("add-image")
        .arg("--root")
        .arg(root)
        .arg("--path")
        .arg("board.bin")
        .assert()
        .success()
        .stdout(predicate::str::contains("registered image").not())
        .stderr(predicate::str::contains("registered image"));
}
