use std::io::Cursor;

#[path = "../../core/tests/common/synth.rs"]
mod synth;

use amdfw_analyser::commands::{
    consume_work_items, init_workspace_command, list_images_command, list_passes_command,
    workspace_info_command, ConsumeSummary,
};
use amdfw_core::db::WorkspaceContext;
use amdfw_core::model::ContentId;
use synth::ImageBuilder;
use tempfile::tempdir;

fn workspace() -> (tempfile::TempDir, WorkspaceContext) {
    let dir = tempdir().expect("tempdir");
    let root = dir.path().to_string_lossy().to_string();
    init_workspace_command(&root, Some("Units".into())).expect("init workspace");
    let ctx = WorkspaceContext::from_root(dir.path()).expect("open workspace");
    (dir, ctx)
}

#[test]
fn consume_counts_each_kind_of_line() {
    let (_dir, ctx) = workspace();
    let bytes = ImageBuilder::new(0x10_0000).psp_entry(0x00, vec![0x42; 0x240]).build();
    let good = ctx.register(&bytes, Some("good.bin")).expect("register").image.id;
    let unknown = ContentId::of(b"unknown image");

    let input = format!(
        "{{\"ID\": \"{good}\"}}\n   \n{{\"ID\": \"{unknown}\"}}\n{{\"ID\": \"XYZ\"}}\n{{}}\n"
    );
    let summary = consume_work_items(&ctx, Cursor::new(input)).expect("consume");
    assert_eq!(
        summary,
        ConsumeSummary { processed: 2, succeeded: 1, failed: 1, rejected: 2 }
    );

    let passes = ctx.db.list_passes(None).expect("passes");
    assert_eq!(passes.len(), 2);
}

#[test]
fn listing_commands_succeed_on_empty_workspace() {
    let (dir, _ctx) = workspace();
    let root = dir.path().to_string_lossy().to_string();
    workspace_info_command(&root, false).expect("info text");
    workspace_info_command(&root, true).expect("info json");
    list_images_command(&root, false).expect("images text");
    list_passes_command(&root, None, true).expect("passes json");

    let err = list_passes_command(&root, Some("bogus"), false).unwrap_err();
    assert!(err.to_string().contains("Invalid image id"));
}
