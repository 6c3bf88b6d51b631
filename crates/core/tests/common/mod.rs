// crates/core/tests/common/mod.rs
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use amdfw_core::blobs::{BlobError, BlobResult, BlobStore, BlobWrite};
use amdfw_core::db::{WorkspaceConfig, WorkspaceContext, WorkspaceLayout};
use amdfw_core::model::ContentId;
use amdfw_core::services::ingest::PassDeadline;

pub mod synth;

use synth::{apcb, psp_binary, ImageBuilder};

/// In-memory blob store that counts the writes it actually performs.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<ContentId, Vec<u8>>>,
    writes: AtomicUsize,
    fail_exists: bool,
    /// Cancelled once this many writes have happened.
    cancel_after: Option<(usize, PassDeadline)>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose existence checks always fail.
    pub fn failing_exists() -> Self {
        Self { fail_exists: true, ..Self::default() }
    }

    /// Store that cancels `deadline` once `writes` blobs have been written.
    pub fn cancelling_after(writes: usize, deadline: PassDeadline) -> Self {
        Self { cancel_after: Some((writes, deadline)), ..Self::default() }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    pub fn contains(&self, id: &ContentId) -> bool {
        self.blobs.lock().unwrap().contains_key(id)
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, id: &ContentId) -> BlobResult<Vec<u8>> {
        self.blobs.lock().unwrap().get(id).cloned().ok_or_else(|| BlobError::NotFound(id.clone()))
    }

    fn exists(&self, id: &ContentId) -> BlobResult<bool> {
        if self.fail_exists {
            return Err(BlobError::Io {
                id: id.clone(),
                path: "memory".into(),
                source: std::io::Error::other("existence check unavailable"),
            });
        }
        Ok(self.blobs.lock().unwrap().contains_key(id))
    }

    fn put(&self, id: &ContentId, bytes: &[u8]) -> BlobResult<BlobWrite> {
        let mut blobs = self.blobs.lock().unwrap();
        if blobs.contains_key(id) {
            return Ok(BlobWrite::AlreadyPresent);
        }
        blobs.insert(id.clone(), bytes.to_vec());
        let written = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, deadline)) = &self.cancel_after {
            if written >= *limit {
                deadline.cancel();
            }
        }
        Ok(BlobWrite::Stored)
    }
}

/// Create `.amdfw/workspace.json` under `root` and open the workspace.
pub fn workspace(root: &Path) -> WorkspaceContext {
    let layout = WorkspaceLayout::new(root);
    std::fs::create_dir_all(&layout.meta_dir).expect("create meta dir");
    let config = WorkspaceConfig::new("TestWorkspace", &layout);
    std::fs::write(&layout.config_path, serde_json::to_string_pretty(&config).unwrap())
        .expect("write config");
    WorkspaceContext::from_root(root).expect("workspace context")
}

/// PSP boot loader with a `$PS1` header; `seed` varies the body bytes.
pub fn boot_loader(seed: u8) -> Vec<u8> {
    psp_binary([0x54, 0x00, 0x0B, 0x00], &[seed; 0x40], false)
}

/// Header-less public key blob; `seed` varies the bytes.
pub fn public_key(seed: u8) -> Vec<u8> {
    vec![seed; 0x240]
}

/// Too short for the `$PS1` header it announces.
pub fn truncated_psp_binary() -> Vec<u8> {
    let mut raw = vec![0u8; 0x20];
    raw[0x10..0x14].copy_from_slice(b"$PS1");
    raw
}

/// One PSP directory with a boot loader and a public key.
pub fn two_entry_image(filler: u8) -> Vec<u8> {
    ImageBuilder::new(0x10_0000)
        .filler(filler)
        .psp_entry(0x01, boot_loader(0x11))
        .psp_entry(0x00, public_key(0xA5))
        .build()
}

/// PSP and BIOS directories, a level-2 PSP directory, a value entry.
pub fn full_image() -> Vec<u8> {
    ImageBuilder::new(0x20_0000)
        .psp_entry(0x01, psp_binary([1, 2, 3, 4], &[0x22; 0x80], true))
        .psp_value_entry(0x0B, 0x1)
        .psp_level2_entry(0x30, psp_binary([5, 0, 0, 0], &[0x33; 0x40], false))
        .bios_entry(0x60, apcb(1, &[0x44; 0x10]))
        .bios_entry(0x62, vec![0x55; 0x100])
        .build()
}

/// Bytes with an AGESA banner and no firmware entry table.
pub fn agesa_only_image() -> Vec<u8> {
    let mut bytes = vec![0u8; 0x4000];
    let banner = b"AGESA!V9\0CezannePI-FP6 1.0.0.1";
    bytes[0x1234..0x1234 + banner.len()].copy_from_slice(banner);
    bytes
}
