//! Builder for small, well-formed AMD flash images.
//!
//! Layout relative to the entry table offset `fet`:
//! - `fet`: entry table
//! - `fet + 0x1000`: PSP directory
//! - `fet + 0x2000`: level-2 PSP directory (only with level-2 entries)
//! - `fet + 0x3000`: BIOS directory
//! - `fet + 0x4000..`: entry payloads, each aligned to 0x100
//!
//! The image is mapped at the top of the 4 GiB space, so pointers and slot
//! locations are written as memory-mapped addresses.
//!
//! Shared by the core and CLI integration tests.
#![allow(dead_code)]

use amdfw_core::services::backends::amdfw::{
    fletcher32, BIOS_COOKIE, FET_MAGIC, PSP_COOKIE, PSP_LEVEL2_COOKIE, SIGNATURE_SIZE,
    VALUE_ENTRY_SIZE,
};
use amdfw_core::services::backends::type_table::PSP_LEVEL2_DIR;

const PSP_DIR_OFFSET: usize = 0x1000;
const PSP_L2_DIR_OFFSET: usize = 0x2000;
const BIOS_DIR_OFFSET: usize = 0x3000;
const DATA_OFFSET: usize = 0x4000;
const DATA_ALIGN: usize = 0x100;
pub const GROW_STEP: usize = 0x1_0000;

#[derive(Debug, Clone)]
struct SynthEntry {
    type_code: u8,
    data: Vec<u8>,
    /// Value entries carry their value in the location field and no payload.
    value: Option<u64>,
}

impl SynthEntry {
    fn payload(type_code: u8, data: Vec<u8>) -> Self {
        Self { type_code, data, value: None }
    }

    /// Slot `(size, location)` for a payload placed at image offset `at`.
    fn slot(&self, at: usize, mapping: u64) -> (u32, u64) {
        match self.value {
            Some(value) => (VALUE_ENTRY_SIZE, value),
            None => (self.data.len() as u32, mapping + at as u64),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageBuilder {
    size: usize,
    fet_offset: usize,
    psp: Vec<SynthEntry>,
    psp_level2: Vec<SynthEntry>,
    bios: Vec<SynthEntry>,
    corrupt_psp_checksum: bool,
    filler: u8,
}

impl ImageBuilder {
    /// Start an image of at least `size` bytes; it grows if entries need room.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            fet_offset: 0x2_0000,
            psp: Vec::new(),
            psp_level2: Vec::new(),
            bios: Vec::new(),
            corrupt_psp_checksum: false,
            filler: 0xFF,
        }
    }

    /// Place the entry table at `offset` (rounded down to 0x1000).
    pub fn fet_offset(mut self, offset: usize) -> Self {
        self.fet_offset = offset & !0xFFF;
        self
    }

    /// Byte used for unused space. Changing it changes the image id.
    pub fn filler(mut self, filler: u8) -> Self {
        self.filler = filler;
        self
    }

    pub fn psp_entry(mut self, type_code: u8, data: impl Into<Vec<u8>>) -> Self {
        self.psp.push(SynthEntry::payload(type_code, data.into()));
        self
    }

    pub fn psp_level2_entry(mut self, type_code: u8, data: impl Into<Vec<u8>>) -> Self {
        self.psp_level2.push(SynthEntry::payload(type_code, data.into()));
        self
    }

    /// PSP slot with size `0xFFFFFFFF` whose location field holds `value`.
    pub fn psp_value_entry(mut self, type_code: u8, value: u64) -> Self {
        self.psp.push(SynthEntry { type_code, data: Vec::new(), value: Some(value) });
        self
    }

    pub fn bios_entry(mut self, type_code: u8, data: impl Into<Vec<u8>>) -> Self {
        self.bios.push(SynthEntry::payload(type_code, data.into()));
        self
    }

    /// Store a wrong checksum in the level-1 PSP directory header.
    pub fn corrupt_psp_checksum(mut self) -> Self {
        self.corrupt_psp_checksum = true;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let fet = self.fet_offset;

        // Payload offsets first; they do not depend on the final image size.
        let mut cursor = fet + DATA_OFFSET;
        let mut place = |entries: &[SynthEntry]| -> Vec<usize> {
            entries
                .iter()
                .map(|e| {
                    let at = cursor;
                    cursor = (cursor + e.data.len()).next_multiple_of(DATA_ALIGN);
                    at
                })
                .collect()
        };
        let psp_at = place(&self.psp);
        let l2_at = place(&self.psp_level2);
        let bios_at = place(&self.bios);

        let size = self.size.max(cursor.next_multiple_of(GROW_STEP));
        let mapping = (1u64 << 32) - size as u64;
        let mapped = |offset: usize| mapping + offset as u64;

        let mut image = vec![self.filler; size];
        let has_psp = !self.psp.is_empty() || !self.psp_level2.is_empty();
        let has_bios = !self.bios.is_empty();

        let mut table = Vec::with_capacity(32);
        table.extend_from_slice(&FET_MAGIC.to_le_bytes());
        let psp_ptr = if has_psp { mapped(fet + PSP_DIR_OFFSET) as u32 } else { 0 };
        let bios_ptr = if has_bios { mapped(fet + BIOS_DIR_OFFSET) as u32 } else { 0 };
        for pointer in [0, 0, 0, psp_ptr, 0, bios_ptr, 0] {
            table.extend_from_slice(&u32::to_le_bytes(pointer));
        }
        image[fet..fet + table.len()].copy_from_slice(&table);

        for (entry, at) in self.psp.iter().chain(&self.psp_level2).chain(&self.bios).zip(
            psp_at.iter().chain(&l2_at).chain(&bios_at),
        ) {
            image[*at..*at + entry.data.len()].copy_from_slice(&entry.data);
        }

        if has_psp {
            let mut slots: Vec<(u8, u32, u64, Option<u64>)> = self
                .psp
                .iter()
                .zip(&psp_at)
                .map(|(e, at)| {
                    let (size, location) = e.slot(*at, mapping);
                    (e.type_code, size, location, None)
                })
                .collect();
            if !self.psp_level2.is_empty() {
                let l2_slots: Vec<_> = self
                    .psp_level2
                    .iter()
                    .zip(&l2_at)
                    .map(|(e, at)| {
                        let (size, location) = e.slot(*at, mapping);
                        (e.type_code, size, location, None)
                    })
                    .collect();
                let l2 = directory(PSP_LEVEL2_COOKIE, &l2_slots, false);
                let l2_location = mapped(fet + PSP_L2_DIR_OFFSET);
                slots.push((PSP_LEVEL2_DIR, l2.len() as u32, l2_location, None));
                write_at(&mut image, fet + PSP_L2_DIR_OFFSET, &l2);
            }
            let dir = directory(PSP_COOKIE, &slots, self.corrupt_psp_checksum);
            write_at(&mut image, fet + PSP_DIR_OFFSET, &dir);
        }

        if has_bios {
            let slots: Vec<_> = self
                .bios
                .iter()
                .zip(&bios_at)
                .map(|(e, at)| {
                    let (size, location) = e.slot(*at, mapping);
                    (e.type_code, size, location, Some(0))
                })
                .collect();
            write_at(&mut image, fet + BIOS_DIR_OFFSET, &directory(BIOS_COOKIE, &slots, false));
        }

        image
    }
}

fn write_at(image: &mut [u8], at: usize, bytes: &[u8]) {
    image[at..at + bytes.len()].copy_from_slice(bytes);
}

/// Serialize a directory; `Some(dest)` in a slot selects the BIOS slot layout.
fn directory(cookie: [u8; 4], slots: &[(u8, u32, u64, Option<u64>)], corrupt: bool) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&cookie);
    out.extend_from_slice(&[0u8; 4]);
    out.extend_from_slice(&(slots.len() as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    for (type_code, size, location, destination) in slots {
        out.push(*type_code);
        out.push(0);
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&location.to_le_bytes());
        if let Some(destination) = destination {
            out.extend_from_slice(&destination.to_le_bytes());
        }
    }
    let mut checksum = fletcher32(&out[8..]);
    if corrupt {
        checksum ^= 0x0000_0001;
    }
    out[4..8].copy_from_slice(&checksum.to_le_bytes());
    out
}

/// PSP binary: 0x100-byte `$PS1` header, `body`, and a signature if `signed`.
pub fn psp_binary(version: [u8; 4], body: &[u8], signed: bool) -> Vec<u8> {
    let mut out = vec![0u8; 0x100];
    out[0x10..0x14].copy_from_slice(b"$PS1");
    out[0x14..0x18].copy_from_slice(&(body.len() as u32).to_le_bytes());
    out[0x30..0x34].copy_from_slice(&u32::from(signed).to_le_bytes());
    out[0x60..0x64].copy_from_slice(&version);
    out.extend_from_slice(body);
    if signed {
        out.extend(std::iter::repeat(0x5A).take(SIGNATURE_SIZE));
    }
    out
}

/// APCB blob: 0x20-byte header followed by `body`.
pub fn apcb(instance: u32, body: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; 0x20];
    out[0..4].copy_from_slice(b"APCB");
    out[4..6].copy_from_slice(&0x20u16.to_le_bytes());
    out[6..8].copy_from_slice(&0x30u16.to_le_bytes());
    out[8..12].copy_from_slice(&((0x20 + body.len()) as u32).to_le_bytes());
    out[12..16].copy_from_slice(&instance.to_le_bytes());
    out.extend_from_slice(body);
    out
}

/// 1 MiB image whose single PSP directory has `copies` slots, all pointing at
/// the same `payload_len` bytes at the end of the image.
pub fn repeated_slot_image(copies: u32, payload_len: usize) -> Vec<u8> {
    const SIZE: usize = 0x10_0000;
    const FET: usize = 0x2_0000;
    let mapping = (1u64 << 32) - SIZE as u64;
    let payload_at = SIZE - payload_len;

    let mut image = vec![0xFF; SIZE];
    let mut table = FET_MAGIC.to_le_bytes().to_vec();
    let psp_ptr = (mapping + (FET + PSP_DIR_OFFSET) as u64) as u32;
    for pointer in [0, 0, 0, psp_ptr, 0, 0, 0] {
        table.extend_from_slice(&u32::to_le_bytes(pointer));
    }
    write_at(&mut image, FET, &table);

    let slot = (0x00, payload_len as u32, mapping + payload_at as u64, None);
    let slots = vec![slot; copies as usize];
    write_at(&mut image, FET + PSP_DIR_OFFSET, &directory(PSP_COOKIE, &slots, false));
    for (i, byte) in image[payload_at..].iter_mut().enumerate() {
        *byte = i as u8;
    }
    image
}
