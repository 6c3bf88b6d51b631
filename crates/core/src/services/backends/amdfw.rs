//! Structural parser for the AMD PSP flash layout.
//!
//! Flash layout, as far as this parser cares:
//! - a firmware entry table (`0x55AA55AA` followed by seven u32 pointers) on a
//!   0x1000-aligned offset;
//! - PSP (`$PSP`/`$PL2`) and BIOS (`$BHD`/`$BL2`) directories the table points
//!   at, each a 16-byte header followed by fixed-size slots;
//! - component bytes at the (memory-mapped) locations the slots name.

use std::collections::BTreeSet;
use std::ops::Range;

use tracing::debug;

use crate::bytes::LeReader;
use crate::model::{
    ComponentEntry, Directory, DirectoryHeader, DirectorySlot, EntryHeader, EntryTable, Rom,
    RomKind,
};
use crate::normalize::headers::{APCB_MAGIC, PSP_BINARY_MAGIC};
use crate::normalize::{hex, ApcbHeader, PspBinaryHeader};
use crate::services::backends::type_table::{self, BIOS_LEVEL2_DIR, PSP_LEVEL2_DIR};
use crate::services::deadline::PassDeadline;
use crate::services::structure::{RomParse, StructureError, StructureParser};

pub const FET_MAGIC: u32 = 0x55AA_55AA;
pub const FET_ALIGNMENT: usize = 0x1000;
/// Magic plus seven pointers.
pub const FET_SIZE: usize = 4 + 7 * 4;

pub const PSP_COOKIE: [u8; 4] = *b"$PSP";
pub const PSP_LEVEL2_COOKIE: [u8; 4] = *b"$PL2";
pub const BIOS_COOKIE: [u8; 4] = *b"$BHD";
pub const BIOS_LEVEL2_COOKIE: [u8; 4] = *b"$BL2";

pub const DIRECTORY_HEADER_SIZE: usize = 16;
pub const PSP_SLOT_SIZE: usize = 16;
pub const BIOS_SLOT_SIZE: usize = 24;

/// Slot size marking a value entry: the location field holds the value itself.
pub const VALUE_ENTRY_SIZE: u32 = 0xFFFF_FFFF;

/// Trailing RSA signature on signed PSP binaries.
pub const SIGNATURE_SIZE: usize = 0x100;

/// Fletcher-32 over little-endian 16-bit words, as used by PSP directories.
/// An odd trailing byte is padded with zero.
pub fn fletcher32(data: &[u8]) -> u32 {
    let mut c0: u32 = 0xFFFF;
    let mut c1: u32 = 0xFFFF;
    let words: Vec<u32> = data
        .chunks(2)
        .map(|pair| u32::from(pair[0]) | (u32::from(pair.get(1).copied().unwrap_or(0)) << 8))
        .collect();
    // 359 words is the largest block that cannot overflow c1.
    for block in words.chunks(359) {
        for word in block {
            c0 += word;
            c1 += c0;
        }
        c0 = (c0 & 0xFFFF) + (c0 >> 16);
        c1 = (c1 & 0xFFFF) + (c1 >> 16);
    }
    c0 = (c0 & 0xFFFF) + (c0 >> 16);
    c1 = (c1 & 0xFFFF) + (c1 >> 16);
    (c1 << 16) | c0
}

/// Translate a flash address into an offset within an image of `len` bytes.
///
/// Addresses at or above the mapping base are memory-mapped; anything below
/// is taken as a plain image offset.
pub fn map_address(address: u64, mapping: u32, len: usize) -> Option<usize> {
    let offset = if mapping != 0 && address >= u64::from(mapping) {
        address - u64::from(mapping)
    } else {
        address
    };
    usize::try_from(offset).ok().filter(|o| *o < len)
}

fn cookies(kind: RomKind) -> [[u8; 4]; 2] {
    match kind {
        RomKind::Psp => [PSP_COOKIE, PSP_LEVEL2_COOKIE],
        RomKind::Bios => [BIOS_COOKIE, BIOS_LEVEL2_COOKIE],
    }
}

fn slot_size(kind: RomKind) -> usize {
    match kind {
        RomKind::Psp => PSP_SLOT_SIZE,
        RomKind::Bios => BIOS_SLOT_SIZE,
    }
}

fn level2_type(kind: RomKind) -> u8 {
    match kind {
        RomKind::Psp => PSP_LEVEL2_DIR,
        RomKind::Bios => BIOS_LEVEL2_DIR,
    }
}

fn non_empty_pointer(value: u32) -> Option<u32> {
    match value {
        0 | 0xFFFF_FFFF => None,
        v => Some(v),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AmdfwParser;

impl AmdfwParser {
    pub fn new() -> Self {
        Self
    }

    /// Mapping bases to try, most likely first.
    fn mapping_candidates(len: usize) -> Vec<u32> {
        let mut out = Vec::with_capacity(3);
        if let Some(top) = (1u64 << 32).checked_sub(len as u64).filter(|_| len > 0) {
            if let Ok(top) = u32::try_from(top) {
                out.push(top);
            }
        }
        for fixed in [0xFF00_0000, 0] {
            if !out.contains(&fixed) {
                out.push(fixed);
            }
        }
        out
    }
}

impl StructureParser for AmdfwParser {
    fn name(&self) -> &'static str {
        "amdfw"
    }

    fn find_entry_table(&self, bytes: &[u8]) -> Result<usize, StructureError> {
        (0..bytes.len())
            .step_by(FET_ALIGNMENT)
            .find(|offset| LeReader::at(bytes, *offset).u32() == Some(FET_MAGIC))
            .ok_or(StructureError::EntryTableNotFound)
    }

    fn parse_entry_table(&self, bytes: &[u8], offset: usize) -> Result<EntryTable, StructureError> {
        let truncated = || StructureError::Truncated { what: "entry table", offset: offset as u64 };
        let mut r = LeReader::at(bytes, offset);
        let signature = r.u32().ok_or_else(truncated)?;
        if signature != FET_MAGIC {
            return Err(StructureError::BadTableSignature { offset, found: signature });
        }
        let mut pointers = [None; 7];
        for slot in pointers.iter_mut() {
            *slot = non_empty_pointer(r.u32().ok_or_else(truncated)?);
        }
        let location = u32::try_from(offset).map_err(|_| truncated())?;
        Ok(EntryTable {
            location,
            signature,
            imc_rom_base: pointers[0],
            gec_rom_base: pointers[1],
            xhci_rom_base: pointers[2],
            psp_dir_base: pointers[3],
            new_psp_dir_base: pointers[4],
            bhd_dir_base: pointers[5],
            new_bhd_dir_base: pointers[6],
        })
    }

    fn flash_mapping(&self, bytes: &[u8], table: &EntryTable) -> Result<u32, StructureError> {
        let pointers: Vec<(RomKind, u32)> = table
            .psp_directories()
            .map(|p| (RomKind::Psp, p))
            .chain(table.bios_directories().map(|p| (RomKind::Bios, p)))
            .collect();

        for candidate in Self::mapping_candidates(bytes.len()) {
            let lands_on_cookie = pointers.iter().any(|(kind, pointer)| {
                map_address(u64::from(*pointer), candidate, bytes.len())
                    .and_then(|offset| LeReader::at(bytes, offset).array::<4>())
                    .is_some_and(|cookie| cookies(*kind).contains(&cookie))
            });
            if lands_on_cookie {
                debug!(mapping = %hex(&candidate), "flash mapping resolved");
                return Ok(candidate);
            }
        }
        Err(StructureError::NoFlashMapping { table: table.location })
    }

    fn parse_roms(
        &self,
        bytes: &[u8],
        table: &EntryTable,
        mapping: u32,
        deadline: &PassDeadline,
    ) -> RomParse {
        let mut walk = RomWalk {
            bytes,
            mapping,
            deadline,
            visited: BTreeSet::new(),
            out: RomParse::default(),
        };

        let roots = table
            .psp_directories()
            .map(|p| (RomKind::Psp, p))
            .chain(table.bios_directories().map(|p| (RomKind::Bios, p)));
        for (kind, pointer) in roots {
            let mut directories = Vec::new();
            walk.directory(kind, u64::from(pointer), &mut directories, false);
            if !directories.is_empty() {
                walk.out.roms.push(Rom { kind, directories });
            }
            if walk.out.cancelled {
                debug!("deadline expired; directory walk stopped early");
                break;
            }
        }
        walk.out
    }
}

/// State of one `parse_roms` call.
struct RomWalk<'a> {
    bytes: &'a [u8],
    mapping: u32,
    deadline: &'a PassDeadline,
    /// Directory offsets already parsed; cuts level-2 cycles and shared roots.
    visited: BTreeSet<usize>,
    out: RomParse,
}

impl RomWalk<'_> {
    fn directory(&mut self, kind: RomKind, address: u64, into: &mut Vec<Directory>, nested: bool) {
        let Some(offset) = map_address(address, self.mapping, self.bytes.len()) else {
            self.out.errors.push(StructureError::UnmappedDirectory { address });
            return;
        };
        if !self.visited.insert(offset) {
            if nested {
                self.out.errors.push(StructureError::DirectoryCycle { offset: offset as u64 });
            }
            return;
        }

        match self.read_directory(kind, offset) {
            Ok((directory, level2)) => {
                debug!(
                    location = %hex(&(offset as u32)),
                    cookie = %directory.header.cookie_str(),
                    slots = directory.slots.len(),
                    "parsed directory"
                );
                into.push(directory);
                for child in level2 {
                    if self.out.cancelled {
                        return;
                    }
                    self.directory(kind, child, into, true);
                }
            }
            Err(err) => self.out.errors.push(err),
        }
    }

    /// Parse the directory at `offset`; returns it plus any level-2 addresses.
    ///
    /// On an expired deadline the slots read so far are returned.
    fn read_directory(
        &mut self,
        kind: RomKind,
        offset: usize,
    ) -> Result<(Directory, Vec<u64>), StructureError> {
        let truncated = |what| StructureError::Truncated { what, offset: offset as u64 };
        let mut r = LeReader::at(self.bytes, offset);

        let cookie: [u8; 4] = r.array().ok_or_else(|| truncated("directory header"))?;
        if !cookies(kind).contains(&cookie) {
            return Err(StructureError::UnknownCookie {
                offset: offset as u64,
                cookie: cookie.escape_ascii().to_string(),
            });
        }
        let header = DirectoryHeader {
            cookie,
            checksum: r.u32().ok_or_else(|| truncated("directory header"))?,
            total_entries: r.u32().ok_or_else(|| truncated("directory header"))?,
            reserved: r.u32().ok_or_else(|| truncated("directory header"))?,
        };

        let end = (header.total_entries as usize)
            .checked_mul(slot_size(kind))
            .and_then(|body| body.checked_add(offset + DIRECTORY_HEADER_SIZE))
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| truncated("directory"))?;
        let computed_checksum = fletcher32(&self.bytes[offset + 8..end]);

        let mut slots = Vec::with_capacity(header.total_entries as usize);
        let mut level2 = Vec::new();
        for _ in 0..header.total_entries {
            if self.deadline.expired() {
                self.out.cancelled = true;
                break;
            }
            let type_code = r.u8().ok_or_else(|| truncated("directory slot"))?;
            let subprogram = r.u8().ok_or_else(|| truncated("directory slot"))?;
            let reserved = r.u16().ok_or_else(|| truncated("directory slot"))?;
            let size = r.u32().ok_or_else(|| truncated("directory slot"))?;
            let location = r.u64().ok_or_else(|| truncated("directory slot"))?;
            let unknown = match kind {
                RomKind::Psp => None,
                RomKind::Bios => Some(r.u64().ok_or_else(|| truncated("directory slot"))?),
            };

            if type_code == level2_type(kind) {
                level2.push(location);
            }
            let mut slot = DirectorySlot {
                type_code,
                subprogram,
                reserved,
                size,
                location,
                unknown,
                entry: None,
                value: None,
                type_info: type_table::type_info(kind, type_code),
                comment: None,
            };
            self.resolve(kind, &mut slot);
            slots.push(slot);
        }

        let directory = Directory { location: offset as u64, header, computed_checksum, slots };
        Ok((directory, level2))
    }

    fn entry_range(&self, size: u32, location: u64) -> Option<Range<usize>> {
        let start = map_address(location, self.mapping, self.bytes.len())?;
        let end = start.checked_add(size as usize).filter(|end| *end <= self.bytes.len())?;
        Some(start..end)
    }

    /// Fill in what the slot points at: an inline value, or payload bytes
    /// stored in the arena. Slots with no bytes never enter the arena.
    fn resolve(&mut self, kind: RomKind, slot: &mut DirectorySlot) {
        if slot.size == VALUE_ENTRY_SIZE {
            slot.value = Some(slot.location);
            return;
        }
        let Some(range) = self.entry_range(slot.size, slot.location) else {
            self.out.errors.push(StructureError::EntryOutOfRange {
                type_code: slot.type_code,
                location: slot.location,
                size: slot.size,
            });
            slot.comment = Some("Entry data lies outside of the image".to_string());
            return;
        };
        if range.is_empty() {
            slot.comment = Some("Empty entry".to_string());
            return;
        }

        let mut entry = ComponentEntry::raw(slot.type_code, self.bytes[range].to_vec());
        entry.type_info = slot.type_info.clone();
        decode_payload(kind, &mut entry);
        slot.entry = Some(self.out.entries.insert(entry));
    }
}

/// Attach header, signature, version and flag comments based on the payload.
fn decode_payload(kind: RomKind, entry: &mut ComponentEntry) {
    let raw = &entry.raw;
    if raw.get(0x10..0x14) == Some(&PSP_BINARY_MAGIC[..]) {
        let header_len = raw.len().min(PspBinaryHeader::SIZE);
        entry.header = Some(EntryHeader::PspBinary(raw[..header_len].to_vec()));

        // A short header still gets recorded; the normalizer reports it.
        if let Ok(header) = PspBinaryHeader::parse(raw) {
            entry.version = Some(header.version_string());
            if header.is_signed == 1 && raw.len() >= PspBinaryHeader::SIZE + SIGNATURE_SIZE {
                entry.signature = Some(raw[raw.len() - SIGNATURE_SIZE..].to_vec());
            }
            if header.is_encrypted == 1 {
                entry.comments.push("Encrypted".to_string());
            }
            if header.is_compressed == 1 {
                entry.comments.push("Compressed".to_string());
            }
        }
    } else if raw.starts_with(&APCB_MAGIC) {
        let header_len = raw.len().min(ApcbHeader::SIZE);
        entry.header = Some(EntryHeader::Apcb(raw[..header_len].to_vec()));
    } else if !raw.is_empty() && type_table::has_header(kind, entry.type_code) {
        let header_len = raw.len().min(PspBinaryHeader::SIZE);
        entry.header = Some(EntryHeader::Unknown(raw[..header_len].to_vec()));
        entry.comments.push("Unrecognized header layout".to_string());
    }
}
