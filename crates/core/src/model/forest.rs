//! Parsed directory forest: entry table → ROMs → directories → slots.
//!
//! Component entries are stored once in an [`EntryArena`] keyed by content id.
//! Directory slots only carry the per-position fields (type, size, location)
//! and a `ContentId` reference into the arena, so the same component appearing
//! in two directories is one entity. Slots without payload bytes carry no
//! reference; their facts stay on the slot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::ContentId;

/// Firmware entry table (the `0x55AA55AA` table locating the directories).
///
/// Pointer fields are memory-mapped flash addresses; `None` marks a pointer
/// the table leaves empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryTable {
    /// Offset of the table within the image.
    pub location: u32,
    pub signature: u32,
    pub imc_rom_base: Option<u32>,
    pub gec_rom_base: Option<u32>,
    pub xhci_rom_base: Option<u32>,
    pub psp_dir_base: Option<u32>,
    pub new_psp_dir_base: Option<u32>,
    pub bhd_dir_base: Option<u32>,
    pub new_bhd_dir_base: Option<u32>,
}

impl EntryTable {
    /// PSP directory pointers in table order, skipping empty ones.
    pub fn psp_directories(&self) -> impl Iterator<Item = u32> {
        [self.psp_dir_base, self.new_psp_dir_base].into_iter().flatten()
    }

    /// BIOS directory pointers in table order, skipping empty ones.
    pub fn bios_directories(&self) -> impl Iterator<Item = u32> {
        [self.bhd_dir_base, self.new_bhd_dir_base].into_iter().flatten()
    }
}

/// Which directory family a ROM was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RomKind {
    #[serde(rename = "PSP")]
    Psp,
    #[serde(rename = "BIOS")]
    Bios,
}

impl RomKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RomKind::Psp => "PSP",
            RomKind::Bios => "BIOS",
        }
    }
}

/// Header of one PSP/BIOS directory, as stored in flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryHeader {
    pub cookie: [u8; 4],
    pub checksum: u32,
    pub total_entries: u32,
    pub reserved: u32,
}

impl DirectoryHeader {
    /// Cookie as text (`$PSP`, `$BHD`, ...), lossy for non-ASCII bytes.
    pub fn cookie_str(&self) -> String {
        String::from_utf8_lossy(&self.cookie).into_owned()
    }
}

/// One slot of a directory: where an entry lives and what it claims to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySlot {
    pub type_code: u8,
    pub subprogram: u8,
    pub reserved: u16,
    pub size: u32,
    pub location: u64,
    /// BIOS directories carry an extra destination word; PSP slots do not.
    pub unknown: Option<u64>,
    /// Content id of the entry's raw bytes; key into the forest's arena.
    /// `None` when the slot points at no bytes (value entry, out of range,
    /// zero size), so there is nothing to address.
    pub entry: Option<ContentId>,
    /// Inline value of a value entry (size `0xFFFFFFFF`).
    pub value: Option<u64>,
    pub type_info: Option<TypeInfo>,
    /// Why the slot has no entry, when that is not obvious from `value`.
    pub comment: Option<String>,
}

/// A parsed directory with its slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    /// Offset of the directory header within the image.
    pub location: u64,
    pub header: DirectoryHeader,
    /// Checksum recomputed over the directory body at parse time.
    pub computed_checksum: u32,
    pub slots: Vec<DirectorySlot>,
}

impl Directory {
    /// Whether the stored checksum matches the one recomputed at parse time.
    pub fn validate_checksum(&self) -> bool {
        self.header.checksum == self.computed_checksum
    }
}

/// A ROM: the directories reachable from one family of entry-table pointers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rom {
    pub kind: RomKind,
    pub directories: Vec<Directory>,
}

/// Known header layouts an entry can carry. The bytes are kept verbatim and
/// decoded by the normalizer, which is where a malformed header surfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryHeader {
    /// PSP binary header (`$PS1` at offset 0x10).
    PspBinary(Vec<u8>),
    /// AGESA PSP customization block header (`APCB` at offset 0).
    Apcb(Vec<u8>),
    /// A header-bearing entry whose layout is not recognized.
    Unknown(Vec<u8>),
}

/// Name and description for a directory entry type code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TypeInfo {
    #[serde(rename = "Type")]
    pub type_code: String,
    pub name: String,
    pub comment: String,
}

/// A component discovered in a directory, identified by its raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentEntry {
    pub type_code: u8,
    pub raw: Vec<u8>,
    pub header: Option<EntryHeader>,
    pub signature: Option<Vec<u8>>,
    pub comments: Vec<String>,
    pub version: Option<String>,
    pub type_info: Option<TypeInfo>,
}

impl ComponentEntry {
    /// A bare entry with raw bytes and nothing decoded.
    pub fn raw(type_code: u8, raw: Vec<u8>) -> Self {
        Self {
            type_code,
            raw,
            header: None,
            signature: None,
            comments: Vec::new(),
            version: None,
            type_info: None,
        }
    }

    pub fn id(&self) -> ContentId {
        ContentId::of(&self.raw)
    }
}

/// Entries of one forest, addressed by the content id of their raw bytes.
///
/// The first entry inserted for an id wins; later byte-identical entries are
/// the same component and only add another slot reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryArena {
    entries: BTreeMap<ContentId, ComponentEntry>,
}

impl EntryArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry and return its content id.
    pub fn insert(&mut self, entry: ComponentEntry) -> ContentId {
        let id = entry.id();
        self.entries.entry(id.clone()).or_insert(entry);
        id
    }

    pub fn get(&self, id: &ContentId) -> Option<&ComponentEntry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Full parse result for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryForest {
    pub table: EntryTable,
    /// Base address flash is mapped at; `None` when it could not be derived.
    pub flash_mapping: Option<u32>,
    pub roms: Vec<Rom>,
    pub entries: EntryArena,
}

impl DirectoryForest {
    /// A forest holding only the entry table (no mapping, no ROMs).
    pub fn table_only(table: EntryTable) -> Self {
        Self { table, flash_mapping: None, roms: Vec::new(), entries: EntryArena::new() }
    }

    /// Iterate over every slot in depth-first ROM → directory → slot order.
    pub fn slots(&self) -> impl Iterator<Item = (&Rom, &Directory, &DirectorySlot)> {
        self.roms.iter().flat_map(|rom| {
            rom.directories
                .iter()
                .flat_map(move |dir| dir.slots.iter().map(move |slot| (rom, dir, slot)))
        })
    }
}
