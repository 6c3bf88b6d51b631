//! Contract for structural parsers of firmware directory layouts.
//!
//! The ingestion pipeline only sees this trait. Parsers locate the entry table,
//! decode it, work out where flash is mapped, and walk the ROM directories into
//! a set of ROMs plus an arena of the entries they reference.

use std::collections::HashMap;

use thiserror::Error;

use crate::model::{EntryArena, EntryTable, Rom};
use crate::services::deadline::PassDeadline;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StructureError {
    #[error("Firmware entry table not found")]
    EntryTableNotFound,

    #[error("Unexpected entry table signature 0x{found:08X} at 0x{offset:X}")]
    BadTableSignature { offset: usize, found: u32 },

    #[error("{what} at 0x{offset:X} runs past the end of the image")]
    Truncated { what: &'static str, offset: u64 },

    #[error("Could not determine flash mapping for entry table at 0x{table:X}")]
    NoFlashMapping { table: u32 },

    #[error("Unknown directory cookie {cookie} at 0x{offset:X}")]
    UnknownCookie { offset: u64, cookie: String },

    #[error("Directory address 0x{address:X} does not map into the image")]
    UnmappedDirectory { address: u64 },

    #[error(
        "Entry type 0x{type_code:02X} at 0x{location:X} (size 0x{size:X}) is outside the image"
    )]
    EntryOutOfRange { type_code: u8, location: u64, size: u32 },

    #[error("Directory at 0x{offset:X} already visited; skipping")]
    DirectoryCycle { offset: u64 },
}

/// Result of walking the ROM directories: what parsed, plus what did not.
#[derive(Debug, Clone, Default)]
pub struct RomParse {
    pub roms: Vec<Rom>,
    pub entries: EntryArena,
    pub errors: Vec<StructureError>,
    /// The deadline expired mid-walk; `roms` holds only what was read before.
    pub cancelled: bool,
}

/// Structural parser for one firmware directory format.
pub trait StructureParser: Send + Sync {
    /// Locate the entry table; returns its offset in `bytes`.
    fn find_entry_table(&self, bytes: &[u8]) -> Result<usize, StructureError>;

    /// Decode the entry table found at `offset`.
    fn parse_entry_table(&self, bytes: &[u8], offset: usize) -> Result<EntryTable, StructureError>;

    /// Base address the image is mapped at in the physical address space.
    fn flash_mapping(&self, bytes: &[u8], table: &EntryTable) -> Result<u32, StructureError>;

    /// Walk all directories the table points to.
    ///
    /// Stops between slots once `deadline` expires and returns what was
    /// parsed so far with `cancelled` set.
    fn parse_roms(
        &self,
        bytes: &[u8],
        table: &EntryTable,
        mapping: u32,
        deadline: &PassDeadline,
    ) -> RomParse;

    fn name(&self) -> &'static str;
}

/// Registry for structural parsers; callers select by name.
#[derive(Default)]
pub struct ParserRegistry {
    parsers: HashMap<String, Box<dyn StructureParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self { parsers: HashMap::new() }
    }

    pub fn register<P: StructureParser + 'static>(&mut self, parser: P) -> &mut Self {
        self.parsers.insert(parser.name().to_string(), Box::new(parser));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn StructureParser> {
        self.parsers.get(name).map(|p| &**p)
    }

    /// Return a sorted list of registered parser names for error messages/help.
    pub fn names(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.parsers.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Registry populated with the parsers built into this crate.
pub fn default_parser_registry() -> ParserRegistry {
    let mut registry = ParserRegistry::new();
    registry.register(crate::services::backends::AmdfwParser::new());
    registry
}
