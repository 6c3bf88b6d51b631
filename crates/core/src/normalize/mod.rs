//! Schema normalizer: renders parsed components into storage-ready records.
//!
//! Policy applied everywhere:
//! - numeric and byte-array fields become `0x` + uppercase hex, zero-padded to
//!   the field's natural width (u8 → 2 digits, u32 → 8, `[u8; N]` → 2N);
//! - absent optional fields are left out of the record entirely;
//! - text fields (magics, cookies, version strings) are kept as text.
//!
//! Header layouts differ per entry type, so headers are flattened into a
//! [`FieldMap`] (insertion-ordered name → string) instead of typed structs.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::model::{
    ComponentEntry, ContentId, DetectedSignature, Directory, DirectoryForest, DirectorySlot,
    EntryHeader, EntryTable, Rom, RomKind, TypeInfo,
};

pub mod headers;

pub use headers::{ApcbHeader, PspBinaryHeader};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    /// The header bytes are shorter than the layout they claim to be.
    #[error("{layout} header truncated: need {needed} bytes, have {actual}")]
    TruncatedHeader { layout: &'static str, needed: usize, actual: usize },

    /// The header magic does not match its layout.
    #[error("{layout} header has unexpected magic {found}")]
    BadMagic { layout: &'static str, found: String },
}

/// Insertion-ordered mapping of field name to rendered value.
///
/// Serializes as a JSON object whose keys keep the order fields were added in,
/// which for headers is the declaration order of the layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    fields: Vec<(String, String)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`, replacing an earlier value in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Set `name` only when `value` is present.
    pub fn insert_opt(&mut self, name: impl Into<String>, value: Option<String>) {
        if let Some(value) = value {
            self.insert(name, value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FieldMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldMapVisitor;

        impl<'de> Visitor<'de> for FieldMapVisitor {
            type Value = FieldMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field names to strings")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FieldMap, A::Error> {
                let mut out = FieldMap::new();
                while let Some((name, value)) = access.next_entry::<String, String>()? {
                    out.insert(name, value);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_map(FieldMapVisitor)
    }
}

/// Types with a natural fixed-width hex rendering.
pub trait HexField {
    fn to_hex(&self) -> String;
}

impl HexField for u8 {
    fn to_hex(&self) -> String {
        format!("0x{:02X}", self)
    }
}

impl HexField for u16 {
    fn to_hex(&self) -> String {
        format!("0x{:04X}", self)
    }
}

impl HexField for u32 {
    fn to_hex(&self) -> String {
        format!("0x{:08X}", self)
    }
}

impl HexField for u64 {
    fn to_hex(&self) -> String {
        format!("0x{:016X}", self)
    }
}

impl HexField for [u8] {
    fn to_hex(&self) -> String {
        let mut out = String::with_capacity(2 + self.len() * 2);
        out.push_str("0x");
        for b in self {
            out.push_str(&format!("{:02X}", b));
        }
        out
    }
}

impl<const N: usize> HexField for [u8; N] {
    fn to_hex(&self) -> String {
        self[..].to_hex()
    }
}

/// Render any [`HexField`] value.
pub fn hex<T: HexField + ?Sized>(value: &T) -> String {
    value.to_hex()
}

/// A single decoded header field, before rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Bytes(Vec<u8>),
    Text(String),
}

impl FieldValue {
    pub fn render(&self) -> String {
        match self {
            FieldValue::U8(v) => v.to_hex(),
            FieldValue::U16(v) => v.to_hex(),
            FieldValue::U32(v) => v.to_hex(),
            FieldValue::U64(v) => v.to_hex(),
            FieldValue::Bytes(b) => b.to_hex(),
            FieldValue::Text(t) => t.clone(),
        }
    }
}

/// Flatten a list of decoded fields into a [`FieldMap`] in declaration order.
pub fn field_map(fields: &[(&'static str, FieldValue)]) -> FieldMap {
    let mut map = FieldMap::new();
    for (name, value) in fields {
        map.insert(*name, value.render());
    }
    map
}

/// Normalize an entry header into its field map.
///
/// Unknown layouts fall back to a single `Raw` field with the header bytes.
pub fn normalize_header(header: &EntryHeader) -> Result<FieldMap, NormalizeError> {
    match header {
        EntryHeader::PspBinary(bytes) => Ok(field_map(&PspBinaryHeader::parse(bytes)?.fields())),
        EntryHeader::Apcb(bytes) => Ok(field_map(&ApcbHeader::parse(bytes)?.fields())),
        EntryHeader::Unknown(bytes) => {
            let mut map = FieldMap::new();
            map.insert("Raw", bytes.to_hex());
            Ok(map)
        }
    }
}

/// Storage record for one component in the entry collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EntryRecord {
    #[serde(rename = "ID")]
    pub id: ContentId,
    #[serde(rename = "Type")]
    pub type_code: String,
    /// Payload length. Only slots whose bytes lie in the image produce an
    /// entry, so this is always the declaring slot's `Size`.
    pub size: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<FieldMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, rename = "Comment")]
    pub comments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_info: Option<TypeInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Build the storage record for an entry. Fails if its header is malformed.
pub fn entry_record(entry: &ComponentEntry) -> Result<EntryRecord, NormalizeError> {
    let header = entry.header.as_ref().map(normalize_header).transpose()?;
    Ok(EntryRecord {
        id: entry.id(),
        type_code: entry.type_code.to_hex(),
        size: (entry.raw.len() as u32).to_hex(),
        header,
        signature: entry.signature.as_deref().filter(|s| !s.is_empty()).map(|s| s.to_hex()),
        comments: entry.comments.clone(),
        type_info: entry.type_info.clone(),
        version: entry.version.clone(),
    })
}

/// Pattern hit as stored on the parent document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SignatureRecord {
    pub rule: String,
    pub header: String,
    pub raw: String,
    pub offset: String,
}

/// Directory header as stored on the parent document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DirectoryHeaderRecord {
    pub cookie: String,
    pub checksum: String,
    pub checksum_valid: bool,
    pub total_entries: String,
    pub reserved: String,
}

/// A directory slot as stored on the parent: an id reference plus the
/// position-specific directory-entry fields.
///
/// Slots without payload bytes have no `ID`; a value entry keeps its value
/// here instead, since it belongs to this slot and not to any content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SlotRecord {
    #[serde(default, rename = "ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<ContentId>,
    pub directory_entry: FieldMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_info: Option<TypeInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DirectoryRecord {
    pub location: String,
    pub header: DirectoryHeaderRecord,
    pub entries: Vec<SlotRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RomRecord {
    #[serde(rename = "Type")]
    pub kind: RomKind,
    pub directories: Vec<DirectoryRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ForestRecord {
    #[serde(rename = "FET")]
    pub table: FieldMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flash_mapping: Option<String>,
    pub roms: Vec<RomRecord>,
}

/// The `AMD` field written onto a firmware image document after a pass.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ComponentTreeRecord {
    #[serde(default)]
    pub signatures: Vec<SignatureRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware: Option<ForestRecord>,
}

impl ComponentTreeRecord {
    /// Nothing was found: no signatures and no forest.
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty() && self.firmware.is_none()
    }
}

pub fn signature_record(sig: &DetectedSignature) -> SignatureRecord {
    SignatureRecord {
        rule: sig.rule.clone(),
        header: sig.matched.clone(),
        raw: sig.excerpt.clone(),
        offset: (sig.offset as u32).to_hex(),
    }
}

pub fn table_record(table: &EntryTable) -> FieldMap {
    let mut map = FieldMap::new();
    map.insert("Location", table.location.to_hex());
    map.insert("Signature", table.signature.to_hex());
    map.insert_opt("ImcRomBase", table.imc_rom_base.map(|v| v.to_hex()));
    map.insert_opt("GecRomBase", table.gec_rom_base.map(|v| v.to_hex()));
    map.insert_opt("XHCRomBase", table.xhci_rom_base.map(|v| v.to_hex()));
    map.insert_opt("PSPDirBase", table.psp_dir_base.map(|v| v.to_hex()));
    map.insert_opt("NewPSPDirBase", table.new_psp_dir_base.map(|v| v.to_hex()));
    map.insert_opt("BHDDirBase", table.bhd_dir_base.map(|v| v.to_hex()));
    map.insert_opt("NewBHDDirBase", table.new_bhd_dir_base.map(|v| v.to_hex()));
    map
}

pub fn slot_fields(slot: &DirectorySlot) -> FieldMap {
    let mut map = FieldMap::new();
    map.insert("Type", slot.type_code.to_hex());
    map.insert("Subprogram", slot.subprogram.to_hex());
    map.insert("Reserved", slot.reserved.to_hex());
    map.insert("Size", slot.size.to_hex());
    map.insert("Location", slot.location.to_hex());
    map.insert_opt("Unknown", slot.unknown.map(|v| v.to_hex()));
    map
}

fn directory_record(dir: &Directory, forest: &DirectoryForest) -> DirectoryRecord {
    let entries = dir
        .slots
        .iter()
        .map(|slot| SlotRecord {
            id: slot.entry.clone(),
            directory_entry: slot_fields(slot),
            value: slot.value.map(|v| v.to_hex()),
            type_info: slot.type_info.clone(),
            version: slot
                .entry
                .as_ref()
                .and_then(|id| forest.entries.get(id))
                .and_then(|e| e.version.clone()),
            comment: slot.comment.clone(),
        })
        .collect();

    DirectoryRecord {
        location: (dir.location as u32).to_hex(),
        header: DirectoryHeaderRecord {
            cookie: dir.header.cookie_str(),
            checksum: dir.header.checksum.to_hex(),
            checksum_valid: dir.validate_checksum(),
            total_entries: dir.header.total_entries.to_hex(),
            reserved: dir.header.reserved.to_hex(),
        },
        entries,
    }
}

fn rom_record(rom: &Rom, forest: &DirectoryForest) -> RomRecord {
    RomRecord {
        kind: rom.kind,
        directories: rom.directories.iter().map(|d| directory_record(d, forest)).collect(),
    }
}

pub fn forest_record(forest: &DirectoryForest) -> ForestRecord {
    ForestRecord {
        table: table_record(&forest.table),
        flash_mapping: forest.flash_mapping.map(|m| m.to_hex()),
        roms: forest.roms.iter().map(|r| rom_record(r, forest)).collect(),
    }
}

/// Build the parent's component tree from whatever one pass produced.
pub fn tree_record(
    signatures: &[DetectedSignature],
    forest: Option<&DirectoryForest>,
) -> ComponentTreeRecord {
    ComponentTreeRecord {
        signatures: signatures.iter().map(signature_record).collect(),
        firmware: forest.map(forest_record),
    }
}
