//! Known entry header layouts.
//!
//! Each layout decodes from raw bytes and exposes its fields in declaration
//! order through `fields()`. Adding a layout means adding a struct here and a
//! variant to `EntryHeader`; nothing else in the pipeline changes.

use crate::bytes::LeReader;
use crate::normalize::{FieldValue, NormalizeError};

/// Magic found at offset 0x10 of PSP binaries.
pub const PSP_BINARY_MAGIC: [u8; 4] = *b"$PS1";

/// Magic found at offset 0 of APCB blobs.
pub const APCB_MAGIC: [u8; 4] = *b"APCB";

/// 256-byte header in front of PSP firmware binaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PspBinaryHeader {
    pub unknown_00: [u8; 0x10],
    pub id: [u8; 4],
    pub size_signed: u32,
    pub is_encrypted: u32,
    pub unknown_1c: u32,
    pub enc_fingerprint: [u8; 0x10],
    pub is_signed: u32,
    pub unknown_34: u32,
    pub sig_fingerprint: [u8; 0x10],
    pub is_compressed: u32,
    pub unknown_4c: u32,
    pub full_size: u32,
    pub unknown_54: u32,
    pub unknown_58: [u8; 8],
    pub version: [u8; 4],
    pub unknown_64: u32,
    pub unknown_68: u32,
    pub size_packed: u32,
    pub unknown_70: [u8; 0x90],
}

impl PspBinaryHeader {
    pub const SIZE: usize = 0x100;

    pub fn parse(bytes: &[u8]) -> Result<Self, NormalizeError> {
        let truncated = || NormalizeError::TruncatedHeader {
            layout: "psp-binary",
            needed: Self::SIZE,
            actual: bytes.len(),
        };
        if bytes.len() < Self::SIZE {
            return Err(truncated());
        }
        let mut r = LeReader::new(bytes);
        let header = Self {
            unknown_00: r.array().ok_or_else(truncated)?,
            id: r.array().ok_or_else(truncated)?,
            size_signed: r.u32().ok_or_else(truncated)?,
            is_encrypted: r.u32().ok_or_else(truncated)?,
            unknown_1c: r.u32().ok_or_else(truncated)?,
            enc_fingerprint: r.array().ok_or_else(truncated)?,
            is_signed: r.u32().ok_or_else(truncated)?,
            unknown_34: r.u32().ok_or_else(truncated)?,
            sig_fingerprint: r.array().ok_or_else(truncated)?,
            is_compressed: r.u32().ok_or_else(truncated)?,
            unknown_4c: r.u32().ok_or_else(truncated)?,
            full_size: r.u32().ok_or_else(truncated)?,
            unknown_54: r.u32().ok_or_else(truncated)?,
            unknown_58: r.array().ok_or_else(truncated)?,
            version: r.array().ok_or_else(truncated)?,
            unknown_64: r.u32().ok_or_else(truncated)?,
            unknown_68: r.u32().ok_or_else(truncated)?,
            size_packed: r.u32().ok_or_else(truncated)?,
            unknown_70: r.array().ok_or_else(truncated)?,
        };
        if header.id != PSP_BINARY_MAGIC {
            return Err(NormalizeError::BadMagic {
                layout: "psp-binary",
                found: header.id.escape_ascii().to_string(),
            });
        }
        Ok(header)
    }

    /// Version as dotted hex, most significant byte first (e.g. `0.B.0.54`).
    pub fn version_string(&self) -> String {
        let v = self.version;
        format!("{:X}.{:X}.{:X}.{:X}", v[3], v[2], v[1], v[0])
    }

    pub fn fields(&self) -> Vec<(&'static str, FieldValue)> {
        vec![
            ("Unknown00", FieldValue::Bytes(self.unknown_00.to_vec())),
            ("ID", FieldValue::Text(self.id.escape_ascii().to_string())),
            ("SizeSigned", FieldValue::U32(self.size_signed)),
            ("IsEncrypted", FieldValue::U32(self.is_encrypted)),
            ("Unknown1C", FieldValue::U32(self.unknown_1c)),
            ("EncFingerprint", FieldValue::Bytes(self.enc_fingerprint.to_vec())),
            ("IsSigned", FieldValue::U32(self.is_signed)),
            ("Unknown34", FieldValue::U32(self.unknown_34)),
            ("SigFingerprint", FieldValue::Bytes(self.sig_fingerprint.to_vec())),
            ("IsCompressed", FieldValue::U32(self.is_compressed)),
            ("Unknown4C", FieldValue::U32(self.unknown_4c)),
            ("FullSize", FieldValue::U32(self.full_size)),
            ("Unknown54", FieldValue::U32(self.unknown_54)),
            ("Unknown58", FieldValue::Bytes(self.unknown_58.to_vec())),
            ("Version", FieldValue::Bytes(self.version.to_vec())),
            ("Unknown64", FieldValue::U32(self.unknown_64)),
            ("Unknown68", FieldValue::U32(self.unknown_68)),
            ("SizePacked", FieldValue::U32(self.size_packed)),
            ("Unknown70", FieldValue::Bytes(self.unknown_70.to_vec())),
        ]
    }
}

/// 32-byte header of an AGESA PSP customization block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApcbHeader {
    pub signature: [u8; 4],
    pub size_of_header: u16,
    pub version: u16,
    pub size_of_apcb: u32,
    pub unique_apcb_instance: u32,
    pub checksum_byte: u8,
    pub reserved1: [u8; 3],
    pub reserved2: [u8; 12],
}

impl ApcbHeader {
    pub const SIZE: usize = 0x20;

    pub fn parse(bytes: &[u8]) -> Result<Self, NormalizeError> {
        let truncated = || NormalizeError::TruncatedHeader {
            layout: "apcb",
            needed: Self::SIZE,
            actual: bytes.len(),
        };
        if bytes.len() < Self::SIZE {
            return Err(truncated());
        }
        let mut r = LeReader::new(bytes);
        let header = Self {
            signature: r.array().ok_or_else(truncated)?,
            size_of_header: r.u16().ok_or_else(truncated)?,
            version: r.u16().ok_or_else(truncated)?,
            size_of_apcb: r.u32().ok_or_else(truncated)?,
            unique_apcb_instance: r.u32().ok_or_else(truncated)?,
            checksum_byte: r.u8().ok_or_else(truncated)?,
            reserved1: r.array().ok_or_else(truncated)?,
            reserved2: r.array().ok_or_else(truncated)?,
        };
        if header.signature != APCB_MAGIC {
            return Err(NormalizeError::BadMagic {
                layout: "apcb",
                found: header.signature.escape_ascii().to_string(),
            });
        }
        Ok(header)
    }

    pub fn fields(&self) -> Vec<(&'static str, FieldValue)> {
        vec![
            ("Signature", FieldValue::Text(self.signature.escape_ascii().to_string())),
            ("SizeOfHeader", FieldValue::U16(self.size_of_header)),
            ("Version", FieldValue::U16(self.version)),
            ("SizeOfApcb", FieldValue::U32(self.size_of_apcb)),
            ("UniqueApcbInstance", FieldValue::U32(self.unique_apcb_instance)),
            ("CheckSumByte", FieldValue::U8(self.checksum_byte)),
            ("Reserved1", FieldValue::Bytes(self.reserved1.to_vec())),
            ("Reserved2", FieldValue::Bytes(self.reserved2.to_vec())),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn psp_header_bytes() -> Vec<u8> {
        let mut bytes = vec![0u8; PspBinaryHeader::SIZE];
        bytes[0x10..0x14].copy_from_slice(&PSP_BINARY_MAGIC);
        bytes[0x30..0x34].copy_from_slice(&1u32.to_le_bytes());
        bytes[0x60..0x64].copy_from_slice(&[0x54, 0x00, 0x0B, 0x00]);
        bytes
    }

    #[test]
    fn psp_header_decodes_flags_and_version() {
        let header = PspBinaryHeader::parse(&psp_header_bytes()).expect("parse");
        assert_eq!(header.is_signed, 1);
        assert_eq!(header.version_string(), "0.B.0.54");
        let fields = header.fields();
        assert_eq!(fields.len(), 19);
        assert_eq!(fields[1], ("ID", FieldValue::Text("$PS1".into())));
    }

    #[test]
    fn psp_header_rejects_short_input() {
        let bytes = psp_header_bytes();
        let err = PspBinaryHeader::parse(&bytes[..0x20]).unwrap_err();
        assert_eq!(
            err,
            NormalizeError::TruncatedHeader { layout: "psp-binary", needed: 0x100, actual: 0x20 }
        );
    }

    #[test]
    fn apcb_header_checks_magic() {
        let mut bytes = vec![0u8; ApcbHeader::SIZE];
        bytes[..4].copy_from_slice(b"ABCD");
        assert!(matches!(ApcbHeader::parse(&bytes), Err(NormalizeError::BadMagic { .. })));

        bytes[..4].copy_from_slice(&APCB_MAGIC);
        bytes[4..6].copy_from_slice(&0x20u16.to_le_bytes());
        let header = ApcbHeader::parse(&bytes).expect("parse");
        assert_eq!(header.size_of_header, 0x20);
    }
}
