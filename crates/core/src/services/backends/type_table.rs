//! Names and descriptions of PSP and BIOS directory entry types.

use crate::model::{RomKind, TypeInfo};
use crate::normalize::hex;

/// PSP directory type that points at a level-2 PSP directory.
pub const PSP_LEVEL2_DIR: u8 = 0x40;

/// BIOS directory type that points at a level-2 BIOS directory.
pub const BIOS_LEVEL2_DIR: u8 = 0x70;

struct KnownType {
    code: u8,
    name: &'static str,
    comment: &'static str,
    /// Entry payload starts with a header (PSP binary layout or similar).
    has_header: bool,
}

const fn known(code: u8, name: &'static str, comment: &'static str, has_header: bool) -> KnownType {
    KnownType { code, name, comment, has_header }
}

const PSP_TYPES: &[KnownType] = &[
    known(0x00, "AMD_PUBLIC_KEY", "AMD public key used to verify PSP firmware", false),
    known(0x01, "PSP_FW_BOOT_LOADER", "PSP on-chip boot loader", true),
    known(0x02, "PSP_FW_TRUSTED_OS", "PSP secure OS", true),
    known(0x03, "PSP_FW_RECOVERY_BOOT_LOADER", "Recovery boot loader", true),
    known(0x04, "PSP_NV_DATA", "PSP non-volatile data", false),
    known(0x05, "BIOS_PUBLIC_KEY", "OEM public key for BIOS signing", false),
    known(0x06, "BIOS_RTM_FIRMWARE", "BIOS root of trust measurement", false),
    known(0x07, "BIOS_RTM_SIGNATURE", "Signature of the BIOS RTM volume", false),
    known(0x08, "SMU_OFFCHIP_FW", "System management unit firmware", true),
    known(0x09, "SEC_DBG_PUBLIC_KEY", "Secure debug unlock public key", false),
    known(0x0A, "OEM_PSP_FW_PUBLIC_KEY", "OEM key for PSP trustlets", false),
    known(0x0B, "SOFT_FUSE_CHAIN_01", "Soft fuse settings (value entry)", false),
    known(0x0C, "PSP_BOOT_TIME_TRUSTLETS", "Trustlets loaded at boot", true),
    known(0x0D, "PSP_BOOT_TIME_TRUSTLETS_KEY", "Key for boot time trustlets", false),
    known(0x10, "PSP_AGESA_RESUME_FW", "AGESA resume firmware", true),
    known(0x12, "SMU_OFF_CHIP_FW_2", "Secondary SMU firmware", true),
    known(0x13, "PSP_EARLY_UNLOCK_DEBUG_IMAGE", "Early secure debug unlock", true),
    known(0x1A, "PSP_S3_NV_DATA", "S3 resume non-volatile data", false),
    known(0x20, "HW_IP_CONFIG", "IP discovery binary", false),
    known(0x21, "WRAPPED_IKEK", "Wrapped intermediate key encryption key", false),
    known(0x22, "TOKEN_UNLOCK", "PSP token unlock data", false),
    known(0x24, "SEC_GASKET", "Security gasket binary", true),
    known(0x25, "MP2_FW", "MP2 sensor fusion firmware", true),
    known(0x28, "DRIVER_ENTRIES", "PSP system drivers", true),
    known(0x2D, "S0I3_DRIVER", "S0i3 low power driver", true),
    known(0x30, "ABL0", "AGESA boot loader stage 0", true),
    known(0x31, "ABL1", "AGESA boot loader stage 1", true),
    known(0x32, "ABL2", "AGESA boot loader stage 2", true),
    known(0x33, "ABL3", "AGESA boot loader stage 3", true),
    known(0x34, "ABL4", "AGESA boot loader stage 4", true),
    known(0x35, "ABL5", "AGESA boot loader stage 5", true),
    known(0x36, "ABL6", "AGESA boot loader stage 6", true),
    known(0x37, "ABL7", "AGESA boot loader stage 7", true),
    known(0x3A, "FW_PSP_WHITELIST", "Serial number whitelist", true),
    known(PSP_LEVEL2_DIR, "PSP_DIR_LV2", "Pointer to level 2 PSP directory", false),
];

const BIOS_TYPES: &[KnownType] = &[
    known(0x60, "APCB", "AGESA PSP customization block", false),
    known(0x61, "APOB", "AGESA PSP output block", false),
    known(0x62, "BIOS_BINARY", "BIOS reset image", false),
    known(0x63, "APOB_NV", "Non-volatile APOB copy", false),
    known(0x64, "PMU_FIRMWARE_INSTRUCTIONS", "DRAM training firmware code", true),
    known(0x65, "PMU_FIRMWARE_DATA", "DRAM training firmware data", true),
    known(0x66, "MICROCODE_PATCH", "CPU microcode patch", false),
    known(0x67, "CORE_MACHINE_EXCEPTION_DATA", "Machine check exception data", false),
    known(0x68, "APCB_BACKUP", "Backup AGESA PSP customization block", false),
    known(0x6A, "MP2_FW_CONFIG", "MP2 firmware configuration", false),
    known(BIOS_LEVEL2_DIR, "BIOS_DIR_LV2", "Pointer to level 2 BIOS directory", false),
];

fn lookup(kind: RomKind, code: u8) -> Option<&'static KnownType> {
    let table = match kind {
        RomKind::Psp => PSP_TYPES,
        RomKind::Bios => BIOS_TYPES,
    };
    table.iter().find(|t| t.code == code)
}

/// Name/comment for a type code, or `None` when the code is not known.
pub fn type_info(kind: RomKind, code: u8) -> Option<TypeInfo> {
    lookup(kind, code).map(|t| TypeInfo {
        type_code: hex(&t.code),
        name: t.name.to_string(),
        comment: t.comment.to_string(),
    })
}

/// Whether entries of this type are expected to start with a header.
pub fn has_header(kind: RomKind, code: u8) -> bool {
    lookup(kind, code).is_some_and(|t| t.has_header)
}
