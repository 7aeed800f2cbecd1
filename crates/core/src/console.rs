//! Console families and their header layouts.

use crate::checksum::ChecksumRule;
use crate::header::{DecodeKind::*, FieldSpec, HeaderDescriptor};
use crate::CartridgeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported console families.
///
/// Each variant carries its header region, field table and (optionally) the
/// parameters of its native checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleProfile {
    Genesis,
    Sms,
    Snes,
    Tg16,
}

const GENESIS_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("Console Name", 0x100, 16, Text),
    FieldSpec::new("Copyright", 0x110, 16, Text),
    FieldSpec::new("Domestic Name", 0x120, 48, Text),
    FieldSpec::new("Overseas Name", 0x150, 48, Text),
    FieldSpec::new("Serial Number", 0x180, 14, Text),
    FieldSpec::new("Checksum", 0x18E, 2, HexBig),
    FieldSpec::new("IO Support", 0x190, 16, Text),
    FieldSpec::new("ROM Begin", 0x1A0, 4, HexBig),
    FieldSpec::new("ROM End", 0x1A4, 4, HexBig),
    FieldSpec::new("RAM Begin", 0x1A8, 4, HexBig),
    FieldSpec::new("RAM End", 0x1AC, 4, HexBig),
    FieldSpec::new("SRAM Support", 0x1B0, 4, ByteDump),
    FieldSpec::new("SRAM Begin", 0x1B4, 4, HexBig),
    FieldSpec::new("SRAM End", 0x1B8, 4, HexBig),
    FieldSpec::new("Modem Support", 0x1BC, 12, Text),
    FieldSpec::new("Memo", 0x1C8, 40, Text),
    FieldSpec::new("Region", 0x1F0, 16, Text),
];

// "TMR SEGA" block at the end of the first 32 KiB
const SMS_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("Signature", 0x7FF0, 8, Text),
    FieldSpec::new("Reserved", 0x7FF8, 2, ByteDump),
    FieldSpec::new("Checksum", 0x7FFA, 2, HexLittle),
    FieldSpec::new("Product Code", 0x7FFC, 2, ByteDump),
    FieldSpec::new("Product/Version", 0x7FFE, 1, BitDump),
    FieldSpec::new("Region/Size", 0x7FFF, 1, BitDump),
];

// LoROM internal header, no copier header
const SNES_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("Title", 0x7FC0, 21, Text),
    FieldSpec::new("Map Mode", 0x7FD5, 1, BitDump),
    FieldSpec::new("Cartridge Type", 0x7FD6, 1, HexLittle),
    FieldSpec::new("ROM Size", 0x7FD7, 1, IntLittle),
    FieldSpec::new("SRAM Size", 0x7FD8, 1, IntLittle),
    FieldSpec::new("Region", 0x7FD9, 1, HexLittle),
    FieldSpec::new("Developer ID", 0x7FDA, 1, HexLittle),
    FieldSpec::new("Version", 0x7FDB, 1, IntLittle),
    FieldSpec::new("Checksum Complement", 0x7FDC, 2, HexLittle),
    FieldSpec::new("Checksum", 0x7FDE, 2, HexLittle),
    FieldSpec::new("Vectors", 0x7FE0, 32, Raw),
];

// HuCards have no header; the HuC6280 vector table is the only fixed layout
const TG16_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("IRQ2 Vector", 0x1FF6, 2, HexLittle),
    FieldSpec::new("IRQ1 Vector", 0x1FF8, 2, HexLittle),
    FieldSpec::new("Timer Vector", 0x1FFA, 2, HexLittle),
    FieldSpec::new("NMI Vector", 0x1FFC, 2, HexLittle),
    FieldSpec::new("Reset Vector", 0x1FFE, 2, HexLittle),
];

impl ConsoleProfile {
    pub const ALL: [ConsoleProfile; 4] = [
        ConsoleProfile::Genesis,
        ConsoleProfile::Sms,
        ConsoleProfile::Snes,
        ConsoleProfile::Tg16,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ConsoleProfile::Genesis => "genesis",
            ConsoleProfile::Sms => "sms",
            ConsoleProfile::Snes => "snes",
            ConsoleProfile::Tg16 => "tg16",
        }
    }

    /// ROM offset of the header region
    pub fn header_offset(self) -> u32 {
        match self {
            ConsoleProfile::Genesis => 0x100,
            ConsoleProfile::Sms => 0x7FF0,
            ConsoleProfile::Snes => 0x7FC0,
            ConsoleProfile::Tg16 => 0x1FF6,
        }
    }

    pub fn header_length(self) -> u32 {
        match self {
            ConsoleProfile::Genesis => 0x100,
            ConsoleProfile::Sms => 0x10,
            ConsoleProfile::Snes => 0x40,
            ConsoleProfile::Tg16 => 0x0A,
        }
    }

    pub fn descriptor(self) -> HeaderDescriptor {
        HeaderDescriptor::new(match self {
            ConsoleProfile::Genesis => GENESIS_FIELDS,
            ConsoleProfile::Sms => SMS_FIELDS,
            ConsoleProfile::Snes => SNES_FIELDS,
            ConsoleProfile::Tg16 => TG16_FIELDS,
        })
    }

    pub fn checksum_rule(self) -> Option<ChecksumRule> {
        match self {
            ConsoleProfile::Genesis => Some(ChecksumRule::GENESIS),
            ConsoleProfile::Sms | ConsoleProfile::Snes | ConsoleProfile::Tg16 => None,
        }
    }
}

impl fmt::Display for ConsoleProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConsoleProfile {
    type Err = CartridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ConsoleProfile::ALL
            .into_iter()
            .find(|c| c.name() == wanted)
            .ok_or_else(|| CartridgeError::UnknownConsole(s.to_string()))
    }
}
