//! Core cartridge primitives: console profiles, header decoding, checksums
//! and ROM digests.
//!
//! Everything in this crate is synchronous and free of shared mutable state
//! apart from the global [`logging::LogConfig`]; decoding and checksumming can
//! be called from any thread.

pub mod byteswap;
pub mod cartridge;
pub mod checksum;
pub mod console;
pub mod header;
pub mod logging;

pub use cartridge::{CartridgeImage, RomSource};
pub use checksum::{ChecksumResult, ChecksumRule};
pub use console::ConsoleProfile;
pub use header::{DecodeKind, DecodedHeader, DecodedValue, FieldSpec, HeaderDescriptor};

use thiserror::Error;

/// Errors raised while reading or interpreting a cartridge image.
#[derive(Error, Debug)]
pub enum CartridgeError {
    #[error("region 0x{offset:X}+{length} exceeds image size ({available} bytes)")]
    Truncated {
        offset: u64,
        length: u64,
        available: u64,
    },
    #[error("field '{field}' (0x{offset:X}+{length}) lies outside the {available}-byte header buffer")]
    Range {
        field: &'static str,
        offset: u32,
        length: u16,
        available: usize,
    },
    #[error("field '{field}' is {length} bytes wide, integers are limited to 8 bytes")]
    FieldWidth { field: &'static str, length: u16 },
    #[error("no ROM source bound")]
    NotFound,
    #[error("{0} has no checksum rule")]
    NoChecksum(ConsoleProfile),
    #[error("unknown console: {0}")]
    UnknownConsole(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
