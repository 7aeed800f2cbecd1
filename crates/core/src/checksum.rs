//! Console-native ROM integrity checks.
//!
//! The Genesis checksum is the 16-bit wrapping sum of every big-endian word
//! from `0x200` to the end of the image, stored big-endian at `0x18E`.

use crate::logging::{log, LogCategory, LogLevel};
use crate::CartridgeError;
use serde::Serialize;
use std::io::{self, Read, Seek, SeekFrom};

/// Bytes consumed per read of the checksum window
pub const CHUNK_SIZE: usize = 2048;

/// Where a console keeps its stored checksum and which bytes it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumRule {
    pub field_offset: u32,
    pub body_start: u32,
}

impl ChecksumRule {
    pub const GENESIS: ChecksumRule = ChecksumRule {
        field_offset: 0x18E,
        body_start: 0x200,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChecksumResult {
    pub stored: u16,
    pub computed: u16,
    pub matches: bool,
}

/// Checksum an in-memory image.
pub fn compute(
    rom: &[u8],
    checksum_field_offset: u32,
    rom_body_start: u32,
) -> Result<ChecksumResult, CartridgeError> {
    compute_from_reader(
        &mut io::Cursor::new(rom),
        checksum_field_offset,
        rom_body_start,
    )
}

/// Checksum any seekable byte source.
///
/// The body is summed chunk by chunk. Within a chunk bytes are paired into
/// big-endian words; the last byte of an odd-length chunk (only ever the final
/// one) is left out of the sum. That matches the dumper software's existing
/// results and must not be changed to zero-padding.
pub fn compute_from_reader<R: Read + Seek>(
    reader: &mut R,
    checksum_field_offset: u32,
    rom_body_start: u32,
) -> Result<ChecksumResult, CartridgeError> {
    reader.seek(SeekFrom::Start(checksum_field_offset as u64))?;
    let mut field = [0u8; 2];
    let read = fill_chunk(reader, &mut field)?;
    if read < field.len() {
        let available = reader.seek(SeekFrom::End(0))?;
        return Err(CartridgeError::Truncated {
            offset: checksum_field_offset as u64,
            length: field.len() as u64,
            available,
        });
    }
    let stored = u16::from_be_bytes(field);

    reader.seek(SeekFrom::Start(rom_body_start as u64))?;
    let mut computed: u16 = 0;
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        let len = fill_chunk(reader, &mut chunk)?;
        if len == 0 {
            break;
        }
        if len % 2 == 1 {
            log(LogCategory::Checksum, LogLevel::Debug, || {
                format!("dropping unpaired trailing byte 0x{:02X}", chunk[len - 1])
            });
        }
        for pair in chunk[..len].chunks_exact(2) {
            computed = computed.wrapping_add(u16::from_be_bytes([pair[0], pair[1]]));
        }
        if len < CHUNK_SIZE {
            break;
        }
    }

    let result = ChecksumResult {
        stored,
        computed,
        matches: stored == computed,
    };
    log(LogCategory::Checksum, LogLevel::Info, || {
        format!(
            "stored 0x{:04X}, computed 0x{:04X}{}",
            result.stored,
            result.computed,
            if result.matches { "" } else { " (mismatch)" }
        )
    });
    Ok(result)
}

/// Read until `buf` is full or the source is exhausted.
fn fill_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
