//! Cartridge images backed by real files on disk.

use std::fs;
use std::path::PathBuf;
use umd_core::header::DecodedValue;
use umd_core::{CartridgeError, CartridgeImage, ConsoleProfile, RomSource};

/// Per-test scratch file, removed on drop
struct TempRom(PathBuf);

impl TempRom {
    fn new(name: &str, contents: &[u8]) -> Self {
        let dir = std::env::temp_dir().join(format!("umd_core_test_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        TempRom(path)
    }
}

impl Drop for TempRom {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}

fn genesis_rom(body_len: usize) -> Vec<u8> {
    let mut rom = vec![0x20u8; 0x200];
    rom[0x100..0x110].copy_from_slice(b"SEGA MEGA DRIVE ");
    rom[0x110..0x120].copy_from_slice(b"(C)SEGA 1991.APR");
    rom[0x1A0..0x1A4].copy_from_slice(&0u32.to_be_bytes());
    rom[0x1A4..0x1A8].copy_from_slice(&((0x200 + body_len as u32) - 1).to_be_bytes());
    rom.extend((0..body_len).map(|i| (i % 256) as u8));

    let sum = rom[0x200..]
        .chunks(2048)
        .flat_map(|c| c.chunks_exact(2))
        .fold(0u16, |acc, w| acc.wrapping_add(u16::from_be_bytes([w[0], w[1]])));
    rom[0x18E..0x190].copy_from_slice(&sum.to_be_bytes());
    rom
}

#[test]
fn genesis_file_header_and_checksum() {
    let rom = TempRom::new("sonic.bin", &genesis_rom(0x10000));
    let image = CartridgeImage::from_path(&rom.0, ConsoleProfile::Genesis);

    let header = image.decode_header().unwrap();
    assert_eq!(
        header.get("Console Name"),
        Some(&DecodedValue::Text("SEGA MEGA DRIVE ".to_string()))
    );
    assert_eq!(
        header.get("ROM End"),
        Some(&DecodedValue::Formatted("0x101ff".to_string()))
    );

    let result = image.checksum().unwrap();
    assert!(result.matches, "{result:?}");
}

#[test]
fn file_and_memory_sources_agree() {
    let bytes = genesis_rom(0x1235);
    let rom = TempRom::new("odd.bin", &bytes);

    let mut from_file = CartridgeImage::from_path(&rom.0, ConsoleProfile::Genesis);
    let mut from_memory = CartridgeImage::from_bytes(bytes.clone(), ConsoleProfile::Genesis);

    assert_eq!(from_file.size().unwrap(), bytes.len() as u64);
    assert_eq!(from_file.digest().unwrap(), from_memory.digest().unwrap());
    assert_eq!(from_file.checksum().unwrap(), from_memory.checksum().unwrap());
    assert_eq!(
        from_file.format_header().unwrap(),
        from_memory.format_header().unwrap()
    );
}

#[test]
fn rebinding_a_file_recomputes_digest() {
    let first = TempRom::new("first.bin", b"first rom");
    let second = TempRom::new("second.bin", b"second rom");

    let mut image = CartridgeImage::from_path(&first.0, ConsoleProfile::Sms);
    let a = image.digest_hex().unwrap();
    image.bind(RomSource::File(second.0.clone()));
    let b = image.digest_hex().unwrap();
    assert_ne!(a, b);
    assert_eq!(b.len(), 32);
}

#[test]
fn short_file_reports_truncation() {
    let rom = TempRom::new("tiny.sms", &[0u8; 0x4000]);
    let image = CartridgeImage::from_path(&rom.0, ConsoleProfile::Sms);
    assert!(matches!(
        image.header_bytes(),
        Err(CartridgeError::Truncated { available: 0x4000, .. })
    ));
}

#[test]
fn sms_header_from_file() {
    let mut bytes = vec![0u8; 0x8000];
    bytes[0x7FF0..0x7FF8].copy_from_slice(b"TMR SEGA");
    bytes[0x7FFA..0x7FFC].copy_from_slice(&[0x34, 0x12]);
    bytes[0x7FFF] = 0x4C;
    let rom = TempRom::new("alex.sms", &bytes);

    let pairs = CartridgeImage::from_path(&rom.0, ConsoleProfile::Sms)
        .format_header()
        .unwrap();
    assert_eq!(pairs[0], ("Signature".to_string(), "TMR SEGA".to_string()));
    assert_eq!(pairs[2], ("Checksum".to_string(), "0x1234".to_string()));
    assert_eq!(pairs[5], ("Region/Size".to_string(), "0b01001100".to_string()));
}
