//! A ROM image bound to a console profile.

use crate::checksum::{self, ChecksumResult};
use crate::console::ConsoleProfile;
use crate::header::{self, DecodedHeader};
use crate::logging::{log, LogCategory, LogLevel};
use crate::CartridgeError;
use md5::{Digest, Md5};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Bytes fed to the digest per read
pub const DIGEST_READ_SIZE: usize = 4096;

/// Where the image bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RomSource {
    File(PathBuf),
    Memory(Vec<u8>),
}

trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

impl RomSource {
    fn open(&self) -> io::Result<Box<dyn ReadSeek + '_>> {
        Ok(match self {
            RomSource::File(path) => Box::new(BufReader::new(File::open(path)?)),
            RomSource::Memory(bytes) => Box::new(io::Cursor::new(bytes.as_slice())),
        })
    }

    fn len(&self) -> io::Result<u64> {
        match self {
            RomSource::File(path) => Ok(std::fs::metadata(path)?.len()),
            RomSource::Memory(bytes) => Ok(bytes.len() as u64),
        }
    }
}

fn md5_of(source: &RomSource) -> Result<[u8; 16], CartridgeError> {
    let mut reader = source.open()?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; DIGEST_READ_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&buf[..n]);
    }
    let mut digest = [0u8; 16];
    digest.copy_from_slice(&hasher.finalize());
    Ok(digest)
}

/// A cartridge image.
///
/// The MD5 digest is computed on first request and kept until a new source
/// is bound.
#[derive(Debug, Clone)]
pub struct CartridgeImage {
    source: Option<RomSource>,
    console: ConsoleProfile,
    header_offset: u32,
    header_length: u32,
    digest: Option<[u8; 16]>,
    digest_hex: Option<String>,
}

impl CartridgeImage {
    /// An image with no source bound yet.
    pub fn new(console: ConsoleProfile) -> Self {
        Self {
            source: None,
            console,
            header_offset: console.header_offset(),
            header_length: console.header_length(),
            digest: None,
            digest_hex: None,
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P, console: ConsoleProfile) -> Self {
        let mut image = Self::new(console);
        image.bind(RomSource::File(path.as_ref().to_path_buf()));
        image
    }

    pub fn from_bytes(bytes: Vec<u8>, console: ConsoleProfile) -> Self {
        let mut image = Self::new(console);
        image.bind(RomSource::Memory(bytes));
        image
    }

    /// Replace the source, discarding any cached digest.
    pub fn bind(&mut self, source: RomSource) {
        if let RomSource::File(path) = &source {
            log(LogCategory::Cartridge, LogLevel::Info, || {
                format!("selected ROM {}", path.display())
            });
        }
        self.source = Some(source);
        self.digest = None;
        self.digest_hex = None;
    }

    /// Drop the source and any cached digest.
    pub fn unbind(&mut self) {
        self.source = None;
        self.digest = None;
        self.digest_hex = None;
    }

    pub fn source(&self) -> Option<&RomSource> {
        self.source.as_ref()
    }

    pub fn console(&self) -> ConsoleProfile {
        self.console
    }

    pub fn header_offset(&self) -> u32 {
        self.header_offset
    }

    pub fn header_length(&self) -> u32 {
        self.header_length
    }

    fn bound_source(&self) -> Result<&RomSource, CartridgeError> {
        self.source.as_ref().ok_or(CartridgeError::NotFound)
    }

    /// Size of the bound image in bytes.
    pub fn size(&self) -> Result<u64, CartridgeError> {
        Ok(self.bound_source()?.len()?)
    }

    /// MD5 of the whole image.
    pub fn digest(&mut self) -> Result<[u8; 16], CartridgeError> {
        if let Some(digest) = self.digest {
            return Ok(digest);
        }

        let digest = md5_of(self.bound_source()?)?;
        let hex = digest.iter().map(|b| format!("{:02x}", b)).collect::<String>();

        log(LogCategory::Cartridge, LogLevel::Info, || format!("MD5 {}", hex));
        self.digest = Some(digest);
        self.digest_hex = Some(hex);
        Ok(digest)
    }

    /// Lowercase hex rendering of [`digest`](Self::digest).
    pub fn digest_hex(&mut self) -> Result<String, CartridgeError> {
        self.digest()?;
        Ok(self.digest_hex.clone().unwrap_or_default())
    }

    /// Cached digest, if one has been computed for the current source.
    pub fn cached_digest(&self) -> Option<[u8; 16]> {
        self.digest
    }

    /// Exactly `header_length` bytes from `header_offset`.
    pub fn header_bytes(&self) -> Result<Vec<u8>, CartridgeError> {
        let source = self.bound_source()?;
        let mut reader = source.open()?;
        reader.seek(SeekFrom::Start(self.header_offset as u64))?;

        let mut header = Vec::with_capacity(self.header_length as usize);
        reader
            .take(self.header_length as u64)
            .read_to_end(&mut header)?;

        if header.len() < self.header_length as usize {
            let available = source.len()?;
            log(LogCategory::Cartridge, LogLevel::Error, || {
                format!(
                    "{} header at 0x{:X} truncated: image is {} bytes",
                    self.console, self.header_offset, available
                )
            });
            return Err(CartridgeError::Truncated {
                offset: self.header_offset as u64,
                length: self.header_length as u64,
                available,
            });
        }
        Ok(header)
    }

    /// Header fields decoded with the console's descriptor.
    pub fn decode_header(&self) -> Result<DecodedHeader, CartridgeError> {
        let raw = self.header_bytes()?;
        header::decode(&raw, &self.console.descriptor(), self.header_offset)
    }

    /// `(field, value)` pairs for display.
    pub fn format_header(&self) -> Result<Vec<(String, String)>, CartridgeError> {
        Ok(self.decode_header()?.display_pairs())
    }

    /// Run the console's native checksum over the image.
    pub fn checksum(&self) -> Result<ChecksumResult, CartridgeError> {
        let rule = self
            .console
            .checksum_rule()
            .ok_or(CartridgeError::NoChecksum(self.console))?;
        let mut reader = self.bound_source()?.open()?;
        checksum::compute_from_reader(&mut reader, rule.field_offset, rule.body_start)
    }
}
